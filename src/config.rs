use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TOKEN_URL: &str = "https://auth.worksmobile.com/oauth2/v2.0/token";
pub const DEFAULT_API_BASE_URL: &str = "https://www.worksapis.com/v1.0";
pub const DEFAULT_SCOPE: &str = "bot,bot.read";
const PLACEHOLDER_MASTER_KEY: &str = "CHANGE_ME_32_BYTE_HEX_KEY";

/// Names of the credentials the service reads and writes in the secret store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretNames {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub service_account_id: String,
    pub private_key: String,
    /// Shared secret for webhook signatures.
    pub api_id: String,
    pub access_token: String,
}

impl SecretNames {
    pub fn with_prefix(prefix: &str) -> Self {
        let name = |suffix: &str| format!("{}{}", prefix, suffix);
        Self {
            client_id: name("client-id"),
            client_secret: name("client-secret"),
            refresh_token: name("refresh-token"),
            service_account_id: name("service-account-id"),
            private_key: name("privatekey"),
            api_id: name("api-id"),
            access_token: name("access-token"),
        }
    }
}

impl Default for SecretNames {
    fn default() -> Self {
        Self::with_prefix("lw-")
    }
}

#[derive(Clone)]
pub enum SecretBackend {
    /// Google Secret Manager in the given project.
    Gcp { project_id: String },
    /// AES-256-GCM encrypted JSON file on local disk.
    File { path: PathBuf, master_key: String },
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub secret_backend: SecretBackend,
    pub secret_names: SecretNames,
    pub token_url: String,
    pub api_base_url: String,
    pub scope: String,
    /// Timeout for control calls (token exchange, messages, secret store).
    pub http_timeout: Duration,
    /// Timeout for attachment uploads.
    pub upload_timeout: Duration,
    /// Comma-separated list of webhook URLs notified on processing failures.
    pub alert_webhook_urls: Vec<String>,
    pub alert_signing_secret: Option<String>,
    /// Static OAuth token for Secret Manager; the metadata server is used when unset.
    pub gcp_access_token: Option<String>,
}

impl Config {
    /// Configuration pointing at the public LINE WORKS endpoints with the
    /// given secret backend. Used by tests and as the base for `load`.
    pub fn with_backend(secret_backend: SecretBackend) -> Self {
        Self {
            port: 8080,
            secret_backend,
            secret_names: SecretNames::default(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            http_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(180),
            alert_webhook_urls: Vec::new(),
            alert_signing_secret: None,
            gcp_access_token: None,
        }
    }
}

impl fmt::Debug for SecretBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretBackend::Gcp { project_id } => {
                f.debug_struct("Gcp").field("project_id", project_id).finish()
            }
            SecretBackend::File { path, .. } => f
                .debug_struct("File")
                .field("path", path)
                .field("master_key", &"[REDACTED]")
                .finish(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("secret_backend", &self.secret_backend)
            .field("secret_names", &self.secret_names)
            .field("token_url", &self.token_url)
            .field("api_base_url", &self.api_base_url)
            .field("scope", &self.scope)
            .field("http_timeout", &self.http_timeout)
            .field("upload_timeout", &self.upload_timeout)
            .field("alert_webhook_urls", &self.alert_webhook_urls)
            .field("alert_signing_secret", &self.alert_signing_secret.as_ref().map(|_| "[REDACTED]"))
            .field("gcp_access_token", &self.gcp_access_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(default),
    )
}

fn is_production() -> bool {
    std::env::var("WORKS_ENV")
        .or_else(|_| std::env::var("RUST_ENV"))
        .map(|v| v == "production")
        .unwrap_or(false)
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let backend = std::env::var("WORKS_SECRET_BACKEND").unwrap_or_else(|_| "gcp".into());
    let secret_backend = match backend.as_str() {
        "gcp" => {
            let project_id = std::env::var("GCP_PROJECT_ID").unwrap_or_default();
            if project_id.is_empty() {
                if is_production() {
                    anyhow::bail!("GCP_PROJECT_ID must be set when WORKS_SECRET_BACKEND=gcp");
                }
                eprintln!("⚠️  GCP_PROJECT_ID is not set — Secret Manager calls will fail.");
            }
            SecretBackend::Gcp { project_id }
        }
        "file" => {
            let master_key = std::env::var("WORKS_MASTER_KEY")
                .unwrap_or_else(|_| PLACEHOLDER_MASTER_KEY.into());
            if master_key == PLACEHOLDER_MASTER_KEY {
                if is_production() {
                    anyhow::bail!(
                        "WORKS_MASTER_KEY is still the insecure placeholder. \
                         Set a proper 64-char hex key before running in production."
                    );
                }
                eprintln!("⚠️  WORKS_MASTER_KEY is not set — the file secret store cannot be opened.");
            }
            SecretBackend::File {
                path: std::env::var("WORKS_SECRET_FILE")
                    .unwrap_or_else(|_| "secrets.json".into())
                    .into(),
                master_key,
            }
        }
        other => anyhow::bail!("unknown WORKS_SECRET_BACKEND '{}' (expected gcp or file)", other),
    };

    let mut cfg = Config::with_backend(secret_backend);
    cfg.port = std::env::var("WORKS_BOT_PORT")
        .or_else(|_| std::env::var("PORT"))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    cfg.secret_names = SecretNames::with_prefix(
        &std::env::var("WORKS_SECRET_PREFIX").unwrap_or_else(|_| "lw-".into()),
    );
    if let Ok(url) = std::env::var("WORKS_TOKEN_URL") {
        cfg.token_url = url;
    }
    if let Ok(url) = std::env::var("WORKS_API_BASE_URL") {
        cfg.api_base_url = url.trim_end_matches('/').to_string();
    }
    if let Ok(scope) = std::env::var("WORKS_SCOPE") {
        cfg.scope = scope;
    }
    cfg.http_timeout = env_secs("WORKS_HTTP_TIMEOUT_SECS", 30);
    cfg.upload_timeout = env_secs("WORKS_UPLOAD_TIMEOUT_SECS", 180);
    cfg.alert_webhook_urls = std::env::var("WORKS_ALERT_WEBHOOK_URLS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    cfg.alert_signing_secret = std::env::var("WORKS_ALERT_SIGNING_SECRET").ok();
    cfg.gcp_access_token = std::env::var("GCP_ACCESS_TOKEN").ok();

    url::Url::parse(&cfg.token_url)?;
    url::Url::parse(&cfg.api_base_url)?;

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_secret_names() {
        let names = SecretNames::default();
        assert_eq!(names.client_id, "lw-client-id");
        assert_eq!(names.refresh_token, "lw-refresh-token");
        assert_eq!(names.private_key, "lw-privatekey");
        assert_eq!(names.access_token, "lw-access-token");
    }

    #[test]
    fn test_prefixed_secret_names() {
        let names = SecretNames::with_prefix("staging-");
        assert_eq!(names.api_id, "staging-api-id");
        assert_eq!(names.service_account_id, "staging-service-account-id");
    }

    #[test]
    fn test_debug_redacts_master_key() {
        let backend = SecretBackend::File {
            path: "secrets.json".into(),
            master_key: "deadbeef".repeat(8),
        };
        let cfg = Config::with_backend(backend);
        assert!(!format!("{:?}", cfg).contains("deadbeef"));
    }

    #[test]
    fn test_defaults_set_explicit_timeouts() {
        let cfg = Config::with_backend(SecretBackend::Gcp { project_id: "p".into() });
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert_eq!(cfg.upload_timeout, Duration::from_secs(180));
        assert_eq!(cfg.scope, "bot,bot.read");
    }
}
