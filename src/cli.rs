use clap::{Parser, Subcommand};

/// works-bot — LINE WORKS bot backend
#[derive(Parser)]
#[command(name = "works-bot", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the webhook server
    Serve {
        /// Port to bind (defaults to WORKS_BOT_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage the access/refresh token pair
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Manage credentials in the secret store
    Secret {
        #[command(subcommand)]
        command: SecretCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Bootstrap or refresh the access token once (for schedulers)
    Refresh,
    /// Reset the refresh token to the `init` sentinel so the next refresh bootstraps
    Init,
}

#[derive(Subcommand)]
pub enum SecretCommands {
    /// Add a new version of a credential
    Put {
        #[arg(long)]
        name: String,
        /// Secret value; read from WORKS_SECRET_VALUE when omitted
        #[arg(long, env = "WORKS_SECRET_VALUE", hide_env_values = true)]
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_token_refresh() {
        let cli = Cli::try_parse_from(["works-bot", "token", "refresh"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Token { command: TokenCommands::Refresh })
        ));
    }

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["works-bot"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parses_secret_put() {
        let cli = Cli::try_parse_from([
            "works-bot", "secret", "put", "--name", "lw-client-id", "--value", "abc",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Secret { command: SecretCommands::Put { name, value } }) => {
                assert_eq!(name, "lw-client-id");
                assert_eq!(value, "abc");
            }
            _ => panic!("expected secret put"),
        }
    }
}
