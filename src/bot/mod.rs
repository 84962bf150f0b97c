pub mod client;
pub mod content;
pub mod dispatch;
