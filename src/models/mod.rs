pub mod chat;
pub mod token;
