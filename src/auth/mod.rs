//! Credential core: webhook signature verification, JWT-bearer assertions,
//! the identity provider client and the token lifecycle state machine.

pub mod assertion;
pub mod identity;
pub mod lifecycle;
pub mod signature;
