//! Domain model module declarations.

pub mod channel;
pub mod question;
pub mod token;
pub mod user;
