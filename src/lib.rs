#![forbid(unsafe_code)]

//! Question relay: deliver notifications and multiple-choice questions to
//! channel subscribers over Slack, and let producers long-poll the answer
//! over HTTP.

pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod persistence;
pub mod question;
pub mod slack;
pub mod state;
pub mod store;
pub mod transport;
pub mod validation;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
