//! Core domain + application logic for the personal-best tracker bot.
//!
//! This crate is intentionally framework-agnostic. Score services and the chat
//! platform live behind ports (traits) implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod mode;
pub mod notifier;
pub mod provider;
pub mod scheduler;
pub mod score;
pub mod security;
pub mod subscriptions;
pub mod tracker;

pub use errors::{Error, ProviderError, Result};
