//! # STS Common Library
//!
//! Shared code for the Sentiment-to-Sprint services including:
//! - Task lifecycle event types (TaskEvent enum) and the EventBus
//! - TOML configuration file model and loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
