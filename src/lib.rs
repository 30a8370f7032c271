//! Inboxer Library
//!
//! This library provides the core functionality for Inboxer: analyzing email HTML,
//! optimizing it for specific email clients, scoring the result, checking
//! deliverability, rendering themed shells, and the LLM, store and service
//! collaborators built on top of the pipeline.

pub mod config;
pub mod error;
pub mod models;
pub mod analyzer;
pub mod clients;
pub mod optimizer;
pub mod scorer;
pub mod deliverability;
pub mod renderer;
pub mod metrics;
pub mod pipeline;
pub mod llm;
pub mod store;
pub mod service;

pub use analyzer::analyze;
pub use config::Config;
pub use error::{InboxerError, Result};
pub use pipeline::Pipeline;
