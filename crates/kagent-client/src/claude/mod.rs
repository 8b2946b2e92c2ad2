//! Claude Messages API implementation of the model seam.

mod client;
mod config;

pub use client::ClaudeClient;
pub use config::ClaudeConfig;
