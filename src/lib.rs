//! paperfill - Core Library
//! Simulated order-matching and position-tracking engine for paper trading

// Public modules
pub mod balance;
pub mod core;
pub mod engine;
pub mod feed;
pub mod persist;

// Re-exports
pub use crate::core::{Config, Error, Result};
