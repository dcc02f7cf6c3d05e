//! Marketscope - resilient market-analysis pipeline
//!
//! Fetches marketplace listings, validates them, aggregates price
//! statistics, and verifies storage integrity, with retry, timeout, and
//! fallback handling around every external call. This library exposes the
//! internal modules for integration testing and use as a library.

pub mod analysis;
pub mod api;
pub mod catalog;
pub mod error;
pub mod integrity;
pub mod logging;
pub mod orchestrator;
pub mod recovery;
