//! Swap quoting
//!
//! [`QuoteEngine`] keeps a single live quote for an input that changes as a
//! user types: it debounces, cancels superseded fetches and refreshes on a
//! timer. One-shot lookups go straight through the pipeline.

pub mod engine;

pub use engine::{QuoteEngine, QuoteEngineSettings, QuoteSnapshot, QuoteState};
