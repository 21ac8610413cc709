//! Fee accounting
//!
//! - **cache**: rent-exemption floors keyed by account size and commitment
//! - **estimator**: network fee plus rent funding for a prepared transaction

pub mod cache;
pub mod estimator;

pub use cache::{FeeCache, RentExemptionCacheEntry, DEFAULT_RENT_CACHE_TTL};
pub use estimator::{FeeEstimator, TOKEN_ACCOUNT_SPAN};
