//! Getting a prepared transaction on chain
//!
//! - **retrier**: sign, serialize, broadcast; retry on blockhash expiry only
//! - **poller**: track a broadcast signature to a terminal outcome

pub mod poller;
pub mod retrier;

pub use poller::ConfirmationPoller;
pub use retrier::{RetryPolicy, SubmissionAttempt, SubmissionRetrier, SubmissionState};
