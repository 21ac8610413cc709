//! Cross-module scenario tests driving [`TransactionPipeline`](crate::pipeline::TransactionPipeline)
//! against the scriptable network double.

mod transfer_scenario_tests;
