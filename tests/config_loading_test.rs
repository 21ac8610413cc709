//! Configuration and key material loaded from disk

#[cfg(test)]
mod config_loading_tests {
    use solana_sdk::signature::{Keypair, Signer};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use txpipe::config::ConfigError;
    use txpipe::{KeyHolder, LocalKeyHolder, PipelineConfig, PipelineError, TransactionPipeline};

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config_file() {
        let file = write_temp(
            r#"
            [rpc]
            url = "http://127.0.0.1:8899"
            commitment = "processed"
            timeout_secs = 10

            [quote]
            api_url = "http://127.0.0.1:8080"
            rate_limit_rps = 2
            default_slippage_bps = 100
            debounce_ms = 250

            [confirmation]
            poll_interval_ms = 500
            max_polls = 120

            [logging]
            level = "txpipe=debug"
            json = true
            "#,
        );

        let config = PipelineConfig::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.rpc.timeout_secs, 10);
        assert_eq!(config.quote.rate_limit_rps, 2);
        assert_eq!(config.quote.debounce().as_millis(), 250);
        assert_eq!(config.confirmation.max_polls, 120);
        assert!(config.logging.json);
        // Untouched sections keep their defaults
        assert_eq!(config.submission.max_attempts, 3);
        assert_eq!(config.fees.rent_cache_ttl_secs, 30);
    }

    #[test]
    fn test_invalid_values_are_rejected_on_load() {
        let file = write_temp(
            r#"
            [submission]
            max_attempts = 0
            "#,
        );

        let err = PipelineConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let err = PipelineConfig::from_file("/nonexistent/txpipe.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));

        let file = write_temp("[rpc\nurl = ");
        let err = PipelineConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_keypair_file_feeds_key_holder() {
        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let file = write_temp(&json);

        let holder = LocalKeyHolder::from_file(file.path()).unwrap();

        assert_eq!(holder.accounts(), vec![keypair.pubkey()]);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.quote.api_url = "ftp://quotes".to_string();
        let holder = Arc::new(LocalKeyHolder::from_keypair(Keypair::new()));

        let err = TransactionPipeline::connect(config, holder).unwrap_err();

        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_connect_builds_live_pipeline() {
        let holder = Arc::new(LocalKeyHolder::from_keypair(Keypair::new()));
        let pipeline = TransactionPipeline::connect(PipelineConfig::default(), holder).unwrap();
        assert_eq!(pipeline.config().submission.max_attempts, 3);
    }
}
