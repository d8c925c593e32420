    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        let result = ConfigValidator::validate(&config);
        assert!(result.is_valid());
    }

    #[test]
    fn test_default_config_warns_about_missing_channels() {
        let config = Config::default();
        let result = ConfigValidator::validate(&config);
        assert!(result.warnings.iter().any(|w| w.path == "telegram"));
        assert!(result.warnings.iter().any(|w| w.path == "infura_key"));
    }

    #[test]
    fn test_validate_percent_limit_out_of_range() {
        let mut config = Config::default();
        config.cloudflare.image_percent_limit = 1.5;
        config.cloudflare.video_percent_limit = 0.0;

        let result = ConfigValidator::validate(&config);
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.path == "cloudflare.image_percent_limit"));
        assert!(result.errors.iter().any(|e| e.path == "cloudflare.video_percent_limit"));
    }

    #[test]
    fn test_validate_invalid_cron() {
        let mut config = Config::default();
        config.schedule.sweep = "every five minutes".to_string();

        let result = ConfigValidator::validate(&config);
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.path == "schedule.sweep"));
    }

    #[test]
    fn test_validate_zero_attempts() {
        let mut config = Config::default();
        config.fetch.max_attempts = 0;

        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.path == "fetch.max_attempts"));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = Config::default();
        config.fetch.max_concurrency = 0;

        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.path == "fetch.max_concurrency"));
    }

    #[test]
    fn test_validate_high_attempts_warning() {
        let mut config = Config::default();
        config.fetch.max_attempts = 50;

        let result = ConfigValidator::validate(&config);
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.path == "fetch.max_attempts"));
    }

    #[test]
    fn test_validate_watcher_interval() {
        let mut config = Config::default();
        config.watcher.interval_secs = 0;

        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.path == "watcher.interval_secs"));
    }

    #[test]
    fn test_validate_invalid_webhook_url() {
        let mut config = Config::default();
        config.slack.webhook_url = Some("hooks.slack.com/abc".to_string());

        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.path == "slack.webhook_url"));
    }

    #[test]
    fn test_validate_telegram_without_chats() {
        let mut config = Config::default();
        config.telegram.access_token = Some("123:abc".to_string());

        let result = ConfigValidator::validate(&config);
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.path == "telegram.chat_ids"));
    }

    #[test]
    fn test_validate_offset_out_of_range() {
        let mut config = Config::default();
        config.schedule.utc_offset_minutes = 15 * 60;

        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.path == "schedule.utc_offset_minutes"));
    }

    #[test]
    fn test_into_result_reports_first_error() {
        let mut config = Config::default();
        config.fetch.max_attempts = 0;

        let err = ConfigValidator::validate(&config).into_result().unwrap_err();
        assert!(err.to_string().contains("fetch.max_attempts"));
    }

    #[test]
    fn test_into_result_returns_warnings() {
        let warnings = ConfigValidator::validate(&Config::default())
            .into_result()
            .unwrap();
        assert!(!warnings.is_empty());
    }
