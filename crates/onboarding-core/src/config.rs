// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::env;

/// Onboarding core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Zoho Creator credentials and report coordinates
    pub zoho: ZohoConfig,
    /// Stripe API settings
    pub stripe: StripeConfig,
    /// PandaDoc API settings
    pub pandadoc: PandaDocConfig,
    /// Calendly webhook signing key
    pub calendly_signing_key: Option<String>,
    /// Slack incoming webhook URL for alerts
    pub slack_webhook_url: Option<String>,
    /// Complete the agreement step on load when the document is already signed
    pub auto_complete_signed: bool,
}

/// Zoho Creator configuration.
#[derive(Debug, Clone)]
pub struct ZohoConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub creator_url: String,
    pub accounts_url: String,
    pub application_name: String,
    pub report_name: String,
    pub account_owner_name: String,
}

/// Stripe configuration.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
    pub webhook_secret: Option<String>,
    pub currency: String,
    /// Base URL the hosted checkout redirects back to
    pub frontend_url: String,
}

/// PandaDoc configuration.
#[derive(Debug, Clone)]
pub struct PandaDocConfig {
    pub api_key: String,
    pub api_base: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `ONBOARDING_DATABASE_URL`: PostgreSQL or SQLite connection string
    /// - `ZOHO_CLIENT_ID`, `ZOHO_CLIENT_SECRET`, `ZOHO_REFRESH_TOKEN`
    /// - `STRIPE_SECRET_KEY`
    /// - `PANDADOC_API_KEY`
    ///
    /// Optional (with defaults):
    /// - `ZOHO_CREATOR_URL` (default: https://www.zohoapis.com)
    /// - `ZOHO_ACCOUNTS_URL` (default: https://accounts.zoho.com)
    /// - `ZOHO_CREATOR_APPLICATION_NAME` (default: client-onboarding)
    /// - `ZOHO_CREATOR_REPORT_NAME` (default: Onboardings_Report)
    /// - `ZOHO_ACCOUNT_OWNER_NAME` (default: thewellrecruiting)
    /// - `STRIPE_API_BASE` (default: https://api.stripe.com)
    /// - `STRIPE_CURRENCY` (default: usd)
    /// - `STRIPE_WEBHOOK_SECRET`, `CALENDLY_WEBHOOK_SIGNING_KEY`: webhooks are
    ///   rejected while unset
    /// - `PANDADOC_API_BASE` (default: https://api.pandadoc.com/public/v1)
    /// - `FRONTEND_URL` (default: http://localhost:8080)
    /// - `SLACK_WEBHOOK_URL`: alerts are skipped while unset
    /// - `ONBOARDING_AUTO_COMPLETE_SIGNED` (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("ONBOARDING_DATABASE_URL")?;
        if !database_url.starts_with("sqlite:")
            && !database_url.starts_with("postgres:")
            && !database_url.starts_with("postgresql:")
        {
            return Err(ConfigError::Invalid(
                "ONBOARDING_DATABASE_URL",
                "must start with sqlite: or postgres:",
            ));
        }

        let zoho = ZohoConfig {
            client_id: required("ZOHO_CLIENT_ID")?,
            client_secret: required("ZOHO_CLIENT_SECRET")?,
            refresh_token: required("ZOHO_REFRESH_TOKEN")?,
            creator_url: or_default("ZOHO_CREATOR_URL", "https://www.zohoapis.com"),
            accounts_url: or_default("ZOHO_ACCOUNTS_URL", "https://accounts.zoho.com"),
            application_name: or_default("ZOHO_CREATOR_APPLICATION_NAME", "client-onboarding"),
            report_name: or_default("ZOHO_CREATOR_REPORT_NAME", "Onboardings_Report"),
            account_owner_name: or_default("ZOHO_ACCOUNT_OWNER_NAME", "thewellrecruiting"),
        };

        let stripe = StripeConfig {
            secret_key: required("STRIPE_SECRET_KEY")?,
            api_base: or_default("STRIPE_API_BASE", "https://api.stripe.com"),
            webhook_secret: optional("STRIPE_WEBHOOK_SECRET"),
            currency: or_default("STRIPE_CURRENCY", "usd").to_lowercase(),
            frontend_url: or_default("FRONTEND_URL", "http://localhost:8080"),
        };

        let pandadoc = PandaDocConfig {
            api_key: required("PANDADOC_API_KEY")?,
            api_base: or_default("PANDADOC_API_BASE", "https://api.pandadoc.com/public/v1"),
        };

        let auto_complete_signed = match optional("ONBOARDING_AUTO_COMPLETE_SIGNED") {
            None => true,
            Some(value) => parse_bool(&value).ok_or(ConfigError::Invalid(
                "ONBOARDING_AUTO_COMPLETE_SIGNED",
                "must be true or false",
            ))?,
        };

        Ok(Self {
            database_url,
            zoho,
            stripe,
            pandadoc,
            calendly_signing_key: optional("CALENDLY_WEBHOOK_SIGNING_KEY"),
            slack_webhook_url: optional("SLACK_WEBHOOK_URL"),
            auto_complete_signed,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn or_default(key: &str, default: &str) -> String {
    optional(key)
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|| default.to_string())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    const OPTIONAL_KEYS: &[&str] = &[
        "ZOHO_CREATOR_URL",
        "ZOHO_ACCOUNTS_URL",
        "ZOHO_CREATOR_APPLICATION_NAME",
        "ZOHO_CREATOR_REPORT_NAME",
        "ZOHO_ACCOUNT_OWNER_NAME",
        "STRIPE_API_BASE",
        "STRIPE_WEBHOOK_SECRET",
        "STRIPE_CURRENCY",
        "PANDADOC_API_BASE",
        "FRONTEND_URL",
        "CALENDLY_WEBHOOK_SIGNING_KEY",
        "SLACK_WEBHOOK_URL",
        "ONBOARDING_AUTO_COMPLETE_SIGNED",
    ];

    fn set_required(guard: &mut EnvGuard) {
        guard.set("ONBOARDING_DATABASE_URL", "sqlite::memory:");
        guard.set("ZOHO_CLIENT_ID", "client-id");
        guard.set("ZOHO_CLIENT_SECRET", "client-secret");
        guard.set("ZOHO_REFRESH_TOKEN", "refresh-token");
        guard.set("STRIPE_SECRET_KEY", "sk_test_123");
        guard.set("PANDADOC_API_KEY", "pd-key");
        for key in OPTIONAL_KEYS {
            guard.remove(key);
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.zoho.creator_url, "https://www.zohoapis.com");
        assert_eq!(config.zoho.accounts_url, "https://accounts.zoho.com");
        assert_eq!(config.zoho.report_name, "Onboardings_Report");
        assert_eq!(config.stripe.api_base, "https://api.stripe.com");
        assert_eq!(config.stripe.currency, "usd");
        assert!(config.stripe.webhook_secret.is_none());
        assert!(config.slack_webhook_url.is_none());
        assert!(config.auto_complete_signed);
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);
        guard.remove("ONBOARDING_DATABASE_URL");

        let result = Config::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Missing("ONBOARDING_DATABASE_URL"))
        ));
    }

    #[test]
    fn test_config_missing_provider_key() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);
        guard.remove("STRIPE_SECRET_KEY");

        let result = Config::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Missing("STRIPE_SECRET_KEY"))
        ));
    }

    #[test]
    fn test_config_rejects_unknown_database_scheme() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);
        guard.set("ONBOARDING_DATABASE_URL", "mysql://localhost/onboarding");

        let result = Config::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid("ONBOARDING_DATABASE_URL", _))
        ));
    }

    #[test]
    fn test_config_auto_complete_flag() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);

        guard.set("ONBOARDING_AUTO_COMPLETE_SIGNED", "false");
        assert!(!Config::from_env().unwrap().auto_complete_signed);

        guard.set("ONBOARDING_AUTO_COMPLETE_SIGNED", "maybe");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("ONBOARDING_AUTO_COMPLETE_SIGNED", _))
        ));
    }

    #[test]
    fn test_config_trims_trailing_slash_and_lowercases_currency() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);
        guard.set("STRIPE_API_BASE", "http://localhost:12111/");
        guard.set("STRIPE_CURRENCY", "EUR");
        guard.set("STRIPE_WEBHOOK_SECRET", "whsec_abc");

        let config = Config::from_env().unwrap();
        assert_eq!(config.stripe.api_base, "http://localhost:12111");
        assert_eq!(config.stripe.currency, "eur");
        assert_eq!(config.stripe.webhook_secret.as_deref(), Some("whsec_abc"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("2"), None);
    }
}
