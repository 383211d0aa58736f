use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

/// Time windows and limits of the booking flow. File values can be
/// overridden by rows of the `business_rules` table.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BusinessRules {
    #[serde(default = "default_hold_seconds")]
    pub hold_seconds: i64,
    #[serde(default = "default_cancellation_cutoff_seconds")]
    pub cancellation_cutoff_seconds: i64,
    #[serde(default = "default_reveal_window_seconds")]
    pub reveal_window_seconds: i64,
    #[serde(default = "default_reminder_lead_seconds")]
    pub reminder_lead_seconds: i64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: i64,
}

fn default_hold_seconds() -> i64 { 900 }
fn default_cancellation_cutoff_seconds() -> i64 { 7200 }
fn default_reveal_window_seconds() -> i64 { 18000 }
fn default_reminder_lead_seconds() -> i64 { 10800 }
fn default_sweep_interval_seconds() -> u64 { 300 }
fn default_lock_timeout_ms() -> u64 { 3000 }
fn default_rate_limit_per_minute() -> i64 { 120 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            hold_seconds: default_hold_seconds(),
            cancellation_cutoff_seconds: default_cancellation_cutoff_seconds(),
            reveal_window_seconds: default_reveal_window_seconds(),
            reminder_lead_seconds: default_reminder_lead_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            lock_timeout_ms: default_lock_timeout_ms(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    /// Shared secret the payment provider sends in `x-webhook-secret`.
    pub webhook_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,
}

fn default_notification_topic() -> String { "coachline.notifications".to_string() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `COACHLINE__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("COACHLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rules_fall_back_to_defaults() {
        let rules: BusinessRules = serde_json::from_str(r#"{"hold_seconds": 600}"#).unwrap();
        assert_eq!(rules.hold_seconds, 600);
        assert_eq!(rules.cancellation_cutoff_seconds, 7200);
        assert_eq!(rules.reveal_window_seconds, 18000);
        assert_eq!(rules.reminder_lead_seconds, 10800);
    }
}
