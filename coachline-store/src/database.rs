use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;
use serde_json::Value;

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    rule_key: String,
    rule_value: Value,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Applies `business_rules` rows (`{"value": <number>}`) on top of the
    /// file configuration.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<RuleRow> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for row in rows {
            if let Some(v) = row.rule_value.get("value") {
                apply_rule(&mut rules, &row.rule_key, v);
            }
        }
        Ok(rules)
    }
}

/// Longest time window a rule may configure.
const MAX_WINDOW_SECONDS: i64 = 365 * 24 * 3600;

fn apply_rule(rules: &mut BusinessRules, key: &str, v: &Value) {
    let window = |v: &Value| v.as_i64().filter(|n| (1..=MAX_WINDOW_SECONDS).contains(n));
    let accepted = match key {
        "hold_seconds" => window(v).map(|n| rules.hold_seconds = n),
        "cancellation_cutoff_seconds" => window(v).map(|n| rules.cancellation_cutoff_seconds = n),
        "reveal_window_seconds" => window(v).map(|n| rules.reveal_window_seconds = n),
        "reminder_lead_seconds" => window(v).map(|n| rules.reminder_lead_seconds = n),
        "sweep_interval_seconds" => v
            .as_u64()
            .filter(|n| (1..=86_400).contains(n))
            .map(|n| rules.sweep_interval_seconds = n),
        "lock_timeout_ms" => v
            .as_u64()
            .filter(|n| (1..=60_000).contains(n))
            .map(|n| rules.lock_timeout_ms = n),
        "rate_limit_per_minute" => v
            .as_i64()
            .filter(|n| *n >= 1)
            .map(|n| rules.rate_limit_per_minute = n),
        other => {
            tracing::warn!(rule = other, "Ignoring unknown business rule");
            return;
        }
    };
    if accepted.is_none() {
        tracing::warn!(rule = key, value = %v, "Ignoring out-of-range business rule");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_rows_override_file_values() {
        let mut rules = BusinessRules::default();
        apply_rule(&mut rules, "hold_seconds", &json!(600));
        apply_rule(&mut rules, "reveal_window_seconds", &json!("soon"));
        apply_rule(&mut rules, "tax_rate", &json!(0.2));

        assert_eq!(rules.hold_seconds, 600);
        assert_eq!(rules.reveal_window_seconds, 18000);
    }

    #[test]
    fn test_out_of_range_rules_are_ignored() {
        let mut rules = BusinessRules::default();
        apply_rule(&mut rules, "sweep_interval_seconds", &json!(0));
        apply_rule(&mut rules, "hold_seconds", &json!(-5));
        apply_rule(&mut rules, "cancellation_cutoff_seconds", &json!(i64::MAX));
        apply_rule(&mut rules, "lock_timeout_ms", &json!(0));
        apply_rule(&mut rules, "rate_limit_per_minute", &json!(0));

        assert_eq!(rules, BusinessRules::default());

        apply_rule(&mut rules, "sweep_interval_seconds", &json!(60));
        assert_eq!(rules.sweep_interval_seconds, 60);
    }
}
