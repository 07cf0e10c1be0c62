//! Application configuration loaded from environment variables.

use chrono::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL connection string (in-memory store when unset)
/// - `PAYMENT_API_URL` / `PAYMENT_API_TOKEN` — payment gateway REST endpoint
/// - `DISPATCH_WEBHOOK_URL` — fulfillment provider order webhook
/// - `LOCK_TTL_SECONDS` — processing lock TTL (default: `300`)
/// - `WORKER_ID` — stable worker name (random when unset)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub payment_api_url: Option<String>,
    pub payment_api_token: Option<String>,
    pub dispatch_webhook_url: Option<String>,
    pub lock_ttl_seconds: i64,
    pub worker_id: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            payment_api_url: std::env::var("PAYMENT_API_URL").ok(),
            payment_api_token: std::env::var("PAYMENT_API_TOKEN").ok(),
            dispatch_webhook_url: std::env::var("DISPATCH_WEBHOOK_URL").ok(),
            lock_ttl_seconds: std::env::var("LOCK_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            worker_id: std::env::var("WORKER_ID").ok(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Processing lock TTL as a duration.
    pub fn lock_ttl(&self) -> Duration {
        Duration::seconds(self.lock_ttl_seconds)
    }

    /// Gateway endpoint and token, when both are configured.
    pub fn payment_api(&self) -> Option<(&str, &str)> {
        match (&self.payment_api_url, &self.payment_api_token) {
            (Some(url), Some(token)) => Some((url.as_str(), token.as_str())),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            payment_api_url: None,
            payment_api_token: None,
            dispatch_webhook_url: None,
            lock_ttl_seconds: 300,
            worker_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.lock_ttl_seconds, 300);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_lock_ttl_conversion() {
        let config = Config {
            lock_ttl_seconds: 60,
            ..Config::default()
        };
        assert_eq!(config.lock_ttl(), Duration::minutes(1));
    }

    #[test]
    fn test_payment_api_requires_url_and_token() {
        let mut config = Config {
            payment_api_url: Some("https://api.example.com".to_string()),
            ..Config::default()
        };
        assert!(config.payment_api().is_none());

        config.payment_api_token = Some("secret".to_string());
        assert_eq!(
            config.payment_api(),
            Some(("https://api.example.com", "secret"))
        );
    }
}
