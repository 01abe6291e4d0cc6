//! Configuration management for the support desk service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Call `dotenvy::dotenv()` first to pick up a local `.env` file.

use crate::workflow::{SlaPolicy, WorkflowPolicy};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Secret used when `AUTH_JWT_SECRET` is unset. Development only.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-in-production";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Event journal configuration
    pub database: DatabaseConfig,
    /// Token validation
    pub auth: AuthConfig,
    /// Ticket numbering and escalation
    pub workflow: WorkflowPolicy,
    /// Attachment storage
    pub attachments: AttachmentConfig,
    /// Store runtime tuning
    pub store: StoreSettings,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log filter (trace, debug, info, warn, error or a directive list)
    pub log_level: String,
    /// Prometheus exporter port; 0 disables the exporter
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
    /// How long a request waits for its command reply, in milliseconds
    pub request_timeout_ms: u64,
}

impl ServerConfig {
    /// `host:port` for the API listener
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Graceful shutdown timeout
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    /// Command reply timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// `PostgreSQL` journal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL; the in-memory journal is used when absent
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for access tokens
    pub jwt_secret: String,
    /// Accepted clock skew in seconds
    pub jwt_leeway: u64,
}

/// Attachment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Directory for stored files
    pub dir: PathBuf,
    /// Largest accepted upload in bytes
    pub max_bytes: usize,
}

/// Store runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Actions buffered for reply waiters
    pub broadcast_capacity: usize,
    /// Journal batches kept after exhausting retries
    pub dlq_max_size: usize,
    /// Attempts per journal append
    pub journal_max_retries: u32,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    ///
    /// Missing or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_source<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let defaults = WorkflowPolicy::default();
        let sla = SlaPolicy::default();

        Self {
            server: ServerConfig {
                host: or("HOST", "0.0.0.0"),
                port: parsed(&get, "PORT", 8080),
                log_level: or("RUST_LOG", "info"),
                metrics_port: parsed(&get, "METRICS_PORT", 9090),
                shutdown_timeout: parsed(&get, "SHUTDOWN_TIMEOUT", 30),
                request_timeout_ms: parsed(&get, "REQUEST_TIMEOUT_MS", 5000),
            },
            database: DatabaseConfig {
                url: get("DATABASE_URL").filter(|url| !url.trim().is_empty()),
                max_connections: parsed(&get, "DATABASE_MAX_CONNECTIONS", 10),
            },
            auth: AuthConfig {
                jwt_secret: or("AUTH_JWT_SECRET", DEV_JWT_SECRET),
                jwt_leeway: parsed(&get, "AUTH_JWT_LEEWAY", 30),
            },
            workflow: WorkflowPolicy {
                ticket_number_prefix: or("TICKET_NUMBER_PREFIX", &defaults.ticket_number_prefix),
                max_escalation_level: parsed(
                    &get,
                    "TICKET_MAX_ESCALATION_LEVEL",
                    defaults.max_escalation_level,
                ),
                sla: SlaPolicy {
                    low_hours: parsed(&get, "SLA_LOW_HOURS", sla.low_hours),
                    medium_hours: parsed(&get, "SLA_MEDIUM_HOURS", sla.medium_hours),
                    high_hours: parsed(&get, "SLA_HIGH_HOURS", sla.high_hours),
                    urgent_hours: parsed(&get, "SLA_URGENT_HOURS", sla.urgent_hours),
                    critical_hours: parsed(&get, "SLA_CRITICAL_HOURS", sla.critical_hours),
                },
            },
            attachments: AttachmentConfig {
                dir: PathBuf::from(or("ATTACHMENT_DIR", "./data/attachments")),
                max_bytes: parsed(&get, "ATTACHMENT_MAX_BYTES", 10 * 1024 * 1024),
            },
            store: StoreSettings {
                broadcast_capacity: parsed(&get, "STORE_BROADCAST_CAPACITY", 1024),
                dlq_max_size: parsed(&get, "STORE_DLQ_MAX_SIZE", 1000),
                journal_max_retries: parsed(&get, "JOURNAL_MAX_RETRIES", 5),
            },
        }
    }

    /// Whether the development JWT secret is in use
    #[must_use]
    pub fn uses_dev_secret(&self) -> bool {
        self.auth.jwt_secret == DEV_JWT_SECRET
    }
}

fn parsed<T, F>(get: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_source(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]);
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.server.metrics_port, 9090);
        assert_eq!(config.server.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.database.url, None);
        assert!(config.uses_dev_secret());
        assert_eq!(config.workflow, WorkflowPolicy::default());
        assert_eq!(config.attachments.max_bytes, 10_485_760);
        assert_eq!(config.store.journal_max_retries, 5);
    }

    #[test]
    fn values_are_read_from_the_source() {
        let config = config(&[
            ("PORT", "3000"),
            ("DATABASE_URL", "postgres://localhost/support"),
            ("TICKET_NUMBER_PREFIX", "SUP"),
            ("TICKET_MAX_ESCALATION_LEVEL", "5"),
            ("SLA_HIGH_HOURS", "12"),
            ("AUTH_JWT_SECRET", "s3cret"),
        ]);
        assert_eq!(config.server.port, 3000);
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://localhost/support")
        );
        assert_eq!(config.workflow.ticket_number(7), "SUP-000007");
        assert_eq!(config.workflow.max_escalation_level, 5);
        assert_eq!(config.workflow.sla.high_hours, 12);
        assert!(!config.uses_dev_secret());
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = config(&[("PORT", "eighty"), ("DATABASE_URL", "  ")]);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.url, None);
    }
}
