//! # Queue Core Configuration
//!
//! Typed configuration for the queue engine, loaded through the `config` crate
//! from optional TOML files plus environment overrides.
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults
//! 2. `config/queue-core.toml`
//! 3. `config/<environment>.toml`
//! 4. `QUEUE__<SECTION>__<KEY>` environment variables
//! 5. `DATABASE_URL`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use queue_core::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::from_env().load()?;
//! let calendar = config.calendar()?;
//! println!("business day today: {}", calendar.today().date);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::calendar::BusinessCalendar;
use crate::events::DispatcherConfig;
use crate::scheduler::SchedulerConfig;
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub database: DatabaseConfig,
    pub queue: QueueSettings,
    pub scheduler: SchedulerSettings,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Apply pending migrations on startup
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/queue_core_development".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 30,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Minutes per customer used for wait estimates
    pub average_service_minutes: i64,
    /// Fixed UTC offset of the outlet, e.g. `+08:00`
    pub timezone_offset: String,
    /// Display name reported by the scheduler status
    pub timezone_label: String,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            average_service_minutes: crate::queue::DEFAULT_AVERAGE_SERVICE_MINUTES,
            timezone_offset: "+08:00".to_string(),
            timezone_label: "Asia/Manila".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub reset_hour: u32,
    pub reset_minute: u32,
    pub retry_delay_secs: u64,
    /// Three-letter or full English weekday name
    pub cleanup_weekday: String,
    pub cleanup_hour: u32,
    pub retention_days: i64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            reset_hour: 0,
            reset_minute: 0,
            retry_delay_secs: 300,
            cleanup_weekday: "Sun".to_string(),
            cleanup_hour: 2,
            retention_days: 365,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub delivery_timeout_ms: u64,
    pub broadcast_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: 5000,
            broadcast_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: Option<String>,
}

impl QueueConfig {
    /// Validate the loaded configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "database.url",
                "database configuration",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "pool size must be greater than 0",
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigurationError::invalid_value(
                "database.min_connections",
                self.database.min_connections.to_string(),
                "must not exceed max_connections",
            ));
        }

        if self.queue.average_service_minutes <= 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.average_service_minutes",
                self.queue.average_service_minutes.to_string(),
                "must be positive",
            ));
        }

        self.calendar()?;
        self.scheduler_config()?;

        if self.events.delivery_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.delivery_timeout_ms",
                "0",
                "timeout must be greater than 0",
            ));
        }

        if self.events.broadcast_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.broadcast_capacity",
                "0",
                "capacity must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn calendar(&self) -> ConfigResult<BusinessCalendar> {
        BusinessCalendar::from_offset_str(&self.queue.timezone_offset, &self.queue.timezone_label)
            .map_err(|e| {
                ConfigurationError::invalid_value(
                    "queue.timezone_offset",
                    &self.queue.timezone_offset,
                    e.to_string(),
                )
            })
    }

    pub fn scheduler_config(&self) -> ConfigResult<SchedulerConfig> {
        let settings = &self.scheduler;

        if settings.reset_hour > 23 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.reset_hour",
                settings.reset_hour.to_string(),
                "hour must be 0-23",
            ));
        }
        if settings.reset_minute > 59 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.reset_minute",
                settings.reset_minute.to_string(),
                "minute must be 0-59",
            ));
        }
        if settings.cleanup_hour > 23 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.cleanup_hour",
                settings.cleanup_hour.to_string(),
                "hour must be 0-23",
            ));
        }
        if settings.retention_days <= 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.retention_days",
                settings.retention_days.to_string(),
                "retention must be at least one day",
            ));
        }

        let cleanup_weekday = settings.cleanup_weekday.parse::<Weekday>().map_err(|_| {
            ConfigurationError::invalid_value(
                "scheduler.cleanup_weekday",
                &settings.cleanup_weekday,
                "expected a weekday name such as Sun or Sunday",
            )
        })?;

        Ok(SchedulerConfig {
            reset_hour: settings.reset_hour,
            reset_minute: settings.reset_minute,
            retry_delay: Duration::from_secs(settings.retry_delay_secs),
            cleanup_weekday,
            cleanup_hour: settings.cleanup_hour,
            retention_days: settings.retention_days,
        })
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            delivery_timeout: Duration::from_millis(self.events.delivery_timeout_ms),
            correlation_id: None,
        }
    }
}
