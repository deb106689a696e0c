//! Configuration options for rowcache.

use std::collections::HashMap;
use std::time::Duration;

use crate::clock::{Tick, TICKS_PER_SECOND};

/// Default interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum accepted sweep interval.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Default percentage below a limit that an eviction trims to.
pub const DEFAULT_EVICTION_HEADROOM_PERCENT: u8 = 10;

/// Largest accepted eviction headroom.
pub const MAX_EVICTION_HEADROOM_PERCENT: u8 = 90;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;

/// Bounds applied to one table.
///
/// Unset fields are unbounded. Per-table limits fall back field by field to
/// the database defaults in [`CacheOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheLimits {
    /// Maximum number of cached rows.
    pub max_rows: Option<u64>,
    /// Maximum estimated bytes of cached rows.
    pub max_bytes: Option<u64>,
    /// Maximum age of a row, in ticks since insertion.
    pub max_age: Option<Tick>,
}

impl CacheLimits {
    /// Limits with nothing set.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Limit the row count.
    pub fn max_rows(mut self, rows: u64) -> Self {
        self.max_rows = Some(rows);
        self
    }

    /// Limit the byte estimate.
    pub fn max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = Some(bytes);
        self
    }

    /// Limit the byte estimate in kilobytes.
    pub fn max_kilobytes(self, kb: u64) -> Self {
        self.max_bytes(kb.saturating_mul(KB))
    }

    /// Limit the byte estimate in megabytes.
    pub fn max_megabytes(self, mb: u64) -> Self {
        self.max_bytes(mb.saturating_mul(MB))
    }

    /// Limit row age.
    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(Tick::from_duration(age));
        self
    }

    /// Limit row age in raw ticks.
    pub fn max_age_ticks(mut self, ticks: u64) -> Self {
        self.max_age = Some(Tick(ticks));
        self
    }

    /// Limit row age in seconds.
    pub fn max_age_seconds(self, seconds: u64) -> Self {
        self.max_age_ticks(seconds.saturating_mul(TICKS_PER_SECOND))
    }

    /// Limit row age in minutes.
    pub fn max_age_minutes(self, minutes: u64) -> Self {
        self.max_age_seconds(minutes.saturating_mul(60))
    }

    /// Limit row age in hours.
    pub fn max_age_hours(self, hours: u64) -> Self {
        self.max_age_minutes(hours.saturating_mul(60))
    }

    /// Check if no limit is set.
    pub fn is_unbounded(&self) -> bool {
        self.max_rows.is_none() && self.max_bytes.is_none() && self.max_age.is_none()
    }

    /// Fill unset fields from `defaults`.
    pub fn or(self, defaults: &CacheLimits) -> Self {
        Self {
            max_rows: self.max_rows.or(defaults.max_rows),
            max_bytes: self.max_bytes.or(defaults.max_bytes),
            max_age: self.max_age.or(defaults.max_age),
        }
    }

    fn validate(&self, scope: &str) -> crate::Result<()> {
        if self.max_rows == Some(0) {
            return Err(crate::Error::InvalidConfiguration(format!(
                "{}: max_rows must be at least 1",
                scope
            )));
        }
        if self.max_bytes == Some(0) {
            return Err(crate::Error::InvalidConfiguration(format!(
                "{}: max_bytes must be at least 1",
                scope
            )));
        }
        if self.max_age == Some(Tick::ZERO) {
            return Err(crate::Error::InvalidConfiguration(format!(
                "{}: max_age must be at least one tick",
                scope
            )));
        }
        Ok(())
    }
}

/// Cache configuration options.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Limits applied to every table without its own override.
    pub default_limits: CacheLimits,

    /// Per-table overrides, keyed by table name.
    pub table_limits: HashMap<String, CacheLimits>,

    /// Interval between background sweeps (None disables the sweeper).
    pub sweep_interval: Option<Duration>,

    /// Enforce row and byte limits right after each upsert.
    pub enforce_on_upsert: bool,

    /// How far below a row or byte limit an eviction trims, in percent.
    pub eviction_headroom_percent: u8,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            default_limits: CacheLimits::unbounded(),
            table_limits: HashMap::new(),
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
            enforce_on_upsert: true,
            eviction_headroom_percent: DEFAULT_EVICTION_HEADROOM_PERCENT,
        }
    }
}

impl CacheOptions {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective limits for a table.
    pub fn limits_for(&self, table: &str) -> CacheLimits {
        match self.table_limits.get(table) {
            Some(limits) => limits.or(&self.default_limits),
            None => self.default_limits,
        }
    }

    /// Validate the options.
    pub fn validate(&self) -> crate::Result<()> {
        self.default_limits.validate("default limits")?;
        for (table, limits) in &self.table_limits {
            limits.validate(table)?;
        }

        if let Some(interval) = self.sweep_interval {
            if interval < MIN_SWEEP_INTERVAL {
                return Err(crate::Error::InvalidConfiguration(format!(
                    "sweep_interval must be at least {:?}",
                    MIN_SWEEP_INTERVAL
                )));
            }
        }

        if self.eviction_headroom_percent > MAX_EVICTION_HEADROOM_PERCENT {
            return Err(crate::Error::InvalidConfiguration(format!(
                "eviction_headroom_percent cannot exceed {}",
                MAX_EVICTION_HEADROOM_PERCENT
            )));
        }

        Ok(())
    }
}

/// Builder for CacheOptions.
#[derive(Debug, Clone, Default)]
pub struct OptionsBuilder {
    options: CacheOptions,
}

impl OptionsBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database-wide default limits.
    pub fn default_limits(mut self, limits: CacheLimits) -> Self {
        self.options.default_limits = limits;
        self
    }

    /// Override limits for one table.
    pub fn table_limits(mut self, table: impl Into<String>, limits: CacheLimits) -> Self {
        self.options.table_limits.insert(table.into(), limits);
        self
    }

    /// Set the background sweep interval.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.options.sweep_interval = Some(interval);
        self
    }

    /// Disable the background sweeper.
    pub fn no_sweeper(mut self) -> Self {
        self.options.sweep_interval = None;
        self
    }

    /// Set whether limits are enforced after each upsert.
    pub fn enforce_on_upsert(mut self, value: bool) -> Self {
        self.options.enforce_on_upsert = value;
        self
    }

    /// Set eviction headroom.
    pub fn eviction_headroom_percent(mut self, percent: u8) -> Self {
        self.options.eviction_headroom_percent = percent;
        self
    }

    /// Build the options.
    pub fn build(self) -> crate::Result<CacheOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}
