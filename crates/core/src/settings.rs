//! Engine configuration, loaded from a `memo.toml` settings file
//!
//! This mirrors the host application's config-file convention: a settings
//! record is read once at startup, and a commented default file is written
//! out if none exists yet.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Name of the settings file placed in the application's config directory.
pub const SETTINGS_FILE_NAME: &str = "memo.toml";

/// A byte or millisecond bound that may be infinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// A concrete bound.
    Bounded(u64),
    /// No bound at all.
    Unbounded,
}

impl Threshold {
    /// `true` if `value` is at or past this bound. Always `false` for `Unbounded`.
    pub fn exceeded_by(&self, value: u64) -> bool {
        match self {
            Threshold::Bounded(limit) => value > *limit,
            Threshold::Unbounded => false,
        }
    }
}

impl Serialize for Threshold {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Threshold::Bounded(v) => serializer.serialize_u64(*v),
            Threshold::Unbounded => serializer.serialize_str("infinity"),
        }
    }
}

impl<'de> Deserialize<'de> for Threshold {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Num(u64),
            Word(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Num(n) => Ok(Threshold::Bounded(n)),
            Repr::Word(w) if w.eq_ignore_ascii_case("infinity") => Ok(Threshold::Unbounded),
            Repr::Word(w) => Err(serde::de::Error::custom(format!(
                "expected an integer or \"infinity\", got '{w}'"
            ))),
        }
    }
}

/// Which concrete [`CacheStrategy`](../../memo_engine/trait.CacheStrategy.html) an engine instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategyKind {
    /// Per-entry TTL, no byte accounting.
    Default,
    /// Byte-bounded LRU with optional per-entry TTL.
    Eviction,
}

fn default_strategy() -> CacheStrategyKind {
    CacheStrategyKind::Default
}

fn default_max_threshold() -> Threshold {
    Threshold::Unbounded
}

fn default_max_waiters() -> i64 {
    64
}

fn default_expires_in() -> Threshold {
    Threshold::Unbounded
}

/// The configuration record consumed when an engine is constructed.
///
/// # Example
///
/// ```toml
/// cache_strategy = "eviction"
/// max_threshold = 16777216
/// min_threshold = 8388608
/// max_waiters = 64
/// waiter_sleep_ms = 5
/// default_expires_in = "infinity"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Selects the Default or Eviction strategy.
    #[serde(default = "default_strategy")]
    pub cache_strategy: CacheStrategyKind,
    /// Byte bound that triggers synchronous GC on insert, or infinite.
    #[serde(default = "default_max_threshold")]
    pub max_threshold: Threshold,
    /// Byte bound GC drains down to. Required when `max_threshold` is bounded.
    #[serde(default)]
    pub min_threshold: Option<u64>,
    /// Waiters permitted per running entry before new callers back off.
    /// Values `<= 0` are treated as `1`.
    #[serde(default = "default_max_waiters")]
    pub max_waiters: i64,
    /// How long an over-capacity waiter sleeps before re-dispatching.
    #[serde(default)]
    pub waiter_sleep_ms: u64,
    /// Default per-entry TTL used when a call site does not override it.
    #[serde(default = "default_expires_in")]
    pub default_expires_in: Threshold,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_strategy: default_strategy(),
            max_threshold: default_max_threshold(),
            min_threshold: None,
            max_waiters: default_max_waiters(),
            waiter_sleep_ms: 0,
            default_expires_in: default_expires_in(),
        }
    }
}

impl Settings {
    /// `max_waiters`, clamped to at least 1 per the design's tie-break rule.
    pub fn max_waiters(&self) -> usize {
        if self.max_waiters <= 0 {
            1
        } else {
            self.max_waiters as usize
        }
    }

    /// Check cross-field invariants not expressible through `serde(default)` alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.max_threshold, Threshold::Bounded(_)) && self.min_threshold.is_none() {
            return Err(ConfigError::MissingMinThreshold);
        }
        Ok(())
    }

    /// The default config file content with explanatory comments.
    pub fn default_toml() -> &'static str {
        r#"# Concurrent memoization engine configuration
#
# Cache strategy: "default" (per-entry TTL) or "eviction" (byte-bounded LRU)
cache_strategy = "default"

# Byte bound that triggers a synchronous GC before an over-threshold insert.
# Use "infinity" to disable (the default).
max_threshold = "infinity"

# Byte bound GC drains down to. Required only when max_threshold is bounded.
# min_threshold = 8388608

# Waiters allowed to queue behind one running computation before new callers
# back off and retry instead of joining. Values <= 0 are treated as 1.
max_waiters = 64

# Milliseconds an over-capacity caller sleeps before re-dispatching.
waiter_sleep_ms = 0

# Default per-entry TTL in milliseconds, or "infinity" to disable.
default_expires_in = "infinity"
"#
    }

    /// Read and validate settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Write the default settings file if one does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Which backing-store variant a `get_or_run` call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheSelection {
    /// The in-memory, process-lifetime table (the common case).
    #[default]
    Primary,
    /// The process-global named-value store.
    Persistent,
}

/// Per-call overrides passed to `get_or_run`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Which backing-store variant to use for this call.
    pub cache: CacheSelection,
    /// Per-entry TTL override in milliseconds. `None` defers to `Settings::default_expires_in`.
    pub expires_in_ms: Option<u64>,
    /// Under the Eviction strategy, suppresses read-history recording so this
    /// entry is exempt from LRU ranking (still subject to explicit invalidation).
    pub permanent: bool,
}
