//! Error types surfaced by the engine and its configuration layer

use std::fmt;

/// Errors raised while loading or validating a [`crate::Settings`] record.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `min_threshold` must be supplied whenever `max_threshold` is bounded.
    #[error("min_threshold is required when max_threshold is bounded")]
    MissingMinThreshold,

    /// The settings file could not be read from disk.
    #[error("failed to read settings file '{path}': {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file did not parse as valid TOML.
    #[error("failed to parse settings file '{path}': {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// The outcome of [`get_or_run`](../../memo_engine/struct.Engine.html#method.get_or_run) when the thunk itself fails.
///
/// A thunk failure is never wrapped or reinterpreted: the original error value
/// the caller's closure produced is carried through unchanged in [`GetOrRunError::Thunk`].
/// Every other failure kind described by the design (runner crash, CAS loss, strategy
/// retry) is resolved internally by re-dispatching and is never surfaced here.
#[derive(Debug)]
pub enum GetOrRunError<E> {
    /// The thunk ran and returned `Err(e)`; `e` is preserved verbatim.
    Thunk(E),
}

impl<E: fmt::Debug> fmt::Display for GetOrRunError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GetOrRunError::Thunk(e) => write!(f, "thunk failed: {:?}", e),
        }
    }
}

impl<E: fmt::Debug> std::error::Error for GetOrRunError<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages() {
        assert_eq!(
            ConfigError::MissingMinThreshold.to_string(),
            "min_threshold is required when max_threshold is bounded"
        );
    }

    #[test]
    fn get_or_run_error_display_preserves_debug_form() {
        let err: GetOrRunError<&str> = GetOrRunError::Thunk("boom");
        assert_eq!(err.to_string(), "thunk failed: \"boom\"");
    }
}
