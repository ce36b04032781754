#![forbid(unsafe_code)]

//! Runtime configuration read from the environment.
//!
//! The only knob today is the unbound-binding tracker (see [`crate::leak`]).
//! Values are read once per thread, the first time the tracker is touched;
//! explicit calls to [`crate::leak::enable`] / [`crate::leak::disable`] win
//! over the environment.

use std::env;

/// Environment variable that turns on unbound-binding tracking.
pub const TRACK_UNBOUND_ENV: &str = "HOOKWIRE_TRACK_UNBOUND";

/// Process-wide runtime switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Record bindings that were created but never bound to an owner.
    pub track_unbound: bool,
}

impl RuntimeConfig {
    /// Read configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let track = env::var(TRACK_UNBOUND_ENV).ok();
        Self::from_vars(track.as_deref())
    }

    /// Build configuration from raw variable values. Unset or unparseable
    /// values fall back to the defaults.
    #[must_use]
    pub fn from_vars(track_unbound: Option<&str>) -> Self {
        Self {
            track_unbound: track_unbound.and_then(parse_flag).unwrap_or(false),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw == "1"
        || raw.eq_ignore_ascii_case("true")
        || raw.eq_ignore_ascii_case("on")
        || raw.eq_ignore_ascii_case("yes")
    {
        Some(true)
    } else if raw == "0"
        || raw.eq_ignore_ascii_case("false")
        || raw.eq_ignore_ascii_case("off")
        || raw.eq_ignore_ascii_case("no")
    {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_defaults_to_disabled() {
        assert_eq!(RuntimeConfig::from_vars(None), RuntimeConfig::default());
    }

    #[test]
    fn truthy_values_enable_tracking() {
        for raw in ["1", "true", "ON", " yes "] {
            assert!(RuntimeConfig::from_vars(Some(raw)).track_unbound, "{raw}");
        }
    }

    #[test]
    fn falsy_and_garbage_values_disable_tracking() {
        for raw in ["0", "false", "off", "maybe", ""] {
            assert!(!RuntimeConfig::from_vars(Some(raw)).track_unbound, "{raw}");
        }
    }
}
