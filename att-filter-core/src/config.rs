//! Filter configuration: runtime flags and startup settings
//!
//! `ConfigFlags` is the process-wide store the control channel writes and every
//! pipeline pass reads. Reads and writes are relaxed atomics: a toggle becomes
//! visible to passes that start after it, and a pass already running keeps the
//! view it snapshotted.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::Direction;

/// The three independently togglable flags
#[derive(Debug, Default)]
pub struct ConfigFlags {
    fix_headers: AtomicBool,
    trace_inbound: AtomicBool,
    trace_outbound: AtomicBool,
}

impl ConfigFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &FilterSettings) -> Self {
        Self {
            fix_headers: AtomicBool::new(settings.fix_headers),
            trace_inbound: AtomicBool::new(settings.trace_inbound),
            trace_outbound: AtomicBool::new(settings.trace_outbound),
        }
    }

    pub fn set_fix_headers(&self, on: bool) {
        self.fix_headers.store(on, Ordering::Relaxed);
    }

    pub fn set_trace_inbound(&self, on: bool) {
        self.trace_inbound.store(on, Ordering::Relaxed);
    }

    pub fn set_trace_outbound(&self, on: bool) {
        self.trace_outbound.store(on, Ordering::Relaxed);
    }

    /// Read all three flags once, for the duration of one pass
    pub fn snapshot(&self) -> FlagSnapshot {
        FlagSnapshot {
            fix_headers: self.fix_headers.load(Ordering::Relaxed),
            trace_inbound: self.trace_inbound.load(Ordering::Relaxed),
            trace_outbound: self.trace_outbound.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `ConfigFlags`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagSnapshot {
    pub fix_headers: bool,
    pub trace_inbound: bool,
    pub trace_outbound: bool,
}

impl FlagSnapshot {
    /// Whether data dumps are enabled for this direction
    pub fn traces(&self, direction: Direction) -> bool {
        match direction {
            Direction::In => self.trace_inbound,
            Direction::Out => self.trace_outbound,
        }
    }
}

/// How requests are handed to the lower layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForwardMode {
    /// Regain control on completion so responses can be inspected
    #[default]
    WithCompletion,
    /// Hand the request down and never see it again
    SendAndForget,
}

/// Startup settings, typically read from a TOML file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub fix_headers: bool,
    pub trace_inbound: bool,
    pub trace_outbound: bool,
    pub forward_mode: ForwardMode,
}

impl FilterSettings {
    /// Settings with the given flags and the default forward mode
    pub fn with_flags(fix_headers: bool, trace_inbound: bool, trace_outbound: bool) -> Self {
        Self {
            fix_headers,
            trace_inbound,
            trace_outbound,
            forward_mode: ForwardMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_default_off() {
        let flags = ConfigFlags::new();
        assert_eq!(flags.snapshot(), FlagSnapshot::default());
    }

    #[test]
    fn test_flags_toggle_independently() {
        let flags = ConfigFlags::new();
        flags.set_trace_inbound(true);
        let snap = flags.snapshot();
        assert!(snap.trace_inbound);
        assert!(!snap.trace_outbound);
        assert!(!snap.fix_headers);
        assert!(snap.traces(Direction::In));
        assert!(!snap.traces(Direction::Out));

        flags.set_fix_headers(true);
        flags.set_trace_inbound(false);
        let snap = flags.snapshot();
        assert!(snap.fix_headers);
        assert!(!snap.trace_inbound);
    }

    #[test]
    fn test_snapshot_is_not_retroactive() {
        let flags = ConfigFlags::new();
        let before = flags.snapshot();
        flags.set_fix_headers(true);
        assert!(!before.fix_headers);
        assert!(flags.snapshot().fix_headers);
    }

    #[test]
    fn test_settings_toml_partial() {
        let settings: FilterSettings = toml::from_str("fix_headers = true").unwrap();
        assert!(settings.fix_headers);
        assert!(!settings.trace_inbound);
        assert_eq!(settings.forward_mode, ForwardMode::WithCompletion);
    }

    #[test]
    fn test_settings_toml_forward_mode() {
        let settings: FilterSettings =
            toml::from_str("forward_mode = \"send-and-forget\"\ntrace_outbound = true").unwrap();
        assert_eq!(settings.forward_mode, ForwardMode::SendAndForget);
        assert!(settings.trace_outbound);

        let flags = ConfigFlags::from_settings(&settings);
        assert!(flags.snapshot().trace_outbound);
    }
}
