//! Startup settings: TOML file plus command-line overrides

use std::path::{Path, PathBuf};

use anyhow::Context;
use att_filter_core::FilterSettings;
use tracing::debug;

/// Settings file looked up when none is given on the command line
pub const DEFAULT_SETTINGS_FILE: &str = "att_filter.toml";

/// Switches that force a flag on regardless of the settings file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagOverrides {
    pub fix_headers: bool,
    pub trace_inbound: bool,
    pub trace_outbound: bool,
}

impl FlagOverrides {
    pub fn apply(&self, settings: &mut FilterSettings) {
        settings.fix_headers |= self.fix_headers;
        settings.trace_inbound |= self.trace_inbound;
        settings.trace_outbound |= self.trace_outbound;
    }
}

/// Load settings from a file, or return defaults if it does not exist
pub fn load(path: &Path) -> anyhow::Result<FilterSettings> {
    if !path.exists() {
        debug!("No settings file at {}, using defaults", path.display());
        return Ok(FilterSettings::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    let settings: FilterSettings = toml::from_str(&content)
        .with_context(|| format!("Invalid settings file {}", path.display()))?;
    debug!("Loaded settings from {}: {:?}", path.display(), settings);
    Ok(settings)
}

/// Settings the filter should start with
pub fn resolve(path: Option<&Path>, overrides: FlagOverrides) -> anyhow::Result<FilterSettings> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let mut settings = load(&path)?;
    overrides.apply(&mut settings);
    Ok(settings)
}

/// Render settings in file form
pub fn to_toml(settings: &FilterSettings) -> anyhow::Result<String> {
    toml::to_string_pretty(settings).context("Failed to serialize settings")
}
