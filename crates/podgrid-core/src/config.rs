//! Agent configuration (podgrid.toml).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default delay between convergence ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Host-agent settings, loaded from a TOML file.
///
/// ```toml
/// host-hostname = "dockerhost1.example.com"
/// tick-interval = "30s"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AgentConfig {
    /// Hostname of the host this agent manages.
    pub host_hostname: String,
    /// Delay between convergence ticks, e.g. `"30s"` or `"500ms"`.
    pub tick_interval: Option<String>,
}

impl AgentConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// The configured tick interval, falling back to the default when
    /// absent or unparseable.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_TICK_INTERVAL)
    }
}

/// Parse a human-readable duration: `"500ms"`, `"30s"`, `"5m"`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(millis) = s.strip_suffix("ms") {
        return millis.parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs.parse().ok().map(Duration::from_secs);
    }
    if let Some(minutes) = s.strip_suffix('m') {
        return minutes.parse().ok().map(|m: u64| Duration::from_secs(m * 60));
    }
    None
}
