use std::time::Duration;

use anyhow::{Context as _, bail};
use serde_json::{Map, Value};

use crate::model::parse_naive;

pub const DEFAULT_LOGO: &str = "logo.jpg";
pub const DEFAULT_TARGET: &str = "2027-01-01T00:00:00";

/// Tunables for both pages. The delays are guesses at the host's
/// propagation latency, not guarantees.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtensionSettings {
    /// Wait between the write and the first verification read.
    pub verify_delay: Duration,
    /// Wait before the follow-up read after a stale-date success.
    pub recheck_delay: Duration,
    /// Verification reads before deciding; 1 means a single fixed-delay read.
    pub verify_attempts: u32,
    /// Delay multiplier between verification reads.
    pub verify_backoff: u32,
    pub tick_interval: Duration,
    pub default_logo: String,
    /// Local-naive target shown until a config arrives.
    pub default_target: String,
    pub config_version: String,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            verify_delay: Duration::from_millis(2000),
            recheck_delay: Duration::from_millis(2000),
            verify_attempts: 1,
            verify_backoff: 2,
            tick_interval: Duration::from_millis(1000),
            default_logo: DEFAULT_LOGO.to_string(),
            default_target: DEFAULT_TARGET.to_string(),
            config_version: "1".to_string(),
        }
    }
}

impl ExtensionSettings {
    /// Delay before verification read `attempt` (0-based).
    pub fn verify_delay_for(&self, attempt: u32) -> Duration {
        let factor = self.verify_backoff.max(1).saturating_pow(attempt);
        self.verify_delay.saturating_mul(factor)
    }

    /// Parse a whole settings document, e.g. the developer segment content.
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(raw).context("settings are not valid JSON")?;
        let Value::Object(map) = value else {
            bail!("settings must be a JSON object");
        };
        let settings = parse_settings(&map);
        if parse_naive(&settings.default_target).is_none() {
            bail!("defaultTarget `{}` is not a local date-time", settings.default_target);
        }
        Ok(settings)
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// Lenient parse: numbers may arrive as JSON numbers or numeric strings;
/// anything missing or unreadable keeps its default.
pub fn parse_settings(v: &Map<String, Value>) -> ExtensionSettings {
    let mut s = ExtensionSettings::default();
    if let Some(ms) = get_u64(v, "verifyDelayMs") {
        s.verify_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = get_u64(v, "recheckDelayMs") {
        s.recheck_delay = Duration::from_millis(ms);
    }
    if let Some(n) = get_u64(v, "verifyAttempts") {
        s.verify_attempts = u32::try_from(n).unwrap_or(u32::MAX).max(1);
    }
    if let Some(n) = get_u64(v, "verifyBackoff") {
        s.verify_backoff = u32::try_from(n).unwrap_or(u32::MAX).max(1);
    }
    if let Some(ms) = get_u64(v, "tickMs") {
        s.tick_interval = Duration::from_millis(ms.max(1));
    }
    if let Some(logo) = get_str(v, "defaultLogo").filter(|l| !l.trim().is_empty()) {
        s.default_logo = logo.to_string();
    }
    if let Some(target) = get_str(v, "defaultTarget").filter(|t| !t.trim().is_empty()) {
        s.default_target = target.trim().to_string();
    }
    if let Some(version) = get_str(v, "configVersion").filter(|t| !t.trim().is_empty()) {
        s.config_version = version.trim().to_string();
    }
    s
}

fn get_str<'a>(v: &'a Map<String, Value>, k: &str) -> Option<&'a str> {
    v.get(k)?.as_str()
}

fn get_u64(v: &Map<String, Value>, k: &str) -> Option<u64> {
    match v.get(k) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn empty_map_gives_defaults() {
        assert_eq!(parse_settings(&Map::new()), ExtensionSettings::default());
    }

    #[test]
    fn numbers_and_numeric_strings() {
        let s = parse_settings(&map(json!({
            "verifyDelayMs": 50,
            "recheckDelayMs": " 75 ",
            "verifyAttempts": "3",
            "tickMs": 0,
            "defaultLogo": "brand.png",
        })));
        assert_eq!(s.verify_delay, Duration::from_millis(50));
        assert_eq!(s.recheck_delay, Duration::from_millis(75));
        assert_eq!(s.verify_attempts, 3);
        assert_eq!(s.tick_interval, Duration::from_millis(1));
        assert_eq!(s.default_logo, "brand.png");
    }

    #[test]
    fn junk_values_keep_defaults() {
        let s = parse_settings(&map(json!({
            "verifyDelayMs": "soon",
            "verifyAttempts": -2,
            "defaultLogo": "   ",
        })));
        assert_eq!(s.verify_delay, Duration::from_millis(2000));
        assert_eq!(s.verify_attempts, 1);
        assert_eq!(s.default_logo, DEFAULT_LOGO);
    }

    #[test]
    fn backoff_delays_grow() {
        let s = ExtensionSettings {
            verify_delay: Duration::from_millis(100),
            verify_backoff: 3,
            ..Default::default()
        };
        assert_eq!(s.verify_delay_for(0), Duration::from_millis(100));
        assert_eq!(s.verify_delay_for(2), Duration::from_millis(900));
    }

    #[test]
    fn document_parsing_reports_problems() {
        assert!(ExtensionSettings::from_json_str("nope").is_err());
        assert!(ExtensionSettings::from_json_str("[]").is_err());
        assert!(ExtensionSettings::from_json_str(r#"{"defaultTarget":"tomorrow"}"#).is_err());
        let s = ExtensionSettings::from_json_str(r#"{"configVersion":"2"}"#).unwrap();
        assert_eq!(s.config_version, "2");
    }
}
