use crate::formatter::{Countdown, countdown};
use crate::model::{CountdownConfig, parse_naive};

const LOGO_PREVIEW_CHARS: usize = 40;

/// Text for the config page's "current settings" panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigSummary {
    pub target: String,
    pub remaining: String,
    pub logo: String,
    pub uses_default_logo: bool,
}

impl ConfigSummary {
    pub fn describe(config: &CountdownConfig, now_ms: i64) -> Self {
        let (target, remaining) = match (parse_naive(&config.date), config.target()) {
            (Some(naive), Some(instant)) => {
                let remaining = match countdown(instant.timestamp_millis(), now_ms) {
                    Countdown::Remaining(r) => format!("{} remaining", r.summary()),
                    Countdown::Expired => "Time has passed".to_string(),
                };
                (naive.format("%Y-%m-%d %H:%M").to_string(), remaining)
            }
            _ => ("Not set".to_string(), "Not set".to_string()),
        };

        let logo = config.logo.as_deref().unwrap_or_default().trim();
        let (logo, uses_default_logo) = if logo.is_empty() {
            ("Using default logo".to_string(), true)
        } else if logo.chars().count() > LOGO_PREVIEW_CHARS {
            let head: String = logo.chars().take(LOGO_PREVIEW_CHARS).collect();
            (format!("{head}..."), false)
        } else {
            (logo.to_string(), false)
        };

        Self {
            target,
            remaining,
            logo,
            uses_default_logo,
        }
    }
}
