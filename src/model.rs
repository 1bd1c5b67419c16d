use std::fmt;

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── Wire format ──────────────────────────────────────────────────────────────

/// Content of the broadcaster segment.
///
/// `date` is the raw local-naive string the broadcaster picked and is never
/// normalised; readers resolve it in their own local zone. Missing fields are
/// tolerated so older records still load, and a field of the wrong type only
/// blanks that field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownConfig {
    #[serde(default, deserialize_with = "string_or_blank")]
    pub date: String,
    /// `None` when the record has no `logo` key at all.
    #[serde(
        default,
        deserialize_with = "present_logo",
        skip_serializing_if = "Option::is_none"
    )]
    pub logo: Option<String>,
    #[serde(default, rename = "savedAt")]
    pub saved_at: String,
}

impl CountdownConfig {
    pub fn new(date: impl Into<String>, logo: impl Into<String>, saved_at: DateTime<Utc>) -> Self {
        Self {
            date: date.into(),
            logo: Some(logo.into()),
            saved_at: saved_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Target instant, if `date` holds a valid local date-time.
    pub fn target(&self) -> Option<DateTime<Utc>> {
        parse_target(&self.date)
    }
}

fn string_or_blank<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

// Only called for a key that is present; null and other non-strings mean
// "show the default logo".
fn present_logo<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    string_or_blank(de).map(Some)
}

// ── Store records ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Broadcaster,
    Developer,
    Global,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Broadcaster => "broadcaster",
            Segment::Developer => "developer",
            Segment::Global => "global",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredConfigRecord {
    pub segment: Segment,
    pub version: String,
    pub content: String,
}

impl StoredConfigRecord {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

// ── Session identity ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Broadcaster,
    Other(String),
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        if s == "broadcaster" {
            Role::Broadcaster
        } else {
            Role::Other(s)
        }
    }
}

impl From<Role> for String {
    fn from(r: Role) -> Self {
        match r {
            Role::Broadcaster => "broadcaster".to_string(),
            Role::Other(s) => s,
        }
    }
}

/// Identity delivered by the host's authorization callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    /// Config pages may be authorized before the host assigns a role. Hosts
    /// send that as a missing, null, or blank `role`.
    #[serde(default, deserialize_with = "blank_role_as_unset")]
    pub role: Option<Role>,
    pub channel_id: String,
    pub user_id: String,
    pub token: String,
}

impl AuthContext {
    /// An unset role is accepted; a set one must be the broadcaster.
    pub fn may_configure(&self) -> bool {
        match &self.role {
            None | Some(Role::Broadcaster) => true,
            Some(Role::Other(s)) => s.trim().is_empty(),
        }
    }
}

fn blank_role_as_unset<'de, D>(de: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(de)?;
    Ok(raw.filter(|s| !s.trim().is_empty()).map(Role::from))
}

// ── Dates ────────────────────────────────────────────────────────────────────

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Parse a `datetime-local` style string without any zone information.
pub fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Resolve a naive date-time in `tz`. Ambiguous times take the earlier
/// instant; times inside a DST gap don't exist and yield `None`.
pub fn resolve_in<Tz: TimeZone>(naive: &NaiveDateTime, tz: &Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse and resolve in the host's local zone.
pub fn parse_target(raw: &str) -> Option<DateTime<Utc>> {
    parse_naive(raw).and_then(|n| resolve_in(&n, &Local))
}

/// Image to show for a stored logo value; blank means the bundled asset.
pub fn logo_or_default<'a>(logo: &'a str, default_logo: &'a str) -> &'a str {
    if logo.trim().is_empty() {
        default_logo
    } else {
        logo
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate};

    use super::*;

    #[test]
    fn serializes_wire_field_names_in_order() {
        let saved_at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let cfg = CountdownConfig::new("2027-01-01T00:00", "", saved_at);
        assert_eq!(
            cfg.to_json().unwrap(),
            r#"{"date":"2027-01-01T00:00","logo":"","savedAt":"2026-10-19T12:00:00.000Z"}"#
        );
    }

    #[test]
    fn round_trip_keeps_date_and_logo() {
        let cfg = CountdownConfig::new("2027-03-04T05:06", "https://x/y.png", Utc::now());
        let back = CountdownConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(back.date, cfg.date);
        assert_eq!(back.logo, cfg.logo);
    }

    #[test]
    fn missing_fields_are_tolerated() {
        let cfg = CountdownConfig::from_json(r#"{"date":"2027-01-01T00:00"}"#).unwrap();
        assert_eq!(cfg.logo, None);
        assert!(cfg.saved_at.is_empty());

        let cfg = CountdownConfig::from_json(r#"{"logo":""}"#).unwrap();
        assert!(cfg.date.is_empty());
        assert_eq!(cfg.logo.as_deref(), Some(""));
    }

    #[test]
    fn wrongly_typed_fields_only_blank_themselves() {
        let raw = r#"{"date":null,"logo":"https://x/y.png"}"#;
        let cfg = CountdownConfig::from_json(raw).unwrap();
        assert!(cfg.date.is_empty());
        assert_eq!(cfg.logo.as_deref(), Some("https://x/y.png"));

        let cfg = CountdownConfig::from_json(r#"{"date":20270101,"logo":null}"#).unwrap();
        assert!(cfg.date.is_empty());
        assert_eq!(cfg.logo.as_deref(), Some(""));
    }

    #[test]
    fn non_object_content_is_rejected() {
        assert!(CountdownConfig::from_json("not json").is_err());
        assert!(CountdownConfig::from_json("[1,2]").is_err());
    }

    #[test]
    fn naive_formats() {
        let expect = NaiveDate::from_ymd_opt(2027, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_naive("2027-01-01T00:00"), Some(expect));
        assert_eq!(parse_naive("2027-01-01T00:00:00"), Some(expect));
        assert_eq!(parse_naive(" 2027-01-01 00:00:00.000 "), Some(expect));
        assert_eq!(parse_naive("2027-13-01T00:00"), None);
        assert_eq!(parse_naive(""), None);
    }

    #[test]
    fn resolves_in_given_zone() {
        let naive = parse_naive("2027-01-01T00:00").unwrap();
        let plus2 = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            resolve_in(&naive, &plus2),
            Some(Utc.with_ymd_and_hms(2026, 12, 31, 22, 0, 0).unwrap())
        );
    }

    #[test]
    fn role_gate() {
        let mut auth = AuthContext {
            role: None,
            channel_id: "1".into(),
            user_id: "2".into(),
            token: "t".into(),
        };
        assert!(auth.may_configure());
        auth.role = Some(Role::Broadcaster);
        assert!(auth.may_configure());
        auth.role = Some(Role::Other("viewer".into()));
        assert!(!auth.may_configure());
        auth.role = Some(Role::Other(String::new()));
        assert!(auth.may_configure());
    }

    #[test]
    fn auth_from_host_json() {
        let auth: AuthContext = serde_json::from_str(
            r#"{"channelId":"42","userId":"U1","token":"jwt","role":"moderator"}"#,
        )
        .unwrap();
        assert_eq!(auth.role, Some(Role::Other("moderator".into())));
        assert!(!auth.may_configure());
    }

    #[test]
    fn blank_role_from_host_is_unset() {
        for role in [r#""""#, r#""  ""#, "null"] {
            let raw = format!(r#"{{"channelId":"1","userId":"u","token":"t","role":{role}}}"#);
            let auth: AuthContext = serde_json::from_str(&raw).unwrap();
            assert_eq!(auth.role, None);
            assert!(auth.may_configure());
        }
    }

    #[test]
    fn blank_logo_uses_default() {
        assert_eq!(logo_or_default("", "logo.jpg"), "logo.jpg");
        assert_eq!(logo_or_default("  ", "logo.jpg"), "logo.jpg");
        assert_eq!(logo_or_default("https://a/b.png", "logo.jpg"), "https://a/b.png");
    }
}
