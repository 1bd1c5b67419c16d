const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Whole units left until the target, each truncated from the remainder of the larger unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Remaining {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Countdown {
    Remaining(Remaining),
    Expired,
}

impl Countdown {
    pub fn is_expired(&self) -> bool {
        matches!(self, Countdown::Expired)
    }
}

/// Decompose the time between `now_ms` and `target_ms` (both unix millis).
///
/// A target at or before `now_ms` is `Expired`. Pure; callable at any cadence.
pub fn countdown(target_ms: i64, now_ms: i64) -> Countdown {
    let diff = target_ms.saturating_sub(now_ms);
    if diff <= 0 {
        return Countdown::Expired;
    }

    let days = diff / MS_PER_DAY;
    let hours = (diff % MS_PER_DAY) / MS_PER_HOUR;
    let minutes = (diff % MS_PER_HOUR) / MS_PER_MINUTE;
    let seconds = (diff % MS_PER_MINUTE) / MS_PER_SECOND;

    Countdown::Remaining(Remaining {
        days: days as u64,
        hours: hours as u64,
        minutes: minutes as u64,
        seconds: seconds as u64,
    })
}

impl Remaining {
    /// Zero-padded display fields: days to 3 digits, the rest to 2.
    pub fn padded(&self) -> [String; 4] {
        [
            format!("{:03}", self.days),
            format!("{:02}", self.hours),
            format!("{:02}", self.minutes),
            format!("{:02}", self.seconds),
        ]
    }

    /// `1d 2h 3m`, used by the saved-settings summary.
    pub fn summary(&self) -> String {
        format!("{}d {}h {}m", self.days, self.hours, self.minutes)
    }
}
