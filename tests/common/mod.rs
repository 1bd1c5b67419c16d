#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use twitch_countdown::{
    AuthContext, CountdownView, ExtensionSettings, FixedClock, Remaining, Role, SaveOutcome,
};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

pub fn succeeded(version: &str) -> SaveOutcome {
    SaveOutcome::Succeeded {
        version: version.to_string(),
    }
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(now()))
}

pub fn fast_settings() -> ExtensionSettings {
    ExtensionSettings {
        verify_delay: Duration::from_millis(10),
        recheck_delay: Duration::from_millis(100),
        tick_interval: Duration::from_millis(5),
        ..Default::default()
    }
}

pub fn auth(role: Option<Role>) -> AuthContext {
    AuthContext {
        role,
        channel_id: "1234".into(),
        user_id: "U1234".into(),
        token: "signed.jwt".into(),
    }
}

pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[derive(Default)]
pub struct RecordingView {
    pub logos: Mutex<Vec<String>>,
    pub remaining: Mutex<Vec<Remaining>>,
    pub expired: AtomicU64,
}

impl RecordingView {
    pub fn last_logo(&self) -> Option<String> {
        self.logos.lock().unwrap().last().cloned()
    }

    pub fn remaining_count(&self) -> usize {
        self.remaining.lock().unwrap().len()
    }

    pub fn expired_count(&self) -> u64 {
        self.expired.load(Ordering::SeqCst)
    }
}

impl CountdownView for RecordingView {
    fn show_remaining(&self, remaining: &Remaining) {
        self.remaining.lock().unwrap().push(*remaining);
    }

    fn show_expired(&self) {
        self.expired.fetch_add(1, Ordering::SeqCst);
    }

    fn show_logo(&self, src: &str) {
        self.logos.lock().unwrap().push(src.to_string());
    }
}
