//! Save-and-verify flow for the configuration page.
//!
//! ```text
//! Idle -> Validating -> Writing -> Verifying -> Succeeded              -> Idle
//!                                            -> SucceededWithStaleDate -> Idle
//!              \            \                -> Failed                 -> Idle
//!               `------------`--------------> Failed                   -> Idle
//! ```
//!
//! One save may be in flight at a time. The store is eventually consistent,
//! so the write is confirmed by reading it back after a delay; a read that
//! still shows an older date with the new logo counts as a save and is
//! followed by one more read later. The write itself is never retried.

use std::sync::{
    Arc, Mutex, OnceLock, Weak,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, info_span, warn};

use crate::clock::Clock;
use crate::error::SaveError;
use crate::ids;
use crate::model::{AuthContext, CountdownConfig, Segment, parse_target};
use crate::settings::ExtensionSettings;
use crate::store::ConfigStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Validating,
    Writing,
    Verifying,
    Succeeded,
    SucceededWithStaleDate,
    Failed,
}

/// Raw form input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveRequest {
    pub date: String,
    pub logo: Option<String>,
}

impl SaveRequest {
    pub fn new(date: impl Into<String>, logo: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            logo: Some(logo.into()),
        }
    }
}

/// A write that went through and is waiting to be read back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSave {
    pub sent: CountdownConfig,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Succeeded { version: String },
    /// Logo confirmed, date still shows an older value.
    SucceededWithStaleDate,
}

impl SaveOutcome {
    pub fn status_message(&self) -> &'static str {
        match self {
            SaveOutcome::Succeeded { .. } => "✓ Configuration saved and verified!",
            SaveOutcome::SucceededWithStaleDate => "✓ Configuration saved! (Date may update shortly)",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    /// Nothing stored yet. Normal on first use.
    NotConfigured,
    Loaded {
        config: CountdownConfig,
        version: String,
    },
    Invalid(String),
}

impl LoadStatus {
    pub fn status_message(&self) -> &'static str {
        match self {
            LoadStatus::NotConfigured => "No saved configuration (this is normal for first use)",
            LoadStatus::Loaded { .. } => "✓ Configuration loaded successfully",
            LoadStatus::Invalid(_) => "Error: Invalid configuration data",
        }
    }
}

pub struct ConfigSynchronizer {
    store: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
    settings: ExtensionSettings,
    auth: OnceLock<AuthContext>,
    in_flight: AtomicBool,
    state: Mutex<SaveState>,
    last_terminal: Mutex<Option<SaveState>>,
    last_config: Mutex<Option<CountdownConfig>>,
}

impl ConfigSynchronizer {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        clock: Arc<dyn Clock>,
        settings: ExtensionSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            auth: OnceLock::new(),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(SaveState::Idle),
            last_terminal: Mutex::new(None),
            last_config: Mutex::new(None),
        }
    }

    /// Reload on store change events, skipping those caused while saving.
    pub fn attach(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.store.on_change(Arc::new(move || {
            if let Some(this) = weak.upgrade() {
                this.handle_store_change();
            }
        }));
    }

    // ── Session ──────────────────────────────────────────────────────────────

    /// Record the host's authorization. Only the first delivery counts.
    pub fn set_auth(&self, auth: AuthContext) -> bool {
        if !auth.may_configure() {
            warn!(role = ?auth.role, "user is not the broadcaster; saving will be refused");
        }
        match self.auth.set(auth) {
            Ok(()) => {
                info!("authorization received");
                true
            }
            Err(_) => {
                warn!("authorization already set for this session; ignoring");
                false
            }
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.auth.get().is_some_and(AuthContext::may_configure)
    }

    pub fn state(&self) -> SaveState {
        self.state.lock().map(|s| *s).unwrap_or(SaveState::Idle)
    }

    /// Terminal state the most recent attempt passed through.
    pub fn last_terminal(&self) -> Option<SaveState> {
        self.last_terminal.lock().ok().and_then(|s| *s)
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Last config sent by this session or loaded from the store.
    pub fn last_config(&self) -> Option<CountdownConfig> {
        self.last_config.lock().ok().and_then(|c| c.clone())
    }

    // ── Save ─────────────────────────────────────────────────────────────────

    /// Validate, authorize and write. On `Ok` the synchronizer is in
    /// `Verifying` and stays busy until [`finish`](Self::finish) is called.
    pub fn request_save(&self, req: &SaveRequest) -> Result<PendingSave, SaveError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("save requested while another is in flight");
            return Err(SaveError::SaveInProgress);
        }

        match self.validate_and_write(req) {
            Ok(pending) => {
                self.set_state(SaveState::Verifying);
                Ok(pending)
            }
            Err(err) => {
                warn!(error = %err, "save rejected");
                self.enter_terminal(SaveState::Failed);
                Err(err)
            }
        }
    }

    fn validate_and_write(&self, req: &SaveRequest) -> Result<PendingSave, SaveError> {
        self.set_state(SaveState::Validating);
        if req.date.trim().is_empty() {
            return Err(SaveError::MissingDate);
        }
        let target = parse_target(&req.date).ok_or(SaveError::InvalidDate)?;
        let now = self.clock.now();
        if target <= now {
            return Err(SaveError::PastDate);
        }

        self.set_state(SaveState::Writing);
        let auth = self.auth.get().ok_or(SaveError::Unauthorized)?;
        if !auth.may_configure() {
            return Err(SaveError::Unauthorized);
        }

        let sent = CountdownConfig::new(
            req.date.clone(),
            req.logo.clone().unwrap_or_default(),
            now,
        );
        let content = sent
            .to_json()
            .map_err(|e| SaveError::ParseError(e.to_string()))?;
        let version = self.settings.config_version.clone();

        info!(segment = %Segment::Broadcaster, %version, len = content.len(), "writing config");
        self.store.write(Segment::Broadcaster, &version, &content)?;

        if let Ok(mut last) = self.last_config.lock() {
            *last = Some(sent.clone());
        }
        Ok(PendingSave { sent, version })
    }

    /// Read the segment back once and judge it against what was sent.
    /// Does not change state.
    pub fn verify(&self, pending: &PendingSave) -> Result<SaveOutcome, SaveError> {
        let record = self
            .store
            .read(Segment::Broadcaster)
            .filter(|r| !r.is_empty())
            .ok_or(SaveError::EmptyAfterWrite)?;

        let saved = CountdownConfig::from_json(&record.content)
            .map_err(|e| SaveError::ParseError(e.to_string()))?;

        let date_matches = saved.date == pending.sent.date;
        let logo_matches = saved.logo == pending.sent.logo;
        debug!(date_matches, logo_matches, "verification read");

        match (date_matches, logo_matches) {
            (true, true) => Ok(SaveOutcome::Succeeded {
                version: if record.version.is_empty() {
                    pending.version.clone()
                } else {
                    record.version
                },
            }),
            (false, true) => {
                warn!(sent = %pending.sent.date, got = %saved.date, "date not propagated yet");
                Ok(SaveOutcome::SucceededWithStaleDate)
            }
            _ => Err(SaveError::VerificationMismatch),
        }
    }

    /// Pass through the terminal state for `result`, return to `Idle`, and
    /// allow the next save.
    pub fn finish(
        &self,
        result: Result<SaveOutcome, SaveError>,
    ) -> Result<SaveOutcome, SaveError> {
        let terminal = match &result {
            Ok(SaveOutcome::Succeeded { version }) => {
                info!(%version, "config saved and verified");
                SaveState::Succeeded
            }
            Ok(SaveOutcome::SucceededWithStaleDate) => {
                info!("config saved, date may update shortly");
                SaveState::SucceededWithStaleDate
            }
            Err(err) => {
                warn!(error = %err, "save failed");
                SaveState::Failed
            }
        };
        self.enter_terminal(terminal);
        result
    }

    /// Whole save on a worker thread: write now, verify after the
    /// configured delay(s), and re-read once more on a stale-date success.
    pub fn save(
        self: &Arc<Self>,
        req: &SaveRequest,
    ) -> Result<JoinHandle<Result<SaveOutcome, SaveError>>, SaveError> {
        let pending = self.request_save(req)?;
        let this = Arc::clone(self);
        Ok(thread::spawn(move || {
            let _span = info_span!("save", page = ids::CONFIG_PAGE).entered();
            this.run_verification(&pending)
        }))
    }

    fn run_verification(self: Arc<Self>, pending: &PendingSave) -> Result<SaveOutcome, SaveError> {
        let attempts = self.settings.verify_attempts.max(1);
        let mut result = self.verify_after(pending, 0);
        for attempt in 1..attempts {
            if matches!(result, Ok(SaveOutcome::Succeeded { .. })) {
                break;
            }
            result = self.verify_after(pending, attempt);
        }

        let result = self.finish(result);
        if matches!(result, Ok(SaveOutcome::SucceededWithStaleDate)) {
            self.schedule_recheck();
        }
        result
    }

    fn verify_after(&self, pending: &PendingSave, attempt: u32) -> Result<SaveOutcome, SaveError> {
        thread::sleep(self.settings.verify_delay_for(attempt));
        self.verify(pending)
    }

    // Not cancellable; harmless if nobody is left to look at the result.
    fn schedule_recheck(self: &Arc<Self>) {
        let this = Arc::clone(self);
        thread::spawn(move || {
            let _span = info_span!("recheck", page = ids::CONFIG_PAGE).entered();
            thread::sleep(this.settings.recheck_delay);
            let status = this.load_current();
            debug!(?status, "stale-date recheck");
        });
    }

    // ── Load ─────────────────────────────────────────────────────────────────

    /// Read what the store currently holds for the broadcaster.
    pub fn load_current(&self) -> LoadStatus {
        let Some(record) = self
            .store
            .read(Segment::Broadcaster)
            .filter(|r| !r.is_empty())
        else {
            info!("no broadcaster config stored");
            return LoadStatus::NotConfigured;
        };

        match CountdownConfig::from_json(&record.content) {
            Ok(config) => {
                let version = if record.version.is_empty() {
                    "unknown".to_string()
                } else {
                    record.version
                };
                info!(date = %config.date, %version, "config loaded");
                if let Ok(mut last) = self.last_config.lock() {
                    *last = Some(config.clone());
                }
                LoadStatus::Loaded { config, version }
            }
            Err(e) => {
                warn!(error = %e, raw = %record.content, "stored config is not valid");
                LoadStatus::Invalid(e.to_string())
            }
        }
    }

    pub fn handle_store_change(&self) -> Option<LoadStatus> {
        if self.is_saving() {
            debug!("config changed during save; verification will read it");
            return None;
        }
        Some(self.load_current())
    }

    // ── State ────────────────────────────────────────────────────────────────

    fn set_state(&self, next: SaveState) {
        if let Ok(mut state) = self.state.lock() {
            debug!(from = ?*state, to = ?next, "save state");
            *state = next;
        }
    }

    fn enter_terminal(&self, terminal: SaveState) {
        self.set_state(terminal);
        if let Ok(mut last) = self.last_terminal.lock() {
            *last = Some(terminal);
        }
        self.set_state(SaveState::Idle);
        self.in_flight.store(false, Ordering::SeqCst);
    }
}
