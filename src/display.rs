use std::sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
};
use std::thread;

use tracing::{debug, debug_span, info, warn};

use crate::clock::Clock;
use crate::formatter::{Countdown, Remaining, countdown};
use crate::ids;
use crate::model::{CountdownConfig, Segment, logo_or_default, parse_target};
use crate::settings::{DEFAULT_TARGET, ExtensionSettings};
use crate::store::ConfigStore;

/// Rendering sink for the display page.
pub trait CountdownView: Send + Sync {
    fn show_remaining(&self, remaining: &Remaining);
    fn show_expired(&self);
    fn show_logo(&self, src: &str);
}

/// Keeps the display page in step with the broadcaster segment.
///
/// Bad or missing store content never blanks the display: the last good
/// target and logo stay up, since nobody is around to act on an error.
pub struct DisplaySubscriber {
    store: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
    view: Arc<dyn CountdownView>,
    settings: ExtensionSettings,
    tick: Arc<TickState>,
    logo: Mutex<String>,
}

// Shared with the tick thread
struct TickState {
    target_ms: AtomicI64,
    ticking: AtomicBool,
    // Set by `stop`, never cleared
    cancel: AtomicBool,
    epoch: AtomicU64,
}

impl DisplaySubscriber {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        clock: Arc<dyn Clock>,
        view: Arc<dyn CountdownView>,
        settings: ExtensionSettings,
    ) -> Self {
        let target_ms = parse_target(&settings.default_target)
            .or_else(|| parse_target(DEFAULT_TARGET))
            .map(|t| t.timestamp_millis())
            .unwrap_or_default();
        let logo = settings.default_logo.clone();
        Self {
            store,
            clock,
            view,
            settings,
            tick: Arc::new(TickState::new(target_ms)),
            logo: Mutex::new(logo),
        }
    }

    /// Show defaults, start ticking, follow store changes, and pick up any
    /// config the host already has.
    pub fn attach(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.store.on_change(Arc::new(move || {
            if let Some(this) = weak.upgrade() {
                debug!("display: config changed");
                this.reload();
            }
        }));

        self.view.show_logo(&self.active_logo());
        self.refresh();
        self.reload();
    }

    pub fn on_authorized(&self) {
        info!(page = ids::DISPLAY_PAGE, "display authorized");
        self.reload();
    }

    /// Re-read the broadcaster segment. Returns whether anything changed.
    pub fn reload(&self) -> bool {
        if self.is_stopped() {
            debug!("display stopped; ignoring config");
            return false;
        }
        let Some(record) = self
            .store
            .read(Segment::Broadcaster)
            .filter(|r| !r.is_empty())
        else {
            debug!("no config for display; keeping current target");
            return false;
        };

        let data = match CountdownConfig::from_json(&record.content) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "display could not parse config");
                return false;
            }
        };

        let mut changed = false;
        if !data.date.is_empty() {
            match data.target().map(|t| t.timestamp_millis()).filter(|ms| *ms > 0) {
                Some(ms) => {
                    info!(date = %data.date, "display target updated");
                    self.tick.target_ms.store(ms, Ordering::SeqCst);
                    self.refresh();
                    changed = true;
                }
                None => warn!(date = %data.date, "ignoring unreadable date"),
            }
        }
        if let Some(logo) = data.logo {
            self.set_logo(&logo);
            changed = true;
        }
        changed
    }

    /// The logo image failed to load; fall back to the bundled asset.
    pub fn logo_failed(&self) {
        warn!(logo = %self.active_logo(), "logo failed to load, using default");
        self.set_logo("");
    }

    /// Stop ticking for page teardown. Later change events are ignored.
    pub fn stop(&self) {
        self.tick.cancel.store(true, Ordering::SeqCst);
        self.tick.ticking.store(false, Ordering::SeqCst);
        self.tick.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.tick.cancel.load(Ordering::SeqCst)
    }

    pub fn active_target_ms(&self) -> i64 {
        self.tick.target_ms.load(Ordering::SeqCst)
    }

    pub fn active_logo(&self) -> String {
        self.logo
            .lock()
            .map(|l| l.clone())
            .unwrap_or_else(|_| self.settings.default_logo.clone())
    }

    pub fn is_ticking(&self) -> bool {
        self.tick.ticking.load(Ordering::SeqCst)
    }

    fn set_logo(&self, logo: &str) {
        let src = logo_or_default(logo, &self.settings.default_logo).to_string();
        debug!(%src, "display logo");
        if let Ok(mut current) = self.logo.lock() {
            current.clone_from(&src);
        }
        self.view.show_logo(&src);
    }

    /// Render immediately; (re)start the ticker for a future target.
    fn refresh(&self) {
        if self.is_stopped() {
            return;
        }
        match countdown(self.active_target_ms(), self.clock.now_ms()) {
            Countdown::Remaining(r) => {
                self.view.show_remaining(&r);
                self.start_tick();
            }
            Countdown::Expired => {
                self.view.show_expired();
                self.tick.expire();
            }
        }
    }

    fn start_tick(&self) {
        if self.tick.ticking.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut my_epoch = self.tick.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        // `stop` raced in after the check in `refresh`
        if self.is_stopped() {
            self.tick.ticking.store(false, Ordering::SeqCst);
            return;
        }

        let tick = Arc::clone(&self.tick);
        let clock = Arc::clone(&self.clock);
        let view = Arc::clone(&self.view);
        let interval = self.settings.tick_interval;

        thread::spawn(move || {
            let _span = debug_span!("tick", page = ids::DISPLAY_PAGE).entered();
            loop {
                thread::sleep(interval);

                if tick.cancel.load(Ordering::SeqCst) {
                    break;
                }
                if tick.epoch.load(Ordering::SeqCst) != my_epoch {
                    break;
                }

                match countdown(tick.target_ms.load(Ordering::SeqCst), clock.now_ms()) {
                    Countdown::Remaining(r) => view.show_remaining(&r),
                    Countdown::Expired => {
                        match tick.expire_from_tick(my_epoch, clock.as_ref(), view.as_ref()) {
                            Some(resumed) => my_epoch = resumed,
                            None => break,
                        }
                    }
                }
            }
        });
    }
}

impl TickState {
    fn new(target_ms: i64) -> Self {
        Self {
            target_ms: AtomicI64::new(target_ms),
            ticking: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    /// A freshly stored target is already past. Only the caller that flips
    /// `ticking` off retires the running ticker.
    fn expire(&self) {
        if self.ticking.swap(false, Ordering::SeqCst) {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            info!("countdown reached zero; ticking stopped");
        }
    }

    /// The ticker running under `my_epoch` saw the target pass.
    ///
    /// Returns the epoch to keep ticking under when a future target was
    /// stored after the tick read the old one; `start_tick` returned early
    /// in that window because `ticking` was still set.
    fn expire_from_tick(
        &self,
        my_epoch: u64,
        clock: &dyn Clock,
        view: &dyn CountdownView,
    ) -> Option<u64> {
        if self
            .epoch
            .compare_exchange(my_epoch, my_epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // superseded by a newer ticker or by `stop`
            return None;
        }
        self.ticking.store(false, Ordering::SeqCst);

        let target_ms = self.target_ms.load(Ordering::SeqCst);
        let Countdown::Remaining(r) = countdown(target_ms, clock.now_ms()) else {
            view.show_expired();
            info!("countdown reached zero; ticking stopped");
            return None;
        };

        if self
            .ticking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // a fresh ticker already took over
            return None;
        }
        if self.cancel.load(Ordering::SeqCst) {
            self.ticking.store(false, Ordering::SeqCst);
            return None;
        }
        debug!("target moved while expiring; ticking resumed");
        view.show_remaining(&r);
        Some(self.epoch.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
