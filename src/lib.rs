pub mod clock;
pub mod display;
pub mod error;
pub mod formatter;
pub mod model;
pub mod settings;
pub mod store;
pub mod summary;
pub mod sync;
pub mod telemetry;

pub use clock::{Clock, FixedClock, SystemClock};
pub use display::{CountdownView, DisplaySubscriber};
pub use error::{SaveError, StoreError};
pub use formatter::{Countdown, Remaining, countdown};
pub use model::{AuthContext, CountdownConfig, Role, Segment, StoredConfigRecord};
pub use settings::ExtensionSettings;
pub use store::{ConfigStore, MemoryConfigStore};
pub use summary::ConfigSummary;
pub use sync::{ConfigSynchronizer, LoadStatus, PendingSave, SaveOutcome, SaveRequest, SaveState};

pub const EXTENSION_ID: &str = "tv.countdown.timer";

pub mod ids {
    use crate::EXTENSION_ID;

    pub const CONFIG_PAGE: &str = const_format::concatcp!(EXTENSION_ID, ".config");
    pub const DISPLAY_PAGE: &str = const_format::concatcp!(EXTENSION_ID, ".panel");
}
