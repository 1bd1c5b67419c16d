use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
/// Safe to call from both pages; only the first call installs anything.
pub fn init(page_id: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        info!(page = page_id, "logging initialised");
    }
    installed
}
