use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Labtrace";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the learned biomarker pattern store.
pub const PATTERN_CACHE_FILE: &str = "biomarker_patterns.db";

/// Get the application data directory.
/// Platform data dir (e.g. ~/.local/share/Labtrace), falling back to the
/// working directory when the platform reports none.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the persisted pattern cache.
pub fn pattern_cache_path() -> PathBuf {
    app_data_dir().join(PATTERN_CACHE_FILE)
}

/// Log filter used when RUST_LOG is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,labtrace=debug"
    } else {
        "warn,labtrace=info"
    }
}
