//! Per-organization generation window lifecycle.

pub mod manager;

pub use manager::{
    WindowCleanupStats, WindowSettings, WindowStatus, extend_generation_window,
    get_cleanup_stats, get_window_status, initialize_generation_window, validate_window_config,
};
