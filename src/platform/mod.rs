//! Platform abstraction layer
//!
//! This module provides platform-specific implementations for:
//! - Opening URLs and files with the desktop's default handler
//! - Environment switches the webview reads at startup
//! - Backend hooks on the webview (Linux only)

use std::path::Path;

use log::warn;

use crate::config::SystemConfig;
use crate::navigation::ExternalOpener;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

// Re-export the current platform's module
#[cfg(target_os = "linux")]
pub use linux as current;

#[cfg(target_os = "macos")]
pub use macos as current;

#[cfg(target_os = "windows")]
pub use windows as current;

/// Hands URLs to the user's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl ExternalOpener for SystemBrowser {
    fn open_external(&self, url: &str) {
        if let Err(e) = current::open_url(url) {
            warn!("Failed to open {} externally: {}", url, e);
        }
    }
}

pub fn open_config_file(path: &Path) {
    if let Err(e) = current::open_file(path) {
        warn!("Failed to open config file {:?}: {}", path, e);
    }
}

/// Apply environment switches. Must run before the webview or any thread starts.
pub fn prepare_environment(system: &SystemConfig) {
    let disable_gpu = system.disable_gpu || gpu_disabled_by_env();
    current::prepare_environment(disable_gpu);
}

fn gpu_disabled_by_env() -> bool {
    std::env::var("DISABLE_GPU").is_ok_and(|v| v.eq_ignore_ascii_case("true"))
}
