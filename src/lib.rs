pub mod app;
pub use app::run;

pub mod bridge;
pub mod config;
pub mod instance;
pub mod model;
pub mod navigation;
pub mod notify;
pub mod relay;
pub mod watcher;

// Platform abstraction layer
pub mod platform;

// UI modules (cross-platform)
pub mod ui {
    pub mod icon;
    pub mod menu;
}
