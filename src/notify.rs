//! Native notifications through notify-rust.
//!
//! Toasts are shown from a worker thread so D-Bus round-trips never stall
//! the event loop. Click reporting is only available on freedesktop
//! servers; elsewhere the toast is shown and clicks are not reported back.

use std::sync::OnceLock;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use notify_rust::Notification;

use crate::relay::{ClickHandler, NativeNotifier, Toast};

const APP_NAME: &str = "Microsoft Teams";
#[cfg(target_os = "macos")]
const BUNDLE_ID: &str = "com.microsoft.teams2";

struct NotifyJob {
    toast: Toast,
    on_click: ClickHandler,
}

pub struct DesktopNotifier {
    jobs: Sender<NotifyJob>,
}

impl DesktopNotifier {
    pub fn start() -> Self {
        #[cfg(target_os = "macos")]
        if let Err(e) = notify_rust::set_application(BUNDLE_ID) {
            warn!("Failed to set notification application identity: {}", e);
        }

        let (jobs, rx) = crossbeam_channel::unbounded();
        let _worker = spawn_worker(rx);
        Self { jobs }
    }
}

impl NativeNotifier for DesktopNotifier {
    fn is_supported(&self) -> bool {
        static SUPPORTED: OnceLock<bool> = OnceLock::new();
        *SUPPORTED.get_or_init(detect_support)
    }

    fn show(&self, toast: Toast, on_click: ClickHandler) {
        if self.jobs.send(NotifyJob { toast, on_click }).is_err() {
            warn!("Notification worker is gone, dropping toast");
        }
    }
}

fn spawn_worker(rx: Receiver<NotifyJob>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for job in rx.iter() {
            show_native(job);
        }
        debug!("Notification worker exiting");
    })
}

fn build_notification(toast: &Toast) -> Notification {
    let mut notification = Notification::new();
    notification
        .appname(APP_NAME)
        .summary(&toast.title)
        .body(&toast.body);
    if let Some(icon) = toast.icon.as_deref().and_then(|p| p.to_str()) {
        notification.icon(icon);
    }
    notification
}

#[cfg(all(unix, not(target_os = "macos")))]
fn show_native(job: NotifyJob) {
    let NotifyJob { toast, on_click } = job;
    let mut notification = build_notification(&toast);
    notification.action("default", "Open");

    // Each toast waits for its own action, so clicks on older toasts still land.
    thread::spawn(move || match notification.show() {
        Ok(handle) => handle.wait_for_action(|action| {
            if action == "default" {
                debug!("Notification {} clicked", toast.tag);
                on_click();
            }
        }),
        Err(e) => warn!("Failed to show notification {}: {}", toast.tag, e),
    });
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn show_native(job: NotifyJob) {
    let NotifyJob { toast, on_click } = job;
    drop(on_click);
    if let Err(e) = build_notification(&toast).show().map(|_| ()) {
        warn!("Failed to show notification {}: {}", toast.tag, e);
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn detect_support() -> bool {
    match notify_rust::get_server_information() {
        Ok(info) => {
            debug!("Notification server: {} {}", info.name, info.version);
            true
        }
        Err(e) => {
            warn!("No notification server available: {}", e);
            false
        }
    }
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn detect_support() -> bool {
    true
}
