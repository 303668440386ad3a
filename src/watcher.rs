//! Hot reload of the configuration file.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use winit::event_loop::EventLoopProxy;

use crate::config::{get_config_path, load_and_validate_config};
use crate::model::UserEvent;

const CONFIG_DEBOUNCE_DURATION: Duration = Duration::from_millis(500);

type WatchResult = notify::Result<Event>;

pub fn spawn_config_watcher(proxy: EventLoopProxy<UserEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let config_path = get_config_path();
        let Some(config_dir) = config_path.parent().map(Path::to_path_buf) else {
            return;
        };
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut watcher: RecommendedWatcher = match Watcher::new(
            move |res: WatchResult| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        ) {
            Ok(w) => w,
            Err(e) => {
                error!("Failed to create config watcher: {}", e);
                return;
            }
        };

        // Watch the directory so editors that replace the file are still seen
        if let Err(e) = watcher.watch(&config_dir, RecursiveMode::NonRecursive) {
            error!("Failed to watch config directory: {}", e);
            return;
        }

        debug!("Config watcher started for {:?}", config_path);

        while wait_for_settled_change(&rx, &config_path, CONFIG_DEBOUNCE_DURATION) {
            debug!("Config file changed, attempting reload");

            let reloaded = match load_and_validate_config() {
                Ok(new_config) => UserEvent::ConfigReloaded(new_config),
                Err(e) => UserEvent::ConfigReloadFailed(format!(
                    "Config reload failed, keeping previous settings: {:#}",
                    e
                )),
            };
            if proxy.send_event(reloaded).is_err() {
                break;
            }
        }
    })
}

/// Block until `path` changes and then stays untouched for `quiet`.
///
/// Editors and `fs::write` produce bursts (truncate, write, rename), so the
/// reload waits for the last event of a burst. Returns false once the event
/// source is gone with no change pending.
fn wait_for_settled_change(rx: &Receiver<WatchResult>, path: &Path, quiet: Duration) -> bool {
    loop {
        match rx.recv() {
            Ok(result) if touches(&result, path) => break,
            Ok(_) => {}
            Err(_) => return false,
        }
    }

    let mut deadline = Instant::now() + quiet;
    loop {
        match rx.recv_deadline(deadline) {
            Ok(result) => {
                if touches(&result, path) {
                    deadline = Instant::now() + quiet;
                }
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return true,
        }
    }
}

fn touches(result: &WatchResult, path: &Path) -> bool {
    match result {
        Ok(event) => {
            matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                && event.paths.iter().any(|p| p == path)
        }
        Err(e) => {
            error!("Config watch error: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use notify::event::{AccessKind, CreateKind, ModifyKind};

    use super::*;

    fn config_path() -> PathBuf {
        PathBuf::from("/home/user/.config/teams-desktop/config.json")
    }

    fn event(kind: EventKind, path: &Path) -> WatchResult {
        Ok(Event::new(kind).add_path(path.to_path_buf()))
    }

    fn modified(path: &Path) -> WatchResult {
        event(EventKind::Modify(ModifyKind::Any), path)
    }

    #[test]
    fn burst_settles_into_one_change() {
        let path = config_path();
        let (tx, rx) = crossbeam_channel::unbounded();
        // Truncate then write, as `fs::write` does.
        tx.send(modified(&path)).unwrap();
        tx.send(modified(&path)).unwrap();
        tx.send(modified(Path::new("/home/user/.config/teams-desktop/other"))).unwrap();

        assert!(wait_for_settled_change(&rx, &path, Duration::from_millis(20)));
        assert!(rx.is_empty());
    }

    #[test]
    fn late_write_extends_the_quiet_period() {
        let path = config_path();
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(modified(&path)).unwrap();

        let late_path = path.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            tx.send(modified(&late_path)).unwrap();
        });

        let started = Instant::now();
        assert!(wait_for_settled_change(&rx, &path, Duration::from_millis(100)));
        assert!(started.elapsed() >= Duration::from_millis(130));
        writer.join().unwrap();
    }

    #[test]
    fn unrelated_events_never_trigger() {
        let path = config_path();
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(event(EventKind::Access(AccessKind::Any), &path)).unwrap();
        tx.send(modified(Path::new("/tmp/config.json"))).unwrap();
        tx.send(Err(notify::Error::generic("watch failed"))).unwrap();
        drop(tx);

        assert!(!wait_for_settled_change(&rx, &path, Duration::from_millis(10)));
    }

    #[test]
    fn pending_change_survives_a_closed_source() {
        let path = config_path();
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(event(EventKind::Create(CreateKind::File), &path)).unwrap();
        drop(tx);

        assert!(wait_for_settled_change(&rx, &path, Duration::from_secs(5)));
        assert!(!wait_for_settled_change(&rx, &path, Duration::from_secs(5)));
    }
}
