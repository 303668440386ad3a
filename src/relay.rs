//! Host-side half of the notification relay.

use std::path::PathBuf;

use log::debug;

use crate::bridge::{ClickSignal, NotificationRequest};

/// Callback run when the user clicks a shown notification.
pub type ClickHandler = Box<dyn FnOnce() + Send + 'static>;

/// What actually reaches the OS notification service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub title: String,
    pub body: String,
    pub icon: Option<PathBuf>,
    pub tag: String,
}

pub trait NativeNotifier {
    fn is_supported(&self) -> bool;
    fn show(&self, toast: Toast, on_click: ClickHandler);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowOutcome {
    Shown,
    Disabled,
    Unsupported,
}

/// Renders relayed requests as native notifications.
///
/// The page-supplied icon is ignored; every toast carries the bundled app icon.
pub struct NotificationRelay<N> {
    notifier: N,
    app_icon: Option<PathBuf>,
    enabled: bool,
}

impl<N: NativeNotifier> NotificationRelay<N> {
    pub fn new(notifier: N, app_icon: Option<PathBuf>) -> Self {
        Self {
            notifier,
            app_icon,
            enabled: true,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn handle_show<F>(&self, request: NotificationRequest, on_click: F) -> ShowOutcome
    where
        F: FnOnce(ClickSignal) + Send + 'static,
    {
        if !self.enabled {
            debug!("Notifications disabled, dropping {}", request.tag);
            return ShowOutcome::Disabled;
        }
        if !self.notifier.is_supported() {
            debug!("Native notifications unsupported, dropping {}", request.tag);
            return ShowOutcome::Unsupported;
        }

        let NotificationRequest {
            title,
            body,
            icon,
            tag,
        } = request;
        if !icon.is_empty() {
            debug!("Ignoring page icon {} for {}", icon, tag);
        }

        let toast = Toast {
            title,
            body,
            icon: self.app_icon.clone(),
            tag: tag.clone(),
        };
        self.notifier
            .show(toast, Box::new(move || on_click(ClickSignal { tag })));
        ShowOutcome::Shown
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::mpsc;

    use super::*;

    #[derive(Default)]
    struct FakeNotifier {
        unsupported: bool,
        shown: RefCell<Vec<(Toast, ClickHandler)>>,
    }

    impl NativeNotifier for FakeNotifier {
        fn is_supported(&self) -> bool {
            !self.unsupported
        }

        fn show(&self, toast: Toast, on_click: ClickHandler) {
            self.shown.borrow_mut().push((toast, on_click));
        }
    }

    fn request(tag: &str) -> NotificationRequest {
        NotificationRequest {
            title: "Bob".into(),
            body: "lunch?".into(),
            icon: "https://example.com/bob.png".into(),
            tag: tag.into(),
        }
    }

    #[test]
    fn shows_once_with_bundled_icon() {
        let icon = Some(PathBuf::from("/tmp/icon.png"));
        let relay = NotificationRelay::new(FakeNotifier::default(), icon);

        let outcome = relay.handle_show(request("T"), |_| {});

        assert_eq!(outcome, ShowOutcome::Shown);
        let shown = relay.notifier.shown.borrow();
        assert_eq!(shown.len(), 1);
        assert_eq!(
            shown[0].0,
            Toast {
                title: "Bob".into(),
                body: "lunch?".into(),
                icon: Some(PathBuf::from("/tmp/icon.png")),
                tag: "T".into(),
            }
        );
    }

    #[test]
    fn click_carries_the_request_tag() {
        let relay = NotificationRelay::new(FakeNotifier::default(), None);
        let (tx, rx) = mpsc::channel();

        relay.handle_show(request("chat-7"), move |signal| {
            tx.send(signal).unwrap();
        });
        let (_, on_click) = relay.notifier.shown.borrow_mut().remove(0);
        on_click();

        assert_eq!(rx.recv().unwrap(), ClickSignal { tag: "chat-7".into() });
    }

    #[test]
    fn unsupported_platform_drops_silently() {
        let notifier = FakeNotifier {
            unsupported: true,
            ..Default::default()
        };
        let relay = NotificationRelay::new(notifier, None);

        assert_eq!(relay.handle_show(request("T"), |_| {}), ShowOutcome::Unsupported);
        assert!(relay.notifier.shown.borrow().is_empty());
    }

    #[test]
    fn disabled_relay_drops_silently() {
        let mut relay = NotificationRelay::new(FakeNotifier::default(), None);
        relay.set_enabled(false);

        assert_eq!(relay.handle_show(request("T"), |_| {}), ShowOutcome::Disabled);
        assert!(relay.notifier.shown.borrow().is_empty());

        relay.set_enabled(true);
        assert_eq!(relay.handle_show(request("T"), |_| {}), ShowOutcome::Shown);
    }
}
