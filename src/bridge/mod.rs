//! Page-side half of the notification relay.
//!
//! The page sees a `Notification` constructor injected by [`script::init_script`].
//! That shim only forwards `construct`/`close` calls here; correlation ids,
//! click listeners and the relay hand-off all live in [`NotificationBridge`].

pub mod script;

use std::collections::{HashMap, VecDeque};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on notifications waiting for a click.
pub const MAX_PENDING_LISTENERS: usize = 256;

/// A notification the page asked to show. `tag` is the effective correlation id.
///
/// Not `Clone`; each request is shown at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub tag: String,
}

/// The user clicked the native notification carrying `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickSignal {
    pub tag: String,
}

/// Transport from the bridge to the host notification handler.
pub trait RelayChannel {
    fn send(&self, request: NotificationRequest) -> Result<()>;
}

/// Options the page passed to `new Notification(title, options)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub tag: String,
}

/// Messages posted by the page shim through `window.ipc`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageMessage {
    Construct {
        instance: u64,
        #[serde(default)]
        title: String,
        #[serde(default)]
        body: String,
        #[serde(default)]
        icon: String,
        #[serde(default)]
        tag: String,
    },
    Close {
        instance: u64,
    },
}

impl PageMessage {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("malformed page message")
    }
}

/// Events delivered back into the page shim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageEvent {
    Shown { instance: u64 },
    Clicked { instance: u64 },
    /// No click can reach this object any more; the page drops its handle.
    Expired { instance: u64 },
}

/// Correlates page notification objects with native click signals.
#[derive(Debug)]
pub struct NotificationBridge {
    listeners: HashMap<String, u64>,
    tags_by_instance: HashMap<u64, String>,
    order: VecDeque<(String, u64)>,
    expired: Vec<u64>,
    capacity: usize,
}

impl Default for NotificationBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBridge {
    pub fn new() -> Self {
        Self::with_capacity(MAX_PENDING_LISTENERS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            listeners: HashMap::new(),
            tags_by_instance: HashMap::new(),
            order: VecDeque::new(),
            expired: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Dispatch one message from the page.
    ///
    /// Returns the events to send back, in delivery order: `Shown` first,
    /// then `Expired` for every page object that lost its listener.
    pub fn handle(&mut self, message: PageMessage, channel: &dyn RelayChannel) -> Vec<PageEvent> {
        let mut events = Vec::new();
        match message {
            PageMessage::Construct {
                instance,
                title,
                body,
                icon,
                tag,
            } => {
                let options = NotificationOptions { body, icon, tag };
                let (_, shown) = self.construct(instance, title, options, channel);
                events.push(shown);
            }
            PageMessage::Close { instance } => self.close(instance),
        }
        events.extend(self.take_expired());
        events
    }

    /// Register page object `instance` and hand its request to the relay.
    ///
    /// Returns the effective correlation id and the `Shown` event, which the
    /// caller delivers to the page once the constructor has returned there.
    /// The `Shown` event is produced even when the channel is gone.
    pub fn construct(
        &mut self,
        instance: u64,
        title: String,
        options: NotificationOptions,
        channel: &dyn RelayChannel,
    ) -> (String, PageEvent) {
        let tag = if options.tag.is_empty() {
            fresh_tag()
        } else {
            options.tag
        };

        self.register(tag.clone(), instance);

        let request = NotificationRequest {
            title,
            body: options.body,
            icon: options.icon,
            tag: tag.clone(),
        };
        if let Err(e) = channel.send(request) {
            warn!("Notification {} not relayed: {:#}", tag, e);
            self.unregister_instance(instance);
            self.expired.push(instance);
        }

        (tag, PageEvent::Shown { instance })
    }

    /// Local close: the listener goes away, the native notification stays.
    pub fn close(&mut self, instance: u64) {
        if let Some(tag) = self.unregister_instance(instance) {
            debug!("Notification {} closed by page", tag);
        }
    }

    /// Consume the listener for `signal.tag`, at most once.
    pub fn deliver_click(&mut self, signal: &ClickSignal) -> Option<PageEvent> {
        let instance = self.listeners.remove(&signal.tag)?;
        self.tags_by_instance.remove(&instance);
        Some(PageEvent::Clicked { instance })
    }

    /// Forget every listener. Used when the page reloads.
    pub fn reset(&mut self) {
        if !self.listeners.is_empty() {
            debug!("Dropping {} pending notification listeners", self.listeners.len());
        }
        self.listeners.clear();
        self.tags_by_instance.clear();
        self.order.clear();
        self.expired.clear();
    }

    pub fn pending(&self) -> usize {
        self.listeners.len()
    }

    fn register(&mut self, tag: String, instance: u64) {
        if let Some(previous) = self.listeners.insert(tag.clone(), instance) {
            if previous != instance {
                debug!("Tag {} reused, superseding listener {}", tag, previous);
                self.tags_by_instance.remove(&previous);
                self.expired.push(previous);
            }
        }
        if let Some(stale_tag) = self.tags_by_instance.insert(instance, tag.clone()) {
            if stale_tag != tag && self.is_live(&stale_tag, instance) {
                self.listeners.remove(&stale_tag);
            }
        }
        self.order.push_back((tag, instance));
        self.evict_overflow();
    }

    fn unregister_instance(&mut self, instance: u64) -> Option<String> {
        let tag = self.tags_by_instance.remove(&instance)?;
        if self.listeners.get(&tag) == Some(&instance) {
            self.listeners.remove(&tag);
        }
        Some(tag)
    }

    fn take_expired(&mut self) -> Vec<PageEvent> {
        self.expired
            .drain(..)
            .map(|instance| PageEvent::Expired { instance })
            .collect()
    }

    fn is_live(&self, tag: &str, instance: u64) -> bool {
        self.listeners.get(tag) == Some(&instance)
    }

    fn evict_overflow(&mut self) {
        while self.listeners.len() > self.capacity {
            let Some((tag, instance)) = self.order.pop_front() else {
                break;
            };
            if self.is_live(&tag, instance) {
                debug!("Evicting oldest notification listener {}", tag);
                self.listeners.remove(&tag);
                self.tags_by_instance.remove(&instance);
                self.expired.push(instance);
            }
        }
        // Clicked and closed entries leave stale rows behind.
        if self.order.len() > self.capacity * 2 {
            let live: VecDeque<_> = std::mem::take(&mut self.order)
                .into_iter()
                .filter(|(tag, instance)| self.is_live(tag, *instance))
                .collect();
            self.order = live;
        }
    }
}

fn fresh_tag() -> String {
    format!("notif-{}", Uuid::new_v4())
}
