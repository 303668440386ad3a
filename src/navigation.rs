//! Navigation policy filter.
//!
//! Every window-open request and every top-level in-place navigation of the
//! main webview passes through [`NavigationPolicy`]. Hosts on the matching
//! allow-list stay in the app; everything else is handed to the system
//! browser and never loaded in-app.

use std::sync::{Arc, RwLock};

use log::{debug, error, info, warn};
use url::Url;

use crate::config::NavigationConfig;

/// Schemes worth handing to the desktop when a navigation is denied.
/// Anything else (`about:`, `data:`, `javascript:`, ...) is only blocked.
const EXTERNAL_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// `about:` documents that carry no content of their own.
const INERT_ABOUT_PAGES: &[&str] = &["blank", "srcdoc"];

/// Policy shared between the event loop and webview callbacks; swapped on config reload.
pub type SharedPolicy = Arc<RwLock<NavigationPolicy>>;

/// Run `decide` against the current policy, or return `fallback` if the lock is poisoned.
pub fn read_policy<T>(
    policy: &SharedPolicy,
    fallback: T,
    decide: impl FnOnce(&NavigationPolicy) -> T,
) -> T {
    match policy.read() {
        Ok(policy) => decide(&policy),
        Err(e) => {
            error!("Navigation policy lock poisoned: {}", e);
            fallback
        }
    }
}

/// Something that can open a URL outside the app.
pub trait ExternalOpener {
    fn open_external(&self, url: &str);
}

/// Outcome of a window-open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOpenDecision {
    AllowInApp,
    DenyAndOpenExternally,
}

impl WindowOpenDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::AllowInApp)
    }
}

/// Outcome of a same-window navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    DenyAndOpenExternally,
}

impl NavigationDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Outcome of screening a navigation before its target frame is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameScreen {
    /// Inert frame document; load it.
    Allow,
    /// Network load; decide with [`NavigationPolicy::decide_navigation`] once it
    /// turns out to be the main frame's document.
    Defer,
    /// Blocked here.
    Deny,
}

/// Where a navigation attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOrigin {
    WindowOpen,
    InPlace,
}

/// Lowercase and drop a single trailing root dot.
fn normalize_host(host: &str) -> String {
    host.strip_suffix('.').unwrap_or(host).to_ascii_lowercase()
}

/// True if `host` is `entry` or a strict subdomain of it.
///
/// The subdomain check requires a dot boundary, so `evilteams.microsoft.com`
/// does not match `teams.microsoft.com`.
pub fn host_matches(host: &str, entry: &str) -> bool {
    let host = normalize_host(host);
    let entry = normalize_host(entry);
    if entry.is_empty() {
        return false;
    }
    host == entry
        || host
            .strip_suffix(entry.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// A set of domains, each matching itself and its subdomains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    domains: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut domains: Vec<String> = domains
            .into_iter()
            .map(|d| normalize_host(d.as_ref().trim()))
            .filter(|d| !d.is_empty())
            .collect();
        domains.dedup();
        Self { domains }
    }

    pub fn permits_host(&self, host: &str) -> bool {
        self.domains.iter().any(|entry| host_matches(host, entry))
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }
}

/// The two independently configured allow-lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationPolicy {
    window_open: AllowList,
    in_place: AllowList,
}

impl NavigationPolicy {
    pub fn new(window_open: AllowList, in_place: AllowList) -> Self {
        Self {
            window_open,
            in_place,
        }
    }

    pub fn from_config(config: &NavigationConfig) -> Self {
        Self::new(
            AllowList::new(&config.window_open_domains),
            AllowList::new(&config.in_place_domains),
        )
    }

    /// Decide a `window.open` / `target=_blank` request.
    ///
    /// On deny the URL has already been handed to `opener` when this returns.
    pub fn decide_window_open(
        &self,
        target_url: &str,
        opener: &dyn ExternalOpener,
    ) -> WindowOpenDecision {
        if self.permits(IntentOrigin::WindowOpen, target_url, opener) {
            WindowOpenDecision::AllowInApp
        } else {
            WindowOpenDecision::DenyAndOpenExternally
        }
    }

    /// Decide a top-level navigation of the existing window.
    ///
    /// On deny the URL has already been handed to `opener` when this returns.
    pub fn decide_navigation(
        &self,
        target_url: &str,
        opener: &dyn ExternalOpener,
    ) -> NavigationDecision {
        if self.permits(IntentOrigin::InPlace, target_url, opener) {
            NavigationDecision::Allow
        } else {
            NavigationDecision::DenyAndOpenExternally
        }
    }

    /// Screen a navigation whose frame is not known yet.
    ///
    /// `http`/`https` loads are deferred, `about:blank` and `about:srcdoc`
    /// pass. Any other target is denied; it reaches `opener` only when the
    /// user initiated it, so subframes never push URLs to the desktop.
    pub fn screen_navigation(
        &self,
        target_url: &str,
        user_initiated: bool,
        opener: &dyn ExternalOpener,
    ) -> FrameScreen {
        let url = match Url::parse(target_url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Blocking unparseable frame target {:?}: {}", target_url, e);
                return FrameScreen::Deny;
            }
        };
        match url.scheme() {
            "http" | "https" => FrameScreen::Defer,
            "about" if INERT_ABOUT_PAGES.contains(&url.path()) => FrameScreen::Allow,
            _ if user_initiated => {
                if self.permits(IntentOrigin::InPlace, target_url, opener) {
                    FrameScreen::Allow
                } else {
                    FrameScreen::Deny
                }
            }
            _ => {
                debug!("Blocking frame navigation to {}", url);
                FrameScreen::Deny
            }
        }
    }

    fn list_for(&self, origin: IntentOrigin) -> &AllowList {
        match origin {
            IntentOrigin::WindowOpen => &self.window_open,
            IntentOrigin::InPlace => &self.in_place,
        }
    }

    fn permits(
        &self,
        origin: IntentOrigin,
        target_url: &str,
        opener: &dyn ExternalOpener,
    ) -> bool {
        let url = match Url::parse(target_url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Blocking unparseable {:?} target {:?}: {}", origin, target_url, e);
                return false;
            }
        };

        let list = self.list_for(origin);
        if url.host_str().is_some_and(|host| list.permits_host(host)) {
            debug!("Allowing {:?} navigation to {}", origin, url);
            return true;
        }

        if EXTERNAL_SCHEMES.contains(&url.scheme()) {
            info!("Opening {} in the system browser", url);
            opener.open_external(url.as_str());
        } else {
            debug!("Blocking {:?} navigation to {}", origin, url);
        }
        false
    }
}
