//! Linux: xdg-open for hand-offs, WebKitGTK environment switches and hooks.

use std::env;
use std::io;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use gtk::glib::{self, object::Cast};
use log::{info, warn};
use webkit2gtk::{
    NavigationPolicyDecision, NavigationPolicyDecisionExt, NavigationType, PolicyDecision,
    PolicyDecisionExt, PolicyDecisionType, ResponsePolicyDecision, ResponsePolicyDecisionExt,
    URIRequestExt, WebProcessTerminationReason, WebViewExt,
};
use wry::WebViewExtUnix;

use super::SystemBrowser;
use crate::navigation::{FrameScreen, SharedPolicy, read_policy};

const CRASH_RELOAD_DELAY: Duration = Duration::from_secs(1);

pub fn open_url(url: &str) -> io::Result<()> {
    Command::new("xdg-open").arg(url).spawn().map(|_| ())
}

pub fn open_file(path: &Path) -> io::Result<()> {
    Command::new("xdg-open").arg(path).spawn().map(|_| ())
}

pub fn prepare_environment(disable_gpu: bool) {
    // SAFETY: called from main before any other thread is spawned.
    unsafe {
        // winit runs on X11 here, so GTK must follow
        env::set_var("GDK_BACKEND", "x11");
        if disable_gpu {
            info!("Disabling GPU compositing for the webview");
            env::set_var("WEBKIT_DISABLE_COMPOSITING_MODE", "1");
            env::set_var("WEBKIT_DISABLE_DMABUF_RENDERER", "1");
        }
    }
}

/// Navigation filtering and crash recovery on the underlying WebKitGTK view.
///
/// WebKitGTK raises navigation-action decisions for subframes as well and
/// does not say which frame is navigating. Those decisions are only
/// screened; the allow-list is applied to the main frame's document
/// response, which WebKit does identify.
pub fn attach_webview_hooks(webview: &wry::WebView, policy: SharedPolicy) {
    let view = webview.webview();

    view.connect_decide_policy(move |_, decision, kind| match kind {
        PolicyDecisionType::NavigationAction => screen_navigation_action(&policy, decision),
        PolicyDecisionType::Response => filter_main_frame_response(&policy, decision),
        _ => false,
    });

    view.connect_web_process_terminated(|view, reason| {
        if reason == WebProcessTerminationReason::TerminatedByApi {
            return;
        }
        warn!("Web process terminated ({:?}), reloading", reason);
        let view = view.clone();
        glib::timeout_add_local_once(CRASH_RELOAD_DELAY, move || view.reload());
    });
}

/// Returns true when the decision was taken here.
fn screen_navigation_action(policy: &SharedPolicy, decision: &PolicyDecision) -> bool {
    let Some(mut action) = decision
        .downcast_ref::<NavigationPolicyDecision>()
        .and_then(|d| d.navigation_action())
    else {
        return false;
    };
    let Some(uri) = action.request().and_then(|request| request.uri()) else {
        return false;
    };
    let user_initiated =
        action.is_user_gesture() || action.navigation_type() == NavigationType::LinkClicked;

    let screen = read_policy(policy, FrameScreen::Deny, |p| {
        p.screen_navigation(&uri, user_initiated, &SystemBrowser)
    });
    if screen == FrameScreen::Deny {
        decision.ignore();
        return true;
    }
    false
}

fn filter_main_frame_response(policy: &SharedPolicy, decision: &PolicyDecision) -> bool {
    let Some(response) = decision.downcast_ref::<ResponsePolicyDecision>() else {
        return false;
    };
    if !response.is_main_frame_main_resource() {
        return false;
    }
    let Some(uri) = response.request().and_then(|request| request.uri()) else {
        return false;
    };

    let allowed = read_policy(policy, false, |p| {
        p.decide_navigation(&uri, &SystemBrowser).is_allowed()
    });
    if !allowed {
        decision.ignore();
    }
    !allowed
}
