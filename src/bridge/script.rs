//! JavaScript side of the bridge, injected before any page script runs.

use anyhow::{Context, Result};

use super::{MAX_PENDING_LISTENERS, PageEvent};

/// Global the shim exposes for host-to-page events.
pub const BRIDGE_GLOBAL: &str = "__teamsDesktop";

const MAX_LIVE_PLACEHOLDER: &str = "__MAX_LIVE__";

// Page objects are identified by a per-page `instance` counter. `onshow`
// and `onclick` only fire when the host dispatches the matching event,
// which always happens after the constructor has returned. Without a
// usable `window.ipc` the object degrades to a local no-op that still
// fires `onshow` on the next tick.
const INIT_SCRIPT_TEMPLATE: &str = r#"
(function () {
  'use strict';
  if (window.__teamsDesktop) {
    return;
  }

  const MAX_LIVE = __MAX_LIVE__;
  // instance -> { target, closed, shown }
  const live = new Map();
  let nextInstance = 1;

  function post(message) {
    try {
      if (!window.ipc || typeof window.ipc.postMessage !== 'function') {
        return false;
      }
      window.ipc.postMessage(JSON.stringify(message));
      return true;
    } catch (_) {
      return false;
    }
  }

  function fire(target, type) {
    const event = new Event(type);
    const handler = target['on' + type];
    try {
      if (typeof handler === 'function') {
        handler.call(target, event);
      }
      target.dispatchEvent(event);
    } catch (err) {
      console.error('notification ' + type + ' handler failed', err);
    }
  }

  function track(instance, target) {
    live.set(instance, { target: target, closed: false, shown: false });
    while (live.size > MAX_LIVE) {
      live.delete(live.keys().next().value);
    }
  }

  class DesktopNotification extends EventTarget {
    constructor(title, options) {
      super();
      const opts = options || {};
      this.title = title === undefined ? '' : String(title);
      this.body = opts.body ? String(opts.body) : '';
      this.icon = opts.icon ? String(opts.icon) : '';
      this.tag = opts.tag ? String(opts.tag) : '';
      this.data = opts.data === undefined ? null : opts.data;
      this.onclick = null;
      this.onclose = null;
      this.onerror = null;
      this.onshow = null;

      const instance = nextInstance++;
      Object.defineProperty(this, '_instance', { value: instance });
      Object.defineProperty(this, '_closed', { value: false, writable: true });
      track(instance, this);

      const sent = post({
        type: 'construct',
        instance: instance,
        title: this.title,
        body: this.body,
        icon: this.icon,
        tag: this.tag,
      });
      if (!sent) {
        live.delete(instance);
        setTimeout(() => {
          if (!this._closed) {
            fire(this, 'show');
          }
        }, 0);
      }
    }

    close() {
      if (this._closed) {
        return;
      }
      this._closed = true;
      const entry = live.get(this._instance);
      if (entry) {
        entry.closed = true;
        post({ type: 'close', instance: this._instance });
        if (entry.shown) {
          live.delete(this._instance);
        }
      }
      fire(this, 'close');
    }

    static get permission() {
      return 'granted';
    }

    static requestPermission(callback) {
      if (typeof callback === 'function') {
        callback('granted');
      }
      return Promise.resolve('granted');
    }

    static get maxActions() {
      return 0;
    }
  }

  Object.defineProperty(window, '__teamsDesktop', {
    value: Object.freeze({
      dispatch(event) {
        const entry = live.get(event.instance);
        if (!entry) {
          return;
        }
        if (event.type === 'shown') {
          if (entry.closed) {
            live.delete(event.instance);
            return;
          }
          entry.shown = true;
          fire(entry.target, 'show');
        } else if (event.type === 'clicked') {
          live.delete(event.instance);
          if (!entry.closed) {
            fire(entry.target, 'click');
          }
        } else if (event.type === 'expired') {
          live.delete(event.instance);
        }
      },
      pending() {
        return live.size;
      },
    }),
  });

  window.Notification = DesktopNotification;
})();
"#;

/// Script that replaces `window.Notification` with a constructor forwarding
/// to the host. The page keeps at most as many live objects as the host
/// keeps listeners.
pub fn init_script() -> String {
    INIT_SCRIPT_TEMPLATE.replace(MAX_LIVE_PLACEHOLDER, &MAX_PENDING_LISTENERS.to_string())
}

impl PageEvent {
    /// Script that hands this event to the shim's dispatcher.
    pub fn to_script(&self) -> Result<String> {
        let payload = serde_json::to_string(self).context("failed to encode page event")?;
        Ok(format!(
            "window.{BRIDGE_GLOBAL} && window.{BRIDGE_GLOBAL}.dispatch({payload});"
        ))
    }
}

#[cfg(test)]
mod tests {
    use boa_engine::{Context, JsValue, Source};

    use super::*;
    use crate::bridge::{
        ClickSignal, NotificationBridge, NotificationRequest, PageMessage, RelayChannel,
    };

    // Just enough of a browser window for the shim to run.
    const WINDOW_STUB: &str = r#"
        var window = globalThis;
        var posted = [];
        var timers = [];
        var errors = [];
        var console = {
          error: function () { errors.push(Array.prototype.join.call(arguments, ' ')); },
        };
        function setTimeout(fn) { timers.push(fn); return timers.length; }
        function runTimers() {
          var due = timers;
          timers = [];
          due.forEach(function (fn) { fn(); });
        }
        globalThis.Event = class {
          constructor(type) { this.type = type; }
        };
        globalThis.EventTarget = class {
          constructor() { this.listeners = {}; }
          addEventListener(type, fn) {
            (this.listeners[type] = this.listeners[type] || []).push(fn);
          }
          dispatchEvent(event) {
            (this.listeners[event.type] || []).forEach((fn) => fn.call(this, event));
            return true;
          }
        };
        window.ipc = { postMessage: function (raw) { posted.push(JSON.parse(raw)); } };
    "#;

    struct AcceptingChannel;

    impl RelayChannel for AcceptingChannel {
        fn send(&self, _request: NotificationRequest) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Page {
        context: Context,
    }

    impl Page {
        fn load() -> Self {
            Self::load_with("")
        }

        fn load_with(setup: &str) -> Self {
            let mut page = Self {
                context: Context::default(),
            };
            page.eval(WINDOW_STUB);
            page.eval(setup);
            page.eval(&init_script());
            page
        }

        fn eval(&mut self, source: &str) -> JsValue {
            self.context
                .eval(Source::from_bytes(source))
                .unwrap_or_else(|e| panic!("script failed: {e}\n{source}"))
        }

        fn json(&mut self, expression: &str) -> String {
            let value = self.eval(&format!("JSON.stringify({expression})"));
            value
                .as_string()
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_else(|| panic!("{expression} is not serializable"))
        }

        /// Feed everything the page posted through the bridge and dispatch the replies.
        fn relay(&mut self, bridge: &mut NotificationBridge) {
            while self.json("posted.length") != "0" {
                let raw = self.json("posted.shift()");
                let message = PageMessage::parse(&raw).unwrap();
                for event in bridge.handle(message, &AcceptingChannel) {
                    self.dispatch(event);
                }
            }
        }

        fn dispatch(&mut self, event: PageEvent) {
            self.eval(&event.to_script().unwrap());
        }

        fn pending(&mut self) -> String {
            self.json(&format!("window.{BRIDGE_GLOBAL}.pending()"))
        }
    }

    #[test]
    fn events_render_as_dispatch_calls() {
        assert_eq!(
            PageEvent::Shown { instance: 4 }.to_script().unwrap(),
            r#"window.__teamsDesktop && window.__teamsDesktop.dispatch({"type":"shown","instance":4});"#
        );
        assert_eq!(
            PageEvent::Expired { instance: 9 }.to_script().unwrap(),
            r#"window.__teamsDesktop && window.__teamsDesktop.dispatch({"type":"expired","instance":9});"#
        );
    }

    #[test]
    fn onshow_fires_after_the_constructor_returns() {
        let mut page = Page::load();
        let mut bridge = NotificationBridge::new();
        page.eval(
            r#"
            var log = [];
            var n = new Notification('Alice', { body: 'hi', tag: 'chat-1' });
            n.onshow = function () { log.push('show'); };
            log.push('constructed');
            "#,
        );

        assert_eq!(page.json("log"), r#"["constructed"]"#);
        assert_eq!(
            page.json("posted"),
            r#"[{"type":"construct","instance":1,"title":"Alice","body":"hi","icon":"","tag":"chat-1"}]"#
        );

        page.relay(&mut bridge);
        assert_eq!(page.json("log"), r#"["constructed","show"]"#);
    }

    #[test]
    fn click_reaches_only_the_matching_object() {
        let mut page = Page::load();
        let mut bridge = NotificationBridge::new();
        page.eval(
            r#"
            var clicks = [];
            var a = new Notification('a', { tag: 'T' });
            var b = new Notification('b', { tag: 'U' });
            a.onclick = function () { clicks.push('a'); };
            b.addEventListener('click', function () { clicks.push('b'); });
            "#,
        );
        page.relay(&mut bridge);

        let clicked = bridge.deliver_click(&ClickSignal { tag: "U".into() }).unwrap();
        page.dispatch(clicked);
        // A repeated click for the same object is a no-op.
        page.dispatch(clicked);

        assert_eq!(page.json("clicks"), r#"["b"]"#);
        assert_eq!(page.pending(), "1");
    }

    #[test]
    fn missing_ipc_degrades_to_a_local_show() {
        let mut page = Page::load_with("delete window.ipc;");
        page.eval(
            r#"
            var log = [];
            var n = new Notification('offline');
            n.onshow = function () { log.push('show'); };
            "#,
        );

        assert_eq!(page.json("log"), "[]");
        page.eval("runTimers()");
        assert_eq!(page.json("log"), r#"["show"]"#);
        assert_eq!(page.pending(), "0");
    }

    #[test]
    fn close_fires_onclose_and_suppresses_a_later_click() {
        let mut page = Page::load();
        let mut bridge = NotificationBridge::new();
        page.eval(
            r#"
            var log = [];
            var n = new Notification('a', { tag: 'T' });
            n.onclick = function () { log.push('click'); };
            n.onclose = function () { log.push('close'); };
            "#,
        );
        page.relay(&mut bridge);
        page.eval("n.close(); n.close();");

        assert_eq!(page.json("posted"), r#"[{"type":"close","instance":1}]"#);
        page.relay(&mut bridge);
        assert_eq!(bridge.deliver_click(&ClickSignal { tag: "T".into() }), None);
        // Even a stray click event for the object is ignored.
        page.dispatch(PageEvent::Clicked { instance: 1 });

        assert_eq!(page.json("log"), r#"["close"]"#);
        assert_eq!(page.pending(), "0");
    }

    #[test]
    fn close_before_shown_skips_onshow() {
        let mut page = Page::load();
        let mut bridge = NotificationBridge::new();
        page.eval(
            r#"
            var log = [];
            var n = new Notification('a');
            n.onshow = function () { log.push('show'); };
            n.onclose = function () { log.push('close'); };
            n.close();
            "#,
        );
        page.relay(&mut bridge);

        assert_eq!(page.json("log"), r#"["close"]"#);
        assert_eq!(page.pending(), "0");
    }

    #[test]
    fn permission_is_always_granted() {
        let mut page = Page::load();
        page.eval(
            r#"
            var answered = null;
            var pending = Notification.requestPermission(function (p) { answered = p; });
            "#,
        );

        assert_eq!(page.json("Notification.permission"), r#""granted""#);
        assert_eq!(page.json("answered"), r#""granted""#);
        assert_eq!(page.eval("pending instanceof Promise").as_boolean(), Some(true));
    }

    #[test]
    fn unknown_instances_are_ignored() {
        let mut page = Page::load();
        page.dispatch(PageEvent::Shown { instance: 42 });
        page.dispatch(PageEvent::Clicked { instance: 42 });
        page.dispatch(PageEvent::Expired { instance: 42 });
        page.eval("window.__teamsDesktop.dispatch({ type: 'bogus', instance: 1 })");

        assert_eq!(page.json("errors"), "[]");
        assert_eq!(page.pending(), "0");
    }

    #[test]
    fn reused_tags_release_superseded_objects() {
        let mut page = Page::load();
        let mut bridge = NotificationBridge::new();
        page.eval(
            r#"
            for (var i = 0; i < 300; i++) {
              new Notification('ringing', { tag: 'same' });
            }
            "#,
        );
        page.relay(&mut bridge);

        assert_eq!(bridge.pending(), 1);
        assert_eq!(page.pending(), "1");
    }

    #[test]
    fn page_keeps_no_more_objects_than_the_host() {
        let mut page = Page::load();
        page.eval(&format!(
            "for (var i = 0; i < {}; i++) {{ new Notification('n' + i); }}",
            MAX_PENDING_LISTENERS + 10
        ));

        assert_eq!(page.pending(), MAX_PENDING_LISTENERS.to_string());
    }
}
