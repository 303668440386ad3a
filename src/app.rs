use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use log::{debug, error, info, warn};
use tray_icon::menu::MenuEvent;
use tray_icon::{MouseButton, MouseButtonState, TrayIcon, TrayIconBuilder, TrayIconEvent};
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{Event, StartCause, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::window::Window;
use wry::{PageLoadEvent, Rect, WebContext, WebView, WebViewBuilder};

use crate::bridge::script::init_script;
use crate::bridge::{NotificationBridge, NotificationRequest, PageEvent, PageMessage, RelayChannel};
use crate::config::{Config, get_config_path, load_or_create_config};
use crate::instance::{self, Instance};
use crate::model::{MenuAction, UserEvent};
use crate::navigation::{NavigationPolicy, SharedPolicy, read_policy};
use crate::notify::DesktopNotifier;
use crate::platform::{self, SystemBrowser};
use crate::relay::NotificationRelay;
use crate::ui::icon::{install_notification_icon, load_tray_icon, load_window_icon};
use crate::ui::menu::{build_tooltip, build_tray_menu, parse_menu_action};
use crate::watcher::spawn_config_watcher;

// GTK has no thread of its own here, so Linux polls fast enough to keep the webview live
#[cfg(target_os = "linux")]
const POLL_INTERVAL: Duration = Duration::from_millis(16);
#[cfg(not(target_os = "linux"))]
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Relay channel backed by the event loop's user-event queue.
struct ProxyChannel(EventLoopProxy<UserEvent>);

impl RelayChannel for ProxyChannel {
    fn send(&self, request: NotificationRequest) -> Result<()> {
        self.0
            .send_event(UserEvent::ShowNotification(request))
            .map_err(|_| anyhow!("event loop closed"))
    }
}

/// The main window and the webview living in it.
struct Shell {
    // Dropped before the window it is attached to
    webview: Option<WebView>,
    window: Option<Window>,
    web_context: WebContext,
}

impl Shell {
    fn new(config: &Config) -> Self {
        Self {
            webview: None,
            window: None,
            web_context: WebContext::new(Some(config.data_directory())),
        }
    }

    fn open(
        &mut self,
        event_loop: &ActiveEventLoop,
        config: &Config,
        policy: &SharedPolicy,
        proxy: &EventLoopProxy<UserEvent>,
    ) -> Result<()> {
        let icon = load_window_icon()
            .map_err(|e| warn!("Window icon unavailable: {:#}", e))
            .ok();
        let attributes = Window::default_attributes()
            .with_title(&config.app.title)
            .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
            .with_min_inner_size(LogicalSize::new(
                config.window.min_width,
                config.window.min_height,
            ))
            .with_window_icon(icon);
        let window = event_loop
            .create_window(attributes)
            .context("failed to create window")?;

        let webview = build_webview(
            &window,
            &mut self.web_context,
            config,
            Arc::clone(policy),
            proxy.clone(),
        )?;
        info!("Loading {}", config.app.url);

        self.webview = Some(webview);
        self.window = Some(window);
        Ok(())
    }

    fn bring_to_front(&self) {
        match &self.window {
            Some(window) => {
                window.set_visible(true);
                window.set_minimized(false);
                window.focus_window();
            }
            None => debug!("No window to bring to front"),
        }
    }

    fn hide(&self) {
        if let Some(window) = &self.window {
            window.set_visible(false);
        }
    }

    fn toggle_visibility(&self) {
        let visible = self
            .window
            .as_ref()
            .and_then(|w| w.is_visible())
            .unwrap_or(false);
        if visible {
            self.hide();
        } else {
            self.bring_to_front();
        }
    }

    fn set_title(&self, title: &str) {
        if let Some(window) = &self.window {
            window.set_title(title);
        }
    }

    fn resize(&self, size: PhysicalSize<u32>) {
        let (Some(window), Some(webview)) = (&self.window, &self.webview) else {
            return;
        };
        let size = size.to_logical::<u32>(window.scale_factor());
        let bounds = Rect {
            position: wry::dpi::LogicalPosition::new(0, 0).into(),
            size: wry::dpi::LogicalSize::new(size.width, size.height).into(),
        };
        if let Err(e) = webview.set_bounds(bounds) {
            debug!("Failed to resize webview: {}", e);
        }
    }

    fn dispatch(&self, event: PageEvent) {
        let Some(webview) = &self.webview else {
            return;
        };
        match event.to_script() {
            Ok(script) => {
                if let Err(e) = webview.evaluate_script(&script) {
                    warn!("Failed to deliver {:?} to page: {}", event, e);
                }
            }
            Err(e) => error!("{:#}", e),
        }
    }
}

pub fn run() -> Result<()> {
    let config = load_or_create_config().context("failed to load configuration")?;
    let instance_guard = match instance::acquire(&config.data_directory())
        .context("failed to check for a running instance")?
    {
        Instance::Primary(guard) => guard,
        Instance::Secondary => {
            info!("Already running, handed over to the existing window");
            return Ok(());
        }
    };
    platform::prepare_environment(&config.system);

    #[cfg(target_os = "linux")]
    gtk::init().context("failed to initialize GTK")?;

    let policy: SharedPolicy = Arc::new(RwLock::new(NavigationPolicy::from_config(
        &config.navigation,
    )));

    #[allow(unused_mut)]
    let mut builder = EventLoop::<UserEvent>::with_user_event();
    #[cfg(target_os = "linux")]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        builder.with_x11();
    }
    let event_loop = builder.build().context("failed to create event loop")?;
    let proxy = event_loop.create_proxy();

    let _config_watcher = spawn_config_watcher(proxy.clone());
    let activation_proxy = proxy.clone();
    let _activation_listener = instance_guard.listen(move || {
        let _ = activation_proxy.send_event(UserEvent::SecondInstance);
    })?;

    let app_icon = install_notification_icon()
        .map_err(|e| warn!("Notification icon unavailable: {:#}", e))
        .ok();
    let mut relay = NotificationRelay::new(DesktopNotifier::start(), app_icon);
    relay.set_enabled(config.notifications.enabled);
    let relay_channel = ProxyChannel(proxy.clone());
    let mut bridge = NotificationBridge::new();

    let tray_icon = build_tray(&config).context("failed to create tray icon")?;
    let menu_receiver = MenuEvent::receiver().clone();
    let tray_receiver = TrayIconEvent::receiver().clone();

    let mut shell = Shell::new(&config);
    let mut config = config;
    let mut page_title = String::new();

    #[allow(deprecated)]
    let run_result = event_loop.run(move |event, event_loop| match event {
        Event::NewEvents(StartCause::Init) => {
            event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + POLL_INTERVAL));
        }
        Event::NewEvents(StartCause::ResumeTimeReached { .. }) => {
            // Poll tray events (replaces dedicated listener threads)
            while let Ok(event) = menu_receiver.try_recv() {
                if let Some(action) = parse_menu_action(event.id()) {
                    let _ = proxy.send_event(UserEvent::MenuAction(action));
                }
            }
            while let Ok(event) = tray_receiver.try_recv() {
                if let TrayIconEvent::Click {
                    button: MouseButton::Left,
                    button_state: MouseButtonState::Up,
                    ..
                } = event
                {
                    let _ = proxy.send_event(UserEvent::TrayActivated);
                }
            }
            event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + POLL_INTERVAL));
        }
        Event::Resumed => {
            if shell.window.is_none() {
                if let Err(e) = shell.open(event_loop, &config, &policy, &proxy) {
                    error!("Failed to open main window: {:#}", e);
                    event_loop.exit();
                }
            }
        }
        Event::AboutToWait => pump_gtk(),
        Event::WindowEvent { event, .. } => match event {
            // Closing keeps the app alive in the tray
            WindowEvent::CloseRequested => shell.hide(),
            WindowEvent::Resized(size) => shell.resize(size),
            _ => {}
        },
        Event::UserEvent(user_event) => match user_event {
            UserEvent::MenuAction(MenuAction::ShowWindow) => shell.bring_to_front(),
            UserEvent::MenuAction(MenuAction::EditConfig) => {
                platform::open_config_file(&get_config_path());
            }
            UserEvent::MenuAction(MenuAction::Quit) => {
                info!("Quit requested");
                event_loop.exit();
            }
            UserEvent::TrayActivated => shell.toggle_visibility(),
            UserEvent::SecondInstance => shell.bring_to_front(),
            UserEvent::Page(message) => {
                for page_event in bridge.handle(message, &relay_channel) {
                    shell.dispatch(page_event);
                }
            }
            UserEvent::PageLoadStarted => bridge.reset(),
            UserEvent::TitleChanged(title) => {
                page_title = title;
                let shown = if page_title.trim().is_empty() {
                    config.app.title.as_str()
                } else {
                    page_title.as_str()
                };
                shell.set_title(shown);
                update_tooltip(&tray_icon, &page_title, &config);
            }
            UserEvent::ShowNotification(request) => {
                let click_proxy = proxy.clone();
                relay.handle_show(request, move |signal| {
                    let _ = click_proxy.send_event(UserEvent::NotificationClicked(signal));
                });
            }
            UserEvent::NotificationClicked(signal) => {
                shell.bring_to_front();
                if let Some(page_event) = bridge.deliver_click(&signal) {
                    shell.dispatch(page_event);
                }
            }
            UserEvent::ConfigReloaded(new_config) => {
                match policy.write() {
                    Ok(mut current) => {
                        *current = NavigationPolicy::from_config(&new_config.navigation);
                    }
                    Err(e) => error!("Navigation policy lock poisoned: {}", e),
                }
                relay.set_enabled(new_config.notifications.enabled);
                if new_config.app != config.app || new_config.window != config.window {
                    info!("App and window settings apply after a restart");
                }
                config = new_config;
                update_tooltip(&tray_icon, &page_title, &config);
                info!("Configuration reloaded");
            }
            UserEvent::ConfigReloadFailed(message) => warn!("{}", message),
        },
        Event::LoopExiting => {
            drop(shell.webview.take());
            drop(shell.window.take());
        }
        _ => {}
    });

    run_result.context("event loop terminated with error")?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn pump_gtk() {
    while gtk::events_pending() {
        gtk::main_iteration_do(false);
    }
}

#[cfg(not(target_os = "linux"))]
fn pump_gtk() {}

fn build_webview(
    window: &Window,
    web_context: &mut WebContext,
    config: &Config,
    policy: SharedPolicy,
    proxy: EventLoopProxy<UserEvent>,
) -> Result<WebView> {
    let navigation_policy = Arc::clone(&policy);
    let popup_policy = policy;
    let ipc_proxy = proxy.clone();
    let load_proxy = proxy.clone();
    let title_proxy = proxy;
    let bridge_script = init_script();

    let builder = WebViewBuilder::with_web_context(web_context)
        .with_url(&config.app.url)
        .with_user_agent(&config.app.user_agent)
        .with_initialization_script(&bridge_script)
        .with_devtools(cfg!(debug_assertions))
        .with_clipboard(true)
        .with_autoplay(true)
        .with_new_window_req_handler(move |url| {
            read_policy(&popup_policy, false, |p| {
                p.decide_window_open(&url, &SystemBrowser).is_allowed()
            })
        })
        .with_ipc_handler(move |request| match PageMessage::parse(request.body()) {
            Ok(message) => {
                let _ = ipc_proxy.send_event(UserEvent::Page(message));
            }
            Err(e) => debug!("Ignoring page message: {:#}", e),
        })
        .with_on_page_load_handler(move |event, url| {
            if let PageLoadEvent::Started = event {
                debug!("Page load started: {}", url);
                let _ = load_proxy.send_event(UserEvent::PageLoadStarted);
            }
        })
        .with_document_title_changed_handler(move |title| {
            let _ = title_proxy.send_event(UserEvent::TitleChanged(title));
        });

    // WebKitGTK reports subframe loads here too; Linux filters in its own hooks
    #[cfg(not(target_os = "linux"))]
    let builder = builder.with_navigation_handler(move |url| {
        read_policy(&navigation_policy, false, |p| {
            p.decide_navigation(&url, &SystemBrowser).is_allowed()
        })
    });

    let webview = builder.build(window).context("failed to create webview")?;
    #[cfg(target_os = "linux")]
    platform::current::attach_webview_hooks(&webview, navigation_policy);
    Ok(webview)
}

fn build_tray(config: &Config) -> Result<TrayIcon> {
    let icon = load_tray_icon().context("failed to create tray icon image")?;
    let menu = build_tray_menu(&config.app.title).context("failed to build tray menu")?;
    let tooltip = build_tooltip("", &config.app.title, config.notifications.enabled);
    let tray = TrayIconBuilder::new()
        .with_icon(icon)
        .with_menu(Box::new(menu))
        .with_menu_on_left_click(false)
        .with_tooltip(tooltip)
        .build()
        .context("failed to build tray icon")?;
    tray.set_visible(true).context("failed to show tray icon")?;
    Ok(tray)
}

fn update_tooltip(tray_icon: &TrayIcon, page_title: &str, config: &Config) {
    let tooltip = build_tooltip(page_title, &config.app.title, config.notifications.enabled);
    if let Err(err) = tray_icon.set_tooltip(Some(tooltip.as_str())) {
        error!("Failed to update tooltip: {}", err);
    }
}
