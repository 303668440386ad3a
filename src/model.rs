use crate::bridge::{ClickSignal, NotificationRequest, PageMessage};
use crate::config::Config;

#[derive(Debug)]
pub enum UserEvent {
    MenuAction(MenuAction),
    TrayActivated,
    /// A later launch asked for the window.
    SecondInstance,
    Page(PageMessage),
    PageLoadStarted,
    TitleChanged(String),
    ShowNotification(NotificationRequest),
    NotificationClicked(ClickSignal),
    ConfigReloaded(Config),
    ConfigReloadFailed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuAction {
    ShowWindow,
    EditConfig,
    Quit,
}
