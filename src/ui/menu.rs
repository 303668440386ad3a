use anyhow::Result;
use tray_icon::menu::{Menu, MenuId, MenuItem, PredefinedMenuItem};

use crate::model::MenuAction;

const MENU_ID_SHOW: &str = "show";
const MENU_ID_EDIT_CONFIG: &str = "edit_config";
const MENU_ID_QUIT: &str = "quit";

pub fn build_tray_menu(app_title: &str) -> Result<Menu> {
    let menu = Menu::new();

    let show_item = MenuItem::with_id(MENU_ID_SHOW, format!("Show {}", app_title), true, None);
    menu.append(&show_item)?;

    let edit_config_item =
        MenuItem::with_id(MENU_ID_EDIT_CONFIG, "Edit Configuration...", true, None);
    menu.append(&edit_config_item)?;

    menu.append(&PredefinedMenuItem::separator())?;

    let quit_item = MenuItem::with_id(MENU_ID_QUIT, "Quit", true, None);
    menu.append(&quit_item)?;
    Ok(menu)
}

pub fn parse_menu_action(id: &MenuId) -> Option<MenuAction> {
    match id.as_ref() {
        MENU_ID_SHOW => Some(MenuAction::ShowWindow),
        MENU_ID_EDIT_CONFIG => Some(MenuAction::EditConfig),
        MENU_ID_QUIT => Some(MenuAction::Quit),
        _ => None,
    }
}

/// Tray tooltip: the current page title, plus a hint when toasts are off.
pub fn build_tooltip(page_title: &str, app_title: &str, notifications_enabled: bool) -> String {
    let title = page_title.trim();
    let mut tooltip = if title.is_empty() {
        app_title.to_string()
    } else {
        title.to_string()
    };
    if !notifications_enabled {
        tooltip.push_str("\nNotifications off");
    }
    tooltip
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_actions() {
        assert!(matches!(
            parse_menu_action(&MenuId::new("show")),
            Some(MenuAction::ShowWindow)
        ));
        assert!(matches!(
            parse_menu_action(&MenuId::new("edit_config")),
            Some(MenuAction::EditConfig)
        ));
        assert!(matches!(
            parse_menu_action(&MenuId::new("quit")),
            Some(MenuAction::Quit)
        ));
    }

    #[test]
    fn parse_unknown_action() {
        assert!(parse_menu_action(&MenuId::new("kill_all")).is_none());
        assert!(parse_menu_action(&MenuId::new("")).is_none());
    }

    #[test]
    fn tooltip_prefers_page_title() {
        assert_eq!(
            build_tooltip("(3) Chat | Microsoft Teams", "Microsoft Teams", true),
            "(3) Chat | Microsoft Teams"
        );
        assert_eq!(build_tooltip("  ", "Microsoft Teams", true), "Microsoft Teams");
        assert_eq!(
            build_tooltip("", "Microsoft Teams", false),
            "Microsoft Teams\nNotifications off"
        );
    }
}
