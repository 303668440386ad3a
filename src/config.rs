use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::navigation::AllowList;

const CONFIG_DIR_NAME: &str = "teams-desktop";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Name of the persistent webview data directory.
    #[serde(default = "default_partition")]
    pub partition: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WindowConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_min_width")]
    pub min_width: u32,
    #[serde(default = "default_min_height")]
    pub min_height: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NavigationConfig {
    /// Hosts allowed to open as in-app windows.
    #[serde(default = "default_window_open_domains")]
    pub window_open_domains: Vec<String>,
    /// Hosts the main window may navigate to in place.
    #[serde(default = "default_in_place_domains")]
    pub in_place_domains: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NotificationsConfig {
    #[serde(default = "default_notifications_enabled")]
    pub enabled: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SystemConfig {
    #[serde(default)]
    pub disable_gpu: bool,
}

// Defaults for AppConfig
fn default_url() -> String {
    "https://teams.microsoft.com/v2/".to_string()
}

fn default_title() -> String {
    "Microsoft Teams".to_string()
}

fn default_user_agent() -> String {
    // Microsoft services gate features on a Chromium UA
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_partition() -> String {
    "teams".to_string()
}

// Defaults for WindowConfig
fn default_width() -> u32 {
    1200
}

fn default_height() -> u32 {
    800
}

fn default_min_width() -> u32 {
    800
}

fn default_min_height() -> u32 {
    600
}

// Defaults for NavigationConfig
const SHARED_DOMAINS: &[&str] = &[
    "teams.microsoft.com",
    "teams.cloud.microsoft",
    "teams.events.data.microsoft.com",
    "teams.cdn.office.net",
    "teams.office.com",
    "teams.live.com",
    "cosmic.office.net",
    "login.microsoftonline.com",
    "login.live.com",
    "account.live.com",
    "graph.microsoft.com",
];

fn default_window_open_domains() -> Vec<String> {
    SHARED_DOMAINS
        .iter()
        .copied()
        .chain(std::iter::once("microsoft.com"))
        .map(String::from)
        .collect()
}

fn default_in_place_domains() -> Vec<String> {
    SHARED_DOMAINS.iter().copied().map(String::from).collect()
}

// Defaults for NotificationsConfig
fn default_notifications_enabled() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            title: default_title(),
            user_agent: default_user_agent(),
            partition: default_partition(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            min_width: default_min_width(),
            min_height: default_min_height(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            window_open_domains: default_window_open_domains(),
            in_place_domains: default_in_place_domains(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: default_notifications_enabled(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.app.url)
            .with_context(|| format!("invalid app.url {:?}", self.app.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("app.url must be http or https, got {:?}", url.scheme());
        }
        if self.app.partition.trim().is_empty()
            || self.app.partition.contains(['/', '\\'])
            || self.app.partition.contains("..")
        {
            bail!("app.partition must be a plain directory name");
        }
        if self.window.width < self.window.min_width || self.window.height < self.window.min_height
        {
            bail!("window size must not be smaller than the minimum size");
        }
        validate_domains("navigation.window_open_domains", &self.navigation.window_open_domains)?;
        validate_domains("navigation.in_place_domains", &self.navigation.in_place_domains)?;
        // Otherwise the start page itself is bounced to the system browser
        let in_place = AllowList::new(&self.navigation.in_place_domains);
        if !url.host_str().is_some_and(|host| in_place.permits_host(host)) {
            bail!("app.url host must be covered by navigation.in_place_domains");
        }
        Ok(())
    }

    /// Directory the webview keeps cookies and local storage in.
    pub fn data_directory(&self) -> PathBuf {
        data_root().join(&self.app.partition)
    }
}

fn validate_domains(field: &str, domains: &[String]) -> Result<()> {
    for domain in domains {
        let domain = domain.trim();
        if domain.is_empty() {
            bail!("{field} contains an empty entry");
        }
        if domain.contains("://") || domain.contains('/') || domain.contains(char::is_whitespace) {
            bail!("{field} entry {domain:?} must be a bare host name");
        }
    }
    Ok(())
}

fn data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

pub fn load_or_create_config() -> Result<Config> {
    load_or_create_config_at(&get_config_path())
}

pub fn load_and_validate_config() -> Result<Config> {
    load_config_at(&get_config_path())
}

pub fn save_config(config: &Config) -> Result<()> {
    save_config_at(&get_config_path(), config)
}

pub fn load_or_create_config_at(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config_at(path)
    } else {
        let config = Config::default();
        save_config_at(path, &config)?;
        Ok(config)
    }
}

pub fn load_config_at(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).context("failed to read config file")?;
    let config = serde_json::from_str::<Config>(&content).context("failed to parse config file")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

pub fn save_config_at(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    let content = serde_json::to_string_pretty(config).context("failed to serialize config")?;
    fs::write(path, content).context("failed to write config file")?;
    Ok(())
}
