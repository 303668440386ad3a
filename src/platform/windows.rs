//! Windows: shell hand-offs without console flicker, WebView2 switches.

use std::env;
use std::io;
use std::os::windows::process::CommandExt;
use std::path::Path;
use std::process::Command;

use log::info;

const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// A `Command` that never flashes a console window.
pub fn hidden_command(program: &str) -> Command {
    let mut command = Command::new(program);
    command.creation_flags(CREATE_NO_WINDOW);
    command
}

pub fn open_url(url: &str) -> io::Result<()> {
    // rundll32 avoids cmd.exe re-parsing `&` in query strings
    hidden_command("rundll32")
        .arg("url.dll,FileProtocolHandler")
        .arg(url)
        .spawn()
        .map(|_| ())
}

pub fn open_file(path: &Path) -> io::Result<()> {
    hidden_command("notepad").arg(path).spawn().map(|_| ())
}

pub fn prepare_environment(disable_gpu: bool) {
    if disable_gpu {
        info!("Disabling GPU acceleration for WebView2");
        // SAFETY: called from main before any other thread is spawned.
        unsafe {
            env::set_var("WEBVIEW2_ADDITIONAL_BROWSER_ARGUMENTS", "--disable-gpu");
        }
    }
}
