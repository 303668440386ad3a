//! macOS: `open` for hand-offs.

use std::io;
use std::path::Path;
use std::process::Command;

use log::info;

pub fn open_url(url: &str) -> io::Result<()> {
    Command::new("open").arg(url).spawn().map(|_| ())
}

pub fn open_file(path: &Path) -> io::Result<()> {
    Command::new("open").arg("-t").arg(path).spawn().map(|_| ())
}

pub fn prepare_environment(disable_gpu: bool) {
    if disable_gpu {
        info!("GPU switch has no effect with WKWebView");
    }
}
