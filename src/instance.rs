//! Single-instance guard.
//!
//! The first process to lock `instance.lock` in the profile's data directory
//! owns the webview profile. Later launches connect to the loopback port it
//! published, ask it to bring its window forward, and exit.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};

const LOCK_FILE_NAME: &str = "instance.lock";
const PORT_FILE_NAME: &str = "instance.port";
const ACTIVATE_MESSAGE: &str = "activate";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const READ_TIMEOUT: Duration = Duration::from_secs(2);

pub enum Instance {
    Primary(InstanceGuard),
    /// Another process owns the profile and has been asked to show itself.
    Secondary,
}

/// Held for the lifetime of the primary process.
pub struct InstanceGuard {
    _lock: File,
    listener: TcpListener,
}

pub fn acquire(dir: &Path) -> Result<Instance> {
    fs::create_dir_all(dir).context("failed to create data directory")?;
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(dir.join(LOCK_FILE_NAME))
        .context("failed to open instance lock")?;

    match lock.try_lock() {
        Ok(()) => {}
        Err(TryLockError::WouldBlock) => {
            if let Err(e) = signal_primary(dir) {
                warn!("Could not reach the running instance: {:#}", e);
            }
            return Ok(Instance::Secondary);
        }
        Err(TryLockError::Error(e)) => return Err(e).context("failed to lock instance file"),
    }

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .context("failed to bind activation socket")?;
    let port = listener
        .local_addr()
        .context("failed to read activation address")?
        .port();
    fs::write(dir.join(PORT_FILE_NAME), port.to_string())
        .context("failed to publish activation port")?;
    debug!("Instance lock held, activation port {}", port);

    Ok(Instance::Primary(InstanceGuard {
        _lock: lock,
        listener,
    }))
}

impl InstanceGuard {
    /// Run `on_activate` whenever a later launch asks for the window.
    pub fn listen<F>(&self, on_activate: F) -> Result<thread::JoinHandle<()>>
    where
        F: Fn() + Send + 'static,
    {
        let listener = self
            .listener
            .try_clone()
            .context("failed to clone activation socket")?;
        Ok(thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if is_activation(stream) {
                            info!("Another launch asked for the window");
                            on_activate();
                        }
                    }
                    Err(e) => warn!("Activation socket error: {}", e),
                }
            }
        }))
    }
}

fn signal_primary(dir: &Path) -> Result<()> {
    let port: u16 = fs::read_to_string(dir.join(PORT_FILE_NAME))
        .context("failed to read activation port")?
        .trim()
        .parse()
        .context("malformed activation port")?;
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let mut stream =
        TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).context("failed to connect")?;
    writeln!(stream, "{ACTIVATE_MESSAGE}").context("failed to send activation")?;
    Ok(())
}

fn is_activation(stream: TcpStream) -> bool {
    if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
        debug!("Dropping activation connection: {}", e);
        return false;
    }
    let mut line = String::new();
    match BufReader::new(stream).read_line(&mut line) {
        Ok(_) => line.trim() == ACTIVATE_MESSAGE,
        Err(e) => {
            debug!("Dropping activation connection: {}", e);
            false
        }
    }
}
