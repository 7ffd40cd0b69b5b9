//! tss - Terminal screensaver with virtual-terminal locking
//!
//! Bounces an ASCII art object, the kernel name and optionally a load
//! average box around the terminal until a key is pressed. With
//! `--lock-terminal` the screensaver only goes away once the invoking
//! user's password has been entered, and switching to another virtual
//! terminal is refused meanwhile.
//!
//! # Quick Start
//!
//! ```text
//! tss                # Screensaver, any key exits
//! tss -s -r          # Random art with the load average box
//! tss -l             # Lock the terminal (binary must be set-uid root)
//! ```
//!
//! # Startup order
//!
//! Locking needs root to read the password hash and to take over the VT, so
//! it happens first. Privileges are dropped right after, and only then are
//! the log file, configuration and art (all user controlled) opened.

mod cli;
mod config;
mod lock;
mod saver;
mod ui;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use clap::Parser;
use crossterm::terminal;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::Cli;
use crate::config::{config_dir, Config};
use crate::lock::privilege::PrivilegeError;
use crate::lock::prompt::DEFAULT_TIMEOUT;
use crate::lock::{
    invoking_user, Console, CryptVerifier, DisplayDriver, Dropped, PrivilegeManager, Privileges,
    SystemClock, SystemSession,
};
use crate::saver::scroller::LoadAverage;
use crate::saver::{art, system_name, Scene, Screensaver};
use crate::ui::{lock_screen, CrosstermLockScreen, Renderer};

fn main() {
    let cli = Cli::parse();

    match run(cli) {
        Ok(0) => {}
        Ok(failed) => println!("{} failed login attempts.", failed),
        Err(e) => {
            eprintln!("tss: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Lock (when asked), show the screensaver until dismissed.
///
/// Returns the number of failed unlock attempts.
fn run(cli: Cli) -> anyhow::Result<u64> {
    let privileges = Privileges::detect();

    let mut session = None;
    if cli.lock {
        let elevated = privileges.elevated().ok_or(PrivilegeError::NotElevated)?;
        lock_screen::check_fits(terminal::size()?)?;

        let mut locked = SystemSession::system(DEFAULT_TIMEOUT);
        locked.lock(&PrivilegeManager::system(), invoking_user().0, elevated, Console::open)?;
        session = Some(locked);
    }

    // From here on nothing runs with elevated rights
    let dropped = privileges.drop_privileges()?;
    init_logging(&dropped, cli.verbose);
    info!("tss {} starting", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(cli.config.as_deref(), &dropped);
    config.apply_cli(&cli);
    if let Some(locked) = session.as_mut() {
        locked.set_prompt_timeout(config.prompt_timeout());
    }

    let settings = config.saver_settings();
    let mut rng = rand::thread_rng();
    let path = art::select(config.ascii.as_deref(), &config.ascii_dirs, config.random, &mut rng)?;
    let art = art::load(&path, &dropped)?;
    let uname = system_name()?;

    let screen = terminal::size()?;
    let ticker = settings.scrollbar.then_some(LoadAverage);
    let scene = Scene::new(art, uname, ticker, &settings, screen, Instant::now(), &mut rng)?;

    let mut renderer = Renderer::new();
    renderer.init()?;
    let mut saver = Screensaver::new(renderer, scene, settings.delay);

    let result = match session.as_mut() {
        Some(locked) => locked
            .run(
                &mut saver,
                &mut CrosstermLockScreen::new(screen),
                &CryptVerifier,
                &SystemClock,
            )
            .map_err(anyhow::Error::from),
        None => wait_for_key(&mut saver).map_err(anyhow::Error::from),
    };

    // Raw mode has to be left before the session puts the original
    // attributes back, or they get overwritten.
    drop(saver);
    let failed = session.as_ref().map_or(0, SystemSession::failed_attempts);
    drop(session);

    result?;
    info!("tss exiting");
    Ok(failed)
}

/// Screensaver without locking: any key ends it.
fn wait_for_key(saver: &mut dyn DisplayDriver) -> std::io::Result<()> {
    loop {
        saver.draw_frame()?;
        if saver.poll_wake_input()? {
            break;
        }
    }
    saver.shutdown()
}

/// Log to `~/.config/tss/tss.log`.
///
/// The path is user controlled, so this only runs without privileges.
/// `RUST_LOG` wins over `-v`.
fn init_logging(_dropped: &Dropped, verbose: u8) {
    let Some(log_path) = log_path() else {
        return;
    };
    if let Some(parent) = log_path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => file,
        Err(_) => return,
    };

    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        warn!("Logging was already initialized");
    }
    debug!("Logging to {}", log_path.display());
}

fn log_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("tss.log"))
}
