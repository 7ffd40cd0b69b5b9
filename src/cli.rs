//! Command-line interface definitions for tss.
//!
//! Uses clap's derive API. Every option left out falls back to the
//! configuration file, then to the built-in default.

use std::path::PathBuf;

use clap::Parser;

/// Slowest and fastest accepted object speeds, in cells per frame.
pub const SPEED_RANGE: std::ops::RangeInclusive<f32> = 0.001..=1.0;

/// Terminal screensaver with optional console locking.
///
/// Bounces an ASCII art object, the kernel name and optionally a load
/// average box around the terminal until a key is pressed. With
/// --lock-terminal the screen only goes away after the invoking user's
/// password is entered, and VT switching is disabled meanwhile.
#[derive(Parser, Debug)]
#[command(name = "tss")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Lock the terminal (needs the binary installed set-uid root).
    #[arg(short = 'l', long = "lock-terminal")]
    pub lock: bool,

    /// Disable ASCII mirroring.
    #[arg(short = 'n', long = "no-mirror")]
    pub no_mirror: bool,

    /// Show the load average in a scrolling box.
    #[arg(short = 's', long = "scrollbar")]
    pub scrollbar: bool,

    /// Choose a random ASCII file from the art directory.
    #[arg(short = 'r', long = "random")]
    pub random: bool,

    /// Update every DELAY milliseconds.
    #[arg(short = 'd', long = "delay", value_name = "DELAY")]
    pub delay: Option<u64>,

    /// ASCII art file to show.
    #[arg(short = 'a', long = "ascii", value_name = "PATH")]
    pub ascii: Option<PathBuf>,

    /// ASCII art speed (0.001 - 1.00).
    #[arg(short = 'o', long = "object-speed", value_name = "SPEED", value_parser = parse_speed)]
    pub object_speed: Option<f32>,

    /// Kernel name speed (0.001 - 1.00).
    #[arg(short = 'e', long = "uname-speed", value_name = "SPEED", value_parser = parse_speed)]
    pub uname_speed: Option<f32>,

    /// Load average box speed (0.001 - 1.00).
    #[arg(short = 'i', long = "info-speed", value_name = "SPEED", value_parser = parse_speed)]
    pub info_speed: Option<f32>,

    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a speed, rejecting values outside [`SPEED_RANGE`].
pub fn parse_speed(value: &str) -> Result<f32, String> {
    let speed: f32 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if !SPEED_RANGE.contains(&speed) {
        return Err(format!(
            "speed must be between {} and {}",
            SPEED_RANGE.start(),
            SPEED_RANGE.end()
        ));
    }
    Ok(speed)
}
