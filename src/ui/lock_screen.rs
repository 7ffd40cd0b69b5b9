//! The password box
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │This screen has been locked by alice.│
//! │Password:  Sorry.                   │
//! └────────────────────────────────────┘
//! ```
//!
//! A bar down column 0 shows the time left: rows disappear from the top as
//! the timeout runs out.

use std::io::{self, Stdout, Write};
use std::os::fd::AsRawFd;
use std::time::Duration;

use crossterm::event::{self, Event};
use crossterm::style::Color;
use unicode_width::UnicodeWidthStr;

use crate::lock::{Key, LockError, LockScreen};
use crate::ui::{keys, Renderer};

/// Narrowest terminal the box is guaranteed to fit for any username.
pub const MIN_LOCK_WIDTH: u16 = 76;
/// Lowest terminal the box fits in.
pub const MIN_LOCK_HEIGHT: u16 = 5;

const BOX_COLOR: Color = Color::White;
const PASSWORD_LABEL: &str = "Password:";
const REJECTION: &str = "Sorry.";

/// Box geometry for a screen size and username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockBox {
    text: String,
    left: u16,
    top: u16,
    inner_width: usize,
}

impl LockBox {
    pub fn new(username: &str, screen: (u16, u16)) -> Self {
        let text = format!("This screen has been locked by {}.", username);
        let inner_width = text.width();
        let left = (screen.0 as usize).saturating_sub(inner_width) / 2;
        let top = screen.1.saturating_sub(5) / 2;
        Self {
            text,
            left: left as u16,
            top,
            inner_width,
        }
    }

    pub fn rows(&self) -> [String; 4] {
        let bar = "─".repeat(self.inner_width);
        let password = format!("{:<width$}", PASSWORD_LABEL, width = self.inner_width);
        [
            format!("┌{}┐", bar),
            format!("│{}│", self.text),
            format!("│{}│", password),
            format!("└{}┘", bar),
        ]
    }

    pub fn origin(&self) -> (u16, u16) {
        (self.left, self.top)
    }

    /// Where the rejection message goes.
    pub fn rejection_position(&self) -> (u16, u16) {
        (self.left + 11, self.top + 2)
    }
}

/// Reject screens too small for the box.
pub fn check_fits(screen: (u16, u16)) -> Result<(), LockError> {
    if screen.0 < MIN_LOCK_WIDTH || screen.1 < MIN_LOCK_HEIGHT {
        return Err(LockError::TooSmall {
            width: screen.0,
            height: screen.1,
        });
    }
    Ok(())
}

/// Rows of the countdown bar already gone after `elapsed`.
pub fn countdown_rows_gone(elapsed: Duration, timeout: Duration, height: u16) -> u16 {
    if timeout.is_zero() {
        return height;
    }
    let fraction = (elapsed.as_secs_f64() / timeout.as_secs_f64()).min(1.0);
    (fraction * height as f64) as u16
}

/// Lock screen drawn on stdout, reading keys through crossterm.
pub struct CrosstermLockScreen<W: Write = Stdout> {
    renderer: Renderer<W>,
    screen: (u16, u16),
    layout: Option<LockBox>,
    rows_gone: u16,
}

impl CrosstermLockScreen<Stdout> {
    pub fn new(screen: (u16, u16)) -> Self {
        Self::with_renderer(Renderer::new(), screen)
    }
}

impl<W: Write> CrosstermLockScreen<W> {
    pub fn with_renderer(renderer: Renderer<W>, screen: (u16, u16)) -> Self {
        Self {
            renderer,
            screen,
            layout: None,
            rows_gone: 0,
        }
    }

    #[cfg(test)]
    fn renderer(&self) -> &Renderer<W> {
        &self.renderer
    }
}

impl<W: Write> LockScreen for CrosstermLockScreen<W> {
    fn flush_input(&mut self) -> io::Result<()> {
        while event::poll(Duration::ZERO)? {
            event::read()?;
        }
        Ok(())
    }

    fn draw_prompt(&mut self, username: &str) -> io::Result<()> {
        self.renderer.clear()?;
        for row in 0..self.screen.1 {
            self.renderer.draw_text(0, row, "│", BOX_COLOR)?;
        }
        self.rows_gone = 0;

        let layout = LockBox::new(username, self.screen);
        let (x, y) = layout.origin();
        for (i, row) in layout.rows().iter().enumerate() {
            self.renderer.draw_text(x, y + i as u16, row, BOX_COLOR)?;
        }
        self.layout = Some(layout);
        self.renderer.flush()
    }

    fn draw_countdown(&mut self, elapsed: Duration, timeout: Duration) -> io::Result<()> {
        let gone = countdown_rows_gone(elapsed, timeout, self.screen.1);
        if gone == self.rows_gone {
            return Ok(());
        }
        for row in self.rows_gone..gone {
            self.renderer.blank(0, row, 1)?;
        }
        self.rows_gone = gone;
        self.renderer.flush()
    }

    fn show_rejection(&mut self) -> io::Result<()> {
        if let Some(layout) = &self.layout {
            let (x, y) = layout.rejection_position();
            self.renderer.draw_text(x, y, REJECTION, BOX_COLOR)?;
        }
        self.renderer.flush()
    }

    fn clear(&mut self) -> io::Result<()> {
        self.layout = None;
        self.renderer.clear()
    }

    fn poll_key(&mut self, wait: Duration) -> io::Result<Option<Key>> {
        if !event::poll(wait)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) => Ok(keys::map_key(&key)),
            _ => Ok(None),
        }
    }

    fn is_attached(&self) -> bool {
        nix::unistd::isatty(io::stdin().as_raw_fd()).unwrap_or(false)
    }
}
