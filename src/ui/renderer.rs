//! Terminal renderer using crossterm
//!
//! Owns screen setup and teardown, and draws positioned text.

use std::io::{self, Stdout, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use tracing::{debug, warn};

use crate::saver::art::Glyph;

/// Terminal renderer
pub struct Renderer<W: Write = Stdout> {
    out: W,
    /// Whether the terminal has been initialized
    initialized: bool,
    /// Foreground color last sent, to skip redundant escapes
    color: Option<Color>,
}

impl Default for Renderer<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer<Stdout> {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl<W: Write> Renderer<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out,
            initialized: false,
            color: None,
        }
    }

    #[cfg(test)]
    pub fn writer(&self) -> &W {
        &self.out
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            self.out,
            EnterAlternateScreen,
            Hide,
            DisableLineWrap,
            Clear(ClearType::All),
            SetAttribute(Attribute::Bold),
            MoveTo(0, 0)
        )?;
        self.initialized = true;
        debug!("Screen initialized");
        Ok(())
    }

    /// Cleanup the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let _ = execute!(self.out, ResetColor, SetAttribute(Attribute::Reset));
        let _ = execute!(self.out, Show, EnableLineWrap);
        let _ = execute!(self.out, LeaveAlternateScreen);
        let _ = self.out.flush();

        // Disable raw mode - this is the most important part
        terminal::disable_raw_mode()?;
        debug!("Screen restored");
        Ok(())
    }

    /// Clear the screen. Other writers may have changed the color meanwhile,
    /// so the next draw always sets it again.
    pub fn clear(&mut self) -> io::Result<()> {
        self.color = None;
        queue!(self.out, Clear(ClearType::All))?;
        self.out.flush()
    }

    fn set_color(&mut self, color: Color) -> io::Result<()> {
        if self.color != Some(color) {
            queue!(self.out, SetForegroundColor(color))?;
            self.color = Some(color);
        }
        Ok(())
    }

    /// Text in a single color
    pub fn draw_text(&mut self, x: u16, y: u16, text: &str, color: Color) -> io::Result<()> {
        self.set_color(color)?;
        queue!(self.out, MoveTo(x, y), Print(text))
    }

    /// A run of art glyphs, switching colors where they change
    pub fn draw_glyphs(&mut self, x: u16, y: u16, glyphs: &[Glyph]) -> io::Result<()> {
        queue!(self.out, MoveTo(x, y))?;
        for glyph in glyphs {
            self.set_color(glyph.color.to_crossterm())?;
            queue!(self.out, Print(glyph.ch))?;
        }
        Ok(())
    }

    /// Overwrite `width` cells with spaces
    pub fn blank(&mut self, x: u16, y: u16, width: usize) -> io::Result<()> {
        queue!(self.out, MoveTo(x, y), Print(" ".repeat(width)))
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl<W: Write> Drop for Renderer<W> {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("Failed to restore screen: {}", e);
        }
    }
}
