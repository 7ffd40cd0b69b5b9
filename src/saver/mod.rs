//! The screensaver shown while waiting for a key.
//!
//! - **art**: ASCII art files, colors and mirroring
//! - **sprite**: bouncing motion
//! - **scroller**: the optional load average box
//!
//! # Architecture
//!
//! ```text
//! Screensaver (DisplayDriver)
//! ├── Renderer (crossterm output)
//! └── Scene
//!     ├── Art + Sprite (mirrors on horizontal bounce)
//!     ├── uname text + Sprite
//!     └── Scroller + Sprite (optional)
//! ```

pub mod art;
pub mod scroller;
pub mod sprite;

use std::io::{self, Stdout, Write};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event};
use crossterm::style::Color;
use rand::Rng;
use thiserror::Error;
use tracing::debug;
use unicode_width::UnicodeWidthStr;

use crate::lock::DisplayDriver;
use crate::ui::{keys, Renderer};

use self::art::{Art, ArtError};
use self::scroller::{LoadAverage, ScrollSource, Scroller, SCROLL_BOX_WIDTH};
use self::sprite::Sprite;

#[derive(Error, Debug)]
pub enum SaverError {
    #[error(transparent)]
    Art(#[from] ArtError),

    #[error("This terminal is currently too small ({width}x{height}).")]
    TooSmall { width: u16, height: u16 },

    #[error("uname() failed: {0}")]
    Uname(#[source] nix::Error),

    #[error("Display failed: {0}")]
    Display(#[from] io::Error),
}

/// Motion and content settings.
#[derive(Debug, Clone)]
pub struct SaverSettings {
    /// Pause between frames
    pub delay: Duration,
    pub object_speed: f32,
    pub uname_speed: f32,
    pub info_speed: f32,
    pub mirror: bool,
    pub scrollbar: bool,
    pub scroll_interval: Duration,
}

/// `"<sysname> <nodename> <release>"` of the running kernel.
pub fn system_name() -> Result<String, SaverError> {
    let uts = nix::sys::utsname::uname().map_err(SaverError::Uname)?;
    Ok(format!(
        "{} {} {}",
        uts.sysname().to_string_lossy(),
        uts.nodename().to_string_lossy(),
        uts.release().to_string_lossy()
    ))
}

/// Everything that moves, without any I/O.
pub struct Scene<S: ScrollSource = LoadAverage> {
    art: Art,
    art_sprite: Sprite,
    mirror: bool,
    uname: String,
    uname_sprite: Sprite,
    ticker: Option<(Scroller<S>, Sprite)>,
}

impl<S: ScrollSource> Scene<S> {
    /// Place every object at random. Fails when any of them cannot move on
    /// a screen of this size.
    pub fn new<R: Rng>(
        mut art: Art,
        uname: String,
        ticker: Option<S>,
        settings: &SaverSettings,
        screen: (u16, u16),
        now: Instant,
        rng: &mut R,
    ) -> Result<Self, SaverError> {
        let too_small = SaverError::TooSmall {
            width: screen.0,
            height: screen.1,
        };
        let uname_width = uname.width();
        if !sprite::fits((art.width(), art.height()), screen)
            || !sprite::fits((uname_width, 1), screen)
            || (ticker.is_some() && !sprite::fits((SCROLL_BOX_WIDTH, 1), screen))
        {
            return Err(too_small);
        }

        let art_sprite = Sprite::spawn((art.width(), art.height()), screen, settings.object_speed, rng);
        let uname_sprite = Sprite::spawn((uname_width, 1), screen, settings.uname_speed, rng);
        let ticker = ticker.map(|source| {
            let scroller = Scroller::new(source, settings.scroll_interval, now);
            let sprite = Sprite::spawn((SCROLL_BOX_WIDTH, 1), screen, settings.info_speed, rng);
            (scroller, sprite)
        });

        let header = art.header();
        if let Some(facing) = header.facing {
            if art_sprite.facing() != facing {
                art.mirror();
            }
        }

        Ok(Self {
            art,
            art_sprite,
            mirror: settings.mirror && !header.no_mirror,
            uname,
            uname_sprite,
            ticker,
        })
    }

    /// Move every object one step.
    pub fn step(&mut self) {
        self.uname_sprite.advance();
        if let Some((_, sprite)) = &mut self.ticker {
            sprite.advance();
        }
        if self.art_sprite.advance().horizontal && self.mirror {
            self.art.mirror();
        }
    }

    /// Scroll the status box text.
    pub fn rotate_ticker(&mut self, now: Instant) {
        if let Some((scroller, _)) = &mut self.ticker {
            scroller.advance(now);
        }
    }

    pub fn art(&self) -> &Art {
        &self.art
    }

    pub fn art_position(&self) -> (u16, u16) {
        self.art_sprite.position()
    }

    pub fn uname(&self) -> &str {
        &self.uname
    }

    pub fn uname_position(&self) -> (u16, u16) {
        self.uname_sprite.position()
    }

    /// Status box text and position, when enabled.
    pub fn ticker(&self) -> Option<(String, (u16, u16))> {
        self.ticker
            .as_ref()
            .map(|(scroller, sprite)| (scroller.window(), sprite.position()))
    }
}

/// The scene drawn with crossterm.
pub struct Screensaver<W: Write = Stdout, S: ScrollSource = LoadAverage> {
    renderer: Renderer<W>,
    scene: Scene<S>,
    delay: Duration,
}

impl<W: Write, S: ScrollSource> Screensaver<W, S> {
    pub fn new(renderer: Renderer<W>, scene: Scene<S>, delay: Duration) -> Self {
        Self {
            renderer,
            scene,
            delay,
        }
    }

    #[cfg(test)]
    pub fn renderer_mut(&mut self) -> &mut Renderer<W> {
        &mut self.renderer
    }

    fn erase(&mut self) -> io::Result<()> {
        let (x, y) = self.scene.art_position();
        let width = self.scene.art().width();
        for row in 0..self.scene.art().height() {
            self.renderer.blank(x, y + row as u16, width)?;
        }

        let (x, y) = self.scene.uname_position();
        self.renderer.blank(x, y, self.scene.uname().width())?;

        if let Some((_, (x, y))) = self.scene.ticker() {
            self.renderer.blank(x, y, SCROLL_BOX_WIDTH)?;
        }
        Ok(())
    }

    fn draw(&mut self) -> io::Result<()> {
        let (x, y) = self.scene.art_position();
        for (row, line) in self.scene.art().lines().iter().enumerate() {
            self.renderer.draw_glyphs(x, y + row as u16, line)?;
        }

        let (x, y) = self.scene.uname_position();
        self.renderer.draw_text(x, y, self.scene.uname(), Color::White)?;

        if let Some((text, (x, y))) = self.scene.ticker() {
            self.renderer.draw_text(x, y, &text, Color::White)?;
        }
        Ok(())
    }
}

impl<W: Write, S: ScrollSource> DisplayDriver for Screensaver<W, S> {
    fn pause_rendering(&mut self) -> io::Result<()> {
        self.renderer.clear()
    }

    fn resume_rendering(&mut self) -> io::Result<()> {
        self.renderer.clear()
    }

    fn draw_frame(&mut self) -> io::Result<()> {
        self.erase()?;
        self.scene.step();
        self.draw()?;
        self.renderer.flush()?;
        self.scene.rotate_ticker(Instant::now());
        Ok(())
    }

    fn poll_wake_input(&mut self) -> io::Result<bool> {
        if !event::poll(self.delay)? {
            return Ok(false);
        }
        match event::read()? {
            Event::Key(key) => Ok(keys::is_press(&key)),
            Event::Resize(width, height) => {
                debug!("Terminal resized to {}x{}", width, height);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.renderer.cleanup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saver::art::Facing;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Fixed;

    impl ScrollSource for Fixed {
        fn text(&mut self) -> String {
            "Load average: 0.00, 0.00, 0.00 ".to_string()
        }
    }

    fn settings() -> SaverSettings {
        SaverSettings {
            delay: Duration::from_millis(120),
            object_speed: 1.0,
            uname_speed: 0.5,
            info_speed: 0.1,
            mirror: true,
            scrollbar: true,
            scroll_interval: Duration::from_secs(5),
        }
    }

    fn scene(art: &[u8], screen: (u16, u16), seed: u64) -> Result<Scene<Fixed>, SaverError> {
        let mut rng = StdRng::seed_from_u64(seed);
        Scene::new(
            Art::parse(art).unwrap(),
            "Linux host 6.1.0".to_string(),
            Some(Fixed),
            &settings(),
            screen,
            Instant::now(),
            &mut rng,
        )
    }

    #[test]
    fn test_too_small_terminal_is_rejected() {
        assert!(matches!(
            scene(b"0123456789\n", (11, 24), 1),
            Err(SaverError::TooSmall { width: 11, height: 24 })
        ));
        // Room for the art but not for the scroll box
        assert!(matches!(
            scene(b"abc\n", (18, 24), 1),
            Err(SaverError::TooSmall { .. })
        ));
        assert!(scene(b"abc\n", (80, 24), 1).is_ok());
    }

    #[test]
    fn test_objects_stay_on_screen() {
        let mut scene = scene(b"<==>\n<==>\n", (40, 12), 3).unwrap();
        for _ in 0..1000 {
            scene.step();
            let (x, y) = scene.art_position();
            assert!(x as usize + scene.art().width() <= 40);
            assert!(y as usize + scene.art().height() <= 12);
            let (x, _) = scene.uname_position();
            assert!(x as usize + scene.uname().len() <= 40);
        }
    }

    #[test]
    fn test_horizontal_bounce_mirrors_art() {
        let mut scene = scene(b"(>\n", (40, 12), 5).unwrap();
        let mut seen_mirrored = false;
        for _ in 0..200 {
            scene.step();
            let line: String = scene.art().lines()[0].iter().map(|g| g.ch).collect();
            assert!(line == "(>" || line == "<)");
            seen_mirrored |= line == "<)";
        }
        assert!(seen_mirrored);
    }

    #[test]
    fn test_no_mirror_header_disables_mirroring() {
        let mut scene = scene(b"\x1bn(>\n", (40, 12), 5).unwrap();
        for _ in 0..200 {
            scene.step();
            let line: String = scene.art().lines()[0].iter().map(|g| g.ch).collect();
            assert_eq!(line, "(>");
        }
    }

    #[test]
    fn test_forced_facing_matches_direction() {
        for seed in 0..20 {
            let scene = scene(b"\x1br(>\n", (40, 12), seed).unwrap();
            let line: String = scene.art().lines()[0].iter().map(|g| g.ch).collect();
            let expected = if scene.art_sprite.facing() == Facing::Right { "(>" } else { "<)" };
            assert_eq!(line, expected);
        }
    }

    #[test]
    fn test_draw_frame_writes_art_and_uname() {
        let scene = scene(b"@@\n", (40, 12), 9).unwrap();
        let mut saver = Screensaver::new(Renderer::with_writer(Vec::new()), scene, Duration::ZERO);
        saver.draw_frame().unwrap();

        let output = String::from_utf8_lossy(saver.renderer_mut().writer()).into_owned();
        assert!(output.contains("@@"));
        assert!(output.contains("Linux host 6.1.0"));
        assert!(output.contains("[oad average"));
    }
}
