//! ASCII art loading and parsing
//!
//! Art files are plain text with two optional extras:
//!
//! - a header of `ESC n` (never mirror), `ESC l` (face left) or `ESC r`
//!   (face right) as the very first two bytes
//! - inline color switches `ESC 1` .. `ESC 8` (black, red, green, yellow,
//!   blue, magenta, cyan, white) which apply to everything after them
//!
//! Color switches take no space on screen. Every line is padded with spaces
//! to the width of the widest one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crossterm::style::Color;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};
use unicode_width::UnicodeWidthChar;

use crate::lock::Dropped;

/// Largest art file accepted, in bytes.
pub const MAX_ART_SIZE: u64 = 1_024_000;

/// File picked from an art directory unless `--random` is given.
pub const DEFAULT_ART: &str = "default";

const ESC: char = '\x1b';

#[derive(Error, Debug)]
pub enum ArtError {
    #[error("Cannot stat \"{path}\": {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("\"{0}\" is not a regular file.")]
    NotRegular(PathBuf),

    #[error("\"{0}\" is empty.")]
    Empty(PathBuf),

    #[error("\"{path}\" is too large ({size} bytes, max 1024000 allowed)")]
    TooLarge { path: PathBuf, size: u64 },

    #[error("\"{path}\" could not be read: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Directories are not allowed in \"{0}\".")]
    DirectoryInArtDir(PathBuf),

    #[error("\"{0}\" contains no files.")]
    EmptyArtDir(PathBuf),

    #[error("Couldn't read any art directory ({0})")]
    NoArtDir(String),
}

/// One of the eight art colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtColor(u8);

impl ArtColor {
    pub const WHITE: ArtColor = ArtColor(8);

    pub fn from_digit(digit: char) -> Option<Self> {
        match digit {
            '1'..='8' => Some(ArtColor(digit as u8 - b'0')),
            _ => None,
        }
    }

    pub fn to_crossterm(self) -> Color {
        match self.0 {
            1 => Color::Black,
            2 => Color::Red,
            3 => Color::Green,
            4 => Color::Yellow,
            5 => Color::Blue,
            6 => Color::Magenta,
            7 => Color::Cyan,
            _ => Color::White,
        }
    }
}

/// A visible character with the color in effect for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyph {
    pub ch: char,
    pub color: ArtColor,
}

impl Glyph {
    fn blank(color: ArtColor) -> Self {
        Self { ch: ' ', color }
    }

    pub fn width(&self) -> usize {
        self.ch.width().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtHeader {
    pub no_mirror: bool,
    pub facing: Option<Facing>,
}

/// Parsed, padded art object.
#[derive(Debug, Clone)]
pub struct Art {
    lines: Vec<Vec<Glyph>>,
    width: usize,
    header: ArtHeader,
}

impl Art {
    /// Parse raw file contents. `None` when nothing is left to draw.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (header, body) = split_header(data);
        let text = String::from_utf8_lossy(body);

        let mut color = ArtColor::WHITE;
        let mut lines = Vec::new();
        for raw in text.lines() {
            let mut line = Vec::new();
            let mut chars = raw.chars();
            while let Some(ch) = chars.next() {
                match ch {
                    ESC => {
                        // Unknown codes are dropped without changing color
                        if let Some(c) = chars.next().and_then(ArtColor::from_digit) {
                            color = c;
                        }
                    }
                    '\t' => line.push(Glyph::blank(color)),
                    c if c.is_control() => {}
                    c => line.push(Glyph { ch: c, color }),
                }
            }
            lines.push(line);
        }

        let width = lines.iter().map(|l| line_width(l)).max().unwrap_or(0);
        if width == 0 {
            return None;
        }

        for line in &mut lines {
            let pad_color = line.last().map_or(color, |g| g.color);
            let missing = width - line_width(line);
            line.extend(std::iter::repeat(Glyph::blank(pad_color)).take(missing));
        }

        Some(Self { lines, width, header })
    }

    /// Columns taken on screen.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> &[Vec<Glyph>] {
        &self.lines
    }

    pub fn header(&self) -> ArtHeader {
        self.header
    }

    /// Flip horizontally: reverse every line and swap characters that have
    /// a mirror image (`/` and `\`, brackets, `b` and `d`, the quotes).
    pub fn mirror(&mut self) {
        for line in &mut self.lines {
            line.reverse();
            for glyph in line.iter_mut() {
                glyph.ch = mirrored_char(glyph.ch);
            }
        }
    }
}

fn split_header(data: &[u8]) -> (ArtHeader, &[u8]) {
    if data.len() > 2 && data[0] == ESC as u8 {
        let header = match data[1] {
            b'n' => Some(ArtHeader {
                no_mirror: true,
                facing: None,
            }),
            b'l' => Some(ArtHeader {
                no_mirror: false,
                facing: Some(Facing::Left),
            }),
            b'r' => Some(ArtHeader {
                no_mirror: false,
                facing: Some(Facing::Right),
            }),
            _ => None,
        };
        if let Some(header) = header {
            return (header, &data[2..]);
        }
    }
    (ArtHeader::default(), data)
}

fn line_width(line: &[Glyph]) -> usize {
    line.iter().map(Glyph::width).sum()
}

fn mirrored_char(ch: char) -> char {
    match ch {
        '/' => '\\',
        '\\' => '/',
        '(' => ')',
        ')' => '(',
        '<' => '>',
        '>' => '<',
        '{' => '}',
        '}' => '{',
        '[' => ']',
        ']' => '[',
        'b' => 'd',
        'd' => 'b',
        '`' => '\'',
        '\'' => '`',
        other => other,
    }
}

/// Read and parse an art file.
///
/// Art paths are user controlled, so this only runs with privileges dropped.
pub fn load(path: &Path, _dropped: &Dropped) -> Result<Art, ArtError> {
    let meta = fs::metadata(path).map_err(|source| ArtError::Stat {
        path: path.to_path_buf(),
        source,
    })?;
    if !meta.is_file() {
        return Err(ArtError::NotRegular(path.to_path_buf()));
    }
    if meta.len() == 0 {
        return Err(ArtError::Empty(path.to_path_buf()));
    }
    if meta.len() > MAX_ART_SIZE {
        return Err(ArtError::TooLarge {
            path: path.to_path_buf(),
            size: meta.len(),
        });
    }

    let data = fs::read(path).map_err(|source| ArtError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let art = Art::parse(&data).ok_or_else(|| ArtError::Empty(path.to_path_buf()))?;
    debug!(
        "Loaded {} ({}x{}, {:?})",
        path.display(),
        art.width(),
        art.height(),
        art.header()
    );
    Ok(art)
}

/// Decide which art file to show.
///
/// An explicit path wins. Otherwise the first readable directory in `dirs`
/// supplies either its `default` file or, with `random`, any of its files.
pub fn select<R: Rng>(
    explicit: Option<&Path>,
    dirs: &[PathBuf],
    random: bool,
    rng: &mut R,
) -> Result<PathBuf, ArtError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    for dir in dirs {
        let entries = match list_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Couldn't read \"{}\": {}", dir.display(), e);
                continue;
            }
        };

        if let Some(sub) = entries.iter().find(|p| p.is_dir()) {
            debug!("Found directory {}", sub.display());
            return Err(ArtError::DirectoryInArtDir(dir.clone()));
        }
        if entries.is_empty() {
            return Err(ArtError::EmptyArtDir(dir.clone()));
        }

        if random {
            if let Some(choice) = entries.choose(rng) {
                return Ok(choice.clone());
            }
        }
        return Ok(dir.join(DEFAULT_ART));
    }

    let tried: Vec<String> = dirs.iter().map(|d| d.display().to_string()).collect();
    Err(ArtError::NoArtDir(tried.join(", ")))
}

/// Visible entries of `dir`, sorted.
fn list_dir(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}
