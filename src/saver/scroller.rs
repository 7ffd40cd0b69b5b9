//! Scrolling status box (`[Load average: 0.12, ...]`).

use std::time::{Duration, Instant};

/// Columns of the box, brackets included.
pub const SCROLL_BOX_WIDTH: usize = 20;

/// Provides the text that scrolls through the box.
pub trait ScrollSource {
    fn text(&mut self) -> String;
}

/// System load average as reported by getloadavg(3).
pub struct LoadAverage;

impl ScrollSource for LoadAverage {
    fn text(&mut self) -> String {
        let mut loads = [0f64; 3];
        // Safety: the buffer holds exactly the three samples requested
        let n = unsafe { libc::getloadavg(loads.as_mut_ptr(), 3) };
        if n < 3 {
            loads = [0.0; 3];
        }
        format_load(&loads)
    }
}

fn format_load(loads: &[f64; 3]) -> String {
    format!(
        "Load average: {:.2}, {:.2}, {:.2} ",
        loads[0], loads[1], loads[2]
    )
}

/// Marquee over the source text. The text is only replaced after a full
/// pass once the refresh interval has elapsed, so it never jumps mid-scroll.
pub struct Scroller<S: ScrollSource> {
    source: S,
    text: Vec<char>,
    offset: usize,
    interval: Duration,
    last_refresh: Instant,
    refresh_due: bool,
}

impl<S: ScrollSource> Scroller<S> {
    pub fn new(mut source: S, interval: Duration, now: Instant) -> Self {
        let text = source.text().chars().collect();
        Self {
            source,
            text,
            offset: 0,
            interval,
            last_refresh: now,
            refresh_due: false,
        }
    }

    /// Current box contents, always [`SCROLL_BOX_WIDTH`] columns.
    pub fn window(&self) -> String {
        let len = self.text.len().max(1);
        let mut window: Vec<char> = (0..SCROLL_BOX_WIDTH)
            .map(|i| self.text.get((i + self.offset) % len).copied().unwrap_or(' '))
            .collect();
        window[0] = '[';
        window[SCROLL_BOX_WIDTH - 1] = ']';
        window.into_iter().collect()
    }

    /// Move the text one column to the left.
    pub fn advance(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_refresh) >= self.interval {
            self.last_refresh = now;
            self.refresh_due = true;
        }

        self.offset += 1;
        if self.offset > self.text.len() {
            if self.refresh_due {
                self.text = self.source.text().chars().collect();
                self.refresh_due = false;
            }
            self.offset = 1;
        }
    }
}
