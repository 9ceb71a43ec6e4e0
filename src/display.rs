use std::collections::HashMap;
use std::io;
use std::str::FromStr;

use termion::raw::{IntoRawMode, RawTerminal};
use tui::backend::TermionBackend;
use tui::layout::Rect;
use tui::style::{Color, Style};
use tui::symbols::Marker;
use tui::widgets::canvas::{Canvas, Points};
use tui::widgets::{Block, Borders};
use tui::Terminal;

use crate::framebuffer::{XRES, YRES};

/// A colour as supplied on the command line and handed to the display with
/// each frame. The interpreter composes the two bit-planes into a value
/// 0-3 and looks the colour up before calling [`Display::draw`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl FromStr for Rgb {
    type Err = String;

    /// parses a bare hex triple like "52a6c5"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 6 || !s.is_ascii() {
            return Err(format!("not an rgb hex triple: {}", s));
        }
        let channel = |at: usize| {
            u8::from_str_radix(&s[at..at + 2], 16)
                .map_err(|_| format!("not an rgb hex triple: {}", s))
        };
        Ok(Rgb {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

/// Display is used by the interpreter to draw things on the screen. It
/// should abstract the implementation details, so a variety of kinds of
/// screen would work.
pub trait Display {
    /// draw one composed frame: XRES*YRES colours, row-major from the
    /// top-left
    fn draw(&mut self, pixels: &[Rgb]) -> Result<(), io::Error>;
}

/// four-colour display in a terminal, rendered using TUI and Termion
pub struct TermDisplay {
    terminal: Terminal<TermionBackend<RawTerminal<io::Stdout>>>,
    title: String,
}

impl TermDisplay {
    pub fn new(title: &str) -> Result<TermDisplay, io::Error> {
        let stdout = io::stdout().into_raw_mode()?;
        let backend = TermionBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(TermDisplay {
            terminal,
            title: title.to_string(),
        })
    }

    fn x_bounds() -> [f64; 2] {
        [0.0, (XRES - 1) as f64]
    }

    fn y_bounds() -> [f64; 2] {
        [-1.0 * (YRES - 1) as f64, 0.0]
    }
}

impl Display for TermDisplay {
    fn draw(&mut self, pixels: &[Rgb]) -> Result<(), io::Error> {
        // make sure we're given exactly the right amount of data to draw
        assert_eq!(
            pixels.len(),
            XRES * YRES,
            "TermDisplay must have correct-sized data to draw"
        );

        // bucket coordinates by colour so each colour renders as a single
        // layer of points
        let mut layers: HashMap<Rgb, Vec<(f64, f64)>> = HashMap::new();
        for (at, rgb) in pixels.iter().enumerate() {
            layers
                .entry(*rgb)
                .or_default()
                .push(((at % XRES) as f64, -1.0 * (at / XRES) as f64));
        }

        let title = self.title.clone();
        self.terminal.draw(|f| {
            let size = Rect::new(0, 0, 2 + XRES as u16, 2 + YRES as u16);

            let canvas = Canvas::default()
                .block(
                    Block::default()
                        .title(title.as_str())
                        .borders(Borders::ALL)
                        .style(Style::default().bg(Color::Black)),
                )
                .x_bounds(TermDisplay::x_bounds())
                .y_bounds(TermDisplay::y_bounds())
                .marker(Marker::Block)
                .paint(|ctx| {
                    for (rgb, coords) in &layers {
                        ctx.draw(&Points {
                            coords,
                            color: Color::Rgb(rgb.r, rgb.g, rgb.b),
                        });
                    }
                });
            f.render_widget(canvas, size);
        })?;
        Ok(())
    }
}

/// useful for testing non-display routines; counts frames and drops them
pub struct DummyDisplay {
    frames: usize,
}

impl DummyDisplay {
    pub fn new() -> DummyDisplay {
        DummyDisplay { frames: 0 }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl Default for DummyDisplay {
    fn default() -> Self {
        DummyDisplay::new()
    }
}

impl Display for DummyDisplay {
    fn draw(&mut self, _pixels: &[Rgb]) -> Result<(), io::Error> {
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_parses_hex_triples() {
        assert_eq!(
            "52a6c5".parse::<Rgb>().unwrap(),
            Rgb {
                r: 0x52,
                g: 0xa6,
                b: 0xc5
            }
        );
        assert_eq!(
            "000000".parse::<Rgb>().unwrap(),
            Rgb { r: 0, g: 0, b: 0 }
        );
    }

    #[test]
    fn test_rgb_rejects_junk() {
        assert!("".parse::<Rgb>().is_err());
        assert!("52a6c".parse::<Rgb>().is_err());
        assert!("52a6c5aa".parse::<Rgb>().is_err());
        assert!("zzzzzz".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_bounds_cover_the_buffer() {
        assert_eq!(TermDisplay::x_bounds(), [0.0, 127.0]);
        assert_eq!(TermDisplay::y_bounds(), [-63.0, 0.0]);
    }

    #[test]
    fn test_dummy_counts_frames() -> Result<(), io::Error> {
        let mut d = DummyDisplay::new();
        let frame = vec![Rgb::default(); XRES * YRES];
        d.draw(&frame)?;
        d.draw(&frame)?;
        assert_eq!(d.frames(), 2);
        Ok(())
    }
}
