//! # ocho
//!
//! A CHIP-8 family interpreter for the terminal, covering the original
//! CHIP-8, the Super-CHIP extension and XO-CHIP.
//!
//! ## Design
//!
//! * one virtual machine, three instruction-set variants; the documented
//!   behavioural differences ("quirks") are derived once from the selected
//!   [`mode::Mode`] into a [`mode::Quirks`] record so the opcode handlers
//!   stay mode-agnostic
//! * abstract display, input and audio so alternatives can be plugged in;
//!   starting with a TUI in-console renderer, crossterm key polling and the
//!   PC speaker
//! * instructions run as fast as possible then sleep, to match the
//!   configured rate; timers and the display flush tick at 60Hz
//! * two 128x64 bit-planes compose into a four-colour picture; plain CHIP-8
//!   output is drawn as doubled 2x2 blocks into the same buffer
//!
//! Model
//!
//! ```text
//! cli
//!  |-- display, input, audio, storage(savefile)
//!  `-- interpreter(settings, display, input, audio, storage)
//!       |-- ram(fonts) + framebuffer(2 planes)
//!       |-- fetch/decode/execute, one opcode per cycle
//!       `-- run loop
//!            |-- poll input -> key snapshot, pause/quit edges
//!            |-- step()
//!            |-- every ~1/60s: draw if dirty, tick timers, gate audio
//!            `-- sleep(1/speed)
//! ```

pub mod cli;
pub mod display;
pub mod framebuffer;
pub mod input;
pub mod interpreter;
pub mod memory;
pub mod mode;
pub mod sound;
pub mod storage;

use std::io;

pub use display::Rgb;
pub use interpreter::{Interpreter, Settings};
pub use mode::Mode;

/// Everything that can stop the interpreter. Decode problems are
/// deliberately absent: an unknown opcode is logged and skipped, never
/// fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("rom path must be specified")]
    EmptyRomPath,

    #[error("unable to read rom {path}: {source}")]
    RomUnreadable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("rom is {size} bytes but only {max} bytes fit above 0x200")]
    RomTooLarge { size: usize, max: usize },

    #[error("call stack overflow at {pc:#06x}")]
    StackOverflow { pc: u16 },

    #[error("return with an empty call stack at {pc:#06x}")]
    StackUnderflow { pc: u16 },

    #[error("corrupt save file {path}: {source}")]
    CorruptSaveFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("audio: {0}")]
    Audio(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
