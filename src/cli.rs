use std::path::PathBuf;

use clap::Parser;
use log::debug;

use crate::display::{Rgb, TermDisplay};
use crate::input::TermInput;
use crate::interpreter::{Interpreter, Settings, DEFAULT_SPEED};
use crate::mode::Mode;
use crate::sound::BeepAudio;
use crate::storage::{self, Storage};
use crate::Error;

/// The ocho CLI.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// the rom to run
    rom: PathBuf,

    /// which member of the chip-8 family to emulate; .sc8 and .xo8 roms
    /// override this
    #[arg(short, long, default_value = "superchip")]
    mode: Mode,

    /// instructions per second
    #[arg(short, long, default_value_t = DEFAULT_SPEED)]
    speed: u32,

    /// where rpl user flags are kept between runs
    #[arg(long)]
    savefile: Option<PathBuf>,

    /// log every executed opcode (extremely noisy)
    #[arg(long)]
    trace: bool,

    /// background colour, a bare rgb hex triple
    #[arg(long, default_value = "080808")]
    bg: Rgb,

    /// plane 1 colour
    #[arg(long, default_value = "52a6c5")]
    fg1: Rgb,

    /// plane 2 colour
    #[arg(long, default_value = "c55294")]
    fg2: Rgb,

    /// colour where both planes overlap
    #[arg(long, default_value = "e8e8d0")]
    fg3: Rgb,

    /// verbosity of debug logging (error, debug, trace, ...)
    #[arg(short, long, default_value = "error")]
    log_level: String,
}

/// parse the command line and configure the logging level
#[must_use]
pub fn init() -> Cli {
    let cli = Cli::parse();
    std::env::set_var("RUST_LOG", format!("ocho={}", cli.log_level));
    env_logger::init();
    cli
}

/// wire the terminal peripherals to a fresh interpreter and run the rom
pub fn run(cli: &Cli) -> Result<(), Error> {
    let mode = resolve_mode(cli);
    let savefile = cli.savefile.clone().or_else(default_savefile);

    debug!(
        "running {} as {} at {} ips (saves in {:?})",
        cli.rom.display(),
        mode,
        cli.speed,
        savefile,
    );

    let storage = Storage::open(savefile)?;
    let title = format!("ocho - {} - {}", mode, storage::rom_name(&cli.rom));
    let mut display = TermDisplay::new(&title)?;
    let mut audio = BeepAudio::new();
    let mut input = TermInput::new()?;

    let settings = Settings {
        mode,
        speed: cli.speed,
        colors: [cli.bg, cli.fg1, cli.fg2, cli.fg3],
        trace: cli.trace,
    };
    let mut interpreter =
        Interpreter::new(settings, &mut display, &mut audio, &mut input, storage);
    interpreter.load_program(&cli.rom)?;
    interpreter.run()
}

/// the rom extension wins over the --mode flag
fn resolve_mode(cli: &Cli) -> Mode {
    Mode::for_rom_path(&cli.rom).unwrap_or(cli.mode)
}

/// tuck saves into ~/.config next to everyone else's dotfiles
fn default_savefile() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/ocho-saves.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_flag_is_the_default() {
        let cli = Cli::try_parse_from(["ocho", "pong.ch8", "--mode", "chip-8"]).unwrap();
        assert_eq!(resolve_mode(&cli), Mode::Chip8);
    }

    #[test]
    fn test_rom_extension_overrides_the_mode_flag() {
        let cli = Cli::try_parse_from(["ocho", "pong.xo8", "--mode", "chip-8"]).unwrap();
        assert_eq!(resolve_mode(&cli), Mode::XoChip);

        let cli = Cli::try_parse_from(["ocho", "pong.sc8"]).unwrap();
        assert_eq!(resolve_mode(&cli), Mode::SuperChip);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["ocho", "pong.ch8"]).unwrap();
        assert_eq!(cli.mode, Mode::SuperChip);
        assert_eq!(cli.speed, DEFAULT_SPEED);
        assert!(!cli.trace);
        assert_eq!(
            cli.fg1,
            Rgb {
                r: 0x52,
                g: 0xa6,
                b: 0xc5
            }
        );
    }

    #[test]
    fn test_bad_colour_is_rejected() {
        assert!(Cli::try_parse_from(["ocho", "pong.ch8", "--bg", "red"]).is_err());
    }

    #[test]
    fn test_bad_mode_is_rejected() {
        assert!(Cli::try_parse_from(["ocho", "pong.ch8", "--mode", "megachip"]).is_err());
    }
}
