use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Which member of the CHIP-8 family to emulate. The variants share most of
/// the instruction set; the differences live in [`Quirks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Chip8,
    SuperChip,
    XoChip,
}

impl Mode {
    /// some rom extensions announce their own dialect and override whatever
    /// the configuration asked for
    pub fn for_rom_path(path: &Path) -> Option<Mode> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("xo8") => Some(Mode::XoChip),
            Some("sc8") => Some(Mode::SuperChip),
            _ => None,
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chip-8" => Ok(Mode::Chip8),
            "superchip" => Ok(Mode::SuperChip),
            "xo-chip" => Ok(Mode::XoChip),
            _ => Err(format!(
                "unknown mode: {} (expected chip-8, superchip or xo-chip)",
                s
            )),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Chip8 => "chip-8",
            Mode::SuperChip => "superchip",
            Mode::XoChip => "xo-chip",
        };
        write!(f, "{}", s)
    }
}

/// The per-mode behaviour differences, derived once at construction so the
/// opcode handlers never have to ask which mode they are running in.
#[derive(Debug, Clone, Copy)]
pub struct Quirks {
    /// 8xy1/8xy2/8xy3 zero VF after the logic op
    pub vf_reset: bool,
    /// 8xy6/8xye shift a copy of VY instead of VX in place
    pub shift_uses_vy: bool,
    /// fx55/fx65 leave I pointing one past the transferred range
    pub increment_index: bool,
    /// dxyn wraps pixels at the display edges instead of clipping
    pub sprite_wrap: bool,
    /// dxyn only lands on every fourth cycle, retrying until then
    pub display_wait: bool,
    /// bnnn is read as bxnn: jump to NN + VX rather than NNN + V0
    pub jump_offset_uses_vx: bool,
    /// a taken skip hops over 4-byte f000 nnnn instructions as a unit
    pub long_skip: bool,
    /// how many RPL user flags fx75/fx85 may touch; 0 disables them
    pub rpl_flags: u8,
}

impl From<Mode> for Quirks {
    fn from(mode: Mode) -> Quirks {
        match mode {
            Mode::Chip8 => Quirks {
                vf_reset: true,
                shift_uses_vy: true,
                increment_index: true,
                sprite_wrap: false,
                display_wait: true,
                jump_offset_uses_vx: false,
                long_skip: false,
                rpl_flags: 0,
            },
            Mode::SuperChip => Quirks {
                vf_reset: false,
                shift_uses_vy: false,
                increment_index: false,
                sprite_wrap: false,
                display_wait: false,
                jump_offset_uses_vx: true,
                long_skip: false,
                rpl_flags: 8,
            },
            Mode::XoChip => Quirks {
                vf_reset: false,
                shift_uses_vy: true,
                increment_index: true,
                sprite_wrap: true,
                display_wait: false,
                jump_offset_uses_vx: false,
                long_skip: true,
                rpl_flags: 16,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("chip-8".parse::<Mode>().unwrap(), Mode::Chip8);
        assert_eq!("superchip".parse::<Mode>().unwrap(), Mode::SuperChip);
        assert_eq!("xo-chip".parse::<Mode>().unwrap(), Mode::XoChip);
        assert!("chip8".parse::<Mode>().is_err());
    }

    #[test]
    fn test_mode_round_trips_through_display() {
        for mode in [Mode::Chip8, Mode::SuperChip, Mode::XoChip] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_rom_extension_override() {
        assert_eq!(
            Mode::for_rom_path(&PathBuf::from("roms/nyan.xo8")),
            Some(Mode::XoChip)
        );
        assert_eq!(
            Mode::for_rom_path(&PathBuf::from("car.sc8")),
            Some(Mode::SuperChip)
        );
        assert_eq!(Mode::for_rom_path(&PathBuf::from("pong.ch8")), None);
        assert_eq!(Mode::for_rom_path(&PathBuf::from("pong")), None);
    }

    #[test]
    fn test_chip8_quirks() {
        let q = Quirks::from(Mode::Chip8);
        assert!(q.vf_reset && q.shift_uses_vy && q.increment_index && q.display_wait);
        assert!(!q.sprite_wrap && !q.jump_offset_uses_vx && !q.long_skip);
        assert_eq!(q.rpl_flags, 0);
    }

    #[test]
    fn test_superchip_quirks() {
        let q = Quirks::from(Mode::SuperChip);
        assert!(q.jump_offset_uses_vx);
        assert!(!q.vf_reset && !q.shift_uses_vy && !q.increment_index);
        assert!(!q.sprite_wrap && !q.display_wait && !q.long_skip);
        assert_eq!(q.rpl_flags, 8);
    }

    #[test]
    fn test_xochip_quirks() {
        let q = Quirks::from(Mode::XoChip);
        assert!(q.shift_uses_vy && q.increment_index && q.sprite_wrap && q.long_skip);
        assert!(!q.vf_reset && !q.display_wait && !q.jump_offset_uses_vx);
        assert_eq!(q.rpl_flags, 16);
    }
}
