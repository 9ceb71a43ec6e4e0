use std::error::Error;

use beep::beep;
use log::debug;

/// the xo-chip pattern buffer: 16 bytes, 128 one-bit samples
pub const PATTERN_LEN: usize = 16;

/// the reset-time pitch byte; with the default half-and-half pattern the
/// tone lands near A4 (440Hz)
pub const DEFAULT_PITCH: u8 = 247;

/// makes noise on behalf of the interpreter
pub trait Audio {
    /// start the tone; repeated calls are fine
    fn play(&mut self) -> Result<(), Box<dyn Error>>;

    /// stop the tone; repeated calls are fine
    fn stop(&mut self) -> Result<(), Box<dyn Error>>;

    /// the xo-chip pitch byte; playback runs at 4000*2^((pitch-64)/48)
    /// one-bit samples per second
    fn set_pitch(&mut self, pitch: u8) -> Result<(), Box<dyn Error>>;

    /// the xo-chip tone pattern; implementations may treat it as a duty
    /// hint or ignore it
    fn load_pattern(&mut self, pattern: [u8; PATTERN_LEN]) -> Result<(), Box<dyn Error>>;
}

/// square waves out of the PC speaker. The speaker makes its own wave, so
/// the pattern buffer only informs the frequency: the playback rate spread
/// over the 128 pattern bits gives the fundamental.
pub struct BeepAudio {
    playing: bool,
    pitch: u8,
}

impl BeepAudio {
    pub fn new() -> Self {
        BeepAudio {
            playing: false,
            pitch: DEFAULT_PITCH,
        }
    }

    fn frequency(&self) -> u16 {
        let rate = 4000.0 * 2f64.powf((self.pitch as f64 - 64.0) / 48.0);
        (rate / (PATTERN_LEN * 8) as f64).round() as u16
    }
}

impl Default for BeepAudio {
    fn default() -> Self {
        BeepAudio::new()
    }
}

impl Audio for BeepAudio {
    fn play(&mut self) -> Result<(), Box<dyn Error>> {
        if !self.playing {
            beep(self.frequency())?;
            self.playing = true;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn Error>> {
        if self.playing {
            beep(0)?;
            self.playing = false;
        }
        Ok(())
    }

    fn set_pitch(&mut self, pitch: u8) -> Result<(), Box<dyn Error>> {
        self.pitch = pitch;
        if self.playing {
            beep(self.frequency())?;
        }
        Ok(())
    }

    fn load_pattern(&mut self, pattern: [u8; PATTERN_LEN]) -> Result<(), Box<dyn Error>> {
        // a one-pitch speaker can't reproduce the waveform itself
        debug!("audio pattern ignored by the speaker: {:02x?}", pattern);
        Ok(())
    }
}

/// silence, for tests and headless runs
pub struct Mute {}

impl Mute {
    pub fn new() -> Self {
        Mute {}
    }
}

impl Audio for Mute {
    fn play(&mut self) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn set_pitch(&mut self, _pitch: u8) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn load_pattern(&mut self, _pattern: [u8; PATTERN_LEN]) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pitch_is_concert_a() {
        let audio = BeepAudio::new();
        assert_eq!(audio.frequency(), 439); // close enough for a speaker
    }

    #[test]
    fn test_pitch_64_is_the_base_rate() {
        let audio = BeepAudio {
            playing: false,
            pitch: 64,
        };
        // 4000 samples/s over 128 pattern bits
        assert_eq!(audio.frequency(), 31);
    }

    #[test]
    fn test_pitch_raises_by_octaves_every_48() {
        let low = BeepAudio {
            playing: false,
            pitch: 64,
        };
        let high = BeepAudio {
            playing: false,
            pitch: 64 + 48,
        };
        assert_eq!(high.frequency(), low.frequency() * 2 + 1); // 62.5 rounds up
    }
}
