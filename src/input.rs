use std::collections::HashMap;
use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{
    poll, read, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::{terminal, ExecutableCommand};

/// the chip-8 keypad mapped onto the left-hand side of a qwerty keyboard:
///
///   1 2 3 C        1 2 3 4
///   4 5 6 D   <=>  q w e r
///   7 8 9 E        a s d f
///   A 0 B F        z x c v
const CHIP8_CONVENTIONAL_KEYMAP: [(char, u8); 16] = [
    ('x', 0x00),
    ('1', 0x01),
    ('2', 0x02),
    ('3', 0x03),
    ('q', 0x04),
    ('w', 0x05),
    ('e', 0x06),
    ('a', 0x07),
    ('s', 0x08),
    ('d', 0x09),
    ('z', 0x0a),
    ('c', 0x0b),
    ('4', 0x0c),
    ('r', 0x0d),
    ('f', 0x0e),
    ('v', 0x0f),
];

/// how long a key counts as held after its last press event, for terminals
/// that cannot report key releases
const KEY_HOLD: Duration = Duration::from_millis(150);

/// one poll of the host keyboard
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    /// which of the 16 keypad keys are down right now
    pub keys: [bool; 16],
    /// the pause key was struck since the last poll
    pub pause: bool,
    /// the user asked to quit
    pub quit: bool,
}

/// reads keypresses
pub trait Input {
    /// non-blocking snapshot of the keypad plus pause/quit edges; called
    /// once per interpreter cycle
    fn poll(&mut self) -> Result<InputState, io::Error>;
}

/// simple implementation of Input, using crossterm events on STDIN.
///
/// Terminals that speak the keyboard-enhancement protocol give us real
/// release events; elsewhere a key is considered held until KEY_HOLD
/// passes without another press or repeat for it.
pub struct TermInput {
    keymap: HashMap<char, u8>,
    last_press: [Option<Instant>; 16],
    held: [bool; 16],
    release_events: bool,
}

impl TermInput {
    pub fn new() -> Result<Self, io::Error> {
        terminal::enable_raw_mode()?;
        let release_events = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if release_events {
            io::stdout().execute(PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::REPORT_EVENT_TYPES,
            ))?;
        }
        Ok(TermInput {
            keymap: HashMap::from(CHIP8_CONVENTIONAL_KEYMAP),
            last_press: [None; 16],
            held: [false; 16],
            release_events,
        })
    }

    fn on_key(&mut self, evt: KeyEvent, state: &mut InputState) {
        match evt.code {
            KeyCode::Esc => state.quit = true,
            KeyCode::Char('c') if evt.modifiers.contains(KeyModifiers::CONTROL) => {
                state.quit = true
            }
            KeyCode::Char('p') if evt.kind == KeyEventKind::Press => state.pause = true,
            KeyCode::Char(ch) => {
                if let Some(&key) = self.keymap.get(&ch) {
                    let key = key as usize;
                    if evt.kind == KeyEventKind::Release {
                        self.held[key] = false;
                        self.last_press[key] = None;
                    } else {
                        self.held[key] = true;
                        self.last_press[key] = Some(Instant::now());
                    }
                }
            }
            _ => {}
        }
    }
}

impl Drop for TermInput {
    fn drop(&mut self) {
        if self.release_events {
            let _ = io::stdout().execute(PopKeyboardEnhancementFlags);
        }
        let _ = terminal::disable_raw_mode();
    }
}

impl Input for TermInput {
    fn poll(&mut self) -> Result<InputState, io::Error> {
        let mut state = InputState::default();

        while poll(Duration::from_millis(0))? {
            if let Event::Key(evt) = read()? {
                self.on_key(evt, &mut state);
            }
        }

        // age out keys on terminals that never send releases
        if !self.release_events {
            for (key, pressed_at) in self.last_press.iter().enumerate() {
                self.held[key] = matches!(pressed_at, Some(t) if t.elapsed() < KEY_HOLD);
            }
        }

        state.keys = self.held;
        Ok(state)
    }
}

/// dummy Input implementation for testing: replays a script of snapshots,
/// then keeps answering with the last one
pub struct DummyInput {
    script: Vec<InputState>,
    at: usize,
}

impl DummyInput {
    pub fn new(script: &[InputState]) -> Self {
        DummyInput {
            script: Vec::from(script),
            at: 0,
        }
    }

    /// a one-snapshot script with the given keypad keys held
    pub fn pressing(keys: &[u8]) -> Self {
        let mut state = InputState::default();
        for &key in keys {
            state.keys[key as usize] = true;
        }
        DummyInput::new(&[state])
    }
}

impl Input for DummyInput {
    fn poll(&mut self) -> Result<InputState, io::Error> {
        let state = match self.script.get(self.at) {
            Some(state) => *state,
            None => *self.script.last().unwrap_or(&InputState::default()),
        };
        if self.at < self.script.len() {
            self.at += 1;
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keymap_covers_the_whole_keypad() {
        let m = HashMap::from(CHIP8_CONVENTIONAL_KEYMAP);
        assert_eq!(m.len(), 16);
        let mut keys: Vec<u8> = m.values().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0x00..=0x0f).collect::<Vec<u8>>());
    }

    #[test]
    fn test_dummy_replays_then_repeats() -> Result<(), io::Error> {
        let mut first = InputState::default();
        first.keys[0x5] = true;
        let second = InputState {
            quit: true,
            ..Default::default()
        };
        let mut input = DummyInput::new(&[first, second]);

        assert!(input.poll()?.keys[0x5]);
        assert!(input.poll()?.quit);
        // off the end of the script the last snapshot repeats
        assert!(input.poll()?.quit);
        Ok(())
    }

    #[test]
    fn test_dummy_with_empty_script_is_idle() -> Result<(), io::Error> {
        let mut input = DummyInput::new(&[]);
        let state = input.poll()?;
        assert!(!state.quit && !state.pause);
        assert_eq!(state.keys, [false; 16]);
        Ok(())
    }

    #[test]
    fn test_pressing_builds_a_snapshot() -> Result<(), io::Error> {
        let mut input = DummyInput::pressing(&[0x1, 0xa]);
        let state = input.poll()?;
        assert!(state.keys[0x1] && state.keys[0xa]);
        assert!(!state.keys[0x0]);
        Ok(())
    }
}
