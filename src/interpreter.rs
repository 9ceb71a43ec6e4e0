//! # interpreter
//!
//! The virtual machine itself: registers, stack, RAM, the two-plane
//! framebuffer, both timers, and the fetch/decode/execute loop that drives
//! them. One [`step`](Interpreter::step) executes exactly one opcode; the
//! [`run`](Interpreter::run) loop paces steps to the configured rate and
//! flushes the display and timers at 60Hz.
//!
//! Mode differences never appear in the handlers as `if mode == ...`;
//! they are folded into a [`Quirks`] record at construction.

use std::path::Path;
use std::time::{Duration, Instant};
use std::{fs, thread};

use log::{debug, error, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::display::{Display, Rgb};
use crate::framebuffer::{Framebuffer, XRES, YRES};
use crate::input::Input;
use crate::memory::{Ram, FONT_OFFSET, HIRES_FONT_OFFSET, PROGRAM_ADDR};
use crate::mode::{Mode, Quirks};
use crate::sound::{Audio, DEFAULT_PITCH, PATTERN_LEN};
use crate::storage::{self, Storage};
use crate::Error;

/// the display flush / timer decrement period
const FRAME: Duration = Duration::from_micros(1_000_000 / 60);

/// how long to doze between input polls while paused
const PAUSE_POLL: Duration = Duration::from_millis(10);

/// default instruction rate in instructions per second
pub const DEFAULT_SPEED: u32 = 600;

/// knobs the cli resolves before construction
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub mode: Mode,
    /// instructions per second
    pub speed: u32,
    /// colours for the composed pixel values 0-3
    pub colors: [Rgb; 4],
    /// log every executed opcode
    pub trace: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            mode: Mode::SuperChip,
            speed: DEFAULT_SPEED,
            colors: [Rgb::default(); 4],
            trace: false,
        }
    }
}

pub struct Interpreter<'a> {
    quirks: Quirks,
    speed: u32,
    colors: [Rgb; 4],
    trace: bool,

    // machine state
    v: [u8; 16],
    stack: [u16; 16],
    sp: u8,
    ram: Ram,
    idx: u16,
    pc: u16,
    delay_timer: u8,
    sound_timer: u8,
    cycles: u64,

    // graphics
    fb: Framebuffer,
    plane_mask: u8,
    hires: bool,

    // audio
    audio_pattern: [u8; PATTERN_LEN],
    pitch: u8,

    // key tracking
    keys: [bool; 16],
    prev_keys: [bool; 16],
    paused: bool,
    finished: bool,

    rom_name: String,
    rng: StdRng,

    // host interfaces
    display: &'a mut dyn Display,
    audio: &'a mut dyn Audio,
    input: &'a mut dyn Input,
    storage: Storage,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        settings: Settings,
        display: &'a mut impl Display,
        audio: &'a mut impl Audio,
        input: &'a mut impl Input,
        storage: Storage,
    ) -> Interpreter<'a> {
        let mut i = Interpreter {
            quirks: Quirks::from(settings.mode),
            speed: settings.speed.max(1),
            colors: settings.colors,
            trace: settings.trace,
            v: [0; 16],
            stack: [0; 16],
            sp: 0,
            ram: Ram::new(),
            idx: 0,
            pc: PROGRAM_ADDR,
            delay_timer: 0,
            sound_timer: 0,
            cycles: 0,
            fb: Framebuffer::new(),
            plane_mask: 0x01,
            hires: false,
            audio_pattern: [0; PATTERN_LEN],
            pitch: DEFAULT_PITCH,
            keys: [false; 16],
            prev_keys: [false; 16],
            paused: false,
            finished: false,
            rom_name: String::new(),
            rng: StdRng::from_entropy(),
            display,
            audio,
            input,
            storage,
        };
        i.reset();
        i
    }

    /// back to power-on state: pc at 0x200, cleared registers, stack and
    /// picture, fonts reloaded, default tone
    pub fn reset(&mut self) {
        self.pc = PROGRAM_ADDR;
        self.idx = 0;
        self.sp = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.cycles = 0;
        self.paused = false;
        self.finished = false;

        self.v = [0; 16];
        self.stack = [0; 16];
        self.keys = [false; 16];
        self.prev_keys = [false; 16];

        self.fb.clear(0x03);
        self.plane_mask = 0x01;
        self.hires = false;

        self.pitch = DEFAULT_PITCH;
        for (at, byte) in self.audio_pattern.iter_mut().enumerate() {
            *byte = if at < PATTERN_LEN / 2 { 0x00 } else { 0xff };
        }

        self.ram.reset();
    }

    /// load a rom from disk; its basename becomes the save-flag key
    pub fn load_program(&mut self, path: &Path) -> Result<usize, Error> {
        if path.as_os_str().is_empty() {
            return Err(Error::EmptyRomPath);
        }
        let mut file = fs::File::open(path).map_err(|e| Error::RomUnreadable {
            path: path.display().to_string(),
            source: e,
        })?;
        let len = self.ram.load_program(&mut file)?;
        self.rom_name = storage::rom_name(path);
        debug!("loaded {} ({} bytes)", self.rom_name, len);
        Ok(len)
    }

    /// load a program image directly (tests, embedded roms)
    pub fn load_bytes(&mut self, program: &[u8]) -> Result<usize, Error> {
        self.ram.load_program(&mut &program[..])
    }

    /// run the main interpreter loop: poll, step, flush, sleep; returns
    /// when the program exits (00fd) or the host asks to quit
    pub fn run(&mut self) -> Result<(), Error> {
        let step_budget = Duration::from_secs(1) / self.speed;
        let mut last_draw = Instant::now();
        let mut rate_timer = Instant::now();
        let mut rate_count = 0u32;

        loop {
            let start = Instant::now();

            self.poll_keys()?;
            if self.finished {
                return Ok(());
            }
            if self.paused {
                thread::sleep(PAUSE_POLL);
                continue;
            }

            self.step()?;
            if self.finished {
                return Ok(());
            }

            // flush the display and tick the timers at approximately 60Hz
            if last_draw.elapsed() >= FRAME {
                if self.fb.take_dirty() {
                    let frame = self.compose();
                    self.display.draw(&frame)?;
                }
                last_draw = Instant::now();
                self.tick_timers()?;
            }

            // slow down to approximately the right speed
            let elapsed = start.elapsed();
            if step_budget > elapsed {
                thread::sleep(step_budget - elapsed);
            }

            rate_count += 1;
            if rate_timer.elapsed() >= Duration::from_secs(1) {
                debug!("{} cycles per second", rate_count);
                rate_timer = Instant::now();
                rate_count = 0;
            }
        }
    }

    /// roll the key snapshot over and apply pause/quit edges
    fn poll_keys(&mut self) -> Result<(), Error> {
        self.prev_keys = self.keys;
        let state = self.input.poll()?;
        self.keys = state.keys;
        if state.pause {
            self.paused = !self.paused;
        }
        if state.quit {
            self.finished = true;
        }
        Ok(())
    }

    /// decrement both timers and gate the tone, in step with the display
    fn tick_timers(&mut self) -> Result<(), Error> {
        if self.delay_timer > 0 {
            self.delay_timer -= 1;
        }

        if self.sound_timer > 0 {
            self.audio.play().map_err(|e| Error::Audio(e.to_string()))?;
            self.sound_timer -= 1;
        } else {
            self.audio.stop().map_err(|e| Error::Audio(e.to_string()))?;
        }
        Ok(())
    }

    /// the composed frame, ready for the display: plane bits folded to 0-3
    /// and looked up in the colour map
    fn compose(&self) -> Vec<Rgb> {
        self.fb
            .composite()
            .into_iter()
            .map(|v| self.colors[v as usize])
            .collect()
    }

    /// fetch, decode and execute the opcode at pc. Unknown encodings are
    /// logged and skipped. The pc advances by two afterwards no matter
    /// what; handlers that need it elsewhere compensate.
    pub fn step(&mut self) -> Result<(), Error> {
        let op = self.ram.word(self.pc);
        let n1 = (op >> 12 & 0xf) as u8;
        let x = (op >> 8 & 0xf) as u8;
        let y = (op >> 4 & 0xf) as u8;
        let n = (op & 0xf) as u8;
        let nn = (op & 0xff) as u8;
        let nnn = op & 0x0fff;

        if self.trace {
            trace!(
                "op={:04X} pc={:04X} i={:04X} sp={:02X} vx={:02X} vy={:02X} vf={:02X}",
                op,
                self.pc,
                self.idx,
                self.sp,
                self.v[x as usize],
                self.v[y as usize],
                self.v[0xf],
            );
        }

        match op {
            0x00e0 => self.fb.clear(self.plane_mask),
            0x00ee => self.ret()?,
            0x00fb => self.fb.scroll_right(self.plane_mask),
            0x00fc => self.fb.scroll_left(self.plane_mask),
            0x00fd => self.finished = true,
            0x00fe => self.hires = false,
            0x00ff => self.hires = true,
            0xf000 => self.load_long_index(),
            0xf002 => self.load_audio_pattern()?,
            _ => match n1 {
                0x0 if x == 0x0 && y == 0xc => self.fb.scroll_down(self.plane_mask, n as usize),
                0x0 if x == 0x0 && y == 0xd => self.fb.scroll_up(self.plane_mask, n as usize),
                0x1 => self.jump(nnn),
                0x2 => self.call(nnn)?,
                0x3 => self.skip_if(self.v[x as usize] == nn),
                0x4 => self.skip_if(self.v[x as usize] != nn),
                0x5 if n == 0x0 => self.skip_if(self.v[x as usize] == self.v[y as usize]),
                0x5 if n == 0x2 => self.save_range(x, y),
                0x5 if n == 0x3 => self.load_range(x, y),
                0x6 => self.v[x as usize] = nn,
                0x7 => self.v[x as usize] = self.v[x as usize].wrapping_add(nn),
                0x8 => self.alu(x, y, n),
                0x9 if n == 0x0 => self.skip_if(self.v[x as usize] != self.v[y as usize]),
                0xa => self.idx = nnn,
                0xb => self.jump_offset(x, nnn),
                0xc => self.v[x as usize] = self.rng.gen::<u8>() & nn,
                0xd => self.draw_sprite(x, y, n),
                0xe if nn == 0x9e => self.skip_if(self.key_down(x)),
                0xe if nn == 0xa1 => self.skip_if(!self.key_down(x)),
                0xf => self.misc(x, nn)?,
                _ => error!("bad opcode: unable to interpret {:04X}", op),
            },
        }

        self.pc = self.pc.wrapping_add(2);
        self.cycles += 1;
        Ok(())
    }

    /// 1nnn
    fn jump(&mut self, nnn: u16) {
        self.pc = nnn.wrapping_sub(2);
    }

    /// bnnn: jump to nnn plus v0; superchip reads it as bxnn and jumps to
    /// nn plus vx
    fn jump_offset(&mut self, x: u8, nnn: u16) {
        let target = if self.quirks.jump_offset_uses_vx {
            (nnn & 0xff).wrapping_add(self.v[x as usize] as u16)
        } else {
            nnn.wrapping_add(self.v[0] as u16)
        };
        self.pc = target.wrapping_sub(2);
    }

    /// 2nnn: push the current pc; sixteen nested calls is one too many
    fn call(&mut self, nnn: u16) -> Result<(), Error> {
        if self.sp as usize + 1 >= self.stack.len() {
            return Err(Error::StackOverflow { pc: self.pc });
        }
        self.sp += 1;
        self.stack[self.sp as usize] = self.pc;
        self.pc = nnn.wrapping_sub(2);
        Ok(())
    }

    /// 00ee
    fn ret(&mut self) -> Result<(), Error> {
        if self.sp == 0 {
            return Err(Error::StackUnderflow { pc: self.pc });
        }
        self.pc = self.stack[self.sp as usize];
        self.sp -= 1;
        Ok(())
    }

    /// the common tail of 3xnn/4xnn/5xy0/9xy0/ex9e/exa1: hop over the next
    /// instruction, treating a 4-byte f000 nnnn as one unit where the mode
    /// says so
    fn skip_if(&mut self, cond: bool) {
        if !cond {
            return;
        }
        self.pc = self.pc.wrapping_add(2);
        if self.quirks.long_skip && self.ram.word(self.pc) == 0xf000 {
            self.pc = self.pc.wrapping_add(2);
        }
    }

    fn key_down(&self, x: u8) -> bool {
        self.keys[(self.v[x as usize] & 0x0f) as usize]
    }

    /// 8xy0 through 8xye. VF is always written after the destination, which
    /// is observable when x is f.
    fn alu(&mut self, x: u8, y: u8, n: u8) {
        let (x, y) = (x as usize, y as usize);
        match n {
            0x0 => self.v[x] = self.v[y],
            0x1 => {
                self.v[x] |= self.v[y];
                if self.quirks.vf_reset {
                    self.v[0xf] = 0;
                }
            }
            0x2 => {
                self.v[x] &= self.v[y];
                if self.quirks.vf_reset {
                    self.v[0xf] = 0;
                }
            }
            0x3 => {
                self.v[x] ^= self.v[y];
                if self.quirks.vf_reset {
                    self.v[0xf] = 0;
                }
            }
            0x4 => {
                let (res, carry) = self.v[x].overflowing_add(self.v[y]);
                self.v[x] = res;
                self.v[0xf] = carry as u8;
            }
            0x5 => {
                let (vx, vy) = (self.v[x], self.v[y]);
                self.v[x] = vx.wrapping_sub(vy);
                self.v[0xf] = (vx >= vy) as u8;
            }
            0x6 => {
                let src = if self.quirks.shift_uses_vy {
                    self.v[y]
                } else {
                    self.v[x]
                };
                self.v[x] = src >> 1;
                self.v[0xf] = src & 0x01;
            }
            0x7 => {
                let (vx, vy) = (self.v[x], self.v[y]);
                self.v[x] = vy.wrapping_sub(vx);
                self.v[0xf] = (vy >= vx) as u8;
            }
            0xe => {
                let src = if self.quirks.shift_uses_vy {
                    self.v[y]
                } else {
                    self.v[x]
                };
                self.v[x] = src << 1;
                self.v[0xf] = src >> 7;
            }
            _ => error!("bad opcode: unable to interpret 8{:X}{:X}{:X}", x, y, n),
        }
    }

    /// dxyn: xor a sprite into the selected planes and raise VF on any
    /// set-to-unset flip. An 8xN sprite normally; 16x16 when hires and n is
    /// 0. In low resolution every sprite pixel lands as a doubled 2x2 block.
    fn draw_sprite(&mut self, x: u8, y: u8, n: u8) {
        // the original machine blocked sprite draws until the next display
        // interrupt; model that by retrying until the cycle counter lines up
        if self.quirks.display_wait && self.cycles % 4 != 0 {
            self.pc = self.pc.wrapping_sub(2);
            return;
        }

        let (width, height) = if self.hires && n == 0 {
            (16usize, 16usize)
        } else {
            (8usize, n as usize)
        };
        let scale = if self.hires { 1 } else { 2 };

        let base_x = self.v[x as usize] as usize * scale % XRES;
        let base_y = self.v[y as usize] as usize * scale % YRES;

        let mut offset = self.idx;
        let mut collision = false;
        self.v[0xf] = 0x00;

        for row in 0..height {
            let mut bits = self.ram.get(offset) as u16;
            offset = offset.wrapping_add(1);
            if width == 16 {
                bits = bits << 8 | self.ram.get(offset) as u16;
                offset = offset.wrapping_add(1);
            }

            for col in 0..width {
                let bit = (bits >> (width - 1 - col) & 0x01) as u8;
                let mut px = base_x + col * scale;
                let mut py = base_y + row * scale;

                if self.quirks.sprite_wrap {
                    px %= XRES;
                    py %= YRES;
                } else if px >= XRES || py >= YRES {
                    // pixels past the right or bottom edge are clipped
                    continue;
                }

                if self.fb.blit(self.plane_mask, px, py, scale, bit) {
                    collision = true;
                }
            }
        }

        if collision {
            self.v[0xf] = 0x01;
        }
    }

    /// f000 nnnn: the only 4-byte instruction; loads a full 16-bit address
    /// into i and consumes the operand word
    fn load_long_index(&mut self) {
        self.idx = self.ram.word(self.pc.wrapping_add(2));
        self.pc = self.pc.wrapping_add(2);
    }

    /// f002: snapshot 16 bytes at i into the audio pattern buffer
    fn load_audio_pattern(&mut self) -> Result<(), Error> {
        for at in 0..PATTERN_LEN {
            self.audio_pattern[at] = self.ram.get(self.idx.wrapping_add(at as u16));
        }
        self.audio
            .load_pattern(self.audio_pattern)
            .map_err(|e| Error::Audio(e.to_string()))
    }

    /// 5xy2: save an inclusive register range to memory at i, walking
    /// backwards when x > y; i itself is untouched
    fn save_range(&mut self, x: u8, y: u8) {
        for at in 0..=x.abs_diff(y) {
            let reg = if x > y { x - at } else { x + at };
            self.ram
                .set(self.idx.wrapping_add(at as u16), self.v[reg as usize]);
        }
    }

    /// 5xy3: the read twin of 5xy2
    fn load_range(&mut self, x: u8, y: u8) {
        for at in 0..=x.abs_diff(y) {
            let reg = if x > y { x - at } else { x + at };
            self.v[reg as usize] = self.ram.get(self.idx.wrapping_add(at as u16));
        }
    }

    /// the fx__ family
    fn misc(&mut self, x: u8, nn: u8) -> Result<(), Error> {
        match nn {
            0x01 => self.select_plane(x),
            0x07 => self.v[x as usize] = self.delay_timer,
            0x0a => self.wait_key(x),
            0x15 => self.delay_timer = self.v[x as usize],
            0x18 => self.sound_timer = self.v[x as usize],
            0x1e => self.idx = self.idx.wrapping_add(self.v[x as usize] as u16),
            0x29 => self.idx = FONT_OFFSET + (self.v[x as usize] & 0x0f) as u16 * 5,
            0x30 => self.idx = HIRES_FONT_OFFSET + (self.v[x as usize] & 0x0f) as u16 * 10,
            0x33 => self.store_bcd(x),
            0x3a => self.set_pitch(x)?,
            0x55 => self.store_registers(x),
            0x65 => self.load_registers(x),
            0x75 => self.persist_flags(x),
            0x85 => self.restore_flags(x),
            _ => error!("bad opcode: unable to interpret F{:X}{:02X}", x, nn),
        }
        Ok(())
    }

    /// fx01: select which bit planes clear/scroll/draw operate on
    fn select_plane(&mut self, x: u8) {
        if x > 0x03 {
            error!("plane select out of range (must be 0-3): {}", x);
            return;
        }
        self.plane_mask = x;
    }

    /// fx0a: park on this instruction until a key release edge shows up in
    /// the snapshots; timers keep running while we wait
    fn wait_key(&mut self, x: u8) {
        for key in 0..self.keys.len() {
            if self.prev_keys[key] && !self.keys[key] {
                self.v[x as usize] = key as u8;
                return;
            }
        }
        self.pc = self.pc.wrapping_sub(2);
    }

    /// fx3a: retune the audio playback rate
    fn set_pitch(&mut self, x: u8) -> Result<(), Error> {
        self.pitch = self.v[x as usize];
        self.audio
            .set_pitch(self.pitch)
            .map_err(|e| Error::Audio(e.to_string()))
    }

    /// fx33: the binary-coded decimal of vx into i, i+1, i+2
    fn store_bcd(&mut self, x: u8) {
        let vx = self.v[x as usize];
        self.ram.set(self.idx, vx / 100);
        self.ram.set(self.idx.wrapping_add(1), vx / 10 % 10);
        self.ram.set(self.idx.wrapping_add(2), vx % 10);
    }

    /// fx55: v0..=vx into memory at i; whether i moves past the range
    /// afterwards is a mode quirk
    fn store_registers(&mut self, x: u8) {
        for at in 0..=x as u16 {
            self.ram.set(self.idx.wrapping_add(at), self.v[at as usize]);
        }
        if self.quirks.increment_index {
            self.idx = self.idx.wrapping_add(x as u16 + 1);
        }
    }

    /// fx65: the read twin of fx55
    fn load_registers(&mut self, x: u8) {
        for at in 0..=x as u16 {
            self.v[at as usize] = self.ram.get(self.idx.wrapping_add(at));
        }
        if self.quirks.increment_index {
            self.idx = self.idx.wrapping_add(x as u16 + 1);
        }
    }

    /// fx75: v0..=vx into the persistent RPL flags; plain chip-8 has no
    /// flag store, and each mode caps how many flags exist
    fn persist_flags(&mut self, x: u8) {
        if self.quirks.rpl_flags == 0 {
            return;
        }
        let x = x.min(self.quirks.rpl_flags - 1);
        self.storage.persist(&self.rom_name, &self.v[..=x as usize]);
    }

    /// fx85
    fn restore_flags(&mut self, x: u8) {
        if self.quirks.rpl_flags == 0 {
            return;
        }
        let x = x.min(self.quirks.rpl_flags - 1);
        let flags = self.storage.load(&self.rom_name, x as usize + 1);
        self.v[..flags.len()].copy_from_slice(&flags);
    }
}
