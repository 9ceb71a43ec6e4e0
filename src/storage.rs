use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::Error;

/// how many RPL user flags are kept per game
pub const FLAG_COUNT: usize = 16;

/// strip the path and extension from a rom filename, leaving (hopefully)
/// the name of the game, which keys its saved flags
pub fn rom_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// one game's worth of persistent flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct GameSave {
    rom: String,
    flags: [u8; FLAG_COUNT],
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SaveFile {
    game_data: Vec<GameSave>,
}

/// The persistent store behind fx75/fx85: a list of (rom name, 16 flag
/// bytes) pairs mirrored to a JSON file. With no path it keeps flags in
/// memory only, which is what the tests use.
pub struct Storage {
    path: Option<PathBuf>,
    games: Vec<GameSave>,
}

impl Storage {
    /// read the save file in, if there is one. A missing file is an empty
    /// store; a file that exists but does not parse is fatal.
    pub fn open(path: Option<PathBuf>) -> Result<Storage, Error> {
        let Some(path) = path else {
            return Ok(Storage {
                path: None,
                games: Vec::new(),
            });
        };

        let games = match fs::read(&path) {
            Ok(data) => {
                let file: SaveFile =
                    serde_json::from_slice(&data).map_err(|e| Error::CorruptSaveFile {
                        path: path.display().to_string(),
                        source: e,
                    })?;
                file.game_data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::Io(e)),
        };

        debug!("loaded {} save entries from {}", games.len(), path.display());
        Ok(Storage {
            path: Some(path),
            games,
        })
    }

    /// upsert one game's flags. Only the bytes supplied are overwritten;
    /// on a fresh insert the tail pads with zeroes, on an update the old
    /// tail bytes survive. The file is rewritten straight away; a failed
    /// write is logged and play continues.
    pub fn persist(&mut self, rom: &str, flags: &[u8]) {
        let flags = &flags[..flags.len().min(FLAG_COUNT)];

        match self.games.iter_mut().find(|g| g.rom == rom) {
            Some(game) => game.flags[..flags.len()].copy_from_slice(flags),
            None => {
                let mut game = GameSave {
                    rom: rom.to_string(),
                    flags: [0; FLAG_COUNT],
                };
                game.flags[..flags.len()].copy_from_slice(flags);
                self.games.push(game);
            }
        }

        if let Err(e) = self.save() {
            error!("unable to write save file: {}", e);
        }
    }

    /// the first n flag bytes for a game, zero-filled when there is no
    /// entry. n is clamped to the 16 bytes we keep.
    pub fn load(&self, rom: &str, n: usize) -> Vec<u8> {
        let n = n.min(FLAG_COUNT);
        match self.games.iter().find(|g| g.rom == rom) {
            Some(game) => game.flags[..n].to_vec(),
            None => vec![0; n],
        }
    }

    /// rewrite the whole file: a sibling temp file renamed over the old
    /// one, so a crash mid-write never leaves a truncated file behind
    fn save(&self) -> Result<(), std::io::Error> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = SaveFile {
            game_data: self.games.clone(),
        };
        let data = serde_json::to_vec_pretty(&file)?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_savefile(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ocho-storage-test-{}-{}.json", tag, std::process::id()))
    }

    #[test]
    fn test_rom_name_strips_path_and_extension() {
        assert_eq!(rom_name(Path::new("/roms/pong.ch8")), "pong");
        assert_eq!(rom_name(Path::new("octopeg.xo8")), "octopeg");
        assert_eq!(rom_name(Path::new("bare")), "bare");
    }

    #[test]
    fn test_load_of_absent_entry_is_zeroes() -> Result<(), Error> {
        let s = Storage::open(None)?;
        assert_eq!(s.load("nope", 4), vec![0; 4]);
        Ok(())
    }

    #[test]
    fn test_persist_then_load_round_trips() -> Result<(), Error> {
        let mut s = Storage::open(None)?;
        s.persist("pong", &[1, 2, 3, 4]);
        assert_eq!(s.load("pong", 4), vec![1, 2, 3, 4]);
        // shorter reads see a prefix
        assert_eq!(s.load("pong", 2), vec![1, 2]);
        // longer reads pad with the zero tail
        assert_eq!(s.load("pong", 6), vec![1, 2, 3, 4, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_partial_persist_preserves_the_old_tail() -> Result<(), Error> {
        let mut s = Storage::open(None)?;
        s.persist("pong", &[1, 2, 3, 4]);
        s.persist("pong", &[9]);
        assert_eq!(s.load("pong", 4), vec![9, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_load_clamps_to_flag_count() -> Result<(), Error> {
        let mut s = Storage::open(None)?;
        s.persist("pong", &[7; 32]);
        assert_eq!(s.load("pong", 99).len(), FLAG_COUNT);
        assert_eq!(s.load("pong", 99), vec![7; FLAG_COUNT]);
        Ok(())
    }

    #[test]
    fn test_round_trip_through_a_real_file() -> Result<(), Error> {
        let path = temp_savefile("roundtrip");
        let _ = fs::remove_file(&path);

        let mut s = Storage::open(Some(path.clone()))?;
        s.persist("cave", &[0xde, 0xad]);
        drop(s);

        let s = Storage::open(Some(path.clone()))?;
        assert_eq!(s.load("cave", 2), vec![0xde, 0xad]);
        assert_eq!(&s.load("cave", 16)[2..], &[0u8; 14][..]);

        let _ = fs::remove_file(&path);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_empty_store() -> Result<(), Error> {
        let s = Storage::open(Some(temp_savefile("missing-never-created")))?;
        assert_eq!(s.load("anything", 16), vec![0; 16]);
        Ok(())
    }

    #[test]
    fn test_corrupt_file_is_fatal() {
        let path = temp_savefile("corrupt");
        fs::write(&path, b"definitely not json").unwrap();
        match Storage::open(Some(path.clone())) {
            Err(Error::CorruptSaveFile { .. }) => {}
            _ => panic!("expected CorruptSaveFile"),
        }
        let _ = fs::remove_file(&path);
    }
}
