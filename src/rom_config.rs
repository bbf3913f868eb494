use crate::emulator::basics::MAX_ROM_SIZE;
use crate::emulator::error::Chip8Error;
use crate::emulator::executor::Executor;
use crate::emulator::vm::VirtualMachine;
use log::info;
use std::path::{Path, PathBuf};
use std::{fs::File, io::Read, time::Duration};

pub const DEFAULT_INSTRUCTIONS_PER_SECOND: u32 = 700;
pub const DEFAULT_FRAME_RATE: u32 = 60;

/// Settings of one emulation session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub rom_path: PathBuf,
    pub instructions_per_second: u32,
    /// Timer ticks and redraws per second.
    pub frame_rate: u32,
    pub render: bool,
    /// Stop after this long; run until an error otherwise.
    pub run_time: Option<Duration>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            rom_path: PathBuf::new(),
            instructions_per_second: DEFAULT_INSTRUCTIONS_PER_SECOND,
            frame_rate: DEFAULT_FRAME_RATE,
            render: false,
            run_time: None,
        }
    }
}

impl Config {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }
}

/// Reads a whole ROM file, refusing anything that would not fit above 0x200.
pub fn load_rom_file(path: &Path) -> Result<Vec<u8>, Chip8Error> {
    let read_error = |source: std::io::Error| Chip8Error::RomRead {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(read_error)?;
    let mut raw_rom = Vec::new();
    file.read_to_end(&mut raw_rom).map_err(read_error)?;
    if raw_rom.len() > MAX_ROM_SIZE {
        return Err(Chip8Error::RomTooLarge {
            size: raw_rom.len(),
            max_size: MAX_ROM_SIZE,
        });
    }
    info!("Read {} bytes from {}.", raw_rom.len(), path.display());
    Ok(raw_rom)
}

/// Loads the configured ROM and starts executing it. Nothing runs unless the
/// whole ROM was loaded.
pub fn start(config: &Config) -> Result<Executor, Chip8Error> {
    let rom = load_rom_file(&config.rom_path)?;
    let vm = VirtualMachine::new(&rom)?;
    Executor::start(vm, config.instructions_per_second)
}
