use std::path::PathBuf;

/// Everything that can stop the virtual machine. None of these are recoverable;
/// the scheduler aborts its run loop on the first one.
#[derive(Debug, thiserror::Error)]
pub enum Chip8Error {
    #[error("unknown opcode {opcode:#06X}")]
    UnknownOpcode { opcode: u16 },

    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    RomTooLarge { size: usize, max_size: usize },

    #[error("could not read ROM {}", path.display())]
    RomRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("maximal stack depth exceeded")]
    StackOverflow,

    #[error("tried to return from empty stack")]
    StackUnderflow,

    #[error("memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: usize },

    #[error("key {key:#04X} is not on the keypad")]
    InvalidKey { key: u8 },

    #[error("could not spawn executor thread")]
    Spawn(#[source] std::io::Error),

    #[error("executor thread panicked")]
    ExecutorPanicked,
}
