pub const MEMORY_SIZE: usize = 4096;
pub const PROGRAM_START: u16 = 0x200;
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - PROGRAM_START as usize;
pub const STACK_DEPTH: usize = 16;
pub const REGISTER_COUNT: usize = 16;
pub const KEY_COUNT: usize = 16;

pub const SCREEN_WIDTH: usize = 64;
pub const SCREEN_HEIGHT: usize = 32;
pub const HIRES_SCREEN_WIDTH: usize = 128;
pub const HIRES_SCREEN_HEIGHT: usize = 64;

pub const SMALL_FONT_OFFSET: u16 = 0x000;
pub const SMALL_FONT_HEIGHT: u16 = 5;
pub const LARGE_FONT_OFFSET: u16 = 0x050;
pub const LARGE_FONT_HEIGHT: u16 = 10;

/// A 12-bit memory address, stored in 16 bits.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Address(pub u16);

impl Address {
    /// Moves to the next instruction.
    pub fn advance(&mut self) {
        self.0 = self.0.wrapping_add(2);
    }

    /// Moves back to the previous instruction.
    pub fn rewind(&mut self) {
        self.0 = self.0.wrapping_sub(2);
    }
}

/// Index of one of the registers V0 to VF.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Register(pub u8);

/// An 8-bit immediate from an instruction.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Value(pub u8);

/// Display geometry. The legacy mode is 64x32, the extended one 128x64.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Resolution {
    Low,
    High,
}

impl Resolution {
    pub fn width(self) -> usize {
        match self {
            Resolution::Low => SCREEN_WIDTH,
            Resolution::High => HIRES_SCREEN_WIDTH,
        }
    }

    pub fn height(self) -> usize {
        match self {
            Resolution::Low => SCREEN_HEIGHT,
            Resolution::High => HIRES_SCREEN_HEIGHT,
        }
    }
}

#[rustfmt::skip]
pub const SMALL_FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

#[rustfmt::skip]
pub const LARGE_FONT: [u8; 160] = [
    0x7C, 0x82, 0x82, 0x82, 0x82, 0x82, 0x82, 0x82, 0x7C, 0x00, // 0
    0x08, 0x18, 0x38, 0x08, 0x08, 0x08, 0x08, 0x08, 0x3C, 0x00, // 1
    0x7C, 0x82, 0x02, 0x02, 0x04, 0x18, 0x20, 0x40, 0xFE, 0x00, // 2
    0x7C, 0x82, 0x02, 0x02, 0x3C, 0x02, 0x02, 0x82, 0x7C, 0x00, // 3
    0x84, 0x84, 0x84, 0x84, 0xFE, 0x04, 0x04, 0x04, 0x04, 0x00, // 4
    0xFE, 0x80, 0x80, 0x80, 0xFC, 0x02, 0x02, 0x82, 0x7C, 0x00, // 5
    0x7C, 0x82, 0x80, 0x80, 0xFC, 0x82, 0x82, 0x82, 0x7C, 0x00, // 6
    0xFE, 0x02, 0x04, 0x08, 0x10, 0x20, 0x20, 0x20, 0x20, 0x00, // 7
    0x7C, 0x82, 0x82, 0x82, 0x7C, 0x82, 0x82, 0x82, 0x7C, 0x00, // 8
    0x7C, 0x82, 0x82, 0x82, 0x7E, 0x02, 0x02, 0x82, 0x7C, 0x00, // 9
    0x10, 0x28, 0x44, 0x82, 0x82, 0xFE, 0x82, 0x82, 0x82, 0x00, // A
    0xFC, 0x82, 0x82, 0x82, 0xFC, 0x82, 0x82, 0x82, 0xFC, 0x00, // B
    0x7C, 0x82, 0x80, 0x80, 0x80, 0x80, 0x80, 0x82, 0x7C, 0x00, // C
    0xFC, 0x82, 0x82, 0x82, 0x82, 0x82, 0x82, 0x82, 0xFC, 0x00, // D
    0xFE, 0x80, 0x80, 0x80, 0xF8, 0x80, 0x80, 0x80, 0xFE, 0x00, // E
    0xFE, 0x80, 0x80, 0x80, 0xF8, 0x80, 0x80, 0x80, 0x80, 0x00, // F
];
