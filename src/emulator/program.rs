use super::basics::{Address, Register, Value};
use super::error::Chip8Error;
use lazy_static::lazy_static;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Instruction {
    MachineCodeRoutine(Address),
    ClearDisplay,
    ScrollDown(Value),
    ScrollRight,
    ScrollLeft,
    LowResolution,
    HighResolution,
    ReturnSubroutine,
    Jump(Address),
    CallSubroutine(Address),
    SkipIfEqualConst(Register, Value),
    SkipIfNotEqualConst(Register, Value),
    SkipIfEqual(Register, Register),
    SkipIfNotEqual(Register, Register),
    SetConst(Register, Value),
    AddConst(Register, Value),
    Set(Register, Register),
    Or(Register, Register),
    And(Register, Register),
    Xor(Register, Register),
    Add(Register, Register),
    Sub(Register, Register),
    RightShift(Register),
    NegSub(Register, Register),
    LeftShift(Register),
    SetI(Address),
    JumpAdd(Address),
    Rand(Register, Value),
    Draw(Register, Register, Value),
    SkipIfKey(Register),
    SkipIfNotKey(Register),
    GetDelayTimer(Register),
    WaitKey(Register),
    SetDelayTimer(Register),
    SetSoundTimer(Register),
    AddToI(Register),
    SpriteAddr(Register),
    LargeSpriteAddr(Register),
    Decimal(Register),
    StoreRegisters(Register),
    LoadRegisters(Register),
    PersistRegisters,
    RestoreRegisters,
}

/// The fixed split of a 16-bit opcode `FXYN` that every instruction family reads from.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Operands {
    pub family: u8,
    pub x: Register,
    pub y: Register,
    pub n: Value,
    pub kk: Value,
    pub nnn: Address,
}

impl Operands {
    pub fn split(opcode: u16) -> Operands {
        Operands {
            family: (opcode >> 12) as u8,
            x: Register((opcode >> 8 & 0x0F) as u8),
            y: Register((opcode >> 4 & 0x0F) as u8),
            n: Value((opcode & 0x0F) as u8),
            kk: Value((opcode & 0xFF) as u8),
            nnn: Address(opcode & 0x0FFF),
        }
    }
}

/// An opcode matches when `opcode & mask == pattern`.
struct Pattern {
    mask: u16,
    pattern: u16,
    build: fn(&Operands) -> Instruction,
}

#[rustfmt::skip]
static PATTERNS: [Pattern; 42] = [
    Pattern { mask: 0xFFFF, pattern: 0x00E0, build: |_| Instruction::ClearDisplay },
    Pattern { mask: 0xFFF0, pattern: 0x00C0, build: |o| Instruction::ScrollDown(o.n) },
    Pattern { mask: 0xFFFF, pattern: 0x00EE, build: |_| Instruction::ReturnSubroutine },
    Pattern { mask: 0xFFFF, pattern: 0x00FB, build: |_| Instruction::ScrollRight },
    Pattern { mask: 0xFFFF, pattern: 0x00FC, build: |_| Instruction::ScrollLeft },
    Pattern { mask: 0xFFFF, pattern: 0x00FE, build: |_| Instruction::LowResolution },
    Pattern { mask: 0xFFFF, pattern: 0x00FF, build: |_| Instruction::HighResolution },
    Pattern { mask: 0xF000, pattern: 0x1000, build: |o| Instruction::Jump(o.nnn) },
    Pattern { mask: 0xF000, pattern: 0x2000, build: |o| Instruction::CallSubroutine(o.nnn) },
    Pattern { mask: 0xF000, pattern: 0x3000, build: |o| Instruction::SkipIfEqualConst(o.x, o.kk) },
    Pattern { mask: 0xF000, pattern: 0x4000, build: |o| Instruction::SkipIfNotEqualConst(o.x, o.kk) },
    Pattern { mask: 0xF000, pattern: 0x5000, build: |o| Instruction::SkipIfEqual(o.x, o.y) },
    Pattern { mask: 0xF000, pattern: 0x6000, build: |o| Instruction::SetConst(o.x, o.kk) },
    Pattern { mask: 0xF000, pattern: 0x7000, build: |o| Instruction::AddConst(o.x, o.kk) },
    Pattern { mask: 0xF00F, pattern: 0x8000, build: |o| Instruction::Set(o.x, o.y) },
    Pattern { mask: 0xF00F, pattern: 0x8001, build: |o| Instruction::Or(o.x, o.y) },
    Pattern { mask: 0xF00F, pattern: 0x8002, build: |o| Instruction::And(o.x, o.y) },
    Pattern { mask: 0xF00F, pattern: 0x8003, build: |o| Instruction::Xor(o.x, o.y) },
    Pattern { mask: 0xF00F, pattern: 0x8004, build: |o| Instruction::Add(o.x, o.y) },
    Pattern { mask: 0xF00F, pattern: 0x8005, build: |o| Instruction::Sub(o.x, o.y) },
    Pattern { mask: 0xF00F, pattern: 0x8006, build: |o| Instruction::RightShift(o.x) },
    Pattern { mask: 0xF00F, pattern: 0x8007, build: |o| Instruction::NegSub(o.x, o.y) },
    Pattern { mask: 0xF00F, pattern: 0x800E, build: |o| Instruction::LeftShift(o.x) },
    Pattern { mask: 0xF000, pattern: 0x9000, build: |o| Instruction::SkipIfNotEqual(o.x, o.y) },
    Pattern { mask: 0xF000, pattern: 0xA000, build: |o| Instruction::SetI(o.nnn) },
    Pattern { mask: 0xF000, pattern: 0xB000, build: |o| Instruction::JumpAdd(o.nnn) },
    Pattern { mask: 0xF000, pattern: 0xC000, build: |o| Instruction::Rand(o.x, o.kk) },
    Pattern { mask: 0xF000, pattern: 0xD000, build: |o| Instruction::Draw(o.x, o.y, o.n) },
    Pattern { mask: 0xF0FF, pattern: 0xE09E, build: |o| Instruction::SkipIfKey(o.x) },
    Pattern { mask: 0xF0FF, pattern: 0xE0A1, build: |o| Instruction::SkipIfNotKey(o.x) },
    Pattern { mask: 0xF0FF, pattern: 0xF007, build: |o| Instruction::GetDelayTimer(o.x) },
    Pattern { mask: 0xF0FF, pattern: 0xF00A, build: |o| Instruction::WaitKey(o.x) },
    Pattern { mask: 0xF0FF, pattern: 0xF015, build: |o| Instruction::SetDelayTimer(o.x) },
    Pattern { mask: 0xF0FF, pattern: 0xF018, build: |o| Instruction::SetSoundTimer(o.x) },
    Pattern { mask: 0xF0FF, pattern: 0xF01E, build: |o| Instruction::AddToI(o.x) },
    Pattern { mask: 0xF0FF, pattern: 0xF029, build: |o| Instruction::SpriteAddr(o.x) },
    Pattern { mask: 0xF0FF, pattern: 0xF030, build: |o| Instruction::LargeSpriteAddr(o.x) },
    Pattern { mask: 0xF0FF, pattern: 0xF033, build: |o| Instruction::Decimal(o.x) },
    Pattern { mask: 0xF0FF, pattern: 0xF055, build: |o| Instruction::StoreRegisters(o.x) },
    Pattern { mask: 0xF0FF, pattern: 0xF065, build: |o| Instruction::LoadRegisters(o.x) },
    Pattern { mask: 0xF0FF, pattern: 0xF075, build: |_| Instruction::PersistRegisters },
    Pattern { mask: 0xF0FF, pattern: 0xF085, build: |_| Instruction::RestoreRegisters },
];

lazy_static! {
    /// `PATTERNS` bucketed by opcode family, so decoding only scans its own family.
    static ref FAMILIES: [Vec<&'static Pattern>; 16] = {
        let mut families: [Vec<&'static Pattern>; 16] = Default::default();
        for pattern in PATTERNS.iter() {
            families[(pattern.pattern >> 12) as usize].push(pattern);
        }
        families
    };
}

impl Instruction {
    pub fn from_16bit(a: u8, b: u8) -> Result<Instruction, Chip8Error> {
        let opcode = u16::from(a) << 8 | u16::from(b);
        let operands = Operands::split(opcode);
        let matched = FAMILIES[operands.family as usize]
            .iter()
            .find(|p| opcode & p.mask == p.pattern);
        match matched {
            Some(p) => Ok((p.build)(&operands)),
            // Old ROMs call into COSMAC machine code with 0nnn; those are skipped.
            None if operands.family == 0 => Ok(Instruction::MachineCodeRoutine(operands.nnn)),
            None => Err(Chip8Error::UnknownOpcode { opcode }),
        }
    }
}
