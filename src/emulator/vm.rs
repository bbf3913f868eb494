use super::basics::{
    Address, Register, Resolution, Value, KEY_COUNT, LARGE_FONT, LARGE_FONT_HEIGHT,
    LARGE_FONT_OFFSET, MAX_ROM_SIZE, MEMORY_SIZE, PROGRAM_START, REGISTER_COUNT, SMALL_FONT,
    SMALL_FONT_HEIGHT, SMALL_FONT_OFFSET, STACK_DEPTH,
};
use super::display::{Frame, FrameBuffer};
use super::error::Chip8Error;
use super::program::Instruction;
use arrayvec::ArrayVec;
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The guarded state is valid between any two operations, so a panic on the
/// other side of a lock does not make it unusable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Copy, Debug, Default)]
struct Keypad {
    keys: [bool; KEY_COUNT],
    last_key: u8,
    pressed_count: u8,
}

#[derive(Clone, Copy, Debug, Default)]
struct Timers {
    delay: u8,
    sound: u8,
}

/// The part of the machine that other threads may touch while the VM is
/// running: display, keypad and timers, each behind its own lock.
pub struct VMInterface {
    display: Mutex<FrameBuffer>,
    keypad: Mutex<Keypad>,
    timers: Mutex<Timers>,
}

impl VMInterface {
    fn new() -> VMInterface {
        VMInterface {
            display: Mutex::new(FrameBuffer::new(Resolution::Low)),
            keypad: Mutex::new(Keypad::default()),
            timers: Mutex::new(Timers::default()),
        }
    }

    /// Returns the display as row-major 32-bit pixels, all ones for lit and
    /// all zeros for unlit.
    pub fn get_display(&self) -> Vec<u32> {
        lock(&self.display).frame().pixels
    }

    pub fn frame(&self) -> Frame {
        lock(&self.display).frame()
    }

    /// Width and height of the current display mode.
    pub fn display_size(&self) -> (usize, usize) {
        let display = lock(&self.display);
        (display.width(), display.height())
    }

    pub fn press_key(&self, key: u8) {
        if key as usize >= KEY_COUNT {
            warn!("Ignoring press of unknown key {:#04X}.", key);
            return;
        }
        let mut keypad = lock(&self.keypad);
        if !keypad.keys[key as usize] {
            keypad.keys[key as usize] = true;
            keypad.pressed_count += 1;
            keypad.last_key = key;
        }
    }

    pub fn release_key(&self, key: u8) {
        if key as usize >= KEY_COUNT {
            warn!("Ignoring release of unknown key {:#04X}.", key);
            return;
        }
        let mut keypad = lock(&self.keypad);
        if keypad.keys[key as usize] {
            keypad.keys[key as usize] = false;
            keypad.pressed_count -= 1;
        }
    }

    pub fn is_key_down(&self, key: u8) -> bool {
        (key as usize) < KEY_COUNT && lock(&self.keypad).keys[key as usize]
    }

    pub fn pressed_key_count(&self) -> u8 {
        lock(&self.keypad).pressed_count
    }

    /// Counts both timers down by one. Meant to be called at 60Hz.
    pub fn tick(&self) {
        let mut timers = lock(&self.timers);
        timers.delay = timers.delay.saturating_sub(1);
        timers.sound = timers.sound.saturating_sub(1);
    }

    pub fn delay_timer(&self) -> u8 {
        lock(&self.timers).delay
    }

    pub fn sound_timer(&self) -> u8 {
        lock(&self.timers).sound
    }

    /// The key to store for a pending key wait, if any key is held.
    fn waited_key(&self) -> Option<u8> {
        let keypad = lock(&self.keypad);
        if keypad.pressed_count > 0 {
            Some(keypad.last_key)
        } else {
            None
        }
    }
}

/// Holds the logic of a virtual machine in action, including things like the
/// program counter and the memory.
///
/// Registers, stack and memory belong to whichever thread owns the VM. The
/// shared `VMInterface` is what a presentation thread keeps a handle to.
pub struct VirtualMachine {
    program_counter: Address,
    stack: ArrayVec<[Address; STACK_DEPTH]>,
    registers: [u8; REGISTER_COUNT],
    persisted_registers: [u8; REGISTER_COUNT],
    register_i: Address,
    memory: Box<[u8; MEMORY_SIZE]>,
    rng: StdRng,
    interface: Arc<VMInterface>,
}

impl VirtualMachine {
    /// Creates a new VM with the fonts in place and `rom` loaded at 0x200.
    pub fn new(rom: &[u8]) -> Result<VirtualMachine, Chip8Error> {
        VirtualMachine::with_rng(rom, StdRng::from_entropy())
    }

    /// Like `new`, but random numbers come from a seeded generator.
    pub fn with_seed(rom: &[u8], seed: u64) -> Result<VirtualMachine, Chip8Error> {
        VirtualMachine::with_rng(rom, StdRng::seed_from_u64(seed))
    }

    fn with_rng(rom: &[u8], rng: StdRng) -> Result<VirtualMachine, Chip8Error> {
        let mut memory = Box::new([0; MEMORY_SIZE]);
        let small = SMALL_FONT_OFFSET as usize;
        let large = LARGE_FONT_OFFSET as usize;
        memory[small..small + SMALL_FONT.len()].copy_from_slice(&SMALL_FONT);
        memory[large..large + LARGE_FONT.len()].copy_from_slice(&LARGE_FONT);

        let mut vm = VirtualMachine {
            program_counter: Address(PROGRAM_START),
            stack: ArrayVec::new(),
            registers: [0; REGISTER_COUNT],
            persisted_registers: [0; REGISTER_COUNT],
            register_i: Address(0),
            memory,
            rng,
            interface: Arc::new(VMInterface::new()),
        };
        vm.load_rom(rom)?;
        Ok(vm)
    }

    /// Copies a program to 0x200. Memory below that is left alone.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(Chip8Error::RomTooLarge {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            });
        }
        let start = PROGRAM_START as usize;
        self.memory[start..start + rom.len()].copy_from_slice(rom);
        info!("Loaded ROM of {} bytes.", rom.len());
        Ok(())
    }

    pub fn interface(&self) -> Arc<VMInterface> {
        self.interface.clone()
    }

    pub fn program_counter(&self) -> u16 {
        self.program_counter.0
    }

    pub fn register(&self, index: usize) -> u8 {
        self.registers[index]
    }

    pub fn register_i(&self) -> u16 {
        self.register_i.0
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory[..]
    }

    pub fn delay_timer(&self) -> u8 {
        self.interface.delay_timer()
    }

    pub fn sound_timer(&self) -> u8 {
        self.interface.sound_timer()
    }

    pub fn tick(&self) {
        self.interface.tick()
    }

    pub fn press_key(&self, key: u8) {
        self.interface.press_key(key)
    }

    pub fn release_key(&self, key: u8) {
        self.interface.release_key(key)
    }

    pub fn get_display(&self) -> Vec<u32> {
        self.interface.get_display()
    }

    pub fn frame(&self) -> Frame {
        self.interface.frame()
    }

    pub fn display_size(&self) -> (usize, usize) {
        self.interface.display_size()
    }

    /// Fetches, decodes and executes the instruction at the program counter.
    pub fn step(&mut self) -> Result<(), Chip8Error> {
        let bytes = self.memory_slice(self.program_counter.0, 2)?;
        let (a, b) = (bytes[0], bytes[1]);
        trace!("{:04X}: {:02X}{:02X}", self.program_counter.0, a, b);
        self.program_counter.advance();
        let instruction = Instruction::from_16bit(a, b)?;
        self.execute_instruction(&instruction)
    }

    fn memory_slice(&self, start: u16, len: usize) -> Result<&[u8], Chip8Error> {
        let start = start as usize;
        match self.memory.get(start..start + len) {
            Some(slice) => Ok(slice),
            None => Err(Chip8Error::MemoryOutOfBounds {
                address: start.max(MEMORY_SIZE),
            }),
        }
    }

    fn memory_slice_mut(&mut self, start: u16, len: usize) -> Result<&mut [u8], Chip8Error> {
        let start = start as usize;
        match self.memory.get_mut(start..start + len) {
            Some(slice) => Ok(slice),
            None => Err(Chip8Error::MemoryOutOfBounds {
                address: start.max(MEMORY_SIZE),
            }),
        }
    }

    fn set_register(&mut self, reg: Register, value: u8) {
        self.registers[reg.0 as usize] = value;
    }

    fn value(&self, reg: Register) -> u8 {
        self.registers[reg.0 as usize]
    }

    /// Sets the VF register to a given value.
    fn set_vf(&mut self, value: u8) {
        self.registers[0xF] = value;
    }

    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.program_counter.advance();
        }
    }

    /// Returns the control flow from a subroutine.
    fn return_subroutine(&mut self) -> Result<(), Chip8Error> {
        self.program_counter = self.stack.pop().ok_or(Chip8Error::StackUnderflow)?;
        Ok(())
    }

    /// Calls a subroutine. Fails if the stack is full.
    fn call_subroutine(&mut self, addr: Address) -> Result<(), Chip8Error> {
        self.stack
            .try_push(self.program_counter)
            .map_err(|_| Chip8Error::StackOverflow)?;
        self.program_counter = addr;
        Ok(())
    }

    fn key_of(&self, reg: Register) -> Result<u8, Chip8Error> {
        let key = self.value(reg);
        if key as usize >= KEY_COUNT {
            return Err(Chip8Error::InvalidKey { key });
        }
        Ok(key)
    }

    /// `n == 0` draws 16x16 from two bytes per row, otherwise 8 pixels wide
    /// and `n` rows high. Rows clipped at the bottom edge are never read.
    fn draw(&mut self, vx: Register, vy: Register, n: Value) -> Result<(), Chip8Error> {
        let (sprite_width, sprite_height) = if n.0 == 0 { (16, 16) } else { (8, n.0 as usize) };
        let bytes_per_row = sprite_width / 8;
        let (x, y) = (self.value(vx), self.value(vy));

        let mut display = lock(&self.interface.display);
        let visible_rows = sprite_height.min(display.height() - y as usize % display.height());
        let data = self.memory_slice(self.register_i.0, visible_rows * bytes_per_row)?;
        let rows: Vec<u16> = data
            .chunks(bytes_per_row)
            .map(|row| row.iter().fold(0u16, |acc, &byte| acc << 8 | u16::from(byte)))
            .collect();
        let collision = display.draw_sprite(x, y, &rows, sprite_width);
        drop(display);

        self.set_vf(collision as u8);
        Ok(())
    }

    /// Executes a single, already fetched instruction. The program counter
    /// already points past it.
    fn execute_instruction(&mut self, instruction: &Instruction) -> Result<(), Chip8Error> {
        match *instruction {
            // Display
            Instruction::ClearDisplay => lock(&self.interface.display).clear(),
            Instruction::ScrollDown(n) => lock(&self.interface.display).scroll_down(n.0 as usize),
            Instruction::ScrollRight => lock(&self.interface.display).scroll_right(),
            Instruction::ScrollLeft => lock(&self.interface.display).scroll_left(),
            Instruction::LowResolution => lock(&self.interface.display).resize(Resolution::Low),
            Instruction::HighResolution => lock(&self.interface.display).resize(Resolution::High),
            Instruction::Draw(vx, vy, n) => self.draw(vx, vy, n)?,

            // Jumps
            Instruction::MachineCodeRoutine(addr) => {
                debug!("Ignoring machine code routine at {:#05X}.", addr.0)
            }
            Instruction::CallSubroutine(addr) => self.call_subroutine(addr)?,
            Instruction::ReturnSubroutine => self.return_subroutine()?,
            Instruction::Jump(addr) => self.program_counter = addr,
            Instruction::JumpAdd(addr) => {
                self.program_counter = Address(addr.0 + u16::from(self.value(Register(0))));
            }

            // Conditionals
            Instruction::SkipIfEqualConst(vx, n) => self.skip_if(self.value(vx) == n.0),
            Instruction::SkipIfNotEqualConst(vx, n) => self.skip_if(self.value(vx) != n.0),
            Instruction::SkipIfEqual(vx, vy) => self.skip_if(self.value(vx) == self.value(vy)),
            Instruction::SkipIfNotEqual(vx, vy) => self.skip_if(self.value(vx) != self.value(vy)),

            // Register arithmetic
            Instruction::SetConst(vx, n) => self.set_register(vx, n.0),
            Instruction::AddConst(vx, n) => self.set_register(vx, self.value(vx).wrapping_add(n.0)),
            Instruction::Set(vx, vy) => self.set_register(vx, self.value(vy)),
            Instruction::Or(vx, vy) => self.set_register(vx, self.value(vx) | self.value(vy)),
            Instruction::And(vx, vy) => self.set_register(vx, self.value(vx) & self.value(vy)),
            Instruction::Xor(vx, vy) => self.set_register(vx, self.value(vx) ^ self.value(vy)),
            Instruction::Add(vx, vy) => {
                let (result, carry) = self.value(vx).overflowing_add(self.value(vy));
                self.set_vf(carry as u8);
                self.set_register(vx, result);
            }
            Instruction::Sub(vx, vy) => {
                let (result, borrow) = self.value(vx).overflowing_sub(self.value(vy));
                self.set_vf(!borrow as u8);
                self.set_register(vx, result);
            }
            Instruction::NegSub(vx, vy) => {
                let (result, borrow) = self.value(vy).overflowing_sub(self.value(vx));
                self.set_vf(!borrow as u8);
                self.set_register(vx, result);
            }
            Instruction::RightShift(vx) => {
                let value = self.value(vx);
                self.set_vf(value & 0x01);
                self.set_register(vx, value >> 1);
            }
            Instruction::LeftShift(vx) => {
                let value = self.value(vx);
                self.set_vf(value >> 7);
                self.set_register(vx, value << 1);
            }
            Instruction::Rand(vx, n) => {
                let random: u8 = self.rng.gen();
                self.set_register(vx, random & n.0);
            }

            // Keys
            Instruction::SkipIfKey(vx) => {
                let key = self.key_of(vx)?;
                self.skip_if(self.interface.is_key_down(key));
            }
            Instruction::SkipIfNotKey(vx) => {
                let key = self.key_of(vx)?;
                self.skip_if(!self.interface.is_key_down(key));
            }
            Instruction::WaitKey(vx) => match self.interface.waited_key() {
                Some(key) => self.set_register(vx, key),
                None => self.program_counter.rewind(),
            },

            // Timers
            Instruction::GetDelayTimer(vx) => self.set_register(vx, self.interface.delay_timer()),
            Instruction::SetDelayTimer(vx) => {
                let value = self.value(vx);
                lock(&self.interface.timers).delay = value;
            }
            Instruction::SetSoundTimer(vx) => {
                let value = self.value(vx);
                lock(&self.interface.timers).sound = value;
            }

            // I register and memory
            Instruction::SetI(addr) => self.register_i = addr,
            Instruction::AddToI(vx) => {
                let result = self.register_i.0.wrapping_add(u16::from(self.value(vx)));
                if result > 0xFFF {
                    self.set_vf(1);
                }
                self.register_i = Address(result);
            }
            Instruction::SpriteAddr(vx) => {
                let digit = u16::from(self.value(vx));
                self.register_i = Address(SMALL_FONT_OFFSET + digit * SMALL_FONT_HEIGHT);
            }
            Instruction::LargeSpriteAddr(vx) => {
                let digit = u16::from(self.value(vx));
                self.register_i = Address(LARGE_FONT_OFFSET + digit * LARGE_FONT_HEIGHT);
            }
            Instruction::Decimal(vx) => {
                let value = self.value(vx);
                let index = self.register_i.0;
                self.memory_slice_mut(index, 3)?
                    .copy_from_slice(&[value / 100, value / 10 % 10, value % 10]);
            }
            Instruction::StoreRegisters(vx) => {
                let count = vx.0 as usize + 1;
                let registers = self.registers;
                let index = self.register_i.0;
                self.memory_slice_mut(index, count)?
                    .copy_from_slice(&registers[..count]);
            }
            Instruction::LoadRegisters(vx) => {
                let count = vx.0 as usize + 1;
                let mut loaded = [0; REGISTER_COUNT];
                loaded[..count].copy_from_slice(self.memory_slice(self.register_i.0, count)?);
                self.registers[..count].copy_from_slice(&loaded[..count]);
            }
            Instruction::PersistRegisters => self.persisted_registers = self.registers,
            Instruction::RestoreRegisters => self.registers = self.persisted_registers,
        }
        Ok(())
    }
}
