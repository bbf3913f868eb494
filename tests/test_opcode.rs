extern crate superchip8;
use superchip8::emulator::{ascii_display, basics::SMALL_FONT, vm::VirtualMachine};

fn load_rom(program: &[u16]) -> VirtualMachine {
    let raw_rom: Vec<u8> = program.iter().flat_map(|op| op.to_be_bytes()).collect();
    VirtualMachine::new(&raw_rom).unwrap()
}

/// Steps until the program spins on a jump to itself.
fn run_until_loop(vm: &mut VirtualMachine) {
    loop {
        let pc = vm.program_counter();
        vm.step().unwrap();
        if vm.program_counter() == pc {
            break;
        }
    }
}

/// The top-left `width` x `height` corner of the display, trailing blanks removed.
fn corner(vm: &VirtualMachine, width: usize, height: usize) -> Vec<String> {
    ascii_display::render(&vm.frame())
        .lines()
        .take(height)
        .map(|line| line.chars().take(width).collect::<String>().trim_end().to_string())
        .collect()
}

fn lit_count(vm: &VirtualMachine) -> usize {
    vm.get_display().iter().filter(|p| **p == 0xFFFF_FFFF).count()
}

#[test]
fn test_clear_and_add() {
    let mut vm = load_rom(&[0x00E0, 0x6005, 0x7003]);
    for _ in 0..3 {
        vm.step().unwrap();
    }
    assert_eq!(vm.register(0), 8);
    assert_eq!(vm.program_counter(), 0x206);
    let display = vm.get_display();
    assert_eq!(display.len(), 64 * 32);
    assert!(display.iter().all(|p| *p == 0));
}

#[test]
fn test_clear_after_draw() {
    let mut vm = load_rom(&[0xA000, 0xD005, 0x00E0, 0x1206]);
    vm.step().unwrap();
    vm.step().unwrap();
    assert_eq!(lit_count(&vm), 14);
    run_until_loop(&mut vm);
    let display = vm.get_display();
    assert_eq!(display.len(), 64 * 32);
    assert!(display.iter().all(|p| *p == 0));
}

#[test]
fn test_draw_zero_glyph() {
    let mut vm = load_rom(&[0xA000, 0xD005]);
    vm.step().unwrap();
    vm.step().unwrap();
    assert_eq!(vm.register(0xF), 0);
    assert_eq!(
        corner(&vm, 8, 6),
        vec!["@@@@", "@  @", "@  @", "@  @", "@@@@", ""]
    );
}

#[test]
fn test_draw_two_digits() {
    let mut vm = load_rom(&[
        0x00E0, // clear
        0x6000, // V0 = digit 0
        0x6100, // V1 = x
        0x6200, // V2 = y
        0xF029, // I = glyph of V0
        0xD125, // draw at (V1, V2)
        0x7001, // next digit
        0x7105, // move right
        0xF029, 0xD125, // draw again
        0x1214, // spin
    ]);
    run_until_loop(&mut vm);
    assert_eq!(vm.register(0xF), 0);
    assert_eq!(
        corner(&vm, 12, 5),
        vec![
            "@@@@   @",
            "@  @  @@",
            "@  @   @",
            "@  @   @",
            "@@@@  @@@",
        ]
    );
}

#[test]
fn test_draw_twice_restores_display() {
    let mut vm = load_rom(&[0x6103, 0xA00A, 0xD115, 0xD115, 0x1208]);
    run_until_loop(&mut vm);
    assert_eq!(vm.register(0xF), 1);
    assert_eq!(lit_count(&vm), 0);
}

#[test]
fn test_sprite_clipped_at_corner() {
    // V1 = 60, V2 = 30, '0' glyph: only two rows and four columns fit.
    let mut vm = load_rom(&[0x613C, 0x621E, 0xA000, 0xD125, 0x1208]);
    run_until_loop(&mut vm);
    let frame = vm.frame();
    assert_eq!(lit_count(&vm), 6);
    assert!(frame.is_lit(60, 30) && frame.is_lit(63, 30));
    assert!(frame.is_lit(60, 31) && !frame.is_lit(61, 31) && frame.is_lit(63, 31));
    assert!(!frame.is_lit(0, 0));
}

#[test]
fn test_sprite_origin_wraps() {
    // x = 66 wraps to 2, y = 33 wraps to 1
    let mut vm = load_rom(&[0x6142, 0x6221, 0xA000, 0xD121, 0x1208]);
    run_until_loop(&mut vm);
    assert_eq!(corner(&vm, 8, 2), vec!["", "  @@@@"]);
}

#[test]
fn test_hires_large_font_and_scroll() {
    let mut vm = load_rom(&[
        0x00FF, // 128x64
        0x6000, // digit 0
        0xF030, // I = large glyph of V0
        0x6110, // V1 = 16
        0xD11A, // draw 8x10 at (16, 16)
        0x00C2, // scroll down 2
        0x00FB, // scroll right 4
        0x120E, // spin
    ]);
    run_until_loop(&mut vm);
    let frame = vm.frame();
    assert_eq!((frame.width, frame.height), (128, 64));
    assert_eq!(lit_count(&vm), 24);
    assert!(!frame.is_lit(20, 18));
    assert!((21..=25).all(|x| frame.is_lit(x, 18)));
    assert!(frame.is_lit(20, 19) && frame.is_lit(26, 19));
    assert!((21..=25).all(|x| frame.is_lit(x, 26)));
}

#[test]
fn test_wide_sprite() {
    // Dxy0 draws 16x16 from two bytes per row, here the start of the small font.
    let mut vm = load_rom(&[0x00FF, 0xA000, 0xD000, 0x1206]);
    run_until_loop(&mut vm);
    let expected: u32 = SMALL_FONT[..32].iter().map(|b| b.count_ones()).sum();
    assert_eq!(lit_count(&vm), expected as usize);
    assert_eq!(vm.register(0xF), 0);
    // 0xF0 0x90 side by side
    assert_eq!(corner(&vm, 16, 1), vec!["@@@@    @  @"]);
}

#[test]
fn test_back_to_low_resolution() {
    let mut vm = load_rom(&[0x00FF, 0xA000, 0xD005, 0x00FE, 0x1208]);
    run_until_loop(&mut vm);
    assert_eq!(vm.display_size(), (64, 32));
    assert_eq!(lit_count(&vm), 0);
}

#[test]
fn test_subroutine_with_bcd() {
    let mut vm = load_rom(&[
        0x6A7B, // VA = 123
        0xA300, // I = 0x300
        0x2210, // call 0x210
        0xF265, // V0..V2 = memory[I..]
        0x1208, // spin
        0x0000, 0x0000, 0x0000, // padding up to 0x210
        0xFA33, // BCD of VA
        0x00EE, // return
    ]);
    run_until_loop(&mut vm);
    assert_eq!(vm.register(0), 1);
    assert_eq!(vm.register(1), 2);
    assert_eq!(vm.register(2), 3);
    assert_eq!(vm.stack_depth(), 0);
}

#[test]
fn test_key_wait_keeps_timers_running() {
    let mut vm = load_rom(&[0x6A05, 0xFA15, 0xF30A, 0xFB07, 0x1208]);
    let interface = vm.interface();
    vm.step().unwrap();
    vm.step().unwrap();
    for _ in 0..4 {
        vm.step().unwrap();
        interface.tick();
        assert_eq!(vm.program_counter(), 0x204);
    }
    interface.press_key(0x9);
    interface.press_key(0x9);
    run_until_loop(&mut vm);
    assert_eq!(vm.register(3), 0x9);
    assert_eq!(vm.register(0xB), 1);
    interface.release_key(0x9);
    assert_eq!(interface.pressed_key_count(), 0);
}

#[test]
fn test_last_pressed_key_wins() {
    let mut vm = load_rom(&[0xF30A, 0x1202]);
    vm.press_key(0x2);
    vm.press_key(0xE);
    run_until_loop(&mut vm);
    assert_eq!(vm.register(3), 0xE);
}
