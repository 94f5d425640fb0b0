//! Programs run end to end on the Spectrum memory model.

use emu_core::{Bus, Cpu, IoBus};
use spectrum_memory::Memory;
use zilog_z80::{CF, HF, NF, PF, SF, Z80, ZF};

const ORIGIN: u16 = 0x8000;

fn machine(program: &[u8]) -> (Z80, Memory) {
    let mut memory = Memory::default();
    for (offset, &byte) in (0u16..).zip(program) {
        memory.write(ORIGIN + offset, byte);
    }
    let mut cpu = Z80::new();
    cpu.set_pc(ORIGIN);
    cpu.set_sp(0xFF00);
    (cpu, memory)
}

/// Step until PC leaves `[ORIGIN, end)`, returning steps and T-states.
fn run_until(cpu: &mut Z80, bus: &mut impl IoBus, end: u16) -> (u32, u32) {
    let (mut steps, mut cycles) = (0, 0);
    while (ORIGIN..end).contains(&cpu.pc()) {
        cycles += cpu.step(bus);
        steps += 1;
        assert!(steps < 10_000, "runaway program at {:#06X}", cpu.pc());
    }
    (steps, cycles)
}

#[test]
fn load_index_register() {
    let (mut cpu, mut memory) = machine(&[0xDD, 0x21, 0x34, 0x12]);
    cpu.regs_mut().r = 0;

    assert_eq!(cpu.step(&mut memory), 14);
    assert_eq!(cpu.registers().ix, 0x1234);
    assert_eq!(cpu.pc(), ORIGIN + 4);
    assert_eq!(cpu.registers().r, 2);
}

#[test]
fn bit_test_through_index() {
    let (mut cpu, mut memory) = machine(&[
        0xDD, 0x21, 0x00, 0x90, // LD IX,$9000
        0xDD, 0xCB, 0x06, 0x46, // BIT 0,(IX+6)
        0xDD, 0xCB, 0x06, 0x4E, // BIT 1,(IX+6)
    ]);
    memory.write(0x9006, 0x01);

    cpu.step(&mut memory);
    assert_eq!(cpu.step(&mut memory), 20);
    let f = cpu.registers().f;
    assert_eq!(f & ZF, 0);
    assert_eq!(f & HF, HF);
    assert_eq!(f & NF, 0);

    cpu.step(&mut memory);
    assert_eq!(cpu.registers().f & ZF, ZF);
    assert_eq!(cpu.registers().wz, 0x9006);
    assert_eq!(memory.peek(0x9006), 0x01, "BIT must not write");
}

#[test]
fn djnz_loop_timing() {
    let (mut cpu, mut memory) = machine(&[
        0x06, 0x03, // LD B,3
        0x10, 0xFE, // DJNZ $-0
    ]);
    let (steps, cycles) = run_until(&mut cpu, &mut memory, ORIGIN + 4);
    assert_eq!(steps, 4);
    assert_eq!(cycles, 7 + 13 + 13 + 8);
    assert_eq!(cpu.registers().b, 0);
    assert_eq!(cpu.total_ticks().get(), u64::from(cycles));
}

#[test]
fn call_and_return() {
    let (mut cpu, mut memory) = machine(&[0xCD, 0x00, 0x90]);
    memory.write(0x9000, 0xC9);

    assert_eq!(cpu.step(&mut memory), 17);
    assert_eq!(cpu.pc(), 0x9000);
    assert_eq!(cpu.registers().sp, 0xFEFE);
    assert_eq!(memory.peek_word(0xFEFE), ORIGIN + 3);

    assert_eq!(cpu.step(&mut memory), 10);
    assert_eq!(cpu.pc(), ORIGIN + 3);
    assert_eq!(cpu.registers().sp, 0xFF00);
}

#[test]
fn conditional_call_not_taken() {
    // XOR A sets Z, so CALL NZ falls through.
    let (mut cpu, mut memory) = machine(&[0xAF, 0xC4, 0x00, 0x90]);
    cpu.step(&mut memory);
    assert_eq!(cpu.step(&mut memory), 10);
    assert_eq!(cpu.pc(), ORIGIN + 4);
    assert_eq!(cpu.registers().sp, 0xFF00);
}

#[test]
fn push_pop_moves_a_pair() {
    let (mut cpu, mut memory) = machine(&[
        0x01, 0x34, 0x12, // LD BC,$1234
        0xC5, // PUSH BC
        0xD1, // POP DE
    ]);
    cpu.step(&mut memory);
    assert_eq!(cpu.step(&mut memory), 11);
    assert_eq!(memory.peek(0xFEFF), 0x12);
    assert_eq!(memory.peek(0xFEFE), 0x34);
    assert_eq!(cpu.step(&mut memory), 10);
    assert_eq!(cpu.registers().de(), 0x1234);
    assert_eq!(cpu.registers().sp, 0xFF00);
}

#[test]
fn ldir_copies_a_block() {
    let (mut cpu, mut memory) = machine(&[
        0x21, 0x00, 0xA0, // LD HL,$A000
        0x11, 0x00, 0xB0, // LD DE,$B000
        0x01, 0x04, 0x00, // LD BC,4
        0xED, 0xB0, // LDIR
    ]);
    for (offset, byte) in (0u16..).zip([0xDE, 0xAD, 0xBE, 0xEF]) {
        memory.write(0xA000 + offset, byte);
    }
    for _ in 0..3 {
        cpu.step(&mut memory);
    }

    let mut steps = 0;
    let mut cycles = 0;
    while cpu.pc() == ORIGIN + 9 {
        cycles += cpu.step(&mut memory);
        steps += 1;
    }
    assert_eq!(steps, 4);
    assert_eq!(cycles, 21 * 3 + 16);
    assert_eq!(memory.hex_string(0xB000, 4, false), "DEADBEEF");
    let regs = cpu.registers();
    assert_eq!(regs.bc(), 0);
    assert_eq!(regs.hl(), 0xA004);
    assert_eq!(regs.de(), 0xB004);
    assert_eq!(regs.f & PF, 0);
    assert_eq!(cpu.pc(), ORIGIN + 11);
}

#[test]
fn cpir_stops_on_match() {
    let (mut cpu, mut memory) = machine(&[
        0x21, 0x00, 0xA0, // LD HL,$A000
        0x01, 0x04, 0x00, // LD BC,4
        0x3E, 0x03, // LD A,3
        0xED, 0xB1, // CPIR
    ]);
    for (offset, byte) in (0u16..).zip([1, 2, 3, 4]) {
        memory.write(0xA000 + offset, byte);
    }
    let (steps, cycles) = run_until(&mut cpu, &mut memory, ORIGIN + 10);
    assert_eq!(steps, 3 + 3);
    assert_eq!(cycles, 10 + 10 + 7 + 21 + 21 + 16);
    let regs = cpu.registers();
    assert_eq!(regs.hl(), 0xA003);
    assert_eq!(regs.bc(), 1);
    assert_eq!(regs.f & ZF, ZF);
    assert_eq!(regs.f & PF, PF);
    assert_eq!(regs.f & NF, NF);
}

#[test]
fn rom_writes_are_ignored_and_screen_writes_are_seen() {
    let mut memory = Memory::default();
    memory
        .load_image(&[
            0x3E, 0x42, // LD A,$42
            0x32, 0x00, 0x00, // LD ($0000),A
            0x32, 0x00, 0x40, // LD ($4000),A
        ])
        .expect("image fits");
    memory.set_video_memory_changed(false);
    let mut cpu = Z80::new();

    cpu.step(&mut memory);
    assert_eq!(cpu.step(&mut memory), 13);
    assert_eq!(memory.peek(0x0000), 0x3E);
    assert!(!memory.video_memory_changed());

    cpu.step(&mut memory);
    assert_eq!(memory.peek(0x4000), 0x42);
    assert!(memory.video_memory_changed());
}

#[test]
fn indexed_rotate_copies_into_register() {
    let (mut cpu, mut memory) = machine(&[
        0xDD, 0x21, 0x00, 0x90, // LD IX,$9000
        0xDD, 0xCB, 0x01, 0x00, // RLC (IX+1),B
    ]);
    memory.write(0x9001, 0x81);
    cpu.step(&mut memory);
    assert_eq!(cpu.step(&mut memory), 23);
    assert_eq!(memory.peek(0x9001), 0x03);
    assert_eq!(cpu.registers().b, 0x03);
    assert_eq!(cpu.registers().f & CF, CF);
}

#[test]
fn exchanges_swap_register_banks() {
    let (mut cpu, mut memory) = machine(&[
        0x01, 0x34, 0x12, // LD BC,$1234
        0xD9, // EXX
        0x08, // EX AF,AF'
    ]);
    cpu.regs_mut().a_alt = 0x55;
    for _ in 0..3 {
        cpu.step(&mut memory);
    }
    let regs = cpu.registers();
    assert_eq!(regs.bc(), 0);
    assert_eq!((regs.b_alt, regs.c_alt), (0x12, 0x34));
    assert_eq!(regs.a, 0x55);
    assert_eq!(regs.a_alt, 0xFF);
}

#[test]
fn refresh_register_counts_fetches() {
    let (mut cpu, mut memory) = machine(&[
        0x00, // NOP
        0xED, 0x5F, // LD A,R
    ]);
    cpu.regs_mut().r = 0x80;
    cpu.step(&mut memory);
    assert_eq!(cpu.step(&mut memory), 9);
    assert_eq!(cpu.registers().a, 0x83, "bit 7 of R survives refresh");
    assert_eq!(cpu.registers().f & PF, 0, "IFF2 clear");
    assert_eq!(cpu.registers().f & SF, SF);
}

#[test]
fn sixteen_bit_subtract_with_borrow() {
    let (mut cpu, mut memory) = machine(&[
        0x21, 0x00, 0x10, // LD HL,$1000
        0x11, 0x01, 0x00, // LD DE,1
        0x37, // SCF
        0xED, 0x52, // SBC HL,DE
    ]);
    for _ in 0..3 {
        cpu.step(&mut memory);
    }
    assert_eq!(cpu.step(&mut memory), 15);
    let regs = cpu.registers();
    assert_eq!(regs.hl(), 0x0FFE);
    assert_eq!(regs.f & (NF | HF | CF | ZF), NF | HF);
}

#[test]
fn negate_overflow() {
    let (mut cpu, mut memory) = machine(&[0x3E, 0x80, 0xED, 0x44]);
    cpu.step(&mut memory);
    assert_eq!(cpu.step(&mut memory), 8);
    assert_eq!(cpu.registers().a, 0x80);
    assert_eq!(cpu.registers().f & (PF | CF | NF), PF | CF | NF);
}

/// Memory plus a scripted I/O port.
struct Ports {
    memory: Memory,
    input: u8,
    reads: Vec<u16>,
    writes: Vec<(u16, u8)>,
}

impl Bus for Ports {
    fn peek(&self, address: u16) -> u8 {
        self.memory.peek(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory.write(address, value);
    }
}

impl IoBus for Ports {
    fn read_io(&mut self, port: u16) -> u8 {
        self.reads.push(port);
        self.input
    }

    fn write_io(&mut self, port: u16, value: u8) {
        self.writes.push((port, value));
    }
}

#[test]
fn port_input_and_output() {
    let (mut cpu, memory) = machine(&[
        0x3E, 0x12, // LD A,$12
        0xD3, 0xFE, // OUT ($FE),A
        0xDB, 0xFE, // IN A,($FE)
        0x01, 0xFE, 0x7F, // LD BC,$7FFE
        0xED, 0x78, // IN A,(C)
        0xED, 0x41, // OUT (C),B
    ]);
    let mut bus = Ports {
        memory,
        input: 0x00,
        reads: Vec::new(),
        writes: Vec::new(),
    };

    cpu.step(&mut bus);
    assert_eq!(cpu.step(&mut bus), 11);
    assert_eq!(bus.writes, [(0x12FE, 0x12)]);

    assert_eq!(cpu.step(&mut bus), 11);
    assert_eq!(bus.reads, [0x12FE]);
    assert_eq!(cpu.registers().a, 0x00);

    bus.input = 0xBF;
    cpu.step(&mut bus);
    assert_eq!(cpu.step(&mut bus), 12);
    assert_eq!(bus.reads[1], 0x7FFE);
    assert_eq!(cpu.registers().a, 0xBF);
    assert_eq!(cpu.registers().f & (SF | ZF), SF);

    cpu.step(&mut bus);
    assert_eq!(bus.writes[1], (0x7FFE, 0x7F));
}

#[test]
fn interrupt_waits_one_instruction_after_ei() {
    let (mut cpu, mut memory) = machine(&[
        0xED, 0x56, // IM 1
        0xFB, // EI
        0x76, // HALT
    ]);
    cpu.step(&mut memory);
    cpu.step(&mut memory);
    assert!(!cpu.interrupt(&mut memory));

    cpu.step(&mut memory);
    assert!(cpu.is_halted());
    assert_eq!(cpu.pc(), ORIGIN + 4);
    assert_eq!(cpu.step(&mut memory), 4);

    assert!(cpu.interrupt(&mut memory));
    assert!(!cpu.is_halted());
    assert_eq!(cpu.pc(), 0x0038);
    assert_eq!(memory.peek_word(cpu.registers().sp), ORIGIN + 4);
    assert!(!cpu.registers().iff1);
}
