//! Single-instruction state tests in the `SingleStepTests` JSON format.
//!
//! `tests/data/single_step.json` holds a small hand-checked set that always
//! runs. The full Tom Harte suite (1,604 files, 1,000 cases each) runs with
//! `--ignored` when its data is present in `test-data/z80/v1/`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use emu_core::{Bus, Cpu, IoBus};
use serde::Deserialize;
use zilog_z80::Z80;

/// Flat 64KB RAM bus with I/O port support for testing.
struct TestBus {
    ram: Box<[u8]>,
    /// Preloaded port values for IN instructions.
    io_read_values: HashMap<u16, u8>,
}

impl TestBus {
    fn new() -> Self {
        Self {
            ram: vec![0; 0x1_0000].into_boxed_slice(),
            io_read_values: HashMap::new(),
        }
    }

    fn load_ram(&mut self, entries: &[(u16, u8)]) {
        for &(addr, value) in entries {
            self.ram[usize::from(addr)] = value;
        }
    }
}

impl Bus for TestBus {
    fn peek(&self, address: u16) -> u8 {
        self.ram[usize::from(address)]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.ram[usize::from(address)] = value;
    }
}

impl IoBus for TestBus {
    fn read_io(&mut self, port: u16) -> u8 {
        self.io_read_values.get(&port).copied().unwrap_or(0xFF)
    }

    fn write_io(&mut self, _port: u16, _value: u8) {}
}

/// JSON test case format.
#[derive(Deserialize)]
struct TestCase {
    name: String,
    initial: CpuState,
    #[serde(rename = "final")]
    final_state: CpuState,
    cycles: Timing,
    #[serde(default)]
    ports: Vec<(u16, u8, String)>,
}

/// Either a bare T-state count or a per-cycle bus trace.
#[derive(Deserialize)]
#[serde(untagged)]
enum Timing {
    States(u32),
    Trace(Vec<serde_json::Value>),
}

impl Timing {
    fn states(&self) -> u32 {
        match self {
            Self::States(n) => *n,
            Self::Trace(trace) => trace.len() as u32,
        }
    }
}

/// JSON CPU state format. The `ei` latch is not modelled and is ignored
/// when present; `wz`, `p` and `q` are only checked when the case gives them.
#[derive(Deserialize, Default)]
#[serde(default)]
struct CpuState {
    pc: u16,
    sp: u16,
    a: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    f: u8,
    h: u8,
    l: u8,
    i: u8,
    r: u8,
    ix: u16,
    iy: u16,
    wz: Option<u16>,
    /// Flags written by the last instruction.
    q: Option<u8>,
    /// Last instruction was LD A,I or LD A,R.
    p: Option<u8>,
    #[serde(rename = "af_")]
    af_alt: u16,
    #[serde(rename = "bc_")]
    bc_alt: u16,
    #[serde(rename = "de_")]
    de_alt: u16,
    #[serde(rename = "hl_")]
    hl_alt: u16,
    iff1: u8,
    iff2: u8,
    im: u8,
    ram: Vec<(u16, u8)>,
}

/// Set up the CPU and bus from the initial test state.
fn setup(cpu: &mut Z80, bus: &mut TestBus, state: &CpuState, ports: &[(u16, u8, String)]) {
    bus.load_ram(&state.ram);

    bus.io_read_values.clear();
    for (port, value, dir) in ports {
        if dir == "r" {
            bus.io_read_values.insert(*port, *value);
        }
    }

    let regs = cpu.regs_mut();
    regs.a = state.a;
    regs.f = state.f;
    regs.b = state.b;
    regs.c = state.c;
    regs.d = state.d;
    regs.e = state.e;
    regs.h = state.h;
    regs.l = state.l;

    // Alternate registers (stored as 16-bit pairs)
    [regs.f_alt, regs.a_alt] = state.af_alt.to_le_bytes();
    [regs.c_alt, regs.b_alt] = state.bc_alt.to_le_bytes();
    [regs.e_alt, regs.d_alt] = state.de_alt.to_le_bytes();
    [regs.l_alt, regs.h_alt] = state.hl_alt.to_le_bytes();

    regs.ix = state.ix;
    regs.iy = state.iy;
    regs.i = state.i;
    regs.r = state.r;
    regs.wz = state.wz.unwrap_or(0);
    regs.q = state.q.unwrap_or(0);
    regs.last_was_ld_a_ir = state.p.is_some_and(|p| p != 0);

    regs.iff1 = state.iff1 != 0;
    regs.iff2 = state.iff2 != 0;
    regs.im = state.im;

    cpu.set_sp(state.sp);
    cpu.set_pc(state.pc);
}

/// Compare the CPU/bus state against expected, returning a list of mismatches.
fn compare(cpu: &Z80, bus: &TestBus, expected: &CpuState) -> Vec<String> {
    let mut errors = Vec::new();
    let regs = cpu.registers();

    check_u8(&mut errors, "A", regs.a, expected.a);
    check_u8(&mut errors, "F", regs.f, expected.f);
    check_u8(&mut errors, "B", regs.b, expected.b);
    check_u8(&mut errors, "C", regs.c, expected.c);
    check_u8(&mut errors, "D", regs.d, expected.d);
    check_u8(&mut errors, "E", regs.e, expected.e);
    check_u8(&mut errors, "H", regs.h, expected.h);
    check_u8(&mut errors, "L", regs.l, expected.l);

    let pair = |hi: u8, lo: u8| u16::from_le_bytes([lo, hi]);
    check_u16(&mut errors, "AF'", pair(regs.a_alt, regs.f_alt), expected.af_alt);
    check_u16(&mut errors, "BC'", pair(regs.b_alt, regs.c_alt), expected.bc_alt);
    check_u16(&mut errors, "DE'", pair(regs.d_alt, regs.e_alt), expected.de_alt);
    check_u16(&mut errors, "HL'", pair(regs.h_alt, regs.l_alt), expected.hl_alt);

    check_u16(&mut errors, "IX", regs.ix, expected.ix);
    check_u16(&mut errors, "IY", regs.iy, expected.iy);
    check_u16(&mut errors, "SP", regs.sp, expected.sp);
    check_u16(&mut errors, "PC", regs.pc, expected.pc);
    check_u8(&mut errors, "I", regs.i, expected.i);
    check_u8(&mut errors, "R", regs.r, expected.r);
    if let Some(wz) = expected.wz {
        check_u16(&mut errors, "WZ", regs.wz, wz);
    }
    if let Some(q) = expected.q {
        check_u8(&mut errors, "Q", regs.q, q);
    }
    if let Some(p) = expected.p {
        check_u8(&mut errors, "P", u8::from(regs.last_was_ld_a_ir), p);
    }

    check_u8(&mut errors, "IFF1", u8::from(regs.iff1), expected.iff1);
    check_u8(&mut errors, "IFF2", u8::from(regs.iff2), expected.iff2);
    check_u8(&mut errors, "IM", regs.im, expected.im);

    for &(addr, expected_val) in &expected.ram {
        let actual_val = bus.peek(addr);
        if actual_val != expected_val {
            errors.push(format!(
                "RAM[${addr:04X}]: got ${actual_val:02X}, want ${expected_val:02X}"
            ));
        }
    }

    errors
}

fn check_u8(errors: &mut Vec<String>, name: &str, actual: u8, expected: u8) {
    if actual != expected {
        errors.push(format!("{name}: got ${actual:02X}, want ${expected:02X}"));
    }
}

fn check_u16(errors: &mut Vec<String>, name: &str, actual: u16, expected: u16) {
    if actual != expected {
        errors.push(format!("{name}: got ${actual:04X}, want ${expected:04X}"));
    }
}

/// Run one case; returns mismatches, including a wrong cycle count.
fn run_case(test: &TestCase) -> Vec<String> {
    let mut cpu = Z80::new();
    let mut bus = TestBus::new();
    setup(&mut cpu, &mut bus, &test.initial, &test.ports);

    let cycles = cpu.step(&mut bus);

    let mut errors = compare(&cpu, &bus, &test.final_state);
    let expected = test.cycles.states();
    if cycles != expected {
        errors.push(format!("cycles: got {cycles}, want {expected}"));
    }
    errors
}

#[test]
fn bundled_vectors() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/single_step.json");
    let data = fs::read_to_string(&path).expect("bundled vectors exist");
    let tests: Vec<TestCase> = serde_json::from_str(&data).expect("bundled vectors parse");
    assert!(!tests.is_empty());

    let failures: Vec<String> = tests
        .iter()
        .filter_map(|test| {
            let errors = run_case(test);
            (!errors.is_empty()).then(|| format!("[{}]: {}", test.name, errors.join(", ")))
        })
        .collect();
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

/// Run all Z80 `SingleStepTests`.
///
/// Iterates through all 1,604 test files covering unprefixed, CB, DD, ED,
/// FD, DDCB and FDCB opcodes.
#[test]
#[ignore = "requires test-data/z80; run with --ignored"]
fn run_all() {
    let test_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("parent of crate dir")
        .parent()
        .expect("workspace root")
        .join("test-data/z80/v1");

    if !test_dir.exists() {
        eprintln!("Test data not found at {}", test_dir.display());
        eprintln!("Skipping SingleStepTests.");
        return;
    }

    let mut filenames: Vec<String> = Vec::new();
    for opcode in 0..=0xFFu8 {
        if !matches!(opcode, 0xCB | 0xDD | 0xED | 0xFD) {
            filenames.push(format!("{opcode:02x}.json"));
        }
    }
    for prefix in ["cb", "dd", "ed", "fd", "dd cb __", "fd cb __"] {
        for opcode in 0..=0xFFu8 {
            filenames.push(format!("{prefix} {opcode:02x}.json"));
        }
    }

    let mut total_pass = 0u64;
    let mut total_fail = 0u64;

    for filename in &filenames {
        let path = test_dir.join(filename);
        if !path.exists() {
            continue;
        }

        let data = fs::read_to_string(&path).unwrap_or_else(|e| {
            panic!("Failed to read {}: {e}", path.display());
        });
        let tests: Vec<TestCase> = serde_json::from_str(&data).unwrap_or_else(|e| {
            panic!("Failed to parse {}: {e}", path.display());
        });

        let mut file_fail = 0u32;
        let mut first_failures: Vec<String> = Vec::new();
        for test in &tests {
            let errors = run_case(test);
            if errors.is_empty() {
                total_pass += 1;
            } else {
                file_fail += 1;
                if first_failures.len() < 5 {
                    first_failures.push(format!("  FAIL [{}]: {}", test.name, errors.join(", ")));
                }
            }
        }

        let status = if file_fail == 0 { "PASS" } else { "FAIL" };
        println!("{filename}: {status} ({} of {} failed)", file_fail, tests.len());
        for msg in &first_failures {
            println!("{msg}");
        }
        total_fail += u64::from(file_fail);
    }

    println!();
    println!("=== Z80 SingleStepTests Summary ===");
    println!("Pass: {total_pass}, Fail: {total_fail}");

    assert_eq!(total_fail, 0, "{total_fail} tests failed");
}
