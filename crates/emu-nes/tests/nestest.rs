//! CPU conformance against the public nestest golden log.
//!
//! Drives the CPU through the NES bus one instruction at a time with the
//! PPU idle (nestest's $C000 automation entry point does not depend on
//! it) and compares every register tuple against the published trace.

use std::path::PathBuf;

use emu_nes::{Cartridge, NesBus};
use mos_6502::Mos6502;

fn test_rom_path(name: &str) -> Option<PathBuf> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../test-roms")
        .join(name);
    path.exists().then_some(path)
}

/// Extract a two-digit hex field like `A:xx` from a trace line.
fn hex_field(line: &str, tag: &str) -> u8 {
    let start = line.find(tag).map(|p| p + tag.len()).expect("field tag");
    u8::from_str_radix(&line[start..start + 2], 16).expect("hex field")
}

/// Extract the trailing `CYC:` counter.
fn cycle_field(line: &str) -> u64 {
    let start = line.find("CYC:").map(|p| p + 4).expect("CYC tag");
    line[start..].trim().parse().expect("cycle count")
}

#[test]
#[ignore] // Requires test-roms/nestest.nes and test-roms/nestest.log
fn nestest_trace_matches_golden_log() {
    let (rom_path, log_path) = match (test_rom_path("nestest.nes"), test_rom_path("nestest.log")) {
        (Some(rom), Some(log)) => (rom, log),
        _ => {
            eprintln!("Skipping: put nestest.nes and nestest.log under test-roms/");
            return;
        }
    };

    let rom = std::fs::read(rom_path).expect("read ROM");
    let log = std::fs::read_to_string(log_path).expect("read log");

    let cart = Cartridge::from_ines(&rom).expect("parse ROM");
    let mut bus = NesBus::new(cart);
    let mut cpu = Mos6502::new();
    cpu.reset(&mut bus);

    // The automation entry point: run headless from $C000.
    cpu.regs.pc = 0xC000;

    // The log's cycle column starts at 7 (the reset sequence); compare
    // deltas against our own baseline instead of absolute counts.
    let mut baseline: Option<(u64, u64)> = None;

    for (index, line) in log.lines().take(8991).enumerate() {
        let line_no = index + 1;
        let expected_pc = u16::from_str_radix(&line[0..4], 16).expect("PC field");

        assert_eq!(
            cpu.regs.pc, expected_pc,
            "PC diverged at line {line_no}: {line}"
        );
        assert_eq!(cpu.regs.a, hex_field(line, "A:"), "A at line {line_no}");
        assert_eq!(cpu.regs.x, hex_field(line, "X:"), "X at line {line_no}");
        assert_eq!(cpu.regs.y, hex_field(line, "Y:"), "Y at line {line_no}");
        assert_eq!(cpu.regs.p.0, hex_field(line, "P:"), "P at line {line_no}");
        assert_eq!(cpu.regs.s, hex_field(line, "SP:"), "SP at line {line_no}");

        let expected_cyc = cycle_field(line);
        match baseline {
            None => baseline = Some((expected_cyc, cpu.total_cycles())),
            Some((cyc0, ours0)) => {
                assert_eq!(
                    cpu.total_cycles() - ours0,
                    expected_cyc - cyc0,
                    "cycle count diverged at line {line_no}: {line}"
                );
            }
        }

        cpu.step(&mut bus);
    }

    // nestest reports failures in $02/$03; zero means every opcode test
    // passed.
    assert_eq!(bus.peek_ram(0x02), 0, "nestest official-opcode result");
    assert_eq!(bus.peek_ram(0x03), 0, "nestest unofficial-opcode result");
}
