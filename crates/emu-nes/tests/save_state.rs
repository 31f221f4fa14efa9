//! Save-state round trips on a live machine.

use emu_nes::{Nes, NesError};

/// NROM image that renders a backdrop and counts NMIs into $0010.
fn test_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 16 + 32 * 1024 + 8 * 1024];
    rom[0..4].copy_from_slice(b"NES\x1a");
    rom[4] = 2;
    rom[5] = 1;
    let code: &[u8] = &[
        0x78, // SEI
        0xD8, // CLD
        0xA2, 0xFF, // LDX #$FF
        0x9A, // TXS
        0xA9, 0x80, // LDA #$80
        0x8D, 0x00, 0x20, // STA $2000
        0xA9, 0x1E, // LDA #$1E
        0x8D, 0x01, 0x20, // STA $2001
        0x4C, 0x0E, 0x80, // idle: JMP $800E
    ];
    rom[16..16 + code.len()].copy_from_slice(code);
    // NMI handler: INC $10; RTI.
    rom[16 + 0x20..16 + 0x23].copy_from_slice(&[0xE6, 0x10, 0x40]);
    rom[16 + 0x7FFA] = 0x20;
    rom[16 + 0x7FFB] = 0x80;
    rom[16 + 0x7FFC] = 0x00;
    rom[16 + 0x7FFD] = 0x80;
    rom[16 + 0x7FFE] = 0x20;
    rom[16 + 0x7FFF] = 0x80;
    rom
}

#[test]
fn save_load_save_is_byte_identical() {
    let mut nes = Nes::new();
    nes.load_rom(&test_rom()).expect("load");
    for _ in 0..3 {
        nes.run_frame();
    }

    let first = nes.save_state();
    nes.load_state(&first).expect("restore");
    let second = nes.save_state();
    assert_eq!(first, second);
}

#[test]
fn restored_machine_tracks_the_original() {
    let rom = test_rom();

    let mut original = Nes::new();
    original.load_rom(&rom).expect("load");
    for _ in 0..4 {
        original.run_frame();
    }
    let blob = original.save_state();

    let mut restored = Nes::new();
    restored.load_rom(&rom).expect("load");
    restored.load_state(&blob).expect("restore");

    assert_eq!(restored.frame_count(), original.frame_count());
    assert_eq!(restored.cpu().regs, original.cpu().regs);

    // Both machines must evolve identically from here.
    for _ in 0..3 {
        original.run_frame();
        restored.run_frame();
    }
    assert_eq!(original.frame_buffer(), restored.frame_buffer());
    assert_eq!(
        original.bus().peek_ram(0x10),
        restored.bus().peek_ram(0x10),
        "NMI counters stayed in lock-step"
    );
    assert_eq!(original.save_state(), restored.save_state());
}

#[test]
fn foreign_version_is_refused() {
    let mut nes = Nes::new();
    nes.load_rom(&test_rom()).expect("load");
    let blob = nes.save_state();

    // Rewrite the version field. The blob is JSON, so a text substitution
    // of the leading field is reliable.
    let text = String::from_utf8(blob).expect("utf8");
    let tampered = text.replacen("\"version\":1", "\"version\":2", 1);
    assert_ne!(text, tampered, "version field located");
    assert_eq!(
        nes.load_state(tampered.as_bytes()).err(),
        Some(NesError::SaveStateVersionMismatch {
            found: 2,
            expected: 1
        })
    );
}

#[test]
fn corrupt_blobs_are_refused() {
    let mut nes = Nes::new();
    nes.load_rom(&test_rom()).expect("load");
    assert_eq!(
        nes.load_state(b"definitely not json").err(),
        Some(NesError::SaveStateCorrupt)
    );
    assert_eq!(
        nes.load_state(br#"{"version":1,"cpu":{}}"#).err(),
        Some(NesError::SaveStateCorrupt)
    );
}
