//! Scanning loaded images from their exports and entry point.

mod common;

use common::{PeFileBuilder, TEXT_CHARACTERISTICS};
use pedis::{load_image, run_scan, IcedDecoder, InstrFlags, ScanWarning};

#[test]
fn entry_point_reaches_whole_program() {
    let bytes = common::small_exe().build();
    let image = load_image(&bytes).unwrap();
    let decoder = IcedDecoder::new(image.bitness());
    let outcome = run_scan(&image, &bytes, &decoder);

    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    let flags = outcome.code_map.section(0);
    assert!(flags.iter().all(|f| f.contains(InstrFlags::SCANNED)));
    assert_eq!(outcome.code_map.instruction_count(0), 7);
    assert!(outcome
        .code_map
        .flags_at(&image, 0x100a)
        .unwrap()
        .contains(InstrFlags::FUNC));
}

#[test]
fn dll_is_scanned_from_exports_only() {
    // 0: ret (exported); 1: ret (entry point)
    let bytes = PeFileBuilder::pe32()
        .dll()
        .entry_point(0x1001)
        .section(".text", 0x1000, TEXT_CHARACTERISTICS, &[0xc3, 0xc3])
        .exports(0x2000, "lib.dll", &[("Exported", 0x1000)])
        .build();
    let image = load_image(&bytes).unwrap();
    let decoder = IcedDecoder::new(image.bitness());
    let outcome = run_scan(&image, &bytes, &decoder);
    let flags = outcome.code_map.section(0);
    assert!(flags[0].contains(InstrFlags::VALID));
    assert!(!flags[1].contains(InstrFlags::SCANNED));
}

#[test]
fn entry_point_outside_sections_warns() {
    let bytes = PeFileBuilder::pe32()
        .entry_point(0x9000)
        .section(".text", 0x1000, TEXT_CHARACTERISTICS, &[0xc3])
        .build();
    let image = load_image(&bytes).unwrap();
    let decoder = IcedDecoder::new(image.bitness());
    let outcome = run_scan(&image, &bytes, &decoder);
    assert_eq!(outcome.warnings, vec![ScanWarning::Unmapped { address: 0x9000 }]);
    assert_eq!(outcome.instructions, 0);
}

#[test]
fn code_beyond_virtual_size_is_not_scanned() {
    // Virtual size 3 cuts the `mov eax, imm32` short; its bytes past the
    // allocation are never marked.
    let bytes = PeFileBuilder::pe32()
        .entry_point(0x1002)
        .section_sized(".text", 0x1000, 3, TEXT_CHARACTERISTICS, &[0x90, 0x90, 0xb8, 1, 2, 3, 4])
        .build();
    let image = load_image(&bytes).unwrap();
    let decoder = IcedDecoder::new(image.bitness());
    let outcome = run_scan(&image, &bytes, &decoder);
    let flags = outcome.code_map.section(0);
    assert_eq!(flags.len(), 3);
    assert!(flags[2].contains(InstrFlags::VALID | InstrFlags::SCANNED));
    assert!(!flags[0].contains(InstrFlags::SCANNED));
    assert!(outcome.warnings.is_empty());
}

#[test]
fn long_mode_program() {
    // sub rsp, 0x28; call [rip+0xff6] (slot 0x2000); add rsp, 0x28; ret
    let code = [
        0x48, 0x83, 0xec, 0x28, 0xff, 0x15, 0xf6, 0x0f, 0x00, 0x00, 0x48, 0x83, 0xc4, 0x28, 0xc3,
    ];
    let bytes = PeFileBuilder::pe64()
        .entry_point(0x1000)
        .section(".text", 0x1000, TEXT_CHARACTERISTICS, &code)
        .imports(0x2000, &[("kernel32.dll", &["ExitProcess"][..])])
        .build();
    let image = load_image(&bytes).unwrap();
    let decoder = IcedDecoder::new(image.bitness());
    let outcome = run_scan(&image, &bytes, &decoder);
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    assert_eq!(outcome.code_map.instruction_count(0), 4);
}
