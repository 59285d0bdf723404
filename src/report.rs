//! Section report: seed and run the scan, then print every section.
//!
//! The scan always completes before anything is rendered; [`run_scan`]
//! returns the finished [`CodeMap`] inside a [`ScanOutcome`] and
//! [`print_report`] only reads it.

use std::io::Write;

use tracing::{debug, info};

use crate::analysis::scan::{CodeMap, ScanOutcome, Scanner};
use crate::config::ListingOptions;
use crate::disasm::InstructionDecoder;
use crate::error::Result;
use crate::image::{Image, Section};
use crate::io::ByteSource;
use crate::listing::Renderer;

/// Scan every export and, unless the image is a DLL, the entry point.
pub fn run_scan(
    image: &Image,
    source: &dyn ByteSource,
    decoder: &dyn InstructionDecoder,
) -> ScanOutcome {
    debug!(
        file_size = source.size(),
        sections = image.sections().len(),
        "Scanning image"
    );
    let mut scanner = Scanner::new(image, source, decoder);
    for export in image.exports() {
        debug!(
            name = %export.name,
            address = format_args!("{:#x}", export.address),
            "Seeding export"
        );
        scanner.scan(export.address);
    }
    if image.has_entry_point() {
        debug!(address = format_args!("{:#x}", image.entry_point()), "Seeding entry point");
        scanner.scan(image.entry_point());
    }
    let outcome = scanner.finish();
    info!(
        instructions = outcome.instructions,
        warnings = outcome.warnings.len(),
        decoder = decoder.name(),
        "Scan complete"
    );
    outcome
}

/// Write the header block of one section.
pub fn write_section_header<W: Write + ?Sized>(section: &Section, out: &mut W) -> Result<()> {
    writeln!(
        out,
        "Section {} (start = {:#x}, length = {:#x}, minimum allocation = {:#x}):",
        section.name, section.file_offset, section.length, section.min_alloc
    )?;
    writeln!(out, "    Address: {:x}", section.virtual_address)?;
    let flags = section.characteristics;
    writeln!(out, "    Flags: {:#010x} ({})", flags.bits(), flags.describe())?;
    writeln!(
        out,
        "    Alignment: {} (2**{})",
        flags.alignment(),
        flags.alignment_exponent()
    )?;
    Ok(())
}

/// Print every section in table order: its header, then a listing for code
/// sections. Data sections get the header only.
pub fn print_report<W: Write + ?Sized>(
    image: &Image,
    source: &dyn ByteSource,
    decoder: &dyn InstructionDecoder,
    code_map: &CodeMap,
    options: ListingOptions,
    out: &mut W,
) -> Result<()> {
    let mut renderer = Renderer::new(image, source, decoder, code_map, options);
    for (index, section) in image.sections().iter().enumerate() {
        writeln!(out)?;
        write_section_header(section, out)?;

        let flags = section.characteristics;
        if flags.is_data() {
            debug!(section = %section.name, "Data section, no listing");
        } else if flags.is_code() {
            renderer.render_section(index, out)?;
        }
    }
    Ok(())
}
