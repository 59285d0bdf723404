//! Disassembly listing of one code section.
//!
//! The renderer sweeps a section linearly, guided by the [`CodeMap`] a scan
//! produced. Bytes that start an instruction are decoded again and printed;
//! runs the scan never reached collapse into a single gap marker. Function
//! starts get a labelled header, and instructions that reference an import
//! slot or an exported address get the symbol name as a trailing comment.

use std::io::Write;

use tracing::{debug, trace};

use crate::analysis::scan::{CodeMap, InstrFlags};
use crate::config::ListingOptions;
use crate::disasm::{Addressing, DecodedInstruction, FlowKind, InstructionDecoder};
use crate::error::Result;
use crate::image::{Image, Section};
use crate::io::ByteSource;

/// Printed once for every run of bytes left out of the listing.
pub const GAP_MARKER: &str = "     ...";

/// Label used for a function start that has no export name.
pub const UNNAMED_FUNCTION: &str = "no name";

/// Format one instruction line.
///
/// `bytes` are the instruction's raw bytes; they are printed as lowercase hex
/// pairs in a left-aligned column.
pub fn format_line(
    address: u64,
    bytes: &[u8],
    insn: &DecodedInstruction,
    comment: Option<&str>,
) -> String {
    let hex = bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");
    let mut line = format!("{:8x}:\t{:<21}\t{}", address, hex, insn.text);
    if let Some(comment) = comment {
        line.push_str("\t; ");
        line.push_str(comment);
    }
    line
}

/// Header printed above the instruction at a call target.
pub fn function_header(address: u64, name: Option<&str>) -> String {
    format!("{:x} <{}>:", address, name.unwrap_or(UNNAMED_FUNCTION))
}

/// Symbol comment for `insn`, if it references a known import or export.
///
/// An indirect call or jump through a bare memory slot is looked up among the
/// imports. Failing that, a direct branch target is looked up among the
/// exports. Only the operand shape is checked; relocations are not consulted.
pub fn symbol_comment<'i>(image: &'i Image, insn: &DecodedInstruction) -> Option<&'i str> {
    if matches!(insn.flow, FlowKind::IndirectCall | FlowKind::IndirectJump) {
        let slot = match insn.addressing {
            Addressing::Absolute(va) => Some(va),
            Addressing::IpRelative(address) => address.checked_add(image.image_base()),
            Addressing::Other => None,
        };
        if let Some(name) = slot.and_then(|va| image.imported_name_at(va)) {
            return Some(name);
        }
    }
    let target = u32::try_from(insn.branch_target()?).ok()?;
    image.export_name_at(target)
}

/// Renders code sections of one image.
pub struct Renderer<'a> {
    image: &'a Image,
    source: &'a dyn ByteSource,
    decoder: &'a dyn InstructionDecoder,
    code_map: &'a CodeMap,
    options: ListingOptions,
    buffer: Vec<u8>,
}

impl<'a> Renderer<'a> {
    pub fn new(
        image: &'a Image,
        source: &'a dyn ByteSource,
        decoder: &'a dyn InstructionDecoder,
        code_map: &'a CodeMap,
        options: ListingOptions,
    ) -> Self {
        Self {
            image,
            source,
            decoder,
            code_map,
            options,
            buffer: vec![0; decoder.max_instruction_length()],
        }
    }

    /// Write the listing of the section at `index`, followed by a blank line.
    pub fn render_section<W: Write + ?Sized>(&mut self, index: usize, out: &mut W) -> Result<()> {
        let image = self.image;
        let code_map = self.code_map;
        let Some(section) = image.sections().get(index) else {
            return Ok(());
        };
        let flags = code_map.section(index);
        let extent = (section.extent() as usize).min(flags.len());
        debug!(section = %section.name, extent, exhaustive = self.options.exhaustive, "Rendering");

        let mut relative = 0usize;
        while relative < extent {
            if !flags[relative].contains(InstrFlags::VALID) {
                if let Some(next) = self.skip_gap(section, flags, relative, extent) {
                    writeln!(out, "{}", GAP_MARKER)?;
                    relative = next;
                    continue;
                }
            }

            section.read_padded(self.source, relative as u32, &mut self.buffer);
            let address = u64::from(section.virtual_address) + relative as u64;
            let insn = self.decoder.decode(address, &self.buffer);
            let length = insn.length.max(1).min(self.buffer.len());

            if flags[relative].contains(InstrFlags::FUNC) {
                let name = u32::try_from(address)
                    .ok()
                    .and_then(|a| image.export_name_at(a));
                writeln!(out)?;
                writeln!(out, "{}", function_header(address, name))?;
            }

            let comment = symbol_comment(image, &insn);
            trace!(address = format_args!("{:#x}", address), text = %insn.text, "Rendered");
            writeln!(out, "{}", format_line(address, &self.buffer[..length], &insn, comment))?;
            relative += length;
        }

        writeln!(out)?;
        Ok(())
    }

    /// Where rendering resumes after the non-`VALID` byte at `relative`, or
    /// `None` if the byte is to be decoded in place.
    ///
    /// By default the whole run up to the next instruction start is skipped.
    /// In exhaustive mode only a run of zero bytes is skipped; anything else
    /// is swept linearly.
    fn skip_gap(
        &self,
        section: &Section,
        flags: &[InstrFlags],
        relative: usize,
        extent: usize,
    ) -> Option<usize> {
        let is_valid = |i: usize| flags[i].contains(InstrFlags::VALID);
        if !self.options.exhaustive {
            return Some((relative..extent).find(|&i| is_valid(i)).unwrap_or(extent));
        }

        let is_zero = |i: usize| {
            let mut byte = [0u8; 1];
            section.read_padded(self.source, i as u32, &mut byte);
            byte[0] == 0
        };
        if !is_zero(relative) {
            return None;
        }
        Some(
            (relative..extent)
                .find(|&i| is_valid(i) || !is_zero(i))
                .unwrap_or(extent),
        )
    }
}
