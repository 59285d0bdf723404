//! Recursive-descent discovery of code bytes.
//!
//! Starting from known entry points, the [`Scanner`] decodes instructions,
//! records per-byte annotations in a [`CodeMap`] and follows every direct
//! branch and call target. Pending work is kept on an explicit stack, so
//! arbitrarily long call/jump chains cost heap, not native stack.
//!
//! Annotations only ever gain flags. A path stops as soon as it reaches a
//! byte that is already `SCANNED`, which is what makes cyclic control flow
//! terminate and makes rescanning a seed a no-op.
//!
//! Nothing here is fatal: unmapped targets, misaligned re-entries and paths
//! that run off the end of a section are recorded as [`ScanWarning`]s and
//! logged, and the scan carries on with the remaining work.

use bitflags::bitflags;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::disasm::InstructionDecoder;
use crate::image::Image;
use crate::io::ByteSource;

bitflags! {
    /// Per-byte annotation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstrFlags: u8 {
        /// Byte begins a decoded instruction.
        const VALID = 0x01;
        /// Byte belongs to some decoded instruction.
        const SCANNED = 0x02;
        /// Byte is the target of a call.
        const FUNC = 0x04;
        /// Byte is the target of a jump.
        const JUMP = 0x08;
    }
}

/// Byte annotations for every section of an image, indexed like
/// [`Image::sections`]. Each array covers the section's minimum allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeMap {
    sections: Vec<Vec<InstrFlags>>,
}

impl CodeMap {
    /// An empty map shaped after `image`.
    pub fn new(image: &Image) -> Self {
        Self {
            sections: image
                .sections()
                .iter()
                .map(|s| vec![InstrFlags::empty(); s.min_alloc as usize])
                .collect(),
        }
    }

    /// Annotations of the section at `index`.
    pub fn section(&self, index: usize) -> &[InstrFlags] {
        self.sections.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Annotation of the byte at `address`, if it is mapped.
    pub fn flags_at(&self, image: &Image, address: u32) -> Option<InstrFlags> {
        let index = image.section_index_of(address)?;
        let relative = address - image.sections()[index].virtual_address;
        self.section(index).get(relative as usize).copied()
    }

    /// Number of instruction starts found in the section at `index`.
    pub fn instruction_count(&self, index: usize) -> usize {
        self.section(index)
            .iter()
            .filter(|f| f.contains(InstrFlags::VALID))
            .count()
    }
}

/// Non-fatal anomalies met while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanWarning {
    #[error("{address:x}: attempt to scan byte not in image")]
    Unmapped { address: u32 },

    #[error("{address:x}: attempt to scan byte that does not begin instruction")]
    Misaligned { address: u32 },

    #[error("{address:x}: branch '{text}' to byte {target:x} not in image")]
    BranchOutsideImage {
        address: u32,
        target: u64,
        text: String,
    },

    #[error("{address:x}: scan reached the end of section {section}")]
    Unterminated { address: u32, section: String },
}

/// Result of a completed scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub code_map: CodeMap,
    pub warnings: Vec<ScanWarning>,
    /// Instructions decoded over the whole scan
    pub instructions: usize,
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    /// Entry point or branch target; checked for mapping and alignment.
    Seed(u32),
    /// Fall-through of a conditional branch or call, resumed after its target.
    Resume { section: usize, relative: u32 },
}

/// Worklist-driven control-flow scanner.
///
/// The scanner owns the [`CodeMap`] while it runs; [`Scanner::finish`]
/// hands it out read-only.
pub struct Scanner<'a> {
    image: &'a Image,
    source: &'a dyn ByteSource,
    decoder: &'a dyn InstructionDecoder,
    map: CodeMap,
    pending: Vec<Pending>,
    warnings: Vec<ScanWarning>,
    buffer: Vec<u8>,
    instructions: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(
        image: &'a Image,
        source: &'a dyn ByteSource,
        decoder: &'a dyn InstructionDecoder,
    ) -> Self {
        Self {
            image,
            source,
            decoder,
            map: CodeMap::new(image),
            pending: Vec::new(),
            warnings: Vec::new(),
            buffer: vec![0; decoder.max_instruction_length()],
            instructions: 0,
        }
    }

    /// Scan everything reachable from `start`.
    pub fn scan(&mut self, start: u32) {
        debug!(start = format_args!("{:#x}", start), "Scanning");
        self.pending.push(Pending::Seed(start));
        while let Some(next) = self.pending.pop() {
            match next {
                Pending::Seed(address) => self.start_path(address),
                Pending::Resume { section, relative } => self.follow_path(section, relative),
            }
        }
    }

    pub fn code_map(&self) -> &CodeMap {
        &self.map
    }

    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    pub fn finish(self) -> ScanOutcome {
        ScanOutcome {
            code_map: self.map,
            warnings: self.warnings,
            instructions: self.instructions,
        }
    }

    fn report(&mut self, warning: ScanWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    fn start_path(&mut self, address: u32) {
        let Some(index) = self.image.section_index_of(address) else {
            self.report(ScanWarning::Unmapped { address });
            return;
        };
        let relative = address - self.image.sections()[index].virtual_address;
        let flags = self.map.section(index).get(relative as usize).copied().unwrap_or_default();
        if flags.contains(InstrFlags::SCANNED) && !flags.contains(InstrFlags::VALID) {
            self.report(ScanWarning::Misaligned { address });
        }
        self.follow_path(index, relative);
    }

    /// Decode forward from `relative` until the path stops, returns to known
    /// code, or branches (in which case the target is scanned first and the
    /// fall-through is queued behind it).
    fn follow_path(&mut self, index: usize, mut relative: u32) {
        // One stretch of code is assumed not to cross into the next section.
        let image = self.image;
        let section = &image.sections()[index];
        let extent = section.extent();

        while relative < extent {
            if self.map.sections[index][relative as usize].contains(InstrFlags::SCANNED) {
                return;
            }

            section.read_padded(self.source, relative, &mut self.buffer);
            let address = section.virtual_address.wrapping_add(relative);
            let insn = self.decoder.decode(u64::from(address), &self.buffer);
            self.instructions += 1;
            trace!(address = format_args!("{:#x}", address), text = %insn.text, "Decoded");

            let flags = &mut self.map.sections[index];
            let len = flags.len();
            let start = relative as usize;
            let end = start + insn.length.max(1);
            flags[start].insert(InstrFlags::VALID);
            for byte in &mut flags[start..end.min(len)] {
                byte.insert(InstrFlags::SCANNED);
            }
            if end > section.min_alloc as usize {
                // Hangs over the minimum allocation.
                trace!(address = format_args!("{:#x}", address), "Instruction overhangs section");
                return;
            }
            let next = end as u32;

            if let Some(target) = insn.branch_target() {
                match locate(image, target) {
                    Some((target_index, target_relative)) => {
                        let mark = if insn.flow.is_call() {
                            InstrFlags::FUNC
                        } else {
                            InstrFlags::JUMP
                        };
                        if let Some(flags) =
                            self.map.sections[target_index].get_mut(target_relative as usize)
                        {
                            flags.insert(mark);
                        }
                        if !insn.flow.is_terminator() {
                            self.pending.push(Pending::Resume {
                                section: index,
                                relative: next,
                            });
                        }
                        let seed = image.sections()[target_index].virtual_address + target_relative;
                        self.pending.push(Pending::Seed(seed));
                        return;
                    }
                    None => self.report(ScanWarning::BranchOutsideImage {
                        address,
                        target,
                        text: insn.text.clone(),
                    }),
                }
            }

            if insn.flow.is_terminator() {
                return;
            }
            relative = next;
        }

        self.report(ScanWarning::Unterminated {
            address: section.virtual_address.wrapping_add(relative),
            section: section.name.clone(),
        });
    }
}

/// Section index and section-relative offset of a branch target.
fn locate(image: &Image, target: u64) -> Option<(usize, u32)> {
    let address = u32::try_from(target).ok()?;
    let index = image.section_index_of(address)?;
    Some((index, address - image.sections()[index].virtual_address))
}
