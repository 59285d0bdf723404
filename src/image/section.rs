//! PE sections and their characteristics.

use bitflags::bitflags;
use std::fmt;

use crate::io::ByteSource;

bitflags! {
    /// Section characteristics (`IMAGE_SCN_*`).
    ///
    /// Bits 20..24 hold the alignment field and are not flags; they are kept
    /// (see [`SectionCharacteristics::alignment_exponent`]) but never named.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionCharacteristics: u32 {
        const TYPE_DSECT = 0x0000_0001;
        const TYPE_NOLOAD = 0x0000_0002;
        const TYPE_GROUP = 0x0000_0004;
        const TYPE_NO_PAD = 0x0000_0008;
        const TYPE_COPY = 0x0000_0010;
        const CNT_CODE = 0x0000_0020;
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        const LNK_OTHER = 0x0000_0100;
        const LNK_INFO = 0x0000_0200;
        const TYPE_OVER = 0x0000_0400;
        const LNK_REMOVE = 0x0000_0800;
        const LNK_COMDAT = 0x0000_1000;
        const MEM_MERGE = 0x0000_2000;
        const TYPE_REVERSE_PAD = 0x0000_4000;
        const MEM_FARDATA = 0x0000_8000;
        const MEM_SYSHEAP = 0x0001_0000;
        const MEM_PURGEABLE = 0x0002_0000;
        const MEM_LOCKED = 0x0004_0000;
        const MEM_PRELOAD = 0x0008_0000;
        const LNK_NRELOC_OVFL = 0x0100_0000;
        const MEM_DISCARDABLE = 0x0200_0000;
        const MEM_NOT_CACHED = 0x0400_0000;
        const MEM_NOT_PAGED = 0x0800_0000;
        const MEM_SHARED = 0x1000_0000;
        const MEM_EXECUTE = 0x2000_0000;
        const MEM_READ = 0x4000_0000;
        const MEM_WRITE = 0x8000_0000;
    }
}

/// Mask of the 4-bit alignment field.
pub const ALIGNMENT_MASK: u32 = 0x00f0_0000;
const ALIGNMENT_SHIFT: u32 = 20;

/// Display names, in bit order. Several are COFF object-file flags that
/// should never appear in a loaded image; they are named anyway.
const FLAG_NAMES: &[(SectionCharacteristics, &str)] = &[
    (SectionCharacteristics::TYPE_DSECT, "STYP_DSECT"),
    (SectionCharacteristics::TYPE_NOLOAD, "STYP_NOLOAD"),
    (SectionCharacteristics::TYPE_GROUP, "STYP_GROUP"),
    (SectionCharacteristics::TYPE_NO_PAD, "STYP_PAD"),
    (SectionCharacteristics::TYPE_COPY, "STYP_COPY"),
    (SectionCharacteristics::CNT_CODE, "code"),
    (SectionCharacteristics::CNT_INITIALIZED_DATA, "data"),
    (SectionCharacteristics::CNT_UNINITIALIZED_DATA, "bss"),
    (SectionCharacteristics::LNK_OTHER, "S_NEWCFN"),
    (SectionCharacteristics::LNK_INFO, "STYP_INFO"),
    (SectionCharacteristics::TYPE_OVER, "STYP_OVER"),
    (SectionCharacteristics::LNK_REMOVE, "STYP_LIB"),
    (SectionCharacteristics::LNK_COMDAT, "COMDAT"),
    (SectionCharacteristics::MEM_MERGE, "STYP_MERGE"),
    (SectionCharacteristics::TYPE_REVERSE_PAD, "STYP_REVERSE_PAD"),
    (SectionCharacteristics::MEM_FARDATA, "FARDATA"),
    (SectionCharacteristics::MEM_SYSHEAP, "(unknown flags 0x10000)"),
    // also IMAGE_SCN_MEM_16BIT
    (SectionCharacteristics::MEM_PURGEABLE, "purgeable"),
    (SectionCharacteristics::MEM_LOCKED, "locked"),
    (SectionCharacteristics::MEM_PRELOAD, "preload"),
    (SectionCharacteristics::LNK_NRELOC_OVFL, "extended relocations"),
    (SectionCharacteristics::MEM_DISCARDABLE, "discardable"),
    (SectionCharacteristics::MEM_NOT_CACHED, "not cached"),
    (SectionCharacteristics::MEM_NOT_PAGED, "not paged"),
    (SectionCharacteristics::MEM_SHARED, "shared"),
    (SectionCharacteristics::MEM_EXECUTE, "executable"),
    (SectionCharacteristics::MEM_READ, "readable"),
    (SectionCharacteristics::MEM_WRITE, "writable"),
];

impl SectionCharacteristics {
    /// Build from a raw header value, keeping the alignment field.
    pub fn from_raw(raw: u32) -> Self {
        Self::from_bits_retain(raw)
    }

    /// The raw 4-bit alignment field.
    pub fn alignment_exponent(&self) -> u32 {
        (self.bits() & ALIGNMENT_MASK) >> ALIGNMENT_SHIFT
    }

    /// Alignment in bytes, `2**alignment_exponent`.
    pub fn alignment(&self) -> u32 {
        1 << self.alignment_exponent()
    }

    /// Names of the set flags, in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        FLAG_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    /// Comma-joined flag names.
    pub fn describe(&self) -> String {
        self.names().join(", ")
    }

    /// The section holds initialized data.
    pub fn is_data(&self) -> bool {
        self.contains(Self::CNT_INITIALIZED_DATA)
    }

    /// The section holds code.
    pub fn is_code(&self) -> bool {
        self.contains(Self::CNT_CODE)
    }
}

impl fmt::Display for SectionCharacteristics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x} ({})", self.bits(), self.describe())
    }
}

/// One section of a PE image.
///
/// Addresses are relative to the image base, as in the section table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section name with trailing NULs removed (at most 8 bytes in the file)
    pub name: String,
    /// Start of the section's address range
    pub virtual_address: u32,
    /// Bytes occupied in memory; the part beyond `length` reads as zero
    pub min_alloc: u32,
    /// File offset of the section's raw data
    pub file_offset: u32,
    /// Bytes physically present in the file
    pub length: u32,
    pub characteristics: SectionCharacteristics,
}

impl Section {
    pub fn new(
        name: impl Into<String>,
        virtual_address: u32,
        min_alloc: u32,
        file_offset: u32,
        length: u32,
        characteristics: SectionCharacteristics,
    ) -> Self {
        Self {
            name: name.into(),
            virtual_address,
            min_alloc,
            file_offset,
            length,
            characteristics,
        }
    }

    /// Whether `address` lies in `[virtual_address, virtual_address + min_alloc)`.
    pub fn contains(&self, address: u32) -> bool {
        address >= self.virtual_address
            && u64::from(address) < u64::from(self.virtual_address) + u64::from(self.min_alloc)
    }

    /// Number of leading bytes that are both mapped and backed by the file.
    ///
    /// Scanning and rendering stop here.
    pub fn extent(&self) -> u32 {
        self.length.min(self.min_alloc)
    }

    /// Fill `buf` with the section's bytes starting at `relative`.
    ///
    /// Whatever lies beyond the section's raw data (or beyond the end of a
    /// truncated file) reads as zero.
    pub fn read_padded(&self, source: &dyn ByteSource, relative: u32, buf: &mut [u8]) {
        buf.fill(0);
        if relative >= self.length {
            return;
        }
        let available = buf.len().min((self.length - relative) as usize);
        let offset = u64::from(self.file_offset) + u64::from(relative);
        source.read_at(offset, &mut buf[..available]);
    }
}
