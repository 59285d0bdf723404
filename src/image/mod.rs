//! Parsed view of one PE image.
//!
//! An [`Image`] is built once (by [`loader::load_image`] or by hand through
//! [`ImageBuilder`]) and then only read. Per-byte scan annotations are not
//! stored here; they live in the scanner's [`crate::analysis::scan::CodeMap`].

use bitflags::bitflags;

pub mod loader;
pub mod resolve;
pub mod section;

pub use section::{Section, SectionCharacteristics};

bitflags! {
    /// COFF file header characteristics (`IMAGE_FILE_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileCharacteristics: u16 {
        const RELOCS_STRIPPED = 0x0001;
        const EXECUTABLE_IMAGE = 0x0002;
        const LINE_NUMS_STRIPPED = 0x0004;
        const LOCAL_SYMS_STRIPPED = 0x0008;
        const LARGE_ADDRESS_AWARE = 0x0020;
        const MACHINE_32BIT = 0x0100;
        const DEBUG_STRIPPED = 0x0200;
        const SYSTEM = 0x1000;
        const DLL = 0x2000;
    }
}

/// Code size of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitness {
    /// PE32, i386 code
    Bits32,
    /// PE32+, AMD64 code
    Bits64,
}

impl Bitness {
    pub fn bits(&self) -> u32 {
        match self {
            Bitness::Bits32 => 32,
            Bitness::Bits64 => 64,
        }
    }

    /// Size of an import address table slot.
    pub fn pointer_size(&self) -> u32 {
        match self {
            Bitness::Bits32 => 4,
            Bitness::Bits64 => 8,
        }
    }
}

/// A named export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub address: u32,
    pub name: String,
}

/// The imports of one module.
///
/// `nametab_address` is the address of the module's import address table;
/// slot `i` of that table is filled with `names[i]` at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub nametab_address: u32,
    pub names: Vec<String>,
}

impl Import {
    pub fn new(module: impl Into<String>, nametab_address: u32, names: Vec<String>) -> Self {
        Self {
            module: module.into(),
            nametab_address,
            names,
        }
    }

    /// Number of imported names.
    pub fn count(&self) -> usize {
        self.names.len()
    }
}

/// Parsed PE image: header fields, section table, exports and imports.
#[derive(Debug, Clone)]
pub struct Image {
    image_base: u64,
    entry_point: u32,
    characteristics: FileCharacteristics,
    bitness: Bitness,
    sections: Vec<Section>,
    exports: Vec<Export>,
    imports: Vec<Import>,
}

impl Image {
    pub fn builder() -> ImageBuilder {
        ImageBuilder::default()
    }

    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    pub fn entry_point(&self) -> u32 {
        self.entry_point
    }

    pub fn characteristics(&self) -> FileCharacteristics {
        self.characteristics
    }

    pub fn bitness(&self) -> Bitness {
        self.bitness
    }

    /// Sections in section-table order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    /// False for images flagged as DLLs; their entry point is not used as a
    /// scan seed.
    pub fn has_entry_point(&self) -> bool {
        !self.characteristics.contains(FileCharacteristics::DLL)
    }
}

/// Builder for [`Image`].
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    image_base: u64,
    entry_point: u32,
    characteristics: FileCharacteristics,
    bitness: Bitness,
    sections: Vec<Section>,
    exports: Vec<Export>,
    imports: Vec<Import>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self {
            image_base: 0x0040_0000,
            entry_point: 0,
            characteristics: FileCharacteristics::EXECUTABLE_IMAGE,
            bitness: Bitness::Bits32,
            sections: Vec::new(),
            exports: Vec::new(),
            imports: Vec::new(),
        }
    }
}

impl ImageBuilder {
    pub fn with_image_base(mut self, image_base: u64) -> Self {
        self.image_base = image_base;
        self
    }

    pub fn with_entry_point(mut self, entry_point: u32) -> Self {
        self.entry_point = entry_point;
        self
    }

    pub fn with_characteristics(mut self, characteristics: FileCharacteristics) -> Self {
        self.characteristics = characteristics;
        self
    }

    pub fn with_bitness(mut self, bitness: Bitness) -> Self {
        self.bitness = bitness;
        self
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn with_export(mut self, address: u32, name: impl Into<String>) -> Self {
        self.exports.push(Export {
            address,
            name: name.into(),
        });
        self
    }

    pub fn with_import(mut self, import: Import) -> Self {
        self.imports.push(import);
        self
    }

    pub fn build(self) -> Image {
        Image {
            image_base: self.image_base,
            entry_point: self.entry_point,
            characteristics: self.characteristics,
            bitness: self.bitness,
            sections: self.sections,
            exports: self.exports,
            imports: self.imports,
        }
    }
}
