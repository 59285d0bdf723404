//! Address and symbol lookups over an [`Image`].
//!
//! All lookups are linear scans; images have a handful of sections and the
//! symbol tables are small enough that nothing better is needed.

use super::{Image, Section};

impl Image {
    /// Index of the first section whose range `[virtual_address,
    /// virtual_address + min_alloc)` contains `address`.
    pub fn section_index_of(&self, address: u32) -> Option<usize> {
        self.sections.iter().position(|s| s.contains(address))
    }

    /// The section containing `address`, if any.
    pub fn section_of(&self, address: u32) -> Option<&Section> {
        self.section_index_of(address).map(|i| &self.sections[i])
    }

    /// File offset corresponding to `address`.
    ///
    /// Addresses in a section's zero-filled tail still translate, to an
    /// offset past the section's raw data; callers must not read there.
    pub fn offset_of(&self, address: u32) -> Option<u64> {
        let section = self.section_of(address)?;
        Some(u64::from(address - section.virtual_address) + u64::from(section.file_offset))
    }

    /// Name of the first export at exactly `address`.
    pub fn export_name_at(&self, address: u32) -> Option<&str> {
        self.exports
            .iter()
            .find(|e| e.address == address)
            .map(|e| e.name.as_str())
    }

    /// Name of the import whose address table slot holds `va`.
    ///
    /// `va` is an absolute (image-base relative) address as it appears in an
    /// instruction's memory operand.
    pub fn imported_name_at(&self, va: u64) -> Option<&str> {
        let offset = va.checked_sub(self.image_base)?;
        let pointer_size = u64::from(self.bitness.pointer_size());
        self.imports.iter().find_map(|import| {
            let delta = offset.checked_sub(u64::from(import.nametab_address))?;
            let index = usize::try_from(delta / pointer_size).ok()?;
            import.names.get(index).map(String::as_str)
        })
    }
}
