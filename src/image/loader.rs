//! Builds an [`Image`] from the bytes of a PE32 or PE32+ file.
//!
//! Header and directory parsing is delegated to the `object` crate; this
//! module only copies out the fields the scanner and report need. Broken
//! export or import directories are logged and skipped so the sections can
//! still be disassembled.

use object::pe;
use object::read::pe::{
    ExportTarget, Import as PeImport, ImageNtHeaders, ImageOptionalHeader, PeFile,
};
use object::{FileKind, LittleEndian as LE};
use tracing::{debug, warn};

use super::{Bitness, Export, FileCharacteristics, Image, Import, Section, SectionCharacteristics};
use crate::config::IoLimits;
use crate::error::{PedisError, Result};

/// Parse `data` as a PE image under the default [`IoLimits`].
pub fn load_image(data: &[u8]) -> Result<Image> {
    load_image_with_limits(data, &IoLimits::default())
}

/// Parse `data` as a PE image, rejecting images whose sections together
/// need more than `limits.max_image_size` bytes of memory.
pub fn load_image_with_limits(data: &[u8], limits: &IoLimits) -> Result<Image> {
    match FileKind::parse(data)? {
        FileKind::Pe32 => load::<pe::ImageNtHeaders32>(data, Bitness::Bits32, limits),
        FileKind::Pe64 => load::<pe::ImageNtHeaders64>(data, Bitness::Bits64, limits),
        other => Err(PedisError::InvalidFormat(format!(
            "expected a PE image, found {:?}",
            other
        ))),
    }
}

fn load<Pe: ImageNtHeaders>(data: &[u8], bitness: Bitness, limits: &IoLimits) -> Result<Image> {
    let file = PeFile::<Pe>::parse(data)?;
    let nt_headers = file.nt_headers();

    let machine = nt_headers.file_header().machine.get(LE);
    if machine != pe::IMAGE_FILE_MACHINE_I386 && machine != pe::IMAGE_FILE_MACHINE_AMD64 {
        return Err(PedisError::UnsupportedMachine(machine));
    }

    let optional_header = nt_headers.optional_header();
    let mut builder = Image::builder()
        .with_bitness(bitness)
        .with_image_base(optional_header.image_base())
        .with_entry_point(optional_header.address_of_entry_point())
        .with_characteristics(FileCharacteristics::from_bits_retain(
            nt_headers.file_header().characteristics.get(LE),
        ));

    let mut allocated: u64 = 0;
    for header in file.section_table().iter() {
        let virtual_size = header.virtual_size.get(LE);
        let raw_size = header.size_of_raw_data.get(LE);
        let file_offset = header.pointer_to_raw_data.get(LE);
        // Some linkers leave VirtualSize zero and rely on SizeOfRawData.
        let min_alloc = if virtual_size == 0 { raw_size } else { virtual_size };

        // Every section gets an annotation byte per allocated byte.
        allocated += u64::from(min_alloc);
        if allocated > limits.max_image_size {
            return Err(PedisError::ImageTooLarge {
                limit: limits.max_image_size,
                found: allocated,
            });
        }

        let available = (data.len() as u64).saturating_sub(u64::from(file_offset));
        let length = if u64::from(raw_size) > available {
            warn!(
                name = %section_name(&header.name),
                raw_size,
                available,
                "Section data truncated by end of file"
            );
            available as u32
        } else {
            raw_size
        };

        let section = Section::new(
            section_name(&header.name),
            header.virtual_address.get(LE),
            min_alloc,
            file_offset,
            length,
            SectionCharacteristics::from_raw(header.characteristics.get(LE)),
        );
        debug!(
            name = %section.name,
            address = format_args!("{:#x}", section.virtual_address),
            length = section.length,
            min_alloc = section.min_alloc,
            "Loaded section"
        );
        builder = builder.with_section(section);
    }

    match read_exports(&file) {
        Ok(exports) => {
            for export in exports {
                builder = builder.with_export(export.address, export.name);
            }
        }
        Err(err) => warn!(error = %err, "Skipping malformed export directory"),
    }

    match read_imports(&file) {
        Ok(imports) => {
            for import in imports {
                builder = builder.with_import(import);
            }
        }
        Err(err) => warn!(error = %err, "Skipping malformed import directory"),
    }

    Ok(builder.build())
}

fn section_name(raw: &[u8; 8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Exports that resolve to an address in this image; forwarders are dropped.
/// Exports without a name are called `#<ordinal>`.
fn read_exports<Pe: ImageNtHeaders>(file: &PeFile<'_, Pe>) -> object::read::Result<Vec<Export>> {
    let Some(table) = file.export_table()? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for export in table.exports()? {
        let ExportTarget::Address(address) = export.target else {
            continue;
        };
        let name = match export.name {
            Some(name) => String::from_utf8_lossy(name).into_owned(),
            None => format!("#{}", export.ordinal),
        };
        out.push(Export { address, name });
    }
    Ok(out)
}

/// One [`Import`] per import descriptor, keyed by its import address table.
fn read_imports<Pe: ImageNtHeaders>(file: &PeFile<'_, Pe>) -> object::read::Result<Vec<Import>> {
    let Some(table) = file.import_table()? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    let mut descriptors = table.descriptors()?;
    while let Some(descriptor) = descriptors.next()? {
        let module = String::from_utf8_lossy(table.name(descriptor.name.get(LE))?).into_owned();
        let first_thunk = descriptor.first_thunk.get(LE);
        // Bound images overwrite the address table on disk; prefer the lookup table.
        let lookup = match descriptor.original_first_thunk.get(LE) {
            0 => first_thunk,
            rva => rva,
        };

        let mut names = Vec::new();
        let mut thunks = table.thunks(lookup)?;
        while let Some(thunk) = thunks.next::<Pe>()? {
            names.push(match table.import::<Pe>(thunk)? {
                PeImport::Ordinal(ordinal) => format!("#{}", ordinal),
                PeImport::Name(_hint, name) => String::from_utf8_lossy(name).into_owned(),
            });
        }
        debug!(
            module = %module,
            nametab = format_args!("{:#x}", first_thunk),
            count = names.len(),
            "Loaded imports"
        );
        out.push(Import::new(module, first_thunk, names));
    }
    Ok(out)
}
