//! Common test utilities and helpers.
//!
//! Integration tests build their input images in memory: [`PeFileBuilder`]
//! assembles small but well-formed PE32 / PE32+ files, with optional export
//! and import directories, that the loader parses like any linker output.

#![allow(dead_code)]

use std::io::Write;

use tempfile::NamedTempFile;

pub const IMAGE_BASE_32: u64 = 0x0040_0000;
pub const IMAGE_BASE_64: u64 = 0x1_4000_0000;

pub const TEXT_CHARACTERISTICS: u32 = 0x6000_0020;
pub const DATA_CHARACTERISTICS: u32 = 0xc000_0040;
pub const RDATA_CHARACTERISTICS: u32 = 0x4000_0040;

const FILE_ALIGNMENT: u32 = 0x200;
const SECTION_ALIGNMENT: u32 = 0x1000;
const HEADERS_SIZE: u32 = 0x200;
const PE_OFFSET: usize = 0x40;

/// `push ebp; mov ebp, esp; call 0x100a; pop ebp; ret; xor eax, eax; ret`
/// when placed at 0x1000.
pub const SMALL_PROGRAM: &[u8] = &[
    0x55, 0x8b, 0xec, 0xe8, 0x02, 0x00, 0x00, 0x00, 0x5d, 0xc3, 0x31, 0xc0, 0xc3,
];

struct RawSection {
    name: String,
    virtual_address: u32,
    virtual_size: u32,
    characteristics: u32,
    data: Vec<u8>,
}

/// Builder for synthetic PE files.
pub struct PeFileBuilder {
    bits64: bool,
    machine: u16,
    dll: bool,
    entry_point: u32,
    sections: Vec<RawSection>,
    export_directory: Option<(u32, u32)>,
    import_directory: Option<(u32, u32)>,
}

impl PeFileBuilder {
    pub fn pe32() -> Self {
        Self {
            bits64: false,
            machine: 0x014c,
            dll: false,
            entry_point: 0,
            sections: Vec::new(),
            export_directory: None,
            import_directory: None,
        }
    }

    pub fn pe64() -> Self {
        Self {
            bits64: true,
            machine: 0x8664,
            ..Self::pe32()
        }
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    pub fn dll(mut self) -> Self {
        self.dll = true;
        self
    }

    pub fn entry_point(mut self, entry_point: u32) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Add a section whose virtual size equals its data length.
    pub fn section(
        self,
        name: &str,
        virtual_address: u32,
        characteristics: u32,
        data: &[u8],
    ) -> Self {
        let size = data.len() as u32;
        self.section_sized(name, virtual_address, size, characteristics, data)
    }

    pub fn section_sized(
        mut self,
        name: &str,
        virtual_address: u32,
        virtual_size: u32,
        characteristics: u32,
        data: &[u8],
    ) -> Self {
        self.sections.push(RawSection {
            name: name.to_string(),
            virtual_address,
            virtual_size,
            characteristics,
            data: data.to_vec(),
        });
        self
    }

    /// Add an `.edata` section at `virtual_address` exporting `(name, address)`
    /// pairs with ordinals starting at 1.
    pub fn exports(self, virtual_address: u32, dll_name: &str, exports: &[(&str, u32)]) -> Self {
        let n = exports.len();
        let functions = 40;
        let names = functions + 4 * n;
        let ordinals = names + 4 * n;
        let strings = ordinals + 2 * n;

        let mut data = vec![0u8; strings];
        let dll_name_at = append_cstr(&mut data, dll_name);
        put_u32(&mut data, 12, virtual_address + dll_name_at as u32);
        put_u32(&mut data, 16, 1);
        put_u32(&mut data, 20, n as u32);
        put_u32(&mut data, 24, n as u32);
        put_u32(&mut data, 28, virtual_address + functions as u32);
        put_u32(&mut data, 32, virtual_address + names as u32);
        put_u32(&mut data, 36, virtual_address + ordinals as u32);

        for (i, (name, address)) in exports.iter().enumerate() {
            put_u32(&mut data, functions + 4 * i, *address);
            let at = append_cstr(&mut data, name);
            put_u32(&mut data, names + 4 * i, virtual_address + at as u32);
            put_u16(&mut data, ordinals + 2 * i, i as u16);
        }

        let size = data.len() as u32;
        let mut builder = self.section(".edata", virtual_address, RDATA_CHARACTERISTICS, &data);
        builder.export_directory = Some((virtual_address, size));
        builder
    }

    /// Add an `.idata` section at `virtual_address` importing `names` from
    /// each module. Names of the form `#<n>` are imported by ordinal.
    ///
    /// The import address tables come first, back to back, so the table of
    /// the first module starts at `virtual_address`.
    pub fn imports(self, virtual_address: u32, modules: &[(&str, &[&str])]) -> Self {
        let pointer = if self.bits64 { 8 } else { 4 };
        let table_len = |count: usize| (count + 1) * pointer;

        let mut iats = Vec::new();
        let mut offset = 0;
        for (_, names) in modules {
            iats.push(offset);
            offset += table_len(names.len());
        }
        let descriptors = offset;
        offset += (modules.len() + 1) * 20;
        let mut ilts = Vec::new();
        for (_, names) in modules {
            ilts.push(offset);
            offset += table_len(names.len());
        }

        let mut data = vec![0u8; offset];
        for (m, (module, names)) in modules.iter().enumerate() {
            let descriptor = descriptors + 20 * m;
            for (i, name) in names.iter().enumerate() {
                let thunk = match name.strip_prefix('#') {
                    Some(ordinal) => {
                        let ordinal: u64 = ordinal.parse().unwrap();
                        if self.bits64 {
                            ordinal | (1 << 63)
                        } else {
                            ordinal | (1 << 31)
                        }
                    }
                    None => {
                        if data.len() % 2 == 1 {
                            data.push(0);
                        }
                        let at = data.len();
                        data.extend_from_slice(&[0, 0]);
                        append_cstr(&mut data, name);
                        u64::from(virtual_address) + at as u64
                    }
                };
                for table in [iats[m], ilts[m]] {
                    let slot = table + pointer * i;
                    if self.bits64 {
                        put_u64(&mut data, slot, thunk);
                    } else {
                        put_u32(&mut data, slot, thunk as u32);
                    }
                }
            }
            let module_at = append_cstr(&mut data, module);
            put_u32(&mut data, descriptor, virtual_address + ilts[m] as u32);
            put_u32(&mut data, descriptor + 12, virtual_address + module_at as u32);
            put_u32(&mut data, descriptor + 16, virtual_address + iats[m] as u32);
        }

        let directory = (
            virtual_address + descriptors as u32,
            ((modules.len() + 1) * 20) as u32,
        );
        let mut builder = self.section(".idata", virtual_address, DATA_CHARACTERISTICS, &data);
        builder.import_directory = Some(directory);
        builder
    }

    pub fn build(&self) -> Vec<u8> {
        let mut file = vec![0u8; HEADERS_SIZE as usize];
        file[0] = b'M';
        file[1] = b'Z';
        put_u32(&mut file, 0x3c, PE_OFFSET as u32);
        file[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");

        let optional_size: u16 = if self.bits64 { 0xf0 } else { 0xe0 };
        let mut characteristics: u16 = if self.bits64 { 0x0022 } else { 0x0102 };
        if self.dll {
            characteristics |= 0x2000;
        }
        let coff = PE_OFFSET + 4;
        put_u16(&mut file, coff, self.machine);
        put_u16(&mut file, coff + 2, self.sections.len() as u16);
        put_u16(&mut file, coff + 16, optional_size);
        put_u16(&mut file, coff + 18, characteristics);

        let size_of_image = self
            .sections
            .iter()
            .map(|s| align_up(s.virtual_address + s.virtual_size.max(1), SECTION_ALIGNMENT))
            .max()
            .unwrap_or(SECTION_ALIGNMENT);

        let opt = coff + 20;
        put_u16(&mut file, opt, if self.bits64 { 0x20b } else { 0x10b });
        put_u32(&mut file, opt + 0x10, self.entry_point);
        if self.bits64 {
            put_u64(&mut file, opt + 0x18, IMAGE_BASE_64);
        } else {
            put_u32(&mut file, opt + 0x1c, IMAGE_BASE_32 as u32);
        }
        put_u32(&mut file, opt + 0x20, SECTION_ALIGNMENT);
        put_u32(&mut file, opt + 0x24, FILE_ALIGNMENT);
        put_u16(&mut file, opt + 0x28, 4);
        put_u16(&mut file, opt + 0x30, 4);
        put_u32(&mut file, opt + 0x38, size_of_image);
        put_u32(&mut file, opt + 0x3c, HEADERS_SIZE);
        put_u16(&mut file, opt + 0x44, 3);
        let (count_at, directories) = if self.bits64 {
            (opt + 0x6c, opt + 0x70)
        } else {
            (opt + 0x5c, opt + 0x60)
        };
        put_u32(&mut file, count_at, 16);
        if let Some((address, size)) = self.export_directory {
            put_u32(&mut file, directories, address);
            put_u32(&mut file, directories + 4, size);
        }
        if let Some((address, size)) = self.import_directory {
            put_u32(&mut file, directories + 8, address);
            put_u32(&mut file, directories + 12, size);
        }

        let mut header = opt + optional_size as usize;
        for section in &self.sections {
            let raw_size = align_up(section.data.len() as u32, FILE_ALIGNMENT);
            let raw_pointer = if raw_size == 0 { 0 } else { file.len() as u32 };

            let mut name = [0u8; 8];
            let len = section.name.len().min(8);
            name[..len].copy_from_slice(&section.name.as_bytes()[..len]);
            file[header..header + 8].copy_from_slice(&name);
            put_u32(&mut file, header + 8, section.virtual_size);
            put_u32(&mut file, header + 12, section.virtual_address);
            put_u32(&mut file, header + 16, raw_size);
            put_u32(&mut file, header + 20, raw_pointer);
            put_u32(&mut file, header + 36, section.characteristics);
            header += 40;

            file.extend_from_slice(&section.data);
            file.resize(raw_pointer as usize + raw_size as usize, 0);
        }
        file
    }
}

/// A PE32 executable whose only section is `.text` at 0x1000 holding
/// [`SMALL_PROGRAM`], with the entry point at its first byte.
pub fn small_exe() -> PeFileBuilder {
    PeFileBuilder::pe32()
        .entry_point(0x1000)
        .section(".text", 0x1000, TEXT_CHARACTERISTICS, SMALL_PROGRAM)
}

/// Write `bytes` to a fresh temporary file.
pub fn temp_file_with(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

fn append_cstr(data: &mut Vec<u8>, s: &str) -> usize {
    let at = data.len();
    data.extend_from_slice(s.as_bytes());
    data.push(0);
    at
}

fn put_u16(data: &mut [u8], at: usize, value: u16) {
    data[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(data: &mut [u8], at: usize, value: u32) {
    data[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(data: &mut [u8], at: usize, value: u64) {
    data[at..at + 8].copy_from_slice(&value.to_le_bytes());
}
