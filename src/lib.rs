//! Control-flow recovery and disassembly listings for PE images.
//!
//! The pipeline is: [`image::loader::load_image`] parses the file,
//! [`report::run_scan`] discovers reachable code from the exports and the
//! entry point, and [`report::print_report`] writes a per-section report with
//! a disassembly listing for every code section.

/// Scan annotations and the control-flow scanner
pub mod analysis;
/// Configuration structs loadable from JSON
pub mod config;
/// Instruction decoder interface and the iced-x86 backend
pub mod disasm;
pub mod error;
/// Parsed PE images, address and symbol lookups
pub mod image;
/// Backing store for image bytes
pub mod io;
pub mod listing;
pub mod logging;
pub mod report;

pub use analysis::scan::{CodeMap, InstrFlags, ScanOutcome, ScanWarning, Scanner};
pub use config::{Config, IoLimits, ListingOptions};
pub use disasm::iced::IcedDecoder;
pub use disasm::{DecodedInstruction, InstructionDecoder};
pub use error::{PedisError, Result};
pub use image::loader::{load_image, load_image_with_limits};
pub use image::{Image, Section};
pub use io::{ByteSource, MappedFile};
pub use report::{print_report, run_scan};
