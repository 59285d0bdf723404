//! Analysis passes over a loaded [`crate::image::Image`].
//!
//! Currently a single pass: [`scan`] discovers which bytes of each section
//! are reachable code.

pub mod scan;

pub use scan::{CodeMap, InstrFlags, ScanOutcome, ScanWarning, Scanner};
