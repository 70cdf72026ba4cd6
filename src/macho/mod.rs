//! Mach-O file format handling.
//!
//! This module provides the record layouts of thin Mach-O files and the
//! offset-tagged reader that builds a metadata snapshot from them.

mod constants;
mod context;
mod layout;
mod reader;
mod structs;

pub use constants::*;
pub use context::*;
pub use layout::*;
pub use reader::*;
pub use structs::*;
