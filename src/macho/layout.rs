//! 32-bit and 64-bit Mach-O layouts.
//!
//! The two formats differ only in the record types for the header, segment
//! commands and sections, and in the alignment unit for load commands. The
//! workflow is written once against [`MachOLayout`] and instantiated for the
//! format detected from the header magic.

use std::fmt;

use super::constants::*;
use super::structs::*;
use crate::error::{Error, Result};

/// Header fields the injection workflow reads and rewrites.
pub trait HeaderFields: RawRecord {
    /// File type (`MH_EXECUTE`, `MH_DYLIB`, ...).
    fn filetype(&self) -> u32;
    /// CPU type.
    fn cputype(&self) -> u32;
    /// Header flags.
    fn flags(&self) -> u32;
    /// Number of load commands.
    fn ncmds(&self) -> u32;
    /// Total size of the load command table.
    fn sizeofcmds(&self) -> u32;

    /// Returns a copy accounting for one extra command of `cmdsize` bytes.
    ///
    /// Fails if either count would overflow.
    fn with_added_command(&self, cmdsize: u32) -> Result<Self>;
}

/// Segment command fields needed to locate its section headers.
pub trait SegmentFields: RawRecord {
    /// Number of section headers following the command.
    fn nsects(&self) -> u32;
    /// Segment name.
    fn segment_name(&self) -> &str;
}

/// Section header fields needed to locate file-backed data.
pub trait SectionFields: RawRecord + fmt::Display {
    /// File offset of the section data, 0 when the section has no file backing.
    fn file_offset(&self) -> u32;
}

/// Describes one Mach-O record layout.
pub trait MachOLayout: 'static {
    /// Mach header type.
    type Header: HeaderFields;
    /// Segment command type.
    type Segment: SegmentFields;
    /// Section header type.
    type Section: SectionFields;

    /// Alignment unit for load command sizes.
    const ALIGN: u32;
    /// Load command tag of this layout's segment command.
    const SEGMENT_CMD: u32;
    /// Format detected for this layout.
    const FORMAT: MachOFormat;
}

/// Marker for the 32-bit layout.
#[derive(Debug, Clone, Copy)]
pub struct MachO32;

/// Marker for the 64-bit layout.
#[derive(Debug, Clone, Copy)]
pub struct MachO64;

impl MachOLayout for MachO32 {
    type Header = MachHeader32;
    type Segment = SegmentCommand32;
    type Section = Section32;

    const ALIGN: u32 = 4;
    const SEGMENT_CMD: u32 = LC_SEGMENT;
    const FORMAT: MachOFormat = MachOFormat::MachO32;
}

impl MachOLayout for MachO64 {
    type Header = MachHeader64;
    type Segment = SegmentCommand64;
    type Section = Section64;

    const ALIGN: u32 = 8;
    const SEGMENT_CMD: u32 = LC_SEGMENT_64;
    const FORMAT: MachOFormat = MachOFormat::MachO64;
}

macro_rules! impl_header_fields {
    ($ty:ty) => {
        impl HeaderFields for $ty {
            #[inline]
            fn filetype(&self) -> u32 {
                self.filetype
            }
            #[inline]
            fn cputype(&self) -> u32 {
                self.cputype
            }
            #[inline]
            fn flags(&self) -> u32 {
                self.flags
            }
            #[inline]
            fn ncmds(&self) -> u32 {
                self.ncmds
            }
            #[inline]
            fn sizeofcmds(&self) -> u32 {
                self.sizeofcmds
            }

            fn with_added_command(&self, cmdsize: u32) -> Result<Self> {
                let mut header = *self;
                header.ncmds = self
                    .ncmds
                    .checked_add(1)
                    .ok_or_else(|| Error::parse(0, "ncmds overflows"))?;
                header.sizeofcmds = self.sizeofcmds.checked_add(cmdsize).ok_or_else(|| {
                    Error::parse(
                        0,
                        format!("sizeofcmds {:#x} + {:#x} overflows", self.sizeofcmds, cmdsize),
                    )
                })?;
                Ok(header)
            }
        }
    };
}

impl_header_fields!(MachHeader32);
impl_header_fields!(MachHeader64);

impl SegmentFields for SegmentCommand32 {
    #[inline]
    fn nsects(&self) -> u32 {
        self.nsects
    }

    fn segment_name(&self) -> &str {
        self.name()
    }
}

impl SegmentFields for SegmentCommand64 {
    #[inline]
    fn nsects(&self) -> u32 {
        self.nsects
    }

    fn segment_name(&self) -> &str {
        self.name()
    }
}

impl SectionFields for Section32 {
    #[inline]
    fn file_offset(&self) -> u32 {
        self.offset
    }
}

impl SectionFields for Section64 {
    #[inline]
    fn file_offset(&self) -> u32 {
        self.offset
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// The thin Mach-O formats this crate can patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachOFormat {
    /// 32-bit Mach-O (`MH_MAGIC`)
    MachO32,
    /// 64-bit Mach-O (`MH_MAGIC_64`)
    MachO64,
}

impl MachOFormat {
    /// Selects the layout from the magic number at offset 0.
    pub fn detect(magic: u32) -> Result<Self> {
        match magic {
            MH_MAGIC => Ok(MachOFormat::MachO32),
            MH_MAGIC_64 => Ok(MachOFormat::MachO64),
            MH_CIGAM | MH_CIGAM_64 => Err(Error::UnsupportedByteOrder(magic)),
            FAT_MAGIC | FAT_CIGAM => Err(Error::FatBinary),
            _ => Err(Error::InvalidMachoMagic(magic)),
        }
    }

    /// Returns the load command alignment unit.
    pub fn alignment(&self) -> u32 {
        match self {
            MachOFormat::MachO32 => MachO32::ALIGN,
            MachOFormat::MachO64 => MachO64::ALIGN,
        }
    }
}

impl fmt::Display for MachOFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachOFormat::MachO32 => write!(f, "Mach-O 32-bit"),
            MachOFormat::MachO64 => write!(f, "Mach-O 64-bit"),
        }
    }
}
