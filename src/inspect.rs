//! Read-only summary of a Mach-O's load command area.

use std::fmt;

use crate::error::Result;
use crate::macho::*;

/// One library dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DylibEntry {
    /// Load command tag
    pub cmd: u32,
    /// Offset of the command
    pub offset: u64,
    /// Install path
    pub path: String,
}

/// What an injection would work with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Detected format
    pub format: MachOFormat,
    /// CPU type from the header
    pub cputype: u32,
    /// File type from the header
    pub filetype: u32,
    /// Header flags
    pub flags: MachOFlags,
    /// Number of load commands
    pub ncmds: u32,
    /// Declared size of the command table
    pub sizeofcmds: u32,
    /// Library dependencies in table order
    pub dylibs: Vec<DylibEntry>,
    /// End of the command table
    pub table_end: u64,
    /// First file-backed section data, if any
    pub data_start: Option<u64>,
}

impl Summary {
    /// Builds the summary from a snapshot.
    pub fn from_info<L, R>(reader: &mut R, info: &MachOInfo<L>) -> Result<Self>
    where
        L: MachOLayout,
        R: RecordReader,
    {
        let mut dylibs = Vec::new();
        for command in info.dylib_commands() {
            let (dylib, path) = read_dylib_path(reader, command)?;
            dylibs.push(DylibEntry {
                cmd: dylib.cmd,
                offset: command.offset,
                path,
            });
        }

        let header = &info.header.value;
        Ok(Self {
            format: L::FORMAT,
            cputype: header.cputype(),
            filetype: header.filetype(),
            flags: MachOFlags::from_bits_truncate(header.flags()),
            ncmds: header.ncmds(),
            sizeofcmds: header.sizeofcmds(),
            dylibs,
            table_end: info.command_table_end(),
            data_start: info.data_region_start(),
        })
    }

    /// Unused bytes between the command table and the first section data.
    pub fn slack(&self) -> Option<u64> {
        self.data_start.map(|start| start.saturating_sub(self.table_end))
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Format:       {} ({})", self.format, arch_name(self.cputype))?;
        writeln!(f, "File type:    {}", file_type_name(self.filetype))?;
        writeln!(f, "Flags:        {:?}", self.flags)?;
        writeln!(f, "Commands:     {} ({:#x} bytes)", self.ncmds, self.sizeofcmds)?;
        writeln!(f, "Table end:    {:#x}", self.table_end)?;
        match (self.data_start, self.slack()) {
            (Some(start), Some(slack)) => {
                writeln!(f, "Data start:   {:#x}", start)?;
                writeln!(f, "Slack:        {:#x} bytes", slack)?;
            }
            _ => writeln!(f, "Data start:   none")?,
        }
        writeln!(f, "Dylibs:")?;
        for dylib in &self.dylibs {
            writeln!(
                f,
                "  {:#06x}  {:<20} {}",
                dylib.offset,
                load_command_name(dylib.cmd),
                dylib.path
            )?;
        }
        Ok(())
    }
}
