//! Metadata snapshot of a Mach-O file.
//!
//! The snapshot is read once at the start of a run and never mutated; every
//! later decision reads from it while the file itself is the only mutable
//! state.

use std::fmt;

use tracing::{debug, warn};

use super::layout::*;
use super::reader::{Record, RecordReader};
use super::structs::*;
use crate::error::{Error, Result};

/// Header, load commands and section headers of one thin Mach-O.
pub struct MachOInfo<L: MachOLayout> {
    /// The Mach-O header at offset 0
    pub header: Record<L::Header>,
    /// Load commands in table order
    pub commands: Vec<Record<LoadCommand>>,
    /// Section headers of all segment commands, in table order
    pub sections: Vec<Record<L::Section>>,
}

impl<L: MachOLayout> MachOInfo<L> {
    /// Walks the header and load command table once.
    ///
    /// Offsets computed from `cmdsize` and `nsects` are not checked against
    /// the file size; reads past the end surface as I/O errors.
    pub fn read<R: RecordReader>(reader: &mut R) -> Result<Self> {
        let header: Record<L::Header> = reader.read_record(0)?;
        let ncmds = header.value.ncmds();
        debug!(
            "{}: {} load commands, {:#x} bytes",
            L::FORMAT,
            ncmds,
            header.value.sizeofcmds()
        );

        // ncmds is untrusted; grow as commands are actually read
        let mut commands = Vec::new();
        let mut sections = Vec::new();
        let mut offset = header.end_offset();

        for _ in 0..ncmds {
            let command: Record<LoadCommand> = reader.read_record(offset)?;
            if (command.value.cmdsize as usize) < LoadCommand::SIZE {
                return Err(Error::parse(
                    offset,
                    format!("load command size {} is too small", command.value.cmdsize),
                ));
            }

            if command.value.cmd == L::SEGMENT_CMD {
                let segment: Record<L::Segment> = reader.read_record(offset)?;
                debug!(
                    "segment {} at {:#x}, {} sections",
                    segment.value.segment_name(),
                    offset,
                    segment.value.nsects()
                );
                let mut section_offset = segment.end_offset();

                for _ in 0..segment.value.nsects() {
                    let section: Record<L::Section> = reader.read_record(section_offset)?;
                    debug!("  {} at {:#x}", section.value, section_offset);
                    section_offset = section.end_offset();
                    sections.push(section);
                }
            }

            offset += command.value.cmdsize as u64;
            commands.push(command);
        }

        let info = Self {
            header,
            commands,
            sections,
        };
        let sizeofcmds = info.header.value.sizeofcmds();
        if info.commands_size() != sizeofcmds as u64 {
            warn!(
                "sizeofcmds is {:#x} but the commands span {:#x} bytes",
                sizeofcmds,
                info.commands_size()
            );
        }

        Ok(info)
    }

    /// Returns the commands that make dyld load a library (load, weak, re-export).
    pub fn dylib_commands(&self) -> impl Iterator<Item = &Record<LoadCommand>> {
        self.commands.iter().filter(|c| c.value.is_dylib_dependency())
    }

    /// Returns the offset one past the last byte of the command table.
    ///
    /// Falls back to the end of the header for an empty table.
    pub fn command_table_end(&self) -> u64 {
        self.commands
            .iter()
            .map(command_end)
            .max()
            .unwrap_or_else(|| self.header.end_offset())
    }

    /// Returns the file offset of the first section with file-backed data.
    pub fn data_region_start(&self) -> Option<u64> {
        self.sections
            .iter()
            .map(|s| s.value.file_offset())
            .find(|&offset| offset != 0)
            .map(u64::from)
    }

    /// Returns the sum of all command sizes.
    pub fn commands_size(&self) -> u64 {
        self.commands.iter().map(|c| c.value.cmdsize as u64).sum()
    }
}

/// Reads a dylib command and the path stored inside it.
///
/// The path is bounded by the command's own size; a name offset past the end
/// of the command yields an empty path.
pub fn read_dylib_path<R: RecordReader>(
    reader: &mut R,
    command: &Record<LoadCommand>,
) -> Result<(DylibCommand, String)> {
    let dylib = reader.read_record::<DylibCommand>(command.offset)?.value;
    let name_offset = dylib.dylib.name_offset;
    if name_offset >= dylib.cmdsize {
        warn!(
            "dylib command at {:#x} has name offset {} past its size {}",
            command.offset, name_offset, dylib.cmdsize
        );
    }
    let max_len = dylib.cmdsize.saturating_sub(name_offset) as usize;
    let path = reader.read_cstring_at(command.offset + name_offset as u64, max_len)?;
    Ok((dylib, path))
}

/// Returns the offset one past the last byte of a load command.
#[inline]
pub fn command_end(command: &Record<LoadCommand>) -> u64 {
    command.offset + command.value.cmdsize as u64
}

impl<L: MachOLayout> fmt::Debug for MachOInfo<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachOInfo")
            .field("format", &L::FORMAT)
            .field("header", &self.header)
            .field("commands", &self.commands)
            .field("sections", &self.sections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use zerocopy::IntoBytes;

    use super::*;
    use crate::fixture::ImageBuilder;
    use crate::inject::resolve_dylib_name;
    use crate::macho::*;

    #[test]
    fn test_read_64bit_snapshot() {
        let image = ImageBuilder::new64(0x2000)
            .dylib(LC_LOAD_DYLIB, "/usr/lib/libSystem.B.dylib")
            .segment("__TEXT", &[("__text", 0x1000), ("__stubs", 0x1800)])
            .dylib(LC_LOAD_WEAK_DYLIB, "/usr/lib/libobjc.A.dylib")
            .build();

        let info = MachOInfo::<MachO64>::read(&mut Cursor::new(image)).unwrap();

        assert_eq!(info.header.offset, 0);
        assert_eq!(info.commands.len(), 3);
        assert_eq!(info.commands[0].offset, MachHeader64::SIZE as u64);
        for pair in info.commands.windows(2) {
            assert_eq!(pair[1].offset, command_end(&pair[0]));
        }
        assert_eq!(info.commands_size(), info.header.value.sizeofcmds as u64);

        assert_eq!(info.sections.len(), 2);
        let seg_offset = info.commands[1].offset;
        assert_eq!(
            info.sections[0].offset,
            seg_offset + SegmentCommand64::SIZE as u64
        );
        assert_eq!(
            info.sections[1].offset,
            info.sections[0].offset + Section64::SIZE as u64
        );
        assert_eq!(info.data_region_start(), Some(0x1000));
        assert_eq!(info.dylib_commands().count(), 2);
        assert_eq!(info.command_table_end(), command_end(&info.commands[2]));
    }

    #[test]
    fn test_read_32bit_snapshot() {
        let image = ImageBuilder::new32(0x1000)
            .segment("__TEXT", &[("__text", 0x800)])
            .dylib(LC_LOAD_DYLIB, "/usr/lib/libSystem.B.dylib")
            .build();

        let info = MachOInfo::<MachO32>::read(&mut Cursor::new(image)).unwrap();

        assert_eq!(info.commands.len(), 2);
        assert_eq!(info.commands[0].offset, MachHeader32::SIZE as u64);
        assert_eq!(info.sections.len(), 1);
        assert_eq!(
            info.sections[0].offset,
            (MachHeader32::SIZE + SegmentCommand32::SIZE) as u64
        );
        assert_eq!(info.data_region_start(), Some(0x800));
    }

    #[test]
    fn test_zero_offset_sections_are_skipped() {
        let image = ImageBuilder::new64(0x2000)
            .segment("__PAGEZERO", &[])
            .segment("__DATA", &[("__bss", 0), ("__data", 0x1400)])
            .build();

        let info = MachOInfo::<MachO64>::read(&mut Cursor::new(image)).unwrap();
        assert_eq!(info.sections.len(), 2);
        assert_eq!(info.data_region_start(), Some(0x1400));
    }

    #[test]
    fn test_truncated_command_table() {
        let mut image = ImageBuilder::new64(0x1000)
            .dylib(LC_LOAD_DYLIB, "/usr/lib/libSystem.B.dylib")
            .build();
        image.truncate(MachHeader64::SIZE + 4);

        let err = MachOInfo::<MachO64>::read(&mut Cursor::new(image)).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_undersized_command_rejected() {
        let image = ImageBuilder::new64(0x1000).raw_command(LC_UUID, 4).build();

        let err = MachOInfo::<MachO64>::read(&mut Cursor::new(image)).unwrap_err();
        assert!(matches!(err, Error::Parse { offset: 32, .. }));
    }

    #[test]
    fn test_huge_command_count_is_short_read() {
        let header = MachHeader64 {
            ncmds: u32::MAX,
            sizeofcmds: u32::MAX,
            ..Default::default()
        };
        let mut cursor = Cursor::new(header.as_bytes().to_vec());

        let err = MachOInfo::<MachO64>::read(&mut cursor).unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_name_offset_past_command_is_empty_path() {
        let image = ImageBuilder::new64(0x1000)
            .raw_command(LC_LOAD_DYLIB, DylibCommand::SIZE as u32)
            .segment("__TEXT", &[("__text", 0x800)])
            .build();
        let mut cursor = Cursor::new(image);
        let info = MachOInfo::<MachO64>::read(&mut cursor).unwrap();

        // name_offset == cmdsize == 24
        let lc = info.commands[0];
        let mut dylib = DylibCommand {
            cmd: LC_LOAD_DYLIB,
            cmdsize: DylibCommand::SIZE as u32,
            dylib: Dylib::default(),
        };
        dylib.dylib.name_offset = DylibCommand::SIZE as u32;
        cursor.write_bytes_at(lc.offset, dylib.as_bytes()).unwrap();

        let (read, path) = read_dylib_path(&mut cursor, &lc).unwrap();
        assert_eq!(read, dylib);
        assert_eq!(path, "");
        assert_eq!(resolve_dylib_name(&mut cursor, &info).unwrap(), "a.dylib");
    }

    #[test]
    fn test_sizeofcmds_mismatch_is_tolerated() {
        let mut image = ImageBuilder::new64(0x1000)
            .dylib(LC_LOAD_DYLIB, "/usr/lib/libSystem.B.dylib")
            .segment("__TEXT", &[("__text", 0x800)])
            .build();
        // sizeofcmds
        image[20..24].copy_from_slice(&0x10u32.to_ne_bytes());

        let info = MachOInfo::<MachO64>::read(&mut Cursor::new(image)).unwrap();
        assert_eq!(info.commands.len(), 2);
        assert_ne!(info.commands_size(), 0x10);
        assert_eq!(
            info.command_table_end(),
            MachHeader64::SIZE as u64 + info.commands_size()
        );
    }
}
