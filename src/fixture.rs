//! Synthetic Mach-O images for unit tests.

use zerocopy::IntoBytes;

use crate::macho::*;
use crate::util::align_up;

/// Byte stored at `offset` in the data region of a built image.
pub fn data_byte(offset: usize) -> u8 {
    (offset % 251) as u8 | 1
}

/// Builds a thin Mach-O image: header, load commands, zeroed slack, then a
/// recognizable byte pattern from the first file-backed section onward.
pub struct ImageBuilder {
    is_64: bool,
    file_size: usize,
    commands: Vec<Vec<u8>>,
    data_start: Option<usize>,
}

impl ImageBuilder {
    pub fn new64(file_size: usize) -> Self {
        Self {
            is_64: true,
            file_size,
            commands: Vec::new(),
            data_start: None,
        }
    }

    pub fn new32(file_size: usize) -> Self {
        Self {
            is_64: false,
            ..Self::new64(file_size)
        }
    }

    fn align(&self) -> u32 {
        if self.is_64 {
            8
        } else {
            4
        }
    }

    /// Adds a dylib command of kind `cmd` referencing `path`.
    pub fn dylib(mut self, cmd: u32, path: &str) -> Self {
        let path_len = path.len() as u32 + 1;
        let cmdsize = DylibCommand::SIZE as u32 + align_up(path_len, self.align());
        let command = DylibCommand {
            cmd,
            cmdsize,
            dylib: Dylib {
                name_offset: DylibCommand::SIZE as u32,
                timestamp: 2,
                current_version: 0x10000,
                compatibility_version: 0x10000,
            },
        };

        let mut bytes = command.as_bytes().to_vec();
        bytes.extend_from_slice(path.as_bytes());
        bytes.resize(cmdsize as usize, 0);
        self.commands.push(bytes);
        self
    }

    /// Adds a segment command with one section per `(name, file_offset)`.
    pub fn segment(mut self, name: &str, sections: &[(&str, u32)]) -> Self {
        for &(_, offset) in sections {
            if offset != 0 && self.data_start.is_none() {
                self.data_start = Some(offset as usize);
            }
        }

        let bytes = if self.is_64 {
            let mut seg = SegmentCommand64::default();
            seg.set_name(name);
            seg.nsects = sections.len() as u32;
            seg.cmdsize = (SegmentCommand64::SIZE + sections.len() * Section64::SIZE) as u32;
            let mut bytes = seg.as_bytes().to_vec();
            for &(sectname, offset) in sections {
                let mut sect = Section64::default();
                sect.set_names(name, sectname);
                sect.offset = offset;
                bytes.extend_from_slice(sect.as_bytes());
            }
            bytes
        } else {
            let mut seg = SegmentCommand32::default();
            seg.set_name(name);
            seg.nsects = sections.len() as u32;
            seg.cmdsize = (SegmentCommand32::SIZE + sections.len() * Section32::SIZE) as u32;
            let mut bytes = seg.as_bytes().to_vec();
            for &(sectname, offset) in sections {
                let mut sect = Section32::default();
                sect.set_names(name, sectname);
                sect.offset = offset;
                bytes.extend_from_slice(sect.as_bytes());
            }
            bytes
        };

        self.commands.push(bytes);
        self
    }

    /// Adds an opaque command declaring `cmdsize` bytes.
    pub fn raw_command(mut self, cmd: u32, cmdsize: u32) -> Self {
        let mut bytes = LoadCommand { cmd, cmdsize }.as_bytes().to_vec();
        bytes.resize((cmdsize as usize).max(LoadCommand::SIZE), 0);
        self.commands.push(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let ncmds = self.commands.len() as u32;
        let sizeofcmds = self.commands.iter().map(Vec::len).sum::<usize>() as u32;

        let mut data = if self.is_64 {
            MachHeader64 {
                cputype: CPU_TYPE_ARM64,
                filetype: MH_EXECUTE,
                ncmds,
                sizeofcmds,
                flags: (MachOFlags::PIE | MachOFlags::DYLDLINK).bits(),
                ..Default::default()
            }
            .as_bytes()
            .to_vec()
        } else {
            MachHeader32 {
                cputype: CPU_TYPE_X86,
                filetype: MH_EXECUTE,
                ncmds,
                sizeofcmds,
                flags: MachOFlags::DYLDLINK.bits(),
                ..Default::default()
            }
            .as_bytes()
            .to_vec()
        };

        for command in &self.commands {
            data.extend_from_slice(command);
        }

        let table_end = data.len();
        data.resize(self.file_size.max(table_end), 0);
        if let Some(start) = self.data_start {
            for (offset, byte) in data.iter_mut().enumerate().skip(start.max(table_end)) {
                *byte = data_byte(offset);
            }
        }
        data
    }
}
