//! Construction of the new dylib load command.

use zerocopy::IntoBytes;

use super::name::EXECUTABLE_PATH_PREFIX;
use crate::macho::{
    Dylib, DylibCommand, MachOLayout, RawRecord, LC_LOAD_DYLIB, LC_LOAD_WEAK_DYLIB,
};
use crate::util::align_up;

/// Timestamp written into generated commands; dyld ignores it.
pub const DYLIB_TIMESTAMP: u32 = 2;

/// Which load command tag the injected library gets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadKind {
    /// `LC_LOAD_DYLIB`: launch fails if the library is missing.
    #[default]
    Load,
    /// `LC_LOAD_WEAK_DYLIB`: a missing library is tolerated.
    Weak,
}

impl LoadKind {
    /// Returns the load command tag.
    pub fn cmd(self) -> u32 {
        match self {
            LoadKind::Load => LC_LOAD_DYLIB,
            LoadKind::Weak => LC_LOAD_WEAK_DYLIB,
        }
    }
}

/// A dylib command ready to be spliced into the command table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDylibCommand {
    /// Fixed part of the command
    pub command: DylibCommand,
    /// Install path including its terminating null byte
    pub path: Vec<u8>,
}

impl NewDylibCommand {
    /// Builds an `@executable_path/<name>` command for layout `L`.
    ///
    /// The path starts right after the fixed fields, which are 4-byte words in
    /// both layouts; only the padding of `cmdsize` depends on `L::ALIGN`.
    pub fn build<L: MachOLayout>(dylib_name: &str, kind: LoadKind) -> Self {
        let mut path = format!("{EXECUTABLE_PATH_PREFIX}{dylib_name}").into_bytes();
        path.push(0);

        let name_offset = DylibCommand::SIZE as u32;
        let cmdsize = name_offset + align_up(path.len() as u32, L::ALIGN);

        Self {
            command: DylibCommand {
                cmd: kind.cmd(),
                cmdsize,
                dylib: Dylib {
                    name_offset,
                    timestamp: DYLIB_TIMESTAMP,
                    current_version: 0,
                    compatibility_version: 0,
                },
            },
            path,
        }
    }

    /// Total size of the command including padding.
    #[inline]
    pub fn cmdsize(&self) -> u32 {
        self.command.cmdsize
    }

    /// Returns the install path without its null terminator.
    pub fn install_name(&self) -> String {
        String::from_utf8_lossy(&self.path[..self.path.len() - 1]).into_owned()
    }

    /// Fixed fields followed by the path bytes; padding is not included.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.cmdsize() as usize);
        bytes.extend_from_slice(self.command.as_bytes());
        bytes.extend_from_slice(&self.path);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::{MachO32, MachO64};

    #[test]
    fn test_build_64bit() {
        let cmd = NewDylibCommand::build::<MachO64>("a.dylib", LoadKind::Load);

        // "@executable_path/a.dylib\0" is 25 bytes, padded to 32
        assert_eq!(cmd.path, b"@executable_path/a.dylib\0");
        assert_eq!(cmd.command.cmd, LC_LOAD_DYLIB);
        assert_eq!(cmd.command.dylib.name_offset, 24);
        assert_eq!(cmd.cmdsize(), 24 + 32);
        assert_eq!(cmd.command.dylib.timestamp, 2);
        assert_eq!(cmd.command.dylib.current_version, 0);
        assert_eq!(cmd.command.dylib.compatibility_version, 0);
        assert_eq!(cmd.install_name(), "@executable_path/a.dylib");
    }

    #[test]
    fn test_build_32bit_alignment() {
        let cmd = NewDylibCommand::build::<MachO32>("a.dylib", LoadKind::Load);
        assert_eq!(cmd.cmdsize(), 24 + 28);
        assert_eq!(cmd.cmdsize() % 4, 0);
    }

    #[test]
    fn test_build_weak() {
        let cmd = NewDylibCommand::build::<MachO64>("ab.dylib", LoadKind::Weak);
        assert_eq!(cmd.command.cmd, LC_LOAD_WEAK_DYLIB);
        assert_eq!(cmd.cmdsize() % 8, 0);
    }

    #[test]
    fn test_encode_layout() {
        let cmd = NewDylibCommand::build::<MachO64>("a.dylib", LoadKind::Load);
        let bytes = cmd.encode();

        assert_eq!(bytes.len(), 24 + 25);
        assert_eq!(&bytes[..4], &LC_LOAD_DYLIB.to_ne_bytes());
        assert_eq!(&bytes[4..8], &56u32.to_ne_bytes());
        assert_eq!(&bytes[8..12], &24u32.to_ne_bytes());
        assert_eq!(&bytes[24..], b"@executable_path/a.dylib\0");
    }
}
