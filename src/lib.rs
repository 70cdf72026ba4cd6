//! dylinject - Post-build dylib injection for Mach-O executables.
//!
//! This library patches an existing executable in place so that dyld loads an
//! additional library at startup. It synthesizes an `LC_LOAD_DYLIB` command
//! referencing `@executable_path/<name>`, picks a `<name>` that no existing
//! `@executable_path/` dependency uses, and splices the command into the
//! load command table using the slack space before the first section data.
//!
//! # Features
//!
//! - Thin 32-bit and 64-bit Mach-O files
//! - Deterministic, collision-free library names (`a.dylib`, `b.dylib`, ...)
//! - Single bounded splice write; bytes from the first section data onward are never touched
//! - Optional atomic mode that patches a temporary copy and renames it into place
//!
//! The code signature is not updated; re-sign the executable afterwards.
//!
//! # Example
//!
//! ```no_run
//! use dylinject::{inject_dylib, InjectOptions};
//!
//! fn main() -> dylinject::Result<()> {
//!     let injection = inject_dylib("MyApp.app/Contents/MacOS/MyApp", &InjectOptions::default())?;
//!
//!     // Place the library next to the executable under this name
//!     println!("install as {}", injection.dylib_name);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod inject;
pub mod inspect;
pub mod macho;
pub mod util;

#[cfg(test)]
mod fixture;

// Re-export main types
pub use error::{Error, Result};
pub use inject::{InjectOptions, Injection, LoadKind, WriteMode};
pub use inspect::Summary;
pub use macho::MachOFormat;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use inject::Workflow;
use macho::{MachO32, MachO64, MachOInfo, RecordReader};

/// Reads the magic number and selects the layout.
fn detect_format<R: RecordReader>(reader: &mut R) -> Result<MachOFormat> {
    let bytes = reader.read_bytes_at(0, 4)?;
    let magic = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    MachOFormat::detect(magic)
}

/// Injects a dylib load command into an executable on disk.
///
/// The file must already exist; it is opened for reading and writing and is
/// never created or truncated. Dry runs open it read-only.
///
/// # Returns
///
/// The [`Injection`] report, whose `dylib_name` is the file name the library
/// must be installed under in the executable's directory.
pub fn inject_dylib<P: AsRef<Path>>(path: P, options: &InjectOptions) -> Result<Injection> {
    let path = path.as_ref();

    if options.dry_run {
        let mut file = File::open(path).map_err(|e| Error::FileOpen {
            path: path.to_path_buf(),
            source: e,
        })?;
        return inject_dylib_into(&mut file, options);
    }

    match options.write_mode {
        WriteMode::InPlace => {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| Error::FileOpen {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            let injection = inject_dylib_into(&mut file, options)?;
            file.sync_all().map_err(|e| Error::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })?;
            Ok(injection)
        }
        WriteMode::Atomic => inject_via_shadow_copy(path, options),
    }
}

/// Patches a temporary copy in the executable's directory and renames it
/// over the original, which stays untouched until the rename.
fn inject_via_shadow_copy(path: &Path, options: &InjectOptions) -> Result<Injection> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut original = File::open(path).map_err(|e| Error::FileOpen {
        path: path.to_path_buf(),
        source: e,
    })?;
    let permissions = original.metadata()?.permissions();

    let write_err = |e: io::Error| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    };

    let mut shadow = NamedTempFile::new_in(dir).map_err(write_err)?;
    io::copy(&mut original, shadow.as_file_mut()).map_err(write_err)?;
    drop(original);

    let injection = inject_dylib_into(shadow.as_file_mut(), options)?;

    shadow.as_file().sync_all().map_err(write_err)?;
    fs::set_permissions(shadow.path(), permissions).map_err(write_err)?;
    shadow.persist(path).map_err(|e| write_err(e.error))?;
    info!("replaced {} atomically", path.display());

    Ok(injection)
}

/// Injects a dylib load command into a Mach-O held in any seekable stream.
pub fn inject_dylib_into<F: Read + Write + Seek>(
    file: &mut F,
    options: &InjectOptions,
) -> Result<Injection> {
    let format = detect_format(file)?;
    info!(
        "detected {} ({}-byte command alignment)",
        format,
        format.alignment()
    );

    match format {
        MachOFormat::MachO32 => Workflow::<MachO32>::new(options.clone()).run(file),
        MachOFormat::MachO64 => Workflow::<MachO64>::new(options.clone()).run(file),
    }
}

/// Summarizes the load command area of an executable on disk.
pub fn inspect<P: AsRef<Path>>(path: P) -> Result<Summary> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| Error::FileOpen {
        path: path.to_path_buf(),
        source: e,
    })?;
    inspect_stream(&mut file)
}

/// Summarizes the load command area of a Mach-O held in a seekable stream.
pub fn inspect_stream<R: Read + Seek>(reader: &mut R) -> Result<Summary> {
    match detect_format(reader)? {
        MachOFormat::MachO32 => {
            let info = MachOInfo::<MachO32>::read(reader)?;
            Summary::from_info(reader, &info)
        }
        MachOFormat::MachO64 => {
            let info = MachOInfo::<MachO64>::read(reader)?;
            Summary::from_info(reader, &info)
        }
    }
}
