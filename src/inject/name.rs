//! Fresh dylib name selection.
//!
//! Only libraries referenced through `@executable_path/` can collide with the
//! library we place next to the executable, so those are the conflict set.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::macho::{read_dylib_path, MachOInfo, MachOLayout, RecordReader};

/// Path prefix resolved by dyld relative to the executable's directory.
pub const EXECUTABLE_PATH_PREFIX: &str = "@executable_path/";

/// Extension appended to generated names.
pub const DYLIB_EXTENSION: &str = ".dylib";

const ALPHABET_SIZE: u32 = 26;

/// Collects the file names already loaded via `@executable_path/`.
pub fn executable_relative_names<L, R>(
    reader: &mut R,
    info: &MachOInfo<L>,
) -> Result<HashSet<String>>
where
    L: MachOLayout,
    R: RecordReader,
{
    let mut names = HashSet::new();

    for command in info.dylib_commands() {
        let (_, path) = read_dylib_path(reader, command)?;
        debug!("dylib at {:#x}: {}", command.offset, path);

        if let Some(name) = path.strip_prefix(EXECUTABLE_PATH_PREFIX) {
            names.insert(name.to_string());
        }
    }

    Ok(names)
}

/// Encodes `index` in base 26 with lowercase letters, least-significant digit first.
///
/// `0` encodes as `"a"`; every other index has a non-`a` final letter, so the
/// encoding is injective.
pub fn candidate_stem(index: u32) -> String {
    if index == 0 {
        return "a".to_string();
    }

    let mut stem = String::new();
    let mut rest = index;
    while rest != 0 {
        stem.push(char::from(b'a' + (rest % ALPHABET_SIZE) as u8));
        rest /= ALPHABET_SIZE;
    }
    stem
}

/// Returns the `index`-th candidate file name.
pub fn candidate_name(index: u32) -> String {
    format!("{}{}", candidate_stem(index), DYLIB_EXTENSION)
}

/// Returns the first candidate not present in `taken`.
///
/// `taken.len() + 1` distinct candidates always contain a free one.
pub fn fresh_name(taken: &HashSet<String>) -> Result<String> {
    let attempts = taken.len() as u32 + 1;
    (0..attempts)
        .map(candidate_name)
        .find(|name| !taken.contains(name))
        .ok_or(Error::NameSpaceExhausted { attempts })
}

/// Picks a library file name no existing `@executable_path/` load uses.
pub fn resolve_dylib_name<L, R>(reader: &mut R, info: &MachOInfo<L>) -> Result<String>
where
    L: MachOLayout,
    R: RecordReader,
{
    let taken = executable_relative_names(reader, info)?;
    let name = fresh_name(&taken)?;
    debug!("{} names taken, picked {}", taken.len(), name);
    Ok(name)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::fixture::ImageBuilder;
    use crate::macho::*;

    fn taken(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_candidate_encoding() {
        assert_eq!(candidate_stem(0), "a");
        assert_eq!(candidate_stem(1), "b");
        assert_eq!(candidate_stem(25), "z");
        assert_eq!(candidate_stem(26), "ab");
        assert_eq!(candidate_stem(27), "bb");
        assert_eq!(candidate_stem(26 * 26), "aab");
        assert_eq!(candidate_name(2), "c.dylib");
    }

    #[test]
    fn test_fresh_name_empty() {
        assert_eq!(fresh_name(&HashSet::new()).unwrap(), "a.dylib");
    }

    #[test]
    fn test_fresh_name_skips_conflict() {
        assert_eq!(fresh_name(&taken(&["a.dylib"])).unwrap(), "b.dylib");
        assert_eq!(
            fresh_name(&taken(&["a.dylib", "c.dylib"])).unwrap(),
            "b.dylib"
        );
    }

    #[test]
    fn test_fresh_name_after_single_letters() {
        let all: HashSet<String> = (0..26).map(candidate_name).collect();
        assert_eq!(all.len(), 26);
        assert_eq!(fresh_name(&all).unwrap(), "ab.dylib");
    }

    #[test]
    fn test_fresh_name_never_collides() {
        let mut set = HashSet::new();
        for _ in 0..100 {
            let name = fresh_name(&set).unwrap();
            assert!(!set.contains(&name));
            set.insert(name);
        }
        assert_eq!(set.len(), 100);
    }

    #[test]
    fn test_unrelated_names_do_not_consume_candidates() {
        let set = taken(&["libfoo.dylib", "x.so"]);
        assert_eq!(fresh_name(&set).unwrap(), "a.dylib");
    }

    #[test]
    fn test_executable_relative_names() {
        let image = ImageBuilder::new64(0x1000)
            .dylib(LC_LOAD_DYLIB, "/usr/lib/libSystem.B.dylib")
            .dylib(LC_LOAD_DYLIB, "@executable_path/a.dylib")
            .dylib(LC_LOAD_WEAK_DYLIB, "@executable_path/b.dylib")
            .dylib(LC_REEXPORT_DYLIB, "@executable_path/Frameworks/c.dylib")
            .dylib(LC_ID_DYLIB, "@executable_path/d.dylib")
            .dylib(LC_LOAD_DYLIB, "@rpath/e.dylib")
            .segment("__TEXT", &[("__text", 0x800)])
            .build();
        let mut cursor = Cursor::new(image);
        let info = MachOInfo::<MachO64>::read(&mut cursor).unwrap();

        let names = executable_relative_names(&mut cursor, &info).unwrap();
        assert_eq!(names, taken(&["a.dylib", "b.dylib", "Frameworks/c.dylib"]));
        assert_eq!(resolve_dylib_name(&mut cursor, &info).unwrap(), "c.dylib");
    }
}
