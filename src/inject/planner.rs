//! Insertion point and slack space calculation.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::macho::{command_end, MachOInfo, MachOLayout};

/// Where the new command goes and how much room there is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionPlan {
    /// Offset the new command is written at
    pub insert_offset: u64,
    /// End of the existing command table
    pub table_end: u64,
    /// First byte of file-backed section data
    pub data_start: u64,
    /// Size of the new command
    pub command_size: u64,
}

impl InsertionPlan {
    /// Computes the plan for a command of `command_size` bytes.
    ///
    /// The command goes right after the last `LC_LOAD_DYLIB` /
    /// `LC_LOAD_WEAK_DYLIB`, or at the end of the table when there is none.
    /// Fails when the slack between the table end and the first section data
    /// cannot hold it; the table is never grown by moving segment data.
    pub fn compute<L: MachOLayout>(info: &MachOInfo<L>, command_size: u32) -> Result<Self> {
        let table_end = info.command_table_end();
        let insert_offset = info
            .commands
            .iter()
            .filter(|c| c.value.is_dylib_load())
            .map(command_end)
            .max()
            .unwrap_or(table_end);
        let data_start = info.data_region_start().ok_or(Error::NoDataRegion)?;

        let plan = Self {
            insert_offset,
            table_end,
            data_start,
            command_size: command_size as u64,
        };
        debug!(
            "insert at {:#x}, table end {:#x}, data at {:#x}, slack {:#x}",
            plan.insert_offset,
            plan.table_end,
            plan.data_start,
            plan.slack()
        );

        if plan.data_start < plan.table_end {
            warn!(
                "section data at {:#x} starts inside the command table (ends {:#x})",
                plan.data_start, plan.table_end
            );
        }

        if plan.slack() < plan.command_size {
            return Err(Error::InsufficientLoadCommandSpace {
                needed: plan.command_size,
                available: plan.slack(),
            });
        }

        Ok(plan)
    }

    /// Unused bytes between the command table and the first section data.
    #[inline]
    pub fn slack(&self) -> u64 {
        self.data_start.saturating_sub(self.table_end)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::fixture::ImageBuilder;
    use crate::macho::*;

    fn snapshot(image: Vec<u8>) -> MachOInfo<MachO64> {
        MachOInfo::read(&mut Cursor::new(image)).unwrap()
    }

    #[test]
    fn test_insert_after_last_dylib_load() {
        let info = snapshot(
            ImageBuilder::new64(0x2000)
                .segment("__TEXT", &[("__text", 0x1000)])
                .dylib(LC_LOAD_DYLIB, "/usr/lib/libSystem.B.dylib")
                .dylib(LC_LOAD_WEAK_DYLIB, "/usr/lib/libobjc.A.dylib")
                .dylib(LC_REEXPORT_DYLIB, "/usr/lib/libc++.1.dylib")
                .raw_command(LC_UUID, 24)
                .build(),
        );

        let plan = InsertionPlan::compute(&info, 56).unwrap();
        assert_eq!(plan.insert_offset, command_end(&info.commands[2]));
        assert_eq!(plan.table_end, command_end(&info.commands[4]));
        assert_eq!(plan.data_start, 0x1000);
        assert_eq!(plan.slack(), 0x1000 - plan.table_end);
    }

    #[test]
    fn test_no_dylib_appends_to_table() {
        let info = snapshot(
            ImageBuilder::new64(0x2000)
                .segment("__TEXT", &[("__text", 0x1000)])
                .raw_command(LC_UUID, 24)
                .build(),
        );

        let plan = InsertionPlan::compute(&info, 56).unwrap();
        assert_eq!(plan.insert_offset, plan.table_end);
    }

    #[test]
    fn test_insufficient_slack() {
        let info = snapshot(
            ImageBuilder::new64(0x200)
                .dylib(LC_LOAD_DYLIB, "/usr/lib/libSystem.B.dylib")
                .segment("__TEXT", &[("__text", 0x100)])
                .build(),
        );
        let table_end = info.command_table_end();
        let available = 0x100 - table_end;

        let err = InsertionPlan::compute(&info, available as u32 + 8).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientLoadCommandSpace { needed, available: a }
                if needed == available + 8 && a == available
        ));
        assert!(err.is_layout_error());

        // Exactly fitting is fine.
        assert!(InsertionPlan::compute(&info, available as u32).is_ok());
    }

    #[test]
    fn test_data_before_table_end_has_no_slack() {
        let info = snapshot(
            ImageBuilder::new64(0x1000)
                .segment("__TEXT", &[("__text", 0x40)])
                .build(),
        );

        let err = InsertionPlan::compute(&info, 8).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientLoadCommandSpace { available: 0, .. }
        ));
    }

    #[test]
    fn test_no_data_region() {
        let info = snapshot(
            ImageBuilder::new64(0x1000)
                .segment("__PAGEZERO", &[])
                .segment("__DATA", &[("__bss", 0)])
                .build(),
        );

        let err = InsertionPlan::compute(&info, 56).unwrap_err();
        assert!(matches!(err, Error::NoDataRegion));
    }
}
