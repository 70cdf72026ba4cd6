//! Staged in-place splice of the new command.
//!
//! The splice is planned as a set of moves over the byte range
//! `[insert_offset, data_start)`, assembled in memory, and then issued as one
//! bounded write. Nothing at or after `data_start` is read into the write or
//! touched by it.

use std::ops::Range;

use tracing::{debug, info};

use super::command::NewDylibCommand;
use super::planner::InsertionPlan;
use crate::error::Result;
use crate::macho::{HeaderFields, MachOInfo, MachOLayout, Record, RecordReader, RecordWriter};

/// One copy of existing bytes to a new location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    /// Source range in the original file
    pub from: Range<u64>,
    /// Destination range in the patched file
    pub to: Range<u64>,
}

impl Move {
    /// Number of bytes moved.
    #[inline]
    pub fn len(&self) -> u64 {
        self.from.end - self.from.start
    }

    /// Returns true if the move copies nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The full description of the command table rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplicePlan {
    /// Start of the rewritten range
    pub offset: u64,
    /// Bytes moved within the rewritten range
    pub moves: Vec<Move>,
    /// New command bytes placed at `offset`; the rest of the command is zero padding
    pub head: Vec<u8>,
    /// Length of the rewritten range
    pub len: u64,
}

impl SplicePlan {
    /// Plans shifting everything from the insertion point up to the data
    /// region forward by the new command's size.
    ///
    /// The trailing `command_size` bytes before `data_start` are slack and
    /// fall off the end of the shifted range.
    pub fn new(plan: &InsertionPlan, command: &NewDylibCommand) -> Self {
        let size = plan.command_size;
        let shift = Move {
            from: plan.insert_offset..plan.data_start - size,
            to: plan.insert_offset + size..plan.data_start,
        };

        let moves = if shift.is_empty() { Vec::new() } else { vec![shift] };

        Self {
            offset: plan.insert_offset,
            moves,
            head: command.encode(),
            len: plan.data_start - plan.insert_offset,
        }
    }

    /// Reads the moved bytes and assembles the buffer to write.
    pub fn stage<R: RecordReader>(&self, reader: &mut R) -> Result<StagedWrite> {
        let mut buffer = vec![0u8; self.len as usize];

        for mv in &self.moves {
            let bytes = reader.read_bytes_at(mv.from.start, mv.len() as usize)?;
            let start = (mv.to.start - self.offset) as usize;
            buffer[start..start + bytes.len()].copy_from_slice(&bytes);
        }
        buffer[..self.head.len()].copy_from_slice(&self.head);

        Ok(StagedWrite {
            offset: self.offset,
            buffer,
        })
    }
}

/// An assembled buffer and the offset it belongs at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedWrite {
    /// Destination offset
    pub offset: u64,
    /// Bytes to write
    pub buffer: Vec<u8>,
}

impl StagedWrite {
    /// Issues the write.
    pub fn apply<W: RecordWriter>(&self, writer: &mut W) -> Result<()> {
        writer.write_bytes_at(self.offset, &self.buffer)
    }
}

/// Splices `command` into the table and rewrites the header.
///
/// The two writes are not atomic; a failure between them leaves the table
/// spliced under the old header.
pub fn patch<L, F>(
    file: &mut F,
    info: &MachOInfo<L>,
    plan: &InsertionPlan,
    command: &NewDylibCommand,
) -> Result<Record<L::Header>>
where
    L: MachOLayout,
    F: RecordReader + RecordWriter,
{
    let splice = SplicePlan::new(plan, command);
    for mv in &splice.moves {
        debug!(
            "move {:#x}..{:#x} -> {:#x}..{:#x}",
            mv.from.start, mv.from.end, mv.to.start, mv.to.end
        );
    }

    let header = Record::new(
        info.header.offset,
        info.header.value.with_added_command(command.cmdsize())?,
    );

    splice.stage(file)?.apply(file)?;
    file.write_record(&header)?;

    info!(
        "spliced {:#x} bytes at {:#x}; header now has {} commands, {:#x} bytes",
        command.cmdsize(),
        plan.insert_offset,
        header.value.ncmds(),
        header.value.sizeofcmds()
    );

    Ok(header)
}
