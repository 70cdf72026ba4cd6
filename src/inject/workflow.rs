//! The injection run.

use std::fmt;
use std::io::{Read, Seek, Write};
use std::marker::PhantomData;

use tracing::{debug, info};

use super::command::{LoadKind, NewDylibCommand};
use super::name::resolve_dylib_name;
use super::patcher::patch;
use super::planner::InsertionPlan;
use crate::error::Result;
use crate::macho::{MachOFormat, MachOInfo, MachOLayout};

/// How the patched bytes reach the file on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Patch the executable in place. A failure between the splice and the
    /// header write leaves the file inconsistent.
    #[default]
    InPlace,
    /// Patch a temporary copy next to the executable and rename it over the
    /// original once both writes succeeded.
    Atomic,
}

/// Options for an injection run.
#[derive(Debug, Clone, Default)]
pub struct InjectOptions {
    /// Load command tag for the new library
    pub kind: LoadKind,
    /// How the file is written
    pub write_mode: WriteMode,
    /// Stop after planning; nothing is written
    pub dry_run: bool,
}

impl InjectOptions {
    /// Sets the load kind.
    pub fn with_kind(mut self, kind: LoadKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the write mode.
    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    /// Enables or disables dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Result of an injection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    /// Detected format
    pub format: MachOFormat,
    /// File name the library must be installed under, next to the executable
    pub dylib_name: String,
    /// Path recorded in the load command (`@executable_path/<dylib_name>`)
    pub install_name: String,
    /// Offset the command was (or would be) written at
    pub insert_offset: u64,
    /// Size of the new command
    pub command_size: u32,
    /// Slack space before the run
    pub slack_before: u64,
    /// False for dry runs
    pub written: bool,
}

/// Steps of a run, in order. Any failure aborts the remaining steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Build the metadata snapshot
    Read,
    /// Choose a non-conflicting library name
    ResolveName,
    /// Build the new load command
    BuildCommand,
    /// Choose the insertion point and check slack
    Plan,
    /// Splice the command and rewrite the header
    Patch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Read => "read",
            Stage::ResolveName => "resolve name",
            Stage::BuildCommand => "build command",
            Stage::Plan => "plan",
            Stage::Patch => "patch",
        };
        f.write_str(name)
    }
}

/// A run over one file for layout `L`.
#[derive(Debug)]
pub struct Workflow<L: MachOLayout> {
    options: InjectOptions,
    _layout: PhantomData<L>,
}

impl<L: MachOLayout> Workflow<L> {
    /// Creates a workflow with the given options.
    pub fn new(options: InjectOptions) -> Self {
        Self {
            options,
            _layout: PhantomData,
        }
    }

    /// Runs every stage against `file`.
    pub fn run<F: Read + Write + Seek>(&self, file: &mut F) -> Result<Injection> {
        debug!("stage: {}", Stage::Read);
        let info = MachOInfo::<L>::read(file)?;

        debug!("stage: {}", Stage::ResolveName);
        let dylib_name = resolve_dylib_name(file, &info)?;

        debug!("stage: {}", Stage::BuildCommand);
        let command = NewDylibCommand::build::<L>(&dylib_name, self.options.kind);

        debug!("stage: {}", Stage::Plan);
        let plan = InsertionPlan::compute(&info, command.cmdsize())?;

        let mut injection = Injection {
            format: L::FORMAT,
            dylib_name,
            install_name: command.install_name(),
            insert_offset: plan.insert_offset,
            command_size: command.cmdsize(),
            slack_before: plan.slack(),
            written: false,
        };

        if self.options.dry_run {
            info!(
                "dry run: would insert {} ({:#x} bytes) at {:#x}",
                injection.install_name, injection.command_size, injection.insert_offset
            );
            return Ok(injection);
        }

        debug!("stage: {}", Stage::Patch);
        patch(file, &info, &plan, &command)?;
        file.flush()?;

        injection.written = true;
        info!(
            "inserted {} at {:#x}",
            injection.install_name, injection.insert_offset
        );
        Ok(injection)
    }
}
