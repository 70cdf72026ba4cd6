//! Dylib injection into the load command table.
//!
//! # Pipeline
//!
//! A run is a strict sequence with no retries:
//!
//! 1. **Read** - Snapshot the header, load commands and section headers
//! 2. **Resolve Name** - Pick a library name no `@executable_path/` load uses
//! 3. **Build Command** - Synthesize the `LC_LOAD_DYLIB` record
//! 4. **Plan** - Choose the insertion point and check the slack space
//! 5. **Patch** - Shift the table tail, write the command, rewrite the header

mod command;
mod name;
mod patcher;
mod planner;
mod workflow;

pub use command::*;
pub use name::*;
pub use patcher::*;
pub use planner::*;
pub use workflow::*;
