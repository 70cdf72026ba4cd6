//! dylinject - Inject an `@executable_path` dylib into a Mach-O executable.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use dylinject::{inject_dylib, inspect, InjectOptions, LoadKind, WriteMode};

/// Post-build dylib injection for Mach-O executables.
#[derive(Parser, Debug)]
#[command(name = "dylinject")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add an LC_LOAD_DYLIB for a fresh @executable_path library
    Inject {
        /// Executable to patch in place
        binary: PathBuf,

        /// Use LC_LOAD_WEAK_DYLIB so launch survives a missing library
        #[arg(long)]
        weak: bool,

        /// Only report what would be inserted
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Patch a temporary copy and rename it over the executable
        #[arg(long)]
        atomic: bool,

        /// Copy this library next to the executable under the generated name
        #[arg(short, long)]
        install: Option<PathBuf>,

        /// Verbosity level (0=quiet, 1=warnings, 2=info, 3=debug)
        #[arg(short, long, default_value = "1")]
        verbosity: u8,
    },

    /// Show the load command area of an executable
    Inspect {
        /// Executable to read
        binary: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Inject {
            binary,
            weak,
            dry_run,
            atomic,
            install,
            verbosity,
        } => {
            setup_logging(verbosity);
            cmd_inject(&binary, weak, dry_run, atomic, install.as_deref())
        }
        Commands::Inspect { binary } => cmd_inspect(&binary),
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

fn cmd_inject(
    binary: &Path,
    weak: bool,
    dry_run: bool,
    atomic: bool,
    install: Option<&Path>,
) -> Result<()> {
    if let Some(library) = install {
        if !library.is_file() {
            bail!("Library to install does not exist: {}", library.display());
        }
    }

    let options = InjectOptions::default()
        .with_kind(if weak { LoadKind::Weak } else { LoadKind::Load })
        .with_write_mode(if atomic {
            WriteMode::Atomic
        } else {
            WriteMode::InPlace
        })
        .with_dry_run(dry_run);

    let injection = inject_dylib(binary, &options)
        .with_context(|| format!("Failed to inject into: {}", binary.display()))?;

    if !injection.written {
        println!(
            "Would insert {} ({} bytes at {:#x}, {} bytes of slack)",
            injection.install_name,
            injection.command_size,
            injection.insert_offset,
            injection.slack_before
        );
        return Ok(());
    }

    println!("{}", injection.dylib_name);

    if let Some(library) = install {
        let dir = match binary.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let target = dir.join(&injection.dylib_name);
        fs::copy(library, &target).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                library.display(),
                target.display()
            )
        })?;
        info!("Installed {} as {}", library.display(), target.display());
    }

    Ok(())
}

fn cmd_inspect(binary: &Path) -> Result<()> {
    let summary = inspect(binary)
        .with_context(|| format!("Failed to read: {}", binary.display()))?;

    println!("Mach-O Load Commands");
    println!("====================");
    println!("Path:         {}", binary.display());
    print!("{}", summary);

    Ok(())
}
