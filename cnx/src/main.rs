#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use cnx::pipeline::{run_build, BuildOptions, TRANSPILER_VERSION};

#[derive(Parser)]
#[command(name = "cnxc", version = TRANSPILER_VERSION, about = "C-Next to C transpiler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transpile source units to C.
    Build {
        /// Source files or directories to transpile.
        inputs: Vec<PathBuf>,

        /// Additional header search directories.
        #[arg(short = 'I', long = "include")]
        include_dirs: Vec<PathBuf>,

        /// Output directory; input directory structure is preserved.
        #[arg(short = 'o', long = "out", default_value = "build")]
        out_dir: PathBuf,

        /// Project root; the symbol cache lives under `<root>/.cnx/`.
        #[arg(long = "project-root", default_value = ".")]
        project_root: PathBuf,

        /// Emit one companion header per unit.
        #[arg(long = "headers")]
        headers: bool,

        /// Debug build: overflow helpers abort instead of clamping.
        #[arg(long = "debug")]
        debug: bool,
    },

    /// Drop the on-disk symbol cache.
    CleanCache {
        #[arg(long = "project-root", default_value = ".")]
        project_root: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Build {
            inputs,
            include_dirs,
            out_dir,
            project_root,
            headers,
            debug,
        } => {
            if inputs.is_empty() {
                eprintln!("error: no inputs given");
                return ExitCode::FAILURE;
            }
            let report = run_build(&BuildOptions {
                inputs,
                include_dirs,
                out_dir,
                project_root,
                emit_headers: headers,
                debug,
            });

            for warning in &report.warnings {
                eprintln!("{warning}");
            }
            for error in &report.errors {
                eprintln!("{error}");
            }
            for path in &report.emitted {
                println!("{}", path.display());
            }

            // Warnings never change the exit code.
            if report.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::CleanCache { project_root } => {
            let dir = project_root.join(".cnx");
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("error: cannot remove {}: {e}", dir.display());
                    ExitCode::FAILURE
                }
            }
        }
    }
}
