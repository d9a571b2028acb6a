//! C5 compiler CLI.
//!
//! Thin wrapper over the `c5c` library: parses arguments, builds a
//! [`CompilerConfig`], and maps [`CompileOutcome`]/`Err` onto the exit
//! codes `spec.md` §6 specifies (0 clean, 1 diagnostics, 2 infrastructure
//! failure).

use c5c::{check_file, compile_file_with_config, CompileOutcome, CompilerConfig, EmitKind};
use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;
use tracing::info;

#[derive(ClapParser)]
#[command(name = "c5c")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "C5 compiler - compile .c5 programs to x86_64 executables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile one or more .c5 files (default: to an executable)
    Build {
        /// Input .c5 source files; listed together, they form one
        /// translation unit
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output path (defaults to the first input's stem)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after codegen and write the assembly listing
        #[arg(short = 'S', long = "emit-assembly")]
        emit_assembly: bool,

        /// Assemble to a relocatable object; no `main` required
        #[arg(long)]
        lib: bool,

        /// Prepend an include search path (repeatable)
        #[arg(short = 'I', long = "include", value_name = "DIR")]
        include_paths: Vec<PathBuf>,

        /// Keep the intermediate `.s` file after assembling
        #[arg(long)]
        keep_assembly: bool,
    },

    /// Run semantic analysis only; report diagnostics without codegen
    Check {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short = 'I', long = "include", value_name = "DIR")]
        include_paths: Vec<PathBuf>,
    },

    /// Populate the global include directory with the bundled standard
    /// headers (`std.c5h`)
    SetupLibs,

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("c5c=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build { inputs, output, emit_assembly, lib, include_paths, keep_assembly } => {
            run_build(inputs, output, emit_assembly, lib, include_paths, keep_assembly)
        }
        Commands::Check { inputs, include_paths } => run_check(inputs, include_paths),
        Commands::SetupLibs => run_setup_libs(),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "c5c", &mut io::stdout());
}

fn run_build(
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    emit_assembly: bool,
    lib: bool,
    include_paths: Vec<PathBuf>,
    keep_assembly: bool,
) {
    let emit = if emit_assembly {
        EmitKind::Assembly
    } else if lib {
        EmitKind::Object
    } else {
        EmitKind::Executable
    };

    let mut config = CompilerConfig::new().with_emit(emit).with_include_paths(include_paths);
    if let Some(o) = output {
        config = config.with_output_path(o);
    }
    if keep_assembly {
        config = config.keeping_assembly();
    }

    match compile_file_with_config(&inputs, &config) {
        Ok(CompileOutcome::Success { output_path: Some(path) }) => {
            info!("compiled {} input(s) -> {}", inputs.len(), path.display());
        }
        Ok(CompileOutcome::Success { output_path: None }) => {}
        Ok(CompileOutcome::Diagnostics(bag)) => {
            for d in bag.iter() {
                eprintln!("{}", d);
            }
            process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    }
}

fn run_check(inputs: Vec<PathBuf>, include_paths: Vec<PathBuf>) {
    let config = CompilerConfig::new().with_include_paths(include_paths);
    match check_file(&inputs, &config) {
        Ok(CompileOutcome::Diagnostics(bag)) => {
            for d in bag.iter() {
                eprintln!("{}", d);
            }
            process::exit(1);
        }
        Ok(CompileOutcome::Success { .. }) => {
            println!("ok: no errors");
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    }
}

fn run_setup_libs() {
    match c5c::includes::setup_libs() {
        Ok(dir) => println!("installed standard headers to {}", dir.display()),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    }
}
