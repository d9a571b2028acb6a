//! Driver: wires lexing through linking into the CLI-facing entry points
//! (`spec.md` §4.6). Inputs listed together become one translation unit -
//! each file is parsed on its own (so diagnostics keep their own file's
//! location) and the resulting `Program`s are concatenated before a single
//! pass of include resolution, semantic analysis, and codegen runs over
//! the merged declarations.
//!
//! Exit-code contract (`spec.md` §6): a clean compile is `Ok(Success)`; one
//! or more diagnostics (lex/parse/semantic errors) is `Ok(Diagnostics(_))`,
//! which the CLI maps to exit 1; anything that keeps the pipeline from
//! running at all - a missing file, a failed `as`/`gcc` subprocess - is
//! `Err(String)`, mapped to exit 2.

use crate::ast::{Program, SourceLocation};
use crate::codegen;
use crate::config::{CompilerConfig, EmitKind};
use crate::diagnostics::{Diagnostic, DiagnosticBag};
use crate::includes::{IncludeResolver, ResolvedHeader};
use crate::parser::Parser;
use crate::sema::{self, AnalysisResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Result of a full or partial compile attempt that got far enough to
/// produce a meaningful outcome (as opposed to an infrastructure failure,
/// which is an `Err` and never reaches this type).
#[derive(Debug)]
pub enum CompileOutcome {
    /// `output_path` is `None` for `check_file` (analysis only, nothing
    /// written to disk).
    Success { output_path: Option<PathBuf> },
    /// One or more error-severity diagnostics; the CLI exits 1. Warnings
    /// alone (no errors) still reach `Success`.
    Diagnostics(DiagnosticBag),
}

/// Cache for the `as`/`gcc` availability check; both tools are checked
/// once per process, the same way a version-gated compiler would cache
/// its toolchain probe.
static TOOLCHAIN_CHECKED: OnceLock<Result<(), String>> = OnceLock::new();

fn check_toolchain() -> Result<(), String> {
    TOOLCHAIN_CHECKED
        .get_or_init(|| {
            for tool in ["as", "gcc"] {
                Command::new(tool)
                    .arg("--version")
                    .output()
                    .map_err(|e| format!("failed to run {}: {}. Is binutils/gcc installed?", tool, e))?;
            }
            Ok(())
        })
        .clone()
}

/// Compile a single `.c5` file to an executable at `output_path`, the
/// common case of [`compile_file_with_config`].
pub fn compile_file(source_path: &Path, output_path: &Path) -> Result<CompileOutcome, String> {
    let config = CompilerConfig::new().with_output_path(output_path.to_path_buf());
    compile_file_with_config(&[source_path.to_path_buf()], &config)
}

/// Full pipeline for one or more `.c5` inputs, honoring `config`'s include
/// paths, `-S`/`--lib` emit kind, and output path.
pub fn compile_file_with_config(inputs: &[PathBuf], config: &CompilerConfig) -> Result<CompileOutcome, String> {
    let analyzed = match analyze_inputs(inputs, config)? {
        Analyzed::Diagnostics(bag) => return Ok(CompileOutcome::Diagnostics(bag)),
        Analyzed::Ok(a) => a,
    };

    let primary = inputs.first().ok_or("no input files given")?;
    let asm = {
        let mut analysis = analyzed.analysis;
        codegen::generate(&mut analysis, &analyzed.unit, &analyzed.headers)
    };

    let output_path = config
        .output_path
        .clone()
        .unwrap_or_else(|| default_output_path(primary, config.emit));

    if config.emit == EmitKind::Assembly {
        fs::write(&output_path, asm).map_err(|e| format!("failed to write '{}': {}", output_path.display(), e))?;
        return Ok(CompileOutcome::Success { output_path: Some(output_path) });
    }

    check_toolchain()?;

    let tmp = std::env::temp_dir();
    let pid = std::process::id();
    let asm_path = tmp.join(format!("c5-{}.s", pid));
    let obj_path = tmp.join(format!("c5-{}.o", pid));
    fs::write(&asm_path, asm).map_err(|e| format!("failed to write assembly: {}", e))?;

    let as_status = Command::new("as")
        .arg(&asm_path)
        .arg("-o")
        .arg(&obj_path)
        .output()
        .map_err(|e| format!("failed to run as: {}", e))?;
    if !config.keep_assembly {
        fs::remove_file(&asm_path).ok();
    }
    if !as_status.status.success() {
        return Err(format!("as failed:\n{}", String::from_utf8_lossy(&as_status.stderr)));
    }

    if config.emit == EmitKind::Object {
        fs::rename(&obj_path, &output_path)
            .or_else(|_| fs::copy(&obj_path, &output_path).map(|_| ()))
            .map_err(|e| format!("failed to write '{}': {}", output_path.display(), e))?;
        fs::remove_file(&obj_path).ok();
        return Ok(CompileOutcome::Success { output_path: Some(output_path) });
    }

    let runtime_path = tmp.join(format!("libc5_runtime-{}.a", pid));
    fs::write(&runtime_path, crate::RUNTIME_LIB).map_err(|e| format!("failed to write runtime archive: {}", e))?;

    let gcc_status = Command::new("gcc")
        .arg(&obj_path)
        .arg("-o")
        .arg(&output_path)
        .arg(&runtime_path)
        .output()
        .map_err(|e| format!("failed to run gcc: {}", e))?;
    fs::remove_file(&obj_path).ok();
    fs::remove_file(&runtime_path).ok();
    if !gcc_status.status.success() {
        return Err(format!("gcc failed:\n{}", String::from_utf8_lossy(&gcc_status.stderr)));
    }

    Ok(CompileOutcome::Success { output_path: Some(output_path) })
}

/// Semantic analysis only (the `check` subcommand, `spec.md` §4.6): runs
/// the same front end without ever reaching codegen or the toolchain.
pub fn check_file(inputs: &[PathBuf], config: &CompilerConfig) -> Result<CompileOutcome, String> {
    match analyze_inputs(inputs, config)? {
        Analyzed::Diagnostics(bag) => Ok(CompileOutcome::Diagnostics(bag)),
        Analyzed::Ok(_) => Ok(CompileOutcome::Success { output_path: None }),
    }
}

struct AnalyzedUnit {
    unit: Program,
    headers: Vec<ResolvedHeader>,
    analysis: AnalysisResult,
}

enum Analyzed {
    Ok(AnalyzedUnit),
    Diagnostics(DiagnosticBag),
}

fn single_diagnostic(code: &'static str, path: &Path, message: String) -> DiagnosticBag {
    let mut bag = DiagnosticBag::new();
    bag.push(Diagnostic::error(code, SourceLocation::new(path.to_path_buf(), 0, 0, 0, 0), message));
    bag
}

/// Parses every input, merges them into one `Program`, resolves every
/// `include`, and runs semantic analysis over the result.
fn analyze_inputs(inputs: &[PathBuf], config: &CompilerConfig) -> Result<Analyzed, String> {
    if inputs.is_empty() {
        return Err("no input files given".to_string());
    }

    let mut unit = Program::default();
    let mut diagnostics = DiagnosticBag::new();

    for path in inputs {
        let source = fs::read_to_string(path).map_err(|e| format!("failed to read '{}': {}", path.display(), e))?;

        let parser = match Parser::new(&source, path) {
            Ok(p) => p,
            Err(message) => return Ok(Analyzed::Diagnostics(single_diagnostic("E001", path, message))),
        };
        let (program, diags) = parser.parse_program();
        unit.includes.extend(program.includes);
        unit.decls.extend(program.decls);
        for d in diags {
            diagnostics.push(d);
        }
    }

    if diagnostics.has_errors() {
        return Ok(Analyzed::Diagnostics(diagnostics));
    }

    let mut resolver = IncludeResolver::new(&config.include_paths);
    let headers = match resolver.resolve_all(&unit.includes, &inputs[0]) {
        Ok(h) => h,
        Err(message) => return Ok(Analyzed::Diagnostics(single_diagnostic("E010", &inputs[0], message))),
    };

    let analysis = sema::analyze(&unit, &headers);
    if analysis.has_errors() {
        for d in analysis.diagnostics {
            diagnostics.push(d);
        }
        diagnostics.sort_in_source_order();
        return Ok(Analyzed::Diagnostics(diagnostics));
    }

    Ok(Analyzed::Ok(AnalyzedUnit { unit, headers, analysis }))
}

fn default_output_path(source_path: &Path, emit: EmitKind) -> PathBuf {
    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "a".to_string());
    let dir = source_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    match emit {
        EmitKind::Assembly => dir.join(format!("{}.s", stem)),
        EmitKind::Object => dir.join(format!("{}.o", stem)),
        EmitKind::Executable => dir.join(stem),
    }
}
