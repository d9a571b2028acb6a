//! C5: an ahead-of-time compiler for a statically typed, C-ABI-compatible
//! systems language that emits x86_64 GNU Assembler text directly.
//!
//! The pipeline is a strict left-to-right dataflow - lex, resolve includes,
//! parse, analyse, generate - each stage consuming the previous stage's
//! product and adding information. There is no intermediate representation
//! and no optimizer; the emitted assembly is the contract.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod includes;
pub mod lexer;
pub mod parser;
pub mod sema;
pub mod symbols;
pub mod typeck;
pub mod types;

pub use ast::Program;
pub use config::{CompilerConfig, EmitKind};
pub use diagnostics::{Diagnostic, DiagnosticBag, Severity};
pub use driver::{check_file, compile_file, compile_file_with_config, CompileOutcome};
pub use parser::Parser;
pub use symbols::SymbolTable;

/// The bundled runtime support library (string arithmetic, `array<T>`
/// growth), compiled from `runtime/c5_runtime.c` by `build.rs` and linked
/// into every C5 executable alongside libc, the same way a generated
/// program's own support code would ship with it. `docsrs` builds (no C
/// toolchain available) fall back to an empty archive since nothing on
/// that path actually links a binary.
#[cfg(not(docsrs))]
pub static RUNTIME_LIB: &[u8] = include_bytes!(env!("C5_RUNTIME_LIB_PATH"));

#[cfg(docsrs)]
pub static RUNTIME_LIB: &[u8] = &[];
