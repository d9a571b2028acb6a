//! Driver configuration (`spec.md` §4.6): include search paths, `--lib`,
//! `-S`, and the output path, gathered into one value so `main.rs` and
//! library callers of [`crate::driver::compile_file_with_config`] share the
//! same shape.

use std::path::PathBuf;

/// How far through the pipeline the driver should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitKind {
    /// Full pipeline: assemble and link a runnable executable.
    #[default]
    Executable,
    /// Stop after codegen and write the `.s` listing (`-S`).
    Assembly,
    /// Assemble to a relocatable object with no `main` required (`--lib`).
    Object,
}

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// `-I <dir>`, searched in the order given, ahead of the project-local
    /// and global fallback directories.
    pub include_paths: Vec<PathBuf>,

    /// `-o <path>`; defaults are derived from the first input's stem if
    /// unset.
    pub output_path: Option<PathBuf>,

    pub emit: EmitKind,

    /// Keep the intermediate `.s` file around after assembling, even when
    /// not stopping at `-S`.
    pub keep_assembly: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Add an include search path (builder pattern; repeatable `-I`).
    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    pub fn with_include_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.include_paths.extend(paths);
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_emit(mut self, emit: EmitKind) -> Self {
        self.emit = emit;
        self
    }

    pub fn keeping_assembly(mut self) -> Self {
        self.keep_assembly = true;
        self
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            include_paths: Vec::new(),
            output_path: None,
            emit: EmitKind::default(),
            keep_assembly: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_include_paths_in_order() {
        let config = CompilerConfig::new()
            .with_include_path("/opt/c5/include")
            .with_include_path("./vendor");
        assert_eq!(
            config.include_paths,
            vec![PathBuf::from("/opt/c5/include"), PathBuf::from("./vendor")]
        );
    }

    #[test]
    fn default_emit_kind_is_executable() {
        assert_eq!(CompilerConfig::new().emit, EmitKind::Executable);
    }
}
