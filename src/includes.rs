//! Include resolution and namespacing (`spec.md` §4.2).
//!
//! Given `include <name.c5h>` at top level, searches, in order: (a) the
//! including file's directory, (b) each `-I` path in order, (c)
//! `./c5include/`, (d) `$HOME/.c5/include/`. The header's basename (without
//! `.c5h`) becomes the namespace for every declaration it contains. Cyclic
//! includes are deduplicated by a canonical-path visited set.

use crate::ast::{Decl, IncludeDirective};
use crate::parser::Parser;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// One resolved header: its namespace and the declarations it introduced.
pub struct ResolvedHeader {
    pub namespace: String,
    pub decls: Vec<Decl>,
}

pub struct IncludeResolver<'a> {
    extra_paths: &'a [PathBuf],
    visited: HashSet<PathBuf>,
}

impl<'a> IncludeResolver<'a> {
    pub fn new(extra_paths: &'a [PathBuf]) -> Self {
        IncludeResolver {
            extra_paths,
            visited: HashSet::new(),
        }
    }

    /// Resolves every include in `program`, recursively following any
    /// includes found inside the headers themselves. Returns one
    /// `ResolvedHeader` per distinct header actually loaded (already
    /// deduplicated).
    pub fn resolve_all(
        &mut self,
        includes: &[IncludeDirective],
        including_file: &Path,
    ) -> Result<Vec<ResolvedHeader>, String> {
        let mut out = Vec::new();
        for inc in includes {
            self.resolve_one(inc, including_file, &mut out)?;
        }
        Ok(out)
    }

    fn resolve_one(
        &mut self,
        inc: &IncludeDirective,
        including_file: &Path,
        out: &mut Vec<ResolvedHeader>,
    ) -> Result<(), String> {
        let (path, trail) = self.locate(&inc.header_name, including_file)?;
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if self.visited.contains(&canonical) {
            return Ok(());
        }
        self.visited.insert(canonical);

        let _ = trail; // kept for the error path below; no trail on success
        let source = fs::read_to_string(&path)
            .map_err(|e| format!("{}: [E010] failed to read '{}': {}", inc.source, path.display(), e))?;
        let parser = Parser::new(&source, &path).map_err(|e| format!("{}: {}", inc.source, e))?;
        let (header_program, diags) = parser.parse_program();
        if diags.has_errors() {
            let messages: Vec<_> = diags.iter().map(|d| d.to_string()).collect();
            return Err(format!(
                "failed to parse header '{}':\n{}",
                path.display(),
                messages.join("\n")
            ));
        }

        let namespace = namespace_of(&inc.header_name);

        // Recursively resolve includes nested inside this header before
        // recording it, so namespaces appear in the order they are first
        // needed.
        let nested = self.resolve_all(&header_program.includes, &path)?;
        out.extend(nested);

        out.push(ResolvedHeader {
            namespace,
            decls: header_program.decls,
        });
        Ok(())
    }

    fn locate(&self, header_name: &str, including_file: &Path) -> Result<(PathBuf, Vec<PathBuf>), String> {
        let mut trail = Vec::new();

        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = including_file.parent() {
            candidates.push(dir.join(header_name));
        }
        for extra in self.extra_paths {
            candidates.push(extra.join(header_name));
        }
        candidates.push(PathBuf::from("c5include").join(header_name));
        if let Some(home) = home_dir() {
            candidates.push(home.join(".c5").join("include").join(header_name));
        }

        for candidate in candidates {
            trail.push(candidate.clone());
            if candidate.is_file() {
                return Ok((candidate, trail));
            }
        }

        Err(format!(
            "[E010] include not found: '{}'\nsearch trail:\n{}",
            header_name,
            trail
                .iter()
                .map(|p| format!("  {}", p.display()))
                .collect::<Vec<_>>()
                .join("\n")
        ))
    }
}

fn home_dir() -> Option<PathBuf> {
    home::home_dir()
}

fn namespace_of(header_name: &str) -> String {
    Path::new(header_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| header_name.to_string())
}

/// Populates `~/.c5/include/` with the minimal standard headers so a
/// freshly installed compiler can build Scenario 1 of `spec.md` §8
/// ("Hello world") without any other setup. This is the `--setup-libs`
/// surface `spec.md` §4.6 names but leaves unspecified.
pub fn setup_libs() -> Result<PathBuf, String> {
    let home = home_dir().ok_or("could not determine home directory")?;
    let include_dir = home.join(".c5").join("include");
    fs::create_dir_all(&include_dir)
        .map_err(|e| format!("failed to create {}: {}", include_dir.display(), e))?;

    let std_header = include_dir.join("std.c5h");
    fs::write(&std_header, STD_HEADER)
        .map_err(|e| format!("failed to write {}: {}", std_header.display(), e))?;

    Ok(include_dir)
}

const STD_HEADER: &str = "\
int printf(char* fmt);
int malloc(int<64> size);
void free(void* ptr);
int<64> strlen(char* s);
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLocation;
    use std::io::Write;

    #[test]
    fn namespace_is_header_basename_without_extension() {
        assert_eq!(namespace_of("math.c5h"), "math");
        assert_eq!(namespace_of("utils.c5h"), "utils");
    }

    #[test]
    fn resolves_header_from_including_files_directory() {
        let dir = tempfile::tempdir().unwrap();
        let header_path = dir.path().join("math.c5h");
        let mut f = fs::File::create(&header_path).unwrap();
        writeln!(f, "int add(int<32> a, int<32> b);").unwrap();

        let main_path = dir.path().join("main.c5");
        let inc = IncludeDirective {
            header_name: "math.c5h".to_string(),
            source: SourceLocation::new(main_path.clone(), 0, 0, 0, 0),
        };

        let mut resolver = IncludeResolver::new(&[]);
        let resolved = resolver.resolve_all(&[inc], &main_path).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].namespace, "math");
        assert_eq!(resolved[0].decls.len(), 1);
    }

    #[test]
    fn missing_header_reports_e010_with_trail() {
        let dir = tempfile::tempdir().unwrap();
        let main_path = dir.path().join("main.c5");
        let inc = IncludeDirective {
            header_name: "nope.c5h".to_string(),
            source: SourceLocation::new(main_path.clone(), 0, 0, 0, 0),
        };
        let mut resolver = IncludeResolver::new(&[]);
        let err = resolver.resolve_all(&[inc], &main_path).unwrap_err();
        assert!(err.contains("E010"));
        assert!(err.contains("search trail"));
    }

    #[test]
    fn cyclic_includes_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.c5h");
        let b_path = dir.path().join("b.c5h");
        fs::write(&a_path, "include <b.c5h>\nint a_fn();").unwrap();
        fs::write(&b_path, "include <a.c5h>\nint b_fn();").unwrap();

        let main_path = dir.path().join("main.c5");
        let inc = IncludeDirective {
            header_name: "a.c5h".to_string(),
            source: SourceLocation::new(main_path.clone(), 0, 0, 0, 0),
        };
        let mut resolver = IncludeResolver::new(&[]);
        let resolved = resolver.resolve_all(&[inc], &main_path).unwrap();
        // Both headers resolved exactly once despite the cycle.
        assert_eq!(resolved.len(), 2);
    }
}
