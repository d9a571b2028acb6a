//! Codegen's mutable emission state: output buffers, the current function's
//! stack frame, and the label/string/array-literal pools.
//!
//! Codegen reuses the symbol table [`sema::analyze`] built rather than
//! building its own: it pushes a fresh `Function`/`Block` scope per
//! function it emits and declares locals into it with the real negative
//! `%rbp` offset sema only placeholdered as `0`, then leans on
//! [`crate::typeck::infer_expr_type`] against that same table for every
//! expression's type, exactly as sema does for checking.

use crate::symbols::{ScopeId, ScopeKind, StorageClass, Symbol, SymbolTable};
use crate::types::{self, TypeDescriptor, TypeRegistry};
use std::collections::HashMap;

pub struct CodeGen<'a> {
    pub symtab: &'a mut SymbolTable,
    pub registry: &'a TypeRegistry,

    /// Accumulates the body of the function currently being emitted; wired
    /// into `.text` once the frame size is known (the `subq` in the
    /// prologue needs a total computed only after the whole body has
    /// allocated its locals).
    pub body: String,
    pub data: String,
    pub rodata: String,

    label_counter: usize,
    /// Deduplicates string literals sharing the same bytes.
    string_labels: HashMap<String, String>,
    string_counter: usize,

    /// Grows downward from 0 as locals are allocated in the function
    /// currently being emitted; rounded to 16 for the prologue's `subq`.
    frame_size: i64,
}

impl<'a> CodeGen<'a> {
    pub fn new(symtab: &'a mut SymbolTable, registry: &'a TypeRegistry) -> Self {
        CodeGen {
            symtab,
            registry,
            body: String::new(),
            data: String::new(),
            rodata: String::new(),
            label_counter: 0,
            string_labels: HashMap::new(),
            string_counter: 0,
            frame_size: 0,
        }
    }

    pub fn emit(&mut self, line: impl AsRef<str>) {
        self.body.push_str("\t");
        self.body.push_str(line.as_ref());
        self.body.push('\n');
    }

    pub fn label(&mut self, name: &str) {
        self.body.push_str(name);
        self.body.push_str(":\n");
    }

    pub fn fresh_label(&mut self, prefix: &str) -> String {
        self.label_counter += 1;
        format!(".L{}{}", prefix, self.label_counter)
    }

    /// Begins a fresh function: resets the per-function frame and pushes a
    /// new `Function` scope as a child of `GLOBAL`.
    pub fn begin_function(&mut self) -> ScopeId {
        self.frame_size = 0;
        self.body.clear();
        self.symtab.push_scope(crate::symbols::GLOBAL, ScopeKind::Function)
    }

    pub fn push_block(&mut self, parent: ScopeId) -> ScopeId {
        self.symtab.push_scope(parent, ScopeKind::Block)
    }

    /// Reserves a new stack slot for `ty`, returning its (negative) offset
    /// from `%rbp`.
    pub fn alloc_slot(&mut self, ty: &TypeDescriptor) -> i64 {
        let size = types::size_of(ty).max(1);
        let align = types::align_of(ty).max(1) as i64;
        self.frame_size += size as i64;
        self.frame_size = round_up(self.frame_size, align);
        -self.frame_size
    }

    /// Total frame size, 16-byte aligned, for the prologue's `subq`.
    pub fn frame_size(&self) -> i64 {
        round_up(self.frame_size, 16)
    }

    pub fn declare_local(&mut self, scope: ScopeId, name: &str, ty: TypeDescriptor) -> i64 {
        let offset = self.alloc_slot(&ty);
        self.symtab.declare(
            scope,
            name,
            Symbol::Variable {
                ty,
                storage: StorageClass::LocalStack(offset),
                mutability: crate::ast::Mutability::Let,
            },
        );
        offset
    }

    /// Interns a string literal's raw bytes into `.rodata` as a
    /// length-prefixed buffer matching `c5_string_header` (an 8-byte
    /// little-endian length immediately before the NUL-terminated bytes),
    /// and returns the label pointing at the bytes (not the length word) -
    /// that label is the `string` value itself.
    pub fn intern_string(&mut self, bytes: &str) -> String {
        if let Some(label) = self.string_labels.get(bytes) {
            return label.clone();
        }
        self.string_counter += 1;
        let label = format!(".Lstr{}", self.string_counter);
        self.rodata.push_str(&format!("\t.quad {}\n", bytes.len()));
        self.rodata.push_str(&format!("{}:\n", label));
        self.rodata.push_str(&format!("\t.asciz \"{}\"\n", escape_gas(bytes)));
        self.string_labels.insert(bytes.to_string(), label.clone());
        label
    }

    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        self.symtab.lookup(scope, name)
    }
}

fn round_up(value: i64, align: i64) -> i64 {
    if align <= 0 {
        return value;
    }
    (value + align - 1) / align * align
}

/// Escapes a raw string literal's bytes for a GAS `.asciz` directive.
pub fn escape_gas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out
}
