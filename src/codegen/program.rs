//! Top-level assembly assembly (`spec.md` §4.5 "Emission layout"): one
//! `.text` section holding every function body, one `.data` section for
//! globals and interned string/float literals, one `.rodata` section for
//! `const` globals - assembled by walking the compiled unit's own
//! declarations and every included header's declarations side by side.

use super::state::CodeGen;
use super::statements;
use super::types as cgtypes;
use crate::ast::{Block, Decl, Param, Program};
use crate::includes::ResolvedHeader;
use crate::sema::{self, AnalysisResult};
use crate::symbols::{FunctionSignature, Symbol, GLOBAL};
use crate::types::{self, ArgClass, TypeDescriptor};
use std::collections::HashMap;

/// One function awaiting emission: its source-declared parameter names
/// (types come from the symbol table's already-resolved signature) and
/// the namespace its linkage name is rendered under.
struct PendingFn {
    namespace: Option<String>,
    declared_name: String,
    params: Vec<Param>,
}

pub fn generate(analysis: &mut AnalysisResult, program: &Program, headers: &[ResolvedHeader]) -> String {
    let expanded_bodies = &analysis.expanded_bodies;

    let mut pending = Vec::new();
    for decl in &program.decls {
        if let Decl::Fn(f) = decl {
            if f.body.is_some() {
                pending.push(PendingFn { namespace: None, declared_name: f.name.clone(), params: f.params.clone() });
            }
        }
    }
    for header in headers {
        for decl in &header.decls {
            if let Decl::Fn(f) = decl {
                if f.body.is_some() {
                    pending.push(PendingFn {
                        namespace: Some(header.namespace.clone()),
                        declared_name: f.name.clone(),
                        params: f.params.clone(),
                    });
                }
            }
        }
    }
    for lambda in &analysis.lifted_lambdas {
        pending.push(PendingFn { namespace: None, declared_name: lambda.name.clone(), params: lambda.params.clone() });
    }

    let mut cg = CodeGen::new(&mut analysis.symtab, &analysis.registry);
    let mut text = String::new();

    for f in &pending {
        let sig = lookup_signature(&cg, f.namespace.as_deref(), &f.declared_name)
            .unwrap_or_else(|| panic!("no signature recorded for '{}'", f.declared_name))
            .clone();
        emit_function(&mut cg, expanded_bodies, &mut text, &sig, &f.params);
    }

    emit_globals(&mut cg, &program.decls, None);
    for header in headers {
        emit_globals(&mut cg, &header.decls, Some(&header.namespace));
    }

    assemble(&text, &cg.data, &cg.rodata)
}

fn lookup_signature<'a>(cg: &'a CodeGen, namespace: Option<&str>, name: &str) -> Option<&'a FunctionSignature> {
    let sym = match namespace {
        Some(ns) => cg.symtab.lookup_qualified(GLOBAL, ns, name),
        None => cg.symtab.lookup(GLOBAL, name),
    };
    match sym {
        Some(Symbol::Function(sig)) => Some(sig),
        _ => None,
    }
}

fn emit_function(
    cg: &mut CodeGen,
    expanded_bodies: &HashMap<String, Block>,
    text: &mut String,
    sig: &FunctionSignature,
    params: &[Param],
) {
    let fn_scope = cg.begin_function();

    let mut param_slots = Vec::with_capacity(params.len());
    for (p, ty) in params.iter().zip(&sig.params) {
        let offset = cg.declare_local(fn_scope, &p.name, ty.clone());
        param_slots.push((offset, ty.clone()));
    }
    spill_params(cg, &param_slots);

    let epilogue = cg.fresh_label("epilogue");
    let body = expanded_bodies
        .get(&sig.linkage_name)
        .unwrap_or_else(|| panic!("no analysed body for '{}'", sig.linkage_name));
    statements::emit_block(cg, body, fn_scope, &sig.return_type, &epilogue);

    text.push_str(&format!("\t.globl {}\n\t.type {}, @function\n{}:\n", sig.linkage_name, sig.linkage_name, sig.linkage_name));
    text.push_str("\tpushq %rbp\n\tmovq %rsp, %rbp\n");
    let frame = cg.frame_size();
    if frame > 0 {
        text.push_str(&format!("\tsubq ${}, %rsp\n", frame));
    }
    text.push_str(&cg.body);
    text.push_str(&format!("{}:\n", epilogue));
    text.push_str("\tmovq %rbp, %rsp\n\tpopq %rbp\n\tret\n");
}

/// Moves each incoming argument out of its System V register (or, past
/// the sixth integer/eighth float argument, its caller-pushed stack slot
/// starting at `16(%rbp)`) into the local stack slot the body was
/// compiled to address.
fn spill_params(cg: &mut CodeGen, param_slots: &[(i64, TypeDescriptor)]) {
    let mut int_idx = 0usize;
    let mut sse_idx = 0usize;
    let mut stack_idx = 0usize;

    for (offset, ty) in param_slots {
        match types::arg_class(ty) {
            ArgClass::Integer if int_idx < cgtypes::INT_ARG_REGS.len() => {
                let reg = cgtypes::sub_register(cgtypes::INT_ARG_REGS[int_idx], ty);
                cg.emit(format!("{} {}, {}(%rbp)", cgtypes::store_mnemonic(ty), reg, offset));
                int_idx += 1;
            }
            ArgClass::Sse if sse_idx < cgtypes::SSE_ARG_REGS.len() => {
                cg.emit(format!("{} %{}, {}(%rbp)", cgtypes::store_mnemonic(ty), cgtypes::SSE_ARG_REGS[sse_idx], offset));
                sse_idx += 1;
            }
            _ => {
                let incoming = 16 + 8 * stack_idx as i64;
                cg.emit(format!("movq {}(%rbp), %rax", incoming));
                cg.emit(format!("{} {}, {}(%rbp)", cgtypes::store_mnemonic(ty), cgtypes::sub_register("rax", ty), offset));
                stack_idx += 1;
            }
        }
    }
}

fn emit_globals(cg: &mut CodeGen, decls: &[Decl], namespace: Option<&str>) {
    for decl in decls {
        let Decl::GlobalVar(v) = decl else { continue };
        let label = sema::linkage_name(namespace, &v.name);
        let ty = match namespace {
            Some(ns) => cg.symtab.lookup_qualified(GLOBAL, ns, &v.name),
            None => cg.symtab.lookup(GLOBAL, &v.name),
        };
        let Some(Symbol::Variable { ty, mutability, .. }) = ty.cloned() else {
            continue;
        };
        let is_const = mutability == crate::ast::Mutability::Const;
        emit_global_var(cg, &label, &ty, v.init.as_ref(), is_const);
    }
}

fn global_size_directive(ty: &TypeDescriptor) -> &'static str {
    match types::gas_suffix(ty) {
        'b' => ".byte",
        'w' => ".short",
        'l' => ".long",
        _ => ".quad",
    }
}

fn emit_global_var(cg: &mut CodeGen, label: &str, ty: &TypeDescriptor, init: Option<&crate::ast::Expr>, is_const: bool) {
    use crate::ast::{Expr, Literal};

    let align = types::align_of(ty).max(1);
    let size = types::size_of(ty).max(1);

    let body = match init {
        Some(Expr::Literal { value: Literal::Int(v), .. }) => format!("{} {}", global_size_directive(ty), v),
        Some(Expr::Literal { value: Literal::Char(c), .. }) => format!(".byte {}", c),
        Some(Expr::Literal { value: Literal::Float(f), .. }) => format!(".quad {}", f.to_bits()),
        Some(Expr::Literal { value: Literal::Str(s), .. }) => {
            let str_label = cg.intern_string(s);
            format!(".quad {}", str_label)
        }
        _ => format!(".zero {}", size),
    };

    let section = if is_const { &mut cg.rodata } else { &mut cg.data };
    section.push_str(&format!("\t.align {}\n{}:\n\t{}\n", align, label, body));
}

fn assemble(text: &str, data: &str, rodata: &str) -> String {
    let mut out = String::new();
    out.push_str("\t.text\n");
    out.push_str(text);
    out.push_str("\n\t.data\n");
    out.push_str(data);
    out.push_str("\n\t.section .rodata\n");
    out.push_str(rodata);
    out.push('\n');
    out
}
