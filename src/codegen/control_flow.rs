//! Control-flow lowering (`spec.md` §4.5 "Control flow"): every construct
//! compiles to plain conditional jumps over labels minted from
//! [`CodeGen::fresh_label`] - there is no structured-control-flow IR to
//! lower from, only the AST and the label counter.

use super::arrays;
use super::state::CodeGen;
use super::statements::{emit_block, emit_expr, emit_stmt, store_value};
use super::types as cgtypes;
use crate::ast::{Block, Expr, Stmt};
use crate::symbols::ScopeId;
use crate::typeck::{self, Ctx};
use crate::types::{self, Signedness, TypeDescriptor};

pub fn emit_if(
    cg: &mut CodeGen,
    cond: &Expr,
    then_branch: &Block,
    else_branch: Option<&Block>,
    scope: ScopeId,
    return_ty: &TypeDescriptor,
    epilogue: &str,
) {
    let else_label = cg.fresh_label("else");
    let end_label = cg.fresh_label("endif");

    emit_expr(cg, cond, scope);
    cg.emit("cmpq $0, %rax");
    cg.emit(format!("je {}", else_label));

    emit_block(cg, then_branch, scope, return_ty, epilogue);
    cg.emit(format!("jmp {}", end_label));

    cg.label(&else_label);
    if let Some(eb) = else_branch {
        emit_block(cg, eb, scope, return_ty, epilogue);
    }
    cg.label(&end_label);
}

pub fn emit_while(cg: &mut CodeGen, cond: &Expr, body: &Block, scope: ScopeId, return_ty: &TypeDescriptor, epilogue: &str) {
    let loop_label = cg.fresh_label("while");
    let end_label = cg.fresh_label("while_end");

    cg.label(&loop_label);
    emit_expr(cg, cond, scope);
    cg.emit("cmpq $0, %rax");
    cg.emit(format!("je {}", end_label));
    emit_block(cg, body, scope, return_ty, epilogue);
    cg.emit(format!("jmp {}", loop_label));
    cg.label(&end_label);
}

pub fn emit_do_while(cg: &mut CodeGen, body: &Block, cond: &Expr, scope: ScopeId, return_ty: &TypeDescriptor, epilogue: &str) {
    let body_label = cg.fresh_label("do");
    cg.label(&body_label);
    emit_block(cg, body, scope, return_ty, epilogue);
    emit_expr(cg, cond, scope);
    cg.emit("cmpq $0, %rax");
    cg.emit(format!("jne {}", body_label));
}

#[allow(clippy::too_many_arguments)]
pub fn emit_for(
    cg: &mut CodeGen,
    init: Option<&Stmt>,
    cond: Option<&Expr>,
    step: Option<&Expr>,
    body: &Block,
    scope: ScopeId,
    return_ty: &TypeDescriptor,
    epilogue: &str,
) {
    // A fresh scope holds the loop variable `init` may declare, so it's
    // visible to `cond`, `body`, and `step` but nowhere past the loop.
    let for_scope = cg.push_block(scope);
    if let Some(init) = init {
        emit_stmt(cg, init, for_scope, return_ty, epilogue);
    }

    let loop_label = cg.fresh_label("for");
    let end_label = cg.fresh_label("for_end");
    cg.label(&loop_label);

    if let Some(cond) = cond {
        emit_expr(cg, cond, for_scope);
        cg.emit("cmpq $0, %rax");
        cg.emit(format!("je {}", end_label));
    }

    emit_block(cg, body, for_scope, return_ty, epilogue);

    if let Some(step) = step {
        emit_expr(cg, step, for_scope);
    }
    cg.emit(format!("jmp {}", loop_label));
    cg.label(&end_label);
}

/// `foreach(i, v in a) { ... }` desugars exactly to
/// `i := 0; while (i < len(a)) { v := a[i]; ...; i := i + 1; }`, reading
/// the length/data fields directly off `array<T>`'s known layout rather
/// than calling the runtime's `__c5_arr_len`, since codegen already knows
/// the offsets.
#[allow(clippy::too_many_arguments)]
pub fn emit_foreach(
    cg: &mut CodeGen,
    index_name: &str,
    value_name: &str,
    iterable: &Expr,
    body: &Block,
    scope: ScopeId,
    return_ty: &TypeDescriptor,
    epilogue: &str,
) {
    let iter_ty = typeck::infer_expr_type(iterable, &Ctx { symtab: cg.symtab, registry: cg.registry, scope })
        .unwrap_or_else(|d| panic!("codegen received an unchecked foreach target: {}", d));
    let TypeDescriptor::Array(elem_ty) = iter_ty else {
        panic!("foreach requires an array<T> operand")
    };
    let elem_ty: TypeDescriptor = *elem_ty;
    let elem_size = types::size_of(&elem_ty).max(1) as i64;

    let loop_scope = cg.push_block(scope);

    emit_expr(cg, iterable, loop_scope);
    let arr_slot = cg.alloc_slot(&TypeDescriptor::Pointer(Box::new(elem_ty.clone())));
    cg.emit(format!("movq %rax, {}(%rbp)", arr_slot));

    let index_ty = TypeDescriptor::Int { bits: 64, signedness: Signedness::Signed };
    let index_offset = cg.declare_local(loop_scope, index_name, index_ty);
    cg.emit(format!("movq $0, {}(%rbp)", index_offset));

    let loop_label = cg.fresh_label("foreach");
    let end_label = cg.fresh_label("foreach_end");
    cg.label(&loop_label);

    cg.emit(format!("movq {}(%rbp), %rax", arr_slot));
    cg.emit(format!("movq {}(%rax), %rcx", arrays::LENGTH_OFFSET));
    cg.emit(format!("movq {}(%rbp), %rax", index_offset));
    cg.emit("cmpq %rcx, %rax");
    cg.emit(format!("jge {}", end_label));

    let value_offset = cg.declare_local(loop_scope, value_name, elem_ty.clone());
    cg.emit(format!("movq {}(%rbp), %rcx", arr_slot));
    cg.emit(format!("movq {}(%rcx), %rcx", arrays::DATA_OFFSET));
    cg.emit(format!("movq {}(%rbp), %rax", index_offset));
    cg.emit(format!("imulq ${}, %rax, %rax", elem_size));
    cg.emit("addq %rax, %rcx");
    cg.emit(format!("{} (%rcx), %rax", cgtypes::load_mnemonic(&elem_ty)));
    store_value(cg, value_offset, &elem_ty);

    emit_block(cg, body, loop_scope, return_ty, epilogue);

    cg.emit(format!("movq {}(%rbp), %rax", index_offset));
    cg.emit("addq $1, %rax");
    cg.emit(format!("movq %rax, {}(%rbp)", index_offset));
    cg.emit(format!("jmp {}", loop_label));
    cg.label(&end_label);
}
