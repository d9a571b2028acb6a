//! Statement and expression emission (`spec.md` §4.5): a direct AST walk
//! with no intermediate representation. Every expression's result lands in
//! `%rax` (integers, pointers, `string`/`array<T>` handles) or `%xmm0`
//! (floats); a binary operator with two non-trivial operands spills the
//! left side to a scratch stack slot while the right side evaluates, per
//! `spec.md` §4.5 "Expression evaluation".

use super::arrays;
use super::calls;
use super::control_flow;
use super::state::CodeGen;
use super::strings;
use super::types as cgtypes;
use crate::ast::{BinOp, Block, Expr, Literal, Stmt, UnaryOp};
use crate::symbols::{ScopeId, StorageClass, Symbol};
use crate::typeck::{self, Ctx};
use crate::types::{self, Signedness, TypeDescriptor};

/// Emits a whole function body: entry scope is already pushed by the
/// caller (`codegen::program`), which also handles the prologue/epilogue
/// wrapping once the frame size this fills in is known.
pub fn emit_block(cg: &mut CodeGen, block: &Block, scope: ScopeId, return_ty: &TypeDescriptor, epilogue: &str) {
    let inner = cg.push_block(scope);
    for stmt in &block.statements {
        emit_stmt(cg, stmt, inner, return_ty, epilogue);
    }
}

pub fn emit_stmt(cg: &mut CodeGen, stmt: &Stmt, scope: ScopeId, return_ty: &TypeDescriptor, epilogue: &str) {
    match stmt {
        Stmt::Block(b) => emit_block(cg, b, scope, return_ty, epilogue),
        Stmt::If { cond, then_branch, else_branch, .. } => {
            control_flow::emit_if(cg, cond, then_branch, else_branch.as_ref(), scope, return_ty, epilogue)
        }
        Stmt::While { cond, body, .. } => control_flow::emit_while(cg, cond, body, scope, return_ty, epilogue),
        Stmt::DoWhile { body, cond, .. } => control_flow::emit_do_while(cg, body, cond, scope, return_ty, epilogue),
        Stmt::For { init, cond, step, body, .. } => {
            control_flow::emit_for(cg, init.as_deref(), cond.as_ref(), step.as_ref(), body, scope, return_ty, epilogue)
        }
        Stmt::Foreach { index_name, value_name, iterable, body, .. } => {
            control_flow::emit_foreach(cg, index_name, value_name, iterable, body, scope, return_ty, epilogue)
        }
        Stmt::Return { value, .. } => {
            if let Some(v) = value {
                let ty = emit_expr(cg, v, scope);
                let _ = ty;
            }
            cg.emit(format!("jmp {}", epilogue));
        }
        Stmt::VarDecl(v) => emit_var_decl(cg, v, scope),
        Stmt::Expr { expr, .. } => {
            emit_expr(cg, expr, scope);
        }
    }
}

fn emit_var_decl(cg: &mut CodeGen, v: &crate::ast::VarDecl, scope: ScopeId) {
    let mut ty = typeck::resolve_type_expr(&v.ty, cg.registry).unwrap_or(TypeDescriptor::Void);
    ty = typeck::apply_signedness(ty, v.signedness);

    if let (TypeDescriptor::Array(elem), Some(Expr::ArrayLiteral { elements, .. })) = (&ty, &v.init) {
        let offset = cg.declare_local(scope, &v.name, ty.clone());
        emit_array_literal_into(cg, offset, elem, elements, scope);
        return;
    }

    let offset = cg.declare_local(scope, &v.name, ty.clone());
    if let Some(init) = &v.init {
        emit_expr(cg, init, scope);
        store_value(cg, offset, &ty);
    }
    let _ = v.mutability;
}

/// Lowers an array literal initializer to a `malloc` of `n * sizeof(T)`
/// followed by element-wise stores, per `spec.md` §4.5 "Arrays".
fn emit_array_literal_into(cg: &mut CodeGen, base_offset: i64, elem_ty: &TypeDescriptor, elements: &[Expr], scope: ScopeId) {
    let elem_size = types::size_of(elem_ty).max(1);
    let n = elements.len() as i64;

    cg.emit(format!("movq ${}, %rdi", n * elem_size as i64));
    cg.emit("call malloc");
    cg.emit(format!("movq %rax, {}(%rbp)", base_offset + arrays::DATA_OFFSET));

    for (i, element) in elements.iter().enumerate() {
        emit_expr(cg, element, scope);
        cg.emit(format!("movq {}(%rbp), %rcx", base_offset + arrays::DATA_OFFSET));
        let dest = format!("{}(%rcx)", i as i64 * elem_size as i64);
        cg.emit(format!("{} %rax, {}", cgtypes::store_mnemonic(elem_ty), dest));
    }

    cg.emit(format!("movq ${}, {}(%rbp)", n, base_offset + arrays::LENGTH_OFFSET));
    cg.emit(format!("movq ${}, {}(%rbp)", n, base_offset + arrays::CAPACITY_OFFSET));
}

fn infer(cg: &CodeGen, expr: &Expr, scope: ScopeId) -> TypeDescriptor {
    typeck::infer_expr_type(expr, &Ctx { symtab: cg.symtab, registry: cg.registry, scope })
        .unwrap_or_else(|d| panic!("codegen received an unchecked expression: {}", d))
}

/// Stores whatever is currently in `%rax`/`%xmm0` into the stack slot at
/// `offset`, truncating to `ty`'s declared width.
pub(super) fn store_value(cg: &mut CodeGen, offset: i64, ty: &TypeDescriptor) {
    let reg = if cgtypes::is_float(ty) { "%xmm0".to_string() } else { cgtypes::sub_register("rax", ty) };
    cg.emit(format!("{} {}, {}(%rbp)", cgtypes::store_mnemonic(ty), reg, offset));
}

/// Evaluates `expr`, leaving its value in `%rax` (or `%xmm0` for floats).
/// Returns the expression's resolved type.
pub fn emit_expr(cg: &mut CodeGen, expr: &Expr, scope: ScopeId) -> TypeDescriptor {
    match expr {
        Expr::Literal { value, .. } => emit_literal(cg, value),
        Expr::Ident { namespace, name, .. } => emit_ident_load(cg, namespace.as_deref(), name, scope),
        Expr::Unary { op, operand, .. } => emit_unary(cg, *op, operand, scope),
        Expr::Binary { op, lhs, rhs, .. } => emit_binary(cg, *op, lhs, rhs, scope),
        Expr::Assign { target, compound, value, .. } => emit_assign(cg, target, *compound, value, scope),
        Expr::Cast { ty, expr: inner, .. } => emit_cast(cg, ty, inner, scope),
        Expr::Call { callee, args, .. } => emit_call_expr(cg, callee, args, scope),
        Expr::Index { base, index, .. } => emit_index_load(cg, base, index, scope),
        Expr::Member { .. } | Expr::Arrow { .. } => emit_field_load(cg, expr, scope),
        Expr::ArrayLiteral { elements, source } => {
            let elem_ty = if elements.is_empty() {
                panic!("{}: empty array literal outside a declared slot", source)
            } else {
                infer(cg, &elements[0], scope)
            };
            let offset = cg.alloc_slot(&TypeDescriptor::Array(Box::new(elem_ty.clone())));
            emit_array_literal_into(cg, offset, &elem_ty, elements, scope);
            cg.emit(format!("leaq {}(%rbp), %rax", offset));
            TypeDescriptor::Array(Box::new(elem_ty))
        }
        Expr::Lambda { id, .. } => {
            cg.emit(format!("leaq __c5_lambda_{}(%rip), %rax", id));
            infer(cg, expr, scope)
        }
        Expr::CStr { expr: inner, .. } => {
            emit_expr(cg, inner, scope);
            TypeDescriptor::Pointer(Box::new(TypeDescriptor::Char))
        }
    }
}

fn emit_literal(cg: &mut CodeGen, value: &Literal) -> TypeDescriptor {
    match value {
        Literal::Int(v) => {
            cg.emit(format!("movq ${}, %rax", v));
            TypeDescriptor::Int { bits: 32, signedness: Signedness::Signed }
        }
        Literal::Char(c) => {
            cg.emit(format!("movq ${}, %rax", c));
            TypeDescriptor::Char
        }
        Literal::Float(f) => {
            let label = intern_float(cg, *f);
            cg.emit(format!("movsd {}(%rip), %xmm0", label));
            TypeDescriptor::Float { bits: 64 }
        }
        Literal::Str(s) => {
            let label = cg.intern_string(s);
            cg.emit(format!("leaq {}(%rip), %rax", label));
            TypeDescriptor::String
        }
    }
}

fn intern_float(cg: &mut CodeGen, value: f64) -> String {
    let label = cg.fresh_label("flt");
    cg.rodata.push_str(&format!("\t.align 8\n{}:\n\t.quad {}\n", label, value.to_bits()));
    label
}

/// Renders the GAS label/offset a global symbol resolves to, matching the
/// linkage convention `declare_fn`/`declare_global` compute in sema:
/// `<namespace>__<name>`, or the bare name when `namespace` is `None`.
fn global_label(namespace: Option<&str>, name: &str) -> String {
    crate::sema::linkage_name(namespace, name)
}

fn emit_ident_load(cg: &mut CodeGen, namespace: Option<&str>, name: &str, scope: ScopeId) -> TypeDescriptor {
    let sym = resolve_symbol(cg, namespace, name, scope).clone();
    match sym {
        Symbol::Variable { ty, storage, .. } => {
            let label = global_label(namespace, name);
            load_variable(cg, storage, &ty, &label);
            ty
        }
        Symbol::Function(sig) => {
            cg.emit(format!("leaq {}(%rip), %rax", sig.linkage_name));
            TypeDescriptor::Function { params: sig.params, return_type: Box::new(sig.return_type) }
        }
        other => panic!("'{}' does not name a value ({:?})", name, other),
    }
}

fn resolve_symbol<'a>(cg: &'a CodeGen, namespace: Option<&str>, name: &str, scope: ScopeId) -> &'a Symbol {
    let sym = match namespace {
        Some(ns) => cg.symtab.lookup_qualified(scope, ns, name),
        None => cg.lookup(scope, name),
    };
    sym.unwrap_or_else(|| panic!("unresolved identifier '{}'", name))
}

/// A struct, array, or union doesn't fit in a register: its "value" is the
/// address of its storage, which `Member`/`Index`/`foreach` then read
/// through. Everything else is a single word (or `%xmm0`-width float).
fn is_aggregate(ty: &TypeDescriptor) -> bool {
    matches!(ty, TypeDescriptor::Struct { .. } | TypeDescriptor::Array(_) | TypeDescriptor::Union { .. })
}

fn load_variable(cg: &mut CodeGen, storage: StorageClass, ty: &TypeDescriptor, label: &str) {
    let addr = match storage {
        StorageClass::LocalStack(offset) => format!("{}(%rbp)", offset),
        StorageClass::Global | StorageClass::Const => format!("{}(%rip)", label),
    };
    if is_aggregate(ty) {
        cg.emit(format!("leaq {}, %rax", addr));
        return;
    }
    cg.emit(format!("{} {}, %rax", cgtypes::load_mnemonic(ty), addr));
}

fn emit_unary(cg: &mut CodeGen, op: UnaryOp, operand: &Expr, scope: ScopeId) -> TypeDescriptor {
    match op {
        UnaryOp::AddressOf => {
            let ty = emit_lvalue_addr(cg, operand, scope);
            TypeDescriptor::Pointer(Box::new(ty))
        }
        UnaryOp::Deref => {
            let ty = emit_expr(cg, operand, scope);
            let TypeDescriptor::Pointer(inner) = ty else {
                panic!("dereference of a non-pointer value")
            };
            cg.emit(format!("{} (%rax), %rax", cgtypes::load_mnemonic(&inner)));
            *inner
        }
        UnaryOp::Neg => {
            let ty = emit_expr(cg, operand, scope);
            if cgtypes::is_float(&ty) {
                cg.emit("movq $0x8000000000000000, %rax");
                cg.emit("movq %rax, %xmm1");
                cg.emit("xorpd %xmm1, %xmm0");
            } else {
                cg.emit("negq %rax");
            }
            ty
        }
        UnaryOp::BitNot => {
            let ty = emit_expr(cg, operand, scope);
            cg.emit("notq %rax");
            ty
        }
        UnaryOp::Not => {
            emit_expr(cg, operand, scope);
            cg.emit("cmpq $0, %rax");
            cg.emit("sete %al");
            cg.emit("movzbq %al, %rax");
            TypeDescriptor::Int { bits: 32, signedness: Signedness::Signed }
        }
        UnaryOp::PreIncrement => {
            let ty = emit_lvalue_addr(cg, operand, scope);
            cg.emit("pushq %rax");
            cg.emit(format!("{} (%rax), %rax", cgtypes::load_mnemonic(&ty)));
            cg.emit("addq $1, %rax");
            cg.emit("popq %rcx");
            cg.emit(format!("{} {}, (%rcx)", cgtypes::store_mnemonic(&ty), cgtypes::sub_register("rax", &ty)));
            ty
        }
    }
}

fn emit_binary(cg: &mut CodeGen, op: BinOp, lhs: &Expr, rhs: &Expr, scope: ScopeId) -> TypeDescriptor {
    if matches!(op, BinOp::And | BinOp::Or) {
        return emit_logical(cg, op, lhs, rhs, scope);
    }

    let lhs_ty = infer(cg, lhs, scope);
    let rhs_ty = infer(cg, rhs, scope);

    if matches!(lhs_ty, TypeDescriptor::String) && matches!(op, BinOp::Add | BinOp::Sub) {
        return emit_string_op(cg, op, lhs, rhs, scope);
    }

    if let TypeDescriptor::Pointer(pointee) = &lhs_ty {
        if matches!(op, BinOp::Add | BinOp::Sub) && !matches!(rhs_ty, TypeDescriptor::Pointer(_)) {
            return emit_pointer_offset(cg, op, lhs, rhs, pointee, scope);
        }
        if matches!(op, BinOp::Sub) && matches!(rhs_ty, TypeDescriptor::Pointer(_)) {
            return emit_pointer_diff(cg, lhs, rhs, pointee, scope);
        }
    }

    let is_float = cgtypes::is_float(&lhs_ty) || cgtypes::is_float(&rhs_ty);
    emit_expr(cg, lhs, scope);
    let tmp = cg.alloc_slot(&lhs_ty);
    if is_float {
        cg.emit(format!("movsd %xmm0, {}(%rbp)", tmp));
    } else {
        cg.emit(format!("movq %rax, {}(%rbp)", tmp));
    }
    emit_expr(cg, rhs, scope);

    let result_ty = typeck::infer_expr_type(
        &Expr::Binary { op, lhs: Box::new(lhs.clone()), rhs: Box::new(rhs.clone()), source: lhs.source().clone() },
        &Ctx { symtab: cg.symtab, registry: cg.registry, scope },
    )
    .unwrap_or(TypeDescriptor::Int { bits: 32, signedness: Signedness::Signed });

    if is_float {
        cg.emit(format!("movsd {}(%rbp), %xmm1", tmp));
        emit_float_op(cg, op);
    } else {
        cg.emit("movq %rax, %rcx");
        cg.emit(format!("movq {}(%rbp), %rax", tmp));
        let signed = matches!(&lhs_ty, TypeDescriptor::Int { signedness: Signedness::Unsigned, .. }).then_some(false).unwrap_or(true);
        emit_int_op(cg, op, signed);
    }
    result_ty
}

fn emit_logical(cg: &mut CodeGen, op: BinOp, lhs: &Expr, rhs: &Expr, scope: ScopeId) -> TypeDescriptor {
    let done = cg.fresh_label("logic_done");
    emit_expr(cg, lhs, scope);
    cg.emit("cmpq $0, %rax");
    match op {
        BinOp::And => cg.emit(format!("je {}", done)),
        BinOp::Or => cg.emit(format!("jne {}", done)),
        _ => unreachable!(),
    }
    emit_expr(cg, rhs, scope);
    cg.emit("cmpq $0, %rax");
    cg.emit("setne %al");
    cg.emit("movzbq %al, %rax");
    cg.label(&done);
    TypeDescriptor::Int { bits: 32, signedness: Signedness::Signed }
}

/// lhs is in `%rax`, rhs in `%rcx`; leaves the result in `%rax`.
fn emit_int_op(cg: &mut CodeGen, op: BinOp, signed: bool) {
    match op {
        BinOp::Add => cg.emit("addq %rcx, %rax"),
        BinOp::Sub => cg.emit("subq %rcx, %rax"),
        BinOp::Mul => cg.emit("imulq %rcx, %rax"),
        BinOp::Div | BinOp::Rem => {
            if signed {
                cg.emit("cqto");
                cg.emit("idivq %rcx");
            } else {
                cg.emit("xorq %rdx, %rdx");
                cg.emit("divq %rcx");
            }
            if matches!(op, BinOp::Rem) {
                cg.emit("movq %rdx, %rax");
            }
        }
        BinOp::BitAnd => cg.emit("andq %rcx, %rax"),
        BinOp::BitOr => cg.emit("orq %rcx, %rax"),
        BinOp::BitXor => cg.emit("xorq %rcx, %rax"),
        BinOp::Shl => {
            cg.emit("movq %rcx, %rcx"); // shift count already low byte of %cl
            cg.emit("shlq %cl, %rax");
        }
        BinOp::Shr => cg.emit(if signed { "sarq %cl, %rax" } else { "shrq %cl, %rax" }),
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            cg.emit("cmpq %rcx, %rax");
            let set = match (op, signed) {
                (BinOp::Eq, _) => "sete",
                (BinOp::Ne, _) => "setne",
                (BinOp::Lt, true) => "setl",
                (BinOp::Lt, false) => "setb",
                (BinOp::Le, true) => "setle",
                (BinOp::Le, false) => "setbe",
                (BinOp::Gt, true) => "setg",
                (BinOp::Gt, false) => "seta",
                (BinOp::Ge, true) => "setge",
                (BinOp::Ge, false) => "setae",
                _ => unreachable!(),
            };
            cg.emit(format!("{} %al", set));
            cg.emit("movzbq %al, %rax");
        }
        BinOp::And | BinOp::Or => unreachable!("handled by emit_logical"),
    }
}

/// lhs is in `%xmm0`, rhs in `%xmm1`; leaves the result in `%xmm0`
/// (comparisons move their `int<32>` result into `%rax` instead).
fn emit_float_op(cg: &mut CodeGen, op: BinOp) {
    match op {
        BinOp::Add => cg.emit("addsd %xmm1, %xmm0"),
        BinOp::Sub => cg.emit("subsd %xmm1, %xmm0"),
        BinOp::Mul => cg.emit("mulsd %xmm1, %xmm0"),
        BinOp::Div => cg.emit("divsd %xmm1, %xmm0"),
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            cg.emit("ucomisd %xmm1, %xmm0");
            let set = match op {
                BinOp::Eq => "sete",
                BinOp::Ne => "setne",
                BinOp::Lt => "setb",
                BinOp::Le => "setbe",
                BinOp::Gt => "seta",
                BinOp::Ge => "setae",
                _ => unreachable!(),
            };
            cg.emit(format!("{} %al", set));
            cg.emit("movzbq %al, %rax");
        }
        _ => panic!("operator {:?} is not defined on float operands", op),
    }
}

fn emit_string_op(cg: &mut CodeGen, op: BinOp, lhs: &Expr, rhs: &Expr, scope: ScopeId) -> TypeDescriptor {
    emit_expr(cg, lhs, scope);
    let lhs_slot = cg.alloc_slot(&TypeDescriptor::String);
    cg.emit(format!("movq %rax, {}(%rbp)", lhs_slot));
    emit_expr(cg, rhs, scope);
    let rhs_slot = cg.alloc_slot(&TypeDescriptor::String);
    cg.emit(format!("movq %rax, {}(%rbp)", rhs_slot));

    let helper = match op {
        BinOp::Add => strings::STR_CONCAT,
        BinOp::Sub => strings::STR_REMOVE,
        _ => unreachable!(),
    };
    let arg_slots = [
        (lhs_slot, TypeDescriptor::String),
        (rhs_slot, TypeDescriptor::String),
    ];
    calls::emit_call(cg, helper, &arg_slots, false);
    TypeDescriptor::String
}

fn emit_pointer_offset(cg: &mut CodeGen, op: BinOp, lhs: &Expr, rhs: &Expr, pointee: &TypeDescriptor, scope: ScopeId) -> TypeDescriptor {
    let elem_size = types::size_of(pointee).max(1);
    emit_expr(cg, lhs, scope);
    let ptr_slot = cg.alloc_slot(&TypeDescriptor::Pointer(Box::new(pointee.clone())));
    cg.emit(format!("movq %rax, {}(%rbp)", ptr_slot));
    emit_expr(cg, rhs, scope);
    cg.emit(format!("imulq ${}, %rax, %rax", elem_size));
    cg.emit(format!("movq {}(%rbp), %rcx", ptr_slot));
    match op {
        BinOp::Add => cg.emit("addq %rcx, %rax"),
        BinOp::Sub => {
            cg.emit("movq %rcx, %rdx");
            cg.emit("subq %rax, %rdx");
            cg.emit("movq %rdx, %rax");
        }
        _ => unreachable!(),
    }
    TypeDescriptor::Pointer(Box::new(pointee.clone()))
}

fn emit_pointer_diff(cg: &mut CodeGen, lhs: &Expr, rhs: &Expr, pointee: &TypeDescriptor, scope: ScopeId) -> TypeDescriptor {
    let elem_size = types::size_of(pointee).max(1) as i64;
    emit_expr(cg, lhs, scope);
    let tmp = cg.alloc_slot(&TypeDescriptor::Pointer(Box::new(pointee.clone())));
    cg.emit(format!("movq %rax, {}(%rbp)", tmp));
    emit_expr(cg, rhs, scope);
    cg.emit("movq %rax, %rcx");
    cg.emit(format!("movq {}(%rbp), %rax", tmp));
    cg.emit("subq %rcx, %rax");
    cg.emit("cqto");
    cg.emit(format!("movq ${}, %rcx", elem_size));
    cg.emit("idivq %rcx");
    TypeDescriptor::Int { bits: 64, signedness: Signedness::Signed }
}

fn emit_cast(cg: &mut CodeGen, ty: &crate::ast::TypeExpr, inner: &Expr, scope: ScopeId) -> TypeDescriptor {
    let from_ty = emit_expr(cg, inner, scope);
    let to_ty = typeck::resolve_type_expr(ty, cg.registry).unwrap_or(TypeDescriptor::Void);
    match (cgtypes::is_float(&from_ty), cgtypes::is_float(&to_ty)) {
        (true, false) => cg.emit("cvttsd2siq %xmm0, %rax"),
        (false, true) => cg.emit("cvtsi2sdq %rax, %xmm0"),
        _ => {}
    }
    to_ty
}

fn emit_call_expr(cg: &mut CodeGen, callee: &Expr, args: &[Expr], scope: ScopeId) -> TypeDescriptor {
    let (linkage, signature, is_std) = match callee {
        Expr::Ident { namespace, name, .. } => {
            let sym = resolve_symbol(cg, namespace.as_deref(), name, scope).clone();
            let Symbol::Function(sig) = sym else { panic!("'{}' is not callable", name) };
            let is_std = namespace.as_deref() == Some("std");
            (sig.linkage_name.clone(), sig, is_std)
        }
        Expr::Member { base, field, .. } if matches!(infer(cg, base, scope), TypeDescriptor::Array(_)) => {
            let TypeDescriptor::Array(elem) = infer(cg, base, scope) else { unreachable!() };
            return emit_array_method_call(cg, base, field, args, &elem, scope);
        }
        // non-Member, non-Ident callees (or a Member callee whose base
        // isn't an array) fall through as an indirect function-pointer call.
        _ => {
            // An indirect call through a function-pointer-valued expression.
            let ty = emit_expr(cg, callee, scope);
            let TypeDescriptor::Function { params, return_type } = ty else {
                panic!("call target is not a function value")
            };
            cg.emit("pushq %rax");
            let arg_slots = eval_args(cg, args, &params, scope);
            cg.emit("popq %r11");
            let _ = calls::emit_call(cg, "*%r11", &arg_slots, false);
            return *return_type;
        }
    };

    let arg_slots = eval_args(cg, args, &signature.params, scope);
    calls::emit_call(cg, &linkage, &arg_slots, is_std);
    signature.return_type
}

fn eval_args(cg: &mut CodeGen, args: &[Expr], param_tys: &[TypeDescriptor], scope: ScopeId) -> Vec<(i64, TypeDescriptor)> {
    let mut slots = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let ty = emit_expr(cg, arg, scope);
        let ty = param_tys.get(i).cloned().unwrap_or(ty);
        let slot = cg.alloc_slot(&ty);
        if cgtypes::is_float(&ty) {
            cg.emit(format!("movsd %xmm0, {}(%rbp)", slot));
        } else {
            cg.emit(format!("movq %rax, {}(%rbp)", slot));
        }
        slots.push((slot, ty));
    }
    slots
}

/// `a.push(v)`/`a.pop()`/`a.len()`/`a.clear()`: `array<T>`'s method surface
/// expands inline to calls against the runtime's `__c5_arr_*` helpers rather
/// than denoting real `Function`-typed symbols (`spec.md` §4.5 "Arrays").
/// Each helper takes the array header's address first; `push`/`pop` also
/// pass the address of a scratch slot holding/receiving the element and the
/// element's size, since the helpers are untyped over `void*`.
fn emit_array_method_call(cg: &mut CodeGen, base: &Expr, field: &str, args: &[Expr], elem: &TypeDescriptor, scope: ScopeId) -> TypeDescriptor {
    let ptr_ty = TypeDescriptor::Pointer(Box::new(TypeDescriptor::Void));
    let size_ty = TypeDescriptor::Int { bits: 64, signedness: Signedness::Signed };
    let elem_size = types::size_of(elem).max(1);

    emit_lvalue_addr(cg, base, scope);
    let header_slot = cg.alloc_slot(&ptr_ty);
    cg.emit(format!("movq %rax, {}(%rbp)", header_slot));

    match field {
        "push" => {
            emit_expr(cg, &args[0], scope);
            let value_slot = cg.alloc_slot(elem);
            store_value(cg, value_slot, elem);
            cg.emit(format!("leaq {}(%rbp), %rax", value_slot));
            let value_ptr_slot = cg.alloc_slot(&ptr_ty);
            cg.emit(format!("movq %rax, {}(%rbp)", value_ptr_slot));
            let size_slot = cg.alloc_slot(&size_ty);
            cg.emit(format!("movq ${}, {}(%rbp)", elem_size, size_slot));
            let arg_slots = [(header_slot, ptr_ty.clone()), (value_ptr_slot, ptr_ty), (size_slot, size_ty)];
            calls::emit_call(cg, arrays::ARR_PUSH, &arg_slots, false);
            TypeDescriptor::Void
        }
        "pop" => {
            let out_slot = cg.alloc_slot(elem);
            cg.emit(format!("leaq {}(%rbp), %rax", out_slot));
            let out_ptr_slot = cg.alloc_slot(&ptr_ty);
            cg.emit(format!("movq %rax, {}(%rbp)", out_ptr_slot));
            let size_slot = cg.alloc_slot(&size_ty);
            cg.emit(format!("movq ${}, {}(%rbp)", elem_size, size_slot));
            let arg_slots = [(header_slot, ptr_ty.clone()), (out_ptr_slot, ptr_ty), (size_slot, size_ty)];
            calls::emit_call(cg, arrays::ARR_POP, &arg_slots, false);
            if cgtypes::is_float(elem) {
                cg.emit(format!("{} {}(%rbp), %xmm0", cgtypes::load_mnemonic(elem), out_slot));
            } else {
                cg.emit(format!("{} {}(%rbp), %rax", cgtypes::load_mnemonic(elem), out_slot));
            }
            elem.clone()
        }
        "len" => {
            let arg_slots = [(header_slot, ptr_ty)];
            calls::emit_call(cg, arrays::ARR_LEN, &arg_slots, false);
            size_ty
        }
        "clear" => {
            let arg_slots = [(header_slot, ptr_ty)];
            calls::emit_call(cg, arrays::ARR_CLEAR, &arg_slots, false);
            TypeDescriptor::Void
        }
        other => panic!("codegen saw an unknown array method '{}'", other),
    }
}

fn emit_index_load(cg: &mut CodeGen, base: &Expr, index: &Expr, scope: ScopeId) -> TypeDescriptor {
    let (elem_ty, is_string) = index_target(cg, base, index, scope);
    if is_string {
        cg.emit("movzbq (%rax), %rax");
        return TypeDescriptor::Char;
    }
    cg.emit(format!("{} (%rax), %rax", cgtypes::load_mnemonic(&elem_ty)));
    elem_ty
}

/// Computes the element address for `base[index]`, leaving it in `%rax`.
/// Returns the element type, and whether `base` was a `string` (which
/// indexes to a byte rather than a fully-typed element).
fn index_target(cg: &mut CodeGen, base: &Expr, index: &Expr, scope: ScopeId) -> (TypeDescriptor, bool) {
    let base_ty = infer(cg, base, scope);
    match &base_ty {
        TypeDescriptor::String => {
            emit_expr(cg, base, scope);
            let str_slot = cg.alloc_slot(&TypeDescriptor::Pointer(Box::new(TypeDescriptor::Char)));
            cg.emit(format!("movq %rax, {}(%rbp)", str_slot));
            emit_expr(cg, index, scope);
            cg.emit(format!("movq {}(%rbp), %rcx", str_slot));
            cg.emit("addq %rcx, %rax");
            (TypeDescriptor::Char, true)
        }
        TypeDescriptor::Array(elem) => {
            let elem = (**elem).clone();
            let elem_size = types::size_of(&elem).max(1);
            emit_lvalue_addr(cg, base, scope);
            cg.emit(format!("movq {}(%rax), %rax", arrays::DATA_OFFSET));
            let data_slot = cg.alloc_slot(&TypeDescriptor::Pointer(Box::new(elem.clone())));
            cg.emit(format!("movq %rax, {}(%rbp)", data_slot));
            emit_expr(cg, index, scope);
            cg.emit(format!("imulq ${}, %rax, %rax", elem_size));
            cg.emit(format!("movq {}(%rbp), %rcx", data_slot));
            cg.emit("addq %rcx, %rax");
            (elem, false)
        }
        TypeDescriptor::Pointer(elem) => {
            let elem = (**elem).clone();
            let elem_size = types::size_of(&elem).max(1);
            emit_expr(cg, base, scope);
            let ptr_slot = cg.alloc_slot(&TypeDescriptor::Pointer(Box::new(elem.clone())));
            cg.emit(format!("movq %rax, {}(%rbp)", ptr_slot));
            emit_expr(cg, index, scope);
            cg.emit(format!("imulq ${}, %rax, %rax", elem_size));
            cg.emit(format!("movq {}(%rbp), %rcx", ptr_slot));
            cg.emit("addq %rcx, %rax");
            (elem, false)
        }
        other => panic!("type {:?} is not indexable", other),
    }
}

fn emit_field_load(cg: &mut CodeGen, expr: &Expr, scope: ScopeId) -> TypeDescriptor {
    let ty = infer(cg, expr, scope);
    emit_lvalue_addr(cg, expr, scope);
    if is_aggregate(&ty) {
        return ty;
    }
    cg.emit(format!("{} (%rax), %rax", cgtypes::load_mnemonic(&ty)));
    ty
}

/// Computes the address of an lvalue expression, leaving it in `%rax`.
/// Returns the lvalue's type.
fn emit_lvalue_addr(cg: &mut CodeGen, expr: &Expr, scope: ScopeId) -> TypeDescriptor {
    match expr {
        Expr::Ident { namespace, name, .. } => {
            let sym = resolve_symbol(cg, namespace.as_deref(), name, scope).clone();
            let Symbol::Variable { ty, storage, .. } = sym else { panic!("'{}' is not a variable", name) };
            match storage {
                StorageClass::LocalStack(offset) => cg.emit(format!("leaq {}(%rbp), %rax", offset)),
                StorageClass::Global | StorageClass::Const => cg.emit(format!("leaq {}(%rip), %rax", global_label(namespace.as_deref(), name))),
            }
            ty
        }
        Expr::Unary { op: UnaryOp::Deref, operand, .. } => {
            let ty = emit_expr(cg, operand, scope);
            let TypeDescriptor::Pointer(inner) = ty else { panic!("dereference of a non-pointer value") };
            *inner
        }
        Expr::Index { base, index, .. } => {
            let (elem_ty, is_string) = index_target(cg, base, index, scope);
            if is_string {
                panic!("string index is not an lvalue");
            }
            elem_ty
        }
        Expr::Member { base, field, .. } => {
            let base_ty = infer(cg, base, scope);
            let offset = field_offset(&base_ty, field);
            let field_ty = field_type(&base_ty, field);
            emit_lvalue_addr(cg, base, scope);
            if offset != 0 {
                cg.emit(format!("addq ${}, %rax", offset));
            }
            field_ty
        }
        Expr::Arrow { base, field, .. } => {
            let base_ty = infer(cg, base, scope);
            let TypeDescriptor::Pointer(pointee) = &base_ty else { panic!("'->' requires a pointer operand") };
            let offset = field_offset(pointee, field);
            let field_ty = field_type(pointee, field);
            emit_expr(cg, base, scope);
            if offset != 0 {
                cg.emit(format!("addq ${}, %rax", offset));
            }
            field_ty
        }
        other => panic!("expression is not an lvalue: {:?}", other),
    }
}

fn field_offset(ty: &TypeDescriptor, name: &str) -> i64 {
    match ty {
        TypeDescriptor::Struct { fields, .. } => fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.offset as i64)
            .unwrap_or_else(|| panic!("no field '{}'", name)),
        TypeDescriptor::Union { .. } => 0,
        other => panic!("type {:?} has no fields", other),
    }
}

fn field_type(ty: &TypeDescriptor, name: &str) -> TypeDescriptor {
    match ty {
        TypeDescriptor::Struct { fields, .. } => fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.ty.clone())
            .unwrap_or_else(|| panic!("no field '{}'", name)),
        TypeDescriptor::Union { variants, .. } => variants.first().cloned().unwrap_or(TypeDescriptor::Void),
        other => panic!("type {:?} has no fields", other),
    }
}

fn emit_assign(cg: &mut CodeGen, target: &Expr, compound: Option<BinOp>, value: &Expr, scope: ScopeId) -> TypeDescriptor {
    let ty = emit_lvalue_addr(cg, target, scope);
    cg.emit("pushq %rax");

    match compound {
        None => {
            emit_expr(cg, value, scope);
        }
        Some(op) => {
            cg.emit("movq (%rsp), %rcx");
            cg.emit(format!("{} (%rcx), %rax", cgtypes::load_mnemonic(&ty)));
            let lhs_slot = cg.alloc_slot(&ty);
            cg.emit(format!("movq %rax, {}(%rbp)", lhs_slot));
            emit_expr(cg, value, scope);
            cg.emit("movq %rax, %rcx");
            cg.emit(format!("movq {}(%rbp), %rax", lhs_slot));
            let signed = !matches!(&ty, TypeDescriptor::Int { signedness: Signedness::Unsigned, .. });
            if cgtypes::is_float(&ty) {
                cg.emit(format!("movq {}(%rbp), %xmm1", lhs_slot));
                emit_float_op(cg, op);
            } else {
                emit_int_op(cg, op, signed);
            }
        }
    }

    cg.emit("popq %rcx");
    let reg = if cgtypes::is_float(&ty) { "%xmm0".to_string() } else { cgtypes::sub_register("rax", &ty) };
    cg.emit(format!("{} {}, (%rcx)", cgtypes::store_mnemonic(&ty), reg));
    ty
}
