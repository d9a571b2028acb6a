//! System V AMD64 argument classification and call emission (`spec.md`
//! §4.5 "Calls"): integer/pointer arguments fill `rdi, rsi, rdx, rcx, r8,
//! r9` in order, floats fill `xmm0-7`, anything past either register file
//! spills to the stack; a variadic libc call additionally needs `%al` set
//! to the number of SSE arguments used.

use super::state::CodeGen;
use super::types::{load_mnemonic, INT_ARG_REGS, SSE_ARG_REGS};
use crate::types::{self, ArgClass, TypeDescriptor};

/// Emits the register/stack setup and `call` instruction for a function
/// whose arguments already sit evaluated in the stack slots named by
/// `arg_slots` (offset from `%rbp`, paired with the argument's type, in
/// source order). Returns the number of bytes pushed for stack-spilled
/// arguments, which the caller must `addq` back off `%rsp` - already done
/// here, kept for callers that want to know whether any spilling happened.
pub fn emit_call(cg: &mut CodeGen, linkage_name: &str, arg_slots: &[(i64, TypeDescriptor)], variadic: bool) -> i64 {
    let mut int_idx = 0usize;
    let mut sse_idx = 0usize;
    let mut int_loads = Vec::new();
    let mut sse_loads = Vec::new();
    let mut stack_args = Vec::new();

    for (offset, ty) in arg_slots {
        match types::arg_class(ty) {
            ArgClass::Integer => {
                if int_idx < INT_ARG_REGS.len() {
                    int_loads.push((*offset, ty.clone(), INT_ARG_REGS[int_idx]));
                    int_idx += 1;
                } else {
                    stack_args.push((*offset, ty.clone()));
                }
            }
            ArgClass::Sse => {
                if sse_idx < SSE_ARG_REGS.len() {
                    sse_loads.push((*offset, ty.clone(), SSE_ARG_REGS[sse_idx]));
                    sse_idx += 1;
                } else {
                    stack_args.push((*offset, ty.clone()));
                }
            }
        }
    }

    let mut spilled_bytes = (stack_args.len() as i64) * 8;
    let pad = stack_args.len() % 2 == 1;
    if pad {
        spilled_bytes += 8;
    }

    if !stack_args.is_empty() {
        if pad {
            cg.emit("subq $8, %rsp");
        }
        // Right-to-left so arguments land in source order on the stack.
        for (offset, ty) in stack_args.iter().rev() {
            cg.emit(format!("movq {}(%rbp), %rax", offset));
            let _ = ty; // raw 8-byte copy; fine for both int and float slots
            cg.emit("pushq %rax");
        }
    }

    for (offset, ty, reg) in &int_loads {
        cg.emit(format!("{} {}(%rbp), %{}", load_mnemonic(ty), offset, reg));
    }
    for (offset, ty, reg) in &sse_loads {
        cg.emit(format!("{} {}(%rbp), %{}", load_mnemonic(ty), offset, reg));
    }

    if variadic {
        cg.emit(format!("movb ${}, %al", sse_idx));
    }
    cg.emit(format!("call {}", linkage_name));

    if spilled_bytes > 0 {
        cg.emit(format!("addq ${}, %rsp", spilled_bytes));
    }
    spilled_bytes
}
