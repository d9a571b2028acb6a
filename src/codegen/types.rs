//! GAS operand-size suffixes and signedness-driven load instruction
//! selection (`spec.md` §4.5 "Load/store width"), built on the sizing
//! primitives in [`crate::types`] that sema also uses.

use crate::types::{Signedness, TypeDescriptor};

pub const INT_ARG_REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];
pub const SSE_ARG_REGS: [&str; 8] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7",
];

/// The mnemonic that loads a value of `ty` from memory into a full 64-bit
/// (or `%xmm0`-width) register, sign/zero-extending per `ty`'s declared
/// signedness - `spec.md` §4.5: "signed 8/16/32-bit loads use
/// `movsbq/movswq/movslq`; unsigned loads use `movzbq/movzwq/movl`".
pub fn load_mnemonic(ty: &TypeDescriptor) -> &'static str {
    match ty {
        TypeDescriptor::Int { bits: 8, signedness: Signedness::Signed } => "movsbq",
        TypeDescriptor::Int { bits: 8, signedness: Signedness::Unsigned } => "movzbq",
        TypeDescriptor::Char => "movzbq",
        TypeDescriptor::Int { bits: 16, signedness: Signedness::Signed } => "movswq",
        TypeDescriptor::Int { bits: 16, signedness: Signedness::Unsigned } => "movzwq",
        TypeDescriptor::Int { bits: 32, signedness: Signedness::Signed } => "movslq",
        // movl into a 32-bit register already zero-extends into the upper
        // 32 bits of its 64-bit parent on x86_64.
        TypeDescriptor::Int { bits: 32, signedness: Signedness::Unsigned } => "movl",
        TypeDescriptor::Float { bits: 32 } => "movss",
        TypeDescriptor::Float { .. } => "movsd",
        _ => "movq",
    }
}

/// The mnemonic that stores a value already sitting in a full-width
/// register back down to `ty`'s declared size (no extension needed; the
/// truncating store just takes the low bits).
pub fn store_mnemonic(ty: &TypeDescriptor) -> &'static str {
    match ty {
        TypeDescriptor::Float { bits: 32 } => "movss",
        TypeDescriptor::Float { .. } => "movsd",
        _ => match crate::types::gas_suffix(ty) {
            'b' => "movb",
            'w' => "movw",
            'l' => "movl",
            _ => "movq",
        },
    }
}

/// The sub-register name holding the low `size_of(ty)` bytes of a 64-bit
/// register, for truncating loads/stores (e.g. `%rax` -> `%al`/`%ax`/`%eax`).
pub fn sub_register(base: &str, ty: &TypeDescriptor) -> String {
    let (b8, b16, b32) = match base {
        "rax" => ("al", "ax", "eax"),
        "rbx" => ("bl", "bx", "ebx"),
        "rcx" => ("cl", "cx", "ecx"),
        "rdx" => ("dl", "dx", "edx"),
        "rdi" => ("dil", "di", "edi"),
        "rsi" => ("sil", "si", "esi"),
        "r8" => ("r8b", "r8w", "r8d"),
        "r9" => ("r9b", "r9w", "r9d"),
        "r10" => ("r10b", "r10w", "r10d"),
        "r11" => ("r11b", "r11w", "r11d"),
        other => return format!("%{}", other),
    };
    match crate::types::gas_suffix(ty) {
        'b' => format!("%{}", b8),
        'w' => format!("%{}", b16),
        'l' => format!("%{}", b32),
        _ => format!("%{}", base),
    }
}

pub fn is_float(ty: &TypeDescriptor) -> bool {
    matches!(ty, TypeDescriptor::Float { .. })
}
