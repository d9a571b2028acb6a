//! Resolved type descriptors and their derived properties.
//!
//! A [`TypeDescriptor`] is what `TypeExpr` resolves to once struct/union
//! layouts are known. Byte size, alignment, the GAS operand suffix, and the
//! System V argument class are all pure functions of the descriptor -
//! `spec.md` §3 calls these "derived properties... computed deterministically
//! from this descriptor."

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// A field in a struct: name, resolved type, byte offset from the start of
/// the struct.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeDescriptor,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Int { bits: u32, signedness: Signedness },
    Float { bits: u32 },
    Char,
    Void,
    /// Heap string: pointer to a length-prefixed, null-terminated buffer.
    String,
    Pointer(Box<TypeDescriptor>),
    /// `array<T>`, internally `{ T* data; int<64> length; int<64> capacity; }`.
    Array(Box<TypeDescriptor>),
    Struct {
        name: String,
        fields: Vec<Field>,
    },
    Enum {
        name: String,
        variants: Vec<String>,
    },
    /// A `type` union: size is the max of the variant sizes; no runtime tag.
    Union {
        name: String,
        variants: Vec<TypeDescriptor>,
    },
    /// A function (or lifted lambda)'s signature, used where a reference
    /// to the function itself - not a call - is the value, e.g. a lambda
    /// expression's type before it decays to a code pointer.
    Function {
        params: Vec<TypeDescriptor>,
        return_type: Box<TypeDescriptor>,
    },
}

/// Which System V AMD64 register class a value of this type is passed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgClass {
    Integer,
    Sse,
}

pub fn arg_class(ty: &TypeDescriptor) -> ArgClass {
    match ty {
        TypeDescriptor::Float { .. } => ArgClass::Sse,
        _ => ArgClass::Integer,
    }
}

/// Byte size of a resolved type. Structs and unions must already have their
/// `fields`/`variants` filled in (done by the resolver's aggregate-sizing
/// pass before any `size_of` call on them).
pub fn size_of(ty: &TypeDescriptor) -> u64 {
    match ty {
        TypeDescriptor::Int { bits, .. } => (*bits as u64) / 8,
        TypeDescriptor::Float { bits } => (*bits as u64) / 8,
        TypeDescriptor::Char => 1,
        TypeDescriptor::Void => 0,
        TypeDescriptor::String => 8, // pointer to the heap buffer
        TypeDescriptor::Pointer(_) => 8,
        // { T* data; int64 length; int64 capacity }
        TypeDescriptor::Array(_) => 24,
        TypeDescriptor::Struct { fields, .. } => {
            let raw_end = fields
                .last()
                .map(|f| f.offset + size_of(&f.ty))
                .unwrap_or(0);
            let align = align_of(ty);
            round_up(raw_end, align)
        }
        TypeDescriptor::Enum { .. } => 4, // enums are stored as int<32>
        TypeDescriptor::Union { variants, .. } => {
            variants.iter().map(size_of).max().unwrap_or(0)
        }
        TypeDescriptor::Function { .. } => 8, // a bare code pointer
    }
}

pub fn align_of(ty: &TypeDescriptor) -> u64 {
    match ty {
        TypeDescriptor::Struct { fields, .. } => {
            fields.iter().map(|f| align_of(&f.ty)).max().unwrap_or(1)
        }
        TypeDescriptor::Union { variants, .. } => {
            variants.iter().map(align_of).max().unwrap_or(1)
        }
        other => size_of(other).max(1),
    }
}

fn round_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    (value + align - 1) / align * align
}

/// Lays out a struct's fields in source order with natural alignment
/// padding, per `spec.md` §3: "A struct field's offset equals the sum of
/// prior field sizes with natural alignment padding."
pub fn layout_struct(name: &str, field_types: Vec<(String, TypeDescriptor)>) -> TypeDescriptor {
    let mut offset = 0u64;
    let mut fields = Vec::with_capacity(field_types.len());
    for (fname, fty) in field_types {
        let align = align_of(&fty);
        offset = round_up(offset, align);
        let size = size_of(&fty);
        fields.push(Field {
            name: fname,
            ty: fty,
            offset,
        });
        offset += size;
    }
    TypeDescriptor::Struct {
        name: name.to_string(),
        fields,
    }
}

/// GAS operand-size suffix for a scalar type: `b`/`w`/`l`/`q`.
pub fn gas_suffix(ty: &TypeDescriptor) -> char {
    match size_of(ty) {
        1 => 'b',
        2 => 'w',
        4 => 'l',
        _ => 'q',
    }
}

/// Range check for an integer literal bound to `int<N>` (signed or
/// unsigned), `spec.md` §3/§8, error E023 on violation.
pub fn literal_in_range(value: i64, bits: u32, signedness: Signedness) -> bool {
    match signedness {
        Signedness::Signed => {
            let min = -(1i128 << (bits - 1));
            let max = (1i128 << (bits - 1)) - 1;
            let v = value as i128;
            v >= min && v <= max
        }
        Signedness::Unsigned => {
            if value < 0 {
                return false;
            }
            let max = (1u128 << bits) - 1;
            (value as u128) <= max
        }
    }
}

pub fn range_description(bits: u32, signedness: Signedness) -> String {
    match signedness {
        Signedness::Signed => {
            let min = -(1i128 << (bits - 1));
            let max = (1i128 << (bits - 1)) - 1;
            format!("[{},{}]", min, max)
        }
        Signedness::Unsigned => {
            let max = (1u128 << bits) - 1;
            format!("[0,{}]", max)
        }
    }
}

/// Names the members of a union-valued type that must be pattern-discriminated
/// before they can be used as a specific variant - see E044.
pub fn is_union(ty: &TypeDescriptor) -> bool {
    matches!(ty, TypeDescriptor::Union { .. })
}

/// Pointer compatibility: same pointee, or either side is `void*`.
pub fn pointers_compatible(a: &TypeDescriptor, b: &TypeDescriptor) -> bool {
    match (a, b) {
        (TypeDescriptor::Pointer(pa), TypeDescriptor::Pointer(pb)) => {
            matches!(**pa, TypeDescriptor::Void) || matches!(**pb, TypeDescriptor::Void) || pa == pb
        }
        _ => false,
    }
}

/// A scope-local cache of named aggregate/union definitions, populated by
/// the resolver's declaration-collection pass and consulted by sema and
/// codegen whenever a `TypeExpr::Named` needs resolving.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDescriptor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn insert(&mut self, name: String, ty: TypeDescriptor) {
        self.types.insert(name, ty);
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(bits: u32) -> TypeDescriptor {
        TypeDescriptor::Int {
            bits,
            signedness: Signedness::Signed,
        }
    }

    #[test]
    fn struct_size_includes_alignment_padding() {
        // { char c; int<32> x; } -> c at 0, pad to 4, x at 4, size 8
        let s = layout_struct(
            "S",
            vec![("c".to_string(), TypeDescriptor::Char), ("x".to_string(), int(32))],
        );
        assert_eq!(size_of(&s), 8);
        if let TypeDescriptor::Struct { fields, .. } = &s {
            assert_eq!(fields[1].offset, 4);
        } else {
            panic!("expected struct");
        }
    }

    #[test]
    fn union_size_is_max_of_variants() {
        let u = TypeDescriptor::Union {
            name: "U".to_string(),
            variants: vec![int(8), int(64), TypeDescriptor::Char],
        };
        assert_eq!(size_of(&u), 8);
    }

    #[test]
    fn literal_range_signed_boundaries() {
        assert!(literal_in_range(127, 8, Signedness::Signed));
        assert!(literal_in_range(-128, 8, Signedness::Signed));
        assert!(!literal_in_range(128, 8, Signedness::Signed));
        assert!(!literal_in_range(-129, 8, Signedness::Signed));
    }

    #[test]
    fn literal_range_unsigned_boundaries() {
        assert!(literal_in_range(255, 8, Signedness::Unsigned));
        assert!(!literal_in_range(256, 8, Signedness::Unsigned));
        assert!(!literal_in_range(-1, 8, Signedness::Unsigned));
    }

    #[test]
    fn pointer_compatible_with_void_star() {
        let ip = TypeDescriptor::Pointer(Box::new(int(32)));
        let vp = TypeDescriptor::Pointer(Box::new(TypeDescriptor::Void));
        assert!(pointers_compatible(&ip, &vp));
    }
}
