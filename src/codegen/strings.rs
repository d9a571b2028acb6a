//! String arithmetic lowering (`spec.md` §4.5 "Strings"): `a + b` and
//! `a - b` on `string` operands become calls into the bundled runtime
//! rather than inline byte-copy loops; `c_str(expr)` is a no-op, since a
//! `string` already *is* a `char*` into the same length-prefixed buffer
//! `runtime/c5_runtime.c`'s `c5_string_header` describes.

pub const STR_CONCAT: &str = "__c5_str_concat";
pub const STR_REMOVE: &str = "__c5_str_remove";
pub const STR_LEN: &str = "c5_str_len";
