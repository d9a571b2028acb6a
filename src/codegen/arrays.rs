//! `array<T>` lowering (`spec.md` §4.5 "Arrays"): the type itself is a
//! `{ T* data; int<64> length; int<64> capacity; }` struct (`types::size_of`
//! already accounts for this), and its methods expand to calls against the
//! small runtime in `runtime/c5_runtime.c`.

pub const ARR_PUSH: &str = "__c5_arr_push";
pub const ARR_POP: &str = "__c5_arr_pop";
pub const ARR_LEN: &str = "__c5_arr_len";
pub const ARR_CLEAR: &str = "__c5_arr_clear";

/// Byte offsets within the lowered `{ data, length, capacity }` layout.
pub const DATA_OFFSET: i64 = 0;
pub const LENGTH_OFFSET: i64 = 8;
pub const CAPACITY_OFFSET: i64 = 16;
