//! Build script for c5c.
//!
//! Compiles the bundled C5 runtime (string/array helpers codegen calls into)
//! to a static archive and hands its path to `lib.rs` via `include_bytes!`,
//! mirroring how a generated program's support library is embedded in the
//! compiler binary so `c5c` has no external runtime dependency at install time.

use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    cc::Build::new()
        .file("runtime/c5_runtime.c")
        .opt_level(2)
        .flag_if_supported("-fno-stack-protector")
        .out_dir(&out_dir)
        .compile("c5_runtime");

    let lib_path = out_dir.join("libc5_runtime.a");
    println!("cargo:rustc-env=C5_RUNTIME_LIB_PATH={}", lib_path.display());
    println!("cargo:rerun-if-changed=runtime/c5_runtime.c");
}
