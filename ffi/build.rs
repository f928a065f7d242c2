use std::env;
use std::path::PathBuf;

// Generates include/esp01.h for C firmware. A header that fails to generate
// only produces a warning; the library itself does not depend on it.

fn main() {
    println!("cargo::rerun-if-changed=src/lib.rs");
    println!("cargo::rerun-if-changed=src/types.rs");

    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let out_dir: PathBuf = match env::var_os("OUT_DIR") {
        Some(dir) => dir.into(),
        None => return,
    };
    let header = out_dir.join("include").join("esp01.h");

    let result = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("ESP01_H")
        .with_cpp_compat(true)
        .generate();

    match result {
        Ok(bindings) => {
            if let Some(parent) = header.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            bindings.write_to_file(&header);
        }
        Err(e) => println!("cargo::warning=C header not generated: {e}"),
    }
}
