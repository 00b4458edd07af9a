use std::env;
use std::path::PathBuf;

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let target = env::var("TARGET").unwrap_or_default();

    println!("cargo:rerun-if-changed=link.ld");
    println!("cargo:rerun-if-changed=src/cpu/boot.s");

    // Only the bare-metal image gets the custom layout; host builds keep the
    // default linker so the library tests still link.
    if target.ends_with("-none") || target.contains("-none-") {
        println!(
            "cargo:rustc-link-arg-bins=-T{}",
            manifest_dir.join("link.ld").display()
        );
    }
}
