//! Build script for tlccs-sys.
//!
//! The TLCCS API is small and its header only ships with the Windows
//! installer, so the declarations are maintained by hand in `src/lib.rs`.
//! This script only emits link directives, and only with `tlccs-sdk`.

#[cfg(feature = "tlccs-sdk")]
use std::env;
#[cfg(feature = "tlccs-sdk")]
use std::path::PathBuf;

/// Where the Thorlabs installer drops the 64-bit import library.
#[cfg(feature = "tlccs-sdk")]
const DEFAULT_LIB_DIR: &str = r"C:\Program Files\IVI Foundation\VISA\Win64\Lib_x64\msc";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    #[cfg(feature = "tlccs-sdk")]
    {
        println!("cargo:rerun-if-env-changed=TLCCS_LIB_DIR");

        let lib_dir = env::var("TLCCS_LIB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_LIB_DIR));

        // Linking can still succeed through the system search path, so
        // a missing directory is reported but not fatal.
        if !lib_dir.exists() {
            println!(
                "cargo:warning=TLCCS library directory does not exist: {}",
                lib_dir.display()
            );
        }

        println!("cargo:rustc-link-search=native={}", lib_dir.display());
        println!("cargo:rustc-link-lib=dylib=TLCCS_64");
    }
}
