use std::env;
use std::path::PathBuf;

fn main() {
    // Only run bindgen and linking logic if the `tlpax-sdk` feature is enabled.
    // This allows the crate to compile without the driver if the feature is not active.
    #[cfg(feature = "tlpax-sdk")]
    {
        println!("cargo:rerun-if-env-changed=TLPAX_SDK_DIR");
        println!("cargo:rerun-if-changed=wrapper.h"); // For bindgen to re-run if wrapper changes

        let sdk_dir = env::var("TLPAX_SDK_DIR").expect(
            "TLPAX_SDK_DIR environment variable must be set when `tlpax-sdk` feature is enabled.",
        );

        let sdk_include_path = PathBuf::from(&sdk_dir).join("include");

        // Allow TLPAX_LIB_DIR to override the default lib path
        let sdk_lib_path = if let Ok(lib_dir) = env::var("TLPAX_LIB_DIR") {
            PathBuf::from(lib_dir)
        } else {
            PathBuf::from(&sdk_dir).join("lib")
        };

        if !sdk_include_path.exists() {
            panic!(
                "TLPAX SDK include path does not exist: {:?}",
                sdk_include_path
            );
        }
        // The lib path might not exist if libraries are installed globally,
        // but it's a common place. Warn rather than panic.
        if !sdk_lib_path.exists() {
            eprintln!(
                "Warning: TLPAX SDK lib path does not exist: {:?}",
                sdk_lib_path
            );
        }

        // Generate bindings
        let bindings = bindgen::Builder::default()
            // The input header we would like to generate bindings for.
            .header("wrapper.h")
            // Tell cargo to invalidate the built crate whenever any of the
            // included header files changed.
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            // Add include path for TLPAX/VISA headers
            .clang_arg(format!("-I{}", sdk_include_path.display()))
            // Allowlist functions starting with `TLPAX_`
            .allowlist_function("TLPAX_.*")
            // Allowlist the VISA scalar typedefs used by the TLPAX call surface.
            .allowlist_type("ViStatus|ViSession|ViRsrc|ViBoolean")
            .allowlist_type("ViChar|ViInt16|ViInt32|ViUInt16|ViUInt32|ViReal32|ViReal64")
            .allowlist_type("ViPInt32|ViPUInt32|ViPReal64|ViPSession")
            .default_enum_style(bindgen::EnumVariation::Rust {
                non_exhaustive: false,
            })
            // Allowlist driver constants (buffer sizes, measurement modes, error codes)
            .allowlist_var("TLPAX_.*")
            .allowlist_var("VI_.*")
            // Finish the builder and generate the bindings.
            .generate()
            .expect("Unable to generate bindings");

        // Write the bindings to the $OUT_DIR/bindings.rs file.
        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        bindings
            .write_to_file(out_path.join("bindings.rs"))
            .expect("Couldn't write bindings!");

        // Link to the TLPAX library
        println!("cargo:rustc-link-search=native={}", sdk_lib_path.display());

        #[cfg(target_os = "windows")]
        {
            println!("cargo:rustc-link-lib=TLPAX_64");
        }
        #[cfg(target_os = "macos")]
        {
            println!("cargo:rustc-link-lib=TLPAX"); // Assuming libTLPAX.dylib
        }
        #[cfg(target_os = "linux")]
        {
            println!("cargo:rustc-link-lib=TLPAX"); // Assuming libTLPAX.so
        }
    }
    #[cfg(not(feature = "tlpax-sdk"))]
    {
        // If the tlpax-sdk feature is not enabled, create a dummy bindings file
        // to allow src/lib.rs to compile without actual driver presence.
        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        std::fs::write(
            out_path.join("bindings.rs"),
            "// Dummy bindings when tlpax-sdk feature is not enabled\npub mod tlpax_bindings {}\n",
        )
        .expect("Couldn't write dummy bindings!");
    }
}
