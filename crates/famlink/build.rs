//! Build provenance for `famlink version --extended`.

/// Cargo build variables re-exported to the crate under famlink names.
const PROVENANCE: [(&str, &str); 2] = [
    ("TARGET", "FAMLINK_BUILD_TARGET"),
    ("PROFILE", "FAMLINK_BUILD_PROFILE"),
];

fn main() {
    for (cargo_var, exported) in PROVENANCE {
        let value = std::env::var(cargo_var).unwrap_or_else(|_| "unknown".to_string());
        println!("cargo:rustc-env={exported}={value}");
        println!("cargo:rerun-if-env-changed={cargo_var}");
    }
    println!("cargo:rerun-if-changed=build.rs");
}
