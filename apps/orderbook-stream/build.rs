//! Build Script for Order Book Stream
//!
//! Generates Rust protobuf stubs from the workspace proto definitions.
//!
//! # Panics Policy
//!
//! Build scripts return errors to Cargo, which halts the build with the
//! message. `protoc` must be available in PATH (or via `PROTOC`).

use std::{env, path::PathBuf};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Rerun build script if it changes
    println!("cargo:rerun-if-changed=build.rs");

    // Emit cfg for coverage detection
    if env::var("CARGO_LLVM_COV").is_ok()
        || env::var("LLVM_PROFILE_FILE").is_ok()
        || env::var("RUSTFLAGS").is_ok_and(|f| f.contains("instrument-coverage"))
    {
        println!("cargo:rustc-cfg=coverage");
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let proto_root = manifest_dir.join("../../packages/proto");
    let proto_file = proto_root.join("orderbook/v1/market_data.proto");

    println!("cargo:rerun-if-changed={}", proto_file.display());

    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&[proto_file], &[proto_root])?;

    Ok(())
}
