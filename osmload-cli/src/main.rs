//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use std::io;

use structured_logger::{Builder, json::new_writer};

fn main() {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stderr()))
        .init();

    if let Err(err) = osmload_cli::run() {
        eprintln!("osmload: {err}");
        std::process::exit(1);
    }
}
