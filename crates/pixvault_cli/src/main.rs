//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `pixvault_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("pixvault_core version={}", pixvault_core::core_version());
    match pixvault_core::open_db_in_memory() {
        Ok(_) => println!("pixvault_core db_probe=ok"),
        Err(err) => {
            eprintln!("pixvault_core db_probe=error error={err}");
            std::process::exit(1);
        }
    }
}
