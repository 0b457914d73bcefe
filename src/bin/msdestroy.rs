//! # msdestroy
//!
//! Destroys named tuple spaces left behind by crashed or finished
//! producers and consumers.
//!
//! ## Usage
//!
//! ```bash
//! msdestroy /jobs /results
//! ```
//!
//! Each name is opened and unlinked in turn. A failure prints one line
//! to stderr and moves on to the next name. Exit status: 0 when every
//! space was destroyed, 1 when any failed, 2 when no names were given.

use std::env;

use eyre::{Result, WrapErr};
use memspace::Space;

fn main() {
    let names: Vec<String> = env::args().skip(1).collect();

    if names.is_empty() {
        eprintln!("usage: msdestroy <space-name>...");
        std::process::exit(2);
    }

    let mut failed = false;
    for name in &names {
        if let Err(e) = destroy(name) {
            eprintln!("msdestroy: {e:#}");
            failed = true;
        }
    }

    std::process::exit(if failed { 1 } else { 0 });
}

fn destroy(name: &str) -> Result<()> {
    let space =
        Space::open_existing(name).wrap_err_with(|| format!("cannot open space '{name}'"))?;
    space
        .unlink()
        .wrap_err_with(|| format!("cannot destroy space '{name}'"))?;
    Ok(())
}
