//! Typed confirmation gate for the destructive run.

use crate::errors::PistrapError;
use anyhow::Result;
use log::info;
use std::io::BufRead;
use std::path::Path;

/// Require the operator to type the device name back before anything touches
/// the card. `--yes-i-know` skips the gate; refusing returns
/// [`PistrapError::Aborted`], which the caller maps to exit code 0.
pub fn confirm_gate(device: &Path, yes_i_know: bool) -> Result<()> {
    if yes_i_know {
        info!("⚠️  --yes-i-know supplied. Skipping confirmation.");
        return Ok(());
    }
    let stdin = std::io::stdin();
    let mut lock = stdin.lock();
    confirm_gate_with(device, &mut lock)
}

/// Inner gate with an injectable reader so tests can script the answer.
pub fn confirm_gate_with(device: &Path, input: &mut dyn BufRead) -> Result<()> {
    let name = device
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| device.display().to_string());

    println!();
    println!("⚠️  WARNING ⚠️");
    println!("You are about to ERASE {}", device.display());
    println!("Every partition and all data on it will be destroyed.");
    println!("Type the device name ({}) to continue:", name);

    let mut answer = String::new();
    input.read_line(&mut answer)?;

    if answer.trim() != name {
        return Err(PistrapError::Aborted.into());
    }
    Ok(())
}
