//! Signal-to-error bridging.
//!
//! SIGINT and SIGTERM must not kill the process outright: the pipeline's
//! teardown guard has to release every live mount first. The handlers here
//! only raise a flag; the executor and the stage sequencer poll it and turn
//! it into `PistrapError::Interrupted`, which unwinds through the normal
//! error path and reaches the guard.

use crate::errors::{PistrapError, Result};
use anyhow::Context;
use nix::libc::c_int;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn flag_interrupt(_signal: c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT/SIGTERM into the interrupt flag instead of immediate
/// process death. Clears any previously recorded interrupt, so a test or a
/// fresh run starts from a clean slate.
pub fn install_handlers() -> Result<()> {
    INTERRUPTED.store(false, Ordering::SeqCst);
    let action = SigAction::new(
        SigHandler::Handler(flag_interrupt),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        signal::sigaction(Signal::SIGINT, &action)
            .context("Failed to install SIGINT handler")?;
        signal::sigaction(Signal::SIGTERM, &action)
            .context("Failed to install SIGTERM handler")?;
    }
    Ok(())
}

/// Whether an interrupt signal arrived since the handlers were installed.
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Fail fast when an interrupt is pending. Called between pipeline stages
/// and before each external command.
pub fn checkpoint() -> Result<()> {
    if interrupted() {
        return Err(PistrapError::Interrupted.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_starts_with_a_clear_flag() {
        install_handlers().unwrap();
        assert!(!interrupted());
    }
}
