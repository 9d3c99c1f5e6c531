//! Ctrl-C handling for cooperative shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::error::Result;

/// Install a Ctrl-C handler that clears the returned flag.
///
/// Loops poll the flag between records and run their shutdown sequence once
/// it reads `false`.
pub fn install_ctrl_c_handler() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}
