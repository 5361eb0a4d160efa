use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use signal_hook::consts::SIGINT;

/// Exit status after a repeated Ctrl+C (128 + SIGINT)
const FORCED_EXIT_CODE: i32 = 130;

/// Cooperative cancellation shared between the signal handler and the loops it stops
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the flag for SIGINT (Ctrl+C). A second SIGINT while the
    /// flag is already raised terminates the process with code 130.
    pub fn install() -> std::io::Result<Self> {
        let flag = Self::new();
        // Must be registered first so it sees the flag before this signal sets it
        signal_hook::flag::register_conditional_shutdown(SIGINT, FORCED_EXIT_CODE, Arc::clone(&flag.0))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&flag.0))?;
        log::debug!("SIGINT handler installed");
        Ok(flag)
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
