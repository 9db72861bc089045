use anyhow::{Context, Result};
use log::error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared view of the user's interrupt requests.
///
/// Outside a [`Deferral`] an interrupt terminates the process right away.
/// Inside one it only raises a flag, leaving the in-flight transfer a chance
/// to clean up after itself.
#[derive(Clone, Default)]
pub struct Interrupt {
    requested: Arc<AtomicBool>,
    deferred: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT to this handle. Can only be done once per process.
    pub fn install(&self) -> Result<()> {
        let handle = self.clone();
        ctrlc::set_handler(move || handle.on_signal())
            .context("Failed to install the interrupt handler")
    }

    fn on_signal(&self) {
        if self.deferred.load(Ordering::SeqCst) {
            self.request();
        } else {
            error!("Interrupted.");
            std::process::exit(0);
        }
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn defer(&self) -> Deferral<'_> {
        self.requested.store(false, Ordering::SeqCst);
        self.deferred.store(true, Ordering::SeqCst);
        Deferral { owner: self }
    }
}

pub struct Deferral<'a> {
    owner: &'a Interrupt,
}

impl Drop for Deferral<'_> {
    fn drop(&mut self) {
        self.owner.deferred.store(false, Ordering::SeqCst);
    }
}
