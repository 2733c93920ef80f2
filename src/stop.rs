//! Cooperative cancellation for long-running calculations.
//!
//! A [`StopFlag`] is shared between the caller and any number of calculators
//! or node processors. The flag is read with a relaxed atomic load in the hot
//! iteration loops; setting and resetting go through the same atomic. Flags
//! form a one-level-down hierarchy: stopping a parent stops all registered
//! children, but never the other way around.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A shared cancellation flag with child propagation.
#[derive(Debug, Default)]
pub struct StopFlag {
    cancelled: AtomicBool,
    children: Mutex<Vec<Arc<StopFlag>>>,
}

impl StopFlag {
    /// Create a new, un-cancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether cancellation has been requested.
    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Register a child flag that is cancelled and reset together with this one.
    pub fn add_child(&self, child: Arc<StopFlag>) {
        self.children.lock().push(child);
    }

    /// Remove a previously registered child flag.
    pub fn remove_child(&self, child: &Arc<StopFlag>) {
        self.children.lock().retain(|c| !Arc::ptr_eq(c, child));
    }

    /// Request cancellation of this flag and all its children.
    ///
    /// `called_from` identifies the requester in the log.
    pub fn please_stop(&self, called_from: &str) {
        log::info!("stop requested ({})", called_from);
        self.cancelled.store(true, Ordering::Relaxed);
        for child in self.children.lock().iter() {
            child.please_stop(called_from);
        }
    }

    /// Clear the flag (and all children) so new calculations can run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
        for child in self.children.lock().iter() {
            child.reset();
        }
    }
}
