//! # Reconciliation Pipelines
//!
//! Two passes over the sensor elements, both strictly sequential:
//!
//! - [`get`] reads live publication and cadence state from every element
//!   and merges it into the document, keeping group references wherever
//!   the device still matches the template.
//! - [`set`] resolves every stored setting and pushes the concrete values
//!   to the devices.
//!
//! A failure on one element (or one property) is logged, counted in the
//! [`RunReport`] and never stops the run. Only the inputs a run cannot do
//! without (document, directory, transport) abort it.

pub mod get;
pub mod set;

use log::warn;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::mesh::{PropertyTable, UnicastAddress};
use crate::transport::CallParams;

pub use get::{refresh_document, run_get};
pub use set::{push_document, run_set};

/// Inputs shared by both pipelines.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub params: CallParams,
    pub properties: PropertyTable,
    /// Only process this element when set.
    pub filter: Option<UnicastAddress>,
    /// Set only: resolve and log every push without sending it.
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            params: CallParams::default(),
            properties: PropertyTable::builtin(),
            filter: None,
            dry_run: false,
        }
    }
}

impl RunOptions {
    fn selects(&self, address: UnicastAddress) -> bool {
        self.filter.map_or(true, |target| target == address)
    }
}

/// Outcome counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Elements visited.
    pub elements: usize,
    /// Entries created for newly discovered elements (Get only).
    pub seeded: usize,
    /// Successful transport operations (or planned pushes on a dry run).
    pub succeeded: usize,
    /// Transport operations that failed.
    pub failed: usize,
    /// Settings skipped because they could not be resolved or named.
    pub skipped: usize,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} element(s), {} new, {} ok, {} failed, {} skipped",
            self.elements, self.seeded, self.succeeded, self.failed, self.skipped
        )
    }
}

/// Cooperative stop request, checked between elements.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the flag on the first Ctrl-C.
    pub fn install_ctrl_c(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current element");
                flag.stop();
            }
        });
    }
}
