//! Test doubles for the cell transport boundary.
//!
//! `FakeCellClient` is fully programmable and records every `perform` call;
//! `InMemoryCellRep` behaves like a real cell, applying or refusing work
//! against its own state. Both are used by the integration suite and are
//! usable by downstream simulation harnesses.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::auction::types::{CellClient, CellState, Work};
use crate::error::{AuctioneerError, Result};

#[derive(Default)]
struct FakeInner {
    state: Option<CellState>,
    state_error: Option<String>,
    perform_result: Option<Work>,
    perform_error: Option<String>,
    perform_calls: Vec<Work>,
}

/// A programmable `CellClient` that records its `perform` invocations.
#[derive(Default)]
pub struct FakeCellClient {
    inner: Mutex<FakeInner>,
}

impl FakeCellClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program the snapshot returned by `state`.
    pub fn set_state(&self, state: CellState) {
        self.inner.lock().unwrap().state = Some(state);
    }

    /// Make `state` fail with the given message.
    pub fn fail_state(&self, message: impl Into<String>) {
        self.inner.lock().unwrap().state_error = Some(message.into());
    }

    /// Program the rejected work returned by `perform`.
    pub fn set_perform_result(&self, rejected: Work) {
        self.inner.lock().unwrap().perform_result = Some(rejected);
    }

    /// Make `perform` fail with the given message.
    pub fn fail_perform(&self, message: impl Into<String>) {
        self.inner.lock().unwrap().perform_error = Some(message.into());
    }

    pub fn perform_call_count(&self) -> usize {
        self.inner.lock().unwrap().perform_calls.len()
    }

    /// The work shipped on the nth `perform` call.
    ///
    /// # Panics
    /// Panics when fewer than `n + 1` calls were made.
    pub fn perform_args_for_call(&self, n: usize) -> Work {
        self.inner.lock().unwrap().perform_calls[n].clone()
    }
}

#[async_trait]
impl CellClient for FakeCellClient {
    async fn state(&self) -> Result<CellState> {
        let inner = self.inner.lock().unwrap();
        if let Some(message) = &inner.state_error {
            return Err(AuctioneerError::Internal(message.clone()));
        }
        inner
            .state
            .clone()
            .ok_or_else(|| AuctioneerError::Internal("no state programmed".to_string()))
    }

    async fn perform(&self, work: Work) -> Result<Work> {
        let mut inner = self.inner.lock().unwrap();
        inner.perform_calls.push(work);
        if let Some(message) = &inner.perform_error {
            return Err(AuctioneerError::Internal(message.clone()));
        }
        Ok(inner.perform_result.clone().unwrap_or_default())
    }
}

/// A behaving in-memory cell: accepts work it can host, refuses the rest,
/// and mutates its own state accordingly. Resettable to its initial
/// snapshot between simulation rounds.
pub struct InMemoryCellRep {
    initial: CellState,
    state: Mutex<CellState>,
}

impl InMemoryCellRep {
    pub fn new(state: CellState) -> Self {
        Self {
            initial: state.clone(),
            state: Mutex::new(state),
        }
    }

    /// Restore the initial snapshot.
    pub fn reset(&self) {
        *self.state.lock().unwrap() = self.initial.clone();
    }
}

#[async_trait]
impl CellClient for InMemoryCellRep {
    async fn state(&self) -> Result<CellState> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn perform(&self, work: Work) -> Result<Work> {
        let mut state = self.state.lock().unwrap();
        let mut rejected = Work::default();

        for lrp in work.lrps {
            let required = lrp.required_resources();
            let hostable = !state.evacuating
                && state.rootfs_providers.supports(&lrp.rootfs)
                && state.available_resources.can_host(&required);
            if hostable {
                state.available_resources =
                    state.available_resources.checked_sub(&required).unwrap_or_default();
                state.lrps.push(crate::auction::types::Lrp {
                    process_guid: lrp.process_guid.clone(),
                    index: lrp.index,
                    memory_mb: lrp.memory_mb,
                    disk_mb: lrp.disk_mb,
                });
            } else {
                rejected.lrps.push(lrp);
            }
        }

        for task in work.tasks {
            let required = task.required_resources();
            let hostable = !state.evacuating
                && state.rootfs_providers.supports(&task.rootfs)
                && state.available_resources.can_host(&required);
            if hostable {
                state.available_resources =
                    state.available_resources.checked_sub(&required).unwrap_or_default();
            } else {
                rejected.tasks.push(task);
            }
        }

        Ok(rejected)
    }
}
