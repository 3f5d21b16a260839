use std::sync::Arc;

use crate::auction::types::{
    CellClient, CellState, Lrp, LrpAuction, PlacementError, Resources, Task, Work,
};

/// Anti-affinity weight. Resource scores live in [0, 1], so one co-located
/// instance of the same process outweighs any resource-balance difference.
const INSTANCE_PENALTY: f64 = 1000.0;

/// In-scheduler mirror of one worker cell: an immutable client handle plus a
/// mutable projection of the cell's state. Created from a fresh snapshot at
/// the start of a batch and discarded when the batch ends.
///
/// Reservations debit `available_resources` and accumulate in the pending
/// lists; `commit` ships them in a single `perform` call.
pub struct Cell {
    id: String,
    client: Arc<dyn CellClient>,
    state: CellState,
    pending_lrps: Vec<LrpAuction>,
    pending_tasks: Vec<Task>,
}

impl Cell {
    pub fn new(id: impl Into<String>, client: Arc<dyn CellClient>, state: CellState) -> Self {
        Self {
            id: id.into(),
            client,
            state,
            pending_lrps: Vec::new(),
            pending_tasks: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn zone(&self) -> &str {
        &self.state.zone
    }

    pub fn state(&self) -> &CellState {
        &self.state
    }

    pub fn has_pending_work(&self) -> bool {
        !self.pending_lrps.is_empty() || !self.pending_tasks.is_empty()
    }

    /// Placed instances of `process_guid` on this cell, pending included.
    pub fn instance_count(&self, process_guid: &str) -> usize {
        self.state
            .lrps
            .iter()
            .filter(|lrp| lrp.process_guid == process_guid)
            .count()
    }

    /// The cell's bid for an LRP replica. Lower is better. Anti-affinity
    /// dominates resource balancing via the instance penalty.
    pub fn score_for_lrp(&self, auction: &LrpAuction) -> Result<f64, PlacementError> {
        let resource_score =
            self.resource_score(&auction.rootfs, &auction.required_resources())?;
        let local_instances = self.instance_count(&auction.process_guid) as f64;
        Ok(resource_score + INSTANCE_PENALTY * local_instances)
    }

    /// The cell's bid for a task. Tasks have no replication concept, so there
    /// is no instance penalty.
    pub fn score_for_task(&self, task: &Task) -> Result<f64, PlacementError> {
        self.resource_score(&task.rootfs, &task.required_resources())
    }

    /// Speculatively place an LRP: debit resources, project the instance into
    /// the cell's LRP list, and queue it for commit.
    ///
    /// Precondition: the most recent `score_for_lrp` for this item was ok.
    pub fn reserve_lrp(&mut self, auction: &LrpAuction) {
        self.debit(&auction.required_resources());
        self.state.lrps.push(Lrp {
            process_guid: auction.process_guid.clone(),
            index: auction.index,
            memory_mb: auction.memory_mb,
            disk_mb: auction.disk_mb,
        });
        self.pending_lrps.push(auction.clone());
    }

    /// Speculatively place a task. Precondition as for `reserve_lrp`.
    pub fn reserve_task(&mut self, task: &Task) {
        self.debit(&task.required_resources());
        self.pending_tasks.push(task.clone());
    }

    /// Ship all pending work to the cell. Returns whatever the cell refused;
    /// a failed RPC rejects everything shipped. Pending lists are cleared.
    pub async fn commit(&mut self) -> Work {
        let work = Work {
            lrps: std::mem::take(&mut self.pending_lrps),
            tasks: std::mem::take(&mut self.pending_tasks),
        };
        if work.is_empty() {
            return Work::default();
        }

        match self.client.perform(work.clone()).await {
            Ok(rejected) => rejected,
            Err(e) => {
                tracing::warn!(cell = %self.id, error = %e, "Perform failed; rejecting all work assigned to cell");
                work
            }
        }
    }

    fn debit(&mut self, required: &Resources) {
        // Scoring already proved the fit; a miss here is a caller bug.
        if let Some(remaining) = self.state.available_resources.checked_sub(required) {
            self.state.available_resources = remaining;
        }
    }

    /// Mean fractional utilization across the three dimensions after
    /// hypothetically placing the work, in [0, 1]. Emptier cells score lower
    /// and are preferred.
    fn resource_score(
        &self,
        rootfs: &str,
        required: &Resources,
    ) -> Result<f64, PlacementError> {
        if !self.state.rootfs_providers.supports(rootfs) {
            return Err(PlacementError::CellMismatch);
        }
        if self.state.evacuating {
            return Err(PlacementError::InsufficientResources);
        }
        let remaining = self
            .state
            .available_resources
            .checked_sub(required)
            .ok_or(PlacementError::InsufficientResources)?;

        let total = &self.state.total_resources;
        let fractions = [
            fraction_used(total.memory_mb, remaining.memory_mb),
            fraction_used(total.disk_mb, remaining.disk_mb),
            fraction_used(total.containers, remaining.containers),
        ];
        Ok(fractions.iter().sum::<f64>() / fractions.len() as f64)
    }
}

fn fraction_used(total: u32, remaining: u32) -> f64 {
    if total == 0 {
        return 1.0;
    }
    f64::from(total - remaining) / f64::from(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::fakes::FakeCellClient;
    use crate::auction::types::RootFsProviders;
    use chrono::Utc;

    fn lucid_providers() -> RootFsProviders {
        RootFsProviders::fixed("preloaded", ["lucid64"])
    }

    fn cell_state(memory: u32, disk: u32, containers: u32) -> CellState {
        CellState {
            zone: "z1".to_string(),
            available_resources: Resources::new(memory, disk, containers),
            total_resources: Resources::new(memory, disk, containers),
            rootfs_providers: lucid_providers(),
            lrps: Vec::new(),
            evacuating: false,
        }
    }

    fn lrp(guid: &str, index: u32, memory: u32) -> LrpAuction {
        LrpAuction::new(guid, index, "preloaded:lucid64", memory, 10, Utc::now())
    }

    #[test]
    fn emptier_cell_scores_lower() {
        let fake = Arc::new(FakeCellClient::new());
        let empty = Cell::new("empty", fake.clone(), cell_state(100, 100, 10));

        let mut busy_state = cell_state(100, 100, 10);
        busy_state.available_resources = Resources::new(20, 20, 2);
        let busy = Cell::new("busy", fake, busy_state);

        let auction = lrp("pg-1", 0, 10);
        let empty_score = empty.score_for_lrp(&auction).unwrap();
        let busy_score = busy.score_for_lrp(&auction).unwrap();
        assert!(empty_score < busy_score);
    }

    #[test]
    fn colocated_instances_dominate_resource_score() {
        let fake = Arc::new(FakeCellClient::new());

        let mut crowded_state = cell_state(1000, 1000, 100);
        crowded_state.lrps.push(Lrp {
            process_guid: "pg-1".to_string(),
            index: 0,
            memory_mb: 10,
            disk_mb: 10,
        });
        let crowded = Cell::new("crowded", fake.clone(), crowded_state);

        let mut full_state = cell_state(1000, 1000, 100);
        full_state.available_resources = Resources::new(20, 20, 2);
        let nearly_full = Cell::new("nearly-full", fake, full_state);

        let auction = lrp("pg-1", 1, 10);
        let crowded_score = crowded.score_for_lrp(&auction).unwrap();
        let full_score = nearly_full.score_for_lrp(&auction).unwrap();
        assert!(
            full_score < crowded_score,
            "a nearly-full cell without the process should beat a cell already hosting it"
        );
    }

    #[test]
    fn task_scoring_ignores_instances() {
        let fake = Arc::new(FakeCellClient::new());
        let mut state = cell_state(100, 100, 10);
        state.lrps.push(Lrp {
            process_guid: "tg-1".to_string(),
            index: 0,
            memory_mb: 10,
            disk_mb: 10,
        });
        let cell = Cell::new("c", fake, state);

        let score = cell
            .score_for_task(&Task::new("tg-1", "preloaded:lucid64", 10, 10))
            .unwrap();
        assert!(score < 1.0);
    }

    #[test]
    fn unsupported_rootfs_is_a_mismatch() {
        let fake = Arc::new(FakeCellClient::new());
        let cell = Cell::new("c", fake, cell_state(100, 100, 10));

        let auction = LrpAuction::new("pg-1", 0, "docker:unsupported", 10, 10, Utc::now());
        assert_eq!(
            cell.score_for_lrp(&auction),
            Err(PlacementError::CellMismatch)
        );
    }

    #[test]
    fn overcommit_is_insufficient_resources() {
        let fake = Arc::new(FakeCellClient::new());
        let cell = Cell::new("c", fake, cell_state(10, 10, 1));

        assert_eq!(
            cell.score_for_lrp(&lrp("pg-1", 0, 11)),
            Err(PlacementError::InsufficientResources)
        );
    }

    #[test]
    fn evacuating_cell_bids_not_ok() {
        let fake = Arc::new(FakeCellClient::new());
        let mut state = cell_state(100, 100, 10);
        state.evacuating = true;
        let cell = Cell::new("c", fake, state);

        assert_eq!(
            cell.score_for_lrp(&lrp("pg-1", 0, 10)),
            Err(PlacementError::InsufficientResources)
        );
        assert_eq!(
            cell.score_for_task(&Task::new("tg-1", "preloaded:lucid64", 10, 10)),
            Err(PlacementError::InsufficientResources)
        );
    }

    #[test]
    fn reserve_debits_and_projects() {
        let fake = Arc::new(FakeCellClient::new());
        let mut cell = Cell::new("c", fake, cell_state(100, 100, 10));

        let auction = lrp("pg-1", 0, 30);
        cell.reserve_lrp(&auction);

        assert_eq!(
            cell.state().available_resources,
            Resources::new(70, 90, 9)
        );
        assert_eq!(cell.instance_count("pg-1"), 1);
        assert!(cell.has_pending_work());

        // The projected instance raises the penalty for the next replica.
        let next = lrp("pg-1", 1, 10);
        assert!(cell.score_for_lrp(&next).unwrap() > INSTANCE_PENALTY);
    }

    #[tokio::test]
    async fn commit_ships_pending_work_once() {
        let fake = Arc::new(FakeCellClient::new());
        let mut cell = Cell::new("c", fake.clone(), cell_state(100, 100, 10));

        let auction = lrp("pg-1", 0, 10);
        let task = Task::new("tg-1", "preloaded:lucid64", 10, 10);
        cell.reserve_lrp(&auction);
        cell.reserve_task(&task);

        let rejected = cell.commit().await;
        assert!(rejected.is_empty());
        assert!(!cell.has_pending_work());

        assert_eq!(fake.perform_call_count(), 1);
        let shipped = fake.perform_args_for_call(0);
        assert_eq!(shipped.lrps, vec![auction]);
        assert_eq!(shipped.tasks, vec![task]);

        // Nothing pending, so a second commit must not call the cell again.
        let rejected = cell.commit().await;
        assert!(rejected.is_empty());
        assert_eq!(fake.perform_call_count(), 1);
    }

    #[tokio::test]
    async fn failed_perform_rejects_everything() {
        let fake = Arc::new(FakeCellClient::new());
        fake.fail_perform("kaboom");
        let mut cell = Cell::new("c", fake, cell_state(100, 100, 10));

        let auction = lrp("pg-1", 0, 10);
        cell.reserve_lrp(&auction);

        let rejected = cell.commit().await;
        assert_eq!(rejected.lrps, vec![auction]);
        assert!(!cell.has_pending_work());
    }
}
