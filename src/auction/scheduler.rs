use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::auction::batch::{Batch, WorkItem};
use crate::auction::cell::Cell;
use crate::auction::types::{
    AuctionRequest, AuctionResults, LrpAuction, PlacementError, TaskAuction,
};
use crate::auction::zone::Zone;
use crate::clock::Clock;
use crate::workpool::WorkPool;

/// Runs one placement batch across a fleet snapshot.
///
/// The auction round itself is serial: all scoring, ordering, and
/// reservation decisions run on one task against the mutable zone state.
/// Parallelism happens strictly before (state gather) and after (commit),
/// both through the work pool.
///
/// Zones are keyed in a `BTreeMap` so cross-zone tie-breaks are stable and a
/// fixed snapshot always yields identical placements.
pub struct Scheduler {
    work_pool: Arc<WorkPool>,
    zones: BTreeMap<String, Zone>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        work_pool: Arc<WorkPool>,
        zones: BTreeMap<String, Zone>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            work_pool,
            zones,
            clock,
        }
    }

    /// Run the batch to completion. The scheduler (and its fleet snapshot)
    /// is consumed; every input item comes back in exactly one result list.
    pub async fn schedule(mut self, request: AuctionRequest) -> AuctionResults {
        let now = self.clock.now();
        let mut batch = Batch::new(request);

        batch.pre_filter();

        if self.zones.values().all(Zone::is_empty) {
            batch.fail_remaining(PlacementError::CellMismatch);
            return batch.into_results();
        }

        for item in batch.ordered_work() {
            match item {
                WorkItem::Lrp(lrp) => self.auction_lrp(&mut batch, lrp, now),
                WorkItem::Task(task) => self.auction_task(&mut batch, task, now),
            }
        }

        self.commit(&mut batch).await;

        let results = batch.into_results();
        tracing::info!(
            successful_lrps = results.successful_lrps.len(),
            failed_lrps = results.failed_lrps.len(),
            successful_tasks = results.successful_tasks.len(),
            failed_tasks = results.failed_tasks.len(),
            "Auction batch complete"
        );
        results
    }

    /// Two-level selection: pick the zone with the lexicographically
    /// smallest `(instances of this process, best cell score)` pair, then
    /// reserve on that zone's best cell. Fewest co-located replicas wins so
    /// processes spread across failure domains.
    fn auction_lrp(&mut self, batch: &mut Batch, mut lrp: LrpAuction, now: DateTime<Utc>) {
        let mut winner: Option<(String, usize, (usize, f64))> = None;
        let mut failure = PlacementError::CellMismatch;

        for (zone_name, zone) in &self.zones {
            match zone.bid_for_lrp(&lrp) {
                Ok((cell_index, score)) => {
                    let key = (zone.instance_count(&lrp.process_guid), score);
                    let better = match &winner {
                        None => true,
                        Some((_, _, best)) => {
                            key.0 < best.0 || (key.0 == best.0 && key.1 < best.1)
                        }
                    };
                    if better {
                        winner = Some((zone_name.clone(), cell_index, key));
                    }
                }
                Err(e) => failure = failure.max(e),
            }
        }

        match winner {
            Some((zone_name, cell_index, _)) => {
                let cell = self
                    .zones
                    .get_mut(&zone_name)
                    .and_then(|zone| zone.cell_mut(cell_index));
                if let Some(cell) = cell {
                    cell.reserve_lrp(&lrp);
                    lrp.winner = Some(cell.id().to_string());
                    lrp.attempts += 1;
                    lrp.wait_duration =
                        (now - lrp.submitted_at).to_std().unwrap_or_default();
                    batch.record_lrp_success(lrp);
                } else {
                    batch.record_lrp_failure(lrp, failure);
                }
            }
            None => batch.record_lrp_failure(lrp, failure),
        }
    }

    /// Tasks ignore zone boundaries: reserve on the globally best cell.
    fn auction_task(&mut self, batch: &mut Batch, mut auction: TaskAuction, now: DateTime<Utc>) {
        let mut winner: Option<(String, usize, f64)> = None;
        let mut failure = PlacementError::CellMismatch;

        for (zone_name, zone) in &self.zones {
            match zone.bid_for_task(&auction.task) {
                Ok((cell_index, score)) => {
                    if winner.as_ref().map_or(true, |(_, _, best)| score < *best) {
                        winner = Some((zone_name.clone(), cell_index, score));
                    }
                }
                Err(e) => failure = failure.max(e),
            }
        }

        match winner {
            Some((zone_name, cell_index, _)) => {
                let cell = self
                    .zones
                    .get_mut(&zone_name)
                    .and_then(|zone| zone.cell_mut(cell_index));
                if let Some(cell) = cell {
                    cell.reserve_task(&auction.task);
                    auction.winner = Some(cell.id().to_string());
                    auction.attempts += 1;
                    auction.wait_duration =
                        (now - auction.submitted_at).to_std().unwrap_or_default();
                    batch.record_task_success(auction);
                } else {
                    batch.record_task_failure(auction, failure);
                }
            }
            None => batch.record_task_failure(auction, failure),
        }
    }

    /// Ship every cell's pending work in parallel through the work pool and
    /// replay whatever the cells refuse back into the failure lists.
    async fn commit(&mut self, batch: &mut Batch) {
        let zones = std::mem::take(&mut self.zones);
        let handles: Vec<_> = zones
            .into_values()
            .flat_map(Zone::into_cells)
            .filter(Cell::has_pending_work)
            .map(|mut cell| self.work_pool.submit(async move { cell.commit().await }))
            .collect();

        for joined in join_all(handles).await {
            if let Ok(Some(rejected)) = joined {
                if !rejected.is_empty() {
                    batch.reject_committed_work(rejected);
                }
            }
        }
    }
}
