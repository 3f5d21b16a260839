use std::cmp::Ordering;

use crate::auction::types::{
    AuctionRequest, AuctionResults, LrpAuction, PlacementError, TaskAuction, Work,
    CELL_MISMATCH_MESSAGE,
};

/// One work item flowing through the auction, LRP or task.
#[derive(Debug, Clone)]
pub enum WorkItem {
    Lrp(LrpAuction),
    Task(TaskAuction),
}

impl WorkItem {
    /// Placement class: index-0 LRPs go first, then tasks, then replicas.
    fn class(&self) -> u8 {
        match self {
            WorkItem::Lrp(lrp) if lrp.index == 0 => 0,
            WorkItem::Task(_) => 1,
            WorkItem::Lrp(_) => 2,
        }
    }

    fn memory_mb(&self) -> u32 {
        match self {
            WorkItem::Lrp(lrp) => lrp.memory_mb,
            WorkItem::Task(task) => task.task.memory_mb,
        }
    }

    fn index(&self) -> u32 {
        match self {
            WorkItem::Lrp(lrp) => lrp.index,
            WorkItem::Task(_) => 0,
        }
    }

    fn identifier(&self) -> String {
        match self {
            WorkItem::Lrp(lrp) => lrp.identifier(),
            WorkItem::Task(task) => task.identifier().to_string(),
        }
    }

    fn submitted_at(&self) -> chrono::DateTime<chrono::Utc> {
        match self {
            WorkItem::Lrp(lrp) => lrp.submitted_at,
            WorkItem::Task(task) => task.submitted_at,
        }
    }

    /// Total order for one batch: index-0 LRPs, then tasks, then LRPs at
    /// index ≥ 1; boulders before pebbles within each class; ties broken by
    /// index, submission time, then identifier, so placement is
    /// deterministic for a fixed snapshot.
    fn cmp_order(&self, other: &Self) -> Ordering {
        self.class()
            .cmp(&other.class())
            .then_with(|| other.memory_mb().cmp(&self.memory_mb()))
            .then_with(|| self.index().cmp(&other.index()))
            .then_with(|| self.submitted_at().cmp(&other.submitted_at()))
            .then_with(|| self.identifier().cmp(&other.identifier()))
    }
}

/// The input bundle for one scheduler invocation plus the accumulating
/// success and failure lists. Every input item ends up in exactly one list.
#[derive(Default)]
pub struct Batch {
    lrps: Vec<LrpAuction>,
    tasks: Vec<TaskAuction>,
    results: AuctionResults,
}

impl Batch {
    pub fn new(request: AuctionRequest) -> Self {
        Self {
            lrps: request.lrps,
            tasks: request.tasks,
            results: AuctionResults::default(),
        }
    }

    /// Short-circuit items the caller already marked unplaceable: they go
    /// straight to the failure lists with their attempt counter incremented
    /// and never reach the auction.
    pub fn pre_filter(&mut self) {
        let (failed, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.lrps)
            .into_iter()
            .partition(|lrp| lrp.placement_error.is_some());
        self.lrps = live;
        for mut lrp in failed {
            lrp.attempts += 1;
            self.results.failed_lrps.push(lrp);
        }

        let (failed, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|task| task.placement_error.is_some());
        self.tasks = live;
        for mut task in failed {
            task.attempts += 1;
            self.results.failed_tasks.push(task);
        }
    }

    /// Fail every remaining item with the given reason (empty-fleet path).
    pub fn fail_remaining(&mut self, error: PlacementError) {
        for mut lrp in std::mem::take(&mut self.lrps) {
            lrp.attempts += 1;
            lrp.placement_error = Some(error.message().to_string());
            self.results.failed_lrps.push(lrp);
        }
        for mut task in std::mem::take(&mut self.tasks) {
            task.attempts += 1;
            task.placement_error = Some(error.message().to_string());
            self.results.failed_tasks.push(task);
        }
    }

    /// Drain the remaining work in placement order.
    pub fn ordered_work(&mut self) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = std::mem::take(&mut self.lrps)
            .into_iter()
            .map(WorkItem::Lrp)
            .chain(
                std::mem::take(&mut self.tasks)
                    .into_iter()
                    .map(WorkItem::Task),
            )
            .collect();
        items.sort_by(WorkItem::cmp_order);
        items
    }

    pub fn record_lrp_success(&mut self, lrp: LrpAuction) {
        self.results.successful_lrps.push(lrp);
    }

    pub fn record_task_success(&mut self, task: TaskAuction) {
        self.results.successful_tasks.push(task);
    }

    pub fn record_lrp_failure(&mut self, mut lrp: LrpAuction, error: PlacementError) {
        lrp.attempts += 1;
        lrp.placement_error = Some(error.message().to_string());
        self.results.failed_lrps.push(lrp);
    }

    pub fn record_task_failure(&mut self, mut task: TaskAuction, error: PlacementError) {
        task.attempts += 1;
        task.placement_error = Some(error.message().to_string());
        self.results.failed_tasks.push(task);
    }

    /// Replay work a cell refused at commit: pull each item back out of the
    /// speculative success list into failures. Attempts were already
    /// incremented when the bid was won; the winner no longer applies.
    pub fn reject_committed_work(&mut self, rejected: Work) {
        for lrp in rejected.lrps {
            let id = lrp.identifier();
            if let Some(pos) = self
                .results
                .successful_lrps
                .iter()
                .position(|s| s.identifier() == id)
            {
                let mut failed = self.results.successful_lrps.remove(pos);
                failed.winner = None;
                failed.wait_duration = std::time::Duration::ZERO;
                failed.placement_error = Some(CELL_MISMATCH_MESSAGE.to_string());
                self.results.failed_lrps.push(failed);
            }
        }
        for task in rejected.tasks {
            if let Some(pos) = self
                .results
                .successful_tasks
                .iter()
                .position(|s| s.identifier() == task.task_guid)
            {
                let mut failed = self.results.successful_tasks.remove(pos);
                failed.winner = None;
                failed.wait_duration = std::time::Duration::ZERO;
                failed.placement_error = Some(CELL_MISMATCH_MESSAGE.to_string());
                self.results.failed_tasks.push(failed);
            }
        }
    }

    pub fn into_results(self) -> AuctionResults {
        self.results
    }
}
