use crate::auction::cell::Cell;
use crate::auction::types::{LrpAuction, PlacementError, Task};

/// An ordered collection of cells sharing one failure domain.
///
/// Bid aggregation keeps the most informative failure: insufficient
/// resources outranks cell mismatch, so mismatch is only reported when no
/// cell in the zone supports the requested root filesystem.
#[derive(Default)]
pub struct Zone {
    cells: Vec<Cell>,
}

impl Zone {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell_mut(&mut self, index: usize) -> Option<&mut Cell> {
        self.cells.get_mut(index)
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Instances of `process_guid` across all cells in the zone, pending
    /// reservations included. Drives cross-zone anti-affinity.
    pub fn instance_count(&self, process_guid: &str) -> usize {
        self.cells
            .iter()
            .map(|cell| cell.instance_count(process_guid))
            .sum()
    }

    /// The zone's best bid for an LRP replica: index of the winning cell and
    /// its score, or the dominant failure reason.
    pub fn bid_for_lrp(&self, auction: &LrpAuction) -> Result<(usize, f64), PlacementError> {
        self.best_bid(|cell| cell.score_for_lrp(auction))
    }

    /// The zone's best bid for a task.
    pub fn bid_for_task(&self, task: &Task) -> Result<(usize, f64), PlacementError> {
        self.best_bid(|cell| cell.score_for_task(task))
    }

    fn best_bid<F>(&self, score: F) -> Result<(usize, f64), PlacementError>
    where
        F: Fn(&Cell) -> Result<f64, PlacementError>,
    {
        let mut winner: Option<(usize, f64)> = None;
        let mut failure = PlacementError::CellMismatch;

        for (index, cell) in self.cells.iter().enumerate() {
            match score(cell) {
                Ok(bid) => {
                    if winner.map_or(true, |(_, best)| bid < best) {
                        winner = Some((index, bid));
                    }
                }
                Err(e) => failure = failure.max(e),
            }
        }

        winner.ok_or(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::fakes::FakeCellClient;
    use crate::auction::types::{CellState, Lrp, Resources, RootFsProviders};
    use chrono::Utc;
    use std::sync::Arc;

    fn cell(id: &str, available_memory: u32, lrps: Vec<Lrp>) -> Cell {
        let state = CellState {
            zone: "z1".to_string(),
            available_resources: Resources::new(available_memory, 100, 10),
            total_resources: Resources::new(100, 100, 10),
            rootfs_providers: RootFsProviders::fixed("preloaded", ["lucid64"]),
            lrps,
            evacuating: false,
        };
        Cell::new(id, Arc::new(FakeCellClient::new()), state)
    }

    fn placed(guid: &str, index: u32) -> Lrp {
        Lrp {
            process_guid: guid.to_string(),
            index,
            memory_mb: 10,
            disk_mb: 10,
        }
    }

    #[test]
    fn bid_picks_the_emptiest_cell() {
        let zone = Zone::new(vec![cell("busy", 20, vec![]), cell("empty", 100, vec![])]);
        let auction = LrpAuction::new("pg-1", 0, "preloaded:lucid64", 10, 10, Utc::now());

        let (index, _) = zone.bid_for_lrp(&auction).unwrap();
        assert_eq!(zone.cells()[index].id(), "empty");
    }

    #[test]
    fn bid_avoids_cells_already_hosting_the_process() {
        let zone = Zone::new(vec![
            cell("hosting", 100, vec![placed("pg-1", 0)]),
            cell("fresh", 50, vec![]),
        ]);
        let auction = LrpAuction::new("pg-1", 1, "preloaded:lucid64", 10, 10, Utc::now());

        let (index, _) = zone.bid_for_lrp(&auction).unwrap();
        assert_eq!(zone.cells()[index].id(), "fresh");
    }

    #[test]
    fn insufficient_resources_dominates_mismatch() {
        let mut incompatible = cell("incompatible", 100, vec![]);
        {
            // Rebuild with a provider set that cannot serve the auction.
            let state = CellState {
                rootfs_providers: RootFsProviders::fixed("preloaded", ["trusty64"]),
                ..incompatible.state().clone()
            };
            incompatible = Cell::new("incompatible", Arc::new(FakeCellClient::new()), state);
        }
        let zone = Zone::new(vec![incompatible, cell("full", 0, vec![])]);

        let auction = LrpAuction::new("pg-1", 0, "preloaded:lucid64", 10, 10, Utc::now());
        assert_eq!(
            zone.bid_for_lrp(&auction),
            Err(PlacementError::InsufficientResources)
        );
    }

    #[test]
    fn mismatch_only_when_nothing_supports_the_rootfs() {
        let zone = Zone::new(vec![cell("a", 100, vec![]), cell("b", 100, vec![])]);
        let auction = LrpAuction::new("pg-1", 0, "docker:unsupported", 10, 10, Utc::now());
        assert_eq!(zone.bid_for_lrp(&auction), Err(PlacementError::CellMismatch));
    }

    #[test]
    fn empty_zone_is_a_mismatch() {
        let zone = Zone::default();
        let task = Task::new("tg-1", "preloaded:lucid64", 10, 10);
        assert_eq!(zone.bid_for_task(&task), Err(PlacementError::CellMismatch));
    }

    #[test]
    fn instance_count_spans_cells() {
        let zone = Zone::new(vec![
            cell("a", 100, vec![placed("pg-1", 0), placed("pg-1", 1)]),
            cell("b", 100, vec![placed("pg-1", 2), placed("pg-2", 0)]),
        ]);
        assert_eq!(zone.instance_count("pg-1"), 3);
        assert_eq!(zone.instance_count("pg-2"), 1);
        assert_eq!(zone.instance_count("pg-3"), 0);
    }
}
