pub mod batch;
pub mod cell;
pub mod fakes;
pub mod fetch;
pub mod scheduler;
pub mod types;
pub mod zone;

pub use cell::Cell;
pub use fetch::{fetch_zones, CellHandle};
pub use scheduler::Scheduler;
pub use types::{
    AuctionRequest, AuctionResults, CellClient, CellState, Lrp, LrpAuction, PlacementError,
    Resources, RootFsProvider, RootFsProviders, Task, TaskAuction, Work,
    CELL_MISMATCH_MESSAGE, INSUFFICIENT_RESOURCES_MESSAGE,
};
pub use zone::Zone;
