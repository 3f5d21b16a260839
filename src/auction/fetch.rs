use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::auction::cell::Cell;
use crate::auction::types::CellClient;
use crate::auction::zone::Zone;
use crate::workpool::WorkPool;

/// A registered cell: its guid plus the client handle used to reach it.
#[derive(Clone)]
pub struct CellHandle {
    pub guid: String,
    pub client: Arc<dyn CellClient>,
}

impl CellHandle {
    pub fn new(guid: impl Into<String>, client: Arc<dyn CellClient>) -> Self {
        Self {
            guid: guid.into(),
            client,
        }
    }
}

/// Fetch every cell's state concurrently through the work pool and group the
/// survivors into zones. Cells that error or time out are dropped from the
/// auction; their work falls out downstream as mismatch or insufficient
/// resources.
pub async fn fetch_zones(
    work_pool: &WorkPool,
    cells: impl IntoIterator<Item = CellHandle>,
) -> BTreeMap<String, Zone> {
    let handles: Vec<_> = cells
        .into_iter()
        .map(|handle| {
            work_pool.submit(async move {
                match handle.client.state().await {
                    Ok(state) => Some((handle, state)),
                    Err(e) => {
                        tracing::warn!(cell = %handle.guid, error = %e, "Dropping cell from auction; state fetch failed");
                        None
                    }
                }
            })
        })
        .collect();

    let mut zones: BTreeMap<String, Zone> = BTreeMap::new();
    for joined in join_all(handles).await {
        let Ok(Some(Some((handle, state)))) = joined else {
            continue;
        };
        zones
            .entry(state.zone.clone())
            .or_default()
            .push(Cell::new(handle.guid, handle.client, state));
    }
    zones
}
