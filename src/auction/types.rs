use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stable placement-error string reported when work fits nowhere by capacity.
pub const INSUFFICIENT_RESOURCES_MESSAGE: &str = "insufficient resources";

/// Stable placement-error string reported when no cell can serve the work's
/// root filesystem, and when a cell rejects committed work.
pub const CELL_MISMATCH_MESSAGE: &str = "found no compatible cell";

/// Why a bid round produced no winner. `InsufficientResources` outranks
/// `CellMismatch`: mismatch is only reported when no cell anywhere supports
/// the requested root filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlacementError {
    CellMismatch,
    InsufficientResources,
}

impl PlacementError {
    pub fn message(&self) -> &'static str {
        match self {
            PlacementError::CellMismatch => CELL_MISMATCH_MESSAGE,
            PlacementError::InsufficientResources => INSUFFICIENT_RESOURCES_MESSAGE,
        }
    }
}

impl std::fmt::Display for PlacementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// A resource triple. All arithmetic is componentwise and non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub memory_mb: u32,
    pub disk_mb: u32,
    pub containers: u32,
}

impl Resources {
    pub fn new(memory_mb: u32, disk_mb: u32, containers: u32) -> Self {
        Self {
            memory_mb,
            disk_mb,
            containers,
        }
    }

    /// True iff every component of `required` fits into `self`.
    pub fn can_host(&self, required: &Resources) -> bool {
        self.checked_sub(required).is_some()
    }

    /// Componentwise subtraction, `None` if any component would go negative.
    pub fn checked_sub(&self, other: &Resources) -> Option<Resources> {
        Some(Resources {
            memory_mb: self.memory_mb.checked_sub(other.memory_mb)?,
            disk_mb: self.disk_mb.checked_sub(other.disk_mb)?,
            containers: self.containers.checked_sub(other.containers)?,
        })
    }

    pub fn add(&self, other: &Resources) -> Resources {
        Resources {
            memory_mb: self.memory_mb + other.memory_mb,
            disk_mb: self.disk_mb + other.disk_mb,
            containers: self.containers + other.containers,
        }
    }
}

/// One root-filesystem scheme a cell can serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RootFsProvider {
    /// Serves any root filesystem under the scheme (e.g. `docker`).
    Arbitrary { scheme: String },
    /// Serves only the listed root filesystems under the scheme
    /// (e.g. `preloaded` with a fixed stack set).
    Fixed {
        scheme: String,
        rootfses: BTreeSet<String>,
    },
}

impl RootFsProvider {
    fn matches(&self, scheme: &str, rest: &str) -> bool {
        match self {
            RootFsProvider::Arbitrary { scheme: s } => s == scheme,
            RootFsProvider::Fixed {
                scheme: s,
                rootfses,
            } => s == scheme && rootfses.contains(rest),
        }
    }
}

/// The set of root-filesystem schemes a cell advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RootFsProviders(pub Vec<RootFsProvider>);

impl RootFsProviders {
    /// Providers that accept any URL under each of the given schemes.
    pub fn arbitrary<I, S>(schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            schemes
                .into_iter()
                .map(|s| RootFsProvider::Arbitrary { scheme: s.into() })
                .collect(),
        )
    }

    /// A single fixed provider with an allow-list of root filesystems.
    pub fn fixed<I, S>(scheme: impl Into<String>, rootfses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(vec![RootFsProvider::Fixed {
            scheme: scheme.into(),
            rootfses: rootfses.into_iter().map(Into::into).collect(),
        }])
    }

    /// True iff the rootfs URL's scheme is advertised (and, for fixed
    /// providers, the specific root filesystem is listed).
    pub fn supports(&self, rootfs: &str) -> bool {
        let Some((scheme, rest)) = split_rootfs(rootfs) else {
            return false;
        };
        self.0.iter().any(|p| p.matches(scheme, rest))
    }
}

/// Splits `scheme:rest` or `scheme://rest`; `None` when there is no scheme.
fn split_rootfs(rootfs: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = rootfs.split_once(':')?;
    if scheme.is_empty() {
        return None;
    }
    Some((scheme, rest.strip_prefix("//").unwrap_or(rest)))
}

/// A process instance already placed on a cell, as reported in its state
/// snapshot. Zones count these for anti-affinity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lrp {
    pub process_guid: String,
    pub index: u32,
    pub memory_mb: u32,
    pub disk_mb: u32,
}

impl Lrp {
    pub fn resources(&self) -> Resources {
        Resources::new(self.memory_mb, self.disk_mb, 1)
    }
}

/// Snapshot of one cell, fetched at the start of a batch.
///
/// Invariant: the resources of `lrps` plus `available_resources` equal
/// `total_resources`. Evacuating cells are retained in zones so in-flight
/// work accounting stays correct, but bid not-ok for new placements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellState {
    pub zone: String,
    pub available_resources: Resources,
    pub total_resources: Resources,
    pub rootfs_providers: RootFsProviders,
    #[serde(default)]
    pub lrps: Vec<Lrp>,
    #[serde(default)]
    pub evacuating: bool,
}

/// One replica of a long-running process up for placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LrpAuction {
    pub process_guid: String,
    pub index: u32,
    pub rootfs: String,
    pub memory_mb: u32,
    pub disk_mb: u32,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub placement_error: Option<String>,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub wait_duration: Duration,
    pub submitted_at: DateTime<Utc>,
}

impl LrpAuction {
    pub fn new(
        process_guid: impl Into<String>,
        index: u32,
        rootfs: impl Into<String>,
        memory_mb: u32,
        disk_mb: u32,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            process_guid: process_guid.into(),
            index,
            rootfs: rootfs.into(),
            memory_mb,
            disk_mb,
            attempts: 0,
            placement_error: None,
            winner: None,
            wait_duration: Duration::ZERO,
            submitted_at,
        }
    }

    pub fn identifier(&self) -> String {
        format!("{}.{}", self.process_guid, self.index)
    }

    /// Resources this replica consumes, one container included.
    pub fn required_resources(&self) -> Resources {
        Resources::new(self.memory_mb, self.disk_mb, 1)
    }
}

/// The payload shipped to a cell for a one-shot task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_guid: String,
    pub rootfs: String,
    pub memory_mb: u32,
    pub disk_mb: u32,
}

impl Task {
    pub fn new(
        task_guid: impl Into<String>,
        rootfs: impl Into<String>,
        memory_mb: u32,
        disk_mb: u32,
    ) -> Self {
        Self {
            task_guid: task_guid.into(),
            rootfs: rootfs.into(),
            memory_mb,
            disk_mb,
        }
    }

    pub fn required_resources(&self) -> Resources {
        Resources::new(self.memory_mb, self.disk_mb, 1)
    }
}

/// A one-shot task up for placement. Tasks are singletons; there is no index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAuction {
    pub task: Task,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub placement_error: Option<String>,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub wait_duration: Duration,
    pub submitted_at: DateTime<Utc>,
}

impl TaskAuction {
    pub fn new(task: Task, submitted_at: DateTime<Utc>) -> Self {
        Self {
            task,
            attempts: 0,
            placement_error: None,
            winner: None,
            wait_duration: Duration::ZERO,
            submitted_at,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.task.task_guid
    }
}

/// The work shipped to (and possibly refused by) a cell at commit time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Work {
    #[serde(default)]
    pub lrps: Vec<LrpAuction>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Work {
    pub fn is_empty(&self) -> bool {
        self.lrps.is_empty() && self.tasks.is_empty()
    }
}

/// One batch of placement requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuctionRequest {
    #[serde(default)]
    pub lrps: Vec<LrpAuction>,
    #[serde(default)]
    pub tasks: Vec<TaskAuction>,
}

/// The outcome of one batch. Every input item lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuctionResults {
    pub successful_lrps: Vec<LrpAuction>,
    pub failed_lrps: Vec<LrpAuction>,
    pub successful_tasks: Vec<TaskAuction>,
    pub failed_tasks: Vec<TaskAuction>,
}

/// The transport boundary to one cell.
///
/// `state` fetches the cell's snapshot; `perform` instructs the cell to
/// execute assigned work and returns whatever the cell refused. An `Err`
/// from `perform` means "treat everything requested as rejected".
#[async_trait]
pub trait CellClient: Send + Sync {
    async fn state(&self) -> Result<CellState>;
    async fn perform(&self, work: Work) -> Result<Work>;
}
