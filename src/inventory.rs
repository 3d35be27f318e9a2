//! Result Tree
//!
//! The aggregate a run writes into. Every leaf is a [`Field`] with its own
//! lock, so tasks filling different fields never contend, and tasks filling
//! the same field only serialize the write itself.
//!
//! Records are kept as raw `serde_json::Value`s exactly as the API returned
//! them.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

/// One lock-protected leaf of the tree
#[derive(Debug, Default)]
pub struct Field<T>(Mutex<T>);

impl<T> Field<T> {
    pub fn new(value: T) -> Self {
        Self(Mutex::new(value))
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        // A panicking writer cannot leave a half-applied assignment behind,
        // so the data is still usable.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the whole value
    pub fn set(&self, value: T) {
        *self.lock() = value;
    }

    /// Run `f` against the current value while holding the lock
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }
}

impl<T: Clone> Field<T> {
    /// Copy of the current value
    pub fn snapshot(&self) -> T {
        self.lock().clone()
    }
}

impl<T: Clone> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self::new(self.snapshot())
    }
}

impl<T> Field<Vec<T>> {
    /// Append records, keeping those already present
    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.lock().extend(items);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<V> Field<BTreeMap<String, V>> {
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.lock().insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.lock().serialize(serializer)
    }
}

/// Everything collected for one project
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    pub run_id: Uuid,
    pub project: String,
    pub started_at: DateTime<Utc>,
    pub regions: BTreeMap<String, Arc<RegionInventory>>,
    pub iam: IamInventory,
    pub resource_manager: ResourceManagerInventory,
    pub storage: StorageInventory,
}

impl Inventory {
    /// An empty tree with one (empty) entry per region
    pub fn new(run_id: Uuid, project: &str, regions: &[String]) -> Self {
        Self {
            run_id,
            project: project.to_string(),
            started_at: Utc::now(),
            regions: regions
                .iter()
                .map(|region| (region.clone(), Arc::new(RegionInventory::new(region))))
                .collect(),
            iam: IamInventory::default(),
            resource_manager: ResourceManagerInventory::default(),
            storage: StorageInventory::default(),
        }
    }

    pub fn region(&self, name: &str) -> Option<&Arc<RegionInventory>> {
        self.regions.get(name)
    }
}

/// Organization-wide identity objects
#[derive(Debug, Clone, Default, Serialize)]
pub struct IamInventory {
    pub service_accounts: Field<Vec<Value>>,
    pub roles: Field<Vec<Value>>,
    /// Keys per service account email
    pub keys: Field<BTreeMap<String, Vec<Value>>>,
    /// IAM policy per service account email
    pub policies: Field<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceManagerInventory {
    pub organizations: Field<Vec<Value>>,
    pub projects: Field<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageInventory {
    pub buckets: Field<Vec<Value>>,
}

/// Everything collected in one region
#[derive(Debug, Clone, Serialize)]
pub struct RegionInventory {
    pub region: String,
    pub compute: ComputeInventory,
    pub network: NetworkInventory,
    pub load_balancing: LoadBalancingInventory,
    pub gke: GkeInventory,
    pub redis: RedisInventory,
}

impl RegionInventory {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            compute: ComputeInventory::default(),
            network: NetworkInventory::default(),
            load_balancing: LoadBalancingInventory::default(),
            gke: GkeInventory::default(),
            redis: RedisInventory::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ComputeInventory {
    /// Zone names of the region
    pub zones: Field<Vec<String>>,
    /// Instances of every zone in the region
    pub instances: Field<Vec<Value>>,
    /// Disks of every zone in the region
    pub disks: Field<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkInventory {
    pub subnetworks: Field<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadBalancingInventory {
    pub forwarding_rules: Field<Vec<Value>>,
    pub target_pools: Field<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GkeInventory {
    pub clusters: Field<Vec<Value>>,
    /// Node pools of every cluster in the region
    pub node_pools: Field<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RedisInventory {
    pub instances: Field<Vec<Value>>,
}
