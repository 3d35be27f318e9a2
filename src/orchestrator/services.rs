//! Service dispatch
//!
//! Each service launches its tasks into a [`RunScope`] and writes results
//! into its own section of the tree. Services with dependent listings launch
//! the parent fetch, then a task that waits for it and launches one child
//! fetch per parent record.

use std::sync::Arc;

use super::RunScope;
use crate::inventory::{Inventory, RegionInventory};
use crate::resource::{compute, gke, iam, loadbalancing, network, redis, resourcemanager, storage};

/// Services fetched once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlobalService {
    Iam,
    ResourceManager,
    Storage,
}

impl GlobalService {
    pub const ALL: [GlobalService; 3] = [
        GlobalService::Iam,
        GlobalService::ResourceManager,
        GlobalService::Storage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GlobalService::Iam => "iam",
            GlobalService::ResourceManager => "resourcemanager",
            GlobalService::Storage => "storage",
        }
    }

    pub fn launch(self, scope: &RunScope, inventory: &Arc<Inventory>) {
        match self {
            GlobalService::Iam => launch_iam(scope, inventory),
            GlobalService::ResourceManager => launch_resource_manager(scope, inventory),
            GlobalService::Storage => launch_storage(scope, inventory),
        }
    }
}

/// Services fetched once per selected region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegionalService {
    Compute,
    Network,
    LoadBalancing,
    Gke,
    Redis,
}

impl RegionalService {
    pub const ALL: [RegionalService; 5] = [
        RegionalService::Compute,
        RegionalService::Network,
        RegionalService::LoadBalancing,
        RegionalService::Gke,
        RegionalService::Redis,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RegionalService::Compute => "compute",
            RegionalService::Network => "network",
            RegionalService::LoadBalancing => "loadbalancing",
            RegionalService::Gke => "gke",
            RegionalService::Redis => "redis",
        }
    }

    pub fn launch(self, scope: &RunScope, region: &Arc<RegionInventory>) {
        match self {
            RegionalService::Compute => launch_compute(scope, region),
            RegionalService::Network => launch_network(scope, region),
            RegionalService::LoadBalancing => launch_load_balancing(scope, region),
            RegionalService::Gke => launch_gke(scope, region),
            RegionalService::Redis => launch_redis(scope, region),
        }
    }
}

/// Every service name, sorted
pub fn all_service_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = GlobalService::ALL
        .iter()
        .map(|s| s.name())
        .chain(RegionalService::ALL.iter().map(|s| s.name()))
        .collect();
    names.sort_unstable();
    names
}

fn launch_iam(scope: &RunScope, inventory: &Arc<Inventory>) {
    let inv = Arc::clone(inventory);
    let accounts = scope.fetch_into(
        "service accounts",
        |ctx| async move { iam::list_service_accounts(&ctx).await },
        move |accounts| inv.iam.service_accounts.set(accounts),
    );

    let inv = Arc::clone(inventory);
    scope.fetch_into(
        "roles",
        |ctx| async move { iam::list_roles(&ctx).await },
        move |roles| inv.iam.roles.set(roles),
    );

    // Keys and policies both hang off the account listing
    let parent = accounts.clone();
    let child_scope = scope.clone();
    let inv = Arc::clone(inventory);
    scope.launch(async move {
        parent.await;
        let emails = iam::account_emails(&inv.iam.service_accounts.snapshot());
        for email in emails {
            let target = Arc::clone(&inv);
            let account = email.clone();
            child_scope.fetch_into(
                format!("keys of {}", email),
                move |ctx| async move { iam::list_keys(&ctx, &account).await },
                move |keys| target.iam.keys.insert(email, keys),
            );
        }
    });

    let child_scope = scope.clone();
    let inv = Arc::clone(inventory);
    scope.launch(async move {
        accounts.await;
        let emails = iam::account_emails(&inv.iam.service_accounts.snapshot());
        for email in emails {
            let target = Arc::clone(&inv);
            let account = email.clone();
            child_scope.fetch_into(
                format!("IAM policy of {}", email),
                move |ctx| async move { iam::get_policy(&ctx, &account).await },
                move |policy| target.iam.policies.insert(email, policy),
            );
        }
    });
}

fn launch_resource_manager(scope: &RunScope, inventory: &Arc<Inventory>) {
    let inv = Arc::clone(inventory);
    scope.fetch_into(
        "organizations",
        |ctx| async move { resourcemanager::list_organizations(&ctx).await },
        move |organizations| inv.resource_manager.organizations.set(organizations),
    );

    let inv = Arc::clone(inventory);
    scope.fetch_into(
        "projects",
        |ctx| async move { resourcemanager::list_projects(&ctx).await },
        move |projects| inv.resource_manager.projects.set(projects),
    );
}

fn launch_storage(scope: &RunScope, inventory: &Arc<Inventory>) {
    let inv = Arc::clone(inventory);
    scope.fetch_into(
        "buckets",
        |ctx| async move { storage::list_buckets(&ctx).await },
        move |buckets| inv.storage.buckets.set(buckets),
    );
}

fn launch_compute(scope: &RunScope, region: &Arc<RegionInventory>) {
    let target = Arc::clone(region);
    let name = region.region.clone();
    let zones = scope.fetch_into(
        format!("zones of {}", region.region),
        move |ctx| async move { compute::list_zones(&ctx, &name).await },
        move |zones| target.compute.zones.set(zones),
    );

    let child_scope = scope.clone();
    let region = Arc::clone(region);
    scope.launch(async move {
        zones.await;
        // Every zone appends into the same two region-wide fields
        for zone in region.compute.zones.snapshot() {
            let target = Arc::clone(&region);
            let z = zone.clone();
            child_scope.fetch_into(
                format!("instances in {}", zone),
                move |ctx| async move { compute::list_instances(&ctx, &z).await },
                move |instances| target.compute.instances.extend(instances),
            );

            let target = Arc::clone(&region);
            let z = zone.clone();
            child_scope.fetch_into(
                format!("disks in {}", zone),
                move |ctx| async move { compute::list_disks(&ctx, &z).await },
                move |disks| target.compute.disks.extend(disks),
            );
        }
    });
}

fn launch_network(scope: &RunScope, region: &Arc<RegionInventory>) {
    let target = Arc::clone(region);
    let name = region.region.clone();
    scope.fetch_into(
        format!("subnetworks in {}", region.region),
        move |ctx| async move { network::list_subnetworks(&ctx, &name).await },
        move |subnetworks| target.network.subnetworks.set(subnetworks),
    );
}

fn launch_load_balancing(scope: &RunScope, region: &Arc<RegionInventory>) {
    let target = Arc::clone(region);
    let name = region.region.clone();
    scope.fetch_into(
        format!("forwarding rules in {}", region.region),
        move |ctx| async move { loadbalancing::list_forwarding_rules(&ctx, &name).await },
        move |rules| target.load_balancing.forwarding_rules.set(rules),
    );

    let target = Arc::clone(region);
    let name = region.region.clone();
    scope.fetch_into(
        format!("target pools in {}", region.region),
        move |ctx| async move { loadbalancing::list_target_pools(&ctx, &name).await },
        move |pools| target.load_balancing.target_pools.set(pools),
    );
}

fn launch_gke(scope: &RunScope, region: &Arc<RegionInventory>) {
    let target = Arc::clone(region);
    let name = region.region.clone();
    let clusters = scope.fetch_into(
        format!("GKE clusters in {}", region.region),
        move |ctx| async move { gke::list_clusters(&ctx, &name).await },
        move |clusters| target.gke.clusters.set(clusters),
    );

    let child_scope = scope.clone();
    let region = Arc::clone(region);
    scope.launch(async move {
        clusters.await;
        let names = gke::cluster_names(&region.gke.clusters.snapshot());
        for cluster in names {
            let target = Arc::clone(&region);
            let location = region.region.clone();
            let c = cluster.clone();
            child_scope.fetch_into(
                format!("node pools of {} in {}", cluster, region.region),
                move |ctx| async move { gke::list_node_pools(&ctx, &location, &c).await },
                move |pools| target.gke.node_pools.extend(pools),
            );
        }
    });
}

fn launch_redis(scope: &RunScope, region: &Arc<RegionInventory>) {
    let target = Arc::clone(region);
    let name = region.region.clone();
    scope.fetch_into(
        format!("Redis instances in {}", region.region),
        move |ctx| async move { redis::list_instances(&ctx, &name).await },
        move |instances| target.redis.instances.set(instances),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ServiceFilter;

    #[test]
    fn test_service_names_sorted_and_unique() {
        let names = all_service_names();
        assert_eq!(
            names,
            vec![
                "compute",
                "gke",
                "iam",
                "loadbalancing",
                "network",
                "redis",
                "resourcemanager",
                "storage"
            ]
        );
    }

    #[test]
    fn test_filter_selects_services_by_name() {
        let filter = ServiceFilter::new(["GKE", "iam"], ["iam"]);
        let regional: Vec<_> = RegionalService::ALL
            .into_iter()
            .filter(|s| filter.allows(s.name()))
            .collect();
        let global: Vec<_> = GlobalService::ALL
            .into_iter()
            .filter(|s| filter.allows(s.name()))
            .collect();
        assert_eq!(regional, vec![RegionalService::Gke]);
        assert!(global.is_empty());
    }
}
