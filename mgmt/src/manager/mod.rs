// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Creation, update and removal of MetalLB and FRR-K8s resources

pub mod status;

use std::collections::{BTreeMap, BTreeSet};

use config::EnvConfig;
use config::model::{
    AddressPool, Advertisement, BfdProfile, BgpPlan, FrrConfiguration, Peer, RouteAdvertisement,
};
use k8s_intf::{
    Gateway, GatewayError, Namespaced, ObjectStore, Poll, pod_node, poll_until, selector_string,
    wait_cluster_object,
};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_types::frrk8s::{FRRConfiguration as FRRConfigurationCrd, FRRNodeState};
use k8s_types::metallb::{BFDProfile, BGPAdvertisement, BGPPeer, BGPSessionState, IPAddressPool};
use k8s_types::ovn::RouteAdvertisements;
use kube::ResourceExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, info, warn};

use crate::MgmtError;
use crate::harness::SPEAKER_SELECTOR;
use status::{Convergence, ConversionWatch, conversion_failures, peer_established};

/// Applies the BGP resources of a scenario. Every apply is a server side apply, so
/// applying the same object twice leaves the cluster unchanged.
pub struct Manager<S = Gateway> {
    store: S,
    namespace: String,
    frr_namespace: String,
    poll: Poll,
    cancel: CancellationToken,
    /// FRR configurations applied outside the FRR-K8s namespace, by namespace and name
    foreign_frr_configurations: Mutex<BTreeSet<(String, String)>>,
}

impl<S: ObjectStore> Manager<S> {
    #[must_use]
    pub fn new(store: S, env: &EnvConfig, cancel: CancellationToken) -> Self {
        Self {
            store,
            namespace: env.operator_namespace.clone(),
            frr_namespace: env.frrk8s_namespace.clone(),
            poll: Poll::DEFAULT,
            cancel,
            foreign_frr_configurations: Mutex::new(BTreeSet::new()),
        }
    }

    /// Deadline and interval of the waits
    #[must_use]
    pub fn with_poll(mut self, poll: Poll) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Pools of the operator namespace that can be read back
    async fn pools(&self) -> Result<Vec<AddressPool>, MgmtError> {
        let pools: Vec<IPAddressPool> = self.store.list_in(&self.namespace, None).await?;
        Ok(pools
            .iter()
            .filter_map(|p| match AddressPool::try_from(p) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("Ignoring unreadable address pool: {e}");
                    None
                }
            })
            .collect())
    }

    /// Create or update a pool. Fails if its CIDRs overlap another pool of the namespace.
    pub async fn apply_pool(&self, pool: &AddressPool) -> Result<(), MgmtError> {
        pool.validate()?;
        pool.check_no_overlap(&self.pools().await?)?;
        self.store
            .apply_in(&self.namespace, &IPAddressPool::from(pool))
            .await?;
        info!("Applied address pool {}", pool.name);
        Ok(())
    }

    /// Create or update an advertisement. The aggregation lengths are checked against the
    /// pool as found in the cluster.
    pub async fn apply_advertisement(&self, advertisement: &Advertisement) -> Result<(), MgmtError> {
        let pool = self
            .store
            .get_in::<IPAddressPool>(&self.namespace, &advertisement.pool)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("IPAddressPool {}", advertisement.pool)))?;
        advertisement.validate_against(&AddressPool::try_from(&pool)?)?;
        self.store
            .apply_in(&self.namespace, &BGPAdvertisement::from(advertisement))
            .await?;
        info!("Applied bgp advertisement {}", advertisement.name);
        Ok(())
    }

    /// Create or update a peer. With `expect_established`, wait until every speaker
    /// reports its session with the peer as established.
    pub async fn apply_peer(&self, peer: &Peer, expect_established: bool) -> Result<(), MgmtError> {
        peer.validate()?;
        self.store
            .apply_in(&self.namespace, &BGPPeer::from(peer))
            .await?;
        info!("Applied bgp peer {} ({})", peer.name, peer.peer_ip);
        if !expect_established {
            return Ok(());
        }
        let what = format!("sessions with peer {}", peer.name);
        poll_until(&what, self.poll, &self.cancel, || async move {
            let states: Vec<BGPSessionState> = self.store.list_in(&self.namespace, None).await?;
            Ok(peer_established(&states, peer.peer_ip)
                .unwrap_or(false)
                .then_some(()))
        })
        .await?;
        Ok(())
    }

    pub async fn apply_bfd_profile(&self, profile: &BfdProfile) -> Result<(), MgmtError> {
        self.store
            .apply_in(&self.namespace, &BFDProfile::from(profile))
            .await?;
        debug!("Applied bfd profile {}", profile.name);
        Ok(())
    }

    /// Nodes running a speaker and matching `node_selector`, sorted
    async fn selected_nodes(&self, node_selector: &BTreeMap<String, String>) -> Result<Vec<String>, MgmtError> {
        let selected: Option<BTreeSet<String>> = if node_selector.is_empty() {
            None
        } else {
            let selector = selector_string(node_selector);
            let nodes: Vec<Node> = self.store.list_cluster(Some(&selector)).await?;
            Some(nodes.iter().map(ResourceExt::name_any).collect())
        };
        let speakers: Vec<Pod> = self
            .store
            .list_in(&self.frr_namespace, Some(SPEAKER_SELECTOR))
            .await?;
        let nodes: BTreeSet<String> = speakers
            .iter()
            .filter_map(pod_node)
            .filter(|node| selected.as_ref().is_none_or(|s| s.contains(*node)))
            .map(ToOwned::to_owned)
            .collect();
        Ok(nodes.into_iter().collect())
    }

    /// Apply an FRR configuration and follow it to the nodes it selects.
    ///
    /// With `expect_fail` the call succeeds if the API server refuses the object or if a node
    /// reports that merging it failed; an accepted configuration is then an error.
    /// Without it, the call succeeds once every selected node runs the configuration.
    pub async fn apply_frr_configuration(
        &self,
        config: &FrrConfiguration,
        expect_fail: bool,
    ) -> Result<(), MgmtError> {
        let namespace = config.namespace.as_deref().unwrap_or(&self.frr_namespace);
        let what = format!("FRRConfiguration {}", config.name);
        let nodes = self.selected_nodes(&config.node_selector).await?;
        if nodes.is_empty() {
            return Err(MgmtError::NoNodeSelected(what));
        }
        let states: Vec<FRRNodeState> = self.store.list_cluster(None).await?;
        let watch = ConversionWatch::new(config, nodes, conversion_failures(&states));

        if namespace != self.frr_namespace {
            self.foreign_frr_configurations
                .lock()
                .insert((namespace.to_string(), config.name.clone()));
        }
        match self
            .store
            .apply_in(namespace, &FRRConfigurationCrd::from(config))
            .await
        {
            Err(e) if e.is_rejected() => {
                return if expect_fail {
                    info!("{what} rejected as expected: {e}");
                    Ok(())
                } else {
                    Err(MgmtError::Rejected(what, e.to_string()))
                };
            }
            Err(e) => return Err(e.into()),
            Ok(_) => debug!("{what} applied"),
        }

        let pending = Mutex::new(vec![]);
        let (watch, last_pending) = (&watch, &pending);
        let watched = poll_until(&format!("conversion of {what}"), self.poll, &self.cancel, || async move {
            let states: Vec<FRRNodeState> = self.store.list_cluster(None).await?;
            Ok(match watch.check(&states) {
                Convergence::Pending(nodes) => {
                    *last_pending.lock() = nodes;
                    None
                }
                done => Some(done),
            })
        })
        .await;

        match (watched, expect_fail) {
            (Ok(Convergence::Failed { node, failure }), true) => {
                info!("{what} failed to merge on {node} as expected: {failure}");
                Ok(())
            }
            (Ok(Convergence::Failed { node, failure }), false) => {
                Err(MgmtError::Rejected(what, format!("{node}: {failure}")))
            }
            (Ok(_), false) => {
                info!("Applied {what}");
                Ok(())
            }
            (Ok(_) | Err(GatewayError::WaitTimeout(..)), true) => Err(MgmtError::UnexpectedAcceptance(what)),
            (Err(GatewayError::WaitTimeout(..)), false) => {
                Err(MgmtError::NotConverged(what, pending.into_inner().join(", ")))
            }
            (Err(e), _) => Err(e.into()),
        }
    }

    /// Apply a route advertisement and wait for OVN-K to accept it
    pub async fn apply_route_advertisement(
        &self,
        advertisement: &RouteAdvertisement,
    ) -> Result<(), MgmtError> {
        self.store
            .apply_cluster(&RouteAdvertisements::from(advertisement))
            .await?;
        wait_cluster_object(
            &self.store,
            &advertisement.name,
            Poll::BGP,
            &self.cancel,
            RouteAdvertisements::is_accepted,
        )
        .await?;
        info!("Route advertisement {} accepted", advertisement.name);
        Ok(())
    }

    pub async fn delete_route_advertisement(&self, name: &str) -> Result<(), MgmtError> {
        Ok(self.store.delete_cluster::<RouteAdvertisements>(name).await?)
    }

    /// Apply a whole plan in dependency order: BFD profiles, pools, advertisements, peers
    pub async fn apply_plan(&self, plan: &BgpPlan) -> Result<(), MgmtError> {
        plan.validate()?;
        for profile in &plan.bfd_profiles {
            self.apply_bfd_profile(profile).await?;
        }
        for pool in &plan.pools {
            self.apply_pool(pool).await?;
        }
        for advertisement in &plan.advertisements {
            self.apply_advertisement(advertisement).await?;
        }
        for peer in &plan.peers {
            self.apply_peer(peer, false).await?;
        }
        Ok(())
    }

    async fn delete_kind<K: Namespaced>(&self, namespace: &str, errors: &mut Vec<GatewayError>) -> usize {
        match self.store.delete_all_in::<K>(namespace, None).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Failed to delete {}: {e}", K::plural(&()));
                errors.push(e);
                0
            }
        }
    }

    /// FRR configurations applied outside the FRR-K8s namespace. Those deleted are forgotten.
    async fn delete_foreign_frr_configurations(&self, errors: &mut Vec<GatewayError>) -> usize {
        let recorded: Vec<(String, String)> = self.foreign_frr_configurations.lock().iter().cloned().collect();
        let mut deleted = 0;
        for (namespace, name) in recorded {
            match self.store.delete_in::<FRRConfigurationCrd>(&namespace, &name).await {
                Ok(()) => {
                    self.foreign_frr_configurations
                        .lock()
                        .remove(&(namespace, name));
                    deleted += 1;
                }
                Err(e) => {
                    warn!("Failed to delete FRRConfiguration {namespace}/{name}: {e}");
                    errors.push(e);
                }
            }
        }
        deleted
    }

    /// Delete every peer, advertisement, pool, BFD profile and FRR configuration, in reverse
    /// creation order, within the wait deadline. FRR configurations this manager applied in
    /// other namespaces go too. Returns how many objects were deleted.
    pub async fn cleanup_namespace(&self) -> Result<usize, MgmtError> {
        let cleanup = async {
            let mut errors = vec![];
            let mut deleted = self.delete_foreign_frr_configurations(&mut errors).await;
            deleted += self
                .delete_kind::<FRRConfigurationCrd>(&self.frr_namespace, &mut errors)
                .await;
            deleted += self.delete_kind::<BGPPeer>(&self.namespace, &mut errors).await;
            deleted += self
                .delete_kind::<BGPAdvertisement>(&self.namespace, &mut errors)
                .await;
            deleted += self
                .delete_kind::<IPAddressPool>(&self.namespace, &mut errors)
                .await;
            deleted += self.delete_kind::<BFDProfile>(&self.namespace, &mut errors).await;
            match errors.into_iter().next() {
                Some(e) => Err(MgmtError::from(e)),
                None => Ok(deleted),
            }
        };
        let deleted = tokio::time::timeout(self.poll.timeout, cleanup)
            .await
            .map_err(|_| GatewayError::Deadline(format!("cleanup of {}", self.namespace), self.poll.timeout))??;
        info!("Deleted {deleted} objects from {}", self.namespace);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeCluster, stored};
    use config::ConfigError;
    use config::model::{FrrConfigurationBuilder, FrrNeighbor, Receive};
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_types::frrk8s::{FRRNodeStateSpec, FRRNodeStateStatus};
    use kube::api::ObjectMeta;
    use std::time::Duration;

    const NEIGHBOR: &str = "10.46.81.10";
    const OTHER_NAMESPACE: &str = "tenant-a";

    fn manager() -> Manager<FakeCluster> {
        let env = EnvConfig::defaults().unwrap();
        Manager::new(FakeCluster::default(), &env, CancellationToken::new())
            .with_poll(Poll::new(Duration::from_secs(30), Duration::from_secs(3)))
    }

    /// FRR-K8s speakers running on `nodes`
    fn with_speakers(manager: &Manager<FakeCluster>, nodes: &[&str]) {
        for node in nodes {
            let pod = Pod {
                metadata: ObjectMeta {
                    name: Some(format!("frr-k8s-{node}")),
                    labels: Some(BTreeMap::from([("app".to_string(), "frr-k8s".to_string())])),
                    ..Default::default()
                },
                spec: Some(PodSpec {
                    node_name: Some((*node).to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            };
            manager.store.insert(stored(&manager.frr_namespace, &pod));
        }
    }

    fn node_state(node: &str, conversion: &str, running: &str) -> FRRNodeState {
        let mut state = FRRNodeState::new(node, FRRNodeStateSpec {});
        state.status = Some(FRRNodeStateStatus {
            running_config: Some(running.to_string()),
            last_conversion_result: Some(conversion.to_string()),
            last_reload_result: Some("success".to_string()),
        });
        state
    }

    fn receive_only(name: &str, remote_asn: u32, prefix: &str) -> FrrConfiguration {
        FrrConfigurationBuilder::default()
            .name(name)
            .local_asn(64501)
            .neighbor(FrrNeighbor::new(NEIGHBOR.parse().unwrap(), remote_asn))
            .receive(Receive::filtered(&[prefix]).unwrap())
            .build()
            .unwrap()
    }

    fn running_config(prefixes: &[&str]) -> String {
        let mut cfg = format!("router bgp 64501\n neighbor {NEIGHBOR} remote-as 64500\n");
        for (seq, prefix) in prefixes.iter().enumerate() {
            cfg += &format!("ip prefix-list {NEIGHBOR}-inpl-ipv4 seq {seq} permit {prefix}\n");
        }
        cfg
    }

    #[tokio::test]
    async fn test_apply_pool_rejects_overlap() {
        let manager = manager();
        let p1 = AddressPool::new("p1", &["192.168.100.0/24"]).unwrap();
        manager.apply_pool(&p1).await.unwrap();
        // reapplying the same pool does not overlap with itself
        manager.apply_pool(&p1).await.unwrap();

        let p2 = AddressPool::new("p2", &["192.168.100.128/25"]).unwrap();
        let err = manager.apply_pool(&p2).await.unwrap_err();
        assert!(matches!(err, MgmtError::Config(ConfigError::OverlappingPools(..))), "{err}");
        assert_eq!(manager.store.count::<IPAddressPool>(), 1);
    }

    #[tokio::test]
    async fn test_apply_advertisement_validates_against_pool() {
        let manager = manager();
        let adv = Advertisement::new("adv1", "p1").set_aggregation_length(Some(32), None);
        let err = manager.apply_advertisement(&adv).await.unwrap_err();
        assert!(matches!(err, MgmtError::Gateway(GatewayError::NotFound(_))), "{err}");

        manager
            .apply_pool(&AddressPool::new("p1", &["192.168.100.0/28"]).unwrap())
            .await
            .unwrap();
        let err = manager.apply_advertisement(&adv).await.unwrap_err();
        assert!(matches!(err, MgmtError::Config(ConfigError::AggregationTooLong(..))), "{err}");
        assert_eq!(manager.store.count::<BGPAdvertisement>(), 0);

        let adv = adv.set_aggregation_length(Some(24), None);
        manager.apply_advertisement(&adv).await.unwrap();
        assert!(manager.store.contains::<BGPAdvertisement>(&manager.namespace, "adv1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frr_configuration_accepted_once_every_node_runs_it() {
        let manager = manager();
        with_speakers(&manager, &["worker-0", "worker-1"]);
        let a = receive_only("merge-a", 64500, "192.168.100.0/24");
        let running = running_config(&["192.168.100.0/24"]);
        manager.store.on_apply::<FRRConfigurationCrd>(
            &manager.frr_namespace,
            "merge-a",
            vec![
                stored("", &node_state("worker-0", "success", &running)),
                stored("", &node_state("worker-1", "success", &running)),
            ],
        );
        manager.apply_frr_configuration(&a, false).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_frr_configuration_needs_node_states() {
        let manager = manager();
        let a = receive_only("merge-a", 64500, "192.168.100.0/24");
        let err = manager.apply_frr_configuration(&a, false).await.unwrap_err();
        assert!(matches!(err, MgmtError::NoNodeSelected(_)), "{err}");

        // speakers but no node state at all
        with_speakers(&manager, &["worker-0"]);
        let err = manager.apply_frr_configuration(&a, false).await.unwrap_err();
        match err {
            MgmtError::NotConverged(_, pending) => assert_eq!(pending, "worker-0"),
            e => panic!("unexpected error {e}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_frr_configuration_stale_success_is_not_acceptance() {
        let manager = manager();
        with_speakers(&manager, &["worker-0"]);
        // the node still runs the first configuration only
        let running = running_config(&["192.168.100.0/24"]);
        manager
            .store
            .insert(stored("", &node_state("worker-0", "success", &running)));
        let b = receive_only("merge-b", 64500, "192.168.200.0/24");
        let err = manager.apply_frr_configuration(&b, false).await.unwrap_err();
        assert!(matches!(err, MgmtError::NotConverged(..)), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_frr_configuration_expected_failure() {
        let failure = format!("multiple asns for neighbor {NEIGHBOR}: 64500 and 64600");
        let b = receive_only("merge-b", 64600, "192.168.200.0/24");

        // reported by a node after the apply
        let manager = manager();
        with_speakers(&manager, &["worker-0"]);
        manager.store.on_apply::<FRRConfigurationCrd>(
            &manager.frr_namespace,
            "merge-b",
            vec![stored("", &node_state("worker-0", &failure, ""))],
        );
        manager.apply_frr_configuration(&b, true).await.unwrap();

        // the same failure, already there before the apply, is someone else's
        let manager = self::manager();
        with_speakers(&manager, &["worker-0"]);
        manager
            .store
            .insert(stored("", &node_state("worker-0", &failure, "")));
        let err = manager.apply_frr_configuration(&b, true).await.unwrap_err();
        assert!(matches!(err, MgmtError::UnexpectedAcceptance(_)), "{err}");

        // refused by the API server
        let manager = self::manager();
        with_speakers(&manager, &["worker-0"]);
        manager.store.reject::<FRRConfigurationCrd>();
        manager.apply_frr_configuration(&b, true).await.unwrap();
        let err = manager.apply_frr_configuration(&b, false).await.unwrap_err();
        assert!(matches!(err, MgmtError::Rejected(..)), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_frr_configuration_unexpected_acceptance() {
        let manager = manager();
        with_speakers(&manager, &["worker-0"]);
        let a = receive_only("merge-a", 64500, "192.168.100.0/24");
        manager.store.on_apply::<FRRConfigurationCrd>(
            &manager.frr_namespace,
            "merge-a",
            vec![stored("", &node_state("worker-0", "success", &running_config(&["192.168.100.0/24"])))],
        );
        let err = manager.apply_frr_configuration(&a, true).await.unwrap_err();
        assert!(matches!(err, MgmtError::UnexpectedAcceptance(_)), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_namespace() {
        let manager = manager();
        with_speakers(&manager, &["worker-0"]);
        let plan = BgpPlan::default()
            .add_pool(AddressPool::new("p1", &["192.168.100.0/28"]).unwrap())
            .add_advertisement(Advertisement::new("adv1", "p1"))
            .add_peer(Peer::new("master", NEIGHBOR.parse().unwrap(), 64501, 64500));
        manager.apply_plan(&plan).await.unwrap();

        let mut elsewhere = receive_only("tenant", 64500, "192.168.100.0/24");
        elsewhere.namespace = Some(OTHER_NAMESPACE.to_string());
        let running = running_config(&["192.168.100.0/24"]);
        manager.store.on_apply::<FRRConfigurationCrd>(
            OTHER_NAMESPACE,
            "tenant",
            vec![stored("", &node_state("worker-0", "success", &running))],
        );
        manager.apply_frr_configuration(&elsewhere, false).await.unwrap();
        assert!(manager.store.contains::<FRRConfigurationCrd>(OTHER_NAMESPACE, "tenant"));

        assert_eq!(manager.cleanup_namespace().await.unwrap(), 4);
        assert_eq!(manager.store.count::<FRRConfigurationCrd>(), 0);
        assert_eq!(manager.store.count::<IPAddressPool>(), 0);
        assert_eq!(manager.store.count::<BGPAdvertisement>(), 0);
        assert_eq!(manager.store.count::<BGPPeer>(), 0);

        // nothing left to do the second time
        manager.store.take_calls();
        assert_eq!(manager.cleanup_namespace().await.unwrap(), 0);
        assert!(manager.store.take_calls().is_empty());
    }
}
