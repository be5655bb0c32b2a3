// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Object access by namespace and name.
//!
//! [`ObjectStore`] is what the management code needs from the cluster. The [`Gateway`]
//! implements it over the API server; tests implement it over an in-memory map.

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::client::{Gateway, Object};
use crate::error::GatewayError;
use crate::exec::PodExec;
use crate::wait::{Poll, poll_until};

/// Objects living in a namespace
pub trait Namespaced: Object + Resource<Scope = NamespaceResourceScope> {}

impl<K> Namespaced for K where K: Object + Resource<Scope = NamespaceResourceScope> {}

/// Objects the management code creates, reads and deletes, plus exec in pods
#[async_trait]
pub trait ObjectStore: PodExec {
    /// Server side apply of a namespaced object
    async fn apply_in<K: Namespaced>(&self, namespace: &str, obj: &K) -> Result<K, GatewayError>;
    /// Create a namespaced object. Fails if it exists.
    async fn create_in<K: Namespaced>(&self, namespace: &str, obj: &K) -> Result<K, GatewayError>;
    async fn get_in<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<Option<K>, GatewayError>;
    async fn list_in<K: Namespaced>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>, GatewayError>;
    /// Delete a namespaced object. Deleting an object that does not exist succeeds.
    async fn delete_in<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<(), GatewayError>;

    async fn apply_cluster<K: Object>(&self, obj: &K) -> Result<K, GatewayError>;
    async fn get_cluster<K: Object>(&self, name: &str) -> Result<Option<K>, GatewayError>;
    async fn list_cluster<K: Object>(&self, label_selector: Option<&str>) -> Result<Vec<K>, GatewayError>;
    async fn delete_cluster<K: Object>(&self, name: &str) -> Result<(), GatewayError>;

    /// Delete every object of kind `K` in `namespace`, optionally filtered by labels.
    /// Keeps going after a failure and returns the first error.
    async fn delete_all_in<K: Namespaced>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<usize, GatewayError> {
        let objects: Vec<K> = self.list_in(namespace, label_selector).await?;
        let mut first_error = None;
        let mut deleted = 0;
        for obj in &objects {
            match self.delete_in::<K>(namespace, &obj.name_any()).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!("Failed to delete {} {namespace}/{}: {e}", K::kind(&()), obj.name_any());
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }
}

#[async_trait]
impl ObjectStore for Gateway {
    async fn apply_in<K: Namespaced>(&self, namespace: &str, obj: &K) -> Result<K, GatewayError> {
        self.apply(&self.namespaced::<K>(namespace), obj).await
    }

    async fn create_in<K: Namespaced>(&self, namespace: &str, obj: &K) -> Result<K, GatewayError> {
        self.create(&self.namespaced::<K>(namespace), obj).await
    }

    async fn get_in<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<Option<K>, GatewayError> {
        self.get_opt(&self.namespaced::<K>(namespace), name).await
    }

    async fn list_in<K: Namespaced>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>, GatewayError> {
        self.list(&self.namespaced::<K>(namespace), label_selector)
            .await
    }

    async fn delete_in<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<(), GatewayError> {
        self.delete(&self.namespaced::<K>(namespace), name).await
    }

    async fn apply_cluster<K: Object>(&self, obj: &K) -> Result<K, GatewayError> {
        self.apply(&self.cluster::<K>(), obj).await
    }

    async fn get_cluster<K: Object>(&self, name: &str) -> Result<Option<K>, GatewayError> {
        self.get_opt(&self.cluster::<K>(), name).await
    }

    async fn list_cluster<K: Object>(&self, label_selector: Option<&str>) -> Result<Vec<K>, GatewayError> {
        self.list(&self.cluster::<K>(), label_selector).await
    }

    async fn delete_cluster<K: Object>(&self, name: &str) -> Result<(), GatewayError> {
        self.delete(&self.cluster::<K>(), name).await
    }
}

/// Wait until the namespaced object exists and `done` holds for it
pub async fn wait_object<S, K, F>(
    store: &S,
    namespace: &str,
    name: &str,
    poll: Poll,
    cancel: &CancellationToken,
    done: F,
) -> Result<K, GatewayError>
where
    S: ObjectStore,
    K: Namespaced,
    F: Fn(&K) -> bool,
{
    let what = format!("{} {namespace}/{name}", K::kind(&()));
    let done = &done;
    poll_until(&what, poll, cancel, || async move {
        Ok(store
            .get_in::<K>(namespace, name)
            .await?
            .filter(|obj| done(obj)))
    })
    .await
}

/// Wait until the cluster scoped object exists and `done` holds for it
pub async fn wait_cluster_object<S, K, F>(
    store: &S,
    name: &str,
    poll: Poll,
    cancel: &CancellationToken,
    done: F,
) -> Result<K, GatewayError>
where
    S: ObjectStore,
    K: Object,
    F: Fn(&K) -> bool,
{
    let what = format!("{} {name}", K::kind(&()));
    let done = &done;
    poll_until(&what, poll, cancel, || async move {
        Ok(store.get_cluster::<K>(name).await?.filter(|obj| done(obj)))
    })
    .await
}

/// Wait until the namespaced object is gone
pub async fn wait_gone<S, K>(
    store: &S,
    namespace: &str,
    name: &str,
    poll: Poll,
    cancel: &CancellationToken,
) -> Result<(), GatewayError>
where
    S: ObjectStore,
    K: Namespaced,
{
    let what = format!("deletion of {} {namespace}/{name}", K::kind(&()));
    poll_until(&what, poll, cancel, || async move {
        Ok(store
            .get_in::<K>(namespace, name)
            .await?
            .is_none()
            .then_some(()))
    })
    .await
}
