// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed access to the cluster. Every call runs under the gateway's per-call deadline.

use std::fmt::Debug;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, info, warn};

use crate::error::GatewayError;

trace_target!("k8s-client", LevelFilter::INFO, &["gateway"]);

/// Field manager of server side applies
pub const FIELD_MANAGER: &str = "metallb-e2e";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Objects the gateway can handle
pub trait Object:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> Object for K where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Kind and name of an object, for errors and logs
fn describe<K: Object>(name: &str) -> String {
    format!("{} {name}", K::kind(&()))
}

#[derive(Clone)]
pub struct Gateway {
    client: Client,
    call_timeout: Duration,
}

impl Gateway {
    #[must_use]
    pub fn new(client: Client, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    /// Build a gateway from the kubeconfig at `path`, or from the environment
    /// (`KUBECONFIG`, in-cluster config) when there is none.
    pub async fn from_kubeconfig(
        path: Option<&Path>,
        call_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        // kube picks a crypto provider only if exactly one is installed; ignore a second install
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let config = match path {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|e| GatewayError::Kubeconfig(format!("{}: {e}", path.display())))?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| GatewayError::Kubeconfig(e.to_string()))?
            }
            None => Config::infer()
                .await
                .map_err(|e| GatewayError::Kubeconfig(e.to_string()))?,
        };
        info!("Connecting to cluster at {}", config.cluster_url);
        let client = Client::try_from(config)?;
        Ok(Self::new(client, call_timeout))
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Api over namespaced objects of kind `K` in `namespace`
    #[must_use]
    pub fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Object + Resource<Scope = NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Api over cluster scoped objects of kind `K`
    #[must_use]
    pub fn cluster<K: Object>(&self) -> Api<K> {
        Api::all(self.client.clone())
    }

    /// Run `fut` under the per-call deadline
    pub(crate) async fn call<T, Fut>(&self, what: &str, fut: Fut) -> Result<T, GatewayError>
    where
        Fut: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result.map_err(GatewayError::from),
            Err(_) => Err(GatewayError::Deadline(what.to_string(), self.call_timeout)),
        }
    }

    pub async fn create<K: Object>(&self, api: &Api<K>, obj: &K) -> Result<K, GatewayError> {
        let name = obj.name_any();
        debug!("Creating {}", describe::<K>(&name));
        self.call(
            &format!("create {}", describe::<K>(&name)),
            api.create(&PostParams::default(), obj),
        )
        .await
    }

    /// Create or update `obj` with a server side apply. Applying the same object twice
    /// leaves the cluster unchanged.
    pub async fn apply<K: Object>(&self, api: &Api<K>, obj: &K) -> Result<K, GatewayError> {
        let name = obj.name_any();
        debug!("Applying {}", describe::<K>(&name));
        let mut obj = obj.clone();
        // server side apply refuses managed fields and resource versions
        obj.meta_mut().managed_fields = None;
        obj.meta_mut().resource_version = None;
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.call(
            &format!("apply {}", describe::<K>(&name)),
            api.patch(&name, &params, &Patch::Apply(&obj)),
        )
        .await
    }

    pub async fn get<K: Object>(&self, api: &Api<K>, name: &str) -> Result<K, GatewayError> {
        self.get_opt(api, name)
            .await?
            .ok_or_else(|| GatewayError::NotFound(describe::<K>(name)))
    }

    pub async fn get_opt<K: Object>(
        &self,
        api: &Api<K>,
        name: &str,
    ) -> Result<Option<K>, GatewayError> {
        self.call(&format!("get {}", describe::<K>(name)), api.get_opt(name))
            .await
    }

    /// List objects, optionally filtered by a label selector (`key=value,...`)
    pub async fn list<K: Object>(
        &self,
        api: &Api<K>,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>, GatewayError> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = self
            .call(&format!("list {}", K::plural(&())), api.list(&params))
            .await?;
        Ok(list.items)
    }

    /// Delete an object. Deleting an object that does not exist succeeds.
    pub async fn delete<K: Object>(&self, api: &Api<K>, name: &str) -> Result<(), GatewayError> {
        debug!("Deleting {}", describe::<K>(name));
        match self
            .call(
                &format!("delete {}", describe::<K>(name)),
                api.delete(name, &DeleteParams::default()),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Tell if the CRD named `name` (e.g. `bgppeers.metallb.io`) is installed
    pub async fn crd_exists(&self, name: &str) -> Result<bool, GatewayError> {
        let api = self.cluster::<CustomResourceDefinition>();
        Ok(self.get_opt(&api, name).await?.is_some())
    }

    /// Create the namespace unless it exists
    pub async fn ensure_namespace(&self, name: &str) -> Result<(), GatewayError> {
        let api = self.cluster::<Namespace>();
        if self.get_opt(&api, name).await?.is_some() {
            return Ok(());
        }
        let ns = Namespace {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match self.create(&api, &ns).await {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(409) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
