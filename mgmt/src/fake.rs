// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory cluster the manager and harness tests run against

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_intf::{ExecOutput, GatewayError, Namespaced, Object, ObjectStore, PodExec, PodRef};
use kube::ResourceExt;
use kube::core::Status;
use parking_lot::Mutex;
use serde_json::Value;

/// kind, namespace (empty for cluster scoped objects), name
pub(crate) type Key = (String, String, String);

fn key<K: Object>(namespace: &str, name: &str) -> Key {
    (K::kind(&()).to_string(), namespace.to_string(), name.to_string())
}

/// An object as the fake stores it
pub(crate) fn stored<K: Object>(namespace: &str, obj: &K) -> (Key, Value) {
    (
        key::<K>(namespace, &obj.name_any()),
        serde_json::to_value(obj).unwrap(),
    )
}

fn api_error(code: u16, message: &str) -> GatewayError {
    GatewayError::ClientError(kube::Error::Api(
        Status::failure(message, "Invalid").with_code(code).boxed(),
    ))
}

/// `key=value,...` selectors only
fn matches_selector(value: &Value, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = &value["metadata"]["labels"];
    selector.split(',').all(|term| match term.split_once('=') {
        Some((k, v)) => labels[k].as_str() == Some(v),
        None => !labels[term].is_null(),
    })
}

/// Stores what it is given and records every change and exec, in order. Objects can be made
/// to appear when another one is applied, standing in for the controllers of the cluster.
#[derive(Default)]
pub(crate) struct FakeCluster {
    objects: Mutex<BTreeMap<Key, Value>>,
    reactions: Mutex<Vec<(Key, Vec<(Key, Value)>)>>,
    rejected_kinds: Mutex<Vec<String>>,
    exec_failures: Mutex<Vec<(String, String)>>,
    exec_answers: Mutex<Vec<(String, String)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub(crate) fn insert(&self, (key, value): (Key, Value)) {
        self.objects.lock().insert(key, value);
    }

    pub(crate) fn contains<K: Object>(&self, namespace: &str, name: &str) -> bool {
        self.objects.lock().contains_key(&key::<K>(namespace, name))
    }

    /// Number of stored objects of kind `K`
    pub(crate) fn count<K: Object>(&self) -> usize {
        let kind = K::kind(&()).to_string();
        self.objects.lock().keys().filter(|(k, _, _)| *k == kind).count()
    }

    /// Once `K` named `name` is applied in `namespace` (empty when cluster scoped), store `then`
    pub(crate) fn on_apply<K: Object>(&self, namespace: &str, name: &str, then: Vec<(Key, Value)>) {
        self.reactions.lock().push((key::<K>(namespace, name), then));
    }

    /// The API server refuses applies of `K`
    pub(crate) fn reject<K: Object>(&self) {
        self.rejected_kinds.lock().push(K::kind(&()).to_string());
    }

    /// Commands containing `pattern` fail with `output`
    pub(crate) fn fail_exec(&self, pattern: &str, output: &str) {
        self.exec_failures
            .lock()
            .push((pattern.to_string(), output.to_string()));
    }

    /// Commands containing `pattern` print `stdout`
    pub(crate) fn answer_exec(&self, pattern: &str, stdout: &str) {
        self.exec_answers
            .lock()
            .push((pattern.to_string(), stdout.to_string()));
    }

    pub(crate) fn stop_failing_exec(&self) {
        self.exec_failures.lock().clear();
    }

    /// Calls recorded since the last take
    pub(crate) fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn store<K: Object>(&self, namespace: &str, obj: &K, verb: &str) -> Result<K, GatewayError> {
        let kind = K::kind(&()).to_string();
        let (key, value) = stored(namespace, obj);
        self.record(format!("{verb} {kind} {namespace}/{}", obj.name_any()));
        if self.rejected_kinds.lock().contains(&kind) {
            return Err(api_error(422, "admission webhook denied the request"));
        }
        let mut objects = self.objects.lock();
        if verb == "create" && objects.contains_key(&key) {
            return Err(api_error(409, "already exists"));
        }
        objects.insert(key.clone(), value);
        let mut reactions = self.reactions.lock();
        if let Some(i) = reactions.iter().position(|(trigger, _)| *trigger == key) {
            let (_, then) = reactions.remove(i);
            objects.extend(then);
        }
        Ok(obj.clone())
    }

    fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>, GatewayError> {
        match self.objects.lock().get(&key::<K>(namespace, name)) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    fn list<K: Object>(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<K>, GatewayError> {
        let kind = K::kind(&()).to_string();
        self.objects
            .lock()
            .iter()
            .filter(|((k, ns, _), v)| *k == kind && ns == namespace && matches_selector(v, selector))
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(GatewayError::from))
            .collect()
    }

    fn remove<K: Object>(&self, namespace: &str, name: &str) {
        self.record(format!("delete {} {namespace}/{name}", K::kind(&())));
        self.objects.lock().remove(&key::<K>(namespace, name));
    }
}

#[async_trait]
impl PodExec for FakeCluster {
    async fn exec(&self, pod: &PodRef, command: &[String]) -> Result<ExecOutput, GatewayError> {
        let line = command.join(" ");
        self.record(format!("exec {pod}: {line}"));
        let failure = self
            .exec_failures
            .lock()
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone());
        if let Some(output) = failure {
            return Err(GatewayError::ExecFailed {
                pod: pod.to_string(),
                command: line,
                status: "command terminated with non-zero exit code: 1".into(),
                output,
            });
        }
        let answer = self
            .exec_answers
            .lock()
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, stdout)| stdout.clone());
        let stdout = match answer {
            Some(stdout) => stdout,
            None if line.contains("show version") => "FRRouting 9.1.0 (frr-master).\n".to_string(),
            None => String::new(),
        };
        Ok(ExecOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

#[async_trait]
impl ObjectStore for FakeCluster {
    async fn apply_in<K: Namespaced>(&self, namespace: &str, obj: &K) -> Result<K, GatewayError> {
        self.store(namespace, obj, "apply")
    }

    async fn create_in<K: Namespaced>(&self, namespace: &str, obj: &K) -> Result<K, GatewayError> {
        self.store(namespace, obj, "create")
    }

    async fn get_in<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<Option<K>, GatewayError> {
        self.get(namespace, name)
    }

    async fn list_in<K: Namespaced>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>, GatewayError> {
        self.list(namespace, label_selector)
    }

    async fn delete_in<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<(), GatewayError> {
        self.remove::<K>(namespace, name);
        Ok(())
    }

    async fn apply_cluster<K: Object>(&self, obj: &K) -> Result<K, GatewayError> {
        self.store("", obj, "apply")
    }

    async fn get_cluster<K: Object>(&self, name: &str) -> Result<Option<K>, GatewayError> {
        self.get("", name)
    }

    async fn list_cluster<K: Object>(&self, label_selector: Option<&str>) -> Result<Vec<K>, GatewayError> {
        self.list("", label_selector)
    }

    async fn delete_cluster<K: Object>(&self, name: &str) -> Result<(), GatewayError> {
        self.remove::<K>("", name);
        Ok(())
    }
}
