// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Conversions between the semantic model and the CRD objects applied to the cluster

#![deny(clippy::all, clippy::pedantic)]

pub mod frrk8s;
pub mod metallb;
pub mod ovn;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FromK8sConversionError {
    #[error("Missing required data: {0}")]
    MissingData(String),
    #[error("Could not parse value: {0}")]
    ParseError(String),
}

/// Selector matching exactly `labels`; `None` when there is nothing to match on
pub(crate) fn label_selector(labels: &BTreeMap<String, String>) -> Option<LabelSelector> {
    if labels.is_empty() {
        return None;
    }
    Some(LabelSelector {
        match_labels: Some(labels.clone()),
        ..Default::default()
    })
}

pub(crate) fn metadata(
    name: &str,
    namespace: Option<&str>,
    labels: &BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_owned()),
        namespace: namespace.map(ToOwned::to_owned),
        labels: (!labels.is_empty()).then(|| labels.clone()),
        ..Default::default()
    }
}
