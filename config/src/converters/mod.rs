// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Converters from the semantic model to other representations

pub mod k8s;
