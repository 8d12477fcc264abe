//! Configuration of the vSphere cloud provider (CPI).
//!
//! The cloud provider and the vSphere CSI driver both read an INI file in the
//! format of the legacy in-tree vSphere cloud provider. [`CpiConfig`] models
//! that file. It is embedded in the [`VSphereCluster`](crate::crd::VSphereCluster)
//! spec as JSON and is converted to the INI representation with
//! [`CpiConfig::marshal_ini`] and back with [`CpiConfig::unmarshal_ini`].
//!
//! The encoded file looks like this:
//!
//! ```ini
//! [Global]
//! secret-name = "vccreds"
//! secret-namespace = "kube-system"
//! datacenters = "us-west"
//!
//! [VirtualCenter "10.0.0.1"]
//! thumbprint = "AA:BB:CC"
//!
//! [Workspace]
//! server = "10.0.0.1"
//! datacenter = "us-west"
//! folder = "kubernetes"
//!
//! ```
use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod encoding;
mod parser;
pub mod manifests;

pub use encoding::{MarshalError, UnmarshalError, UnmarshalOptions, Warning, warn_as_fatal};
pub use parser::ParseError;

/// The vSphere cloud provider configuration.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpiConfig {
    /// Cluster wide defaults, written to the `[Global]` section.
    #[serde(default, skip_serializing_if = "CpiGlobalConfig::is_empty")]
    pub global: CpiGlobalConfig,

    /// Per vCenter overrides, keyed by the host name or IP address of the
    /// vCenter. Every entry is written to its own `[VirtualCenter "<key>"]`
    /// section.
    #[serde(
        default,
        rename = "virtualCenter",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub vcenter: BTreeMap<String, CpiVCenterConfig>,

    /// Inventory location used by the cloud provider, written to the
    /// `[Workspace]` section.
    #[serde(default, skip_serializing_if = "CpiWorkspaceConfig::is_empty")]
    pub workspace: CpiWorkspaceConfig,

    /// Settings consumed by the cluster controllers. These are not part of the
    /// INI file.
    #[serde(default, skip_serializing_if = "CpiProviderConfig::is_empty")]
    pub provider_config: CpiProviderConfig,
}

impl CpiConfig {
    /// Returns `true` if every section of the configuration is empty.
    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
            && self.vcenter.is_empty()
            && self.workspace.is_empty()
            && self.provider_config.is_empty()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpiGlobalConfig {
    /// Skip verification of the vCenter server certificate.
    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// Name of the Secret holding the vCenter credentials.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_namespace: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub port: String,

    /// Path of a CA bundle used to verify every vCenter.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_file: String,

    /// Comma separated list of datacenter names.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datacenters: String,

    /// Identifies the workload cluster, usually `<namespace>/<name>`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_id: String,
}

impl CpiGlobalConfig {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Overrides of the global credentials for a single vCenter.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpiVCenterConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// Colon separated SHA-1 checksum of the vCenter host certificate.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thumbprint: String,
}

impl CpiVCenterConfig {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpiWorkspaceConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datacenter: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub folder: String,

    /// Written as `default-datastore`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datastore: String,
}

impl CpiWorkspaceConfig {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpiProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CpiCloudConfig>,
}

impl CpiProviderConfig {
    pub fn is_empty(&self) -> bool {
        self.cloud.as_ref().is_none_or(CpiCloudConfig::is_empty)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpiCloudConfig {
    /// Image of the cloud controller manager deployed into the workload
    /// cluster.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub controller_image: String,
}

impl CpiCloudConfig {
    pub fn is_empty(&self) -> bool {
        self.controller_image.is_empty()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
