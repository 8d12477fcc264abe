//! The `VSphereCluster` custom resource of the `v1alpha3` API.
//!
//! Only the parts of the resource which carry the vSphere cloud provider
//! configuration are modelled here.
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::cloudprovider::{
    CpiConfig, MarshalError,
    manifests::{self, Credentials},
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("failed to encode the cloud provider configuration of VSphereCluster {name:?}"))]
    EncodeCloudConfig { source: MarshalError, name: String },

    #[snafu(display("VSphereCluster {name:?} has no namespace"))]
    MissingNamespace { name: String },
}

/// A vSphere infrastructure cluster.
#[derive(
    CustomResource, Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize,
)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "VSphereCluster",
    plural = "vsphereclusters",
    namespaced,
    status = "VSphereClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VSphereClusterSpec {
    /// Address of the vSphere endpoint.
    pub server: String,

    /// Colon separated SHA-1 checksum of the vCenter server's host
    /// certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbprint: Option<String>,

    /// Skip verification of the vSphere server's certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    /// Cluster wide configuration of the vSphere cloud provider.
    #[serde(default, skip_serializing_if = "CpiConfig::is_empty")]
    pub cloud_provider_configuration: CpiConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VSphereClusterStatus {
    /// Whether the infrastructure is ready for machines.
    #[serde(default)]
    pub ready: bool,
}

impl VSphereCluster {
    /// Returns the cloud controller manager ConfigMap of the workload cluster.
    pub fn cloud_config_map(&self) -> Result<ConfigMap> {
        let cloud_config = self
            .spec
            .cloud_provider_configuration
            .marshal_ini_string()
            .context(EncodeCloudConfigSnafu {
                name: self.name_any(),
            })?;

        Ok(manifests::cloud_controller_manager_config_map(&cloud_config))
    }

    /// Returns the CSI driver Secret of the workload cluster. The cluster id
    /// written to it is `<namespace>/<name>` of this resource.
    pub fn csi_cloud_config_secret(&self, credentials: &Credentials) -> Result<Secret> {
        let name = self.name_any();
        let namespace = self
            .namespace()
            .context(MissingNamespaceSnafu { name: name.clone() })?;

        let config = manifests::config_for_csi(
            &namespace,
            &name,
            &self.spec.cloud_provider_configuration,
            credentials,
        );
        let cloud_config = config
            .marshal_ini_string()
            .context(EncodeCloudConfigSnafu { name })?;

        tracing::debug!(
            cluster.namespace = %namespace,
            vcenters = config.vcenter.len(),
            "built CSI cloud configuration"
        );
        Ok(manifests::csi_cloud_config_secret(&cloud_config))
    }
}
