//! Kubernetes objects which deliver the encoded cloud provider configuration
//! to the workload cluster.
use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{ConfigMap, Secret},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};

use super::{CpiConfig, CpiGlobalConfig, CpiVCenterConfig};

pub const CLOUD_PROVIDER_NAMESPACE: &str = "kube-system";

pub const CLOUD_CONFIG_MAP_NAME: &str = "vsphere-cloud-config";
pub const CLOUD_CONFIG_MAP_KEY: &str = "vsphere.conf";

pub const CSI_CLOUD_CONFIG_SECRET_NAME: &str = "csi-vsphere-config";
pub const CSI_CLOUD_CONFIG_SECRET_KEY: &str = "csi-vsphere.conf";

/// vCenter credentials handed to components which can't read them from a
/// Secret on their own.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Returns the ConfigMap read by the cloud controller manager.
pub fn cloud_controller_manager_config_map(cloud_config: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(CLOUD_CONFIG_MAP_NAME.to_owned()),
            namespace: Some(CLOUD_PROVIDER_NAMESPACE.to_owned()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(
            CLOUD_CONFIG_MAP_KEY.to_owned(),
            cloud_config.to_owned(),
        )])),
        ..ConfigMap::default()
    }
}

/// Returns the Secret read by the vSphere CSI driver. It contains
/// credentials, so unlike the cloud controller manager configuration it is not
/// stored in a ConfigMap.
pub fn csi_cloud_config_secret(cloud_config: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(CSI_CLOUD_CONFIG_SECRET_NAME.to_owned()),
            namespace: Some(CLOUD_PROVIDER_NAMESPACE.to_owned()),
            ..ObjectMeta::default()
        },
        type_: Some("Opaque".to_owned()),
        string_data: Some(BTreeMap::from([(
            CSI_CLOUD_CONFIG_SECRET_KEY.to_owned(),
            cloud_config.to_owned(),
        )])),
        ..Secret::default()
    }
}

/// Derives the configuration of the vSphere CSI driver from the cloud
/// provider configuration of a cluster.
///
/// The CSI driver does not support reading vCenter credentials from Secrets,
/// so every vCenter of `source` is written with the given `credentials`.
pub fn config_for_csi(
    cluster_namespace: &str,
    cluster_name: &str,
    source: &CpiConfig,
    credentials: &Credentials,
) -> CpiConfig {
    let vcenter = source
        .vcenter
        .iter()
        .map(|(name, vcenter)| {
            let vcenter = CpiVCenterConfig {
                username: credentials.username.clone(),
                password: credentials.password.clone(),
                thumbprint: vcenter.thumbprint.clone(),
            };
            (name.clone(), vcenter)
        })
        .collect();

    CpiConfig {
        global: CpiGlobalConfig {
            cluster_id: format!("{cluster_namespace}/{cluster_name}"),
            insecure: source.global.insecure,
            ..CpiGlobalConfig::default()
        },
        vcenter,
        ..CpiConfig::default()
    }
}
