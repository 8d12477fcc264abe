//! Types shared by the vSphere Cluster API provider and the components it
//! deploys into workload clusters.
//!
//! The centerpiece is [`cloudprovider::CpiConfig`], the configuration of the
//! vSphere cloud provider, together with its INI encoding.
pub mod cloudprovider;
pub mod crd;
pub mod logging;

pub use k8s_openapi;
pub use kube;
pub use schemars;
