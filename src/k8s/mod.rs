//! Kubernetes integration for tipsy
//!
//! - `ClusterApi`: the list/get/patch/delete/update surface chaos operations use
//! - `K8sClient`: kube-rs implementation of that surface
//! - Resource builders for ephemeral containers, patches and endpoint subsets
//! - Pod selection by label selector

mod client;
pub mod resources;
mod selector;

#[cfg(test)]
pub use client::MockClusterApi;
pub use client::{ClusterApi, K8sClient};
pub use selector::{find_pods, running_only};
