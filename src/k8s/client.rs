//! Kubernetes client bootstrap
//!
//! An explicit kubeconfig path wins; otherwise configuration is inferred,
//! which tries the in-cluster service account first and falls back to the
//! local kubeconfig (honoring the `KUBECONFIG` environment variable).
//!
//! `kubeQPS`/`kubeBurst` from the config file are accepted for
//! compatibility; client-side flow control is delegated to the API server's
//! priority-and-fairness machinery.

use crate::error::VirtaError;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tracing::info;

pub async fn build_client(kubeconfig: Option<&Path>) -> Result<Client, VirtaError> {
    let config = match kubeconfig {
        Some(path) => {
            info!(path = %path.display(), "loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                VirtaError::Config(format!("cannot read kubeconfig {}: {e}", path.display()))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| VirtaError::Config(format!("cannot load kubeconfig: {e}")))?
        }
        None => Config::infer()
            .await
            .map_err(|e| VirtaError::Config(format!("cannot infer kubernetes config: {e}")))?,
    };

    Client::try_from(config).map_err(VirtaError::from)
}
