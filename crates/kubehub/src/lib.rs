//! krb kubehub: kube-rs client, discovery and record storage against a live cluster.

#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::{Context, Result};
use kube::{Client, Config};
use tracing::info;

mod discovery;
mod records;

pub use discovery::KubeDiscovery;
pub use records::{store_error, KubeObjectCreator, KubeStore};

/// Build a client from the ambient kubeconfig or in-cluster environment, with bounded I/O.
pub async fn connect(timeout: Duration) -> Result<Client> {
    let mut config = Config::infer().await.context("loading kube config")?;
    config.connect_timeout = Some(timeout);
    config.read_timeout = Some(timeout);
    config.write_timeout = Some(timeout);
    let cluster = config.cluster_url.to_string();
    let client = Client::try_from(config).context("building kube client")?;
    info!(cluster = %cluster, timeout_ms = timeout.as_millis() as u64, "kube client ready");
    Ok(client)
}
