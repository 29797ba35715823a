//! Discovery-backed `CatalogSource`.

use async_trait::async_trait;
use futures::future::join_all;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIGroup, APIResource};
use krb_core::ResolveError;
use krb_schema::{Catalog, CatalogEntry, CatalogSource};
use kube::Client;
use tracing::{debug, warn};

/// Reads `/api` and `/apis` into a catalog. Group priority is the order the server lists groups in,
/// with the core group first.
#[derive(Clone)]
pub struct KubeDiscovery {
    client: Client,
}

impl KubeDiscovery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn core(&self, entries: &mut Vec<CatalogEntry>) -> Result<(), ResolveError> {
        #[allow(deprecated)]
        let core = self.client.list_core_api_versions().await.map_err(transport)?;
        for v in &core.versions {
            #[allow(deprecated)]
            let listed = self.client.list_core_api_resources(v).await;
            match listed {
                Ok(list) => push_resources(entries, "", v, v == "v1", list.resources),
                Err(e) => warn!(version = %v, error = %e, "skipping core version"),
            }
        }
        Ok(())
    }

    async fn group(&self, g: &APIGroup) -> Vec<CatalogEntry> {
        let preferred = g.preferred_version.as_ref().or(g.versions.first()).map(|p| p.version.as_str());
        let mut out = Vec::new();
        for gv in &g.versions {
            #[allow(deprecated)]
            let listed = self.client.list_api_group_resources(&gv.group_version).await;
            match listed {
                Ok(list) => push_resources(&mut out, &g.name, &gv.version, preferred == Some(gv.version.as_str()), list.resources),
                // aggregated APIs that are down should not hide the rest of the cluster
                Err(e) => warn!(group_version = %gv.group_version, error = %e, "skipping group version"),
            }
        }
        out
    }
}

#[async_trait]
impl CatalogSource for KubeDiscovery {
    async fn fetch(&self) -> Result<Catalog, ResolveError> {
        let mut entries = Vec::new();
        self.core(&mut entries).await?;

        #[allow(deprecated)]
        let groups = self.client.list_api_groups().await.map_err(transport)?.groups;
        let mut priority = Vec::with_capacity(groups.len() + 1);
        priority.push(String::new());
        priority.extend(groups.iter().map(|g| g.name.clone()));

        for group_entries in join_all(groups.iter().map(|g| self.group(g))).await {
            entries.extend(group_entries);
        }
        debug!(groups = priority.len(), entries = entries.len(), "discovery fetched");
        Ok(Catalog::new(entries, priority))
    }
}

fn push_resources(out: &mut Vec<CatalogEntry>, group: &str, version: &str, preferred: bool, resources: Vec<APIResource>) {
    for r in resources {
        // subresources (pods/log, deployments/scale) are not addressable collections
        if r.name.contains('/') {
            continue;
        }
        out.push(CatalogEntry {
            group: group.to_string(),
            version: version.to_string(),
            kind: r.kind,
            resource: r.name,
            singular: r.singular_name,
            short_names: r.short_names.unwrap_or_default().into_iter().collect(),
            namespaced: r.namespaced,
            preferred,
        });
    }
}

fn transport(e: kube::Error) -> ResolveError {
    ResolveError::Transport(e.to_string())
}
