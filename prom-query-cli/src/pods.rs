use anyhow::Result;
use axum::{extract::State, routing::get, Router};
use clap::Args;
use prom_query::pod_metrics::{ClusterCache, OwnerReference, Pod, PodMetricsExporter};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Debug, Args)]
pub(crate) struct PodLabelsArgs {
    #[arg(long, help = "JSON file holding the list of pods, re-read on every scrape")]
    pods_file: PathBuf,
    #[arg(long, default_value = "0.0.0.0:9100", help = "Address serving /metrics")]
    listen: SocketAddr,
    #[arg(long, default_value_t = false, help = "Print the exposition once and exit")]
    once: bool,
}

#[derive(Debug, Deserialize)]
struct PodEntry {
    name: String,
    namespace: String,
    #[serde(default)]
    uid: String,
    #[serde(default)]
    labels: HashMap<String, String>,
    #[serde(default)]
    annotations: HashMap<String, String>,
    #[serde(default)]
    owners: Vec<OwnerEntry>,
}

#[derive(Debug, Deserialize)]
struct OwnerEntry {
    name: String,
    kind: String,
    #[serde(default)]
    controller: bool,
}

impl From<PodEntry> for Pod {
    fn from(entry: PodEntry) -> Self {
        Pod {
            name: entry.name,
            namespace: entry.namespace,
            uid: entry.uid,
            labels: entry.labels,
            annotations: entry.annotations,
            owner_references: entry
                .owners
                .into_iter()
                .map(|o| OwnerReference {
                    name: o.name,
                    kind: o.kind,
                    controller: o.controller,
                })
                .collect(),
        }
    }
}

/// Pods read from a JSON file, reloaded on every collection.
struct FilePodCache {
    path: PathBuf,
}

impl FilePodCache {
    fn load(&self) -> Result<Vec<Pod>> {
        let content = std::fs::read(&self.path)?;
        let entries: Vec<PodEntry> = serde_json::from_slice(&content)?;
        Ok(entries.into_iter().map(Pod::from).collect())
    }
}

impl ClusterCache for FilePodCache {
    fn get_all_pods(&self) -> Vec<Pod> {
        match self.load() {
            Ok(pods) => pods,
            Err(e) => {
                warn!("unable to read pods from {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }
}

async fn metrics_handler(State(exporter): State<Arc<PodMetricsExporter>>) -> String {
    exporter.render()
}

pub(crate) async fn handle(args: PodLabelsArgs) -> Result<()> {
    let cache: Arc<dyn ClusterCache> = Arc::new(FilePodCache {
        path: args.pods_file.clone(),
    });
    let exporter = Arc::new(PodMetricsExporter::new(cache));

    if args.once {
        print!("{}", exporter.render());
        return Ok(());
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(exporter);

    let listener = TcpListener::bind(args.listen).await?;
    info!("Pod label exporter listening on http://{}/metrics", args.listen);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down pod label exporter");
        })
        .await?;

    Ok(())
}
