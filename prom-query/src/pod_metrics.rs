//! Exports pod labels, annotations and owners as Prometheus series.
//!
//! Each pod known to a [`ClusterCache`] becomes a set of constant `1` gauges whose
//! labels carry the pod's metadata, so it can be joined with resource metrics.
//! [`PodMetricsExporter`] renders them from the current cache on every scrape.

use metrics::{describe_gauge, gauge, Label};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::sync::Arc;

use crate::labels::{annotations_to_labels, labels_to_labels};
use crate::query_metrics::{Metric, KUBE_POD_ANNOTATIONS, KUBE_POD_LABELS, KUBE_POD_OWNER};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnerReference {
    pub name: String,
    pub kind: String,
    pub controller: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub owner_references: Vec<OwnerReference>,
}

/// Snapshot access to the pods of a cluster.
pub trait ClusterCache: Send + Sync {
    fn get_all_pods(&self) -> Vec<Pod>;
}

/// One exported sample.
#[derive(Clone, Debug, PartialEq)]
pub struct PodMetric {
    pub name: &'static str,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl PodMetric {
    fn new(name: &'static str, labels: Vec<(String, String)>) -> Self {
        Self {
            name,
            labels,
            value: 1.0,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Emits `kube_pod_annotations` for every pod that has annotations.
#[derive(Clone)]
pub struct PodAnnotationsCollector {
    cache: Arc<dyn ClusterCache>,
}

impl PodAnnotationsCollector {
    pub fn new(cache: Arc<dyn ClusterCache>) -> Self {
        Self { cache }
    }

    pub fn describe(&self) -> Vec<Metric> {
        vec![KUBE_POD_ANNOTATIONS]
    }

    pub fn collect(&self) -> Vec<PodMetric> {
        self.cache
            .get_all_pods()
            .iter()
            .filter_map(|pod| {
                let (names, values) = annotations_to_labels(&pod.annotations);
                if names.is_empty() {
                    return None;
                }
                let mut labels = pod_identity(pod, false);
                labels.extend(names.into_iter().zip(values));
                Some(PodMetric::new(KUBE_POD_ANNOTATIONS.name, labels))
            })
            .collect()
    }

    pub fn export(&self) {
        export(self.collect());
    }
}

/// Emits `kube_pod_labels` for every pod and `kube_pod_owner` for every owner reference.
#[derive(Clone)]
pub struct PodLabelsCollector {
    cache: Arc<dyn ClusterCache>,
}

impl PodLabelsCollector {
    pub fn new(cache: Arc<dyn ClusterCache>) -> Self {
        Self { cache }
    }

    pub fn describe(&self) -> Vec<Metric> {
        vec![KUBE_POD_LABELS, KUBE_POD_OWNER]
    }

    pub fn collect(&self) -> Vec<PodMetric> {
        let mut out = Vec::new();
        for pod in self.cache.get_all_pods() {
            let (names, values) = labels_to_labels(&pod.labels);
            let mut labels = pod_identity(&pod, true);
            labels.extend(names.into_iter().zip(values));
            out.push(PodMetric::new(KUBE_POD_LABELS.name, labels));

            for owner in &pod.owner_references {
                let mut labels = pod_identity(&pod, false);
                labels.push(("owner_name".to_string(), owner.name.clone()));
                labels.push(("owner_kind".to_string(), owner.kind.clone()));
                labels.push((
                    "owner_is_controller".to_string(),
                    owner.controller.to_string(),
                ));
                out.push(PodMetric::new(KUBE_POD_OWNER.name, labels));
            }
        }
        out
    }

    pub fn export(&self) {
        export(self.collect());
    }
}

/// Renders both pod collectors in the Prometheus text format.
///
/// Every render records into a fresh recorder, so a pod that left the cache is gone
/// from the next scrape.
#[derive(Clone)]
pub struct PodMetricsExporter {
    annotations: PodAnnotationsCollector,
    labels: PodLabelsCollector,
}

impl PodMetricsExporter {
    pub fn new(cache: Arc<dyn ClusterCache>) -> Self {
        Self {
            annotations: PodAnnotationsCollector::new(cache.clone()),
            labels: PodLabelsCollector::new(cache),
        }
    }

    pub fn render(&self) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let descriptors = self.annotations.describe().into_iter();
            for metric in descriptors.chain(self.labels.describe()) {
                describe_gauge!(metric.name, metric.description());
            }
            self.annotations.export();
            self.labels.export();
        });

        handle.render()
    }
}

fn pod_identity(pod: &Pod, with_uid: bool) -> Vec<(String, String)> {
    let mut labels = vec![
        ("namespace".to_string(), pod.namespace.clone()),
        ("pod".to_string(), pod.name.clone()),
    ];
    if with_uid {
        labels.push(("uid".to_string(), pod.uid.clone()));
    }
    labels
}

fn export(samples: Vec<PodMetric>) {
    for sample in samples {
        let labels: Vec<Label> = sample
            .labels
            .into_iter()
            .map(|(k, v)| Label::new(k, v))
            .collect();
        gauge!(sample.name, labels).set(sample.value);
    }
}
