use metrics::histogram;
use std::time::Instant;
use tracing::info;

pub struct Metric {
    pub name: &'static str,
    description: &'static str,
}

pub const GAUGES: [Metric; 3] = [KUBE_POD_ANNOTATIONS, KUBE_POD_LABELS, KUBE_POD_OWNER];
pub const HISTOGRAMS: [Metric; 1] = [QUERY_DURATION_SECONDS];

// QUERY Metrics --------------------------

pub const QUERY_DURATION_SECONDS: Metric = Metric {
    name: "prom_query_duration_seconds",
    description: "Wall clock latency of profiled queries, labeled by profile label",
};

// POD Metrics --------------------------

pub const KUBE_POD_ANNOTATIONS: Metric = Metric {
    name: "kube_pod_annotations",
    description: "All annotations for each pod prefix with annotation_",
};

pub const KUBE_POD_LABELS: Metric = Metric {
    name: "kube_pod_labels",
    description: "All labels for each pod prefixed with label_",
};

pub const KUBE_POD_OWNER: Metric = Metric {
    name: "kube_pod_owner",
    description: "Information about the Pod's owner",
};

impl Metric {
    pub fn description(&self) -> &'static str {
        self.description
    }
}

/// Describes every metric this crate emits to the installed recorder.
pub fn register_metrics() {
    for metric in GAUGES {
        metrics::describe_gauge!(metric.name, metric.description);
    }
    for metric in HISTOGRAMS {
        metrics::describe_histogram!(metric.name, metric.description);
    }
}

/// Logs and records the time elapsed since `start` under `label`.
pub(crate) fn profile(start: Instant, label: &str) {
    let elapsed = start.elapsed();
    info!("[Profiler] {}: {:?}", label, elapsed);
    histogram!(QUERY_DURATION_SECONDS.name, "label" => label.to_string())
        .record(elapsed.as_secs_f64());
}
