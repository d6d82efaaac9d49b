#[cfg(test)]
mod tests {
    use crate::pod_metrics::{
        ClusterCache, OwnerReference, Pod, PodAnnotationsCollector, PodLabelsCollector,
        PodMetricsExporter,
    };
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct StaticCache(Vec<Pod>);

    impl ClusterCache for StaticCache {
        fn get_all_pods(&self) -> Vec<Pod> {
            self.0.clone()
        }
    }

    /// Cache whose pods can be replaced between two scrapes.
    struct SwappableCache(Mutex<Vec<Pod>>);

    impl SwappableCache {
        fn replace(&self, pods: Vec<Pod>) {
            *self.0.lock().unwrap() = pods;
        }
    }

    impl ClusterCache for SwappableCache {
        fn get_all_pods(&self) -> Vec<Pod> {
            self.0.lock().unwrap().clone()
        }
    }

    fn named_pod(name: &str) -> Pod {
        Pod {
            name: name.to_string(),
            namespace: "ns".to_string(),
            uid: name.to_string(),
            annotations: HashMap::from([("team".to_string(), name.to_string())]),
            owner_references: vec![OwnerReference {
                name: format!("{}-rs", name),
                kind: "ReplicaSet".to_string(),
                controller: true,
            }],
            ..Default::default()
        }
    }

    fn cache() -> Arc<dyn ClusterCache> {
        let web = Pod {
            name: "web-7d9f".to_string(),
            namespace: "shop".to_string(),
            uid: "uid-web".to_string(),
            labels: HashMap::from([
                ("app".to_string(), "web".to_string()),
                ("app.kubernetes.io/part-of".to_string(), "shop".to_string()),
            ]),
            annotations: HashMap::from([("team".to_string(), "storefront".to_string())]),
            owner_references: vec![OwnerReference {
                name: "web-7d9f-rs".to_string(),
                kind: "ReplicaSet".to_string(),
                controller: true,
            }],
        };
        let bare = Pod {
            name: "debug".to_string(),
            namespace: "default".to_string(),
            uid: "uid-debug".to_string(),
            ..Default::default()
        };
        Arc::new(StaticCache(vec![web, bare]))
    }

    /// Test: Annotation samples
    ///
    /// Purpose
    /// - Only pods with annotations produce a `kube_pod_annotations` sample
    ///
    /// Expected
    /// - One sample, for the annotated pod, carrying prefixed annotation labels
    #[test]
    fn test_annotations_collector() {
        let collector = PodAnnotationsCollector::new(cache());
        assert_eq!(collector.describe()[0].name, "kube_pod_annotations");

        let samples = collector.collect();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label("pod"), Some("web-7d9f"));
        assert_eq!(samples[0].label("annotation_team"), Some("storefront"));
        assert_eq!(samples[0].value, 1.0);
    }

    /// Test: Label and owner samples
    ///
    /// Purpose
    /// - Every pod produces a `kube_pod_labels` sample, every owner a `kube_pod_owner` one
    ///
    /// Expected
    /// - Two label samples (one per pod) and one owner sample
    /// - Label names are sanitized and prefixed, the owner's controller flag is kept
    #[test]
    fn test_labels_collector() {
        let collector = PodLabelsCollector::new(cache());
        let samples = collector.collect();

        let labels: Vec<_> = samples
            .iter()
            .filter(|s| s.name == "kube_pod_labels")
            .collect();
        let owners: Vec<_> = samples
            .iter()
            .filter(|s| s.name == "kube_pod_owner")
            .collect();
        assert_eq!(labels.len(), 2);
        assert_eq!(owners.len(), 1);

        assert_eq!(labels[0].label("uid"), Some("uid-web"));
        assert_eq!(labels[0].label("label_app"), Some("web"));
        assert_eq!(
            labels[0].label("label_app_kubernetes_io_part_of"),
            Some("shop")
        );
        assert_eq!(labels[1].label("namespace"), Some("default"));

        assert_eq!(owners[0].label("owner_kind"), Some("ReplicaSet"));
        assert_eq!(owners[0].label("owner_is_controller"), Some("true"));
    }

    /// Test: Export through the metrics facade
    ///
    /// Flow
    /// - Export both collectors into a local Prometheus recorder and render it
    ///
    /// Expected
    /// - The rendered exposition contains all three series families
    #[test]
    fn test_export_renders_series() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            PodAnnotationsCollector::new(cache()).export();
            PodLabelsCollector::new(cache()).export();
        });

        let rendered = handle.render();
        assert!(rendered.contains("kube_pod_annotations{"));
        assert!(rendered.contains("annotation_team=\"storefront\""));
        assert!(rendered.contains("kube_pod_labels{"));
        assert!(rendered.contains("kube_pod_owner{"));
    }

    /// Test: Rendering follows the current cache content
    ///
    /// Purpose
    /// - A pod removed from the cluster must disappear from the next scrape
    ///
    /// Flow
    /// - Render with pod "gone" in the cache
    /// - Replace the cache content with pod "alive" and render again
    ///
    /// Expected
    /// - The first render only lists "gone", the second only lists "alive"
    /// - Every series family of the second render belongs to "alive"
    #[test]
    fn test_render_drops_deleted_pods() {
        let cache = Arc::new(SwappableCache(Mutex::new(vec![named_pod("gone")])));
        let exporter = PodMetricsExporter::new(cache.clone());

        let first = exporter.render();
        assert!(first.contains("kube_pod_labels{namespace=\"ns\",pod=\"gone\",uid=\"gone\"} 1"));
        assert!(!first.contains("pod=\"alive\""));

        cache.replace(vec![named_pod("alive")]);
        let second = exporter.render();
        assert!(second.contains("kube_pod_labels{namespace=\"ns\",pod=\"alive\",uid=\"alive\"} 1"));
        assert!(second.contains("owner_name=\"alive-rs\""));
        assert!(second.contains("annotation_team=\"alive\""));
        assert!(!second.contains("gone"));
    }
}
