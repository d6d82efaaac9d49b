use std::collections::{BTreeMap, HashMap, HashSet};

/// Replaces every character that is not valid in a Prometheus label name with `_`.
pub fn sanitize_label_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Sanitizes and prefixes every key of `labels` with `qualifier`.
///
/// Returns label names and values as two parallel vectors ordered by key. Keys that
/// collapse to an already emitted name after sanitizing are dropped.
pub fn prepend_qualifier(
    labels: &HashMap<String, String>,
    qualifier: &str,
) -> (Vec<String>, Vec<String>) {
    let sorted: BTreeMap<&String, &String> = labels.iter().collect();

    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(sorted.len());
    let mut values = Vec::with_capacity(sorted.len());
    for (k, v) in sorted {
        let name = format!("{}{}", qualifier, sanitize_label_name(k));
        if seen.insert(name.clone()) {
            names.push(name);
            values.push(v.clone());
        }
    }
    (names, values)
}

pub fn labels_to_labels(labels: &HashMap<String, String>) -> (Vec<String>, Vec<String>) {
    prepend_qualifier(labels, "label_")
}

pub fn annotations_to_labels(annotations: &HashMap<String, String>) -> (Vec<String>, Vec<String>) {
    prepend_qualifier(annotations, "annotation_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_label_name() {
        assert_eq!(sanitize_label_name("app"), "app");
        assert_eq!(
            sanitize_label_name("app.kubernetes.io/name"),
            "app_kubernetes_io_name"
        );
        assert_eq!(sanitize_label_name("team-owner"), "team_owner");
    }

    #[test]
    fn test_prepend_qualifier_sorted_and_deduplicated() {
        let labels = HashMap::from([
            ("tier".to_string(), "backend".to_string()),
            ("app.kubernetes.io/name".to_string(), "api".to_string()),
            ("app_kubernetes_io/name".to_string(), "shadowed".to_string()),
        ]);

        let (names, values) = labels_to_labels(&labels);
        assert_eq!(names, vec!["label_app_kubernetes_io_name", "label_tier"]);
        assert_eq!(values, vec!["api", "backend"]);

        let (names, _) = annotations_to_labels(&HashMap::from([(
            "owner".to_string(),
            "x".to_string(),
        )]));
        assert_eq!(names, vec!["annotation_owner"]);
    }
}
