//! Clusters Stage 2 results by subject entity and merges each cluster into
//! one incident-shaped record, so one article never produces two incidents
//! about the same person from two different schemas (§4.8).

use std::collections::HashMap;

use serde_json::Value;

const NAME_FIELDS: &[&str] = &[
    "offender_name",
    "person_name",
    "defendant_name",
    "victim_name",
    "suspect_name",
    "individual_name",
    "name",
];

const PRIMARY_NAME_FIELDS: &[&str] = NAME_FIELDS;

pub fn default_domain_priority() -> HashMap<String, u32> {
    HashMap::from([
        ("immigration".to_string(), 100),
        ("criminal_justice".to_string(), 50),
        ("civil_rights".to_string(), 25),
    ])
}

fn domain_priority(weights: &HashMap<String, u32>, domain_slug: &str) -> u32 {
    weights.get(domain_slug).copied().unwrap_or(10)
}

#[derive(Debug, Clone)]
pub struct ExtractedResult {
    pub extracted_data: Value,
    /// 0-1 or 0-100; normalized internally before scoring.
    pub confidence: f64,
    pub domain_slug: String,
    pub category_slug: Option<String>,
    pub schema_name: String,
}

impl ExtractedResult {
    fn normalized_confidence(&self) -> f64 {
        if self.confidence > 1.0 {
            (self.confidence / 100.0).min(1.0)
        } else {
            self.confidence
        }
    }

    fn primary_name(&self) -> Option<String> {
        for field in PRIMARY_NAME_FIELDS {
            if let Some(name) = self.extracted_data.get(field).and_then(Value::as_str) {
                if !name.trim().is_empty() {
                    return Some(normalize_name(name));
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRole {
    Base,
    Supplement,
    Sole,
}

#[derive(Debug, Clone)]
pub struct Source {
    pub schema_name: String,
    pub role: SourceRole,
    pub fields_contributed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MergeInfo {
    pub sources: Vec<Source>,
    pub cluster_entity: Option<String>,
    pub merged: bool,
    pub schemas_merged: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MergedResult {
    pub extracted_data: Value,
    pub confidence: f64,
    pub merge_info: MergeInfo,
}

/// Lowercase, strip punctuation, collapse whitespace (§4.8 step 2).
fn normalize_name(name: &str) -> String {
    let stripped: String = name.chars().filter(|c| c.is_alphanumeric() || c.is_whitespace()).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn names_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if a.contains(b) || b.contains(a) {
        return true;
    }
    let a_tokens: Vec<&str> = a.split_whitespace().collect();
    let b_tokens: Vec<&str> = b.split_whitespace().collect();
    let (Some(&a_last), Some(&b_last)) = (a_tokens.last(), b_tokens.last()) else {
        return false;
    };
    let (Some(&a_first), Some(&b_first)) = (a_tokens.first(), b_tokens.first()) else {
        return false;
    };
    a_last == b_last && a_first.chars().next() == b_first.chars().next()
}

/// `merge_results(results) -> Option<MergedResult>` (§4.8).
pub fn merge_results(results: Vec<ExtractedResult>, domain_priority_weights: &HashMap<String, u32>) -> Option<MergedResult> {
    let candidates: Vec<ExtractedResult> = results.into_iter().filter(|r| r.normalized_confidence() >= 0.3).collect();
    if candidates.is_empty() {
        return None;
    }

    let clusters = cluster_by_entity(candidates);
    let (entity, cluster) = pick_primary_cluster(clusters, domain_priority_weights)?;

    Some(merge_cluster(entity, cluster, domain_priority_weights))
}

/// Group results by normalized subject name; results without a name go into
/// the `None` bucket (§4.8 step 2).
fn cluster_by_entity(results: Vec<ExtractedResult>) -> Vec<(Option<String>, Vec<ExtractedResult>)> {
    let mut clusters: Vec<(Option<String>, Vec<ExtractedResult>)> = Vec::new();

    for result in results {
        let name = result.primary_name();
        match &name {
            None => clusters.entry_none().push(result),
            Some(candidate) => {
                let existing = clusters.iter_mut().find(|(key, _)| match key {
                    Some(existing_name) => names_match(existing_name, candidate),
                    None => false,
                });
                match existing {
                    Some((_, members)) => members.push(result),
                    None => clusters.push((name, vec![result])),
                }
            }
        }
    }

    clusters
}

/// Small helper trait so `cluster_by_entity` can push into the `None`
/// bucket without an extra branch for "does it exist yet".
trait NoneBucket<T> {
    fn entry_none(&mut self) -> &mut Vec<T>;
}

impl<T> NoneBucket<T> for Vec<(Option<String>, Vec<T>)> {
    fn entry_none(&mut self) -> &mut Vec<T> {
        if !self.iter().any(|(key, _)| key.is_none()) {
            self.push((None, Vec::new()));
        }
        &mut self.iter_mut().find(|(key, _)| key.is_none()).unwrap().1
    }
}

fn cluster_score(cluster: &[ExtractedResult], weights: &HashMap<String, u32>) -> (bool, f64) {
    let has_immigration = cluster
        .iter()
        .any(|r| r.domain_slug == "immigration" && r.normalized_confidence() >= 0.5);
    let weighted_sum: f64 = cluster
        .iter()
        .map(|r| domain_priority(weights, &r.domain_slug) as f64 * r.normalized_confidence())
        .sum();
    (has_immigration, weighted_sum)
}

fn pick_primary_cluster(
    clusters: Vec<(Option<String>, Vec<ExtractedResult>)>,
    weights: &HashMap<String, u32>,
) -> Option<(Option<String>, Vec<ExtractedResult>)> {
    clusters
        .into_iter()
        .max_by(|(_, a), (_, b)| cluster_score(a, weights).partial_cmp(&cluster_score(b, weights)).unwrap())
}

fn merge_cluster(entity: Option<String>, mut cluster: Vec<ExtractedResult>, weights: &HashMap<String, u32>) -> MergedResult {
    let schemas_merged: Vec<String> = cluster.iter().map(|r| r.schema_name.clone()).collect();

    if cluster.len() == 1 {
        let sole = cluster.remove(0);
        let confidence = sole.normalized_confidence();
        let fields_contributed = object_keys(&sole.extracted_data);
        return MergedResult {
            extracted_data: sole.extracted_data,
            confidence,
            merge_info: MergeInfo {
                sources: vec![Source {
                    schema_name: sole.schema_name,
                    role: SourceRole::Sole,
                    fields_contributed,
                }],
                cluster_entity: entity,
                merged: false,
                schemas_merged,
            },
        };
    }

    cluster.sort_by(|a, b| {
        let pa = domain_priority(weights, &a.domain_slug);
        let pb = domain_priority(weights, &b.domain_slug);
        pb.cmp(&pa).then(b.normalized_confidence().partial_cmp(&a.normalized_confidence()).unwrap())
    });

    let mut members = cluster.into_iter();
    let base = members.next().expect("cluster has at least one member");
    let base_domain = base.domain_slug.clone();
    let base_confidence = base.normalized_confidence();

    let mut merged_data = base.extracted_data.clone();
    let mut sources = vec![Source {
        schema_name: base.schema_name.clone(),
        role: SourceRole::Base,
        fields_contributed: object_keys(&merged_data),
    }];

    let mut max_immigration_confidence: Option<f64> = if base_domain == "immigration" { Some(base_confidence) } else { None };

    for member in members {
        if member.domain_slug == "immigration" {
            let conf = member.normalized_confidence();
            max_immigration_confidence = Some(max_immigration_confidence.map_or(conf, |m| m.max(conf)));
        }

        let contributed = supplement_fields(&mut merged_data, &member.extracted_data);
        sources.push(Source {
            schema_name: member.schema_name,
            role: SourceRole::Supplement,
            fields_contributed: contributed,
        });
    }

    let confidence = max_immigration_confidence.map_or(base_confidence, |m| m.max(base_confidence));

    MergedResult {
        extracted_data: merged_data,
        confidence,
        merge_info: MergeInfo {
            sources,
            cluster_entity: entity,
            merged: true,
            schemas_merged,
        },
    }
}

/// Copy fields from `supplement` into `base` only where `base`'s value is
/// missing, null, empty string, or empty array. Never overwrites a non-empty
/// base field (§4.8 step 4). Returns the field names actually contributed.
fn supplement_fields(base: &mut Value, supplement: &Value) -> Vec<String> {
    let mut contributed = Vec::new();
    let Some(supplement_obj) = supplement.as_object() else {
        return contributed;
    };
    let Some(base_obj) = base.as_object_mut() else {
        return contributed;
    };

    for (key, value) in supplement_obj {
        let is_empty = match base_obj.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(a)) => a.is_empty(),
            _ => false,
        };
        if is_empty && !matches!(value, Value::Null) {
            base_obj.insert(key.clone(), value.clone());
            contributed.push(key.clone());
        }
    }

    contributed
}

fn object_keys(value: &Value) -> Vec<String> {
    value.as_object().map(|o| o.keys().cloned().collect()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(domain: &str, confidence: f64, name: &str, extra: Value) -> ExtractedResult {
        let mut data = extra;
        data.as_object_mut().unwrap().insert("offender_name".to_string(), Value::String(name.to_string()));
        ExtractedResult {
            extracted_data: data,
            confidence,
            domain_slug: domain.to_string(),
            category_slug: None,
            schema_name: format!("{domain}_schema"),
        }
    }

    #[test]
    fn low_confidence_results_are_filtered_out() {
        let results = vec![result("immigration", 0.2, "Juan Perez", serde_json::json!({}))];
        assert!(merge_results(results, &default_domain_priority()).is_none());
    }

    #[test]
    fn single_member_cluster_is_sole() {
        let results = vec![result("immigration", 0.8, "Juan Perez", serde_json::json!({"state": "TX"}))];
        let merged = merge_results(results, &default_domain_priority()).unwrap();
        assert!(!merged.merge_info.merged);
        assert_eq!(merged.merge_info.sources[0].role, SourceRole::Sole);
    }

    #[test]
    fn immigration_cluster_wins_over_higher_confidence_non_immigration() {
        let results = vec![
            result("immigration", 0.6, "Juan Perez", serde_json::json!({"state": "TX"})),
            result("criminal_justice", 0.95, "Maria Lopez", serde_json::json!({"state": "CA"})),
        ];
        let merged = merge_results(results, &default_domain_priority()).unwrap();
        assert_eq!(merged.merge_info.cluster_entity, Some("juan perez".to_string()));
    }

    #[test]
    fn base_fields_are_never_overwritten_by_supplement() {
        let results = vec![
            result("immigration", 0.8, "Juan Perez", serde_json::json!({"state": "TX"})),
            result("immigration", 0.7, "Juan Perez", serde_json::json!({"state": "CA", "city": "Dallas"})),
        ];
        let merged = merge_results(results, &default_domain_priority()).unwrap();
        assert_eq!(merged.extracted_data["state"], "TX");
        assert_eq!(merged.extracted_data["city"], "Dallas");
        assert!(merged.merge_info.merged);
    }

    #[test]
    fn merged_confidence_is_raised_to_max_immigration_member() {
        let results = vec![
            result("immigration", 0.5, "Juan Perez", serde_json::json!({})),
            result("immigration", 0.9, "Juan Perez", serde_json::json!({"state": "TX"})),
        ];
        let merged = merge_results(results, &default_domain_priority()).unwrap();
        assert!((merged.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn substring_names_cluster_together() {
        let results = vec![
            result("immigration", 0.6, "Juan Perez", serde_json::json!({})),
            result("criminal_justice", 0.6, "Juan Perez Garcia", serde_json::json!({})),
        ];
        let merged = merge_results(results, &default_domain_priority()).unwrap();
        assert!(merged.merge_info.merged);
    }

    #[test]
    fn results_without_a_name_cluster_together_in_the_none_bucket() {
        let a = ExtractedResult {
            extracted_data: serde_json::json!({"state": "TX"}),
            confidence: 0.5,
            domain_slug: "immigration".to_string(),
            category_slug: None,
            schema_name: "a".to_string(),
        };
        let b = ExtractedResult {
            extracted_data: serde_json::json!({"city": "Dallas"}),
            confidence: 0.6,
            domain_slug: "immigration".to_string(),
            category_slug: None,
            schema_name: "b".to_string(),
        };
        let merged = merge_results(vec![a, b], &default_domain_priority()).unwrap();
        assert!(merged.merge_info.cluster_entity.is_none());
        assert!(merged.merge_info.merged);
    }
}
