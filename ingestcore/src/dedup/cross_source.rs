//! Cross-source duplicate detection against already-persisted incidents,
//! run at approval time (§4.9).
//!
//! The "SQL pre-filter by state + date window" the spec describes is
//! approximated here as a plain equality filter through `recordstore`
//! followed by an in-process date-window pass, consistent with the rest of
//! this crate's reliance on `Store::list`'s full-scan-and-filter model
//! rather than arbitrary SQL.

use recordstore::{Filter, Store, StoreResult};

use crate::domain::Incident;

use super::fuzzy::fuzzy_name_match;

const DATE_WINDOW_MS: i64 = 30 * 24 * 60 * 60 * 1000;
const PREFILTER_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct IncidentCandidate {
    pub incident_id: String,
    pub source_url: Option<String>,
    pub description: String,
    pub state: Option<String>,
    pub occurred_at: Option<i64>,
    pub offender_name: Option<String>,
    pub victim_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrossSourceStrategy {
    Url,
    DescriptionExact,
    Entity,
}

#[derive(Debug, Clone)]
pub struct CrossSourceMatch {
    pub incident_id: String,
    pub strategy: CrossSourceStrategy,
    pub confidence: f64,
}

/// Pre-filter persisted incidents in `domain` by state, then by a 30-day
/// date window around `date_ms`, capped at 50 rows (§4.9).
pub fn prefilter_candidates(store: &Store, domain: &str, state: &str, date_ms: i64) -> StoreResult<Vec<Incident>> {
    let incidents: Vec<Incident> = store.list(&[Filter::eq("domain", domain)], None)?;
    Ok(incidents
        .into_iter()
        .filter(|incident| {
            let state_matches = incident
                .custom_fields
                .get("state")
                .and_then(serde_json::Value::as_str)
                .map(|s| s.eq_ignore_ascii_case(state))
                .unwrap_or(false);
            let within_window = incident.occurred_at.map(|t| (t - date_ms).abs() <= DATE_WINDOW_MS).unwrap_or(false);
            state_matches && within_window
        })
        .take(PREFILTER_LIMIT)
        .collect())
}

/// Exact URL hit, then exact description match (only when long enough to be
/// meaningful), then fuzzy entity matching against the pre-filtered set.
pub fn find_duplicate(candidates: &[IncidentCandidate], article_url: &str, description: &str, offender_name: Option<&str>, victim_name: Option<&str>) -> Option<CrossSourceMatch> {
    if let Some(hit) = candidates.iter().find(|c| c.source_url.as_deref() == Some(article_url)) {
        return Some(CrossSourceMatch {
            incident_id: hit.incident_id.clone(),
            strategy: CrossSourceStrategy::Url,
            confidence: 1.0,
        });
    }

    if description.len() > 50 {
        if let Some(hit) = candidates.iter().find(|c| c.description == description) {
            return Some(CrossSourceMatch {
                incident_id: hit.incident_id.clone(),
                strategy: CrossSourceStrategy::DescriptionExact,
                confidence: 1.0,
            });
        }
    }

    for candidate in candidates {
        let mut best: Option<f64> = None;
        if let (Some(a), Some(b)) = (offender_name, candidate.offender_name.as_deref()) {
            if let Some(conf) = fuzzy_name_match(a, b) {
                best = Some(best.map_or(conf, |m: f64| m.max(conf)));
            }
        }
        if let (Some(a), Some(b)) = (victim_name, candidate.victim_name.as_deref()) {
            if let Some(conf) = fuzzy_name_match(a, b) {
                best = Some(best.map_or(conf, |m: f64| m.max(conf)));
            }
        }
        if let Some(confidence) = best {
            return Some(CrossSourceMatch {
                incident_id: candidate.incident_id.clone(),
                strategy: CrossSourceStrategy::Entity,
                confidence,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, url: Option<&str>, description: &str, offender: Option<&str>) -> IncidentCandidate {
        IncidentCandidate {
            incident_id: id.to_string(),
            source_url: url.map(str::to_string),
            description: description.to_string(),
            state: None,
            occurred_at: None,
            offender_name: offender.map(str::to_string),
            victim_name: None,
        }
    }

    #[test]
    fn url_match_wins_over_entity_match() {
        let candidates = vec![candidate("i1", Some("https://x.com/a"), "short", Some("Juan Perez"))];
        let m = find_duplicate(&candidates, "https://x.com/a", "short", Some("Juan Perez"), None).unwrap();
        assert_eq!(m.strategy, CrossSourceStrategy::Url);
    }

    #[test]
    fn short_descriptions_are_not_compared_exactly() {
        let candidates = vec![candidate("i1", Some("https://other.com"), "short match", None)];
        assert!(find_duplicate(&candidates, "https://x.com/b", "short match", None, None).is_none());
    }

    #[test]
    fn long_identical_descriptions_match() {
        let long = "A very long description that definitely exceeds fifty characters in length";
        let candidates = vec![candidate("i1", Some("https://other.com"), long, None)];
        let m = find_duplicate(&candidates, "https://x.com/b", long, None, None).unwrap();
        assert_eq!(m.strategy, CrossSourceStrategy::DescriptionExact);
    }

    #[test]
    fn fuzzy_entity_match_falls_back_when_nothing_else_matches() {
        let candidates = vec![candidate("i1", Some("https://other.com"), "short", Some("Juan Perez"))];
        let m = find_duplicate(&candidates, "https://x.com/b", "short", Some("Juan Perez"), None).unwrap();
        assert_eq!(m.strategy, CrossSourceStrategy::Entity);
    }
}
