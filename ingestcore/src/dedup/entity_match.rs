//! Tiered Entity Matching (§4.9.1): combines name, incident-type, location,
//! and date signals into a single match/no-match decision with a confidence.

use super::fuzzy::fuzzy_name_match;

const DATE_WINDOW_DAYS: f64 = 30.0;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Hand-curated synonym groups for incident-type relatedness.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &["assault", "battery"],
    &["theft", "larceny", "robbery"],
    &["homicide", "murder", "manslaughter"],
    &["dui", "driving under the influence", "drunk driving"],
    &["detention", "custody"],
    &["deportation", "removal"],
];

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn types_are_related(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    SYNONYM_GROUPS.iter().any(|group| group.contains(&a.as_str()) && group.contains(&b.as_str()))
}

#[derive(Debug, Clone, Default)]
pub struct EntityFields {
    pub offender_name: Option<String>,
    pub victim_name: Option<String>,
    pub incident_type: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub date_ms: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct EntityMatchResult {
    pub is_match: bool,
    pub avg_confidence: f64,
    pub reasons: Vec<String>,
}

/// Decision tiers (first hit wins): T1 name matched and matches >= 2;
/// T2 matches >= 3 and avg confidence >= 0.7; T3 matches >= 2 and avg
/// confidence >= 0.6.
pub fn match_entities(a: &EntityFields, b: &EntityFields) -> EntityMatchResult {
    let mut matches = 0.0;
    let mut confidence_sum = 0.0;
    let mut reasons = Vec::new();
    let mut name_matched = false;

    if let (Some(a_name), Some(b_name)) = (&a.offender_name, &b.offender_name) {
        if let Some(conf) = fuzzy_name_match(a_name, b_name) {
            matches += 1.0;
            confidence_sum += conf;
            name_matched = true;
            reasons.push(format!("offender_name matched ({conf:.2})"));
        }
    }

    if let (Some(a_name), Some(b_name)) = (&a.victim_name, &b.victim_name) {
        if let Some(conf) = fuzzy_name_match(a_name, b_name) {
            matches += 1.0;
            confidence_sum += conf;
            name_matched = true;
            reasons.push(format!("victim_name matched ({conf:.2})"));
        }
    }

    if let (Some(a_type), Some(b_type)) = (&a.incident_type, &b.incident_type) {
        if normalize(a_type) == normalize(b_type) {
            matches += 1.0;
            confidence_sum += 1.0;
            reasons.push("incident_type exact match".to_string());
        } else if types_are_related(a_type, b_type) {
            matches += 0.5;
            confidence_sum += 0.7;
            reasons.push("incident_type related".to_string());
        }
    }

    if let (Some(a_state), Some(b_state)) = (&a.state, &b.state) {
        if normalize(a_state) == normalize(b_state) {
            matches += 1.0;
            confidence_sum += 1.0;
            reasons.push("state matched".to_string());

            if let (Some(a_city), Some(b_city)) = (&a.city, &b.city) {
                if normalize(a_city) == normalize(b_city) {
                    confidence_sum += 0.2;
                    reasons.push("city matched (bonus)".to_string());
                }
            }
        }
    }

    if let (Some(a_date), Some(b_date)) = (a.date_ms, b.date_ms) {
        let days = ((a_date - b_date).abs() as f64) / (DAY_MS as f64);
        if days <= DATE_WINDOW_DAYS {
            matches += 1.0;
            let confidence = 1.0 - (days / DATE_WINDOW_DAYS) * 0.5;
            confidence_sum += confidence;
            reasons.push(format!("date within window ({days:.1} days, conf {confidence:.2})"));
        }
    }

    let avg_confidence = if matches > 0.0 { confidence_sum / matches } else { 0.0 };

    let is_match = (name_matched && matches >= 2.0) || (matches >= 3.0 && avg_confidence >= 0.7) || (matches >= 2.0 && avg_confidence >= 0.6);

    EntityMatchResult {
        is_match,
        avg_confidence,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(offender: &str, state: &str, date_ms: i64) -> EntityFields {
        EntityFields {
            offender_name: Some(offender.to_string()),
            victim_name: None,
            incident_type: Some("detention".to_string()),
            state: Some(state.to_string()),
            city: None,
            date_ms: Some(date_ms),
        }
    }

    #[test]
    fn t1_name_match_plus_one_other_signal_is_a_match() {
        let a = fields("Juan Perez", "TX", 0);
        let b = fields("Juan Perez", "TX", 0);
        let result = match_entities(&a, &b);
        assert!(result.is_match);
    }

    #[test]
    fn name_mismatch_with_only_two_weak_signals_is_not_t1() {
        let a = EntityFields {
            offender_name: Some("Juan Perez".to_string()),
            state: Some("TX".to_string()),
            date_ms: Some(0),
            ..Default::default()
        };
        let b = EntityFields {
            offender_name: Some("Maria Lopez".to_string()),
            state: Some("TX".to_string()),
            date_ms: Some(0),
            ..Default::default()
        };
        let result = match_entities(&a, &b);
        // matches = state(1.0) + date(1.0) = 2, avg_confidence = 1.0 -> T3 applies
        assert!(result.is_match);
    }

    #[test]
    fn dates_far_apart_do_not_contribute_a_match() {
        let a = fields("Juan Perez", "TX", 0);
        let b = fields("Carlos Ruiz", "CA", 90 * DAY_MS);
        let result = match_entities(&a, &b);
        assert!(!result.is_match);
    }

    #[test]
    fn related_incident_types_contribute_partial_match() {
        let a = EntityFields {
            incident_type: Some("theft".to_string()),
            ..Default::default()
        };
        let b = EntityFields {
            incident_type: Some("robbery".to_string()),
            ..Default::default()
        };
        let result = match_entities(&a, &b);
        assert!((result.avg_confidence - 0.7).abs() < 1e-9);
    }
}
