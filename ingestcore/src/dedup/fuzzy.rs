//! Fuzzy Name Match (§4.9.2): the name-comparison primitive shared by
//! in-batch entity matching and cross-source dedup.

use std::collections::HashSet;

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let stripped: String = name.chars().filter(|c| c.is_alphanumeric() || c.is_whitespace()).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn char_jaccard(a: &str, b: &str) -> f64 {
    let a: HashSet<char> = a.chars().collect();
    let b: HashSet<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
}

fn token_jaccard(a: &[&str], b: &[&str]) -> f64 {
    let a: HashSet<&&str> = a.iter().collect();
    let b: HashSet<&&str> = b.iter().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
}

fn is_initial_of(short: &str, long: &str) -> bool {
    short.chars().count() == 1 && long.starts_with(short.chars().next().unwrap())
}

/// Cascade: exact normalized (1.0) -> substring either-way (0.95) ->
/// structured last/first name comparison -> full-name token Jaccard >= 0.7.
/// Returns `None` when nothing in the cascade clears its threshold.
pub fn fuzzy_name_match(a: &str, b: &str) -> Option<f64> {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a == b {
        return Some(1.0);
    }
    if a.contains(&b) || b.contains(&a) {
        return Some(0.95);
    }

    let a_tokens: Vec<&str> = a.split_whitespace().collect();
    let b_tokens: Vec<&str> = b.split_whitespace().collect();

    if let (Some(&a_last), Some(&b_last)) = (a_tokens.last(), b_tokens.last()) {
        let last_matches = a_last == b_last || char_jaccard(a_last, b_last) >= 0.8;
        if last_matches {
            if let (Some(&a_first), Some(&b_first)) = (a_tokens.first(), b_tokens.first()) {
                if a_first == b_first {
                    return Some(1.0);
                }
                if is_initial_of(a_first, b_first) || is_initial_of(b_first, a_first) {
                    return Some(0.8);
                }
                let first_jaccard = char_jaccard(a_first, b_first);
                if first_jaccard >= 0.7 {
                    return Some(first_jaccard);
                }
            }
        }
    }

    let fallback = token_jaccard(&a_tokens, &b_tokens);
    if fallback >= 0.7 { Some(fallback) } else { None }
}
