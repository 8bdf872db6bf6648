//! In-batch duplicate detection (§4.9): four strategies evaluated in order,
//! first match wins per candidate pair.

use std::collections::HashSet;

use md5::{Digest, Md5};

use super::entity_match::{match_entities, EntityFields};

const TITLE_JACCARD_THRESHOLD: f64 = 0.75;
const CONTENT_MINHASH_THRESHOLD: f64 = 0.85;
const MINHASH_SKETCH_SIZE: usize = 100;
const SHINGLE_SIZE: usize = 3;

#[derive(Debug, Clone)]
pub struct BatchArticle {
    pub url: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateStrategy {
    Url,
    TitleJaccard,
    ContentMinhash,
    Entity,
}

#[derive(Debug, Clone)]
pub struct DuplicateMatch {
    pub strategy: DuplicateStrategy,
    pub confidence: f64,
}

/// Evaluate the four strategies in order; return on the first that matches.
pub fn detect_duplicate(a: &BatchArticle, b: &BatchArticle, entities: Option<(&EntityFields, &EntityFields)>) -> Option<DuplicateMatch> {
    if a.url == b.url {
        return Some(DuplicateMatch {
            strategy: DuplicateStrategy::Url,
            confidence: 1.0,
        });
    }

    let title_similarity = word_jaccard(&a.title, &b.title);
    if title_similarity >= TITLE_JACCARD_THRESHOLD {
        return Some(DuplicateMatch {
            strategy: DuplicateStrategy::TitleJaccard,
            confidence: title_similarity,
        });
    }

    let content_similarity = minhash_jaccard(&a.content, &b.content);
    if content_similarity >= CONTENT_MINHASH_THRESHOLD {
        return Some(DuplicateMatch {
            strategy: DuplicateStrategy::ContentMinhash,
            confidence: content_similarity,
        });
    }

    if let Some((ea, eb)) = entities {
        let result = match_entities(ea, eb);
        if result.is_match {
            return Some(DuplicateMatch {
                strategy: DuplicateStrategy::Entity,
                confidence: result.avg_confidence,
            });
        }
    }

    None
}

fn word_jaccard(a: &str, b: &str) -> f64 {
    let tokenize = |s: &str| -> HashSet<String> {
        s.split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 2)
            .collect()
    };
    let a = tokenize(a);
    let b = tokenize(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
}

/// 3-word shingles, MD5 truncated to the low 32 bits, 100-smallest-hash
/// sketch, Jaccard computed over the two sketches.
fn minhash_sketch(content: &str) -> Vec<u32> {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.len() < SHINGLE_SIZE {
        return Vec::new();
    }

    let mut hashes: HashSet<u32> = HashSet::new();
    for window in words.windows(SHINGLE_SIZE) {
        let shingle = window.join(" ").to_lowercase();
        let mut hasher = Md5::new();
        hasher.update(shingle.as_bytes());
        let digest = hasher.finalize();
        let truncated = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        hashes.insert(truncated);
    }

    let mut sorted: Vec<u32> = hashes.into_iter().collect();
    sorted.sort_unstable();
    sorted.truncate(MINHASH_SKETCH_SIZE);
    sorted
}

fn minhash_jaccard(a: &str, b: &str) -> f64 {
    let sketch_a: HashSet<u32> = minhash_sketch(a).into_iter().collect();
    let sketch_b: HashSet<u32> = minhash_sketch(b).into_iter().collect();
    if sketch_a.is_empty() && sketch_b.is_empty() {
        return 1.0;
    }
    let intersection = sketch_a.intersection(&sketch_b).count();
    let union = sketch_a.union(&sketch_b).count();
    if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
}
