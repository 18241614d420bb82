//! Text search and similarity scoring over the graph, shared by
//! `search_entities` and `find_similar_entities` in the tool catalog.

use std::collections::HashSet;

use serde::Serialize;

use crate::graph::entity::{Entity, EntityType};
use crate::graph::index::{Direction, GraphIndex};

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "can", "this", "that",
    "these", "those", "i", "you", "he", "she", "it", "we", "they",
];

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub entity: Entity,
    pub score: f64,
    pub highlights: Vec<String>,
    pub matched_fields: Vec<String>,
}

/// Tokenize into lowercased alphanumeric words, dropping stop words and
/// tokens shorter than 3 characters.
fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2 && !STOP_WORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

fn extract_entity_tokens(entity: &Entity) -> HashSet<String> {
    let mut tokens = tokenize(&entity.name);
    tokens.insert(entity.entity_type.as_str().to_string());
    extract_value_tokens(&entity.content, &mut tokens);
    tokens
}

fn extract_value_tokens(value: &serde_json::Value, tokens: &mut HashSet<String>) {
    match value {
        serde_json::Value::String(s) => tokens.extend(tokenize(s)),
        serde_json::Value::Object(map) => {
            for v in map.values() {
                extract_value_tokens(v, tokens);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                extract_value_tokens(v, tokens);
            }
        }
        _ => {}
    }
}

fn score_content(content: &serde_json::Value, query_tokens: &HashSet<String>, query: &str) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut highlights = Vec::new();
    walk_content(content, query_tokens, query, "", &mut score, &mut highlights);
    (score, highlights)
}

fn walk_content(
    value: &serde_json::Value,
    query_tokens: &HashSet<String>,
    query: &str,
    path: &str,
    score: &mut f64,
    highlights: &mut Vec<String>,
) {
    match value {
        serde_json::Value::String(s) => {
            let lower = s.to_lowercase();
            if lower.contains(query) {
                *score += 1.5;
                highlights.push(format!("{}: {}", path, truncate(s)));
            } else {
                let tokens = tokenize(&lower);
                let hits = tokens.intersection(query_tokens).count();
                if hits > 0 {
                    *score += hits as f64 / query_tokens.len().max(1) as f64;
                    highlights.push(format!("{}: {}", path, truncate(s)));
                }
            }
        }
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                let new_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                walk_content(v, query_tokens, query, &new_path, score, highlights);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                walk_content(v, query_tokens, query, &format!("{}[{}]", path, i), score, highlights);
            }
        }
        _ => {}
    }
}

fn truncate(s: &str) -> String {
    if s.len() > 100 {
        format!("{}...", &s[..100])
    } else {
        s.to_string()
    }
}

/// Full-text search, scored per the formula: +3.0 exact name substring,
/// +2.0*(hits/|query tokens|) for name-token overlap, +1.0 if any query
/// token matches the entity type, +1.5 exact content substring plus
/// token-overlap content score. Results below `min_score` are dropped.
pub fn search_entities<'a>(
    entities: impl Iterator<Item = &'a Entity>,
    query: &str,
    entity_types: Option<&[EntityType]>,
    limit: usize,
) -> Vec<SearchResult> {
    const MIN_SCORE: f64 = 0.1;
    let query = query.to_lowercase();
    if query.trim().is_empty() {
        return vec![];
    }
    let query_tokens = tokenize(&query);

    let mut results: Vec<SearchResult> = entities
        .filter(|e| entity_types.map(|ts| ts.contains(&e.entity_type)).unwrap_or(true))
        .filter_map(|entity| score_entity(entity, &query_tokens, &query))
        .filter(|r| r.score >= MIN_SCORE)
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}

fn score_entity(entity: &Entity, query_tokens: &HashSet<String>, query: &str) -> Option<SearchResult> {
    let mut score = 0.0;
    let mut highlights = Vec::new();
    let mut matched_fields = Vec::new();

    let name_lower = entity.name.to_lowercase();
    if name_lower.contains(query) {
        score += 3.0;
        highlights.push(format!("Name: {}", entity.name));
        matched_fields.push("name".to_string());
    } else {
        let name_tokens = tokenize(&name_lower);
        let hits = name_tokens.intersection(query_tokens).count();
        if hits > 0 {
            score += 2.0 * (hits as f64 / query_tokens.len().max(1) as f64);
            highlights.push(format!("Name: {}", entity.name));
            matched_fields.push("name".to_string());
        }
    }

    if query_tokens.iter().any(|t| entity.entity_type.as_str().contains(t.as_str())) {
        score += 1.0;
        matched_fields.push("entity_type".to_string());
    }

    let (content_score, content_highlights) = score_content(&entity.content, query_tokens, query);
    if content_score > 0.0 {
        score += content_score;
        highlights.extend(content_highlights);
        matched_fields.push("content".to_string());
    }

    if score <= 0.0 {
        return None;
    }

    Some(SearchResult {
        entity: entity.clone(),
        score,
        highlights,
        matched_fields,
    })
}

/// Similarity = 0.3 * same_type + 0.7 * Jaccard(tokens_a, tokens_b).
pub fn similarity(reference: &Entity, candidate: &Entity) -> f64 {
    let type_score = if reference.entity_type == candidate.entity_type { 1.0 } else { 0.0 };
    let ref_tokens = extract_entity_tokens(reference);
    let cand_tokens = extract_entity_tokens(candidate);

    let token_score = if ref_tokens.is_empty() && cand_tokens.is_empty() {
        0.0
    } else {
        let intersection = ref_tokens.intersection(&cand_tokens).count();
        let union = ref_tokens.union(&cand_tokens).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    };

    type_score * 0.3 + token_score * 0.7
}

/// `find_similar_entities`: entities within `threshold` similarity of
/// `reference`, ranked descending.
pub fn find_similar<'a>(
    entities: impl Iterator<Item = &'a Entity>,
    reference: &Entity,
    threshold: f64,
    limit: usize,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = entities
        .filter(|e| e.entity_id != reference.entity_id)
        .filter_map(|e| {
            let score = similarity(reference, e);
            if score >= threshold {
                Some(SearchResult {
                    entity: e.clone(),
                    score,
                    highlights: vec![format!("Similar to {}", reference.name)],
                    matched_fields: if e.entity_type == reference.entity_type {
                        vec!["entity_type".to_string(), "content".to_string()]
                    } else {
                        vec!["content".to_string()]
                    },
                })
            } else {
                None
            }
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}

/// Search restricted to entities within `max_distance` hops of
/// `start_entity_id`, with score boosted by proximity. Not part of the
/// 12-tool catalog; a library-level enrichment grounded in the search
/// engine's own `search_connected` operation.
pub fn search_connected(
    index: &GraphIndex,
    query: &str,
    start_entity_id: &str,
    max_distance: u32,
    limit: usize,
) -> Vec<SearchResult> {
    let connected = index.get_connected_entities(start_entity_id, None, Direction::Both, max_distance);

    let mut closest: std::collections::HashMap<String, (Entity, u32)> = std::collections::HashMap::new();
    for conn in connected {
        closest
            .entry(conn.entity.entity_id.clone())
            .and_modify(|(_, d)| {
                if conn.distance < *d {
                    *d = conn.distance;
                }
            })
            .or_insert((conn.entity, conn.distance));
    }

    let query_lower = query.to_lowercase();
    let query_tokens = tokenize(&query_lower);

    let mut results: Vec<SearchResult> = closest
        .into_values()
        .filter_map(|(entity, distance)| {
            let base = score_entity(&entity, &query_tokens, &query_lower)?;
            let proximity_boost = 1.0 / (distance as f64 + 1.0);
            let mut highlights = base.highlights;
            highlights.push(format!("Distance: {}", distance));
            Some(SearchResult {
                entity: base.entity,
                score: base.score * (1.0 + proximity_boost),
                highlights,
                matched_fields: base.matched_fields,
            })
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}

/// Search by exact property match against `content`. Score is the fraction
/// of requested properties that matched. Not part of the 12-tool catalog; a
/// library-level enrichment grounded in the search engine's own
/// `search_by_properties` operation.
pub fn search_by_properties<'a>(
    entities: impl Iterator<Item = &'a Entity>,
    properties: &serde_json::Map<String, serde_json::Value>,
    entity_types: Option<&[EntityType]>,
    limit: usize,
) -> Vec<SearchResult> {
    if properties.is_empty() {
        return vec![];
    }

    let mut results: Vec<SearchResult> = entities
        .filter(|e| entity_types.map(|ts| ts.contains(&e.entity_type)).unwrap_or(true))
        .filter_map(|entity| {
            let (matches, matched_fields) = match_properties(&entity.content, properties);
            if matches == 0 {
                return None;
            }
            Some(SearchResult {
                entity: entity.clone(),
                score: matches as f64 / properties.len() as f64,
                highlights: vec![format!("Matched {}/{} properties", matches, properties.len())],
                matched_fields,
            })
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}

fn match_properties(
    content: &serde_json::Value,
    target: &serde_json::Map<String, serde_json::Value>,
) -> (usize, Vec<String>) {
    let mut matches = 0;
    let mut matched_fields = Vec::new();
    for (key, target_value) in target {
        if let Some(actual) = content.get(key) {
            if actual == target_value {
                matches += 1;
                matched_fields.push(key.clone());
            }
        }
    }
    (matches, matched_fields)
}
