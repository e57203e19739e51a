// Near-duplicate detection across classes and functions

use std::collections::{BTreeMap, HashSet};

use crate::config::SimilarityConfig;
use crate::error::Result;
use crate::index::{Language, SimilarityPair, Symbol, SymbolKind};

/// Terms so common that a name contained in one of them says nothing about duplication
const COMMON_TERMS: &[&str] = &[
    "initialize",
    "constructor",
    "configuration",
    "application",
    "handler",
    "helper",
    "utilities",
    "manager",
    "service",
    "main",
    "run",
    "setup",
    "teardown",
    "process",
    "execute",
    "default",
    "create",
    "update",
    "delete",
    "value",
    "object",
    "result",
    "error",
    "string",
    "request",
    "response",
];

/// Pairwise scorer over same-kind, same-language symbols
#[derive(Debug, Clone)]
pub struct SimilarityDetector {
    name_weight: f64,
    doc_weight: f64,
    threshold: f64,
    min_name_len: usize,
    min_doc_tokens: usize,
    max_pairs: usize,
}

struct Candidate<'a> {
    symbol: &'a Symbol,
    norm_name: String,
    doc_tokens: HashSet<String>,
}

struct Scored<'a> {
    a: &'a Symbol,
    b: &'a Symbol,
    score: f64,
    reason: String,
}

impl SimilarityDetector {
    pub fn new(config: &SimilarityConfig) -> Self {
        Self {
            name_weight: config.name_weight,
            doc_weight: config.doc_weight,
            threshold: config.threshold,
            min_name_len: config.min_name_len,
            min_doc_tokens: config.min_doc_tokens,
            max_pairs: config.max_pairs.max(1),
        }
    }

    /// Flag likely duplicates among `symbols`, best match first
    pub fn detect(&self, symbols: &[Symbol]) -> Vec<SimilarityPair> {
        self.detect_with(symbols, &mut || Ok(true))
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Like `detect`, calling `tick` once per compared row.
    ///
    /// Returns `None` as soon as `tick` reports false. At most `max_pairs`
    /// pairs are returned.
    pub fn detect_with(
        &self,
        symbols: &[Symbol],
        tick: &mut dyn FnMut() -> Result<bool>,
    ) -> Result<Option<Vec<SimilarityPair>>> {
        let mut groups: BTreeMap<(SymbolKind, Language), Vec<Candidate>> = BTreeMap::new();
        for symbol in symbols.iter().filter(|s| is_comparable(s)) {
            let norm_name = normalize_name(&symbol.name);
            if self.is_trivial_name(&norm_name) {
                continue;
            }
            groups
                .entry((symbol.kind, symbol.language))
                .or_default()
                .push(Candidate {
                    symbol,
                    norm_name,
                    doc_tokens: doc_tokens(&symbol.docstring),
                });
        }

        let mut scored = Vec::new();
        for candidates in groups.values_mut() {
            candidates.sort_by(|x, y| {
                (&x.symbol.file_path, x.symbol.line_number)
                    .cmp(&(&y.symbol.file_path, y.symbol.line_number))
            });

            for (i, a) in candidates.iter().enumerate() {
                if !tick()? {
                    return Ok(None);
                }
                for b in &candidates[i + 1..] {
                    if a.symbol.file_path == b.symbol.file_path {
                        continue;
                    }
                    if let Some((score, reason)) = self.score(a, b) {
                        scored.push(Scored {
                            a: a.symbol,
                            b: b.symbol,
                            score,
                            reason,
                        });
                    }
                }
                if scored.len() >= 2 * self.max_pairs {
                    self.keep_best(&mut scored);
                }
            }
        }
        self.keep_best(&mut scored);

        let pairs = scored
            .into_iter()
            .map(|s| SimilarityPair {
                entity_kind: s.a.kind,
                name_a: s.a.name.clone(),
                location_a: s.a.location(),
                name_b: s.b.name.clone(),
                location_b: s.b.location(),
                reason: s.reason,
                language_a: s.a.language,
                language_b: s.b.language,
                score: s.score,
            })
            .collect();
        Ok(Some(pairs))
    }

    /// Sort best first and drop everything past `max_pairs`
    fn keep_best(&self, scored: &mut Vec<Scored>) {
        scored.sort_by(|x, y| {
            y.score
                .total_cmp(&x.score)
                .then_with(|| x.a.file_path.cmp(&y.a.file_path))
                .then_with(|| x.a.line_number.cmp(&y.a.line_number))
                .then_with(|| x.b.file_path.cmp(&y.b.file_path))
                .then_with(|| x.b.line_number.cmp(&y.b.line_number))
        });
        scored.truncate(self.max_pairs);
    }

    /// Combined score and reason, if it reaches the threshold.
    ///
    /// The score is the larger of the name similarity alone and the weighted
    /// blend of name and docstring similarity. A docstring below the token
    /// minimum contributes zero.
    fn score(&self, a: &Candidate, b: &Candidate) -> Option<(f64, String)> {
        let name = name_similarity(&a.norm_name, &b.norm_name);
        let doc = if a.doc_tokens.len() >= self.min_doc_tokens
            && b.doc_tokens.len() >= self.min_doc_tokens
        {
            Some(dice(&a.doc_tokens, &b.doc_tokens))
        } else {
            None
        };

        let total_weight = self.name_weight + self.doc_weight;
        let blended =
            (self.name_weight * name + self.doc_weight * doc.unwrap_or(0.0)) / total_weight;
        let score = name.max(blended);
        if score < self.threshold {
            return None;
        }

        let reason = match doc {
            Some(doc) if doc > 0.0 => format!(
                "name {:.0}%, docstring {:.0}%",
                name * 100.0,
                doc * 100.0
            ),
            _ => format!("name {:.0}%", name * 100.0),
        };
        Some((score, reason))
    }

    fn is_trivial_name(&self, norm_name: &str) -> bool {
        norm_name.chars().count() < self.min_name_len
            || COMMON_TERMS.iter().any(|term| term.contains(norm_name))
    }
}

/// Only classes and public, non-test functions are compared
fn is_comparable(symbol: &Symbol) -> bool {
    match symbol.kind {
        SymbolKind::Class => !symbol.name.starts_with("Test"),
        SymbolKind::Function => !symbol.name.starts_with('_') && !symbol.name.starts_with("test_"),
        SymbolKind::Method | SymbolKind::Other => false,
    }
}

/// Lowercase with underscores removed, so `get_user` and `getUser` compare equal
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Indel similarity: `2 * LCS / (len_a + len_b)` over characters
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    2.0 * prev[b.len()] as f64 / total as f64
}

fn doc_tokens(doc: &str) -> HashSet<String> {
    doc.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Dice coefficient over token sets
fn dice(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    2.0 * shared as f64 / (a.len() + b.len()) as f64
}
