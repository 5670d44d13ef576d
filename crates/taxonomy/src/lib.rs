//! Closed taxonomy of policy-area tags and the normalizer that maps free-text
//! Hebrew topic phrases onto it. Every query predicate that filters by topic
//! goes through [`TagNormalizer::normalize`]; a `None` result means "no
//! canonical tag" and callers fall back to a broader text filter instead of
//! dropping the query.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod levenshtein;

pub use levenshtein::bounded_levenshtein;

pub type Result<T> = std::result::Result<T, TaxonomyError>;

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("failed to parse taxonomy: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid taxonomy: {0}")]
    Invalid(String),
}

const BUILTIN_TAGS: &str = include_str!("../data/policy_tags.json");
const SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// A canonical topic label from the closed taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyTag(String);

impl PolicyTag {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for PolicyTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Deserialize)]
struct RawTaxonomy {
    schema_version: u32,
    tags: Vec<String>,
    #[serde(default)]
    synonyms: BTreeMap<String, String>,
}

/// Static, versioned tag table. Loaded once at startup; never mutated.
#[derive(Debug)]
pub struct Taxonomy {
    version: u32,
    /// Canonical tags in declared order, paired with their normalized form.
    tags: Vec<(String, PolicyTag)>,
    tag_by_norm: HashMap<String, PolicyTag>,
    /// Normalized phrase -> canonical tag. BTreeMap keeps the scan order
    /// deterministic for the fuzzy tie-break.
    synonyms: BTreeMap<String, PolicyTag>,
}

impl Taxonomy {
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: RawTaxonomy = serde_json::from_str(raw)?;
        if parsed.schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(TaxonomyError::Invalid(format!(
                "schema_version {} is not supported (expected {SUPPORTED_SCHEMA_VERSION})",
                parsed.schema_version
            )));
        }
        if parsed.tags.is_empty() {
            return Err(TaxonomyError::Invalid("taxonomy has no tags".to_string()));
        }

        let mut tags = Vec::with_capacity(parsed.tags.len());
        let mut tag_by_norm = HashMap::with_capacity(parsed.tags.len());
        for tag in &parsed.tags {
            if tag.trim().is_empty() {
                return Err(TaxonomyError::Invalid("empty tag entry".to_string()));
            }
            let norm = normalize_phrase(tag);
            let canonical = PolicyTag(tag.clone());
            if tag_by_norm
                .insert(norm.clone(), canonical.clone())
                .is_some()
            {
                return Err(TaxonomyError::Invalid(format!("duplicate tag '{tag}'")));
            }
            tags.push((norm, canonical));
        }

        let mut synonyms = BTreeMap::new();
        for (phrase, target) in &parsed.synonyms {
            let target_norm = normalize_phrase(target);
            let Some(canonical) = tag_by_norm.get(&target_norm) else {
                return Err(TaxonomyError::Invalid(format!(
                    "synonym '{phrase}' maps to unknown tag '{target}'"
                )));
            };
            synonyms.insert(normalize_phrase(phrase), canonical.clone());
        }

        Ok(Self {
            version: parsed.schema_version,
            tags,
            tag_by_norm,
            synonyms,
        })
    }

    /// The taxonomy shipped with the binary.
    pub fn builtin() -> Arc<Taxonomy> {
        static BUILTIN: Lazy<Arc<Taxonomy>> = Lazy::new(|| {
            Arc::new(Taxonomy::from_json(BUILTIN_TAGS).expect("builtin taxonomy is valid"))
        });
        Arc::clone(&BUILTIN)
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &PolicyTag> {
        self.tags.iter().map(|(_, tag)| tag)
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.tag_by_norm.contains_key(&normalize_phrase(tag))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizerConfig {
    /// Maximum accepted edit distance for the fuzzy step.
    pub max_distance: usize,
    pub cache_size: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_distance: 2,
            cache_size: 256,
        }
    }
}

/// Maps free-text topic phrases to canonical tags.
///
/// Lookup order: exact (synonyms and canonical tags) → substring containment
/// → bounded edit distance. Ties at the same distance resolve to the first
/// candidate in table order (synonyms sorted by phrase, then tags in declared
/// order) — deterministic, but arbitrary between equally close tags.
pub struct TagNormalizer {
    taxonomy: Arc<Taxonomy>,
    config: NormalizerConfig,
    cache: Mutex<LruCache<String, Option<PolicyTag>>>,
}

impl TagNormalizer {
    pub fn new(taxonomy: Arc<Taxonomy>, config: NormalizerConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_size.max(1)).expect("non-zero cache size");
        Self {
            taxonomy,
            config,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn builtin() -> Self {
        Self::new(Taxonomy::builtin(), NormalizerConfig::default())
    }

    /// `None` signals "no canonical tag"; this is not an error condition.
    pub fn normalize(&self, phrase: &str) -> Option<PolicyTag> {
        let key = normalize_phrase(phrase);
        if key.chars().count() < 2 {
            return None;
        }

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        let result = self.lookup(&key);
        if result.is_none() {
            log::debug!("no canonical tag for phrase '{phrase}'");
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, result.clone());
        }
        result
    }

    fn lookup(&self, key: &str) -> Option<PolicyTag> {
        // 1. Exact: canonical tag or synonym.
        if let Some(tag) = self.taxonomy.tag_by_norm.get(key) {
            return Some(tag.clone());
        }
        if let Some(tag) = self.taxonomy.synonyms.get(key) {
            return Some(tag.clone());
        }

        // 2. Substring containment, both directions: "חינוך מיוחד" carries
        // the tag "חינוך" inside it, and "דת" sits inside "שירותי דת".
        for (norm_tag, tag) in &self.taxonomy.tags {
            if key.contains(norm_tag.as_str()) || norm_tag.contains(key) {
                return Some(tag.clone());
            }
        }

        // 3. Bounded fuzzy over synonym phrases, then canonical tags.
        let mut best: Option<(usize, &PolicyTag)> = None;
        let candidates = self
            .taxonomy
            .synonyms
            .iter()
            .map(|(phrase, tag)| (phrase.as_str(), tag))
            .chain(
                self.taxonomy
                    .tags
                    .iter()
                    .map(|(norm, tag)| (norm.as_str(), tag)),
            );
        for (candidate, tag) in candidates {
            let Some(distance) = bounded_levenshtein(key, candidate, self.config.max_distance)
            else {
                continue;
            };
            // Strictly-closer wins; equal distance keeps the earlier entry.
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, tag));
                if distance == 0 {
                    break;
                }
            }
        }
        best.map(|(_, tag)| tag.clone())
    }
}

/// Case-fold, collapse runs of whitespace, and unify Hebrew quote marks so
/// "נדל״ן" and "נדל\"ן" compare equal.
#[must_use]
pub fn normalize_phrase(phrase: &str) -> String {
    let unified: String = phrase
        .chars()
        .map(|c| match c {
            '״' => '"',
            '׳' => '\'',
            '־' => '-',
            other => other,
        })
        .collect();
    unified
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
