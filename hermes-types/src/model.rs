use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A model identifier after canonicalization (see `hermes_core::normalizer`).
///
/// Invariant: normalization is pure and deterministic — the same `raw` input
/// always yields the same descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedModel {
    /// The original, unmodified identifier as advertised by the provider.
    pub raw: String,
    /// Lowercased, prefix-stripped, path-trimmed form.
    pub cleaned: String,
    /// `cleaned` with variant tokens dropped; version tokens retained.
    pub canonical: String,
    /// `canonical` with version tokens additionally dropped.
    pub family_key: String,
    /// Parsed version tuple, in the order encountered; empty if none found.
    pub version_parts: Vec<u32>,
}

/// Alias maps built once per dispatcher decision over the current provider set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasMaps {
    /// `canonical -> set of raw variants` sharing that family's representative canonical.
    pub canonical_to_variants: HashMap<String, HashSet<String>>,
    /// Every raw identifier and its own re-normalized canonical both map to their
    /// family's representative canonical.
    pub variant_to_canonical: HashMap<String, String>,
}

impl AliasMaps {
    /// Resolve a client-requested model name to the representative canonical,
    /// falling back to the name itself when no mapping exists.
    #[must_use]
    pub fn resolve_canonical<'a>(&'a self, requested: &'a str, own_canonical: &'a str) -> &'a str {
        self.variant_to_canonical
            .get(requested)
            .map(String::as_str)
            .or_else(|| self.variant_to_canonical.get(own_canonical).map(String::as_str))
            .unwrap_or(requested)
    }

    /// Raw variants registered under a canonical family, if any.
    #[must_use]
    pub fn variants_for(&self, canonical: &str) -> Option<&HashSet<String>> {
        self.canonical_to_variants.get(canonical)
    }
}

/// One entry of `GET /v1/models`'s `data` array.
#[derive(Debug, Clone, Serialize)]
pub struct ModelListEntry {
    /// Canonical model id as seen by clients.
    pub id: String,
    /// Always `"model"`, per the OpenAI models list schema.
    pub object: &'static str,
    /// Unix timestamp; since Hermes has no authoritative creation time for
    /// upstream models, this is the time the entry was first observed.
    pub created: i64,
    /// Always `"hermes-gateway"`.
    pub owned_by: &'static str,
}

/// Response body for `GET /v1/models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelListResponse {
    /// Always `"list"`.
    pub object: &'static str,
    /// Canonical model entries, sorted by id.
    pub data: Vec<ModelListEntry>,
}
