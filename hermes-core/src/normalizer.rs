//! Pure model-identifier canonicalization.
//!
//! `normalize` has no side effects and no dependency on provider or request
//! state: the same raw string always yields the same [`NormalizedModel`].
//! [`build_alias_maps`] layers a per-decision grouping on top, keyed by the
//! current provider catalog snapshot.

use std::collections::{HashMap, HashSet};

use hermes_types::{AliasMaps, NormalizedModel};

/// Generic modifiers dropped during canonicalization. Hardcoded rather than
/// operator-configurable — a reasonable scope cut for this implementation
/// (see the design notes on variant-token configurability).
const VARIANT_TOKENS: &[&str] = &[
    "latest", "default", "stable", "fast", "turbo", "slow", "high", "low", "medium", "mini",
    "lite", "light", "pro", "ultra", "think", "thinking", "instruct", "chat", "online", "beta",
    "preview", "docs", "free", "max", "xhigh",
];

const PREFIXES: &[&str] = &["models/", "model/", "m/"];

fn strip_prefix_ci(input: &str) -> &str {
    for prefix in PREFIXES {
        if input.len() >= prefix.len() && input[..prefix.len()].eq_ignore_ascii_case(prefix) {
            return &input[prefix.len()..];
        }
    }
    input
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '-' | '_' | ':') || c.is_whitespace()
}

fn parse_version_token(token: &str) -> Option<Vec<u32>> {
    let body = token.strip_prefix('v').unwrap_or(token);
    if body.is_empty() {
        return None;
    }
    let mut parts = Vec::new();
    for segment in body.split('.') {
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        parts.push(segment.parse().ok()?);
    }
    Some(parts)
}

fn is_all_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn is_date_or_build_tag(token: &str) -> bool {
    token.len() >= 4 && is_all_digits(token)
}

/// Normalize a single raw model identifier. Pure and deterministic.
///
/// A run of purely-numeric tokens that starts with a 4+-digit tag (e.g. the
/// `2024-05-13` in `gpt-4o-2024-05-13`) is dropped as one date stamp, not
/// token-by-token — otherwise the trailing `05`/`13` would parse as stray
/// version numbers and could outrank an undated sibling as the family's
/// canonical representative, which is never the intended reading of a date
/// suffix.
#[must_use]
pub fn normalize(raw: &str) -> NormalizedModel {
    let stripped = strip_prefix_ci(raw);
    let mut cleaned = stripped.to_lowercase();
    if let Some(idx) = cleaned.rfind('/') {
        cleaned = cleaned[idx + 1..].to_string();
    }

    let mut canonical_tokens: Vec<String> = Vec::new();
    let mut family_tokens: Vec<String> = Vec::new();
    let mut version_parts: Vec<u32> = Vec::new();
    let mut seen_version = false;
    let mut in_date_run = false;

    for token in cleaned.split(is_delimiter).filter(|t| !t.is_empty()) {
        if is_date_or_build_tag(token) {
            in_date_run = true;
            continue;
        }
        if in_date_run && is_all_digits(token) {
            continue;
        }
        in_date_run = false;
        if let Some(parts) = parse_version_token(token) {
            if !seen_version {
                version_parts = parts;
                seen_version = true;
            }
            canonical_tokens.push(token.to_string());
            continue;
        }
        if VARIANT_TOKENS.contains(&token) {
            continue;
        }
        canonical_tokens.push(token.to_string());
        family_tokens.push(token.to_string());
    }

    let canonical = if canonical_tokens.is_empty() {
        cleaned.clone()
    } else {
        canonical_tokens.join("-")
    };
    let family_key = if family_tokens.is_empty() {
        cleaned.clone()
    } else {
        family_tokens.join("-")
    };

    NormalizedModel {
        raw: raw.to_string(),
        cleaned,
        canonical,
        family_key,
        version_parts,
    }
}

/// Lexicographic comparison of version tuples, padding the shorter with zeros.
fn version_cmp(a: &[u32], b: &[u32]) -> std::cmp::Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let av = a.get(i).copied().unwrap_or(0);
        let bv = b.get(i).copied().unwrap_or(0);
        match av.cmp(&bv) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}

/// Build alias maps over the raw identifiers currently advertised across all
/// providers. `raw_identifiers` may contain duplicates (the same model hosted
/// by several providers) — every occurrence contributes to the variant set.
#[must_use]
pub fn build_alias_maps<I, S>(raw_identifiers: I) -> AliasMaps
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut by_family: HashMap<String, Vec<NormalizedModel>> = HashMap::new();
    for (order, raw) in raw_identifiers.into_iter().enumerate() {
        let model = normalize(raw.as_ref());
        by_family.entry(model.family_key.clone()).or_default().push(model);
        let _ = order; // insertion order is preserved by Vec push; kept for clarity
    }

    let mut canonical_to_variants: HashMap<String, HashSet<String>> = HashMap::new();
    let mut variant_to_canonical: HashMap<String, String> = HashMap::new();

    for members in by_family.into_values() {
        // First-seen order breaks ties: fold left-to-right, only replacing on
        // a strictly greater version.
        let mut best = &members[0];
        for m in &members[1..] {
            if version_cmp(&m.version_parts, &best.version_parts) == std::cmp::Ordering::Greater {
                best = m;
            }
        }
        let preferred_canonical = best.canonical.clone();

        let variants = canonical_to_variants.entry(preferred_canonical.clone()).or_default();
        for m in &members {
            variants.insert(m.raw.clone());
            variant_to_canonical.insert(m.raw.clone(), preferred_canonical.clone());
            variant_to_canonical.insert(m.canonical.clone(), preferred_canonical.clone());
        }
    }

    AliasMaps {
        canonical_to_variants,
        variant_to_canonical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_vendor_prefix_and_path_segment() {
        let n = normalize("models/gpt-4o-latest");
        assert_eq!(n.canonical, "gpt-4o");
        let n2 = normalize("vendor/gpt-4o");
        assert_eq!(n2.canonical, "gpt-4o");
    }

    #[test]
    fn drops_date_tag_and_variant_tokens() {
        let n = normalize("gpt-4o-2024-05-13");
        assert_eq!(n.canonical, "gpt-4o");
        let n2 = normalize("gpt-4o-mini");
        assert_eq!(n2.canonical, "gpt-4o");
        assert_eq!(n2.family_key, "gpt-4o");
    }

    #[test]
    fn version_token_is_retained_in_canonical_but_not_family_key() {
        let n = normalize("claude-3-opus");
        assert_eq!(n.version_parts, vec![3]);
        assert_eq!(n.canonical, "claude-3-opus");
        assert_eq!(n.family_key, "claude-opus");
    }

    #[test]
    fn empty_join_falls_back_to_cleaned_form() {
        // Every token is a variant token; canonical/family joins are empty.
        let n = normalize("latest");
        assert_eq!(n.canonical, "latest");
        assert_eq!(n.family_key, "latest");
    }

    #[test]
    fn alias_map_collapses_catalog_to_single_family() {
        let catalog = [
            "gpt-4o-2024-05-13",
            "gpt-4o-mini",
            "models/gpt-4o-latest",
            "vendor/gpt-4o",
        ];
        let maps = build_alias_maps(catalog);
        // All four collapse into the gpt-4o family.
        assert_eq!(maps.canonical_to_variants.len(), 1);
        let (canonical, variants) = maps.canonical_to_variants.iter().next().unwrap();
        assert_eq!(canonical, "gpt-4o");
        assert_eq!(variants.len(), 4);
        for raw in catalog {
            assert_eq!(maps.variant_to_canonical.get(raw).unwrap(), "gpt-4o");
        }
    }

    #[test]
    fn highest_version_wins_canonical_representative() {
        let maps = build_alias_maps(["claude-2", "claude-3", "claude-1"]);
        assert_eq!(maps.canonical_to_variants.len(), 1);
        let canonical = maps.canonical_to_variants.keys().next().unwrap();
        assert_eq!(canonical, "claude-3");
    }

    #[test]
    fn every_raw_identifier_has_an_inverse_map_entry() {
        let catalog = ["gpt-4o-mini", "claude-3-opus", "gpt-4-turbo"];
        let maps = build_alias_maps(catalog);
        for raw in catalog {
            let canonical = maps.variant_to_canonical.get(raw).expect("entry exists");
            let variants = maps.canonical_to_variants.get(canonical).expect("variants exist");
            assert!(variants.contains(raw));
        }
    }
}
