//! The ref grammar.
//!
//! Refs are opaque short strings of the form `{type}_{n}` for persisted
//! entities and `gen_{type}_{n}` for generated-not-saved entities. A string
//! is a ref iff it matches the grammar and is not a canonical identifier;
//! when shape alone is ambiguous, a registry lookup decides.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

static REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(gen_)?([a-z_]+)_([0-9]+)$").unwrap());

/// Matches ref-shaped substrings inside larger text (used to keep the
/// compressed history narrative free of refs).
static REF_IN_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(gen_)?[a-z][a-z_]*_[0-9]+\b").unwrap());

/// A parsed ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRef<'a> {
    pub generated: bool,
    pub entity_type: &'a str,
    pub ordinal: u32,
}

/// Canonical identifiers are UUIDs; they are never shown to interpreters.
pub fn is_canonical_id(s: &str) -> bool {
    Uuid::parse_str(s).is_ok()
}

/// Shape test only. Callers that need the ambiguity rule should consult
/// the registry (`SessionIdRegistry::is_known_ref`) as well.
pub fn is_ref_shaped(s: &str) -> bool {
    REF_RE.is_match(s) && !is_canonical_id(s)
}

pub fn parse(s: &str) -> Option<ParsedRef<'_>> {
    if is_canonical_id(s) {
        return None;
    }
    let caps = REF_RE.captures(s)?;
    let entity_type = caps.get(2)?.as_str();
    let ordinal: u32 = caps.get(3)?.as_str().parse().ok()?;
    Some(ParsedRef {
        generated: caps.get(1).is_some(),
        entity_type,
        ordinal,
    })
}

pub fn format_ref(entity_type: &str, ordinal: u32) -> String {
    format!("{entity_type}_{ordinal}")
}

pub fn format_gen_ref(entity_type: &str, ordinal: u32) -> String {
    format!("gen_{entity_type}_{ordinal}")
}

/// True when the text contains any ref-shaped substring.
pub fn contains_ref_shaped(text: &str) -> bool {
    REF_IN_TEXT_RE.is_match(text)
}

/// Replace ref-shaped substrings with a neutral placeholder.
pub fn scrub_refs(text: &str) -> String {
    REF_IN_TEXT_RE.replace_all(text, "[item]").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_persisted_and_generated_refs() {
        let r = parse("recipe_3").unwrap();
        assert!(!r.generated);
        assert_eq!(r.entity_type, "recipe");
        assert_eq!(r.ordinal, 3);

        let g = parse("gen_pantry_item_12").unwrap();
        assert!(g.generated);
        assert_eq!(g.entity_type, "pantry_item");
        assert_eq!(g.ordinal, 12);
    }

    #[test]
    fn rejects_non_refs() {
        assert!(parse("Recipe_3").is_none());
        assert!(parse("recipe").is_none());
        assert!(parse("recipe_").is_none());
        assert!(parse("3_recipe").is_none());
        assert!(!is_ref_shaped("hello world"));
    }

    #[test]
    fn canonical_ids_are_not_refs() {
        let id = Uuid::new_v4().to_string();
        assert!(is_canonical_id(&id));
        assert!(!is_ref_shaped(&id));
        assert!(parse(&id).is_none());
    }

    #[test]
    fn format_roundtrips_through_parse() {
        let s = format_gen_ref("recipe", 7);
        let p = parse(&s).unwrap();
        assert!(p.generated);
        assert_eq!(format_ref(p.entity_type, p.ordinal), "recipe_7");
    }

    #[test]
    fn scrub_removes_embedded_refs() {
        let text = "picked recipe_2 and gen_recipe_1 for dinner";
        assert!(contains_ref_shaped(text));
        let scrubbed = scrub_refs(text);
        assert!(!contains_ref_shaped(&scrubbed));
        assert_eq!(scrubbed, "picked [item] and [item] for dinner");
    }

    #[test]
    fn plain_prose_survives_scrub() {
        let text = "three cod recipes were saved";
        assert!(!contains_ref_shaped(text));
        assert_eq!(scrub_refs(text), text);
    }
}
