// 🧹 Text Normalizer - Canonical text for stable matching
//
// Every downstream matcher (classifier, resolver) sees text that went through
// here first: markup removed, HTML entities decoded, Unicode composed (NFC).

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// PATTERNS
// ============================================================================

fn re_markup() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("markup regex"))
}

fn re_entity() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&#?[A-Za-z0-9]{1,32};").expect("entity regex"))
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Normalize one raw text fragment.
///
/// Never fails: an entity that cannot be decoded is kept verbatim.
pub fn normalize_text(raw: &str) -> String {
    let without_markup = re_markup().replace_all(raw, " ");
    let unescaped = unescape_entities(&without_markup);
    unescaped.nfc().collect()
}

/// Join the text fragments of one item and normalize the result.
///
/// Fragments are separated by newlines so that patterns bounded by a full
/// stop never glue the end of a title to the start of a summary.
pub fn normalize_fragments<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = fragments
        .into_iter()
        .map(|f| f.as_ref().to_string())
        .filter(|f| !f.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    normalize_text(&joined)
}

/// Decode HTML entities one by one.
///
/// Decoding per entity (instead of over the whole string) keeps a lone `&`
/// such as "AT&T" from disabling decoding of the rest of the text.
fn unescape_entities(text: &str) -> Cow<'_, str> {
    re_entity().replace_all(text, |caps: &regex::Captures| {
        let entity = &caps[0];
        match unescape_with(entity, resolve_html5_entity) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => entity.to_string(),
        }
    })
}

// ============================================================================
// SLUGS
// ============================================================================

/// Name-derived provisional key: lowercase, diacritics folded, words joined
/// by `-`.
///
/// Example: "Öresund Śląsk" → "oresund-slask", "Шереметьево" → "шереметьево"
pub fn slugify(name: &str) -> String {
    let folded: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(|c| c.to_lowercase())
        .collect();

    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

// ============================================================================
// TESTS
// ============================================================================
