// 📖 Name Directory - Display name → canonical code, plus name patterns
//
// Problem solved:
// - Notices mention "Шереметьево", "Шереметьеве", "Шереметьева" → same airport
// - A code seen once next to a name ("Казань (UWKD)") should resolve every
//   later bare mention of that name
//
// The directory is scoped to one run: seeded from a static table, extended
// from the store's records and from every "name (CODE)" mention observed.
// Entries are only ever added (or given a code), never removed.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Stems shorter than this are not used; the word is matched verbatim
pub const MIN_STEM_LEN: usize = 4;

/// Airports known before any notice is read
pub const SEED_LOCATIONS: &[(&str, &str)] = &[
    ("Внуково", "UUWW"),
    ("Домодедово", "UUDD"),
    ("Шереметьево", "UUEE"),
    ("Жуковский", "UUBW"),
    ("Пулково", "ULLI"),
    ("Казань", "UWKD"),
    ("Нижний Новгород", "UWGG"),
    ("Тамбов", "UUOT"),
    ("Ижевск", "USII"),
    ("Нижнекамск", "UWKE"),
    ("Саратов", "UWSG"),
    ("Владимир", "UUBY"),
    ("Ярославль", "UUDL"),
];

/// Case endings stripped before a vowel, longest first
const CASE_ENDINGS: &[&str] = &[
    "ого", "его", "ому", "ему", "ий", "ый", "ой", "ая", "яя", "ое", "ее", "ые", "ие", "ь", "й",
    "а", "о", "у", "ы", "э", "е", "ё", "и", "ю", "я", "a", "e", "i", "o", "u", "y",
];

const WORD_SEPARATOR: &str = r"[\s\-\u{2013}\u{2014}]+";

// ============================================================================
// NAME PATTERNS
// ============================================================================

/// Stem of one word: known ending stripped unless the rest would be shorter
/// than `min_len` characters
pub fn stem_word(word: &str, min_len: usize) -> &str {
    let lower = word.to_lowercase();

    for ending in CASE_ENDINGS {
        if !lower.ends_with(ending) {
            continue;
        }
        let keep = word.chars().count().saturating_sub(ending.chars().count());
        if keep < min_len {
            return word;
        }
        let cut = word
            .char_indices()
            .nth(keep)
            .map(|(i, _)| i)
            .unwrap_or(word.len());
        return &word[..cut];
    }

    word
}

/// Case-insensitive pattern matching any inflection of `name`.
///
/// Example: "Нижний Новгород" → `\bНижн\w*[\s-–—]+Новгород\w*`
pub fn name_pattern(name: &str, min_len: usize) -> Result<Regex, regex::Error> {
    let words: Vec<String> = name
        .split_whitespace()
        .map(|word| format!(r"{}\w*", regex::escape(stem_word(word, min_len))))
        .collect();

    RegexBuilder::new(&format!(r"\b{}", words.join(WORD_SEPARATOR)))
        .case_insensitive(true)
        .build()
}

// ============================================================================
// NAME DIRECTORY
// ============================================================================

/// One directory entry as stored in a seed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub identifier: Option<String>,
}

pub struct NameDirectory {
    /// name → code (`None` while the code is unknown)
    entries: BTreeMap<String, Option<String>>,

    /// name → compiled inflection pattern
    patterns: BTreeMap<String, Regex>,

    min_stem_len: usize,
}

impl NameDirectory {
    /// Create new empty directory
    pub fn new(min_stem_len: usize) -> Self {
        NameDirectory {
            entries: BTreeMap::new(),
            patterns: BTreeMap::new(),
            min_stem_len,
        }
    }

    /// Directory pre-loaded with the seed table
    pub fn seeded(min_stem_len: usize) -> Self {
        let mut directory = NameDirectory::new(min_stem_len);
        for (name, code) in SEED_LOCATIONS {
            directory.learn(name, Some(*code));
        }
        directory
    }

    /// Record a name, optionally with its code.
    ///
    /// A code overwrites an earlier one; learning a name without a code never
    /// erases a known code. Returns `true` if the directory changed.
    pub fn learn(&mut self, name: &str, identifier: Option<&str>) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }

        if !self.patterns.contains_key(name) {
            match name_pattern(name, self.min_stem_len) {
                Ok(pattern) => {
                    self.patterns.insert(name.to_string(), pattern);
                }
                Err(e) => {
                    warn!(name, error = %e, "cannot build name pattern, name ignored");
                    return false;
                }
            }
        }

        if let Some(existing) = self.entries.get_mut(name) {
            return match identifier {
                Some(code) if existing.as_deref() != Some(code) => {
                    *existing = Some(code.to_string());
                    true
                }
                _ => false,
            };
        }

        self.entries
            .insert(name.to_string(), identifier.map(str::to_string));
        true
    }

    /// Merge a JSON seed file `{"name": "CODE" | null}` into the directory
    pub fn extend_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read seed file: {:?}", path.as_ref()))?;

        let seed: BTreeMap<String, Option<String>> =
            serde_json::from_str(&content).context("Failed to parse seed JSON")?;

        let mut added = 0;
        for (name, code) in &seed {
            if self.learn(name, code.as_deref()) {
                added += 1;
            }
        }

        Ok(added)
    }

    /// Code known for an exact display name
    pub fn identifier_for(&self, name: &str) -> Option<&str> {
        self.entries.get(name.trim()).and_then(|c| c.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name.trim())
    }

    /// Every known name whose pattern occurs in `text`, in name order
    pub fn mentioned_in(&self, text: &str) -> Vec<DirectoryEntry> {
        self.patterns
            .iter()
            .filter(|(_, pattern)| pattern.is_match(text))
            .filter_map(|(name, _)| {
                self.entries.get(name).map(|code| DirectoryEntry {
                    name: name.clone(),
                    identifier: code.clone(),
                })
            })
            .collect()
    }

    /// All names registered for a code
    pub fn names_for(&self, identifier: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, code)| code.as_deref() == Some(identifier))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for NameDirectory {
    fn default() -> Self {
        Self::seeded(MIN_STEM_LEN)
    }
}

// ============================================================================
// TESTS
// ============================================================================
