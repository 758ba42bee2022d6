//! Abbreviation gazetteer: the static code→name table for the languages,
//! dialects, and inscriptional sources cited in CDIAL cognate prose, plus the
//! recognition pattern derived from it.
//!
//! A code only counts when it appears as a whole token immediately followed by
//! a literal period, either at the start of the text or after a non-word
//! character. This keeps e.g. the code `it` from firing inside `merit.`.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

/// Embedded copy of the shipped schema, used when `--schema` is not given.
const DEFAULT_SCHEMA: &str = include_str!("../schema/abbreviations.yaml");

#[derive(Debug, Deserialize)]
struct AbbrevSchema {
    abbreviations: HashMap<String, String>,
}

/// Immutable code→name table with its derived recognition pattern.
///
/// Construction is the only fallible step; a table that builds successfully
/// cannot produce ambiguous matches afterwards.
#[derive(Debug)]
pub struct AbbrevTable {
    names: HashMap<String, String>,
    pattern: Regex,
}

impl AbbrevTable {
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        let schema: AbbrevSchema = serde_yaml::from_str(yaml)
            .map_err(|e| format!("Failed to parse abbreviation schema YAML: {}", e))?;
        Self::from_map(schema.abbreviations)
    }

    pub fn from_map(names: HashMap<String, String>) -> Result<Self, String> {
        let pattern = build_pattern(&names)?;
        Ok(AbbrevTable { names, pattern })
    }

    /// Table shipped with the binary.
    pub fn embedded() -> Result<Self, String> {
        Self::from_yaml(DEFAULT_SCHEMA)
    }

    /// Full designation for a code, if the code is in the table.
    pub fn name(&self, code: &str) -> Option<&str> {
        self.names.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All code occurrences in `text`, as `(byte offset of code, code)` in
    /// text order. Occurrences are non-overlapping; a candidate preceded by a
    /// word character is not a code mention, just prose.
    ///
    /// A rejected candidate must not swallow the text it covered: a shorter
    /// code can start inside it at a later boundary (`xAustro-as.` still
    /// holds the citation `as.`), so the scan resumes one character past a
    /// rejected candidate's start rather than past its end.
    pub fn find_codes<'t>(&self, text: &'t str) -> Vec<(usize, &'t str)> {
        let mut hits = Vec::new();
        let mut from = 0;
        while let Some(cap) = self.pattern.captures_at(text, from) {
            let code = match cap.get(1) {
                Some(m) => m,
                None => break,
            };
            if at_token_boundary(text, code.start()) {
                hits.push((code.start(), code.as_str()));
                // Skip the trailing period too.
                from = code.end() + 1;
            } else {
                from = code.start()
                    + text[code.start()..]
                        .chars()
                        .next()
                        .map_or(1, char::len_utf8);
            }
        }
        hits
    }
}

fn at_token_boundary(text: &str, start: usize) -> bool {
    match text[..start].chars().next_back() {
        None => true,
        Some(c) => !(c.is_alphanumeric() || c == '_'),
    }
}

/// Build the single recognition pattern for the whole code set.
///
/// Alternatives are ordered longest-first so that a code sharing a prefix
/// with a longer one (`kc` / `kcch`, `A` / `Ap`) never shadows it, and every
/// code is escaped since several contain literal periods (`h.rudh`).
fn build_pattern(names: &HashMap<String, String>) -> Result<Regex, String> {
    if names.is_empty() {
        return Err("Abbreviation table is empty".to_string());
    }
    if let Some(bad) = names.keys().find(|c| c.trim().is_empty()) {
        return Err(format!("Abbreviation table contains blank code {:?}", bad));
    }

    let mut codes: Vec<&String> = names.keys().collect();
    codes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let alternation = codes
        .iter()
        .map(|c| regex::escape(c.as_str()))
        .collect::<Vec<_>>()
        .join("|");

    Regex::new(&format!(r"({})\.", alternation))
        .map_err(|e| format!("Failed to build abbreviation pattern: {}", e))
}

// Global table loaded once at startup (fatal on failure, per the
// configuration-defect policy).
static ABBREV_TABLE: OnceCell<AbbrevTable> = OnceCell::new();

pub fn init_abbrevs(schema_path: Option<&PathBuf>) -> Result<(), String> {
    let table = match schema_path {
        Some(path) => {
            let mut file = File::open(path)
                .map_err(|e| format!("Failed to open schema file {:?}: {}", path, e))?;
            let mut contents = String::new();
            file.read_to_string(&mut contents)
                .map_err(|e| format!("Failed to read schema file: {}", e))?;
            AbbrevTable::from_yaml(&contents)?
        }
        None => AbbrevTable::embedded()?,
    };

    ABBREV_TABLE
        .set(table)
        .map_err(|_| "Abbreviation table already initialized".to_string())
}

pub fn get_abbrev_table() -> &'static AbbrevTable {
    ABBREV_TABLE
        .get()
        .expect("Abbreviation table not initialized - call init_abbrevs() first")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests for the gazetteer
// ─────────────────────────────────────────────────────────────────────────────
