//! Core entry parser: turns one isolated entry fragment into an
//! [`EtymonEntry`] and accumulates reflex records into the aggregate index.
//!
//! A fragment is a text blob containing one `<number>` element, one bolded
//! lemma, and zero or more `<br/>`-separated lines of cognate prose. The
//! pipeline is: lemma/number capture → parenthetical stripping → per-code
//! segmentation via the gazetteer pattern → form/gloss extraction.

use crate::abbrev::AbbrevTable;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref NUMBER_PATTERN: Regex = Regex::new(r"<number>\s*([^<]*?)\s*</number>").unwrap();
    static ref BOLD_PATTERN: Regex = Regex::new(r"(?s)<b>(.*?)</b>").unwrap();
    static ref TAG_PATTERN: Regex = Regex::new(r"</?[a-zA-Z][^>]*>").unwrap();
    static ref BR_PATTERN: Regex = Regex::new(r"<br\s*/?>").unwrap();
    static ref PAREN_PATTERN: Regex = Regex::new(r"\([^()]*\)").unwrap();

    // A "run" is either an italic form run or a quoted gloss run. The gloss
    // quotes are the curly pair ʻ…ʼ, not straight apostrophes.
    static ref RUN_PATTERN: Regex = Regex::new(r"<i>(.*?)</i>|ʻ(.*?)ʼ").unwrap();
}

/// The language tag carried by every entry's implicit head record.
pub const HEAD_LANG: &str = "Indo-Aryan";

// Kacchī is a dialect of Sindhī; a `kcch.` citation directly after a bare
// `S.` citation belongs to the dialect, so the pending `S` is retracted.
// This is the only code pair the source data is known to need.
const DIALECT_CODE: &str = "kcch";
const SUPERSEDED_CODE: &str = "S";

/// One language's contribution within an entry. `words` keeps source order;
/// comma-separated forms before a shared gloss run each carry a copy of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflexRecord {
    pub lang: String,
    pub words: Vec<(String, String)>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none", default)]
    pub reference: Option<String>,
}

/// One numbered headword group. `number` is an opaque string; source keys are
/// not guaranteed numeric and are preserved verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct EtymonEntry {
    pub number: String,
    pub lemma: String,
    pub reference: String,
    pub reflexes: Vec<ReflexRecord>,
}

/// Etymon number → ordered reflex records, in discovery order. Numbers are
/// not unique across fragments, so records concatenate rather than overwrite.
pub type AggregateIndex = IndexMap<String, Vec<ReflexRecord>>;

/// Append one entry's records under its number. Nothing is deduplicated.
pub fn accumulate(index: &mut AggregateIndex, entry: EtymonEntry) {
    index.entry(entry.number).or_default().extend(entry.reflexes);
}

/// Remove parenthetical asides, innermost-first, until a pass removes
/// nothing. Unmatched parens stay in place, which also guarantees
/// termination: each pass either shrinks the text or is the last.
pub fn strip_parentheticals(text: &str) -> String {
    let mut text = text.to_string();
    loop {
        let stripped = PAREN_PATTERN.replace_all(&text, "");
        if stripped == text {
            return text;
        }
        text = stripped.into_owned();
    }
}

/// Span-local cleanup applied before form/gloss extraction: the modifier
/// acute (U+02CA) becomes the combining acute (U+0301), and the double
/// hyphen (spaced or not) becomes an en dash. No other diacritic
/// normalization is performed; forms are otherwise kept as attested.
fn normalize_span(span: &str) -> String {
    span.replace('\u{2ca}', "\u{301}")
        .replace(" -- ", "\u{2013}")
        .replace("--", "\u{2013}")
}

/// Extract ordered `(form, gloss)` pairs from one language's span.
///
/// Runs are walked left to right. A form run flushes the previous pending
/// form group; gloss runs collect until the next flush and are joined with
/// `"; "`. Comma-separated forms inside one italic run all receive the same
/// joined gloss. Gloss runs seen before any form run have nothing to attach
/// to and are dropped.
pub fn extract_words(span: &str) -> Vec<(String, String)> {
    let mut words = Vec::new();
    let mut group: Option<String> = None;
    let mut glosses: Vec<String> = Vec::new();

    for cap in RUN_PATTERN.captures_iter(span) {
        if let Some(forms) = cap.get(1) {
            if let Some(g) = group.take() {
                flush_group(&g, &glosses, &mut words);
            }
            glosses.clear();
            group = Some(forms.as_str().to_string());
        } else if let Some(gloss) = cap.get(2) {
            glosses.push(gloss.as_str().trim().to_string());
        }
    }
    if let Some(g) = group {
        flush_group(&g, &glosses, &mut words);
    }

    words
}

fn flush_group(group: &str, glosses: &[String], out: &mut Vec<(String, String)>) {
    let gloss = glosses.join("; ");
    for piece in group.split(',') {
        out.push((piece.trim().to_string(), gloss.clone()));
    }
}

/// Parse one entry fragment. Returns `None` for fragments with no bolded
/// lemma or no number element; those are not entries and are skipped.
pub fn parse_fragment(fragment: &str, table: &AbbrevTable) -> Option<EtymonEntry> {
    let lemma_cap = BOLD_PATTERN.captures(fragment)?;
    let lemma = TAG_PATTERN
        .replace_all(&lemma_cap[1], "")
        .trim()
        .to_string();
    let number = NUMBER_PATTERN.captures(fragment)?[1].to_string();

    let flat = fragment.replace('\n', "");
    let lines: Vec<&str> = BR_PATTERN.split(&flat).collect();
    let reference = lines[0].to_string();

    // Implicit head record: the lemma itself, glossless, carrying the
    // citation line. Always first.
    let mut reflexes = vec![ReflexRecord {
        lang: HEAD_LANG.to_string(),
        words: vec![(lemma.clone(), String::new())],
        reference: Some(reference.clone()),
    }];

    if lines.len() > 1 {
        let cognates = strip_parentheticals(&lines[1..].join(", "));
        segment_cognates(&cognates, table, &mut reflexes);
    }

    Some(EtymonEntry {
        number,
        lemma,
        reference,
        reflexes,
    })
}

/// Slice the cleaned cognates text into per-code spans and extract records.
///
/// A code whose span carries no form or gloss markup stays pending: when a
/// later span flushes, every pending code receives its own record sharing
/// that span's word list. A span holding only gloss runs still flushes, with
/// an empty word list. Pending codes left at the end of the text emit
/// nothing.
fn segment_cognates(cognates: &str, table: &AbbrevTable, out: &mut Vec<ReflexRecord>) {
    let hits = table.find_codes(cognates);
    let mut pending: Vec<String> = Vec::new();

    for (i, &(start, code)) in hits.iter().enumerate() {
        let end = hits.get(i + 1).map(|h| h.0).unwrap_or(cognates.len());
        let span = normalize_span(&cognates[start..end]);

        if code == DIALECT_CODE && pending.last().map(String::as_str) == Some(SUPERSEDED_CODE) {
            pending.pop();
        }
        pending.push(code.to_string());

        // Pending only when the span has no runs at all; a gloss-only span
        // is still a flush boundary.
        if !RUN_PATTERN.is_match(&span) {
            continue;
        }
        let words = extract_words(&span);
        for lang in pending.drain(..) {
            out.push(ReflexRecord {
                lang,
                words: words.clone(),
                reference: None,
            });
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests for the parsing core
// ─────────────────────────────────────────────────────────────────────────────



#[cfg(test)]
mod segmenter_tests {
    use super::*;
    use crate::abbrev::AbbrevTable;

    fn table() -> AbbrevTable {
        AbbrevTable::embedded().unwrap()
    }

    fn fragment(number: &str, lemma: &str, cognates: &str) -> String {
        format!(
            "<number>{}</number> <b>{}</b> rel. to √kar<br/>{}",
            number, lemma, cognates
        )
    }

    #[test]
    fn end_to_end_two_codes() {
        let frag = fragment(
            "2911",
            "kara",
            "H. <i>kaṭh</i> ʻdoʼ Ar. <i>baṭ</i> ʻsomethingʼ",
        );
        let entry = parse_fragment(&frag, &table()).unwrap();

        assert_eq!(entry.number, "2911");
        assert_eq!(entry.lemma, "kara");
        assert_eq!(
            entry.reference,
            "<number>2911</number> <b>kara</b> rel. to √kar"
        );
        assert_eq!(entry.reflexes.len(), 3);
        assert_eq!(entry.reflexes[1].lang, "H");
        assert_eq!(
            entry.reflexes[1].words,
            vec![("kaṭh".to_string(), "do".to_string())]
        );
        assert_eq!(entry.reflexes[2].lang, "Ar");
        assert_eq!(
            entry.reflexes[2].words,
            vec![("baṭ".to_string(), "something".to_string())]
        );
    }

    #[test]
    fn implicit_head_record_is_always_first() {
        let frag = fragment("100", "lemma", "H. <i>x</i> ʻyʼ");
        let entry = parse_fragment(&frag, &table()).unwrap();
        assert_eq!(entry.reflexes[0].lang, HEAD_LANG);
        assert_eq!(
            entry.reflexes[0].words,
            vec![("lemma".to_string(), String::new())]
        );
        assert_eq!(entry.reflexes[0].reference.as_deref(), Some(entry.reference.as_str()));
    }

    #[test]
    fn lemma_only_fragment_yields_head_record_only() {
        let frag = "<number>17</number> <b>kara</b> see 2911";
        let entry = parse_fragment(frag, &table()).unwrap();
        assert_eq!(entry.reflexes.len(), 1);
        assert_eq!(entry.reflexes[0].lang, HEAD_LANG);
    }

    #[test]
    fn fragment_without_lemma_is_skipped() {
        assert!(parse_fragment("<number>3</number> plain prose", &table()).is_none());
    }

    #[test]
    fn fragment_without_number_is_skipped() {
        assert!(parse_fragment("<b>kara</b> prose", &table()).is_none());
    }

    #[test]
    fn nested_tags_inside_lemma_are_stripped() {
        let frag = "<number>5</number> <b>ka<i>ra</i></b>";
        let entry = parse_fragment(frag, &table()).unwrap();
        assert_eq!(entry.lemma, "kara");
    }

    #[test]
    fn parenthetical_aside_removed_from_cognates() {
        let frag = fragment("7", "kara", "H. <i>a</i> (cf. <i>zzz</i>) ʻbʼ");
        let entry = parse_fragment(&frag, &table()).unwrap();
        assert_eq!(
            entry.reflexes[1].words,
            vec![("a".to_string(), "b".to_string())]
        );
    }

    #[test]
    fn multiline_cognates_joined_with_comma() {
        let frag = fragment("8", "kara", "H. <i>a</i> ʻbʼ<br/>P. <i>c</i> ʻdʼ");
        let entry = parse_fragment(&frag, &table()).unwrap();
        let langs: Vec<&str> = entry.reflexes.iter().map(|r| r.lang.as_str()).collect();
        assert_eq!(langs, vec![HEAD_LANG, "H", "P"]);
    }

    #[test]
    fn formless_code_fans_out_to_next_span() {
        // "Or." carries no markup of its own, so it shares the next span's
        // form set; both records own independent copies.
        let frag = fragment("9", "kara", "Or. L. <i>x</i> ʻgʼ");
        let entry = parse_fragment(&frag, &table()).unwrap();
        assert_eq!(entry.reflexes.len(), 3);
        assert_eq!(entry.reflexes[1].lang, "Or");
        assert_eq!(entry.reflexes[2].lang, "L");
        assert_eq!(entry.reflexes[1].words, entry.reflexes[2].words);
        assert_eq!(
            entry.reflexes[1].words,
            vec![("x".to_string(), "g".to_string())]
        );
    }

    #[test]
    fn trailing_formless_code_emits_nothing() {
        let frag = fragment("10", "kara", "H. <i>a</i> ʻbʼ P.");
        let entry = parse_fragment(&frag, &table()).unwrap();
        let langs: Vec<&str> = entry.reflexes.iter().map(|r| r.lang.as_str()).collect();
        assert_eq!(langs, vec![HEAD_LANG, "H"]);
    }

    #[test]
    fn gloss_only_span_flushes_with_empty_words() {
        // A span with a gloss run but no form run still flushes: the code
        // gets an empty word list and does not inherit the next span's forms.
        let frag = fragment("15", "kara", "K. ʻonly a glossʼ H. <i>x</i> ʻyʼ");
        let entry = parse_fragment(&frag, &table()).unwrap();
        let summary: Vec<(&str, usize)> = entry
            .reflexes
            .iter()
            .map(|r| (r.lang.as_str(), r.words.len()))
            .collect();
        assert_eq!(summary, vec![(HEAD_LANG, 1), ("K", 0), ("H", 1)]);
        assert_eq!(
            entry.reflexes[2].words,
            vec![("x".to_string(), "y".to_string())]
        );
    }

    #[test]
    fn kcch_supersedes_pending_sindhi() {
        let frag = fragment("11", "kara", "S. kcch. <i>x</i> ʻgʼ");
        let entry = parse_fragment(&frag, &table()).unwrap();
        let langs: Vec<&str> = entry.reflexes.iter().map(|r| r.lang.as_str()).collect();
        assert_eq!(langs, vec![HEAD_LANG, "kcch"]);
    }

    #[test]
    fn kcch_keeps_already_flushed_sindhi() {
        let frag = fragment("12", "kara", "S. <i>a</i> ʻbʼ kcch. <i>c</i> ʻdʼ");
        let entry = parse_fragment(&frag, &table()).unwrap();
        let langs: Vec<&str> = entry.reflexes.iter().map(|r| r.lang.as_str()).collect();
        assert_eq!(langs, vec![HEAD_LANG, "S", "kcch"]);
    }

    #[test]
    fn kcch_after_gloss_only_sindhi_retracts_nothing() {
        // The gloss-only S. span is a flush boundary, so S is no longer
        // pending when kcch. arrives and both records survive.
        let frag = fragment("16", "kara", "S. ʻglossʼ kcch. <i>x</i> ʻgʼ");
        let entry = parse_fragment(&frag, &table()).unwrap();
        let summary: Vec<(&str, usize)> = entry
            .reflexes
            .iter()
            .map(|r| (r.lang.as_str(), r.words.len()))
            .collect();
        assert_eq!(summary, vec![(HEAD_LANG, 1), ("S", 0), ("kcch", 1)]);
    }

    #[test]
    fn kcch_after_other_code_retracts_nothing() {
        let frag = fragment("13", "kara", "H. kcch. <i>x</i> ʻgʼ");
        let entry = parse_fragment(&frag, &table()).unwrap();
        let langs: Vec<&str> = entry.reflexes.iter().map(|r| r.lang.as_str()).collect();
        assert_eq!(langs, vec![HEAD_LANG, "H", "kcch"]);
    }

    #[test]
    fn acute_and_double_hyphen_normalized_in_forms() {
        let frag = fragment("14", "kara", "H. <i>kaˊr, ab--cd</i> ʻe -- fʼ");
        let entry = parse_fragment(&frag, &table()).unwrap();
        assert_eq!(
            entry.reflexes[1].words,
            vec![
                ("ka\u{301}r".to_string(), "e\u{2013}f".to_string()),
                ("ab\u{2013}cd".to_string(), "e\u{2013}f".to_string()),
            ]
        );
    }

    #[test]
    fn span_slices_cover_cognates_text() {
        let t = table();
        let cognates = "H. <i>a</i> ʻbʼ P. <i>c</i> Or. <i>d</i>";
        let hits = t.find_codes(cognates);
        assert_eq!(hits.len(), 3);

        let mut rebuilt = String::new();
        for (i, &(start, _)) in hits.iter().enumerate() {
            let end = hits.get(i + 1).map(|h| h.0).unwrap_or(cognates.len());
            rebuilt.push_str(&cognates[start..end]);
        }
        assert_eq!(rebuilt, &cognates[hits[0].0..]);
    }
}
