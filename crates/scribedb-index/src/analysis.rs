//! Per-field analysis chain: filtering, word splitting, length bounds,
//! stop words and optional stemming.
//!
//! Query terms and record values run through the same chain, so a query
//! token always lines up with its posting key.

use rust_stemmers::{Algorithm, Stemmer};
use scribedb_commons::{FieldDefinition, IndexSchema};
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Field types the engine advertises.
pub const SUPPORTED_TYPES: &[&str] = &["text", "number", "date"];

/// Field filters the engine advertises.
pub const SUPPORTED_FILTERS: &[&str] = &["alphanum", "markdown"];

const DEFAULT_MIN_WORD_LENGTH: usize = 1;
const DEFAULT_MAX_WORD_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    Text,
    Number,
    Date,
}

/// Analysis configuration of one field.
pub struct Analyzer {
    field_type: FieldType,
    filter: Option<String>,
    min_word_length: usize,
    max_word_length: usize,
    remove_words: HashSet<String>,
    use_stemmer: bool,
}

impl Analyzer {
    /// Builds the analyzer for `field`, pulling stop words from the schema
    /// when the field opts in.
    pub fn for_field(field: &FieldDefinition, schema: &IndexSchema) -> Self {
        let field_type = match field.field_type.as_deref() {
            Some("number") => FieldType::Number,
            Some("date") => FieldType::Date,
            _ => FieldType::Text,
        };
        let remove_words = if field.use_remove_words.unwrap_or(false) {
            schema
                .remove_words
                .iter()
                .map(|w| w.to_lowercase())
                .collect()
        } else {
            HashSet::new()
        };
        Self {
            field_type,
            filter: field.filter.clone(),
            min_word_length: field.min_word_length.unwrap_or(DEFAULT_MIN_WORD_LENGTH),
            max_word_length: field.max_word_length.unwrap_or(DEFAULT_MAX_WORD_LENGTH),
            remove_words,
            use_stemmer: field.use_stemmer.unwrap_or(false),
        }
    }

    /// Runs `text` through the chain, producing index/query tokens.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        match self.field_type {
            FieldType::Number => number_token(text).into_iter().collect(),
            FieldType::Date => date_token(text).into_iter().collect(),
            FieldType::Text => self.text_tokens(text),
        }
    }

    fn text_tokens(&self, text: &str) -> Vec<String> {
        let filtered = match self.filter.as_deref() {
            Some("alphanum") => text
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { ' ' })
                .collect::<String>(),
            Some("markdown") => text
                .chars()
                .map(|c| match c {
                    '#' | '*' | '_' | '`' | '[' | ']' | '(' | ')' | '>' | '|' => ' ',
                    other => other,
                })
                .collect::<String>(),
            _ => text.to_string(),
        };

        let stemmer = self
            .use_stemmer
            .then(|| Stemmer::create(Algorithm::English));

        filtered
            .unicode_words()
            .map(|w| w.to_lowercase())
            .filter(|w| {
                w.chars().count() >= self.min_word_length
                    && w.chars().count() <= self.max_word_length
            })
            .filter(|w| !self.remove_words.contains(w))
            .map(|w| match &stemmer {
                Some(stemmer) => stemmer.stem(&w).into_owned(),
                None => w,
            })
            .collect()
    }
}

/// Canonical token of a numeric value (`"1.50"` and `1.5` agree).
pub fn number_token(raw: &str) -> Option<String> {
    raw.trim().parse::<f64>().ok().map(|n| format!("{}", n))
}

/// Canonical token of a date value: epoch seconds.
///
/// Accepts RFC 3339, plain `YYYY-MM-DD`, and raw epoch numbers.
pub fn date_token(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp().to_string());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(midnight.and_utc().timestamp().to_string());
    }
    number_token(raw)
}

/// Canonical master-list value of a field: trimmed, case-folded text.
pub fn summary_value(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribedb_commons::FieldDefinition;

    fn schema_with(remove_words: Vec<&str>) -> IndexSchema {
        IndexSchema::new("myapp", vec![FieldDefinition::text("body", "/Body")])
            .with_remove_words(remove_words.into_iter().map(String::from).collect())
    }

    #[test]
    fn test_basic_tokens() {
        let field = FieldDefinition::text("body", "/Body");
        let analyzer = Analyzer::for_field(&field, &schema_with(vec![]));
        assert_eq!(
            analyzer.tokens("Apples, and PEARS!"),
            vec!["apples", "and", "pears"]
        );
    }

    #[test]
    fn test_remove_words_opt_in() {
        let schema = schema_with(vec!["and", "the"]);
        let mut field = FieldDefinition::text("body", "/Body");

        let analyzer = Analyzer::for_field(&field, &schema);
        assert_eq!(analyzer.tokens("cats and dogs"), vec!["cats", "and", "dogs"]);

        field.use_remove_words = Some(true);
        let analyzer = Analyzer::for_field(&field, &schema);
        assert_eq!(analyzer.tokens("cats and dogs"), vec!["cats", "dogs"]);
    }

    #[test]
    fn test_word_length_bounds() {
        let mut field = FieldDefinition::text("body", "/Body");
        field.min_word_length = Some(3);
        let analyzer = Analyzer::for_field(&field, &schema_with(vec![]));
        assert_eq!(analyzer.tokens("an ox ate hay"), vec!["ate", "hay"]);
    }

    #[test]
    fn test_stemmer() {
        let mut field = FieldDefinition::text("body", "/Body");
        field.use_stemmer = Some(true);
        let analyzer = Analyzer::for_field(&field, &schema_with(vec![]));
        assert_eq!(analyzer.tokens("running runs"), vec!["run", "run"]);
    }

    #[test]
    fn test_number_tokens_are_canonical() {
        assert_eq!(number_token("1.50"), Some("1.5".to_string()));
        assert_eq!(number_token("01"), Some("1".to_string()));
        assert_eq!(number_token("apples"), None);

        let field = FieldDefinition::number("count", "/Count");
        let analyzer = Analyzer::for_field(&field, &schema_with(vec![]));
        assert_eq!(analyzer.tokens("1.0"), vec!["1"]);
    }

    #[test]
    fn test_date_tokens() {
        assert_eq!(date_token("1970-01-02"), Some("86400".to_string()));
        assert_eq!(date_token("12345"), Some("12345".to_string()));
    }

    #[test]
    fn test_alphanum_filter() {
        let mut field = FieldDefinition::text("body", "/Body");
        field.filter = Some("alphanum".to_string());
        let analyzer = Analyzer::for_field(&field, &schema_with(vec![]));
        assert_eq!(analyzer.tokens("a-b c_d"), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_summary_value() {
        assert_eq!(summary_value("  Open "), "open");
    }
}
