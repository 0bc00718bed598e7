//! Index schema: field and sorter definitions plus shape validation.
//!
//! A schema describes how records in one index project into the inverted
//! index (fields) and into sort keys (sorters). Schemas persist as JSON in
//! the `<base>/indexes` hash; `base_path` is recomputed from the store
//! configuration on load and never trusted from the caller.

use crate::models::ids::IndexName;
use crate::validation::{self, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One configured projection of record data into the inverted index.
///
/// `source` is a JSON-pointer-like path into the record (`/Status`,
/// `/Comments/Comment/length`). `field_type` and `filter` must name
/// capabilities advertised by the index engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: String,
    pub source: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_word_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_word_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_remove_words: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_stemmer: Option<bool>,

    /// Maintain a value histogram for this field, enabling `#summary` queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_list: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    /// Transient: set only for the duration of a reindex pass that scrubs
    /// this field from the physical index. Never persisted.
    #[serde(skip)]
    pub delete: bool,
}

impl FieldDefinition {
    /// Minimal text field over the given source path.
    pub fn text(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            field_type: None,
            filter: None,
            min_word_length: None,
            max_word_length: None,
            use_remove_words: None,
            use_stemmer: None,
            master_list: None,
            default_value: None,
            delete: false,
        }
    }

    /// Number field over the given source path.
    pub fn number(id: impl Into<String>, source: impl Into<String>) -> Self {
        let mut field = Self::text(id, source);
        field.field_type = Some("number".to_string());
        field
    }

    pub fn with_master_list(mut self, master_list: bool) -> Self {
        self.master_list = Some(master_list);
        self
    }

    pub fn is_master_list(&self) -> bool {
        self.master_list.unwrap_or(false) && !self.delete
    }
}

/// One configured projection of record data into a sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SorterDefinition {
    pub id: String,
    pub source: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub sorter_type: Option<String>,

    /// Transient, as for [`FieldDefinition::delete`].
    #[serde(skip)]
    pub delete: bool,
}

impl SorterDefinition {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        sorter_type: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            sorter_type: sorter_type.map(|s| s.to_string()),
            delete: false,
        }
    }

    pub fn is_number(&self) -> bool {
        self.sorter_type.as_deref() == Some("number")
    }
}

/// Persistent schema of one named index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub id: IndexName,

    /// Storage-key prefix, `<config.base_path>/index/<id>`. Recomputed on
    /// load; excluded from persisted JSON.
    #[serde(skip)]
    pub base_path: String,

    pub fields: Vec<FieldDefinition>,

    #[serde(default)]
    pub sorters: Vec<SorterDefinition>,

    #[serde(default)]
    pub remove_words: Vec<String>,
}

impl IndexSchema {
    pub fn new(id: impl Into<IndexName>, fields: Vec<FieldDefinition>) -> Self {
        Self {
            id: id.into(),
            base_path: String::new(),
            fields,
            sorters: Vec::new(),
            remove_words: Vec::new(),
        }
    }

    pub fn with_sorters(mut self, sorters: Vec<SorterDefinition>) -> Self {
        self.sorters = sorters;
        self
    }

    pub fn with_remove_words(mut self, words: Vec<String>) -> Self {
        self.remove_words = words;
        self
    }

    pub fn field(&self, id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_mut(&mut self, id: &str) -> Option<&mut FieldDefinition> {
        self.fields.iter_mut().find(|f| f.id == id)
    }

    pub fn sorter(&self, id: &str) -> Option<&SorterDefinition> {
        self.sorters.iter().find(|s| s.id == id)
    }

    pub fn sorter_mut(&mut self, id: &str) -> Option<&mut SorterDefinition> {
        self.sorters.iter_mut().find(|s| s.id == id)
    }

    /// Validate the schema shape against the engine's advertised
    /// capabilities. `types` and `filters` come from the index engine.
    ///
    /// Checks: index name and field/sorter id character rules, reserved
    /// ids, duplicate ids, non-empty field list, known types and filters.
    pub fn validate(&self, types: &[&str], filters: &[&str]) -> Result<(), ValidationError> {
        validation::validate_index_name(self.id.as_str())?;

        if self.fields.is_empty() {
            return Err(ValidationError::Empty);
        }

        for field in &self.fields {
            validation::validate_field_id(&field.id)?;
            if self.fields.iter().filter(|f| f.id == field.id).count() > 1 {
                return Err(ValidationError::Duplicate(field.id.clone()));
            }
            if let Some(t) = &field.field_type {
                if !types.contains(&t.as_str()) {
                    return Err(ValidationError::UnknownCapability(t.clone()));
                }
            }
            if let Some(flt) = &field.filter {
                if !filters.contains(&flt.as_str()) {
                    return Err(ValidationError::UnknownCapability(flt.clone()));
                }
            }
        }

        for sorter in &self.sorters {
            validation::validate_sorter_id(&sorter.id)?;
            if self.sorters.iter().filter(|s| s.id == sorter.id).count() > 1 {
                return Err(ValidationError::Duplicate(sorter.id.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPES: &[&str] = &["text", "number", "date"];
    const FILTERS: &[&str] = &["alphanum", "markdown"];

    fn ticket_schema() -> IndexSchema {
        IndexSchema::new(
            "myapp",
            vec![
                FieldDefinition::text("status", "/Status"),
                FieldDefinition::text("title", "/Summary"),
                FieldDefinition::text("modified", "/Modifydate"),
            ],
        )
    }

    #[test]
    fn test_valid_schema() {
        assert!(ticket_schema().validate(TYPES, FILTERS).is_ok());
    }

    #[test]
    fn test_empty_fields_rejected() {
        let schema = IndexSchema::new("myapp", vec![]);
        assert!(schema.validate(TYPES, FILTERS).is_err());
    }

    #[test]
    fn test_reserved_field_id_rejected() {
        let mut schema = ticket_schema();
        schema.fields.push(FieldDefinition::text("_sorters", "/x"));
        assert!(schema.validate(TYPES, FILTERS).is_err());
    }

    #[test]
    fn test_duplicate_field_id_rejected() {
        let mut schema = ticket_schema();
        schema.fields.push(FieldDefinition::text("status", "/Other"));
        assert!(schema.validate(TYPES, FILTERS).is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut schema = ticket_schema();
        schema.fields[0].field_type = Some("geo".to_string());
        assert!(schema.validate(TYPES, FILTERS).is_err());
    }

    #[test]
    fn test_base_path_not_persisted() {
        let mut schema = ticket_schema();
        schema.base_path = "scribedb/index/myapp".to_string();
        let json = serde_json::to_value(&schema).unwrap();
        assert!(json.get("base_path").is_none());

        let back: IndexSchema = serde_json::from_value(json).unwrap();
        assert_eq!(back.base_path, "");
        assert_eq!(back.fields.len(), 3);
    }

    #[test]
    fn test_delete_flag_is_transient() {
        let mut schema = ticket_schema();
        schema.fields[0].delete = true;
        let json = serde_json::to_string(&schema).unwrap();
        let back: IndexSchema = serde_json::from_str(&json).unwrap();
        assert!(!back.fields[0].delete);
    }

    #[test]
    fn test_field_type_serializes_as_type() {
        let field = FieldDefinition::number("num_comments", "/Comments/Comment/length");
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "number");
    }
}
