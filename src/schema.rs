//! Field definitions and schema views.
//!
//! A schema is declared once per index and projected into three views:
//! the search schema (every indexed field), the facet schema (facet
//! fields, name-ordered so facet positions stay stable across restarts),
//! and the sort schema (single-valued numeric fields usable as sort keys).

use crate::error::IndexError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Data type of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Str,
    Int32,
    Int64,
    Float,
    Bool,
    StrArray,
    Int32Array,
    Int64Array,
    FloatArray,
    BoolArray,
}

impl FieldType {
    pub fn is_string(&self) -> bool {
        matches!(self, FieldType::Str | FieldType::StrArray)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::Int32 | FieldType::Int64 | FieldType::Int32Array | FieldType::Int64Array
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, FieldType::Float | FieldType::FloatArray)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, FieldType::Bool | FieldType::BoolArray)
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            FieldType::StrArray
                | FieldType::Int32Array
                | FieldType::Int64Array
                | FieldType::FloatArray
                | FieldType::BoolArray
        )
    }

    /// Single-valued numerics are eligible sort keys
    pub fn is_sortable(&self) -> bool {
        matches!(
            self,
            FieldType::Int32 | FieldType::Int64 | FieldType::Float | FieldType::Bool
        )
    }

    fn expected_label(&self) -> &'static str {
        match self {
            FieldType::Str => "a string",
            FieldType::Int32 => "an int32",
            FieldType::Int64 => "an int64",
            FieldType::Float => "a float",
            FieldType::Bool => "a bool",
            FieldType::StrArray => "a string array",
            FieldType::Int32Array => "an int32 array",
            FieldType::Int64Array => "an int64 array",
            FieldType::FloatArray => "a float array",
            FieldType::BoolArray => "a bool array",
        }
    }
}

/// A single field definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ftype: FieldType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub facet: bool,
}

impl Field {
    pub fn new(name: &str, ftype: FieldType) -> Self {
        Self {
            name: name.to_string(),
            ftype,
            optional: false,
            facet: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn faceted(mut self) -> Self {
        self.facet = true;
        self
    }

    /// Name of the aliased string tree a non-string facet field is also
    /// indexed into, so facet queries can fuzzy-match stringified values.
    pub fn faceted_name(&self) -> String {
        format!("${}", self.name)
    }
}

/// Schema of an index: field definitions plus the default sorting field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
    pub default_sorting_field: String,
}

impl Schema {
    pub fn new(fields: Vec<Field>, default_sorting_field: &str) -> Self {
        Self {
            fields,
            default_sorting_field: default_sorting_field.to_string(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Facet fields keyed by name. BTreeMap ordering fixes each field's
    /// facet position: the ordinal rank of its name.
    pub fn facet_schema(&self) -> BTreeMap<String, Field> {
        self.fields
            .iter()
            .filter(|f| f.facet)
            .map(|f| (f.name.clone(), f.clone()))
            .collect()
    }

    /// Facet field name -> facet position.
    pub fn facet_positions(&self) -> BTreeMap<String, usize> {
        self.facet_schema()
            .keys()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect()
    }

    /// Fields eligible as sort keys.
    pub fn sort_fields(&self) -> Vec<&Field> {
        self.fields.iter().filter(|f| f.ftype.is_sortable()).collect()
    }
}

/// Validate a document against the schema.
///
/// Runs before any index mutation; a document that fails validation never
/// touches the index. On update, absent fields are allowed (only supplied
/// fields are re-validated).
pub fn validate_document(
    document: &Value,
    schema: &Schema,
    is_update: bool,
) -> Result<(), IndexError> {
    let default_sort = &schema.default_sorting_field;

    if !default_sort.is_empty() {
        match document.get(default_sort) {
            None if !is_update => {
                return Err(IndexError::MissingDefaultSortField(default_sort.clone()));
            }
            Some(v) if !v.is_number() => {
                return Err(IndexError::BadDefaultSortField(default_sort.clone()));
            }
            Some(v) => {
                if let Some(field) = schema.field(default_sort) {
                    if field.ftype == FieldType::Float {
                        let f = v.as_f64().unwrap_or(0.0);
                        if f.abs() > f32::MAX as f64 {
                            return Err(IndexError::ValueTooLarge(default_sort.clone()));
                        }
                    }
                }
            }
            None => {}
        }
    }

    for field in &schema.fields {
        let value = match document.get(&field.name) {
            Some(v) => v,
            None => {
                if field.optional || is_update {
                    continue;
                }
                return Err(IndexError::MissingRequiredField(field.name.clone()));
            }
        };

        validate_value(value, field)?;
    }

    Ok(())
}

fn type_mismatch(field: &Field) -> IndexError {
    IndexError::TypeMismatch {
        field: field.name.clone(),
        expected: field.ftype.expected_label(),
    }
}

fn validate_value(value: &Value, field: &Field) -> Result<(), IndexError> {
    match field.ftype {
        FieldType::Str => {
            if !value.is_string() {
                return Err(type_mismatch(field));
            }
        }
        FieldType::Int32 => {
            let n = value.as_i64().ok_or_else(|| type_mismatch(field))?;
            if n > i32::MAX as i64 || n < i32::MIN as i64 {
                return Err(IndexError::NumericOutOfRange(field.name.clone()));
            }
        }
        FieldType::Int64 => {
            if value.as_i64().is_none() {
                return Err(type_mismatch(field));
            }
        }
        FieldType::Float => {
            // integers may be passed to a float field
            if !value.is_number() {
                return Err(type_mismatch(field));
            }
        }
        FieldType::Bool => {
            if !value.is_boolean() {
                return Err(type_mismatch(field));
            }
        }
        FieldType::StrArray
        | FieldType::Int32Array
        | FieldType::Int64Array
        | FieldType::FloatArray
        | FieldType::BoolArray => {
            let arr = value.as_array().ok_or_else(|| type_mismatch(field))?;
            for elem in arr {
                let ok = match field.ftype {
                    FieldType::StrArray => elem.is_string(),
                    FieldType::Int32Array => {
                        let n = elem.as_i64().ok_or_else(|| type_mismatch(field))?;
                        if n > i32::MAX as i64 || n < i32::MIN as i64 {
                            return Err(IndexError::NumericOutOfRange(field.name.clone()));
                        }
                        true
                    }
                    FieldType::Int64Array => elem.as_i64().is_some(),
                    FieldType::FloatArray => elem.is_number(),
                    FieldType::BoolArray => elem.is_boolean(),
                    _ => unreachable!(),
                };
                if !ok {
                    return Err(type_mismatch(field));
                }
            }
        }
    }
    Ok(())
}
