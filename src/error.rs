//! Error types for indexing and search.
//!
//! Validation errors are reported per document and never abort a batch;
//! query errors reject the whole request. Internal invariant violations
//! (malformed facet rows, leaves without postings) are bugs and assert.

/// Errors raised while validating or indexing a single document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// A non-optional schema field is absent from the document
    #[error("Field `{0}` has been declared in the schema, but is not found in the document.")]
    MissingRequiredField(String),

    /// The document value does not match the schema type
    #[error("Field `{field}` must be {expected}.")]
    TypeMismatch { field: String, expected: &'static str },

    /// An integer value does not fit the declared width
    #[error("Field `{0}` exceeds maximum value of int32.")]
    NumericOutOfRange(String),

    /// A float value exceeds the representable range
    #[error("Field `{0}` exceeds maximum value of a float.")]
    ValueTooLarge(String),

    /// The default sorting field is missing from the document
    #[error("Field `{0}` has been declared as a default sorting field, but is not found in the document.")]
    MissingDefaultSortField(String),

    /// The default sorting field is not a single-valued numeric
    #[error("Default sorting field `{0}` must be a single valued numerical field.")]
    BadDefaultSortField(String),
}

/// Errors that reject a search request outright.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// A query, facet, or group-by field is not in the schema
    #[error("Could not find a field named `{0}` in the schema.")]
    UnknownField(String),

    /// A filter references a field not in the schema
    #[error("Could not find a filter field named `{0}` in the schema.")]
    UnknownFilterField(String),

    /// Query fields must be string typed
    #[error("Field `{0}` should be a string or a string array.")]
    NotAStringField(String),

    /// A sort-by entry names a field outside the sort schema
    #[error("Could not find a field named `{0}` in the sort schema.")]
    UnknownSortField(String),

    /// Optional fields cannot be sort keys
    #[error("Cannot sort by optional field `{0}`.")]
    OptionalSortField(String),

    /// A facet is requested on a field not declared as faceted
    #[error("Field `{0}` is not a facet field.")]
    NotAFacetField(String),

    /// A filter value failed to parse against the field type
    #[error("Value of filter field `{field}`: unable to parse `{value}`.")]
    BadFilterValue { field: String, value: String },

    /// Page numbers are 1-based
    #[error("Page must be an integer of value greater than 0.")]
    PageOutOfRange,

    /// Results-per-page is capped
    #[error("Only upto {max} hits can be fetched per page.")]
    PerPageOutOfRange { max: usize },
}
