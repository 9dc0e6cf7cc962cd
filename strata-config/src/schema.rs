//! Schema validation for configuration documents.
//!
//! Schemas are JSON Schema documents compiled once by the `jsonschema`
//! crate. The draft is taken from `$schema` when present. `format` is
//! enforced as well as the structural keywords.
//!
//! Error paths are `/`-joined from the document root, e.g. `display/width`.

use crate::error::{ConfigError, ConfigResult};
use crate::tree::Document;
use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Result of validating a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the document is valid
    pub valid: bool,
    /// List of validation errors
    pub errors: Vec<ValidationError>,
    /// List of validation warnings (non-fatal)
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn failure(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: false,
            errors,
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Merge another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        if !other.valid {
            self.valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts the first error into a [`ConfigError::Validation`].
    pub fn into_result(self) -> ConfigResult<()> {
        match self.errors.into_iter().next() {
            Some(first) => Err(first.into()),
            None => Ok(()),
        }
    }
}

/// A validation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// `/`-joined path of the offending value
    pub path: String,
    pub message: String,
    /// Error code for programmatic handling
    pub code: ValidationErrorCode,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>, code: ValidationErrorCode) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code,
        }
    }
}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::validation(err.message, err.path)
    }
}

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorCode {
    /// Property is required but missing
    Required,
    /// Value has the wrong JSON type
    InvalidType,
    /// Value is out of the allowed numeric range
    OutOfRange,
    /// String or array is too short
    TooShort,
    /// String or array is too long
    TooLong,
    /// Value is not one of the allowed values
    NotAllowed,
    /// Property not declared by a closed object schema
    UnexpectedProperty,
    /// A combinator (`anyOf`, `oneOf`, `not`) rejected the value
    Composition,
    /// A custom validator, or any other schema keyword, rejected the value
    Custom,
}

/// A validation warning (non-fatal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Validates documents against a JSON Schema.
#[derive(Clone)]
pub struct SchemaValidator {
    schema: Value,
    compiled: Arc<Validator>,
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator").field("schema", &self.schema).finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Compiles `schema`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidSchema`] when `schema` is not a valid JSON Schema,
    /// e.g. `{"minimum": "ten"}` or an unresolvable `$ref`.
    pub fn new(schema: Value) -> ConfigResult<Self> {
        let compiled = jsonschema::options()
            .should_validate_formats(true)
            .build(&schema)
            .map_err(|e| ConfigError::InvalidSchema(e.to_string()))?;
        Ok(Self {
            schema,
            compiled: Arc::new(compiled),
        })
    }

    /// Loads and compiles a schema document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::storage(path, e))?;
        let schema = serde_json::from_str(&text).map_err(|e| ConfigError::parse(path, &e))?;
        Self::new(schema)
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Collects every error for `doc`.
    pub fn validate(&self, doc: &Document) -> ValidationResult {
        let mut result = ValidationResult::success();
        for err in self.compiled.iter_errors(doc) {
            let path = err.instance_path.to_string();
            result.add_error(ValidationError::new(
                path.trim_start_matches('/'),
                err.to_string(),
                error_code(&err.kind),
            ));
        }
        result
    }

    /// Fails with the first error, if any.
    pub fn check(&self, doc: &Document) -> ConfigResult<()> {
        self.validate(doc).into_result()
    }
}

fn error_code(kind: &ValidationErrorKind) -> ValidationErrorCode {
    use ValidationErrorKind as K;
    match kind {
        K::Required { .. } => ValidationErrorCode::Required,
        K::Type { .. } => ValidationErrorCode::InvalidType,
        K::Minimum { .. }
        | K::Maximum { .. }
        | K::ExclusiveMinimum { .. }
        | K::ExclusiveMaximum { .. }
        | K::MultipleOf { .. } => ValidationErrorCode::OutOfRange,
        K::MinLength { .. } | K::MinItems { .. } | K::MinProperties { .. } => ValidationErrorCode::TooShort,
        K::MaxLength { .. } | K::MaxItems { .. } | K::MaxProperties { .. } => ValidationErrorCode::TooLong,
        K::Enum { .. }
        | K::Constant { .. }
        | K::Pattern { .. }
        | K::Format { .. }
        | K::UniqueItems { .. }
        | K::Contains { .. }
        | K::FalseSchema { .. } => ValidationErrorCode::NotAllowed,
        K::AdditionalProperties { .. } | K::UnevaluatedProperties { .. } => {
            ValidationErrorCode::UnexpectedProperty
        }
        K::AnyOf { .. } | K::OneOfMultipleValid { .. } | K::OneOfNotValid { .. } | K::Not { .. } => {
            ValidationErrorCode::Composition
        }
        _ => ValidationErrorCode::Custom,
    }
}

/// Validates `doc` against `schema`, failing on the first error.
pub fn validate(doc: &Document, schema: &Value) -> ConfigResult<()> {
    SchemaValidator::new(schema.clone())?.check(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn display_schema() -> Value {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "required": ["version"],
            "properties": {
                "version": {"type": "string"},
                "display": {
                    "type": "object",
                    "properties": {
                        "width": {"type": "integer", "minimum": 320},
                        "mode": {"enum": ["windowed", "fullscreen"]}
                    }
                }
            }
        })
    }

    fn compile(schema: Value) -> SchemaValidator {
        SchemaValidator::new(schema).unwrap()
    }

    #[test]
    fn test_valid_document() {
        let result = compile(display_schema()).validate(&json!({"version": "1.0", "display": {"width": 1024}}));
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_minimum_reports_slash_path() {
        let err = compile(display_schema())
            .check(&json!({"version": "1.0", "display": {"width": 100}}))
            .unwrap_err();
        match err {
            ConfigError::Validation { message, path } => {
                assert_eq!(path, "display/width");
                assert!(message.contains("minimum of 320"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_required_and_type() {
        let result = compile(display_schema()).validate(&json!({"display": {"width": "wide"}}));
        assert!(!result.valid);
        let codes: Vec<_> = result.errors.iter().map(|e| e.code).collect();
        assert!(codes.contains(&ValidationErrorCode::Required));
        assert!(codes.contains(&ValidationErrorCode::InvalidType));
    }

    #[test]
    fn test_enum_and_additional_properties() {
        let schema = json!({
            "type": "object",
            "properties": {"mode": {"enum": ["a", "b"]}},
            "additionalProperties": false
        });
        let result = compile(schema).validate(&json!({"mode": "c", "extra": 1}));
        assert_eq!(result.errors.len(), 2);

        let not_allowed = result
            .errors
            .iter()
            .find(|e| e.code == ValidationErrorCode::NotAllowed)
            .unwrap();
        assert_eq!(not_allowed.path, "mode");
        let unexpected = result
            .errors
            .iter()
            .find(|e| e.code == ValidationErrorCode::UnexpectedProperty)
            .unwrap();
        assert_eq!(unexpected.path, "");
    }

    #[test]
    fn test_items_and_lengths() {
        let validator = compile(json!({
            "type": "array",
            "minItems": 1,
            "items": {"type": "string", "minLength": 2}
        }));
        assert!(!validator.validate(&json!([])).valid);
        let result = validator.validate(&json!(["ok", "x"]));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "1");
        assert_eq!(result.errors[0].code, ValidationErrorCode::TooShort);
    }

    #[test]
    fn test_combinators() {
        // 3 is both an integer and a number
        let schema = json!({"oneOf": [{"type": "integer"}, {"type": "number"}]});
        assert!(!compile(schema).validate(&json!(3)).valid);

        let validator = compile(json!({"anyOf": [{"type": "string"}, {"type": "null"}]}));
        assert!(validator.validate(&json!(null)).valid);
        assert!(!validator.validate(&json!(1)).valid);

        let result = compile(json!({"not": {"const": 0}})).validate(&json!(0));
        assert_eq!(result.errors[0].code, ValidationErrorCode::Composition);
    }

    #[test]
    fn test_pattern_multiple_of_and_unique_items() {
        let validator = compile(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "pattern": "^[a-z]+$"},
                "step": {"type": "integer", "multipleOf": 10},
                "tags": {"type": "array", "uniqueItems": true}
            }
        }));

        assert!(validator
            .validate(&json!({"name": "abc", "step": 20, "tags": ["x", "y"]}))
            .valid);

        let result = validator.validate(&json!({"name": "ABC", "step": 15, "tags": ["x", "x"]}));
        assert_eq!(result.errors.len(), 3);
        let mut paths: Vec<_> = result.errors.iter().map(|e| e.path.as_str()).collect();
        paths.sort_unstable();
        assert_eq!(paths, ["name", "step", "tags"]);

        let step = result.errors.iter().find(|e| e.path == "step").unwrap();
        assert_eq!(step.code, ValidationErrorCode::OutOfRange);
    }

    #[test]
    fn test_refs_to_definitions() {
        let validator = compile(json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "definitions": {
                "port": {"type": "integer", "minimum": 1, "maximum": 65535}
            },
            "type": "object",
            "properties": {
                "http": {"$ref": "#/definitions/port"},
                "admin": {"$ref": "#/definitions/port"}
            }
        }));

        assert!(validator.validate(&json!({"http": 8080, "admin": 9090})).valid);
        let result = validator.validate(&json!({"http": 8080, "admin": 70000}));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "admin");
    }

    #[test]
    fn test_object_keywords() {
        let validator = compile(json!({
            "type": "object",
            "maxProperties": 2,
            "patternProperties": {"^x_": {"type": "boolean"}},
            "propertyNames": {"maxLength": 8}
        }));

        assert!(validator.validate(&json!({"x_debug": true})).valid);
        assert!(!validator.validate(&json!({"x_debug": "yes"})).valid);
        assert!(!validator.validate(&json!({"a": 1, "b": 2, "c": 3})).valid);
        assert!(!validator.validate(&json!({"much_too_long": 1})).valid);
    }

    #[test]
    fn test_format_is_enforced() {
        let validator = compile(json!({
            "type": "object",
            "properties": {"contact": {"type": "string", "format": "email"}}
        }));
        assert!(validator.validate(&json!({"contact": "ops@example.com"})).valid);
        assert!(!validator.validate(&json!({"contact": "not an address"})).valid);
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        let err = SchemaValidator::new(json!({"type": "object", "minimum": "ten"})).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSchema(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(&path, display_schema().to_string()).unwrap();
        let validator = SchemaValidator::from_file(&path).unwrap();
        assert_eq!(validator.schema(), &display_schema());

        std::fs::write(&path, r#"{"type": 12}"#).unwrap();
        assert!(matches!(
            SchemaValidator::from_file(&path),
            Err(ConfigError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_free_function() {
        assert!(validate(&json!({"version": "1"}), &display_schema()).is_ok());
        assert!(validate(&json!({}), &display_schema()).is_err());
    }
}
