//! Declarative argument and result schemas
//!
//! A [`SchemaMap`] describes the named fields of a JSON object as tagged
//! [`FieldKind`] descriptors. The [`Validator`] walks a value against it
//! recursively and never coerces between kinds.

use serde_json::{json, Map, Value};
use thiserror::Error;

/// Policy for object members that the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFields {
    #[default]
    Reject,
    Ignore,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Enum(Vec<String>),
    Object(SchemaMap),
    Array(Box<FieldKind>),
    Optional(Box<FieldKind>),
}

impl FieldKind {
    fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }

    fn expected(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Number => "number".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Enum(values) => format!("one of: {}", values.join(", ")),
            Self::Object(_) => "object".to_string(),
            Self::Array(_) => "array".to_string(),
            Self::Optional(inner) => inner.expected(),
        }
    }

    fn json_schema(&self, unknown_fields: UnknownFields) -> Value {
        match self {
            Self::String => json!({ "type": "string" }),
            Self::Number => json!({ "type": "number" }),
            Self::Integer => json!({ "type": "integer" }),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Enum(values) => json!({ "type": "string", "enum": values }),
            Self::Object(schema) => schema.to_json_schema(unknown_fields),
            Self::Array(item) => json!({
                "type": "array",
                "items": item.json_schema(unknown_fields),
            }),
            Self::Optional(inner) => inner.json_schema(unknown_fields),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub kind: FieldKind,
    pub description: Option<String>,
}

impl Field {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldKind::String)
    }

    pub fn number() -> Self {
        Self::of(FieldKind::Number)
    }

    pub fn integer() -> Self {
        Self::of(FieldKind::Integer)
    }

    pub fn boolean() -> Self {
        Self::of(FieldKind::Boolean)
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::of(FieldKind::Enum(values.into_iter().map(Into::into).collect()))
    }

    pub fn object(schema: SchemaMap) -> Self {
        Self::of(FieldKind::Object(schema))
    }

    pub fn array(item: Field) -> Self {
        Self::of(FieldKind::Array(Box::new(item.kind)))
    }

    pub fn optional(self) -> Self {
        if self.kind.is_optional() {
            return self;
        }

        Self {
            kind: FieldKind::Optional(Box::new(self.kind)),
            description: self.description,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Ordered mapping of field name to descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaMap {
    fields: Vec<(String, Field)>,
}

impl SchemaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, replacing any earlier field with the same name.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((name, field)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, field)| field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Renders the schema as a JSON Schema object for `tools/list`.
    pub fn to_json_schema(&self, unknown_fields: UnknownFields) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, field) in self.iter() {
            let mut property = field.kind.json_schema(unknown_fields);
            if let (Some(description), Some(object)) =
                (field.description.as_ref(), property.as_object_mut())
            {
                object.insert("description".to_string(), json!(description));
            }
            properties.insert(name.to_string(), property);

            if !field.kind.is_optional() {
                required.push(Value::String(name.to_string()));
            }
        }

        let mut schema = Map::from_iter([
            ("type".to_string(), json!("object")),
            ("properties".to_string(), Value::Object(properties)),
            ("required".to_string(), Value::Array(required)),
        ]);
        if unknown_fields == UnknownFields::Reject {
            schema.insert("additionalProperties".to_string(), json!(false));
        }

        Value::Object(schema)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{path}: {reason}")]
pub struct ValidationError {
    pub path: String,
    pub reason: String,
}

impl ValidationError {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

fn member_path(parent: &str, name: &str) -> String {
    format!("{parent}.{name}")
}

fn index_path(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

const ROOT: &str = "$";

pub type ValidatedArgs = Map<String, Value>;
pub type ValidatedResult = Map<String, Value>;

#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    unknown_fields: UnknownFields,
}

impl Validator {
    pub fn new(unknown_fields: UnknownFields) -> Self {
        Self { unknown_fields }
    }

    pub fn unknown_fields(&self) -> UnknownFields {
        self.unknown_fields
    }

    pub fn validate_input(
        &self,
        schema: &SchemaMap,
        args: &Map<String, Value>,
    ) -> Result<ValidatedArgs, ValidationError> {
        self.check_object(schema, args, ROOT)
    }

    pub fn validate_output(
        &self,
        schema: &SchemaMap,
        result: &Map<String, Value>,
    ) -> Result<ValidatedResult, ValidationError> {
        self.check_object(schema, result, ROOT)
    }

    fn check_object(
        &self,
        schema: &SchemaMap,
        object: &Map<String, Value>,
        path: &str,
    ) -> Result<Map<String, Value>, ValidationError> {
        if self.unknown_fields == UnknownFields::Reject {
            if let Some(unknown) = object.keys().find(|key| schema.get(key).is_none()) {
                return Err(ValidationError::new(
                    &member_path(path, unknown),
                    "unknown field",
                ));
            }
        }

        let mut validated = Map::new();
        for (name, field) in schema.iter() {
            let field_path = member_path(path, name);
            match object.get(name) {
                Some(value) => {
                    let checked = self.check_kind(&field.kind, value, &field_path)?;
                    validated.insert(name.to_string(), checked);
                }
                None if field.kind.is_optional() => {}
                None => {
                    return Err(ValidationError::new(
                        &field_path,
                        "required field is missing",
                    ))
                }
            }
        }

        Ok(validated)
    }

    fn check_kind(
        &self,
        kind: &FieldKind,
        value: &Value,
        path: &str,
    ) -> Result<Value, ValidationError> {
        let mismatch = || {
            ValidationError::new(
                path,
                format!("expected {}, got {}", kind.expected(), type_name(value)),
            )
        };

        match kind {
            FieldKind::String if value.is_string() => Ok(value.clone()),
            FieldKind::Number if value.is_number() => Ok(value.clone()),
            FieldKind::Integer if value.is_i64() || value.is_u64() => Ok(value.clone()),
            FieldKind::Boolean if value.is_boolean() => Ok(value.clone()),
            FieldKind::Enum(values) => match value.as_str() {
                Some(text) if values.iter().any(|allowed| allowed == text) => Ok(value.clone()),
                _ => Err(mismatch()),
            },
            FieldKind::Object(schema) => match value.as_object() {
                Some(object) => self.check_object(schema, object, path).map(Value::Object),
                None => Err(mismatch()),
            },
            FieldKind::Array(item) => match value.as_array() {
                Some(items) => items
                    .iter()
                    .enumerate()
                    .map(|(index, element)| self.check_kind(item, element, &index_path(path, index)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                None => Err(mismatch()),
            },
            FieldKind::Optional(inner) => self.check_kind(inner, value, path),
            _ => Err(mismatch()),
        }
    }
}
