//! Translation from file column types to JSON record schemas.
//!
//! Each data file describes its columns with a set of declared types. The
//! translator maps that set onto JSON Schema primitive types; a null marker
//! in the set makes the property nullable. Types outside the mapping table
//! are rejected rather than coerced.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{SchemaError, UnsupportedTypeSnafu};

/// A type a column can declare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclaredType {
    Null,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Bytes,
    String,
    Enum,
    Fixed,
    /// Anything the decoder could not place in the list above.
    Other(String),
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeclaredType::Null => "null",
            DeclaredType::Int => "int",
            DeclaredType::Long => "long",
            DeclaredType::Float => "float",
            DeclaredType::Double => "double",
            DeclaredType::Boolean => "boolean",
            DeclaredType::Bytes => "bytes",
            DeclaredType::String => "string",
            DeclaredType::Enum => "enum",
            DeclaredType::Fixed => "fixed",
            DeclaredType::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// A column name with its declared type set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub types: Vec<DeclaredType>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, types: impl IntoIterator<Item = DeclaredType>) -> Self {
        Self {
            name: name.into(),
            types: types.into_iter().collect(),
        }
    }
}

/// JSON Schema primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Null,
    Integer,
    Number,
    Boolean,
    String,
}

impl JsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::Boolean => "boolean",
            JsonType::String => "string",
        }
    }

    fn from_declared(column: &str, declared: &DeclaredType) -> Result<Self, SchemaError> {
        Ok(match declared {
            DeclaredType::Null => JsonType::Null,
            DeclaredType::Int | DeclaredType::Long => JsonType::Integer,
            DeclaredType::Float | DeclaredType::Double => JsonType::Number,
            DeclaredType::Boolean => JsonType::Boolean,
            DeclaredType::Bytes
            | DeclaredType::String
            | DeclaredType::Enum
            | DeclaredType::Fixed => JsonType::String,
            DeclaredType::Other(type_name) => {
                return UnsupportedTypeSnafu { column, type_name }.fail();
            }
        })
    }
}

/// Schema of one property: a non-empty set of JSON types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySchema {
    types: BTreeSet<JsonType>,
}

impl PropertySchema {
    pub fn of(types: impl IntoIterator<Item = JsonType>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.types.contains(&JsonType::Null)
    }

    pub fn types(&self) -> impl Iterator<Item = JsonType> + '_ {
        self.types.iter().copied()
    }
}

impl PropertySchema {
    /// `{"type": t}` for a single type, `{"type": [t, ...]}` otherwise.
    pub fn to_value(&self) -> Value {
        let mut names = self.types.iter().map(|ty| Value::from(ty.as_str()));
        let ty = match (names.next(), self.types.len()) {
            (Some(only), 1) => only,
            (first, _) => Value::Array(first.into_iter().chain(names).collect()),
        };
        let mut schema = Map::with_capacity(1);
        schema.insert("type".to_string(), ty);
        Value::Object(schema)
    }
}

impl Serialize for PropertySchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Object schema for one record, properties in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSchema {
    properties: Vec<(String, PropertySchema)>,
}

impl RecordSchema {
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties
            .iter()
            .find(|(property, _)| property == name)
            .map(|(_, schema)| schema)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// `{"type": "object", "properties": {...}}`, properties in column order.
    pub fn to_value(&self) -> Value {
        let properties = self
            .properties
            .iter()
            .map(|(name, schema)| (name.clone(), schema.to_value()))
            .collect::<Map<String, Value>>();
        let mut schema = Map::with_capacity(2);
        schema.insert("type".to_string(), Value::from("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        Value::Object(schema)
    }
}

impl Serialize for RecordSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Translate column descriptors into a record schema.
pub fn translate(columns: &[ColumnDescriptor]) -> Result<RecordSchema, SchemaError> {
    let properties = columns
        .iter()
        .map(|column| {
            let types = column
                .types
                .iter()
                .map(|declared| JsonType::from_declared(&column.name, declared))
                .collect::<Result<BTreeSet<_>, _>>()?;
            Ok((column.name.clone(), PropertySchema { types }))
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;

    Ok(RecordSchema { properties })
}

/// Schema used during discovery, before any data file has been opened:
/// every known column typed as a string.
pub fn discovery_schema<'a>(columns: impl IntoIterator<Item = &'a str>) -> RecordSchema {
    RecordSchema {
        properties: columns
            .into_iter()
            .map(|name| (name.to_string(), PropertySchema::of([JsonType::String])))
            .collect(),
    }
}
