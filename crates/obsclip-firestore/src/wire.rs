//! JSON shapes of the Firestore v1 REST API.
//!
//! Only the parts the video repository touches are modelled: documents and
//! their typed values, `batchWrite`, and single-collection `runQuery`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FirestoreError, FirestoreResult};

pub type Fields = HashMap<String, Value>;

// ============================================================================
// Values
// ============================================================================

/// A typed Firestore value. Integers travel as decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: Fields,
}

impl Value {
    pub fn array(values: impl IntoIterator<Item = Value>) -> Self {
        Value::ArrayValue(ArrayValue {
            values: values.into_iter().collect(),
        })
    }

    pub fn map(fields: Fields) -> Self {
        Value::MapValue(MapValue { fields })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::StringValue(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::BooleanValue(b) => Some(*b),
            _ => None,
        }
    }

    /// Doubles, or integers widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::DoubleValue(d) => Some(*d),
            Value::IntegerValue(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Non-negative integers. Whole doubles are accepted too.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::IntegerValue(s) => s.parse().ok(),
            Value::DoubleValue(d) if *d >= 0.0 && d.fract() == 0.0 => Some(*d as u64),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::TimestampValue(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Array elements; an array without `values` is empty.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::ArrayValue(array) => Some(&array.values),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Value::MapValue(map) => Some(&map.fields),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::BooleanValue(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::DoubleValue(d)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::IntegerValue(n.to_string())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::IntegerValue(n.to_string())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::StringValue(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::StringValue(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::TimestampValue(t.to_rfc3339())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::NullValue(()), Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::array(items.into_iter().map(Into::into))
    }
}

// ============================================================================
// Documents
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// `projects/{p}/databases/{d}/documents/{collection}/{id}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Fields,
    #[serde(default, skip_serializing)]
    pub create_time: Option<String>,
    /// Version stamp used for conditional writes.
    #[serde(default, skip_serializing)]
    pub update_time: Option<String>,
}

impl Document {
    pub fn named(name: impl Into<String>, fields: Fields) -> Self {
        Self {
            name: Some(name.into()),
            fields,
            ..Default::default()
        }
    }

    /// Last path segment of the resource name.
    pub fn id(&self) -> Option<&str> {
        self.name.as_deref()?.rsplit('/').next()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

// ============================================================================
// Writes
// ============================================================================

/// Guard evaluated by the server before applying a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Precondition {
    Exists(bool),
    UpdateTime(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMask {
    pub field_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTransform {
    pub field_path: String,
    pub set_to_server_value: String,
}

/// One `update` write with optional mask, transforms and precondition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Write {
    pub update: Document,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<DocumentMask>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_transforms: Vec<FieldTransform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_document: Option<Precondition>,
}

impl Write {
    pub fn update(document: Document) -> Self {
        Self {
            update: document,
            update_mask: None,
            update_transforms: Vec::new(),
            current_document: None,
        }
    }

    /// Touch only the listed fields.
    pub fn masked<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_mask = Some(DocumentMask {
            field_paths: paths.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Set `field` to the commit time.
    pub fn stamp(mut self, field: impl Into<String>) -> Self {
        self.update_transforms.push(FieldTransform {
            field_path: field.into(),
            set_to_server_value: "REQUEST_TIME".to_string(),
        });
        self
    }

    pub fn when(mut self, precondition: Precondition) -> Self {
        self.current_document = Some(precondition);
        self
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchWriteRequest<'a> {
    pub writes: &'a [Write],
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    #[serde(default)]
    pub update_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WriteStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BatchWriteResponse {
    #[serde(default)]
    write_results: Vec<WriteResult>,
    #[serde(default)]
    status: Vec<WriteStatus>,
}

impl BatchWriteResponse {
    /// Per-write results, or the first non-OK status as an error.
    pub(crate) fn into_results(self) -> FirestoreResult<Vec<WriteResult>> {
        if let Some((index, failed)) = self
            .status
            .iter()
            .enumerate()
            .find(|(_, s)| s.code != 0)
        {
            return Err(FirestoreError::from_write_status(
                failed.code,
                format!("write {}: {}", index, failed.message),
            ));
        }
        Ok(self.write_results)
    }
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionSelector {
    collection_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldReference {
    field_path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldFilter {
    field: FieldReference,
    op: &'static str,
    value: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Filter {
    field_filter: FieldFilter,
}

/// `SELECT * FROM collection [WHERE field == value] [LIMIT n]`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    from: Vec<CollectionSelector>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    filter: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<i32>,
}

impl StructuredQuery {
    pub fn collection(collection_id: impl Into<String>) -> Self {
        Self {
            from: vec![CollectionSelector {
                collection_id: collection_id.into(),
            }],
            filter: None,
            limit: None,
        }
    }

    pub fn where_equal(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(Filter {
            field_filter: FieldFilter {
                field: FieldReference {
                    field_path: field.into(),
                },
                op: "EQUAL",
                value: value.into(),
            },
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(i32::try_from(limit).unwrap_or(i32::MAX));
        self
    }

    pub fn collection_id(&self) -> &str {
        self.from.first().map_or("", |c| c.collection_id.as_str())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RunQueryRequest<'a> {
    pub structured_query: &'a StructuredQuery,
}

/// One element of the JSON array runQuery streams back. Elements without
/// a document only report progress.
#[derive(Debug, Deserialize)]
pub(crate) struct RunQueryItem {
    #[serde(default)]
    pub document: Option<Document>,
}
