use crate::{
    errors::{AppError, AppResult},
    sandbox::{PathIntent, ValidatedPath},
};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::json;
use std::collections::HashMap;

/// The closed set of operations the gateway exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    ConvertMarkdown,
    FetchApiData,
    ResizeImage,
    FilterCsv,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::ConvertMarkdown,
        OperationKind::FetchApiData,
        OperationKind::ResizeImage,
        OperationKind::FilterCsv,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::ConvertMarkdown => "convert-markdown",
            OperationKind::FetchApiData => "fetch-api-data",
            OperationKind::ResizeImage => "resize-image",
            OperationKind::FilterCsv => "filter-csv",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> { Self::ALL.into_iter().find(|k| k.name() == name) }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PathParam {
    pub name: &'static str,
    pub intent: PathIntent,
}

#[derive(Debug, Clone, Default)]
pub struct OperationRequest {
    pub operation: String,
    pub args: HashMap<String, String>,
}

impl OperationRequest {
    pub fn new(operation: impl Into<String>, args: HashMap<String, String>) -> Self {
        Self { operation: operation.into(), args }
    }
}

/// One delimited record keyed by header name, in header order.
/// Fields missing from a short record are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row(pub Vec<(String, Option<String>)>);

impl Row {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == column).and_then(|(_, v)| v.as_deref())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug)]
pub enum Outcome {
    Written {
        message: &'static str,
        /// response key naming the produced file
        field: &'static str,
        path: ValidatedPath,
    },
    Rows(Vec<Row>),
}

impl Outcome {
    pub fn into_json(self) -> AppResult<serde_json::Value> {
        match self {
            Outcome::Written { message, field, path } => {
                let mut body = serde_json::Map::new();
                body.insert("message".into(), json!(message));
                body.insert(field.into(), json!(path.to_string()));
                Ok(serde_json::Value::Object(body))
            }
            Outcome::Rows(rows) => serde_json::to_value(rows).map_err(|e| AppError::Internal(e.to_string())),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct Capabilities {
    pub operations: Vec<OperationInfo>,
}

#[derive(Debug, serde::Serialize)]
pub struct OperationInfo {
    pub name: &'static str,
    pub path_params: &'static [PathParam],
    pub params: &'static [&'static str],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_and_unknown_rejected() {
        for kind in OperationKind::ALL {
            assert_eq!(OperationKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(OperationKind::from_name("delete-everything"), None);
    }

    #[test]
    fn row_serializes_in_header_order() {
        let row = Row(vec![
            ("zeta".into(), Some("1".into())),
            ("alpha".into(), Some("2".into())),
            ("mid".into(), None),
        ]);
        let s = serde_json::to_string(&row).unwrap();
        assert_eq!(s, r#"{"zeta":"1","alpha":"2","mid":null}"#);
        assert_eq!(row.get("alpha"), Some("2"));
        assert_eq!(row.get("mid"), None);
    }

    #[test]
    fn rows_body_keeps_header_order() {
        let rows = vec![Row(vec![("zeta".into(), Some("1".into())), ("alpha".into(), None)])];
        let body = Outcome::Rows(rows).into_json().unwrap();
        assert_eq!(body.to_string(), r#"[{"zeta":"1","alpha":null}]"#);
        let empty = Outcome::Rows(Vec::new()).into_json().unwrap();
        assert_eq!(empty, json!([]));
    }
}
