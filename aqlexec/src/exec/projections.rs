// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Projections: streaming extraction of attribute paths from documents
//!
//! A set of attribute paths is sorted and prefix-deduplicated once at
//! construction. Each projection then records how many levels it shares with
//! its predecessor (`starts_at_level`) and how many levels to close after
//! emitting (`levels_to_close`), so that a single pass over the sorted list
//! opens and closes every shared sub-object exactly once.
//!
//! Values are read either from a stored document or from the flat value
//! array of a covering index entry. Both sources share the same emission
//! code; missing attributes become null.

use crate::exec::call::json_type_name;
use crate::exec::error::ExecutionError;
use crate::storage::{IdResolver, IndexEntry, ObjectBuilder, Value};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Maximum number of segments in a projected path
pub const MAX_PATH_LENGTH: usize = u16::MAX as usize;

/// Default wire key
pub const DEFAULT_KEY: &str = "projections";

/// Attribute path, one string per nesting level
pub type AttributePath = Vec<String>;

/// Classification of a projected path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionType {
    Id,
    Key,
    From,
    To,
    SingleAttribute,
    MultiAttribute,
}

impl ProjectionType {
    fn classify(path: &[String]) -> Self {
        match path {
            [single] => match single.as_str() {
                "_id" => ProjectionType::Id,
                "_key" => ProjectionType::Key,
                "_from" => ProjectionType::From,
                "_to" => ProjectionType::To,
                _ => ProjectionType::SingleAttribute,
            },
            _ => ProjectionType::MultiAttribute,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub path: AttributePath,
    pub kind: ProjectionType,
    /// Levels shared with the previous projection, already open on entry
    pub starts_at_level: u16,
    /// Levels to close after emitting this projection
    pub levels_to_close: u16,
    /// Position of the covering index field, if any
    pub covering_index_position: Option<u16>,
    /// Length of the covering index field path
    pub covering_index_cutoff: u16,
}

impl Projection {
    fn new(path: AttributePath) -> Self {
        Self {
            kind: ProjectionType::classify(&path),
            path,
            starts_at_level: 0,
            levels_to_close: 0,
            covering_index_position: None,
            covering_index_cutoff: 0,
        }
    }

    /// Depth of the object holding the leaf, i.e. open levels after the
    /// walk and before closing
    fn leaf_depth(&self) -> usize {
        self.path.len() - 1
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.join("."))
    }
}

/// A value reachable along a projection's path
enum Step<'a> {
    /// Level implied by a covering index field that is not stored itself
    Virtual,
    Value(&'a Value),
}

/// Ordered, prefix-free set of projections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projections {
    projections: Vec<Projection>,
    covering: bool,
}

impl Projections {
    /// Build from attribute paths
    ///
    /// Paths are sorted; exact duplicates and paths extending another
    /// requested path are dropped.
    pub fn new(paths: Vec<AttributePath>) -> Result<Self, ExecutionError> {
        for path in &paths {
            if path.is_empty() {
                return Err(ExecutionError::BadParameter(
                    "projection path must not be empty".to_string(),
                ));
            }
            if path.len() > MAX_PATH_LENGTH {
                return Err(ExecutionError::BadParameter(format!(
                    "projection path with {} levels exceeds maximum of {}",
                    path.len(),
                    MAX_PATH_LENGTH
                )));
            }
        }

        let mut paths = paths;
        paths.sort();

        let mut kept: Vec<AttributePath> = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(last) = kept.last() {
                if path.starts_with(last) {
                    continue;
                }
            }
            kept.push(path);
        }

        let mut projections: Vec<Projection> = kept.into_iter().map(Projection::new).collect();
        for i in 0..projections.len() {
            let starts = if i == 0 {
                0
            } else {
                common_prefix(&projections[i - 1].path, &projections[i].path)
            };
            let close = match projections.get(i + 1) {
                Some(next) => projections[i].leaf_depth() - common_prefix(&projections[i].path, &next.path),
                None => projections[i].leaf_depth(),
            };
            // Both are bounded by the path length, which fits into u16
            projections[i].starts_at_level = starts as u16;
            projections[i].levels_to_close = close as u16;
        }

        Ok(Self {
            projections,
            covering: false,
        })
    }

    /// Build from dotted path strings
    pub fn from_dotted<S: AsRef<str>>(paths: &[S]) -> Result<Self, ExecutionError> {
        Self::new(
            paths
                .iter()
                .map(|p| p.as_ref().split('.').map(str::to_string).collect())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.projections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Projection> {
        self.projections.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Projection> {
        self.projections.get(index)
    }

    pub fn contains(&self, path: &[String]) -> bool {
        self.projections.iter().any(|p| p.path == path)
    }

    /// Check the projections against the fields of an index
    ///
    /// A projection is covered if one of the fields is a prefix of its path.
    /// Covering mode is enabled only if every projection is covered.
    pub fn determine_covering_index(&mut self, fields: &[Vec<String>]) -> bool {
        for projection in &mut self.projections {
            projection.covering_index_position = None;
            projection.covering_index_cutoff = 0;
            let covering = fields
                .iter()
                .enumerate()
                .filter(|(_, field)| !field.is_empty() && projection.path.starts_with(field))
                .min_by_key(|(_, field)| field.len());
            if let Some((position, field)) = covering {
                if position <= MAX_PATH_LENGTH {
                    projection.covering_index_position = Some(position as u16);
                    projection.covering_index_cutoff = field.len() as u16;
                }
            }
        }
        self.covering = !self.projections.is_empty()
            && self
                .projections
                .iter()
                .all(|p| p.covering_index_position.is_some());
        self.covering
    }

    pub fn uses_covering_index(&self) -> bool {
        self.covering
    }

    /// Covering index position of the projection of the given type
    pub fn covering_index_position(&self, kind: ProjectionType) -> Result<u16, ExecutionError> {
        self.projections
            .iter()
            .find(|p| p.kind == kind)
            .and_then(|p| p.covering_index_position)
            .ok_or_else(|| {
                ExecutionError::Internal(format!(
                    "no covering index position for projection type {:?}",
                    kind
                ))
            })
    }

    /// Emit the projected attributes of `document` into `builder`
    pub fn to_document(
        &self,
        document: &Value,
        resolver: Option<&dyn IdResolver>,
        builder: &mut ObjectBuilder,
    ) -> Result<(), ExecutionError> {
        self.emit(builder, resolver, |_, path| {
            document.lookup(path).found().map(Step::Value)
        })
    }

    /// Emit the projected attributes from a covering index entry
    pub fn to_document_from_index(
        &self,
        entry: &IndexEntry,
        resolver: Option<&dyn IdResolver>,
        builder: &mut ObjectBuilder,
    ) -> Result<(), ExecutionError> {
        if !self.covering {
            return Err(ExecutionError::Internal(
                "projections are not covered by the index".to_string(),
            ));
        }
        let values = &entry.values;
        self.emit(builder, resolver, |projection, path| {
            let cutoff = projection.covering_index_cutoff as usize;
            if path.len() < cutoff {
                return Some(Step::Virtual);
            }
            let stored = values.get(projection.covering_index_position? as usize)?;
            stored.lookup(&path[cutoff..]).found().map(Step::Value)
        })
    }

    /// Convenience wrapper building a fresh object
    pub fn project(&self, document: &Value, resolver: Option<&dyn IdResolver>) -> Result<Value, ExecutionError> {
        let mut builder = ObjectBuilder::new();
        self.to_document(document, resolver, &mut builder)?;
        builder.finish()
    }

    pub fn project_index_entry(&self, entry: &IndexEntry, resolver: Option<&dyn IdResolver>) -> Result<Value, ExecutionError> {
        let mut builder = ObjectBuilder::new();
        self.to_document_from_index(entry, resolver, &mut builder)?;
        builder.finish()
    }

    /// Shared emission pass
    ///
    /// `source` returns what lives at a path prefix of a projection, or
    /// `None` if it is absent. `open` counts the object levels opened for
    /// the current shared prefix. If a previous projection stopped above the
    /// shared prefix because an intermediate value was missing, that prefix
    /// was already emitted as null and the projection is skipped.
    fn emit<'v, F>(
        &self,
        builder: &mut ObjectBuilder,
        resolver: Option<&dyn IdResolver>,
        source: F,
    ) -> Result<(), ExecutionError>
    where
        F: Fn(&Projection, &[String]) -> Option<Step<'v>>,
    {
        let mut open = 0usize;

        for projection in &self.projections {
            let path = &projection.path;
            let leaf = projection.leaf_depth();
            let starts_at = projection.starts_at_level as usize;

            if open >= starts_at {
                let mut complete = true;
                for level in open..leaf {
                    match source(projection, &path[..=level]) {
                        Some(Step::Virtual) => {}
                        Some(Step::Value(value)) if value.is_object() => {}
                        _ => {
                            builder.add(&path[level], Value::Null);
                            complete = false;
                            break;
                        }
                    }
                    builder.open_object(&path[level]);
                    open += 1;
                }

                if complete {
                    let value = match source(projection, path) {
                        Some(Step::Value(value)) => value.resolve_custom(resolver)?,
                        Some(Step::Virtual) | None => Value::Null,
                    };
                    builder.add(&path[leaf], value);
                }
            }

            let target = leaf - projection.levels_to_close as usize;
            while open > target {
                builder.close()?;
                open -= 1;
            }
        }

        debug_assert_eq!(open, 0);
        Ok(())
    }

    /// Encode as wire array under `key`
    pub fn to_wire(&self, key: &str, object: &mut Map<String, JsonValue>) {
        let list = self
            .projections
            .iter()
            .map(|p| match p.path.as_slice() {
                [single] => JsonValue::String(single.clone()),
                path => JsonValue::Array(path.iter().cloned().map(JsonValue::String).collect()),
            })
            .collect();
        object.insert(key.to_string(), JsonValue::Array(list));
    }

    /// Decode from the wire array under `key`; an absent key yields no
    /// projections
    pub fn from_wire(slice: &JsonValue, key: &str) -> Result<Self, ExecutionError> {
        let list = match slice.get(key) {
            None | Some(JsonValue::Null) => return Ok(Self::default()),
            Some(JsonValue::Array(list)) => list,
            Some(other) => {
                return Err(ExecutionError::TypeError(format!(
                    "expecting '{}' to be an array, got {}",
                    key,
                    json_type_name(other)
                )))
            }
        };

        let paths = list
            .iter()
            .map(|item| match item {
                JsonValue::String(s) => Ok(vec![s.clone()]),
                JsonValue::Array(segments) => segments
                    .iter()
                    .map(|s| {
                        s.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| ExecutionError::type_mismatch(key, "an array of strings or string arrays"))
                    })
                    .collect(),
                _ => Err(ExecutionError::type_mismatch(key, "an array of strings or string arrays")),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(paths)
    }
}

/// Path spec in plan descriptions: `"a.b"` or `["a", "b"]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSpec {
    Dotted(String),
    Segments(Vec<String>),
}

impl PathSpec {
    pub fn into_path(self) -> AttributePath {
        match self {
            PathSpec::Dotted(s) => s.split('.').map(str::to_string).collect(),
            PathSpec::Segments(segments) => segments,
        }
    }
}

/// Serde helper accepting either path spelling
pub fn deserialize_path<'de, D>(deserializer: D) -> Result<AttributePath, D::Error>
where
    D: serde::Deserializer<'de>,
{
    PathSpec::deserialize(deserializer).map(PathSpec::into_path)
}

fn common_prefix(a: &[String], b: &[String]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DocumentId;
    use serde_json::json;

    fn path(s: &str) -> AttributePath {
        s.split('.').map(str::to_string).collect()
    }

    fn doc(json: JsonValue) -> Value {
        Value::from_json(&json)
    }

    fn emit(projections: &Projections, document: &Value) -> (JsonValue, usize) {
        let mut builder = ObjectBuilder::new();
        projections.to_document(document, None, &mut builder).unwrap();
        let opens = builder.opens();
        (builder.finish().unwrap().to_json(None).unwrap(), opens)
    }

    #[test]
    fn test_sort_and_dedup() {
        let projections = Projections::from_dotted(&["a.c", "a.b.c", "a.b", "a.b"]).unwrap();
        let paths: Vec<_> = projections.iter().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["a.b", "a.c"]);
    }

    #[test]
    fn test_levels_for_shared_prefix() {
        let projections = Projections::from_dotted(&["a.b", "a.b.c", "a.c"]).unwrap();
        let ab = projections.get(0).unwrap();
        let ac = projections.get(1).unwrap();

        // a.b leaves `a` open for a.c, which closes it
        assert_eq!((ab.starts_at_level, ab.levels_to_close), (0, 0));
        assert_eq!((ac.starts_at_level, ac.levels_to_close), (1, 1));
    }

    #[test]
    fn test_classification() {
        let projections = Projections::from_dotted(&["_id", "_key", "_from", "_to", "name", "a.b"]).unwrap();
        let kinds: Vec<_> = projections.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ProjectionType::From,
                ProjectionType::Id,
                ProjectionType::Key,
                ProjectionType::To,
                ProjectionType::MultiAttribute,
                ProjectionType::SingleAttribute,
            ]
        );
    }

    #[test]
    fn test_rejects_bad_paths() {
        assert!(matches!(
            Projections::new(vec![vec![]]),
            Err(ExecutionError::BadParameter(_))
        ));
        let long = vec!["x".to_string(); MAX_PATH_LENGTH + 1];
        assert!(matches!(
            Projections::new(vec![long]),
            Err(ExecutionError::BadParameter(_))
        ));
        let max = vec!["x".to_string(); MAX_PATH_LENGTH];
        assert!(Projections::new(vec![max]).is_ok());
    }

    #[test]
    fn test_nested_projection_excludes_siblings() {
        let projections = Projections::from_dotted(&["a.b", "c"]).unwrap();
        let (out, opens) = emit(&projections, &doc(json!({"a": {"b": 1, "x": 2}, "c": 3})));
        assert_eq!(out, json!({"a": {"b": 1}, "c": 3}));
        assert_eq!(opens, 1);
    }

    #[test]
    fn test_shared_prefix_opened_once() {
        let projections = Projections::from_dotted(&["a.b.c", "a.b.d", "a.e", "f"]).unwrap();
        let document = doc(json!({"a": {"b": {"c": 1, "d": 2, "z": 0}, "e": 3}, "f": 4, "g": 5}));
        let (out, opens) = emit(&projections, &document);
        assert_eq!(out, json!({"a": {"b": {"c": 1, "d": 2}, "e": 3}, "f": 4}));
        assert_eq!(opens, 2);
    }

    #[test]
    fn test_missing_leaf_and_intermediate() {
        let projections = Projections::from_dotted(&["a.b.c", "a.b.d", "a.x", "y"]).unwrap();
        let (out, _) = emit(&projections, &doc(json!({"a": {"b": 5}})));
        assert_eq!(out, json!({"a": {"b": null, "x": null}, "y": null}));

        let (out, _) = emit(&projections, &doc(json!({})));
        assert_eq!(out, json!({"a": null, "y": null}));
    }

    #[test]
    fn test_custom_id_is_resolved() {
        let projections = Projections::from_dotted(&["_id", "_key"]).unwrap();
        let document = Value::Object(vec![
            ("_key".to_string(), Value::from("k1")),
            ("_id".to_string(), Value::Custom(DocumentId::new(3, "k1"))),
        ]);
        let (out, _) = emit(&projections, &document);
        assert_eq!(out, json!({"_id": "3/k1", "_key": "k1"}));
    }

    #[test]
    fn test_covering_index() {
        let mut projections = Projections::from_dotted(&["a.b", "a.c.d", "x"]).unwrap();
        let fields = vec![path("x"), path("a.b"), path("a.c")];
        assert!(projections.determine_covering_index(&fields));
        assert_eq!(projections.get(0).unwrap().covering_index_position, Some(1));
        assert_eq!(projections.get(1).unwrap().covering_index_cutoff, 2);

        let entry = IndexEntry {
            document_key: "k".to_string(),
            values: vec![Value::Int(9), Value::Int(1), doc(json!({"d": 2, "e": 3}))],
        };
        let out = projections.project_index_entry(&entry, None).unwrap();
        assert_eq!(out.to_json(None).unwrap(), json!({"a": {"b": 1, "c": {"d": 2}}, "x": 9}));
    }

    #[test]
    fn test_partial_coverage_disables_covering() {
        let mut projections = Projections::from_dotted(&["a", "b"]).unwrap();
        assert!(!projections.determine_covering_index(&[path("a")]));
        assert!(!projections.uses_covering_index());
        assert_eq!(projections.covering_index_position(ProjectionType::SingleAttribute).unwrap(), 0);

        let entry = IndexEntry {
            document_key: "k".to_string(),
            values: vec![Value::Int(1)],
        };
        assert!(matches!(
            projections.project_index_entry(&entry, None),
            Err(ExecutionError::Internal(_))
        ));
    }

    #[test]
    fn test_covering_position_for_missing_type() {
        let mut projections = Projections::from_dotted(&["_key"]).unwrap();
        projections.determine_covering_index(&[path("_key")]);
        assert_eq!(projections.covering_index_position(ProjectionType::Key).unwrap(), 0);
        assert!(matches!(
            projections.covering_index_position(ProjectionType::Id),
            Err(ExecutionError::Internal(_))
        ));
    }

    #[test]
    fn test_wire_format() {
        let projections = Projections::from_dotted(&["c", "a.b"]).unwrap();
        let mut object = Map::new();
        projections.to_wire(DEFAULT_KEY, &mut object);
        let wire = JsonValue::Object(object);
        assert_eq!(wire, json!({"projections": [["a", "b"], "c"]}));

        let decoded = Projections::from_wire(&wire, DEFAULT_KEY).unwrap();
        assert_eq!(decoded, projections);
        assert!(Projections::from_wire(&json!({}), DEFAULT_KEY).unwrap().is_empty());
        assert!(Projections::from_wire(&json!({"projections": [1]}), DEFAULT_KEY).is_err());
        assert!(Projections::from_wire(&json!({"projections": "a"}), DEFAULT_KEY).is_err());
    }

    #[test]
    fn test_path_spec() {
        let dotted: PathSpec = serde_json::from_value(json!("a.b")).unwrap();
        let segments: PathSpec = serde_json::from_value(json!(["a.b", "c"])).unwrap();
        assert_eq!(dotted.into_path(), path("a.b"));
        assert_eq!(segments.into_path(), vec!["a.b".to_string(), "c".to_string()]);
    }
}
