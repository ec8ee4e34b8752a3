// Collaborative room document backed by yrs.
//
// Root shared types: `meta` (map), `properties` (map), `labels` and `links`
// (arrays). `properties.assignedTo` is a nested array so concurrent
// assignment and removal merge instead of overwriting each other. Scalars
// resolve last-writer-wins.

use serde_json::{Map as JsonMap, Number, Value};
use thiserror::Error;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Any, Array, ArrayPrelim, ArrayRef, Doc, Map, MapRef, Out, ReadTxn, StateVector, Transact,
    TransactionMut, Update,
};

pub const META: &str = "meta";
pub const PROPERTIES: &str = "properties";
pub const LABELS: &str = "labels";
pub const LINKS: &str = "links";

pub const TITLE: &str = "title";
pub const PROGRESS: &str = "progress";
pub const PRIORITY: &str = "priority";
pub const ASSIGNED_TO: &str = "assignedTo";
pub const SPACE: &str = "space";
pub const PROJECT: &str = "project";

/// Scalar `meta` fields carried by project-flavored rooms.
pub const PROJECT_FIELDS: &[&str] =
    &["projectStatus", "projectClient", "projectBudget", "projectStartDate", "projectEndDate"];

pub const DEFAULT_TITLE: &str = "Untitled";
/// Sentinel used for unset progress, priority and legacy assignee values.
pub const NONE_VALUE: &str = "none";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to decode document update: {0}")]
    InvalidUpdate(String),
    #[error("failed to apply document update: {0}")]
    ApplyFailed(String),
    #[error("failed to decode state vector: {0}")]
    InvalidStateVector(String),
}

/// One room's replicated tree.
pub struct RoomDoc {
    doc: Doc,
    meta: MapRef,
    properties: MapRef,
    labels: ArrayRef,
    links: ArrayRef,
}

impl RoomDoc {
    /// An empty document. It has no `meta` until something is written.
    pub fn new() -> Self {
        Self::from_doc(Doc::new())
    }

    /// Create a document with a specific client ID (for deterministic testing).
    pub fn with_client_id(client_id: u64) -> Self {
        let options = yrs::Options { client_id, ..Default::default() };
        Self::from_doc(Doc::with_options(options))
    }

    /// A document holding the default tree written on first open.
    pub fn initialized() -> Self {
        let room = Self::new();
        room.initialize();
        room
    }

    fn from_doc(doc: Doc) -> Self {
        let meta = doc.get_or_insert_map(META);
        let properties = doc.get_or_insert_map(PROPERTIES);
        let labels = doc.get_or_insert_array(LABELS);
        let links = doc.get_or_insert_array(LINKS);
        Self { doc, meta, properties, labels, links }
    }

    /// Write the default tree. Existing fields are left untouched.
    pub fn initialize(&self) {
        let mut txn = self.doc.transact_mut();
        if self.meta.get(&txn, TITLE).is_none() {
            self.meta.insert(&mut txn, TITLE, DEFAULT_TITLE);
        }
        if self.properties.get(&txn, PROGRESS).is_none() {
            self.properties.insert(&mut txn, PROGRESS, NONE_VALUE);
        }
        if self.properties.get(&txn, PRIORITY).is_none() {
            self.properties.insert(&mut txn, PRIORITY, NONE_VALUE);
        }
        self.assignees_array(&mut txn);
    }

    /// Load a document from a binary state (full snapshot).
    pub fn from_state(data: &[u8]) -> Result<Self, DocumentError> {
        let room = Self::new();
        room.apply_update(data)?;
        Ok(room)
    }

    /// Apply an incremental binary update to the document.
    pub fn apply_update(&self, data: &[u8]) -> Result<(), DocumentError> {
        let update =
            Update::decode_v1(data).map_err(|error| DocumentError::InvalidUpdate(error.to_string()))?;
        self.doc
            .transact_mut()
            .apply_update(update)
            .map_err(|error| DocumentError::ApplyFailed(error.to_string()))
    }

    pub fn encode_state(&self) -> Vec<u8> {
        self.doc.transact().encode_state_as_update_v1(&StateVector::default())
    }

    pub fn encode_state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    /// Changes since `remote_sv`, for syncing a peer.
    pub fn encode_diff(&self, remote_sv: &[u8]) -> Result<Vec<u8>, DocumentError> {
        let sv = StateVector::decode_v1(remote_sv)
            .map_err(|error| DocumentError::InvalidStateVector(error.to_string()))?;
        Ok(self.doc.transact().encode_diff_v1(&sv))
    }

    pub fn set_title(&self, title: &str) {
        self.set_meta(TITLE, title);
    }

    /// Set a scalar `meta` field (title, back-references, project fields).
    pub fn set_meta(&self, key: &str, value: &str) {
        let mut txn = self.doc.transact_mut();
        self.meta.insert(&mut txn, key, value);
    }

    pub fn set_progress(&self, progress: &str) {
        let mut txn = self.doc.transact_mut();
        self.properties.insert(&mut txn, PROGRESS, progress);
    }

    pub fn set_priority(&self, priority: &str) {
        let mut txn = self.doc.transact_mut();
        self.properties.insert(&mut txn, PRIORITY, priority);
    }

    /// Append an assignee. Assigning someone twice is a no-op.
    pub fn assign(&self, user_id: &str) {
        let mut txn = self.doc.transact_mut();
        let assignees = self.assignees_array(&mut txn);
        if position_of(&assignees, &txn, user_id).is_none() {
            assignees.push_back(&mut txn, user_id);
        }
    }

    pub fn unassign(&self, user_id: &str) {
        let mut txn = self.doc.transact_mut();
        let assignees = self.assignees_array(&mut txn);
        if let Some(index) = position_of(&assignees, &txn, user_id) {
            assignees.remove(&mut txn, index);
        }
    }

    /// Write `assignedTo` in the pre-list shape: one scalar user id.
    pub fn set_legacy_assignee(&self, user_id: &str) {
        let mut txn = self.doc.transact_mut();
        self.properties.insert(&mut txn, ASSIGNED_TO, user_id);
    }

    pub fn add_label(&self, label_id: &str) {
        let mut txn = self.doc.transact_mut();
        if position_of(&self.labels, &txn, label_id).is_none() {
            self.labels.push_back(&mut txn, label_id);
        }
    }

    pub fn remove_label(&self, label_id: &str) {
        let mut txn = self.doc.transact_mut();
        if let Some(index) = position_of(&self.labels, &txn, label_id) {
            self.labels.remove(&mut txn, index);
        }
    }

    pub fn add_link(&self, url: &str) {
        let mut txn = self.doc.transact_mut();
        self.links.push_back(&mut txn, url);
    }

    /// Plain JSON view of the tree. Empty root types are omitted, so a
    /// document that was never written has no `meta` key.
    pub fn snapshot(&self) -> Value {
        let txn = self.doc.transact();
        let mut root = JsonMap::new();

        for (name, map) in [(META, &self.meta), (PROPERTIES, &self.properties)] {
            if map.len(&txn) > 0 {
                root.insert(name.to_owned(), map_to_json(map, &txn));
            }
        }
        for (name, array) in [(LABELS, &self.labels), (LINKS, &self.links)] {
            if array.len(&txn) > 0 {
                root.insert(name.to_owned(), array_to_json(array, &txn));
            }
        }

        Value::Object(root)
    }

    fn assignees_array(&self, txn: &mut TransactionMut) -> ArrayRef {
        match self.properties.get(&*txn, ASSIGNED_TO) {
            Some(Out::YArray(array)) => array,
            _ => self.properties.insert(txn, ASSIGNED_TO, ArrayPrelim::default()),
        }
    }
}

impl Default for RoomDoc {
    fn default() -> Self {
        Self::new()
    }
}

fn position_of<T: ReadTxn>(array: &ArrayRef, txn: &T, needle: &str) -> Option<u32> {
    array
        .iter(txn)
        .position(|item| matches!(&item, Out::Any(Any::String(value)) if &**value == needle))
        .and_then(|index| u32::try_from(index).ok())
}

fn map_to_json<T: ReadTxn>(map: &MapRef, txn: &T) -> Value {
    Value::Object(map.iter(txn).map(|(key, value)| (key.to_owned(), out_to_json(value, txn))).collect())
}

fn array_to_json<T: ReadTxn>(array: &ArrayRef, txn: &T) -> Value {
    Value::Array(array.iter(txn).map(|value| out_to_json(value, txn)).collect())
}

fn out_to_json<T: ReadTxn>(value: Out, txn: &T) -> Value {
    match value {
        Out::Any(any) => any_to_json(&any),
        Out::YArray(array) => array_to_json(&array, txn),
        Out::YMap(map) => map_to_json(&map, txn),
        other => Value::String(other.to_string(txn)),
    }
}

fn any_to_json(any: &Any) -> Value {
    match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(value) => Value::Bool(*value),
        Any::Number(value) => Number::from_f64(*value).map(Value::Number).unwrap_or(Value::Null),
        Any::BigInt(value) => Value::from(*value),
        Any::String(value) => Value::String(value.to_string()),
        Any::Buffer(bytes) => Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect()),
        Any::Array(items) => Value::Array(items.iter().map(any_to_json).collect()),
        Any::Map(entries) => Value::Object(
            entries.iter().map(|(key, value)| (key.clone(), any_to_json(value))).collect(),
        ),
    }
}
