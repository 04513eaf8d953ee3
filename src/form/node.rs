use std::fmt::{Debug, Formatter};

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::controller::{FormError, FormResult};
use super::path::FieldPath;
use super::validation::{RuleDebug, SharedRule};
use super::value::FieldValue;

pub(super) const KEY_VALUE: &str = "value";
pub(super) const KEY_ERROR: &str = "error";
pub(super) const KEY_WARNING: &str = "warning";
pub(super) const KEY_HIDDEN: &str = "hidden";
pub(super) const KEY_EXCLUDE_FROM_FILL_PERCENT: &str = "excludeFromFillPercent";
pub(super) const KEY_EXCLUDE_FROM_REQUEST_DATA: &str = "excludeFromRequestData";

/// A single form field: its value plus status and visibility metadata.
#[derive(Clone, Default)]
pub struct FieldNode {
    pub value: FieldValue,
    pub error: Option<String>,
    pub warning: Option<String>,
    pub exclude_from_fill_percent: bool,
    pub exclude_from_request_data: bool,
    pub hidden: bool,
    pub validation: Option<SharedRule>,
}

impl FieldNode {
    pub fn new(value: impl Into<FieldValue>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn validation(mut self, rule: SharedRule) -> Self {
        self.validation = Some(rule);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn exclude_from_fill_percent(mut self, exclude: bool) -> Self {
        self.exclude_from_fill_percent = exclude;
        self
    }

    pub fn exclude_from_request_data(mut self, exclude: bool) -> Self {
        self.exclude_from_request_data = exclude;
        self
    }

    pub fn has_validation(&self) -> bool {
        self.validation.is_some()
    }

    /// Applies the recognised keys of a JSON field description. Unknown keys are
    /// ignored; `validation` cannot be expressed in JSON and is kept as is.
    pub(super) fn overlay_json(&mut self, object: &Map<String, Value>) {
        for (key, value) in object {
            match key.as_str() {
                KEY_VALUE => self.value = FieldValue::from_json(value.clone()),
                KEY_ERROR => self.error = optional_text(value),
                KEY_WARNING => self.warning = optional_text(value),
                KEY_HIDDEN => self.hidden = value.as_bool().unwrap_or(false),
                KEY_EXCLUDE_FROM_FILL_PERCENT => {
                    self.exclude_from_fill_percent = value.as_bool().unwrap_or(false)
                }
                KEY_EXCLUDE_FROM_REQUEST_DATA => {
                    self.exclude_from_request_data = value.as_bool().unwrap_or(false)
                }
                other => tracing::trace!(key = other, "ignoring unknown field attribute"),
            }
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Debug for FieldNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldNode")
            .field("value", &self.value)
            .field("error", &self.error)
            .field("warning", &self.warning)
            .field("exclude_from_fill_percent", &self.exclude_from_fill_percent)
            .field("exclude_from_request_data", &self.exclude_from_request_data)
            .field("hidden", &self.hidden)
            .field("validation", &RuleDebug(&self.validation))
            .finish()
    }
}

/// Field equality compares data only; rules are opaque.
impl PartialEq for FieldNode {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.error == other.error
            && self.warning == other.warning
            && self.exclude_from_fill_percent == other.exclude_from_fill_percent
            && self.exclude_from_request_data == other.exclude_from_request_data
            && self.hidden == other.hidden
            && self.validation.is_some() == other.validation.is_some()
    }
}

impl Serialize for FieldNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(KEY_VALUE, &self.value)?;
        map.serialize_entry(KEY_ERROR, &self.error)?;
        if let Some(warning) = &self.warning {
            map.serialize_entry(KEY_WARNING, warning)?;
        }
        if self.hidden {
            map.serialize_entry(KEY_HIDDEN, &true)?;
        }
        if self.exclude_from_fill_percent {
            map.serialize_entry(KEY_EXCLUDE_FROM_FILL_PERCENT, &true)?;
        }
        if self.exclude_from_request_data {
            map.serialize_entry(KEY_EXCLUDE_FROM_REQUEST_DATA, &true)?;
        }
        map.end()
    }
}

/// A named group of nodes. Children keep their insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldTree {
    pub hidden: bool,
    children: IndexMap<String, FormNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FormNode {
    Field(FieldNode),
    Group(FieldTree),
}

impl FormNode {
    pub fn is_hidden(&self) -> bool {
        match self {
            FormNode::Field(field) => field.hidden,
            FormNode::Group(group) => group.hidden,
        }
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        match self {
            FormNode::Field(field) => field.hidden = hidden,
            FormNode::Group(group) => group.hidden = hidden,
        }
    }

    pub fn as_field(&self) -> Option<&FieldNode> {
        match self {
            FormNode::Field(field) => Some(field),
            FormNode::Group(_) => None,
        }
    }

    pub fn as_field_mut(&mut self) -> Option<&mut FieldNode> {
        match self {
            FormNode::Field(field) => Some(field),
            FormNode::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&FieldTree> {
        match self {
            FormNode::Field(_) => None,
            FormNode::Group(group) => Some(group),
        }
    }
}

impl From<FieldNode> for FormNode {
    fn from(field: FieldNode) -> Self {
        FormNode::Field(field)
    }
}

impl From<FieldTree> for FormNode {
    fn from(group: FieldTree) -> Self {
        FormNode::Group(group)
    }
}

impl Serialize for FormNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FormNode::Field(field) => field.serialize(serializer),
            FormNode::Group(group) => group.serialize(serializer),
        }
    }
}

impl FieldTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`FieldTree::insert`].
    pub fn with(mut self, key: impl Into<String>, node: impl Into<FormNode>) -> Self {
        self.insert(key, node);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        node: impl Into<FormNode>,
    ) -> Option<FormNode> {
        self.children.insert(key.into(), node.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<FormNode> {
        self.children.shift_remove(key)
    }

    pub fn child(&self, key: &str) -> Option<&FormNode> {
        self.children.get(key)
    }

    pub fn child_mut(&mut self, key: &str) -> Option<&mut FormNode> {
        self.children.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormNode)> {
        self.children.iter().map(|(key, node)| (key.as_str(), node))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Resolves `path` against this tree. The root path resolves to nothing since
    /// the tree itself is not a [`FormNode`].
    pub fn get(&self, path: &FieldPath) -> Option<&FormNode> {
        let mut segments = path.segments();
        let mut node = self.children.get(segments.next()?)?;
        for segment in segments {
            node = match node {
                FormNode::Group(group) => group.children.get(segment)?,
                FormNode::Field(_) => return None,
            };
        }
        Some(node)
    }

    pub fn get_mut(&mut self, path: &FieldPath) -> Option<&mut FormNode> {
        let mut segments = path.segments();
        let mut node = self.children.get_mut(segments.next()?)?;
        for segment in segments {
            node = match node {
                FormNode::Group(group) => group.children.get_mut(segment)?,
                FormNode::Field(_) => return None,
            };
        }
        Some(node)
    }

    pub fn field(&self, path: &FieldPath) -> FormResult<&FieldNode> {
        match self.get(path) {
            Some(FormNode::Field(field)) => Ok(field),
            Some(FormNode::Group(_)) => Err(FormError::NotAField(path.clone())),
            None => Err(FormError::UnknownPath(path.clone())),
        }
    }

    pub fn field_mut(&mut self, path: &FieldPath) -> FormResult<&mut FieldNode> {
        match self.get_mut(path) {
            Some(FormNode::Field(field)) => Ok(field),
            Some(FormNode::Group(_)) => Err(FormError::NotAField(path.clone())),
            None => Err(FormError::UnknownPath(path.clone())),
        }
    }

    pub fn node_mut(&mut self, path: &FieldPath) -> FormResult<&mut FormNode> {
        self.get_mut(path)
            .ok_or_else(|| FormError::UnknownPath(path.clone()))
    }

    /// Builds a tree from its JSON description. An object with a `value` key is a
    /// field; any other object is a group. A boolean `hidden` entry on a group
    /// marks the group itself as hidden.
    pub fn from_json(value: &Value) -> FormResult<Self> {
        match value {
            Value::Object(object) => tree_from_object(object, &FieldPath::root()),
            other => Err(FormError::InvalidTree {
                path: FieldPath::root(),
                reason: format!("expected an object, found {}", json_kind(other)),
            }),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for FieldTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if self.hidden {
            map.serialize_entry(KEY_HIDDEN, &true)?;
        }
        for (key, node) in &self.children {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

impl<K> FromIterator<(K, FormNode)> for FieldTree
where
    K: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, FormNode)>>(iter: I) -> Self {
        Self {
            hidden: false,
            children: iter
                .into_iter()
                .map(|(key, node)| (key.into(), node))
                .collect(),
        }
    }
}

fn tree_from_object(object: &Map<String, Value>, path: &FieldPath) -> FormResult<FieldTree> {
    let mut tree = FieldTree::new();
    for (key, value) in object {
        let child_path = path.child(key.as_str());
        match value {
            Value::Bool(hidden) if key == KEY_HIDDEN => tree.hidden = *hidden,
            Value::Object(child) if child.contains_key(KEY_VALUE) => {
                let mut field = FieldNode::empty();
                field.overlay_json(child);
                tree.insert(key.as_str(), field);
            }
            Value::Object(child) => {
                tree.insert(key.as_str(), tree_from_object(child, &child_path)?);
            }
            other => {
                return Err(FormError::InvalidTree {
                    path: child_path,
                    reason: format!("expected an object, found {}", json_kind(other)),
                });
            }
        }
    }
    Ok(tree)
}

fn optional_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

pub(super) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).expect("valid path")
    }

    #[test]
    fn resolves_nested_fields_and_groups() {
        let tree = FieldTree::new().with(
            "address",
            FieldTree::new().with("city", FieldNode::new("Berlin")),
        );

        assert_eq!(
            tree.field(&path("address.city")).expect("city field").value,
            FieldValue::from("Berlin")
        );
        assert!(matches!(
            tree.field(&path("address")),
            Err(FormError::NotAField(_))
        ));
        assert!(matches!(
            tree.field(&path("address.zip")),
            Err(FormError::UnknownPath(_))
        ));
        assert!(tree.get(&path("address.city.deeper")).is_none());
    }

    #[test]
    fn json_description_uses_value_key_as_discriminant() {
        let tree = FieldTree::from_json(&json!({
            "email": { "value": "", "warning": "check spelling" },
            "billing": {
                "hidden": true,
                "iban": { "value": "DE00", "excludeFromRequestData": true }
            }
        }))
        .expect("valid tree");

        let email = tree.field(&path("email")).expect("email");
        assert_eq!(email.value, FieldValue::Empty);
        assert_eq!(email.warning.as_deref(), Some("check spelling"));

        let billing = tree.get(&path("billing")).expect("billing group");
        assert!(billing.is_hidden());
        assert!(
            tree.field(&path("billing.iban"))
                .expect("iban")
                .exclude_from_request_data
        );
    }

    #[test]
    fn json_description_rejects_scalar_children() {
        let result = FieldTree::from_json(&json!({ "group": { "oops": 3 } }));
        assert!(matches!(
            result,
            Err(FormError::InvalidTree { path, .. }) if path.to_string() == "group.oops"
        ));
    }
}
