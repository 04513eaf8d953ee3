//! Merging server responses back into a live form tree.
//!
//! The merge never edits the live tree in place: it clones the existing tree,
//! overlays the response and hands back the result for the store to swap in.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::controller::{FormError, FormOptions, FormResult};
use super::node::{FieldNode, FieldTree, FormNode, KEY_VALUE, json_kind};
use super::path::FieldPath;
use super::value::FieldValue;

/// Marker key asking for an object to be adopted verbatim instead of recursed into.
pub const SET_AS_IT_IS: &str = "setAsItIs";

/// Sentinel that backends send for an unset date.
pub const DEFAULT_EMPTY_DATE: &str = "0001-01-01T00:00:00Z";

/// What to do with response entries that have no matching node in the form.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownFieldPolicy {
    /// Ignore the entry and keep merging.
    #[default]
    Skip,
    /// Abort the merge; the live tree stays untouched.
    Reject,
}

pub fn reconcile(
    existing: &FieldTree,
    response: &Value,
    options: &FormOptions,
) -> FormResult<FieldTree> {
    let Value::Object(incoming) = response else {
        return Err(FormError::ShapeMismatch {
            path: FieldPath::root(),
            expected: "object",
            found: json_kind(response),
        });
    };
    Reconciler { options }.merge_group(existing, incoming, &FieldPath::root())
}

struct Reconciler<'a> {
    options: &'a FormOptions,
}

impl Reconciler<'_> {
    fn merge_group(
        &self,
        existing: &FieldTree,
        incoming: &Map<String, Value>,
        path: &FieldPath,
    ) -> FormResult<FieldTree> {
        let mut merged = existing.clone();
        for (key, value) in incoming {
            let child_path = path.child(key.as_str());
            if let Some(node) = self.merge_node(existing.child(key), value, &child_path)? {
                merged.insert(key.as_str(), node);
            }
        }
        Ok(merged)
    }

    /// Returns the replacement node for `path`, or `None` when the existing node
    /// (if any) stays as it is.
    fn merge_node(
        &self,
        existing: Option<&FormNode>,
        incoming: &Value,
        path: &FieldPath,
    ) -> FormResult<Option<FormNode>> {
        let Some(existing) = existing else {
            return self.unknown_field(path);
        };

        match (existing, incoming) {
            (_, Value::Null) => Ok(None),
            (_, Value::Object(object)) if object.contains_key(SET_AS_IT_IS) => {
                let (adopt, object) = strip_marker(object);
                if adopt {
                    self.adopt_verbatim(existing, object, path).map(Some)
                } else {
                    self.merge_node(Some(existing), &Value::Object(object), path)
                }
            }
            (FormNode::Group(group), Value::Object(object)) => Ok(Some(FormNode::Group(
                self.merge_group(group, object, path)?,
            ))),
            (FormNode::Group(_), other) => self.shape_mismatch(path, other),
            (FormNode::Field(field), other) => {
                let mut field = field.clone();
                field.value = self.coerce(other);
                field.error = None;
                tracing::trace!(path = %path, "field refreshed from response");
                Ok(Some(FormNode::Field(field)))
            }
        }
    }

    fn coerce(&self, value: &Value) -> FieldValue {
        match value {
            Value::String(text) if *text == self.options.empty_date_sentinel => FieldValue::Null,
            other => FieldValue::from_json(other.clone()),
        }
    }

    fn unknown_field(&self, path: &FieldPath) -> FormResult<Option<FormNode>> {
        match self.options.unknown_fields {
            UnknownFieldPolicy::Skip => {
                tracing::debug!(path = %path, "skipping response entry without a form field");
                Ok(None)
            }
            UnknownFieldPolicy::Reject => Err(FormError::UnknownResponseField(path.clone())),
        }
    }

    fn shape_mismatch(&self, path: &FieldPath, found: &Value) -> FormResult<Option<FormNode>> {
        match self.options.unknown_fields {
            UnknownFieldPolicy::Skip => {
                tracing::debug!(
                    path = %path,
                    found = json_kind(found),
                    "skipping response value that does not fit a field group"
                );
                Ok(None)
            }
            UnknownFieldPolicy::Reject => Err(FormError::ShapeMismatch {
                path: path.clone(),
                expected: "object",
                found: json_kind(found),
            }),
        }
    }

    /// Shallow merge of a marked object onto the existing node. Field children
    /// of a group take their entry as is; nested groups go through the regular
    /// merge, and keys the group lacks follow the unknown-field policy.
    fn adopt_verbatim(
        &self,
        existing: &FormNode,
        object: Map<String, Value>,
        path: &FieldPath,
    ) -> FormResult<FormNode> {
        match existing {
            FormNode::Field(field) => {
                let mut field = field.clone();
                if object.contains_key(KEY_VALUE) {
                    field.overlay_json(&object);
                } else {
                    field.value = FieldValue::Json(Value::Object(object));
                }
                Ok(FormNode::Field(field))
            }
            FormNode::Group(group) => {
                let mut adopted = group.clone();
                for (key, value) in object {
                    let child_path = path.child(key.as_str());
                    let replacement = match group.child(&key) {
                        Some(FormNode::Field(field)) => {
                            Some(FormNode::Field(adopt_into_field(field.clone(), value)))
                        }
                        Some(child) => self.merge_node(Some(child), &value, &child_path)?,
                        None => self.unknown_field(&child_path)?,
                    };
                    if let Some(node) = replacement {
                        adopted.insert(key, node);
                    }
                }
                Ok(FormNode::Group(adopted))
            }
        }
    }
}

fn strip_marker(object: &Map<String, Value>) -> (bool, Map<String, Value>) {
    let mut object = object.clone();
    let adopt = object.remove(SET_AS_IT_IS).is_some_and(|marker| is_truthy(&marker));
    (adopt, object)
}

/// `null`, `false`, zero and the empty string turn the marker off.
fn is_truthy(marker: &Value) -> bool {
    match marker {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn adopt_into_field(mut field: FieldNode, value: Value) -> FieldNode {
    match value {
        Value::Object(object) if object.contains_key(KEY_VALUE) => field.overlay_json(&object),
        other => field.value = FieldValue::from_json(other),
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).expect("valid path")
    }

    fn merge(existing: &FieldTree, response: Value) -> FieldTree {
        reconcile(existing, &response, &FormOptions::default()).expect("merge succeeds")
    }

    #[test]
    fn null_keeps_existing_field() {
        let existing = FieldTree::new().with("email", FieldNode::new("old").warning("w"));
        let merged = merge(&existing, json!({ "email": null }));
        assert_eq!(
            merged.field(&path("email")).expect("email"),
            &FieldNode::new("old").warning("w")
        );
    }

    #[test]
    fn scalar_replaces_value_and_clears_error() {
        let existing = FieldTree::new().with(
            "email",
            FieldNode::new("old").warning("w").error("taken"),
        );
        let merged = merge(&existing, json!({ "email": "new@x.com" }));
        let email = merged.field(&path("email")).expect("email");
        assert_eq!(email.value, FieldValue::from("new@x.com"));
        assert_eq!(email.warning.as_deref(), Some("w"));
        assert_eq!(email.error, None);
    }

    #[test]
    fn empty_date_sentinel_becomes_null() {
        let existing = FieldTree::new().with("startDate", FieldNode::new("2020-01-01"));
        let merged = merge(&existing, json!({ "startDate": DEFAULT_EMPTY_DATE }));
        let start = merged.field(&path("startDate")).expect("startDate");
        assert_eq!(start.value, FieldValue::Null);
        assert_eq!(start.error, None);
    }

    #[test]
    fn nested_groups_keep_metadata_and_siblings() {
        let existing = FieldTree::new()
            .with(
                "address",
                FieldTree::new()
                    .with("city", FieldNode::new("").hidden(true))
                    .with("zip", FieldNode::new("10115")),
            )
            .with("name", FieldNode::new("Ada"));
        let merged = merge(&existing, json!({ "address": { "city": "Paris" } }));

        let city = merged.field(&path("address.city")).expect("city");
        assert_eq!(city.value, FieldValue::from("Paris"));
        assert!(city.hidden);
        assert_eq!(
            merged.field(&path("address.zip")).expect("zip").value,
            FieldValue::from("10115")
        );
        assert_eq!(
            merged.field(&path("name")).expect("name").value,
            FieldValue::from("Ada")
        );
    }

    #[test]
    fn sibling_groups_resolve_against_their_own_paths() {
        let existing = FieldTree::new()
            .with("a", FieldTree::new().with("x", FieldNode::new("").warning("a.x")))
            .with("b", FieldTree::new().with("x", FieldNode::new("").warning("b.x")));
        let merged = merge(&existing, json!({ "a": { "x": 1 }, "b": { "x": 2 } }));

        let ax = merged.field(&path("a.x")).expect("a.x");
        let bx = merged.field(&path("b.x")).expect("b.x");
        assert_eq!((ax.value.to_json(), ax.warning.as_deref()), (json!(1), Some("a.x")));
        assert_eq!((bx.value.to_json(), bx.warning.as_deref()), (json!(2), Some("b.x")));
    }

    #[test]
    fn marked_objects_are_adopted_without_recursion() {
        let existing = FieldTree::new()
            .with("country", FieldNode::new("").warning("pick one"))
            .with("files", FieldNode::new("").error("missing"));
        let merged = merge(
            &existing,
            json!({
                "country": { "setAsItIs": true, "id": 4, "name": "Chile" },
                "files": { "setAsItIs": true, "value": ["a.pdf"], "error": null }
            }),
        );

        let country = merged.field(&path("country")).expect("country");
        assert_eq!(country.value, FieldValue::Json(json!({ "id": 4, "name": "Chile" })));
        assert_eq!(country.warning.as_deref(), Some("pick one"));

        let files = merged.field(&path("files")).expect("files");
        assert_eq!(files.value, FieldValue::Json(json!(["a.pdf"])));
        assert_eq!(files.error, None);
    }

    fn address_tree() -> FieldTree {
        FieldTree::new().with(
            "address",
            FieldTree::new()
                .with("city", FieldNode::new("").warning("check spelling"))
                .with("geo", FieldTree::new().with("lat", FieldNode::empty())),
        )
    }

    #[test]
    fn marked_groups_merge_nested_groups_and_skip_unknown_keys() {
        let merged = merge(
            &address_tree(),
            json!({
                "address": {
                    "setAsItIs": true,
                    "city": "Lima",
                    "geo": { "lat": 12 },
                    "bogus": 5
                }
            }),
        );

        let city = merged.field(&path("address.city")).expect("city");
        assert_eq!(city.value, FieldValue::from("Lima"));
        assert_eq!(city.warning.as_deref(), Some("check spelling"));
        assert_eq!(
            merged.field(&path("address.geo.lat")).expect("lat").value.to_json(),
            json!(12)
        );
        assert!(merged.get(&path("address.bogus")).is_none());
    }

    #[test]
    fn marked_groups_honour_strict_policy() {
        let options = FormOptions {
            unknown_fields: UnknownFieldPolicy::Reject,
            ..FormOptions::default()
        };

        let unknown = reconcile(
            &address_tree(),
            &json!({ "address": { "setAsItIs": true, "bogus": 5 } }),
            &options,
        );
        assert!(matches!(
            unknown,
            Err(FormError::UnknownResponseField(path)) if path.to_string() == "address.bogus"
        ));

        let mismatch = reconcile(
            &address_tree(),
            &json!({ "address": { "setAsItIs": true, "geo": 7 } }),
            &options,
        );
        assert!(matches!(
            mismatch,
            Err(FormError::ShapeMismatch { path, .. }) if path.to_string() == "address.geo"
        ));
    }

    #[test]
    fn falsy_markers_fall_back_to_regular_merge() {
        let existing = FieldTree::new().with("country", FieldNode::new("").warning("pick one"));
        for marker in [json!(false), json!(0), json!(""), Value::Null] {
            let merged = merge(
                &existing,
                json!({ "country": { "setAsItIs": marker, "value": "CL" } }),
            );
            let country = merged.field(&path("country")).expect("country");
            assert_eq!(country.value, FieldValue::Json(json!({ "value": "CL" })));
            assert_eq!(country.warning.as_deref(), Some("pick one"));
        }
    }

    #[test]
    fn unknown_entries_are_skipped_by_default() {
        let existing = FieldTree::new().with("name", FieldNode::new("Ada"));
        let merged = merge(
            &existing,
            json!({ "name": "Grace", "extra": "ignored", "nested": { "deep": 1 } }),
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged.field(&path("name")).expect("name").value,
            FieldValue::from("Grace")
        );
    }

    #[test]
    fn strict_policy_rejects_unknown_entries() {
        let existing =
            FieldTree::new().with("group", FieldTree::new().with("a", FieldNode::empty()));
        let options = FormOptions {
            unknown_fields: UnknownFieldPolicy::Reject,
            ..FormOptions::default()
        };

        let unknown = reconcile(&existing, &json!({ "group": { "b": 1 } }), &options);
        assert!(matches!(
            unknown,
            Err(FormError::UnknownResponseField(path)) if path.to_string() == "group.b"
        ));

        let mismatch = reconcile(&existing, &json!({ "group": 5 }), &options);
        assert!(matches!(mismatch, Err(FormError::ShapeMismatch { .. })));
    }

    #[test]
    fn non_object_response_is_rejected() {
        let result = reconcile(&FieldTree::new(), &json!([1, 2]), &FormOptions::default());
        assert!(matches!(
            result,
            Err(FormError::ShapeMismatch { found: "array", .. })
        ));
    }
}
