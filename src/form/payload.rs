use serde_json::{Map, Value};

use super::node::{FieldTree, FormNode};

/// Projects the tree into the object sent on submit: hidden nodes and fields
/// excluded from request data are dropped, groups are always kept.
pub fn project_payload(tree: &FieldTree) -> Value {
    Value::Object(project_group(tree))
}

fn project_group(tree: &FieldTree) -> Map<String, Value> {
    let mut payload = Map::new();
    for (key, node) in tree.iter() {
        if node.is_hidden() {
            continue;
        }
        match node {
            FormNode::Field(field) if field.exclude_from_request_data => {}
            FormNode::Field(field) => {
                payload.insert(key.to_string(), field.value.to_json());
            }
            FormNode::Group(group) => {
                payload.insert(key.to_string(), Value::Object(project_group(group)));
            }
        }
    }
    payload
}
