use calmform::form::{FieldNode, FieldPath, FieldTree, FieldValue, FormStore};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

const KEYS: [&str; 5] = ["alpha", "beta", "gamma", "delta", "epsilon"];

fn blank_tree() -> FieldTree {
    let profile = KEYS
        .iter()
        .fold(FieldTree::new(), |tree, key| tree.with(*key, FieldNode::empty()));
    KEYS.iter()
        .fold(FieldTree::new(), |tree, key| tree.with(*key, FieldNode::empty()))
        .with("profile", profile)
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-z0-9 ]{0,12}".prop_map(Value::String),
        any::<i64>().prop_map(|number| json!(number)),
        any::<bool>().prop_map(Value::Bool),
    ]
}

fn response() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(prop::sample::select(KEYS.to_vec()), scalar(), 0..KEYS.len())
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect()
        })
}

fn field_path() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(KEYS.to_vec()).prop_map(str::to_string),
        prop::sample::select(KEYS.to_vec()).prop_map(|key| format!("profile.{key}")),
    ]
}

proptest! {
    #[test]
    fn path_display_round_trips(
        segments in prop::collection::vec("[a-zA-Z_][a-zA-Z0-9_]{0,8}", 1..5)
    ) {
        let raw = segments.join(".");
        let path = FieldPath::parse(&raw).expect("valid path");
        prop_assert_eq!(path.to_string(), raw);
        prop_assert_eq!(path.len(), segments.len());
    }

    #[test]
    fn change_input_is_observable_through_get_field(path in field_path(), text in "[a-z ]{0,16}") {
        let store = FormStore::new(blank_tree());
        store.change_input(path.as_str(), text.as_str()).expect("change input");
        prop_assert_eq!(
            store.get_field(path.as_str()).expect("field").value,
            FieldValue::from(text.as_str())
        );
    }

    #[test]
    fn reset_always_restores_the_initial_tree(
        rounds in prop::collection::vec(
            prop::collection::vec((field_path(), "[a-z]{1,6}"), 1..6),
            1..4,
        )
    ) {
        let store = FormStore::new(blank_tree());
        for edits in rounds {
            for (path, text) in edits {
                store.change_input(path.as_str(), text).expect("change input");
            }
            store.change_hidden("profile", true).expect("hide profile");
            store.reset_form().expect("reset");
            prop_assert_eq!(store.form_values().expect("values"), blank_tree());
        }
    }

    #[test]
    fn payload_reproduces_merged_response(top in response(), nested in response()) {
        let store = FormStore::new(blank_tree());
        let mut incoming = top.clone();
        incoming.insert("profile".to_string(), Value::Object(nested.clone()));
        store.set_form_data(&Value::Object(incoming)).expect("merge");

        let payload = store.form_json_data().expect("payload");
        for (key, value) in &top {
            prop_assert_eq!(&payload[key.as_str()], value);
        }
        for (key, value) in &nested {
            prop_assert_eq!(&payload["profile"][key.as_str()], value);
        }
    }
}
