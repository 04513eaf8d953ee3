pub use crate::form::{
    FieldBinding, FieldNode, FieldPath, FieldStatus, FieldTree, FieldValue, FormError,
    FormEvent, FormNode, FormOptions, FormResult, FormSchema, FormStore, RuleViolation,
    UnknownFieldPolicy, ValidationRule, rule_fn,
};
