mod aggregate;
mod binding;
mod controller;
mod node;
mod path;
mod payload;
mod reconcile;
mod schema;
mod validation;
mod value;


pub use aggregate::{
    Completion, EMPTY_FORM_PERCENT, InvalidField, ValidityReport, check_validity,
    compute_completion,
};
pub use binding::{FieldBinding, FieldStatus, RegisterParams};
pub use calmform_derive::FormSchema;
pub use controller::{
    AsyncResolution, FormChange, FormError, FormEvent, FormOptions, FormResult, FormStore,
    SubscriptionId, ValidationTicket,
};
pub use node::{FieldNode, FieldTree, FormNode};
pub use path::{FieldPath, IntoFieldPath};
pub use payload::project_payload;
pub use reconcile::{DEFAULT_EMPTY_DATE, SET_AS_IT_IS, UnknownFieldPolicy, reconcile};
pub use schema::{FormSchema, FormSchemaNode};
pub use validation::{
    AsyncFnRule, BoxedRuleFuture, FnRule, RuleViolation, SharedRule, ValidationRule,
    async_rule_fn, rule_fn,
};
pub use value::FieldValue;
