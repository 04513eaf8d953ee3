use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::value::FieldValue;

/// Failure reported by a [`ValidationRule`]; the message is shown next to the field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuleViolation {
    message: String,
}

impl RuleViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for RuleViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RuleViolation {}

impl From<&str> for RuleViolation {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for RuleViolation {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

pub type BoxedRuleFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), RuleViolation>> + Send + 'a>>;

/// A validation rule attached to a field.
///
/// Rules are owned by the caller and shared by reference between the live tree,
/// the reset snapshot and any exported copies.
pub trait ValidationRule: Send + Sync {
    fn validate_sync(&self, value: &FieldValue) -> Result<(), RuleViolation>;

    fn validate<'a>(&'a self, value: &'a FieldValue) -> BoxedRuleFuture<'a> {
        let result = self.validate_sync(value);
        Box::pin(async move { result })
    }
}

pub type SharedRule = Arc<dyn ValidationRule>;

/// Rule built from a synchronous closure; async validation reuses it.
pub struct FnRule<F> {
    check: F,
}

impl<F> ValidationRule for FnRule<F>
where
    F: Fn(&FieldValue) -> Result<(), RuleViolation> + Send + Sync,
{
    fn validate_sync(&self, value: &FieldValue) -> Result<(), RuleViolation> {
        (self.check)(value)
    }
}

pub fn rule_fn<F>(check: F) -> SharedRule
where
    F: Fn(&FieldValue) -> Result<(), RuleViolation> + Send + Sync + 'static,
{
    Arc::new(FnRule { check })
}

/// Rule with a separate asynchronous check, e.g. a server-side uniqueness lookup.
pub struct AsyncFnRule<S, A> {
    sync_check: S,
    async_check: A,
}

impl<S, A> ValidationRule for AsyncFnRule<S, A>
where
    S: Fn(&FieldValue) -> Result<(), RuleViolation> + Send + Sync,
    A: for<'a> Fn(&'a FieldValue) -> BoxedRuleFuture<'a> + Send + Sync,
{
    fn validate_sync(&self, value: &FieldValue) -> Result<(), RuleViolation> {
        (self.sync_check)(value)
    }

    fn validate<'a>(&'a self, value: &'a FieldValue) -> BoxedRuleFuture<'a> {
        (self.async_check)(value)
    }
}

pub fn async_rule_fn<S, A>(sync_check: S, async_check: A) -> SharedRule
where
    S: Fn(&FieldValue) -> Result<(), RuleViolation> + Send + Sync + 'static,
    A: for<'a> Fn(&'a FieldValue) -> BoxedRuleFuture<'a> + Send + Sync + 'static,
{
    Arc::new(AsyncFnRule {
        sync_check,
        async_check,
    })
}

pub(super) struct RuleDebug<'a>(pub(super) &'a Option<SharedRule>);

impl Debug for RuleDebug<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Some(<rule>)"),
            None => f.write_str("None"),
        }
    }
}
