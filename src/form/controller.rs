use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures_timer::Delay;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::aggregate::{self, Completion, InvalidField, ValidityReport};
use super::node::{FieldNode, FieldTree, FormNode};
use super::path::{FieldPath, IntoFieldPath};
use super::payload;
use super::reconcile::{self, DEFAULT_EMPTY_DATE, UnknownFieldPolicy};
use super::schema::FormSchema;
use super::validation::{RuleViolation, SharedRule};
use super::value::FieldValue;

static SUBSCRIPTION_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(SUBSCRIPTION_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

/// How overlapping async validations of one field settle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncResolution {
    /// Every outcome is applied; whichever resolves last decides the error.
    #[default]
    LastResolvedWins,
    /// Only the most recently started validation may write the error.
    LatestRequestWins,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormOptions {
    pub async_resolution: AsyncResolution,
    /// Delay before an async validation runs; a newer request for the same
    /// field cancels a pending one. Zero disables debouncing.
    pub validation_debounce_ms: u64,
    pub unknown_fields: UnknownFieldPolicy,
    pub empty_date_sentinel: String,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            async_resolution: AsyncResolution::LastResolvedWins,
            validation_debounce_ms: 0,
            unknown_fields: UnknownFieldPolicy::Skip,
            empty_date_sentinel: DEFAULT_EMPTY_DATE.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("invalid field path {0:?}")]
    InvalidPath(String),
    #[error("no form node at path {0}")]
    UnknownPath(FieldPath),
    #[error("form node at path {0} is a group, not a field")]
    NotAField(FieldPath),
    #[error("invalid form description at {path}: {reason}")]
    InvalidTree { path: FieldPath, reason: String },
    #[error("response contains {0} which is not part of the form")]
    UnknownResponseField(FieldPath),
    #[error("response shape mismatch at {path}: expected {expected}, found {found}")]
    ShapeMismatch {
        path: FieldPath,
        expected: &'static str,
        found: &'static str,
    },
}

pub type FormResult<T> = Result<T, FormError>;

/// A discrete state transition, delivered to subscribers after it is applied.
#[derive(Clone, Debug, PartialEq)]
pub enum FormEvent {
    InputChanged { path: FieldPath },
    HiddenChanged { path: FieldPath, hidden: bool },
    FieldStatusChanged { path: FieldPath },
    FieldValidated { path: FieldPath, error: Option<String> },
    FormErrorChanged(Option<String>),
    FormWarningChanged(Option<String>),
    LoadingChanged(bool),
    ValidatingChanged(bool),
    Reset,
    DataMerged,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormChange {
    pub version: u64,
    pub event: FormEvent,
}

pub(super) type Listener = Arc<dyn Fn(&FormChange) + Send + Sync>;

#[derive(Default)]
pub(super) struct ComputedCache {
    validity: Option<ValidityReport>,
    completion: Option<Completion>,
    payload: Option<Value>,
}

pub(super) struct StoreState {
    pub(super) initial: FieldTree,
    pub(super) form: FieldTree,
    pub(super) form_error: Option<String>,
    pub(super) form_warning: Option<String>,
    pub(super) pending_validations: usize,
    pub(super) is_form_loading: bool,
    pub(super) version: u64,
    pub(super) tickets: BTreeMap<FieldPath, ValidationTicket>,
    pub(super) cache: ComputedCache,
}

impl StoreState {
    /// Records a state transition: bumps the version and drops memoized outputs.
    pub(super) fn bump(&mut self) -> u64 {
        self.version += 1;
        self.cache = ComputedCache::default();
        self.version
    }

    fn next_ticket(&mut self, path: &FieldPath) -> ValidationTicket {
        let next = ValidationTicket(
            self.tickets
                .get(path)
                .copied()
                .unwrap_or(ValidationTicket(0))
                .0
                + 1,
        );
        self.tickets.insert(path.clone(), next);
        next
    }

    fn is_latest_ticket(&self, path: &FieldPath, ticket: ValidationTicket) -> bool {
        self.tickets.get(path).copied() == Some(ticket)
    }
}

/// Hierarchical form state: a tree of fields plus form-wide status flags.
///
/// Cloning is cheap and every clone drives the same state, so UI callbacks and
/// pending validations can each hold a handle.
#[derive(Clone)]
pub struct FormStore {
    pub(super) options: FormOptions,
    pub(super) state: Arc<RwLock<StoreState>>,
    pub(super) listeners: Arc<RwLock<BTreeMap<SubscriptionId, Listener>>>,
}

impl FormStore {
    pub fn new(form: FieldTree) -> Self {
        Self::with_options(form, FormOptions::default())
    }

    pub fn with_options(form: FieldTree, options: FormOptions) -> Self {
        Self {
            options,
            state: Arc::new(RwLock::new(StoreState {
                initial: form.clone(),
                form,
                form_error: None,
                form_warning: None,
                pending_validations: 0,
                is_form_loading: false,
                version: 0,
                tickets: BTreeMap::new(),
                cache: ComputedCache::default(),
            })),
            listeners: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn from_schema<S: FormSchema>(model: S) -> Self {
        Self::new(model.into_tree())
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&FormChange) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        let id = SubscriptionId::next();
        write_lock(&self.listeners, "registering listener")?.insert(id, Arc::new(listener));
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> FormResult<bool> {
        Ok(write_lock(&self.listeners, "removing listener")?
            .remove(&id)
            .is_some())
    }

    pub(super) fn notify(&self, version: u64, event: FormEvent) -> FormResult<()> {
        let listeners = read_lock(&self.listeners, "reading listeners")?
            .values()
            .cloned()
            .collect::<Vec<_>>();
        if listeners.is_empty() {
            return Ok(());
        }
        let change = FormChange { version, event };
        for listener in listeners {
            listener(&change);
        }
        Ok(())
    }

    pub fn version(&self) -> FormResult<u64> {
        Ok(read_lock(&self.state, "reading version")?.version)
    }

    pub fn get_field(&self, path: impl IntoFieldPath) -> FormResult<FieldNode> {
        let path = path.into_field_path()?;
        Ok(read_lock(&self.state, "reading field")?
            .form
            .field(&path)?
            .clone())
    }

    pub fn get_node(&self, path: impl IntoFieldPath) -> FormResult<FormNode> {
        let path = path.into_field_path()?;
        read_lock(&self.state, "reading node")?
            .form
            .get(&path)
            .cloned()
            .ok_or(FormError::UnknownPath(path))
    }

    pub fn form_values(&self) -> FormResult<FieldTree> {
        Ok(read_lock(&self.state, "reading form values")?.form.clone())
    }

    pub fn form_values_json(&self) -> FormResult<Value> {
        Ok(read_lock(&self.state, "serializing form values")?
            .form
            .to_json())
    }

    pub fn form_error(&self) -> FormResult<Option<String>> {
        Ok(read_lock(&self.state, "reading form error")?.form_error.clone())
    }

    pub fn form_warning(&self) -> FormResult<Option<String>> {
        Ok(read_lock(&self.state, "reading form warning")?
            .form_warning
            .clone())
    }

    pub fn is_validating(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading validating flag")?.pending_validations > 0)
    }

    pub fn is_form_loading(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading loading flag")?.is_form_loading)
    }

    pub fn is_form_valid(&self) -> FormResult<bool> {
        Ok(self.validity()?.is_valid())
    }

    pub fn invalid_fields(&self) -> FormResult<Vec<InvalidField>> {
        Ok(self.validity()?.invalid)
    }

    pub fn validity(&self) -> FormResult<ValidityReport> {
        let mut state = write_lock(&self.state, "computing validity")?;
        if let Some(report) = &state.cache.validity {
            return Ok(report.clone());
        }
        let report = aggregate::check_validity(&state.form);
        state.cache.validity = Some(report.clone());
        Ok(report)
    }

    pub fn completion(&self) -> FormResult<Completion> {
        let mut state = write_lock(&self.state, "computing completion")?;
        if let Some(completion) = state.cache.completion {
            return Ok(completion);
        }
        let completion = aggregate::compute_completion(&state.form);
        state.cache.completion = Some(completion);
        Ok(completion)
    }

    pub fn form_success_percent(&self) -> FormResult<u8> {
        Ok(self.completion()?.percent())
    }

    pub fn form_json_data(&self) -> FormResult<Value> {
        let mut state = write_lock(&self.state, "projecting payload")?;
        if let Some(payload) = &state.cache.payload {
            return Ok(payload.clone());
        }
        let payload = payload::project_payload(&state.form);
        state.cache.payload = Some(payload.clone());
        Ok(payload)
    }

    /// Writes `value` into the field and dismisses both form banners. A field that
    /// currently shows an error is re-checked right away with its synchronous rule.
    pub fn change_input(
        &self,
        path: impl IntoFieldPath,
        value: impl Into<FieldValue>,
    ) -> FormResult<()> {
        let path = path.into_field_path()?;
        let version = {
            let mut state = write_lock(&self.state, "changing input")?;
            let field = state.form.field_mut(&path)?;
            field.value = value.into();
            if field.error.is_some() {
                field.error = match field.validation.clone() {
                    Some(rule) => rule
                        .validate_sync(&field.value)
                        .err()
                        .map(|violation| violation.message().to_string()),
                    None => None,
                };
            }
            state.form_error = None;
            state.form_warning = None;
            state.bump()
        };
        tracing::debug!(path = %path, "input changed");
        self.notify(version, FormEvent::InputChanged { path })
    }

    /// Like [`FormStore::change_input`], but re-checks an errored field with the
    /// asynchronous rule and waits for the outcome.
    pub async fn change_input_async(
        &self,
        path: impl IntoFieldPath,
        value: impl Into<FieldValue>,
    ) -> FormResult<()> {
        let path = path.into_field_path()?;
        let (had_error, version) = {
            let mut state = write_lock(&self.state, "changing input")?;
            let field = state.form.field_mut(&path)?;
            field.value = value.into();
            let had_error = field.error.is_some();
            state.form_error = None;
            state.form_warning = None;
            (had_error, state.bump())
        };
        tracing::debug!(path = %path, "input changed");
        self.notify(version, FormEvent::InputChanged { path: path.clone() })?;
        if had_error {
            self.validate(&path).await?;
        }
        Ok(())
    }

    pub fn change_hidden(&self, path: impl IntoFieldPath, hidden: bool) -> FormResult<()> {
        let path = path.into_field_path()?;
        let version = {
            let mut state = write_lock(&self.state, "changing visibility")?;
            state.form.node_mut(&path)?.set_hidden(hidden);
            state.bump()
        };
        tracing::debug!(path = %path, hidden, "visibility changed");
        self.notify(version, FormEvent::HiddenChanged { path, hidden })
    }

    pub fn set_field_error(
        &self,
        path: impl IntoFieldPath,
        error: Option<String>,
    ) -> FormResult<()> {
        let path = path.into_field_path()?;
        let version = {
            let mut state = write_lock(&self.state, "setting field error")?;
            state.form.field_mut(&path)?.error = error;
            state.bump()
        };
        self.notify(version, FormEvent::FieldStatusChanged { path })
    }

    pub fn set_field_warning(
        &self,
        path: impl IntoFieldPath,
        warning: Option<String>,
    ) -> FormResult<()> {
        let path = path.into_field_path()?;
        let version = {
            let mut state = write_lock(&self.state, "setting field warning")?;
            state.form.field_mut(&path)?.warning = warning;
            state.bump()
        };
        self.notify(version, FormEvent::FieldStatusChanged { path })
    }

    pub fn set_form_error(&self, message: impl Into<String>) -> FormResult<()> {
        let message = message.into();
        let version = {
            let mut state = write_lock(&self.state, "setting form error")?;
            state.form_error = Some(message.clone());
            state.bump()
        };
        self.notify(version, FormEvent::FormErrorChanged(Some(message)))
    }

    pub fn set_form_warning(&self, message: impl Into<String>) -> FormResult<()> {
        let message = message.into();
        let version = {
            let mut state = write_lock(&self.state, "setting form warning")?;
            state.form_warning = Some(message.clone());
            state.bump()
        };
        self.notify(version, FormEvent::FormWarningChanged(Some(message)))
    }

    pub fn clear_form_banners(&self) -> FormResult<()> {
        let version = {
            let mut state = write_lock(&self.state, "clearing form banners")?;
            state.form_error = None;
            state.form_warning = None;
            state.bump()
        };
        self.notify(version, FormEvent::FormErrorChanged(None))?;
        self.notify(version, FormEvent::FormWarningChanged(None))
    }

    pub fn set_form_loading(&self, value: bool) -> FormResult<()> {
        let version = {
            let mut state = write_lock(&self.state, "setting loading flag")?;
            state.is_form_loading = value;
            state.bump()
        };
        self.notify(version, FormEvent::LoadingChanged(value))
    }

    /// Restores the tree captured at construction. The snapshot is cloned again,
    /// so it stays pristine across any number of resets. Validation tickets keep
    /// counting, so a validation started before the reset never looks current.
    pub fn reset_form(&self) -> FormResult<()> {
        let version = {
            let mut state = write_lock(&self.state, "resetting form")?;
            state.form = state.initial.clone();
            state.form_error = None;
            state.form_warning = None;
            state.bump()
        };
        tracing::debug!("form reset to initial values");
        self.notify(version, FormEvent::Reset)
    }

    /// Merges a server response into the form. On error the live tree is untouched.
    pub fn set_form_data(&self, response: &Value) -> FormResult<()> {
        let version = {
            let mut state = write_lock(&self.state, "merging response data")?;
            let merged = reconcile::reconcile(&state.form, response, &self.options)?;
            state.form = merged;
            state.bump()
        };
        tracing::debug!(version, "response merged into form");
        self.notify(version, FormEvent::DataMerged)
    }

    /// Runs the field's asynchronous rule and records the outcome as its error.
    /// A field without a rule always passes, which clears any error it holds.
    pub async fn validate(&self, path: impl IntoFieldPath) -> FormResult<()> {
        let path = path.into_field_path()?;
        let start = {
            let mut state = write_lock(&self.state, "starting validation")?;
            let field = state.form.field_mut(&path)?;
            match field.validation.clone() {
                None => {
                    field.error = None;
                    ValidationStart::Passed(state.bump())
                }
                Some(rule) => {
                    let value = field.value.clone();
                    let ticket = state.next_ticket(&path);
                    state.pending_validations += 1;
                    let became_validating = state.pending_validations == 1;
                    ValidationStart::Running {
                        rule,
                        value,
                        ticket,
                        became_validating,
                        version: state.bump(),
                    }
                }
            }
        };
        let (rule, value, ticket, became_validating, version) = match start {
            ValidationStart::Passed(version) => {
                tracing::debug!(path = %path, "field without a rule passes validation");
                return self.notify(version, FormEvent::FieldValidated { path, error: None });
            }
            ValidationStart::Running {
                rule,
                value,
                ticket,
                became_validating,
                version,
            } => (rule, value, ticket, became_validating, version),
        };
        let mut pending = PendingValidation::new(self.state.clone());
        if became_validating {
            self.notify(version, FormEvent::ValidatingChanged(true))?;
        }

        let debounce = Duration::from_millis(self.options.validation_debounce_ms);
        if !debounce.is_zero() {
            Delay::new(debounce).await;
            let superseded = !read_lock(&self.state, "checking validation ticket")?
                .is_latest_ticket(&path, ticket);
            if superseded {
                tracing::trace!(path = %path, "debounced validation superseded");
                pending.disarm();
                return self.finish_validation(&path, ticket, None);
            }
        }

        let outcome = rule.validate(&value).await;
        pending.disarm();
        self.finish_validation(&path, ticket, Some(outcome))
    }

    fn finish_validation(
        &self,
        path: &FieldPath,
        ticket: ValidationTicket,
        outcome: Option<Result<(), RuleViolation>>,
    ) -> FormResult<()> {
        let mut events = Vec::new();
        let version = {
            let mut state = write_lock(&self.state, "finishing validation")?;
            state.pending_validations = state.pending_validations.saturating_sub(1);
            if state.pending_validations == 0 {
                events.push(FormEvent::ValidatingChanged(false));
            }

            let stale = self.options.async_resolution == AsyncResolution::LatestRequestWins
                && !state.is_latest_ticket(path, ticket);
            match outcome {
                Some(outcome) if !stale => {
                    let error = outcome.err().map(|violation| violation.message().to_string());
                    match state.form.field_mut(path) {
                        Ok(field) => {
                            field.error = error.clone();
                            tracing::debug!(path = %path, error = ?error, "field validated");
                            events.push(FormEvent::FieldValidated {
                                path: path.clone(),
                                error,
                            });
                        }
                        Err(_) => {
                            tracing::debug!(path = %path, "validated field no longer exists");
                        }
                    }
                }
                Some(_) => tracing::trace!(path = %path, ?ticket, "dropping stale validation"),
                None => {}
            }
            state.bump()
        };
        for event in events {
            self.notify(version, event)?;
        }
        Ok(())
    }

    /// Validates every visible rule-bearing field asynchronously, then reports
    /// whether the whole form passes its synchronous rules.
    pub async fn validate_form(&self) -> FormResult<bool> {
        let paths = {
            let state = read_lock(&self.state, "collecting validated fields")?;
            let mut paths = Vec::new();
            collect_rule_paths(&state.form, &FieldPath::root(), &mut paths);
            paths
        };
        for path in paths {
            self.validate(&path).await?;
        }
        self.is_form_valid()
    }
}

fn collect_rule_paths(tree: &FieldTree, path: &FieldPath, paths: &mut Vec<FieldPath>) {
    for (key, node) in tree.iter() {
        if node.is_hidden() {
            continue;
        }
        match node {
            FormNode::Field(field) if field.has_validation() => paths.push(path.child(key)),
            FormNode::Field(_) => {}
            FormNode::Group(group) => collect_rule_paths(group, &path.child(key), paths),
        }
    }
}

enum ValidationStart {
    Passed(u64),
    Running {
        rule: SharedRule,
        value: FieldValue,
        ticket: ValidationTicket,
        became_validating: bool,
        version: u64,
    },
}

/// Keeps `pending_validations` balanced when a validation future is dropped
/// before it resolves.
struct PendingValidation {
    state: Option<Arc<RwLock<StoreState>>>,
}

impl PendingValidation {
    fn new(state: Arc<RwLock<StoreState>>) -> Self {
        Self { state: Some(state) }
    }

    fn disarm(&mut self) {
        self.state = None;
    }
}

impl Drop for PendingValidation {
    fn drop(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        if let Ok(mut state) = state.write() {
            state.pending_validations = state.pending_validations.saturating_sub(1);
            state.bump();
        }
    }
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
