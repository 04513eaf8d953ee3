use super::controller::{FormResult, FormStore, read_lock};
use super::path::{FieldPath, IntoFieldPath};
use super::value::FieldValue;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldStatus {
    Error,
    Warning,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegisterParams {
    /// Value written on every change instead of the widget's own value, for
    /// widgets such as checkboxes that only report "changed".
    pub on_change_value: Option<FieldValue>,
}

/// What a widget needs to render and drive one field.
///
/// `on_change` re-checks an errored field with the rule's synchronous check
/// only. Widgets backed by a rule whose async check is stricter should call
/// `on_change_async`, which waits for the async check.
#[derive(Clone)]
pub struct FieldBinding {
    pub path: FieldPath,
    pub value: FieldValue,
    pub status: Option<FieldStatus>,
    pub help_text: Option<String>,
    store: FormStore,
    on_change_value: Option<FieldValue>,
}

impl FieldBinding {
    pub fn on_change(&self, value: impl Into<FieldValue>) -> FormResult<()> {
        self.store.change_input(&self.path, self.written_value(value))
    }

    pub async fn on_change_async(&self, value: impl Into<FieldValue>) -> FormResult<()> {
        self.store
            .change_input_async(&self.path, self.written_value(value))
            .await
    }

    fn written_value(&self, value: impl Into<FieldValue>) -> FieldValue {
        match &self.on_change_value {
            Some(fixed) => fixed.clone(),
            None => value.into(),
        }
    }

    pub async fn on_blur(&self) -> FormResult<()> {
        self.store.validate(&self.path).await
    }
}

impl FormStore {
    pub fn register(&self, path: impl IntoFieldPath) -> FormResult<FieldBinding> {
        self.register_with(path, RegisterParams::default())
    }

    pub fn register_with(
        &self,
        path: impl IntoFieldPath,
        params: RegisterParams,
    ) -> FormResult<FieldBinding> {
        let path = path.into_field_path()?;
        let state = read_lock(&self.state, "registering field binding")?;
        let field = state.form.field(&path)?;

        let (status, help_text) = if field.error.is_some() || state.form_error.is_some() {
            (Some(FieldStatus::Error), field.error.clone())
        } else if field.warning.is_some() || state.form_warning.is_some() {
            (Some(FieldStatus::Warning), field.warning.clone())
        } else {
            (None, None)
        };

        Ok(FieldBinding {
            value: field.value.clone(),
            status,
            help_text,
            store: self.clone(),
            on_change_value: params.on_change_value,
            path,
        })
    }
}
