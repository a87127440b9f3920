use std::sync::Arc;

use serde_json::Value;

use crate::adapter::StateAdapter;
use crate::observable::Observable;
use crate::store::{ConfigError, Input, Reducer};

use super::status::ErrorMap;
use super::validator::{GetFn, SetFn, Validation, ValidatorFn};

/// How a validated field plugs into whole-form validation: read its value
/// out of whole state, write an invalid raw value back, and the error key.
///
/// Derived automatically when the reducer is a property name; required
/// explicitly otherwise.
pub struct ValidatorOptions {
    pub(crate) get: GetFn,
    pub(crate) set: SetFn,
    pub(crate) key: String,
}

impl ValidatorOptions {
    pub fn new(
        key: impl Into<String>,
        get: impl Fn(&Value) -> Value + Send + Sync + 'static,
        set: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            get: Arc::new(get),
            set: Arc::new(set),
            key: key.into(),
        }
    }

    pub(crate) fn derive(prop: &str, adapter: &Arc<dyn StateAdapter>) -> Self {
        let get_adapter = Arc::clone(adapter);
        let set_adapter = Arc::clone(adapter);
        let get_prop = prop.to_string();
        let set_prop = prop.to_string();
        Self {
            get: Arc::new(move |state| get_adapter.get(state, &get_prop)),
            set: Arc::new(move |state, raw| set_adapter.set(state, &set_prop, raw.clone())),
            key: prop.to_string(),
        }
    }
}

pub(crate) enum OptionsSpec {
    /// Derive from the reducer, which must be a property name.
    Derive,
    /// String shorthand: get/set/key all through the adapter under one name.
    Keyed(String),
    Explicit(ValidatorOptions),
}

/// One form field: an input, a reducer, and an optional validator.
pub struct Field {
    pub(crate) input: Input,
    pub(crate) reducer: Reducer,
    pub(crate) validator: Option<(ValidatorFn, OptionsSpec)>,
}

impl Field {
    /// A field with no validator: a transparent pass-through to the reducer.
    pub fn plain(input: impl Into<Input>, reducer: impl Into<Reducer>) -> Self {
        Self {
            input: input.into(),
            reducer: reducer.into(),
            validator: None,
        }
    }

    /// A validated field. Validator options are derived from the reducer,
    /// which must be a property name.
    pub fn validated(
        input: impl Into<Input>,
        reducer: impl Into<Reducer>,
        validator: impl Fn(&Value, &Value) -> Validation + Send + Sync + 'static,
    ) -> Self {
        Self {
            input: input.into(),
            reducer: reducer.into(),
            validator: Some((Arc::new(validator), OptionsSpec::Derive)),
        }
    }

    /// A validated field whose options all route through one property name:
    /// read it, write invalid raws back to it, record errors under it.
    pub fn validated_keyed(
        input: impl Into<Input>,
        reducer: impl Into<Reducer>,
        validator: impl Fn(&Value, &Value) -> Validation + Send + Sync + 'static,
        key: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            reducer: reducer.into(),
            validator: Some((Arc::new(validator), OptionsSpec::Keyed(key.into()))),
        }
    }

    /// A validated field with explicit [`ValidatorOptions`], for reducers
    /// that are not property names.
    pub fn validated_with(
        input: impl Into<Input>,
        reducer: impl Into<Reducer>,
        validator: impl Fn(&Value, &Value) -> Validation + Send + Sync + 'static,
        options: ValidatorOptions,
    ) -> Self {
        Self {
            input: input.into(),
            reducer: reducer.into(),
            validator: Some((Arc::new(validator), OptionsSpec::Explicit(options))),
        }
    }

    pub(crate) fn display_name(&self) -> String {
        match &self.input {
            Input::Named(name)
            | Input::NamedMerged(name, _)
            | Input::NamedComposed(name, _) => name.clone(),
            Input::Stream(_) => "<stream>".to_string(),
        }
    }

    pub(crate) fn resolve_options(
        &self,
        adapter: &Arc<dyn StateAdapter>,
    ) -> Result<Option<ValidatorOptions>, ConfigError> {
        let Some((_, spec)) = &self.validator else {
            return Ok(None);
        };
        match spec {
            OptionsSpec::Explicit(options) => Ok(Some(ValidatorOptions {
                get: Arc::clone(&options.get),
                set: Arc::clone(&options.set),
                key: options.key.clone(),
            })),
            OptionsSpec::Keyed(key) => Ok(Some(ValidatorOptions::derive(key, adapter))),
            OptionsSpec::Derive => match &self.reducer {
                Reducer::Named(prop) if !prop.is_empty() => {
                    Ok(Some(ValidatorOptions::derive(prop, adapter)))
                }
                _ => Err(ConfigError::IncompleteValidationConfig(self.display_name())),
            },
        }
    }
}

pub(crate) type CombineErrorsFn = Arc<dyn Fn(&ErrorMap, &ErrorMap) -> ErrorMap + Send + Sync>;
pub(crate) type CombineStateFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;
pub(crate) type MapErrorsFn = Arc<dyn Fn(&ErrorMap) -> ErrorMap + Send + Sync>;

/// A stream of errors produced outside the form (a server, typically),
/// merged into the error map as it emits.
pub struct ExternalErrors {
    pub(crate) stream: Observable<ErrorMap>,
    pub(crate) combine: CombineErrorsFn,
}

impl ExternalErrors {
    /// Shallow-merge external entries over current ones.
    pub fn new(stream: Observable<ErrorMap>) -> Self {
        Self {
            stream,
            combine: Arc::new(|current, external| {
                let mut merged = current.clone();
                for (key, value) in external {
                    merged.insert(key.clone(), value.clone());
                }
                merged
            }),
        }
    }

    /// Merge with a custom combine function `(current, external) -> next`.
    pub fn with_combine(
        stream: Observable<ErrorMap>,
        combine: impl Fn(&ErrorMap, &ErrorMap) -> ErrorMap + Send + Sync + 'static,
    ) -> Self {
        Self {
            stream,
            combine: Arc::new(combine),
        }
    }
}

/// A stream whose latest value feeds into reset: the next reset combines the
/// construction-time initial with it instead of restoring the initial alone.
pub struct ResetWith {
    pub(crate) stream: Observable<Value>,
    pub(crate) combine: CombineStateFn,
}

impl ResetWith {
    /// Reset to the stream's latest value outright.
    pub fn new(stream: Observable<Value>) -> Self {
        Self {
            stream,
            combine: Arc::new(|_initial, latest| latest.clone()),
        }
    }

    /// Reset to `combine(initial, latest)`.
    pub fn with_combine(
        stream: Observable<Value>,
        combine: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            stream,
            combine: Arc::new(combine),
        }
    }
}

/// Optional form configuration beyond the field list.
#[derive(Default)]
pub struct FormOptions {
    pub(crate) adapter: Option<Arc<dyn StateAdapter>>,
    pub(crate) map_errors: Option<MapErrorsFn>,
    pub(crate) external_errors: Option<ExternalErrors>,
    pub(crate) reset_with: Option<ResetWith>,
}

impl FormOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the state adapter.
    pub fn adapter(mut self, adapter: Arc<dyn StateAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Post-process the error map before every emission.
    pub fn map_errors(
        mut self,
        map: impl Fn(&ErrorMap) -> ErrorMap + Send + Sync + 'static,
    ) -> Self {
        self.map_errors = Some(Arc::new(map));
        self
    }

    pub fn external_errors(mut self, external: ExternalErrors) -> Self {
        self.external_errors = Some(external);
        self
    }

    pub fn reset_with(mut self, reset_with: ResetWith) -> Self {
        self.reset_with = Some(reset_with);
        self
    }
}
