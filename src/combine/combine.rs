use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

use crate::form::{ErrorMap, Form, FormHandlers, FormSnapshot, Status};
use crate::observable::{Observable, Property, Subscription};

/// The future returned by combined `validate`/`reset`. Resolves with the
/// single combined snapshot emitted when every member has answered.
pub type CombinedFuture = Shared<oneshot::Receiver<CombinedSnapshot>>;

#[derive(Debug, Error)]
pub enum CombineError {
    #[error("combine requires at least one member")]
    Empty,

    #[error("member '{0}' already exists")]
    DuplicateName(String),
}

/// A member of a combined stream: a full form, or a plain value stream that
/// contributes state only.
pub enum Member {
    Form(Form),
    Stream(Observable<Value>),
}

impl From<Form> for Member {
    fn from(form: Form) -> Self {
        Member::Form(form)
    }
}

impl From<Observable<Value>> for Member {
    fn from(stream: Observable<Value>) -> Self {
        Member::Stream(stream)
    }
}

/// One atomic emission of a combined stream, keyed by member name.
#[derive(Clone, Debug, PartialEq)]
pub struct CombinedSnapshot {
    pub states: BTreeMap<String, Value>,
    pub errors: BTreeMap<String, ErrorMap>,
    pub statuses: BTreeMap<String, Status>,
    pub status: Status,
}

enum Mode {
    PassThrough,
    Awaiting {
        pending: HashSet<usize>,
        validate_sender: Option<oneshot::Sender<CombinedSnapshot>>,
        reset_sender: Option<oneshot::Sender<CombinedSnapshot>>,
    },
}

struct CombinedCore {
    names: Vec<String>,
    latest: Vec<FormSnapshot>,
    // Indices of form members; plain streams take no part in validate/reset.
    forms: Vec<usize>,
    mode: Mode,
    pending_validate: Option<CombinedFuture>,
    pending_reset: Option<CombinedFuture>,
}

struct CombinedShared {
    core: Mutex<CombinedCore>,
    output: Property<CombinedSnapshot>,
}

#[derive(Default)]
struct Effects {
    emit: Option<CombinedSnapshot>,
    resolve: Vec<(oneshot::Sender<CombinedSnapshot>, CombinedSnapshot)>,
}

fn run_effects(shared: &CombinedShared, effects: Effects) {
    if let Some(snapshot) = effects.emit {
        shared.output.set(snapshot);
    }
    for (sender, snapshot) in effects.resolve {
        let _ = sender.send(snapshot);
    }
}

fn combined(core: &CombinedCore, is_validated: bool, is_resetted: bool) -> CombinedSnapshot {
    // Meta validity is a conjunction over form members only. Plain streams
    // carry a synthesized per-member status but never drive it.
    let is_valid = if core
        .forms
        .iter()
        .all(|&i| core.latest[i].status.is_valid.is_none())
    {
        None
    } else {
        Some(
            core.forms
                .iter()
                .all(|&i| core.latest[i].status.is_valid.unwrap_or(true)),
        )
    };
    let mut states = BTreeMap::new();
    let mut errors = BTreeMap::new();
    let mut statuses = BTreeMap::new();
    for (name, snapshot) in core.names.iter().zip(&core.latest) {
        states.insert(name.clone(), snapshot.state.clone());
        errors.insert(name.clone(), snapshot.errors.clone());
        statuses.insert(name.clone(), snapshot.status.clone());
    }
    CombinedSnapshot {
        states,
        errors,
        statuses,
        status: Status {
            is_valid,
            is_validated,
            is_resetted,
        },
    }
}

impl CombinedShared {
    fn on_member(&self, idx: usize, snapshot: FormSnapshot) {
        enum Step {
            Emit,
            Wait,
            Finish,
        }

        let mut effects = Effects::default();
        {
            let mut core = self.core.lock().unwrap();
            core.latest[idx] = snapshot;
            let step = match &mut core.mode {
                Mode::PassThrough => Step::Emit,
                Mode::Awaiting { pending, .. } => {
                    pending.remove(&idx);
                    if pending.is_empty() {
                        Step::Finish
                    } else {
                        Step::Wait
                    }
                }
            };
            match step {
                // Pass-through emissions never carry the meta flags.
                Step::Emit => effects.emit = Some(combined(&core, false, false)),
                Step::Wait => trace!(member = idx, "awaiting remaining members"),
                Step::Finish => {
                    let is_validated = core
                        .forms
                        .iter()
                        .all(|&i| core.latest[i].status.is_validated);
                    let is_resetted = core
                        .forms
                        .iter()
                        .all(|&i| core.latest[i].status.is_resetted);
                    let snapshot = combined(&core, is_validated, is_resetted);
                    if let Mode::Awaiting {
                        validate_sender,
                        reset_sender,
                        ..
                    } = std::mem::replace(&mut core.mode, Mode::PassThrough)
                    {
                        if let Some(sender) = validate_sender {
                            effects.resolve.push((sender, snapshot.clone()));
                        }
                        if let Some(sender) = reset_sender {
                            effects.resolve.push((sender, snapshot.clone()));
                        }
                    }
                    core.pending_validate = None;
                    core.pending_reset = None;
                    effects.emit = Some(snapshot);
                }
            }
        }
        run_effects(self, effects);
    }

    fn on_stream_member(&self, idx: usize, value: &Value) {
        self.on_member(
            idx,
            FormSnapshot {
                state: value.clone(),
                errors: ErrorMap::new(),
                status: Status {
                    is_valid: Some(true),
                    is_validated: false,
                    is_resetted: false,
                },
            },
        );
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Validate,
    Reset,
}

/// Named members merged into one atomically-updating composite stream.
///
/// In pass-through, each member emission produces one combined emission.
/// Combined [`Combined::validate`] and [`Combined::reset`] invoke every form
/// member's handler, suppress pass-through, and emit exactly one combined
/// snapshot when the last member has answered.
pub struct Combined {
    shared: Arc<CombinedShared>,
    members: Vec<(String, Member)>,
    _subs: Vec<Subscription>,
}

impl Combined {
    /// The combined snapshot property.
    pub fn stream(&self) -> Property<CombinedSnapshot> {
        self.shared.output.clone()
    }

    /// A form member's handlers, by member name.
    pub fn handlers(&self, name: &str) -> Option<&FormHandlers> {
        self.members.iter().find_map(|(n, member)| match member {
            Member::Form(form) if n == name => Some(form.handlers()),
            _ => None,
        })
    }

    /// Validate every form member. Resolves with the combined snapshot whose
    /// `is_validated` is the conjunction across form members; de-duplicated
    /// while in flight.
    pub fn validate(&self) -> CombinedFuture {
        self.trigger(Kind::Validate)
    }

    /// Reset every form member. Resolves with the combined `is_resetted`
    /// snapshot; de-duplicated while in flight.
    pub fn reset(&self) -> CombinedFuture {
        self.trigger(Kind::Reset)
    }

    fn trigger(&self, kind: Kind) -> CombinedFuture {
        let mut effects = Effects::default();
        let mut invoke = false;
        let future = {
            let mut core = self.shared.core.lock().unwrap();
            let in_flight = match kind {
                Kind::Validate => &core.pending_validate,
                Kind::Reset => &core.pending_reset,
            };
            if let Some(future) = in_flight {
                trace!("combined operation already in flight");
                return future.clone();
            }

            let (sender, receiver) = oneshot::channel();
            let future = receiver.shared();
            if core.forms.is_empty() {
                // Only plain streams: nothing to invoke, answer immediately.
                let snapshot = combined(
                    &core,
                    matches!(kind, Kind::Validate),
                    matches!(kind, Kind::Reset),
                );
                effects.emit = Some(snapshot.clone());
                effects.resolve.push((sender, snapshot));
            } else {
                let (mut pending, mut validate_sender, mut reset_sender) =
                    match std::mem::replace(&mut core.mode, Mode::PassThrough) {
                        Mode::PassThrough => (HashSet::new(), None, None),
                        Mode::Awaiting {
                            pending,
                            validate_sender,
                            reset_sender,
                        } => (pending, validate_sender, reset_sender),
                    };
                pending.extend(core.forms.iter().copied());
                match kind {
                    Kind::Validate => validate_sender = Some(sender),
                    Kind::Reset => reset_sender = Some(sender),
                }
                core.mode = Mode::Awaiting {
                    pending,
                    validate_sender,
                    reset_sender,
                };
                match kind {
                    Kind::Validate => core.pending_validate = Some(future.clone()),
                    Kind::Reset => core.pending_reset = Some(future.clone()),
                }
                invoke = true;
            }
            future
        };
        run_effects(&self.shared, effects);

        if invoke {
            debug!(
                members = self.members.len(),
                "combined operation dispatched"
            );
            for (_, member) in &self.members {
                if let Member::Form(form) = member {
                    match kind {
                        Kind::Validate => {
                            let _ = form.handlers().validate();
                        }
                        Kind::Reset => {
                            let _ = form.handlers().reset();
                        }
                    }
                }
            }
        }
        future
    }
}

/// Merge named members into one combined stream.
pub fn combine<N>(members: Vec<(N, Member)>) -> Result<Combined, CombineError>
where
    N: Into<String>,
{
    if members.is_empty() {
        return Err(CombineError::Empty);
    }
    let members: Vec<(String, Member)> = members
        .into_iter()
        .map(|(name, member)| (name.into(), member))
        .collect();
    let mut seen = HashSet::new();
    for (name, _) in &members {
        if !seen.insert(name.clone()) {
            return Err(CombineError::DuplicateName(name.clone()));
        }
    }

    let mut names = Vec::with_capacity(members.len());
    let mut latest = Vec::with_capacity(members.len());
    let mut forms = Vec::new();
    for (idx, (name, member)) in members.iter().enumerate() {
        names.push(name.clone());
        match member {
            Member::Form(form) => {
                forms.push(idx);
                latest.push(form.stream().get());
            }
            Member::Stream(_) => latest.push(FormSnapshot {
                state: Value::Null,
                errors: ErrorMap::new(),
                status: Status {
                    is_valid: Some(true),
                    is_validated: false,
                    is_resetted: false,
                },
            }),
        }
    }

    let core = CombinedCore {
        names,
        latest,
        forms,
        mode: Mode::PassThrough,
        pending_validate: None,
        pending_reset: None,
    };
    let initial = combined(&core, false, false);
    let shared = Arc::new(CombinedShared {
        core: Mutex::new(core),
        output: Property::new(initial),
    });

    let mut subs = Vec::new();
    for (idx, (_, member)) in members.iter().enumerate() {
        match member {
            Member::Form(form) => {
                let weak = Arc::downgrade(&shared);
                subs.push(form.stream().changes().subscribe(move |snapshot| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_member(idx, snapshot.clone());
                    }
                }));
            }
            Member::Stream(stream) => {
                let weak = Arc::downgrade(&shared);
                subs.push(stream.subscribe(move |value| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_stream_member(idx, value);
                    }
                }));
            }
        }
    }

    debug!(members = members.len(), "combined stream built");

    Ok(Combined {
        shared,
        members,
        _subs: subs,
    })
}

/// Conversion into a snapshot property, so call sites can treat forms and
/// already-converted streams uniformly.
pub trait IntoFormStream {
    fn into_form_stream(self) -> Property<FormSnapshot>;
}

impl IntoFormStream for &Form {
    fn into_form_stream(self) -> Property<FormSnapshot> {
        self.stream()
    }
}

impl IntoFormStream for Property<FormSnapshot> {
    fn into_form_stream(self) -> Property<FormSnapshot> {
        self
    }
}
