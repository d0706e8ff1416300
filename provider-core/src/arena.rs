//! Flat, append-only step storage.
//!
//! Steps never hold pointers to each other. A step names its parent by uuid and
//! the tree is assembled once, when the owning result or container is
//! finalized. Identity inside a running scope is the arena index ([`StepId`]).

use std::collections::{HashMap, HashSet};

use crate::enums::{Stage, Status};
use crate::model::{current_time_ms, Attachment, Parameter, StatusDetails, StepResult};
use crate::writer::generate_uuid;

/// Index of a step inside its [`StepArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(usize);

impl StepId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A named, timed unit of reported work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub uuid: String,
    /// Explicit parent. When set before the step is added it wins over the
    /// nesting stack. Fixed once the step is in an arena.
    pub parent: Option<String>,
    pub name: String,
    pub status: Status,
    pub status_details: Option<StatusDetails>,
    pub stage: Stage,
    pub parameters: Vec<Parameter>,
    pub attachments: Vec<Attachment>,
    pub start: i64,
    pub stop: i64,
}

impl Step {
    /// Creates an open step starting now.
    pub fn new(name: impl Into<String>) -> Self {
        let now = current_time_ms();
        Self {
            uuid: generate_uuid(),
            parent: None,
            name: name.into(),
            status: Status::Unknown,
            status_details: None,
            stage: Stage::Running,
            parameters: Vec::new(),
            attachments: Vec::new(),
            start: now,
            stop: now,
        }
    }

    pub fn with_parent(mut self, parent_uuid: impl Into<String>) -> Self {
        self.parent = Some(parent_uuid.into());
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_details(mut self, message: Option<String>, trace: Option<String>) -> Self {
        self.status_details = StatusDetails::with_message(message, trace);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.parameters.push(Parameter::new(name, value.to_string()));
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Marks a prebuilt step as finished now, resolving an unknown status to
    /// passed.
    pub fn finished(mut self) -> Self {
        if !self.status.is_resolved() {
            self.status = Status::Passed;
        }
        self.stage = Stage::Finished;
        self.stop = current_time_ms();
        self
    }

    pub fn is_open(&self) -> bool {
        self.stage == Stage::Running
    }

    fn record(&mut self, status: Status, details: Option<StatusDetails>) {
        let merged = self.status.record(status);
        if merged != self.status {
            self.status = merged;
            if details.is_some() {
                self.status_details = details;
            }
        } else if self.status_details.is_none() && merged == status {
            self.status_details = details;
        }
    }

    fn into_result(self, steps: Vec<StepResult>) -> StepResult {
        StepResult {
            uuid: Some(self.uuid),
            name: self.name,
            status: self.status,
            status_details: self.status_details,
            stage: self.stage,
            steps,
            attachments: self.attachments,
            parameters: self.parameters,
            start: self.start,
            stop: self.stop,
        }
    }
}

/// Append-only list of steps with uuid and parent indexes.
#[derive(Debug, Default)]
pub struct StepArena {
    steps: Vec<Step>,
    by_uuid: HashMap<String, StepId>,
    /// Parent uuid to children, in insertion order.
    children: HashMap<String, Vec<StepId>>,
}

impl StepArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step and returns its id.
    pub fn push(&mut self, step: Step) -> StepId {
        let id = StepId(self.steps.len());
        self.by_uuid.insert(step.uuid.clone(), id);
        if let Some(parent) = &step.parent {
            self.children.entry(parent.clone()).or_default().push(id);
        }
        self.steps.push(step);
        id
    }

    pub fn get(&self, id: StepId) -> Option<&Step> {
        self.steps.get(id.0)
    }

    /// The uuid and parent of the returned step must not change; the indexes
    /// were built from them.
    pub(crate) fn get_mut(&mut self, id: StepId) -> Option<&mut Step> {
        self.steps.get_mut(id.0)
    }

    pub fn id_of(&self, uuid: &str) -> Option<StepId> {
        self.by_uuid.get(uuid).copied()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn parent_of(&self, id: StepId) -> Option<StepId> {
        let parent = self.get(id)?.parent.as_deref()?;
        self.id_of(parent).filter(|p| *p != id)
    }

    /// Direct children of `id` in insertion order.
    pub fn children_of(&self, id: StepId) -> Vec<StepId> {
        let Some(step) = self.get(id) else {
            return Vec::new();
        };
        self.children
            .get(&step.uuid)
            .map(|ids| ids.iter().copied().filter(|c| *c != id).collect())
            .unwrap_or_default()
    }

    /// Parent chain of `id`, innermost first. Stops on a parent cycle.
    pub fn ancestors(&self, id: StepId) -> Vec<StepId> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut cursor = self.parent_of(id);
        while let Some(ancestor) = cursor {
            if !seen.insert(ancestor) {
                break;
            }
            chain.push(ancestor);
            cursor = self.parent_of(ancestor);
        }
        chain
    }

    /// Records a status reported directly on a step.
    pub fn record(&mut self, id: StepId, status: Status, details: Option<StatusDetails>) {
        if let Some(step) = self.get_mut(id) {
            step.record(status, details);
        }
    }

    /// Worsens the still-open ancestors of `id` with the step's status.
    ///
    /// Closed ancestors are immutable and are passed over. A skipped ancestor
    /// absorbs the failure: it stays skipped and nothing above it changes.
    pub fn propagate(&mut self, id: StepId) {
        let Some(status) = self.get(id).map(|s| s.status) else {
            return;
        };
        if !status.is_failure() {
            return;
        }
        for ancestor in self.ancestors(id) {
            let Some(step) = self.get_mut(ancestor) else {
                break;
            };
            if step.status == Status::Skipped {
                break;
            }
            if step.is_open() {
                step.status = step.status.worsen(status);
            }
        }
    }

    /// Closes a step.
    ///
    /// The status becomes the worst of its own and its direct children's
    /// (a skipped step stays skipped). `forced` replaces the result, used when
    /// the step's own body panicked. An unresolved status becomes passed.
    pub fn close(&mut self, id: StepId, forced: Option<(Status, Option<StatusDetails>)>) {
        let children: Vec<Status> = self
            .children_of(id)
            .into_iter()
            .filter_map(|c| self.get(c).map(|s| s.status))
            .collect();
        let Some(step) = self.get_mut(id) else {
            return;
        };
        for child in children {
            step.status = step.status.worsen(child);
        }
        if let Some((status, details)) = forced {
            step.status = status;
            if details.is_some() {
                step.status_details = details;
            }
        }
        if !step.status.is_resolved() {
            step.status = Status::Passed;
        }
        step.stage = Stage::Finished;
        step.stop = current_time_ms();
    }

    /// Assembles the nested tree. Children keep insertion order.
    ///
    /// Steps whose parent is unknown to this arena become roots, as do steps
    /// caught in a parent cycle.
    pub fn into_tree(self) -> Vec<StepResult> {
        let count = self.steps.len();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut roots = Vec::new();
        for (i, step) in self.steps.iter().enumerate() {
            match step
                .parent
                .as_deref()
                .and_then(|p| self.by_uuid.get(p))
                .map(|p| p.0)
            {
                Some(p) if p != i => children[p].push(i),
                _ => roots.push(i),
            }
        }

        let mut slots: Vec<Option<Step>> = self.steps.into_iter().map(Some).collect();
        let mut tree = Vec::with_capacity(roots.len());
        for root in roots {
            if let Some(node) = build(root, &children, &mut slots) {
                tree.push(node);
            }
        }
        // Whatever is left sits on a parent cycle; surface it rather than drop it.
        for i in 0..count {
            if slots[i].is_some() {
                if let Some(node) = build(i, &children, &mut slots) {
                    tree.push(node);
                }
            }
        }
        tree
    }
}

fn build(idx: usize, children: &[Vec<usize>], slots: &mut [Option<Step>]) -> Option<StepResult> {
    let mut step = slots[idx].take()?;
    let nested: Vec<StepResult> = children[idx]
        .iter()
        .filter_map(|&c| build(c, children, slots))
        .collect();
    // An async child can resolve after its synchronous parent closed.
    if step.status != Status::Skipped && !step.status.is_failure() {
        if let Some(worst) = nested
            .iter()
            .map(|c| c.status)
            .filter(|s| s.is_failure())
            .max_by_key(|s| s.rank())
        {
            step.status = worst;
        }
    }
    Some(step.into_result(nested))
}
