//! The task → thought → stage tree built from the reasoning stream.
//!
//! Within a client session this tree is append/update-only: thoughts are never
//! removed from a task, stages are never removed from a thought, and a task
//! never leaves the map. The only mutation besides insertion is a
//! last-write-wins overwrite of a stage slot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::StageEvent;
use crate::ids::{TaskId, ThoughtId};
use crate::stage::Stage;

/// One reasoning thought: its id plus the latest event per stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedThought {
    thought_id: ThoughtId,
    stages: BTreeMap<Stage, StageEvent>,
}

impl TrackedThought {
    #[must_use]
    pub fn new(thought_id: ThoughtId) -> Self {
        Self {
            thought_id,
            stages: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn thought_id(&self) -> &ThoughtId {
        &self.thought_id
    }

    /// Store `event` under its stage. Re-delivery of a stage overwrites the
    /// previous event for that stage; it never duplicates.
    pub fn record(&mut self, event: StageEvent) {
        self.stages.insert(event.stage, event);
    }

    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<&StageEvent> {
        self.stages.get(&stage)
    }

    /// Stages received so far, in pipeline order.
    pub fn stages(&self) -> impl Iterator<Item = &StageEvent> {
        self.stages.values()
    }

    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// The furthest pipeline stage this thought has reached.
    #[must_use]
    pub fn latest_stage(&self) -> Option<Stage> {
        self.stages.keys().next_back().copied()
    }
}

/// One assistant task: description, completion flag, and its thoughts in
/// arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedTask {
    task_id: TaskId,
    description: Option<String>,
    completed: bool,
    thoughts: Vec<TrackedThought>,
    first_seen: DateTime<Utc>,
}

impl TrackedTask {
    #[must_use]
    pub fn new(task_id: TaskId, first_seen: DateTime<Utc>) -> Self {
        Self {
            task_id,
            description: None,
            completed: false,
            thoughts: Vec::new(),
            first_seen,
        }
    }

    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn first_seen(&self) -> DateTime<Utc> {
        self.first_seen
    }

    #[must_use]
    pub fn thoughts(&self) -> &[TrackedThought] {
        &self.thoughts
    }

    /// Fold one event into this task.
    ///
    /// `terminal` is the caller's verdict on whether this event's payload
    /// signals a terminal action; it is only honored for `action_result`
    /// events, and `completed` is monotonic - it never reverts to false.
    pub fn absorb(&mut self, event: StageEvent, terminal: bool) {
        if self.description.is_none()
            && let Some(description) = event.description()
        {
            self.description = Some(description.to_owned());
        }

        if event.stage == Stage::ActionResult && terminal {
            self.completed = true;
        }

        // Linear scan: a task holds at most a few dozen thoughts.
        if let Some(thought) = self
            .thoughts
            .iter_mut()
            .find(|t| t.thought_id() == &event.thought_id)
        {
            thought.record(event);
        } else {
            let mut thought = TrackedThought::new(event.thought_id.clone());
            thought.record(event);
            self.thoughts.push(thought);
        }
    }
}

/// An immutable view of all tracked tasks, keyed by task id.
///
/// Each call to the aggregator yields a fresh snapshot; earlier snapshots are
/// never mutated, so `==` on consecutive snapshots is a sound change check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    tasks: BTreeMap<TaskId, TrackedTask>,
}

impl TaskSnapshot {
    #[must_use]
    pub fn new(tasks: BTreeMap<TaskId, TrackedTask>) -> Self {
        Self { tasks }
    }

    #[must_use]
    pub fn get(&self, task_id: &TaskId) -> Option<&TrackedTask> {
        self.tasks.get(task_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TrackedTask> {
        self.tasks.values()
    }

    /// Tasks ordered by when they first appeared on the stream.
    #[must_use]
    pub fn tasks_by_first_seen(&self) -> Vec<&TrackedTask> {
        let mut tasks: Vec<&TrackedTask> = self.tasks.values().collect();
        tasks.sort_by_key(|t| t.first_seen());
        tasks
    }
}
