//! Folding raw stream records into the task tree.

use std::collections::BTreeMap;

use chrono::Utc;

use lumen_types::{
    RawStreamRecord, Stage, StageEvent, StreamSettings, TaskId, TaskSnapshot, TrackedTask,
};

/// Folds batches of raw records into tasks and hands out immutable snapshots.
///
/// Skippable conditions (unknown stage name, missing ids) are logged at debug
/// and never fail a batch. The terminal-action predicate comes from
/// [`StreamSettings`]; it is consulted for `action_result` events only, and a
/// task's `completed` flag never reverts.
#[derive(Debug)]
pub struct TaskAggregator {
    tasks: BTreeMap<TaskId, TrackedTask>,
    settings: StreamSettings,
}

impl TaskAggregator {
    #[must_use]
    pub fn new(settings: StreamSettings) -> Self {
        Self {
            tasks: BTreeMap::new(),
            settings,
        }
    }

    /// Fold one batch, in order, and return a fresh snapshot.
    ///
    /// Snapshots are detached clones: applying later batches never mutates a
    /// snapshot already handed out, so `==` between consecutive snapshots is
    /// a sound "anything changed?" check.
    pub fn apply(&mut self, batch: &[RawStreamRecord]) -> TaskSnapshot {
        for record in batch {
            self.apply_one(record);
        }
        self.snapshot()
    }

    fn apply_one(&mut self, record: &RawStreamRecord) {
        let event = match StageEvent::from_record(record, Utc::now()) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(%e, event = %record.event, "Skipping stream record");
                return;
            }
        };

        let terminal = event.stage == Stage::ActionResult && self.is_terminal(&event);

        let task = self
            .tasks
            .entry(event.task_id.clone())
            .or_insert_with(|| TrackedTask::new(event.task_id.clone(), event.timestamp));
        task.absorb(event, terminal);
    }

    fn is_terminal(&self, event: &StageEvent) -> bool {
        // Substring match over the serialized payload: the action marker can
        // sit at any depth and the patterns are operator-configurable.
        let payload_text = event.payload.to_string();
        self.settings.is_terminal_action(&payload_text)
    }

    /// The current tree as a detached snapshot.
    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot::new(self.tasks.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use lumen_types::{RawStreamRecord, Stage, StreamSettings, TaskId};

    use super::TaskAggregator;

    fn aggregator() -> TaskAggregator {
        TaskAggregator::new(StreamSettings::default())
    }

    fn record(event: &str, thought: &str, task: &str) -> RawStreamRecord {
        RawStreamRecord::new(event, json!({ "thought_id": thought, "task_id": task }))
    }

    fn with_field(mut record: RawStreamRecord, key: &str, value: serde_json::Value) -> RawStreamRecord {
        record.payload[key] = value;
        record
    }

    #[test]
    fn builds_task_thought_stage_tree() {
        let mut agg = aggregator();
        let snapshot = agg.apply(&[
            record("thought_start", "h1", "t1"),
            record("planning", "h1", "t1"),
            record("step_update", "h2", "t1"),
        ]);

        let task = snapshot.get(&TaskId::new("t1")).unwrap();
        assert_eq!(task.thoughts().len(), 2);
        assert_eq!(task.thoughts()[0].stage_count(), 2);
        assert!(task.thoughts()[0].stage(Stage::Planning).is_some());
    }

    #[test]
    fn reapplying_a_seen_event_is_idempotent() {
        let mut agg = aggregator();
        let rec = record("step_update", "h1", "t1");
        let first = agg.apply(std::slice::from_ref(&rec));
        let second = agg.apply(std::slice::from_ref(&rec));

        let task = second.get(&TaskId::new("t1")).unwrap();
        assert_eq!(task.thoughts().len(), 1);
        assert_eq!(task.thoughts()[0].stage_count(), 1);
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn stage_insertion_is_commutative() {
        let records = [
            record("thought_start", "h1", "t1"),
            record("planning", "h1", "t1"),
            record("step_update", "h1", "t1"),
            record("conclusion", "h1", "t1"),
        ];

        let mut forward = aggregator();
        let forward_snap = forward.apply(&records);

        let mut reversed = aggregator();
        let mut rev = records.to_vec();
        rev.reverse();
        let reversed_snap = reversed.apply(&rev);

        let a = forward_snap.get(&TaskId::new("t1")).unwrap();
        let b = reversed_snap.get(&TaskId::new("t1")).unwrap();
        let stages_a: Vec<Stage> = a.thoughts()[0].stages().map(|e| e.stage).collect();
        let stages_b: Vec<Stage> = b.thoughts()[0].stages().map(|e| e.stage).collect();
        assert_eq!(stages_a, stages_b);
    }

    #[test]
    fn unknown_stages_and_missing_ids_are_skipped() {
        let mut agg = aggregator();
        let snapshot = agg.apply(&[
            RawStreamRecord::new("telemetry", json!({"thought_id": "h1", "task_id": "t1"})),
            RawStreamRecord::new("planning", json!({"task_id": "t1"})),
            RawStreamRecord::new("planning", json!({"thought_id": "h1"})),
        ]);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn terminal_action_result_completes_the_task() {
        let mut agg = aggregator();
        let terminal = with_field(
            record("action_result", "h1", "t1"),
            "action",
            json!("task_complete"),
        );
        let snapshot = agg.apply(&[terminal]);
        assert!(snapshot.get(&TaskId::new("t1")).unwrap().completed());
    }

    #[test]
    fn completion_is_monotonic_across_batches() {
        let mut agg = aggregator();
        let terminal = with_field(
            record("action_result", "h1", "t1"),
            "action",
            json!("task_reject"),
        );
        agg.apply(&[terminal]);

        // A later batch with only non-terminal events cannot un-complete it.
        let snapshot = agg.apply(&[
            record("step_update", "h1", "t1"),
            with_field(record("action_result", "h2", "t1"), "action", json!("continue")),
        ]);
        assert!(snapshot.get(&TaskId::new("t1")).unwrap().completed());
    }

    #[test]
    fn terminal_marker_on_other_stage_does_not_complete() {
        let mut agg = aggregator();
        let snapshot = agg.apply(&[with_field(
            record("step_update", "h1", "t1"),
            "note",
            json!("task_complete"),
        )]);
        assert!(!snapshot.get(&TaskId::new("t1")).unwrap().completed());
    }

    #[test]
    fn earlier_snapshots_are_not_mutated_by_later_batches() {
        let mut agg = aggregator();
        let first = agg.apply(&[record("thought_start", "h1", "t1")]);
        let before = first.clone();

        let second = agg.apply(&[record("planning", "h1", "t1")]);
        assert_eq!(first, before);
        assert_ne!(first, second);
    }

    #[test]
    fn first_description_wins() {
        let mut agg = aggregator();
        let snapshot = agg.apply(&[
            with_field(record("thought_start", "h1", "t1"), "description", json!("first")),
            with_field(record("planning", "h1", "t1"), "description", json!("second")),
        ]);
        assert_eq!(
            snapshot.get(&TaskId::new("t1")).unwrap().description(),
            Some("first")
        );
    }
}
