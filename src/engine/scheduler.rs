//! Deferred engine work keyed on the backend clock.
//!
//! Replaces timer callbacks: the engine pushes a task with a due time and
//! drains whatever is due at the start of each tick, so deferred work runs on
//! the engine thread and is deterministic under a manual clock.

use super::backend::EmitterId;

#[derive(Debug, Clone, PartialEq)]
pub enum DeferredTask {
    /// End of a beep pulse for the sound instance `serial`
    ClearBeep { id: String, serial: u64 },
    /// Stop and free an emitter after its fade-out; `attempt` counts from 1
    ReleaseEmitter {
        id: String,
        emitter: EmitterId,
        attempt: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Scheduled {
    due: f64,
    seq: u64,
    task: DeferredTask,
}

/// Queue ordered by due time, FIFO among equal times.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: Vec<Scheduled>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: f64, task: DeferredTask) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let index = self
            .queue
            .partition_point(|entry| (entry.due, entry.seq) <= (due, seq));
        self.queue.insert(index, Scheduled { due, seq, task });
    }

    /// Remove and return every task due at or before `now`.
    pub fn pop_due(&mut self, now: f64) -> Vec<DeferredTask> {
        let due = self.queue.partition_point(|entry| entry.due <= now);
        self.queue.drain(..due).map(|entry| entry.task).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Due time of the earliest pending task.
    pub fn next_due(&self) -> Option<f64> {
        self.queue.first().map(|entry| entry.due)
    }
}
