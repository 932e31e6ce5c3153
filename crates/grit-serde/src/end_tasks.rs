//! Deferred work of a read.
//!
//! Documents are read in one streaming pass, so a reference may name an
//! object that appears later in the document. Readers register a task over
//! the raw id instead of resolving it on the spot; the orchestrator drains
//! the queue once the structure is complete, one phase at a time.

use std::fmt;

use grit_core::{GritResult, Network};

/// When a task runs relative to the extension block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    BeforeExtensions,
    AfterExtensions,
}

pub type EndTask = Box<dyn FnOnce(&mut Network) -> GritResult<()>>;

struct Entry {
    phase: Phase,
    /// `None` once executed.
    task: Option<EndTask>,
}

/// Ordered queue of tasks tagged with a phase. Each task runs exactly once.
#[derive(Default)]
pub struct EndTaskQueue {
    entries: Vec<Entry>,
}

impl EndTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, phase: Phase, task: impl FnOnce(&mut Network) -> GritResult<()> + 'static) {
        self.entries.push(Entry {
            phase,
            task: Some(Box::new(task)),
        });
    }

    /// Runs the pending tasks of `phase` in registration order and returns
    /// how many ran. Stops at the first failing task.
    pub fn execute(&mut self, network: &mut Network, phase: Phase) -> GritResult<usize> {
        let mut executed = 0;
        for entry in self.entries.iter_mut().filter(|e| e.phase == phase) {
            if let Some(task) = entry.task.take() {
                task(network)?;
                executed += 1;
            }
        }
        if executed > 0 {
            tracing::debug!(?phase, executed, "end tasks executed");
        }
        Ok(executed)
    }

    pub fn pending(&self, phase: Phase) -> usize {
        self.entries
            .iter()
            .filter(|e| e.phase == phase && e.task.is_some())
            .count()
    }
}

impl fmt::Debug for EndTaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndTaskQueue")
            .field("before_extensions", &self.pending(Phase::BeforeExtensions))
            .field("after_extensions", &self.pending(Phase::AfterExtensions))
            .finish()
    }
}
