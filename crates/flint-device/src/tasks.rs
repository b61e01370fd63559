//! Device task monitoring.
//!
//! Task completion and abort notifications arrive on the transport-receive
//! thread and are applied to per-task entries under a single lock over the
//! active-task list. The callback path never enters the compiler and never
//! blocks. For any one task, updates apply in receive order; between tasks
//! no ordering is promised.

use std::sync::Mutex;

use indexmap::IndexMap;
use tracing::debug;

use flint_compiler::ExecutionSet;
use flint_image::Token;

/// Runtime abort kinds the device reports.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExceptionKind {
    IndexOutOfRange,
    DivideByZero,
    OutOfMemory,
    NullReference,
    InvalidCast,
    /// Device-specific kind the host does not model.
    Other(u16),
}

impl ExceptionKind {
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::IndexOutOfRange,
            2 => Self::DivideByZero,
            3 => Self::OutOfMemory,
            4 => Self::NullReference,
            5 => Self::InvalidCast,
            other => Self::Other(other),
        }
    }
}

/// Where one task currently stands.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TaskState {
    Running,
    Completed { result: u32 },
    Aborted {
        kind: ExceptionKind,
        /// Method tokens, innermost frame first.
        stack: Vec<Token>,
    },
    Killed,
}

/// A state notification from the device.
#[derive(Clone, Debug)]
pub enum TaskUpdate {
    Completed { task: u32, result: u32 },
    Aborted {
        task: u32,
        kind: ExceptionKind,
        stack: Vec<Token>,
    },
    Killed { task: u32 },
}

impl TaskUpdate {
    fn task(&self) -> u32 {
        match self {
            Self::Completed { task, .. } | Self::Aborted { task, .. } | Self::Killed { task } => {
                *task
            }
        }
    }
}

#[derive(Debug)]
struct TaskEntry {
    state: TaskState,
    updates: u32,
}

/// The active-task list, shared between the compile/upload thread and the
/// transport-receive thread.
#[derive(Default, Debug)]
pub struct TaskMonitor {
    tasks: Mutex<IndexMap<u32, TaskEntry>>,
}

impl TaskMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task the host just asked the device to execute.
    pub fn begin(&self, task: u32) {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.insert(
            task,
            TaskEntry {
                state: TaskState::Running,
                updates: 0,
            },
        );
    }

    /// Apply one notification. Called from the receive thread; takes the
    /// lock, never blocks on anything else.
    pub fn apply(&self, update: TaskUpdate) {
        let id = update.task();
        let mut tasks = self.tasks.lock().unwrap();
        let entry = tasks.entry(id).or_insert(TaskEntry {
            state: TaskState::Running,
            updates: 0,
        });
        entry.updates += 1;
        entry.state = match update {
            TaskUpdate::Completed { result, .. } => TaskState::Completed { result },
            TaskUpdate::Aborted { kind, stack, .. } => TaskState::Aborted { kind, stack },
            TaskUpdate::Killed { .. } => TaskState::Killed,
        };
        debug!(task = id, updates = entry.updates, "task state applied");
    }

    /// Current state of a task.
    pub fn state(&self, task: u32) -> Option<TaskState> {
        self.tasks.lock().unwrap().get(&task).map(|e| e.state.clone())
    }

    /// How many notifications a task has received.
    pub fn update_count(&self, task: u32) -> u32 {
        self.tasks
            .lock()
            .unwrap()
            .get(&task)
            .map_or(0, |e| e.updates)
    }

    /// Drop completed and killed tasks from the list.
    pub fn prune(&self) {
        self.tasks
            .lock()
            .unwrap()
            .retain(|_, e| matches!(e.state, TaskState::Running | TaskState::Aborted { .. }));
    }

    /// Render an abort stack as names, using the set's inverse lookup.
    pub fn decode_stack(set: &ExecutionSet, stack: &[Token]) -> Vec<String> {
        stack
            .iter()
            .map(|&tok| set.token_name(tok).unwrap_or_else(|| tok.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn updates_apply_in_receive_order() {
        let monitor = TaskMonitor::new();
        monitor.begin(1);
        monitor.apply(TaskUpdate::Aborted {
            task: 1,
            kind: ExceptionKind::DivideByZero,
            stack: vec![],
        });
        monitor.apply(TaskUpdate::Killed { task: 1 });
        assert_eq!(monitor.state(1), Some(TaskState::Killed));
        assert_eq!(monitor.update_count(1), 2);
    }

    #[test]
    fn unknown_task_notification_creates_entry() {
        let monitor = TaskMonitor::new();
        monitor.apply(TaskUpdate::Completed { task: 9, result: 1 });
        assert_eq!(monitor.state(9), Some(TaskState::Completed { result: 1 }));
    }

    #[test]
    fn abort_carries_kind_and_stack() {
        let monitor = TaskMonitor::new();
        monitor.begin(3);
        let frame = Token::new(flint_image::TokenKind::Method, 4);
        monitor.apply(TaskUpdate::Aborted {
            task: 3,
            kind: ExceptionKind::IndexOutOfRange,
            stack: vec![frame],
        });
        match monitor.state(3) {
            Some(TaskState::Aborted { kind, stack }) => {
                assert_eq!(kind, ExceptionKind::IndexOutOfRange);
                assert_eq!(stack, vec![frame]);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn exception_kinds_decode_from_codes() {
        assert_eq!(ExceptionKind::from_code(2), ExceptionKind::DivideByZero);
        assert_eq!(ExceptionKind::from_code(3), ExceptionKind::OutOfMemory);
        assert_eq!(ExceptionKind::from_code(77), ExceptionKind::Other(77));
    }

    #[test]
    fn prune_keeps_running_and_aborted() {
        let monitor = TaskMonitor::new();
        monitor.begin(1);
        monitor.begin(2);
        monitor.apply(TaskUpdate::Completed { task: 2, result: 0 });
        monitor.begin(3);
        monitor.apply(TaskUpdate::Aborted {
            task: 3,
            kind: ExceptionKind::OutOfMemory,
            stack: vec![],
        });
        monitor.prune();
        assert!(monitor.state(1).is_some());
        assert!(monitor.state(2).is_none());
        assert!(monitor.state(3).is_some());
    }

    #[test]
    fn receive_thread_and_host_thread_share_the_monitor() {
        let monitor = Arc::new(TaskMonitor::new());
        monitor.begin(5);
        let receiver = {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || {
                monitor.apply(TaskUpdate::Completed { task: 5, result: 42 });
            })
        };
        receiver.join().unwrap();
        assert_eq!(monitor.state(5), Some(TaskState::Completed { result: 42 }));
    }
}
