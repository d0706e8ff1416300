//! Join scope for asynchronous steps.
//!
//! Every phase owns one [`TaskScope`] and every async step owns another for
//! the async steps it launches itself. A phase boundary calls
//! [`TaskScope::join`], which only returns once nothing is outstanding.

use std::sync::{Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::error::AllureResult;
use crate::sync::lock;

#[derive(Debug)]
pub struct TaskScope {
    name: String,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `task` on a new OS thread named after `name` and registers it
    /// with this scope.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F) -> AllureResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let handle = thread::Builder::new()
            .name(thread_name(&name))
            .spawn(task)?;
        tracing::trace!(scope = %self.name, task = %name, "spawned async task");
        self.lock().push(handle);
        Ok(())
    }

    /// Number of registered tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Waits for every registered task, including ones registered while
    /// waiting. Returns how many tasks ended in an uncaught panic.
    pub fn join(&self) -> usize {
        let mut panicked = 0;
        loop {
            let batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                if handle.join().is_err() {
                    panicked += 1;
                }
            }
        }
        if panicked > 0 {
            tracing::warn!(scope = %self.name, panicked, "async tasks ended in a panic");
        }
        panicked
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        lock(&self.handles)
    }
}

/// `name` made acceptable to [`thread::Builder::name`], which panics on
/// interior NUL bytes.
pub fn thread_name(name: &str) -> String {
    name.replace('\0', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_join_waits_for_all_tasks() {
        let scope = TaskScope::new("phase");
        let done = Arc::new(AtomicUsize::new(0));
        for delay in [30u64, 5, 15] {
            let done = Arc::clone(&done);
            scope
                .spawn(format!("sleep-{delay}"), move || {
                    thread::sleep(Duration::from_millis(delay));
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        assert_eq!(scope.join(), 0);
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(scope.pending(), 0);
    }

    #[test]
    fn test_join_picks_up_tasks_registered_while_waiting() {
        let scope = Arc::new(TaskScope::new("phase"));
        let done = Arc::new(AtomicUsize::new(0));

        let inner_scope = Arc::clone(&scope);
        let inner_done = Arc::clone(&done);
        scope
            .spawn("outer", move || {
                thread::sleep(Duration::from_millis(10));
                let done = Arc::clone(&inner_done);
                inner_scope
                    .spawn("late", move || {
                        thread::sleep(Duration::from_millis(10));
                        done.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                inner_done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        scope.join();
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_join_counts_panicked_tasks() {
        let scope = TaskScope::new("phase");
        scope.spawn("boom", || panic!("task failed")).unwrap();
        scope.spawn("fine", || {}).unwrap();
        assert_eq!(scope.join(), 1);
    }

    #[test]
    fn test_thread_carries_task_name() {
        let scope = TaskScope::new("phase");
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        scope
            .spawn("fetch user", move || {
                *slot.lock().unwrap() = thread::current().name().map(str::to_string);
            })
            .unwrap();
        scope.join();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("fetch user"));
    }

    #[test]
    fn test_spawn_accepts_name_with_nul() {
        let scope = TaskScope::new("phase");
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        scope
            .spawn("bad\0name", move || {
                *slot.lock().unwrap() = thread::current().name().map(str::to_string);
            })
            .unwrap();
        assert_eq!(scope.join(), 0);
        assert_eq!(seen.lock().unwrap().as_deref(), Some("badname"));
        assert_eq!(thread_name("plain"), "plain");
    }
}
