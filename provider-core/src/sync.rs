//! Locking helpers shared by the engine and the runner.

use std::sync::{Mutex, MutexGuard};

/// Locks `mutex`, recovering the data from a poisoned lock.
///
/// Panics in user bodies are caught at step and phase boundaries, so a
/// poisoned lock only means a panic unwound past a guard; the data it
/// protects is still consistent.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Consumes `mutex`, recovering the data from a poisoned lock.
pub fn into_inner<T>(mutex: Mutex<T>) -> T {
    mutex.into_inner().unwrap_or_else(|e| e.into_inner())
}
