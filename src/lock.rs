//! Reader-preferred shared lock.
//!
//! Any number of readers may hold the lock at once. A writer holds it
//! exclusively. Readers are admitted whenever no writer is *active*, even if
//! writers are waiting, so a steady stream of readers can starve a writer.
//! That trade-off suits the registries this lock guards: lookups are
//! constant, registration is rare.
//!
//! Admission is decided by a small state record behind a [`Mutex`] with one
//! [`Condvar`]. The value itself sits in a [`RwLock`] that is only locked
//! after admission, so it never blocks and never sees a queued writer. The
//! state mutex is never held while user code runs, so poisoning is ignored.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{
    Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer_active: bool,
    writers_waiting: usize,
}

#[derive(Debug, Default)]
struct Admission {
    state: Mutex<LockState>,
    changed: Condvar,
}

impl Admission {
    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, LockState>) -> MutexGuard<'a, LockState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn enter_read(&self) -> ReadTicket<'_> {
        let mut state = self.state();
        while state.writer_active {
            state = self.wait(state);
        }
        state.readers += 1;
        ReadTicket { admission: self }
    }

    fn enter_write(&self) -> WriteTicket<'_> {
        let mut state = self.state();
        state.writers_waiting += 1;
        while state.writer_active || state.readers > 0 {
            state = self.wait(state);
        }
        state.writers_waiting -= 1;
        state.writer_active = true;
        WriteTicket { admission: self }
    }

    fn try_enter_write(&self) -> Option<WriteTicket<'_>> {
        let mut state = self.state();
        if state.writer_active || state.readers > 0 {
            return None;
        }
        state.writer_active = true;
        Some(WriteTicket { admission: self })
    }
}

/// Admission of one reader; released on drop.
struct ReadTicket<'a> {
    admission: &'a Admission,
}

impl Drop for ReadTicket<'_> {
    fn drop(&mut self) {
        let mut state = self.admission.state();
        state.readers -= 1;
        let wake = state.readers == 0 && state.writers_waiting > 0;
        drop(state);
        if wake {
            self.admission.changed.notify_all();
        }
    }
}

/// Admission of the writer; released on drop.
struct WriteTicket<'a> {
    admission: &'a Admission,
}

impl Drop for WriteTicket<'_> {
    fn drop(&mut self) {
        self.admission.state().writer_active = false;
        self.admission.changed.notify_all();
    }
}

/// Many readers or one writer, readers first.
pub struct SharedLock<T: ?Sized> {
    admission: Admission,
    value: RwLock<T>,
}

impl<T> SharedLock<T> {
    /// Wrap `value`.
    pub fn new(value: T) -> Self {
        Self {
            admission: Admission::default(),
            value: RwLock::new(value),
        }
    }

    /// Unwrap the value.
    pub fn into_inner(self) -> T {
        self.value
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: ?Sized> SharedLock<T> {
    /// Acquire shared access, blocking only while a writer is active.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let ticket = self.admission.enter_read();
        ReadGuard {
            value: self.value.read().unwrap_or_else(PoisonError::into_inner),
            _ticket: ticket,
        }
    }

    /// Acquire exclusive access, blocking until no reader or writer holds
    /// the lock.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let ticket = self.admission.enter_write();
        WriteGuard {
            value: self.value.write().unwrap_or_else(PoisonError::into_inner),
            _ticket: ticket,
        }
    }

    /// Exclusive access if it is free right now.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        let ticket = self.admission.try_enter_write()?;
        Some(WriteGuard {
            value: self.value.write().unwrap_or_else(PoisonError::into_inner),
            _ticket: ticket,
        })
    }

    /// Mutable access through a unique borrow; no locking needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.value
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Writers currently blocked in [`write`](Self::write).
    pub fn writers_waiting(&self) -> usize {
        self.admission.state().writers_waiting
    }
}

impl<T: Default> Default for SharedLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for SharedLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.admission.state();
        f.debug_struct("SharedLock")
            .field("readers", &state.readers)
            .field("writer_active", &state.writer_active)
            .field("writers_waiting", &state.writers_waiting)
            .finish_non_exhaustive()
    }
}

// Guard fields drop in declaration order: the value lock is released
// before the ticket lets the next writer in.

/// Shared access; released on drop.
pub struct ReadGuard<'a, T: ?Sized> {
    value: RwLockReadGuard<'a, T>,
    _ticket: ReadTicket<'a>,
}

impl<T: ?Sized> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Exclusive access; released on drop.
pub struct WriteGuard<'a, T: ?Sized> {
    value: RwLockWriteGuard<'a, T>,
    _ticket: WriteTicket<'a>,
}

impl<T: ?Sized> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: ?Sized> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}
