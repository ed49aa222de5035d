//! Task Set - factories for a fresh run
//!
//! Routines may hold run-local state (a counter, a mutex, a channel), so a
//! run can never reuse the routines of a previous one. A [`TaskSet`] keeps
//! the recipe instead:
//!
//! ```text
//! setup()            → S                 (fresh shared state per run)
//! factory_n(&S)      → routine_n         (one per task slot, slot n = Task(n))
//! observe(&S)        → O                 (final state of a completed run)
//! ```
//!
//! # Example
//!
//! ```rust
//! use simsched::domain::scheduler::TaskSet;
//! use simsched::domain::sync::Mutex;
//! use simsched::domain::task::TaskContext;
//!
//! let tasks = TaskSet::new(|| Mutex::new("M"))
//!     .task(|m: &Mutex| {
//!         let m = m.clone();
//!         move |cx: &TaskContext| {
//!             m.acquire(cx)?;
//!             m.release(cx)
//!         }
//!     })
//!     .observe(|m: &Mutex| m.is_locked());
//!
//! assert_eq!(tasks.len(), 1);
//! ```

use crate::domain::task::{Routine, TaskContext, TaskResult};

use super::types::ConfigError;

type Setup<S> = Box<dyn Fn() -> S>;
type Factory<S> = Box<dyn Fn(&S) -> Routine>;
type Observer<S, O> = Box<dyn Fn(&S) -> O>;

/// Recipe for the tasks of one run
pub struct TaskSet<S, O = ()> {
    setup: Setup<S>,
    factories: Vec<Factory<S>>,
    observe: Observer<S, O>,
}

impl<S: 'static> TaskSet<S, ()> {
    /// Start a task set whose runs share state built by `setup`
    pub fn new(setup: impl Fn() -> S + 'static) -> Self {
        Self {
            setup: Box::new(setup),
            factories: Vec::new(),
            observe: Box::new(|_| ()),
        }
    }
}

impl TaskSet<(), ()> {
    /// Task set without shared state
    pub fn stateless() -> Self {
        Self::new(|| ())
    }

    /// Add a task from a zero-argument factory
    pub fn routine<F, R>(self, factory: F) -> Self
    where
        F: Fn() -> R + 'static,
        R: FnOnce(&TaskContext) -> TaskResult + Send + 'static,
    {
        self.task(move |_: &()| factory())
    }
}

impl<S: 'static, O: 'static> TaskSet<S, O> {
    /// Add a task slot
    ///
    /// `factory` runs once per run and must return a routine that owns
    /// everything it touches (clone primitive handles out of `S`).
    pub fn task<F, R>(mut self, factory: F) -> Self
    where
        F: Fn(&S) -> R + 'static,
        R: FnOnce(&TaskContext) -> TaskResult + Send + 'static,
    {
        self.factories
            .push(Box::new(move |state: &S| -> Routine { Box::new(factory(state)) }));
        self
    }

    /// Add `count` task slots built by the same factory
    ///
    /// The factory receives the slot's position within this group.
    pub fn tasks<F, R>(mut self, count: usize, factory: F) -> Self
    where
        F: Fn(&S, usize) -> R + Clone + 'static,
        R: FnOnce(&TaskContext) -> TaskResult + Send + 'static,
    {
        for n in 0..count {
            let factory = factory.clone();
            self = self.task(move |state: &S| factory(state, n));
        }
        self
    }

    /// Replace the observation hook
    pub fn observe<P: 'static>(self, observe: impl Fn(&S) -> P + 'static) -> TaskSet<S, P> {
        TaskSet {
            setup: self.setup,
            factories: self.factories,
            observe: Box::new(observe),
        }
    }

    /// Number of task slots
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no task slot was added
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Reject an empty task set
    ///
    /// # Errors
    /// [`ConfigError::NoTasks`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.factories.is_empty() {
            return Err(ConfigError::NoTasks);
        }
        Ok(())
    }

    /// Build fresh state and routines for one run
    pub(crate) fn instantiate(&self) -> (S, Vec<Routine>) {
        let state = (self.setup)();
        let routines = self.factories.iter().map(|factory| factory(&state)).collect();
        (state, routines)
    }

    pub(crate) fn observe_state(&self, state: &S) -> O {
        (self.observe)(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sync::SharedCell;

    #[test]
    fn test_empty_set_is_rejected() {
        let tasks = TaskSet::stateless();
        assert!(tasks.is_empty());
        assert_eq!(tasks.validate(), Err(ConfigError::NoTasks));
    }

    #[test]
    fn test_instantiate_builds_fresh_state() {
        let tasks = TaskSet::new(|| SharedCell::new(0u32))
            .task(|cell: &SharedCell<u32>| {
                cell.update(|v| *v += 1);
                |_: &TaskContext| Ok(())
            })
            .observe(|cell: &SharedCell<u32>| cell.get());

        let (first, routines) = tasks.instantiate();
        assert_eq!(routines.len(), 1);
        assert_eq!(tasks.observe_state(&first), 1);

        let (second, _) = tasks.instantiate();
        assert_eq!(tasks.observe_state(&second), 1);
        assert_eq!(tasks.observe_state(&first), 1);
    }

    #[test]
    fn test_tasks_group_positions() {
        let tasks = TaskSet::new(|| SharedCell::new(Vec::<usize>::new()))
            .tasks(3, |seen: &SharedCell<Vec<usize>>, n| {
                seen.update(|v| v.push(n));
                |_: &TaskContext| Ok(())
            })
            .observe(|seen: &SharedCell<Vec<usize>>| seen.get());

        assert_eq!(tasks.len(), 3);
        let (state, _) = tasks.instantiate();
        assert_eq!(tasks.observe_state(&state), vec![0, 1, 2]);
    }

    #[test]
    fn test_stateless_routines() {
        let tasks = TaskSet::stateless()
            .routine(|| |cx: &TaskContext| cx.yield_now())
            .routine(|| |_: &TaskContext| Ok(()));
        assert_eq!(tasks.len(), 2);
        assert!(tasks.validate().is_ok());
    }
}
