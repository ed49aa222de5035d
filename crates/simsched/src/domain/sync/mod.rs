//! Synchronization Primitives
//!
//! Every blocking operation is a [`TrapAction`](crate::domain::task::TrapAction)
//! that mutates the primitive's own state and reports which tasks block or
//! wake. None of them know anything about scheduling policy, and none of
//! them make random choices.
//!
//! | Primitive       | Traps                                   |
//! |-----------------|-----------------------------------------|
//! | [`Mutex`]       | `acquire`, `try_acquire`, `release`     |
//! | [`Semaphore`]   | `acquire`, `release`                    |
//! | [`Condvar`]     | `wait`, `notify_one`, `notify_all`      |
//! | [`Channel`]     | `send`, `recv`, `try_recv`              |
//! | [`SharedCell`]  | none (plain shared value)               |
//!
//! Primitive state sits behind `parking_lot` locks only so handles can be
//! `Send`; the lock is never contended because one task runs at a time.

mod cell;
mod channel;
mod condvar;
mod mutex;
mod semaphore;

pub use cell::SharedCell;
pub use channel::Channel;
pub use condvar::Condvar;
pub use mutex::Mutex;
pub use semaphore::Semaphore;
