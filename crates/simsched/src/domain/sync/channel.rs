//! Simulated unbounded channel
//!
//! `send` never blocks. If a receiver is already parked, the value skips the
//! buffer and travels to the oldest receiver as its wake payload; otherwise
//! it is buffered. `recv` takes from the buffer or parks.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex as StateLock;

use crate::domain::task::{
    Interrupt, TaskContext, TaskId, TaskResult, TrapAction, TrapEffect, TrapLabel, UsageFault,
    Wake,
};

struct ChannelState<T> {
    buffer: VecDeque<T>,
    receivers: VecDeque<TaskId>,
}

struct ChannelShared<T> {
    label: Arc<str>,
    state: StateLock<ChannelState<T>>,
}

/// Multi-producer multi-consumer FIFO shared by the tasks of one run
pub struct Channel<T> {
    shared: Arc<ChannelShared<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Channel<T> {
    /// Create an empty channel
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                label: Arc::from(label.into()),
                state: StateLock::new(ChannelState {
                    buffer: VecDeque::new(),
                    receivers: VecDeque::new(),
                }),
            }),
        }
    }

    /// Enqueue a value
    pub fn send(&self, cx: &TaskContext, value: T) -> TaskResult {
        cx.trap(Push {
            shared: Arc::clone(&self.shared),
            value,
        })
        .map(|_| ())
    }

    /// Dequeue a value, blocking while the channel is empty
    pub fn recv(&self, cx: &TaskContext) -> TaskResult<T> {
        let payload = cx.trap(Pop {
            shared: Arc::clone(&self.shared),
            blocking: true,
        })?;
        match payload.and_then(|p| p.downcast::<T>().ok()) {
            Some(value) => Ok(*value),
            None => Err(Interrupt::Failed(format!(
                "{} delivered no value",
                self.shared.label
            ))),
        }
    }

    /// Dequeue a value if one is buffered; never blocks
    pub fn try_recv(&self, cx: &TaskContext) -> TaskResult<Option<T>> {
        let payload = cx.trap(Pop {
            shared: Arc::clone(&self.shared),
            blocking: false,
        })?;
        Ok(payload.and_then(|p| p.downcast::<T>().ok()).map(|value| *value))
    }

    /// Number of buffered values
    pub fn len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().buffer.is_empty()
    }

    /// Receivers parked on the channel, oldest first
    pub fn receivers(&self) -> Vec<TaskId> {
        self.shared.state.lock().receivers.iter().copied().collect()
    }
}

impl<T: Clone + Send + 'static> Channel<T> {
    /// Snapshot of the buffered values, oldest first
    pub fn buffered(&self) -> Vec<T> {
        self.shared.state.lock().buffer.iter().cloned().collect()
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Channel")
            .field("label", &self.shared.label)
            .field("buffered", &state.buffer.len())
            .field("receivers", &state.receivers)
            .finish()
    }
}

struct Push<T> {
    shared: Arc<ChannelShared<T>>,
    value: T,
}

impl<T: Send + 'static> TrapAction for Push<T> {
    fn label(&self) -> TrapLabel {
        TrapLabel::new("send", &self.shared.label)
    }

    fn apply(self: Box<Self>, _caller: TaskId) -> Result<TrapEffect, UsageFault> {
        let Push { shared, value } = *self;
        let mut state = shared.state.lock();
        match state.receivers.pop_front() {
            Some(receiver) => {
                Ok(TrapEffect::proceed().waking(Wake::with_payload(receiver, Box::new(value))))
            }
            None => {
                state.buffer.push_back(value);
                Ok(TrapEffect::proceed())
            }
        }
    }
}

struct Pop<T> {
    shared: Arc<ChannelShared<T>>,
    blocking: bool,
}

impl<T: Send + 'static> TrapAction for Pop<T> {
    fn label(&self) -> TrapLabel {
        let op = if self.blocking { "recv" } else { "try_recv" };
        TrapLabel::new(op, &self.shared.label)
    }

    fn apply(self: Box<Self>, caller: TaskId) -> Result<TrapEffect, UsageFault> {
        let mut state = self.shared.state.lock();
        match state.buffer.pop_front() {
            Some(value) => Ok(TrapEffect::reply(Box::new(value))),
            None if self.blocking => {
                state.receivers.push_back(caller);
                Ok(TrapEffect::block())
            }
            None => Ok(TrapEffect::proceed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scheduler::{simulate, RunConfig, TaskSet};
    use crate::domain::sync::SharedCell;

    type Pipe = (Channel<u32>, SharedCell<Vec<u32>>);

    fn pipe() -> Pipe {
        (Channel::new("ch"), SharedCell::new(Vec::new()))
    }

    #[test]
    fn test_values_arrive_in_order() {
        let tasks = TaskSet::new(pipe)
            .task(|(ch, _): &Pipe| {
                let ch = ch.clone();
                move |cx: &TaskContext| {
                    for v in 1..=3 {
                        ch.send(cx, v)?;
                    }
                    Ok(())
                }
            })
            .task(|(ch, got): &Pipe| {
                let (ch, got) = (ch.clone(), got.clone());
                move |cx: &TaskContext| {
                    for _ in 0..3 {
                        let v = ch.recv(cx)?;
                        got.update(|g| g.push(v));
                    }
                    Ok(())
                }
            })
            .observe(|(ch, got): &Pipe| (ch.len(), got.get()));

        for seed in 0..50 {
            let record = simulate(&tasks, &RunConfig::default(), seed).unwrap();
            assert_eq!(record.outcome.state(), Some(&(0, vec![1, 2, 3])), "seed {}", seed);
        }
    }

    #[test]
    fn test_recv_on_empty_channel_deadlocks() {
        let tasks = TaskSet::new(pipe).task(|(ch, _): &Pipe| {
            let ch = ch.clone();
            move |cx: &TaskContext| ch.recv(cx).map(|_| ())
        });
        let record = simulate(&tasks, &RunConfig::default(), 0).unwrap();
        assert!(record.outcome.is_deadlocked());
    }

    #[test]
    fn test_try_recv_and_buffer() {
        let tasks = TaskSet::new(pipe)
            .task(|(ch, got): &Pipe| {
                let (ch, got) = (ch.clone(), got.clone());
                move |cx: &TaskContext| {
                    if ch.try_recv(cx)?.is_none() {
                        got.update(|g| g.push(0));
                    }
                    ch.send(cx, 7)?;
                    ch.send(cx, 8)
                }
            })
            .observe(|(ch, got): &Pipe| (ch.buffered(), got.get()));
        let record = simulate(&tasks, &RunConfig::default(), 0).unwrap();
        assert_eq!(record.outcome.state(), Some(&(vec![7, 8], vec![0])));
    }
}
