// Inbound command queue.
//
// One per process. The network-receive path appends, the simulation tick
// drains; nothing else touches it. Commands leave in exactly the order they
// arrived. They are never deduplicated or reordered.
//
// The lock is held only for the single push / peek / pop, never while a
// command is applied to the world, so a slow world mutation can never stall
// a network thread. Peeking hands out a clone of the head; since only the
// simulation thread pops, the head cannot change between `front()` and the
// following `pop_front()`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use partysync_protocol::Command;

/// Cloneable handle to a shared FIFO of commands.
#[derive(Clone, Debug, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<Command>>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Command>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, command: Command) {
        self.lock().push_back(command);
    }

    /// Clone of the oldest command, left in place.
    pub fn front(&self) -> Option<Command> {
        self.lock().front().cloned()
    }

    pub fn pop_front(&self) -> Option<Command> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use partysync_protocol::Vec3;

    use super::*;

    fn transform(i: u32) -> Command {
        Command::SetObjectTransform {
            tag: format!("actor-{i}"),
            position: Vec3::ZERO,
            heading: 0.0,
        }
    }

    #[test]
    fn fifo_without_dedup() {
        let queue = CommandQueue::new();
        queue.push(transform(1));
        queue.push(transform(1));
        queue.push(transform(2));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.front(), Some(transform(1)));
        assert_eq!(queue.len(), 3, "front must not remove");
        assert_eq!(queue.pop_front(), Some(transform(1)));
        assert_eq!(queue.pop_front(), Some(transform(1)));
        assert_eq!(queue.pop_front(), Some(transform(2)));
        assert!(queue.is_empty());
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn producer_thread_order_is_preserved() {
        let queue = CommandQueue::new();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..2000 {
                    queue.push(transform(i));
                }
            })
        };

        let mut drained = Vec::new();
        while drained.len() < 2000 {
            if let Some(cmd) = queue.pop_front() {
                drained.push(cmd);
            } else {
                thread::yield_now();
            }
        }
        producer.join().unwrap();

        let expected: Vec<Command> = (0..2000).map(transform).collect();
        assert_eq!(drained, expected);
    }

    #[test]
    fn clear_empties_shared_handles() {
        let queue = CommandQueue::new();
        let other = queue.clone();
        queue.push(transform(7));
        other.clear();
        assert!(queue.is_empty());
    }
}
