//! Thread ready queue implementation (internal use only).
use core::fmt;

use crate::{
    cfg::PRIORITY_MAX,
    utils::{
        intrusive_list::{ListHead, Linked},
        pool::Pool,
        prio_bitmap::{PrioBitmap, PrioBitmap32},
    },
};

/// An element that can be put on a [`ReadyQueue`].
pub(crate) trait Prioritized: Linked {
    fn priority(&self) -> usize;
}

/// The result of [`ReadyQueue::choose_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScheduleDecision {
    /// Keep running the current thread.
    Keep,
    /// Switch to the specified thread, which has been removed from the queue.
    SwitchTo(usize),
}

/// One FIFO list per priority level, and a bitmap tracking which of them are
/// non-empty.
///
/// Invariant: `queues[i].first.is_some() == bitmap.get(i)`
pub(crate) struct ReadyQueue {
    queues: [ListHead; PRIORITY_MAX],
    bitmap: PrioBitmap32,
}

impl fmt::Debug for ReadyQueue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReadyQueue")
            .field("bitmap", &self.bitmap)
            .finish_non_exhaustive()
    }
}

impl ReadyQueue {
    pub(crate) const fn new() -> Self {
        Self {
            queues: [ListHead::new(); PRIORITY_MAX],
            bitmap: PrioBitmap32::new(),
        }
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    /// Get the bitmap of non-empty priority levels.
    pub(crate) fn bitmap(&self) -> u32 {
        self.bitmap.bits()
    }

    /// Get the most urgent priority that has a ready thread.
    pub(crate) fn highest_priority(&self) -> Option<usize> {
        self.bitmap.find_set()
    }

    pub(crate) fn has_ready_at(&self, priority: usize) -> bool {
        self.bitmap.get(priority)
    }

    #[cfg(test)]
    fn front(&self, priority: usize) -> Option<usize> {
        self.queues[priority].front()
    }

    /// Iterate over the threads at `priority`, head first.
    pub(crate) fn iter_level<'a, T: Prioritized, const N: usize>(
        &self,
        pool: &'a Pool<T, N>,
        priority: usize,
    ) -> impl Iterator<Item = usize> + 'a {
        self.queues[priority].iter(pool)
    }

    /// Append `item` to the tail of its priority's list.
    pub(crate) fn push_back<T: Prioritized, const N: usize>(
        &mut self,
        pool: &mut Pool<T, N>,
        item: usize,
    ) {
        let pri = Self::priority_of(pool, item);
        if self.queues[pri].push_back(pool, item).is_err() {
            panic!("thread {item} is already in a queue");
        }
        self.bitmap.set(pri);
    }

    /// Unlink `item` from its priority's list.
    pub(crate) fn remove<T: Prioritized, const N: usize>(
        &mut self,
        pool: &mut Pool<T, N>,
        item: usize,
    ) {
        let pri = Self::priority_of(pool, item);
        if self.queues[pri].remove(pool, item).is_err() {
            panic!("thread {item} is not in the ready queue");
        }
        if self.queues[pri].is_empty() {
            self.bitmap.clear(pri);
        }
    }

    /// Choose the next thread to run given `prev_priority`, the priority of
    /// the current thread if it is still runnable.
    ///
    /// Returns `Keep` if the queue is empty or the current thread is at least
    /// as urgent as every ready thread. Otherwise the most urgent ready thread
    /// is removed from the queue and returned.
    ///
    /// Returns `None` if there is no current thread and the queue is empty.
    pub(crate) fn choose_next<T: Prioritized, const N: usize>(
        &mut self,
        pool: &mut Pool<T, N>,
        prev_priority: Option<usize>,
    ) -> Option<ScheduleDecision> {
        let Some(pri) = self.highest_priority() else {
            return prev_priority.map(|_| ScheduleDecision::Keep);
        };

        if let Some(prev) = prev_priority {
            if prev <= pri {
                return Some(ScheduleDecision::Keep);
            }
        }

        let next = self.queues[pri].front()?;
        self.remove(pool, next);
        Some(ScheduleDecision::SwitchTo(next))
    }

    fn priority_of<T: Prioritized, const N: usize>(pool: &Pool<T, N>, item: usize) -> usize {
        match pool.at(item) {
            Some(x) => x.priority(),
            None => panic!("thread {item} does not exist"),
        }
    }

    /// Check the bitmap invariant.
    #[cfg(test)]
    fn validate(&self) {
        for (i, q) in self.queues.iter().enumerate() {
            assert_eq!(q.first.is_some(), self.bitmap.get(i), "level {i}");
        }
    }
}
