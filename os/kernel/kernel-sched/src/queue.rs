//! Per-priority ready queues.
//!
//! One doubly-linked list per [`Priority`], threaded through an array
//! indexed by table slot, so a slot can be unlinked in O(1) and is in at most
//! one list.

use crate::table::Slot;
use kernel_info::Priority;
use kernel_info::sched::MAX_PROCESSES;

#[derive(Copy, Clone, Debug, Default)]
struct Link {
    level: Option<Priority>,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub struct ReadyQueues {
    heads: [Option<usize>; Priority::COUNT],
    tails: [Option<usize>; Priority::COUNT],
    lens: [usize; Priority::COUNT],
    links: [Link; MAX_PROCESSES],
}

impl Default for ReadyQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyQueues {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heads: [None; Priority::COUNT],
            tails: [None; Priority::COUNT],
            lens: [0; Priority::COUNT],
            links: [Link {
                level: None,
                prev: None,
                next: None,
            }; MAX_PROCESSES],
        }
    }

    /// Appends `slot` to the `level` queue. A slot already queued is left
    /// where it is and `false` is returned.
    pub fn push_back(&mut self, slot: Slot, level: Priority) -> bool {
        let i = slot.index();
        if self.links[i].level.is_some() {
            return false;
        }
        let l = level.index();
        let tail = self.tails[l];
        self.links[i] = Link {
            level: Some(level),
            prev: tail,
            next: None,
        };
        match tail {
            Some(t) => self.links[t].next = Some(i),
            None => self.heads[l] = Some(i),
        }
        self.tails[l] = Some(i);
        self.lens[l] += 1;
        true
    }

    /// Unlinks `slot` from whichever queue holds it.
    pub fn remove(&mut self, slot: Slot) -> bool {
        let i = slot.index();
        let Link { level, prev, next } = self.links[i];
        let Some(level) = level else {
            return false;
        };
        let l = level.index();
        match prev {
            Some(p) => self.links[p].next = next,
            None => self.heads[l] = next,
        }
        match next {
            Some(n) => self.links[n].prev = prev,
            None => self.tails[l] = prev,
        }
        self.links[i] = Link::default();
        self.lens[l] -= 1;
        true
    }

    /// Queue holding `slot`, if any.
    #[must_use]
    pub fn level_of(&self, slot: Slot) -> Option<Priority> {
        self.links[slot.index()].level
    }

    #[must_use]
    pub fn contains(&self, slot: Slot) -> bool {
        self.level_of(slot).is_some()
    }

    /// Slots of the `level` queue, front to back.
    pub fn iter(&self, level: Priority) -> impl Iterator<Item = Slot> + '_ {
        let mut cursor = self.heads[level.index()];
        core::iter::from_fn(move || {
            let i = cursor?;
            cursor = self.links[i].next;
            Some(Slot::from_index(i))
        })
    }

    #[must_use]
    pub const fn len(&self, level: Priority) -> usize {
        self.lens[level.index()]
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.lens.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(i: usize) -> Slot {
        Slot::from_index(i)
    }

    #[test]
    fn fifo_order_and_unlink() {
        let mut q = ReadyQueues::new();
        for i in 0..4 {
            assert!(q.push_back(slot(i), Priority::Normal));
        }
        assert!(!q.push_back(slot(2), Priority::High));
        assert!(q.remove(slot(0)));
        assert!(q.remove(slot(2)));
        assert!(!q.remove(slot(2)));

        let order: Vec<_> = q.iter(Priority::Normal).map(Slot::index).collect();
        assert_eq!(order, [1, 3]);
        assert_eq!(q.len(Priority::Normal), 2);
        assert_eq!(q.level_of(slot(3)), Some(Priority::Normal));

        q.push_back(slot(0), Priority::Normal);
        let order: Vec<_> = q.iter(Priority::Normal).map(Slot::index).collect();
        assert_eq!(order, [1, 3, 0]);
        assert_eq!(q.total(), 3);
    }
}
