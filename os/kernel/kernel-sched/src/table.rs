//! Fixed-capacity process table.

use crate::process::{Pcb, Pid};
use core::ops::{Index, IndexMut};
use kernel_info::Priority;
use kernel_info::sched::MAX_PROCESSES;

/// Index of a table slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Slot(usize);

impl Slot {
    #[inline]
    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Up to [`MAX_PROCESSES`] PCBs. Free slots are reused; pids are not.
pub struct ProcessTable {
    slots: [Option<Pcb>; MAX_PROCESSES],
    limit: usize,
    next_pid: u32,
    len: usize,
}

impl ProcessTable {
    /// Table admitting at most `limit` processes (clamped to
    /// [`MAX_PROCESSES`]). The first pid handed out is 1.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            slots: [const { None }; MAX_PROCESSES],
            limit: if limit > MAX_PROCESSES {
                MAX_PROCESSES
            } else {
                limit
            },
            next_pid: 1,
            len: 0,
        }
    }

    /// Places a new PCB in the first free slot.
    ///
    /// Returns `None` when the table is full; no pid is consumed then.
    pub fn create(
        &mut self,
        name: &str,
        priority: Priority,
        quantum_base: u32,
    ) -> Option<(Slot, &mut Pcb)> {
        let index = self.slots[..self.limit].iter().position(Option::is_none)?;
        let pid = Pid::new(self.next_pid);
        self.next_pid += 1;
        self.len += 1;
        let pcb = self.slots[index].insert(Pcb::new(pid, name, priority, quantum_base));
        Some((Slot(index), pcb))
    }

    /// Slot of the process with `pid`.
    #[must_use]
    pub fn find(&self, pid: Pid) -> Option<Slot> {
        self.iter().find(|(_, pcb)| pcb.pid() == pid).map(|(slot, _)| slot)
    }

    #[must_use]
    pub fn get(&self, slot: Slot) -> Option<&Pcb> {
        self.slots.get(slot.0)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Pcb> {
        self.slots.get_mut(slot.0)?.as_mut()
    }

    /// Empties `slot` and hands back its PCB.
    pub fn release(&mut self, slot: Slot) -> Option<Pcb> {
        let pcb = self.slots.get_mut(slot.0)?.take()?;
        self.len -= 1;
        Some(pcb)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &Pcb)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, pcb)| Some((Slot(i), pcb.as_ref()?)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Slot, &mut Pcb)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, pcb)| Some((Slot(i), pcb.as_mut()?)))
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.limit
    }
}

impl Index<Slot> for ProcessTable {
    type Output = Pcb;

    /// # Panics
    /// If the slot is empty.
    fn index(&self, slot: Slot) -> &Pcb {
        match self.get(slot) {
            Some(pcb) => pcb,
            None => panic!("empty process slot {}", slot.0),
        }
    }
}

impl IndexMut<Slot> for ProcessTable {
    fn index_mut(&mut self, slot: Slot) -> &mut Pcb {
        match self.get_mut(slot) {
            Some(pcb) => pcb,
            None => panic!("empty process slot {}", slot.0),
        }
    }
}
