use core::fmt;

/// Scheduling priority class.
///
/// The same classes key the ready queues of the scheduler and the free lists
/// of the segmented heap. Higher classes are scanned first and receive longer
/// quanta.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Priority {
    Idle = 0,
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Realtime = 4,
}

impl Priority {
    /// Number of priority classes.
    pub const COUNT: usize = 5;

    /// All classes, lowest first.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Idle,
        Self::Low,
        Self::Normal,
        Self::High,
        Self::Realtime,
    ];

    /// Position of this class in [`Priority::ALL`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Time quantum for this class: `base * (priority + 1)`.
    #[inline]
    #[must_use]
    pub const fn quantum(self, base: u32) -> u32 {
        base.saturating_mul(self as u32 + 1)
    }

    /// Classes from highest to lowest, the order the scheduler scans in.
    pub fn descending() -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().rev()
    }
}

impl TryFrom<u32> for Priority {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(Self::from_index)
            .ok_or(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Realtime => "realtime",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantum_grows_with_priority() {
        assert_eq!(Priority::Idle.quantum(10), 10);
        assert_eq!(Priority::Normal.quantum(10), 30);
        assert_eq!(Priority::Realtime.quantum(10), 50);
    }

    #[test]
    fn descending_starts_at_realtime() {
        let order: Vec<_> = Priority::descending().collect();
        assert_eq!(order.first(), Some(&Priority::Realtime));
        assert_eq!(order.last(), Some(&Priority::Idle));
    }

    #[test]
    fn conversion_rejects_unknown_classes() {
        assert_eq!(Priority::try_from(3), Ok(Priority::High));
        assert_eq!(Priority::try_from(5), Err(5));
    }
}
