use std::fmt;

/// Handle to a region slot in a [`RegionTree`](crate::RegionTree).
///
/// Slots are reused after a region is destroyed; the generation makes stale
/// handles resolve to nothing instead of to the slot's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl RegionId {
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}v{}", self.index, self.generation)
    }
}
