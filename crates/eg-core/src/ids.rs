use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::num::NonZeroU32;

/// Compact, stable identifier for one category of grid element.
///
/// - `u32` keeps memory small
/// - `NonZero` enables `Option<Id>` to be pointer-optimized
/// - the kind parameter keeps node, branch and DER ids from being mixed up
pub struct Id<K> {
    raw: NonZeroU32,
    _kind: PhantomData<fn() -> K>,
}

/// Marker for node ids.
#[derive(Debug)]
pub enum NodeTag {}

/// Marker for branch (line / transformer) ids.
#[derive(Debug)]
pub enum BranchTag {}

/// Marker for DER / load ids.
#[derive(Debug)]
pub enum DerTag {}

pub type NodeId = Id<NodeTag>;
pub type BranchId = Id<BranchTag>;
pub type DerId = Id<DerTag>;

impl<K> Id<K> {
    /// Create an Id from a 0-based index by storing index+1.
    pub fn from_index(index: usize) -> Self {
        Self {
            raw: NonZeroU32::MIN.saturating_add(index as u32),
            _kind: PhantomData,
        }
    }

    /// Recover the 0-based index.
    pub fn index(self) -> usize {
        (self.raw.get() - 1) as usize
    }
}

impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Id<K> {}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K> Eq for Id<K> {}

impl<K> PartialOrd for Id<K> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Id<K> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<K> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.index())
    }
}

impl<K> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}
