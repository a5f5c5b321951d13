//! Ownership tracking for shared topology objects.

use std::fmt;

use smallvec::SmallVec;

/// Identity of a backend connection that announced an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// An object plus the set of connections that currently refer to it
#[derive(Debug, Clone)]
pub struct RefTrack<T> {
    /// Tracked object
    pub obj: T,
    owners: SmallVec<[ConnectionId; 2]>,
}

impl<T> RefTrack<T> {
    /// Track `obj` with `owner` as its first reference
    pub fn new(obj: T, owner: ConnectionId) -> Self {
        let mut owners = SmallVec::new();
        owners.push(owner);
        Self { obj, owners }
    }

    /// Add a reference; duplicates are ignored
    pub fn add_ref(&mut self, owner: ConnectionId) {
        if !self.owners.contains(&owner) {
            self.owners.push(owner);
        }
    }

    /// Drop `owner`'s reference, returning true when no owners remain
    pub fn remove_ref(&mut self, owner: ConnectionId) -> bool {
        self.owners.retain(|o| *o != owner);
        self.owners.is_empty()
    }

    /// Whether `owner` holds a reference
    pub fn is_owned_by(&self, owner: ConnectionId) -> bool {
        self.owners.contains(&owner)
    }

    /// Number of distinct owners
    pub fn ref_count(&self) -> usize {
        self.owners.len()
    }
}
