//! Mapping between byte offsets of the output and source code locations.

use std::collections::BTreeMap;
use std::iter::FromIterator;

use crate::parsing::Location;

/// Maps the byte offset at which each node starts to the location of the node in the
/// assembly source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMap {
    inner: BTreeMap<u16, Location>,
}

impl FromIterator<(u16, Location)> for SourceMap {
    fn from_iter<I>(iter: I) -> Self
        where I: IntoIterator<Item = (u16, Location)>
    {
        SourceMap {
            inner: BTreeMap::from_iter(iter),
        }
    }
}

impl SourceMap {
    pub fn insert(&mut self, offset: u16, location: Location) {
        self.inner.insert(offset, location);
    }

    /// Returns the location of the node starting exactly at `offset`.
    pub fn get(&self, offset: u16) -> Option<&Location> {
        self.inner.get(&offset)
    }

    /// Returns the location of the node that covers `offset`, that is the closest node
    /// starting at or before it.
    pub fn locate(&self, offset: u16) -> Option<&Location> {
        self.inner.range(..=offset)
            .next_back()
            .map(|(_, location)| location)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &Location)> {
        self.inner.iter().map(|(offset, location)| (*offset, location))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
