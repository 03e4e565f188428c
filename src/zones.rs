// SPDX-FileCopyrightText: The powercap-tree authors
// SPDX-License-Identifier: MPL-2.0

use std::{collections::TryReserveError, fmt, num::ParseIntError, str::FromStr};

/// Initial capacity of the path buffer used during discovery.
///
/// Real hierarchies are much shallower. The buffer doubles whenever
/// a deeper level is encountered.
pub(crate) const ZONES_INITIAL_CAPACITY: usize = 64;

const ZONES_SEPARATOR: char = ':';

/// Indices of the zones on the way from the control type down to a zone.
///
/// `[2, 1]` addresses subzone 1 of zone 2. The empty path addresses the
/// control type itself.
///
/// Formatted and parsed with `:` as separator, i.e. `2:1`, the same way
/// the kernel suffixes zone directory names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ZonePath {
    zones: Vec<u32>,
}

impl ZonePath {
    #[must_use]
    pub const fn new() -> Self {
        Self { zones: Vec::new() }
    }

    /// Allocate an empty path for at least `capacity` levels.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory cannot be allocated.
    pub fn with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let mut zones = Vec::new();
        zones.try_reserve_exact(capacity)?;
        Ok(Self { zones })
    }

    /// Allocate a path of `depth` zeros.
    ///
    /// Used as a positional buffer that is overwritten level by level.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory cannot be allocated.
    pub fn zeroed(depth: usize) -> Result<Self, TryReserveError> {
        let mut path = Self::with_capacity(depth)?;
        path.zones.resize(depth, 0);
        Ok(path)
    }

    /// Append a zone index.
    ///
    /// The capacity doubles when exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if memory for the grown buffer cannot be allocated.
    /// The path remains unchanged.
    pub fn push(&mut self, index: u32) -> Result<(), TryReserveError> {
        let capacity = self.zones.capacity();
        if self.zones.len() == capacity {
            let additional = capacity.max(ZONES_INITIAL_CAPACITY);
            self.zones.try_reserve_exact(additional)?;
            log::trace!(
                "Grew zone path buffer from {capacity} to {new_capacity}",
                new_capacity = self.zones.capacity()
            );
        }
        self.zones.push(index);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<u32> {
        self.zones.pop()
    }

    /// Replace the index of the deepest level.
    ///
    /// # Panics
    ///
    /// Panics if the path is empty.
    pub(crate) fn set_last(&mut self, index: u32) {
        *self.zones.last_mut().expect("non-empty path") = index;
    }

    /// Overwrite the index at `level` (0-based).
    ///
    /// # Panics
    ///
    /// Panics if `level` is out of bounds.
    pub(crate) fn set(&mut self, level: usize, index: u32) {
        self.zones[level] = index;
    }

    #[must_use]
    pub const fn as_slice(&self) -> &[u32] {
        self.zones.as_slice()
    }

    /// The number of levels, 0 for the control type itself.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.zones.len()
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.zones.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.zones.capacity()
    }
}

impl AsRef<[u32]> for ZonePath {
    fn as_ref(&self) -> &[u32] {
        self.as_slice()
    }
}

impl From<Vec<u32>> for ZonePath {
    fn from(zones: Vec<u32>) -> Self {
        Self { zones }
    }
}

impl From<&[u32]> for ZonePath {
    fn from(zones: &[u32]) -> Self {
        Self {
            zones: zones.to_vec(),
        }
    }
}

/// Format zone indices separated by `:`, e.g. `0:1`.
pub(crate) fn fmt_zones(zones: &[u32], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut zones = zones.iter();
    if let Some(first) = zones.next() {
        write!(f, "{first}")?;
    }
    for zone in zones {
        write!(f, "{ZONES_SEPARATOR}{zone}")?;
    }
    Ok(())
}

impl fmt::Display for ZonePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_zones(&self.zones, f)
    }
}

impl FromStr for ZonePath {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::new());
        }
        s.split(ZONES_SEPARATOR)
            .map(|segment| segment.trim().parse())
            .collect::<Result<Vec<u32>, _>>()
            .map(Self::from)
    }
}
