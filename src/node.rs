// SPDX-FileCopyrightText: The powercap-tree authors
// SPDX-License-Identifier: MPL-2.0

use std::{any::Any, fmt};

#[cfg(test)]
thread_local! {
    /// Number of nodes currently allocated on this thread.
    pub(crate) static LIVE_NODES: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// A zone in a [`ZoneTree`](crate::ZoneTree).
///
/// Owns its subzones and a single context slot. The tree only owns the
/// structure: the content of the slot is assigned, consumed and replaced
/// exclusively by the callback of [`ZoneTree::walk()`](crate::ZoneTree::walk).
pub struct ZoneNode<C = Box<dyn Any>> {
    pub(crate) children: Vec<ZoneNode<C>>,
    pub(crate) ctx: Option<C>,
}

impl<C> ZoneNode<C> {
    /// Construct a leaf with an empty context slot
    pub(crate) const fn new() -> Self {
        Self {
            children: Vec::new(),
            ctx: None,
        }
    }

    /// Direct subzones, ordered by index.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    #[must_use]
    pub fn child(&self, index: u32) -> Option<&Self> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.children.get(index))
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The content of the context slot, if a walk has assigned one.
    #[must_use]
    pub const fn context(&self) -> Option<&C> {
        self.ctx.as_ref()
    }

    /// Number of all subzones below this zone (recursively).
    #[must_use]
    pub fn count_descendants(&self) -> usize {
        self.children
            .iter()
            .fold(0, |count, child| count + 1 + child.count_descendants())
    }
}

#[cfg(test)]
impl<C> Drop for ZoneNode<C> {
    fn drop(&mut self) {
        LIVE_NODES.with(|live| live.set(live.get() - 1));
    }
}

impl<C> fmt::Debug for ZoneNode<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The context is opaque.
        f.debug_struct("ZoneNode")
            .field("children", &self.children)
            .field("has_context", &self.ctx.is_some())
            .finish()
    }
}

/// A zone visited by [`ZoneTree::walk()`](crate::ZoneTree::walk).
///
/// Only valid for the duration of a single callback invocation. The
/// `zones` buffer is overwritten when the walk moves on.
pub struct ZoneVisit<'a, C = Box<dyn Any>> {
    /// Name of the control type that roots the tree.
    pub control_type: &'a str,

    /// Path from the control type to the visited zone.
    pub zones: &'a [u32],

    /// Number of levels below the control type, i.e. `zones.len()`.
    pub depth: usize,

    /// Number of direct subzones of the visited zone.
    pub num_children: usize,

    /// The context slot of the visited zone.
    pub ctx: &'a mut Option<C>,
}

impl<C> fmt::Debug for ZoneVisit<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoneVisit")
            .field("control_type", &self.control_type)
            .field("zones", &self.zones)
            .field("depth", &self.depth)
            .field("num_children", &self.num_children)
            .field("has_context", &self.ctx.is_some())
            .finish()
    }
}
