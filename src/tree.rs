// SPDX-FileCopyrightText: The powercap-tree authors
// SPDX-License-Identifier: MPL-2.0

use std::{any::Any, collections::TryReserveError, ops::ControlFlow};

use thiserror::Error;

use crate::{zones::ZONES_INITIAL_CAPACITY, ZoneNode, ZoneOracle, ZonePath, ZoneVisit};

#[derive(Debug, Error)]
pub enum Error {
    #[error("control type {control_type:?} not found")]
    NotFound { control_type: String },
    #[error("memory allocation failed")]
    Allocation(#[from] TryReserveError),
}

/// Snapshot of the zone hierarchy of a control type.
///
/// The shape is discovered once by [`ZoneTree::build()`] and never changes
/// afterwards. Changes of the underlying [`ZoneOracle`] are only picked up
/// by building a new tree.
///
/// The type parameter `C` is the content of the per-zone context slots
/// that are managed by the callback of [`ZoneTree::walk()`].
pub struct ZoneTree<C = Box<dyn Any>> {
    control_type: String,
    children: Vec<ZoneNode<C>>,
    max_depth: usize,
}

impl<C> ZoneTree<C> {
    /// Discover the zone hierarchy of a control type.
    ///
    /// Children of each zone are counted by querying the indices `0, 1, 2, ...`
    /// until the oracle reports the first missing index. Sparse indices are
    /// not supported: all zones after a gap remain undiscovered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the control type does not exist.
    /// On [`Error::Allocation`] all zones discovered so far have already
    /// been released.
    pub fn build<O>(control_type: &str, oracle: &O) -> Result<Self, Error>
    where
        O: ZoneOracle + ?Sized,
    {
        Discovery::new(control_type, oracle).run()
    }

    /// Discover like [`Self::build()`], simulating an allocation failure
    /// when trying to allocate more than `max_nodes` zones.
    #[cfg(test)]
    pub(crate) fn build_failing_after<O>(
        control_type: &str,
        oracle: &O,
        max_nodes: usize,
    ) -> Result<Self, Error>
    where
        O: ZoneOracle + ?Sized,
    {
        let mut discovery = Discovery::new(control_type, oracle);
        discovery.fail_after_nodes = Some(max_nodes);
        discovery.run()
    }

    /// Release the tree and all its zones.
    ///
    /// Equivalent to dropping the tree. Context slots that are still
    /// occupied are dropped along with their zones. Callbacks that need
    /// to keep a context beyond the lifetime of the tree must take it out
    /// of the slot during a walk.
    pub fn destroy(self) {
        log::debug!(
            "Destroying tree of control type {control_type:?} with {node_count} zone(s)",
            control_type = self.control_type,
            node_count = self.node_count(),
        );
        drop(self);
    }

    #[must_use]
    pub fn control_type(&self) -> &str {
        &self.control_type
    }

    /// The top-level zones, ordered by index.
    #[must_use]
    pub fn children(&self) -> &[ZoneNode<C>] {
        &self.children
    }

    /// Depth of the deepest zone, 0 if the control type has no zones.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Total number of zones in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.children
            .iter()
            .fold(0, |count, child| count + 1 + child.count_descendants())
    }

    /// Find the zone addressed by `zones`.
    ///
    /// The control type itself is not a zone, i.e. returns `None` for
    /// an empty path.
    #[must_use]
    pub fn find_node(&self, zones: &[u32]) -> Option<&ZoneNode<C>> {
        let (first, rest) = zones.split_first()?;
        let first = usize::try_from(*first).ok()?;
        let mut last_visited_node = self.children.get(first)?;
        for index in rest {
            last_visited_node = last_visited_node.child(*index)?;
        }
        Some(last_visited_node)
    }

    /// Number of direct children of the control type (empty path) or
    /// of the zone addressed by `zones`.
    ///
    /// Returns `None` if the zone does not exist.
    #[must_use]
    pub fn count_children(&self, zones: &[u32]) -> Option<usize> {
        if zones.is_empty() {
            return Some(self.children.len());
        }
        self.find_node(zones).map(|node| node.children().len())
    }

    /// Walk the tree in preorder, depth-first.
    ///
    /// Each zone is visited before its subzones, siblings in ascending
    /// order of their index. The control type itself is not visited.
    ///
    /// The callback returns [`ControlFlow::Break`] to stop the walk
    /// immediately. No more zones are visited afterwards and the break
    /// value is returned to the caller as is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if the path buffer for the walk
    /// cannot be allocated. No zone has been visited in this case.
    pub fn walk<B>(
        &mut self,
        visit: impl FnMut(ZoneVisit<'_, C>) -> ControlFlow<B>,
    ) -> Result<ControlFlow<B>, Error> {
        self.walk_with_zones(ZonePath::zeroed, visit)
    }

    /// Walk like [`Self::walk()`], simulating an allocation failure
    /// of the path buffer.
    #[cfg(test)]
    pub(crate) fn walk_failing_allocation<B>(
        &mut self,
        visit: impl FnMut(ZoneVisit<'_, C>) -> ControlFlow<B>,
    ) -> Result<ControlFlow<B>, Error> {
        self.walk_with_zones(|_| Err(simulated_allocation_failure()), visit)
    }

    fn walk_with_zones<B>(
        &mut self,
        allocate_zones: impl FnOnce(usize) -> Result<ZonePath, TryReserveError>,
        mut visit: impl FnMut(ZoneVisit<'_, C>) -> ControlFlow<B>,
    ) -> Result<ControlFlow<B>, Error> {
        if self.children.is_empty() {
            return Ok(ControlFlow::Continue(()));
        }
        let mut zones = allocate_zones(self.max_depth)?;
        Ok(walk_children(
            &self.control_type,
            &mut self.children,
            &mut zones,
            0,
            &mut visit,
        ))
    }
}

impl<C> std::fmt::Debug for ZoneTree<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneTree")
            .field("control_type", &self.control_type)
            .field("children", &self.children)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

fn walk_children<C, B>(
    control_type: &str,
    children: &mut [ZoneNode<C>],
    zones: &mut ZonePath,
    level: usize,
    visit: &mut impl FnMut(ZoneVisit<'_, C>) -> ControlFlow<B>,
) -> ControlFlow<B> {
    for (index, node) in (0..).zip(children.iter_mut()) {
        zones.set(level, index);
        walk_node(control_type, node, zones, level + 1, visit)?;
    }
    ControlFlow::Continue(())
}

fn walk_node<C, B>(
    control_type: &str,
    node: &mut ZoneNode<C>,
    zones: &mut ZonePath,
    depth: usize,
    visit: &mut impl FnMut(ZoneVisit<'_, C>) -> ControlFlow<B>,
) -> ControlFlow<B> {
    visit(ZoneVisit {
        control_type,
        zones: &zones.as_slice()[..depth],
        depth,
        num_children: node.children.len(),
        ctx: &mut node.ctx,
    })?;
    walk_children(control_type, &mut node.children, zones, depth, visit)
}

/// State of a single discovery pass.
struct Discovery<'a, O: ?Sized> {
    control_type: &'a str,
    oracle: &'a O,
    /// Path of the zone whose children are currently counted.
    zones: ZonePath,
    max_depth: usize,
    node_count: usize,
    #[cfg(test)]
    fail_after_nodes: Option<usize>,
}

impl<'a, O> Discovery<'a, O>
where
    O: ZoneOracle + ?Sized,
{
    fn new(control_type: &'a str, oracle: &'a O) -> Self {
        Self {
            control_type,
            oracle,
            zones: ZonePath::new(),
            max_depth: 0,
            node_count: 0,
            #[cfg(test)]
            fail_after_nodes: None,
        }
    }

    fn run<C>(mut self) -> Result<ZoneTree<C>, Error> {
        let control_type = self.control_type;
        if !self.oracle.exists(control_type, &[]) {
            return Err(Error::NotFound {
                control_type: control_type.to_owned(),
            });
        }
        log::debug!("Discovering zones of control type {control_type:?}");
        let result = ZonePath::with_capacity(ZONES_INITIAL_CAPACITY)
            .map_err(Error::from)
            .and_then(|zones| {
                self.zones = zones;
                self.discover_children()
            });
        let children = match result {
            Ok(children) => children,
            Err(err) => {
                log::warn!(
                    "Discarded {node_count} zone(s) of control type {control_type:?} after failed discovery: {err}",
                    node_count = self.node_count,
                );
                return Err(err);
            }
        };
        log::debug!(
            "Discovered {node_count} zone(s) of control type {control_type:?} with max. depth {max_depth}",
            node_count = self.node_count,
            max_depth = self.max_depth,
        );
        Ok(ZoneTree {
            control_type: control_type.to_owned(),
            children,
            max_depth: self.max_depth,
        })
    }

    /// Discover all descendants of the zone at the current path.
    ///
    /// Restores the current path before returning successfully. On error
    /// all nodes allocated by this invocation are dropped.
    fn discover_children<C>(&mut self) -> Result<Vec<ZoneNode<C>>, Error> {
        let num_children = self.count_children()?;
        let mut children = Vec::new();
        if num_children == 0 {
            return Ok(children);
        }
        children.try_reserve_exact(usize::try_from(num_children).unwrap_or(usize::MAX))?;
        self.zones.push(0)?;
        self.max_depth = self.max_depth.max(self.zones.depth());
        for index in 0..num_children {
            self.zones.set_last(index);
            let mut child = self.allocate_node()?;
            child.children = self.discover_children()?;
            children.push(child);
        }
        self.zones.pop();
        Ok(children)
    }

    /// Count the consecutive children of the zone at the current path.
    fn count_children(&mut self) -> Result<u32, Error> {
        self.zones.push(0)?;
        let mut num_children = 0;
        while num_children < u32::MAX
            && self.oracle.exists(self.control_type, self.zones.as_slice())
        {
            log::trace!("Found zone {zones}", zones = self.zones);
            num_children += 1;
            self.zones.set_last(num_children);
        }
        self.zones.pop();
        log::debug!(
            "Found {num_children} child zone(s) at [{zones}]",
            zones = self.zones
        );
        Ok(num_children)
    }

    fn allocate_node<C>(&mut self) -> Result<ZoneNode<C>, Error> {
        #[cfg(test)]
        if self.fail_after_nodes == Some(self.node_count) {
            return Err(simulated_allocation_failure().into());
        }
        #[cfg(test)]
        crate::node::LIVE_NODES.with(|live| live.set(live.get() + 1));
        self.node_count += 1;
        Ok(ZoneNode::new())
    }
}

#[cfg(test)]
fn simulated_allocation_failure() -> TryReserveError {
    Vec::<u8>::new()
        .try_reserve(usize::MAX)
        .expect_err("capacity overflow")
}
