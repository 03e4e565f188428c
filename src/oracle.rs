// SPDX-FileCopyrightText: The powercap-tree authors
// SPDX-License-Identifier: MPL-2.0

/// Source of topology information for [`ZoneTree`](crate::ZoneTree) discovery.
///
/// Answers must be deterministic for the duration of a single build.
pub trait ZoneOracle {
    /// Check if the zone addressed by `zones` exists below `control_type`.
    ///
    /// An empty slice asks for the control type itself.
    #[must_use]
    fn exists(&self, control_type: &str, zones: &[u32]) -> bool;
}

impl<F> ZoneOracle for F
where
    F: Fn(&str, &[u32]) -> bool,
{
    fn exists(&self, control_type: &str, zones: &[u32]) -> bool {
        self(control_type, zones)
    }
}
