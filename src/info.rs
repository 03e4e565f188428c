// SPDX-FileCopyrightText: The powercap-tree authors
// SPDX-License-Identifier: MPL-2.0

//! Reports about the zones and constraints of a control type.
//!
//! Backs the `powercap-info` tool. A report is either a summary of
//! zones and their constraints or a single raw value.

use std::{fmt, io, num::ParseIntError, ops::ControlFlow, str::FromStr};

use thiserror::Error;

use crate::{
    sysfs::{AttrError, ConstraintAttr, ZoneAttr},
    PowercapSysfs, ZonePath, ZoneTree,
};

const INDENT: &str = "  ";

/// Marks a zone selector that excludes the subzones, e.g. `0:`.
const NON_RECURSIVE_SUFFIX: char = ':';

/// What to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InfoRequest {
    /// All attributes and constraints of the selected zones.
    #[default]
    Summary,
    /// Number of zones below the control type or below the selected zone.
    CountZones,
    /// A single attribute of the selected zone.
    Zone(ZoneAttr),
    /// A single attribute of the selected constraint.
    Constraint(ConstraintAttr),
}

/// A zone and whether its subzones are included.
///
/// Parsed from `a:b`, or from `a:b:` to exclude the subzones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneSelector {
    pub zones: ZonePath,
    pub recurse: bool,
}

impl FromStr for ZoneSelector {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (zones, recurse) = match s.strip_suffix(NON_RECURSIVE_SUFFIX) {
            Some(zones) => (zones, false),
            None => (s, true),
        };
        Ok(Self {
            zones: zones.parse()?,
            recurse,
        })
    }
}

impl fmt::Display for ZoneSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.zones)?;
        if !self.recurse {
            write!(f, "{NON_RECURSIVE_SUFFIX}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum InfoError {
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error(transparent)]
    Discovery(#[from] crate::Error),
    #[error("zone {zone} of control type {control_type:?} does not exist")]
    ZoneNotFound {
        control_type: String,
        zone: ZonePath,
    },
    #[error("constraint {constraint} of zone {zone} does not exist")]
    ConstraintNotFound { zone: ZonePath, constraint: u32 },
    #[error("no zones found for control type {control_type:?}")]
    NoZones { control_type: String },
    #[error(transparent)]
    Attr(#[from] AttrError),
    #[error("failed to write output")]
    Output(#[from] io::Error),
}

/// A report request against a control type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoQuery {
    pub control_type: String,
    /// Selected zone, all zones if `None`.
    ///
    /// Single values are read from zone 0 unless a zone is selected.
    pub zone: Option<ZoneSelector>,
    /// Selected constraint of the selected zone.
    pub constraint: Option<u32>,
    pub request: InfoRequest,
    /// Report unreadable attributes instead of skipping them.
    pub verbose: bool,
}

impl InfoQuery {
    #[must_use]
    pub fn new(control_type: impl Into<String>) -> Self {
        Self {
            control_type: control_type.into(),
            zone: None,
            constraint: None,
            request: InfoRequest::default(),
            verbose: false,
        }
    }

    /// Check that the constraint selection fits the request.
    ///
    /// # Errors
    ///
    /// Returns [`InfoError::InvalidRequest`] if a constraint is selected
    /// for counting zones or reading a zone attribute, or if no constraint
    /// is selected for reading a constraint attribute.
    pub fn validate(&self) -> Result<(), InfoError> {
        match (self.request, self.constraint) {
            (InfoRequest::CountZones, Some(_)) => Err(InfoError::InvalidRequest(
                "counting zones does not accept a constraint",
            )),
            (InfoRequest::Zone(_), Some(_)) => Err(InfoError::InvalidRequest(
                "zone attributes do not accept a constraint",
            )),
            (InfoRequest::Constraint(_), None) => Err(InfoError::InvalidRequest(
                "constraint attributes require a constraint",
            )),
            _ => Ok(()),
        }
    }

    /// Discover the zones of the control type and write the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid, if the control type,
    /// the selected zone or the selected constraint does not exist, if a
    /// requested single value cannot be read, or if writing fails.
    pub fn run(&self, sysfs: &PowercapSysfs, out: &mut impl io::Write) -> Result<(), InfoError> {
        self.validate()?;
        let mut tree = ZoneTree::<()>::build(&self.control_type, sysfs)?;
        log::debug!(
            "Running {request:?} on {node_count} zone(s) of control type {control_type:?}",
            request = self.request,
            node_count = tree.node_count(),
            control_type = self.control_type,
        );
        match self.request {
            InfoRequest::CountZones => {
                let prefix = self.selected_zones();
                let Some(count) = tree.count_children(prefix) else {
                    return Err(self.zone_not_found(prefix));
                };
                writeln!(out, "{count}")?;
            }
            InfoRequest::Zone(attr) => {
                let target = self.target_zones(&tree)?;
                let zones = target.as_slice();
                let value = match attr {
                    ZoneAttr::Name => sysfs.read_zone_string(&self.control_type, zones, attr)?,
                    _ => sysfs
                        .read_zone_u64(&self.control_type, zones, attr)?
                        .to_string(),
                };
                writeln!(out, "{value}")?;
            }
            InfoRequest::Constraint(attr) => {
                let (target, constraint) = self.target_constraint(&tree, sysfs)?;
                let zones = target.as_slice();
                let value = match attr {
                    ConstraintAttr::Name => {
                        sysfs.read_constraint_string(&self.control_type, zones, constraint, attr)?
                    }
                    _ => sysfs
                        .read_constraint_u64(&self.control_type, zones, constraint, attr)?
                        .to_string(),
                };
                writeln!(out, "{value}")?;
            }
            InfoRequest::Summary => self.summarize(&mut tree, sysfs, out)?,
        }
        tree.destroy();
        Ok(())
    }

    fn summarize(
        &self,
        tree: &mut ZoneTree<()>,
        sysfs: &PowercapSysfs,
        out: &mut impl io::Write,
    ) -> Result<(), InfoError> {
        let printer = ZonePrinter {
            sysfs,
            control_type: &self.control_type,
            verbose: self.verbose,
        };
        if self.constraint.is_some() {
            let (zones, constraint) = self.target_constraint(tree, sysfs)?;
            printer.print_header(out, zones.as_slice())?;
            printer.print_constraint(out, zones.depth(), zones.as_slice(), constraint)?;
            return Ok(());
        }
        let prefix = self.selected_zones();
        if prefix.is_empty() {
            if tree.node_count() == 0 {
                return Err(InfoError::NoZones {
                    control_type: self.control_type.clone(),
                });
            }
        } else if tree.find_node(prefix).is_none() {
            return Err(self.zone_not_found(prefix));
        }
        if self.zone.as_ref().is_some_and(|zone| !zone.recurse) && !prefix.is_empty() {
            printer.print_zone(out, prefix)?;
            return Ok(());
        }
        let flow = tree.walk(|visit| {
            if !visit.zones.starts_with(prefix) {
                return ControlFlow::Continue(());
            }
            match printer.print_zone(out, visit.zones) {
                Ok(()) => ControlFlow::Continue(()),
                Err(err) => ControlFlow::Break(err),
            }
        })?;
        if let ControlFlow::Break(err) = flow {
            return Err(err.into());
        }
        Ok(())
    }

    fn selected_zones(&self) -> &[u32] {
        self.zone
            .as_ref()
            .map_or(&[][..], |zone| zone.zones.as_slice())
    }

    /// The zone of a single value, zone 0 if none is selected.
    fn target_zones(&self, tree: &ZoneTree<()>) -> Result<ZonePath, InfoError> {
        let zones = match self.selected_zones() {
            [] => ZonePath::from(vec![0]),
            zones => ZonePath::from(zones),
        };
        if tree.find_node(zones.as_slice()).is_none() {
            return Err(self.zone_not_found(zones.as_slice()));
        }
        Ok(zones)
    }

    fn target_constraint(
        &self,
        tree: &ZoneTree<()>,
        sysfs: &PowercapSysfs,
    ) -> Result<(ZonePath, u32), InfoError> {
        let zones = self.target_zones(tree)?;
        let Some(constraint) = self.constraint else {
            return Err(InfoError::InvalidRequest("no constraint selected"));
        };
        if !sysfs.constraint_exists(&self.control_type, zones.as_slice(), constraint) {
            return Err(InfoError::ConstraintNotFound {
                zone: zones,
                constraint,
            });
        }
        Ok((zones, constraint))
    }

    fn zone_not_found(&self, zones: &[u32]) -> InfoError {
        InfoError::ZoneNotFound {
            control_type: self.control_type.clone(),
            zone: ZonePath::from(zones),
        }
    }
}

/// Writes zones with their attributes and constraints, indented by depth.
struct ZonePrinter<'a> {
    sysfs: &'a PowercapSysfs,
    control_type: &'a str,
    verbose: bool,
}

impl ZonePrinter<'_> {
    fn print_header(&self, out: &mut impl io::Write, zones: &[u32]) -> io::Result<()> {
        let indent = INDENT.repeat(zones.len().saturating_sub(1));
        let header = ZonePath::from(zones);
        match self
            .sysfs
            .read_zone_string(self.control_type, zones, ZoneAttr::Name)
        {
            Ok(name) => writeln!(out, "{indent}Zone {header} ({name})"),
            Err(_) => writeln!(out, "{indent}Zone {header}"),
        }
    }

    fn print_zone(&self, out: &mut impl io::Write, zones: &[u32]) -> io::Result<()> {
        self.print_header(out, zones)?;
        let level = zones.len();
        for attr in ZoneAttr::NUMERIC {
            let value = self.sysfs.read_zone_u64(self.control_type, zones, attr);
            self.print_attr(out, level, attr, value)?;
        }
        for constraint in 0..self.sysfs.count_constraints(self.control_type, zones) {
            self.print_constraint(out, level, zones, constraint)?;
        }
        Ok(())
    }

    fn print_constraint(
        &self,
        out: &mut impl io::Write,
        level: usize,
        zones: &[u32],
        constraint: u32,
    ) -> io::Result<()> {
        writeln!(out, "{}Constraint {constraint}", INDENT.repeat(level))?;
        let name = self.sysfs.read_constraint_string(
            self.control_type,
            zones,
            constraint,
            ConstraintAttr::Name,
        );
        self.print_attr(out, level + 1, ConstraintAttr::Name, name)?;
        for attr in ConstraintAttr::NUMERIC {
            let value = self
                .sysfs
                .read_constraint_u64(self.control_type, zones, constraint, attr);
            self.print_attr(out, level + 1, attr, value)?;
        }
        Ok(())
    }

    fn print_attr(
        &self,
        out: &mut impl io::Write,
        level: usize,
        attr: impl fmt::Display,
        value: Result<impl fmt::Display, AttrError>,
    ) -> io::Result<()> {
        let indent = INDENT.repeat(level);
        match value {
            Ok(value) => writeln!(out, "{indent}{attr}: {value}"),
            Err(err) if self.verbose => writeln!(out, "{indent}{attr}: {err}"),
            Err(err) => {
                log::debug!("Skipping {attr}: {err}");
                Ok(())
            }
        }
    }
}
