// SPDX-FileCopyrightText: The powercap-tree authors
// SPDX-License-Identifier: MPL-2.0

//! Binding to the Linux powercap sysfs interface.
//!
//! Zones are nested directories below the powercap class directory, each
//! suffixed with the full path of zone indices:
//!
//! ```text
//! /sys/class/powercap/intel-rapl
//! /sys/class/powercap/intel-rapl:0
//! /sys/class/powercap/intel-rapl:0/intel-rapl:0:0
//! /sys/class/powercap/intel-rapl:0/intel-rapl:0:1
//! ```
//!
//! Attribute values are passed through as trimmed strings or parsed as
//! unsigned integers. They are not interpreted any further.

use std::{
    fmt, fs, io,
    num::ParseIntError,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{zones::fmt_zones, ZoneOracle};

/// Default mount point of the powercap class.
pub const POWERCAP_SYSFS_ROOT: &str = "/sys/class/powercap";

/// Attributes of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ZoneAttr {
    #[display(fmt = "name")]
    Name,
    #[display(fmt = "energy_uj")]
    EnergyUj,
    #[display(fmt = "max_energy_range_uj")]
    MaxEnergyRangeUj,
    #[display(fmt = "power_uw")]
    PowerUw,
    #[display(fmt = "max_power_range_uw")]
    MaxPowerRangeUw,
    #[display(fmt = "enabled")]
    Enabled,
}

impl ZoneAttr {
    /// All numeric attributes in the order they are usually reported.
    pub const NUMERIC: [Self; 5] = [
        Self::Enabled,
        Self::MaxEnergyRangeUj,
        Self::EnergyUj,
        Self::MaxPowerRangeUw,
        Self::PowerUw,
    ];
}

/// Attributes of a power constraint of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ConstraintAttr {
    #[display(fmt = "name")]
    Name,
    #[display(fmt = "power_limit_uw")]
    PowerLimitUw,
    #[display(fmt = "time_window_us")]
    TimeWindowUs,
    #[display(fmt = "max_power_uw")]
    MaxPowerUw,
    #[display(fmt = "min_power_uw")]
    MinPowerUw,
    #[display(fmt = "max_time_window_us")]
    MaxTimeWindowUs,
    #[display(fmt = "min_time_window_us")]
    MinTimeWindowUs,
}

impl ConstraintAttr {
    /// All numeric attributes in the order they are usually reported.
    pub const NUMERIC: [Self; 6] = [
        Self::PowerLimitUw,
        Self::TimeWindowUs,
        Self::MaxPowerUw,
        Self::MinPowerUw,
        Self::MaxTimeWindowUs,
        Self::MinTimeWindowUs,
    ];
}

#[derive(Debug, Error)]
pub enum AttrError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unexpected content {content:?} in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        content: String,
        #[source]
        source: ParseIntError,
    },
}

impl AttrError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::Parse { path, .. } => path,
        }
    }
}

/// Powercap sysfs tree rooted at a configurable directory.
///
/// The root defaults to [`POWERCAP_SYSFS_ROOT`]. Other roots are useful
/// for testing or for inspecting a copy of the sysfs tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowercapSysfs {
    root: PathBuf,
}

impl Default for PowercapSysfs {
    fn default() -> Self {
        Self::new(POWERCAP_SYSFS_ROOT)
    }
}

/// Directory name of a zone, e.g. `intel-rapl:0:1`.
struct ZoneDirName<'a> {
    control_type: &'a str,
    zones: &'a [u32],
}

impl fmt::Display for ZoneDirName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.control_type)?;
        fmt_zones(self.zones, f)
    }
}

impl PowercapSysfs {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the control type (empty `zones`) or of a zone.
    #[must_use]
    pub fn zone_dir(&self, control_type: &str, zones: &[u32]) -> PathBuf {
        if zones.is_empty() {
            return self.root.join(control_type);
        }
        let mut dir = self.root.clone();
        for depth in 1..=zones.len() {
            dir.push(
                ZoneDirName {
                    control_type,
                    zones: &zones[..depth],
                }
                .to_string(),
            );
        }
        dir
    }

    #[must_use]
    pub fn control_type_exists(&self, control_type: &str) -> bool {
        self.zone_dir(control_type, &[]).is_dir()
    }

    #[must_use]
    pub fn zone_attr_path(&self, control_type: &str, zones: &[u32], attr: ZoneAttr) -> PathBuf {
        let mut path = self.zone_dir(control_type, zones);
        path.push(attr.to_string());
        path
    }

    #[must_use]
    pub fn constraint_attr_path(
        &self,
        control_type: &str,
        zones: &[u32],
        constraint: u32,
        attr: ConstraintAttr,
    ) -> PathBuf {
        let mut path = self.zone_dir(control_type, zones);
        path.push(format!("constraint_{constraint}_{attr}"));
        path
    }

    /// A constraint exists if its power limit is exposed.
    #[must_use]
    pub fn constraint_exists(&self, control_type: &str, zones: &[u32], constraint: u32) -> bool {
        self.constraint_attr_path(control_type, zones, constraint, ConstraintAttr::PowerLimitUw)
            .is_file()
    }

    /// Count the consecutive constraints of a zone, starting at 0.
    #[must_use]
    pub fn count_constraints(&self, control_type: &str, zones: &[u32]) -> u32 {
        let mut count = 0;
        while count < u32::MAX && self.constraint_exists(control_type, zones, count) {
            count += 1;
        }
        count
    }

    /// # Errors
    ///
    /// Returns [`AttrError::Io`] if the attribute cannot be read.
    pub fn read_zone_string(
        &self,
        control_type: &str,
        zones: &[u32],
        attr: ZoneAttr,
    ) -> Result<String, AttrError> {
        read_string(self.zone_attr_path(control_type, zones, attr))
    }

    /// # Errors
    ///
    /// Returns [`AttrError::Io`] if the attribute cannot be read and
    /// [`AttrError::Parse`] if its content is not an unsigned integer.
    pub fn read_zone_u64(
        &self,
        control_type: &str,
        zones: &[u32],
        attr: ZoneAttr,
    ) -> Result<u64, AttrError> {
        read_u64(self.zone_attr_path(control_type, zones, attr))
    }

    /// # Errors
    ///
    /// Returns [`AttrError::Io`] if the attribute cannot be written.
    pub fn write_zone_u64(
        &self,
        control_type: &str,
        zones: &[u32],
        attr: ZoneAttr,
        value: u64,
    ) -> Result<(), AttrError> {
        write_u64(self.zone_attr_path(control_type, zones, attr), value)
    }

    /// # Errors
    ///
    /// Returns [`AttrError::Io`] if the attribute cannot be read.
    pub fn read_constraint_string(
        &self,
        control_type: &str,
        zones: &[u32],
        constraint: u32,
        attr: ConstraintAttr,
    ) -> Result<String, AttrError> {
        read_string(self.constraint_attr_path(control_type, zones, constraint, attr))
    }

    /// # Errors
    ///
    /// Returns [`AttrError::Io`] if the attribute cannot be read and
    /// [`AttrError::Parse`] if its content is not an unsigned integer.
    pub fn read_constraint_u64(
        &self,
        control_type: &str,
        zones: &[u32],
        constraint: u32,
        attr: ConstraintAttr,
    ) -> Result<u64, AttrError> {
        read_u64(self.constraint_attr_path(control_type, zones, constraint, attr))
    }

    /// # Errors
    ///
    /// Returns [`AttrError::Io`] if the attribute cannot be written.
    pub fn write_constraint_u64(
        &self,
        control_type: &str,
        zones: &[u32],
        constraint: u32,
        attr: ConstraintAttr,
        value: u64,
    ) -> Result<(), AttrError> {
        write_u64(
            self.constraint_attr_path(control_type, zones, constraint, attr),
            value,
        )
    }
}

impl ZoneOracle for PowercapSysfs {
    fn exists(&self, control_type: &str, zones: &[u32]) -> bool {
        let dir = self.zone_dir(control_type, zones);
        let exists = dir.is_dir();
        log::trace!("Checked {dir}: exists = {exists}", dir = dir.display());
        exists
    }
}

fn read_string(path: PathBuf) -> Result<String, AttrError> {
    match fs::read_to_string(&path) {
        Ok(content) => Ok(content.trim().to_owned()),
        Err(source) => Err(AttrError::Io { path, source }),
    }
}

fn read_u64(path: PathBuf) -> Result<u64, AttrError> {
    let content = read_string(path.clone())?;
    content
        .parse()
        .map_err(|source| AttrError::Parse {
            path,
            content,
            source,
        })
}

fn write_u64(path: PathBuf, value: u64) -> Result<(), AttrError> {
    log::debug!("Writing {value} to {path}", path = path.display());
    fs::write(&path, value.to_string()).map_err(|source| AttrError::Io { path, source })
}
