// SPDX-FileCopyrightText: The powercap-tree authors
// SPDX-License-Identifier: MPL-2.0

//! Print the zones of a powercap control type.

use std::{
    io::{self, Write as _},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::Context as _;
use clap::{ArgGroup, Parser};
use powercap_tree::{
    info::{InfoQuery, InfoRequest, ZoneSelector},
    sysfs::{ConstraintAttr, ZoneAttr, POWERCAP_SYSFS_ROOT},
    PowercapSysfs,
};

const CONTROL_TYPE_INTEL_RAPL: &str = "intel-rapl";

#[derive(Debug, Parser)]
#[command(name = "powercap-info")]
#[command(about = "Print the zones and constraints of a powercap control type", long_about = None)]
#[command(group(
    ArgGroup::new("value")
        .multiple(false)
        .args([
            "nzones",
            "z_energy",
            "z_max_energy_range",
            "z_enabled",
            "z_name",
            "c_power_limit",
            "c_time_window",
            "c_max_power",
            "c_name",
        ])
))]
#[allow(clippy::struct_excessive_bools)]
struct Args {
    /// Name of the control type
    #[arg(long, default_value = CONTROL_TYPE_INTEL_RAPL)]
    control_type: String,

    /// Mount point of the powercap class
    #[arg(long, default_value = POWERCAP_SYSFS_ROOT)]
    sysfs_root: PathBuf,

    /// Zone, e.g. "0" or "0:1". A trailing ":" excludes its subzones, e.g. "0:"
    #[arg(
        short,
        long,
        value_name = "ZONE",
        visible_short_alias = 'p',
        visible_alias = "package"
    )]
    zone: Option<ZoneSelector>,

    /// Constraint of the zone (zone 0 if --zone is not set)
    #[arg(short, long, value_name = "CONSTRAINT")]
    constraint: Option<u32>,

    /// Print the number of zones, or the number of subzones if --zone is set
    #[arg(short, long, conflicts_with = "constraint")]
    nzones: bool,

    /// Print the zone energy counter
    #[arg(short = 'j', long, conflicts_with = "constraint")]
    z_energy: bool,

    /// Print the zone maximum energy counter range
    #[arg(short = 'J', long, conflicts_with = "constraint")]
    z_max_energy_range: bool,

    /// Print whether the zone is enabled
    #[arg(short = 'e', long, conflicts_with = "constraint")]
    z_enabled: bool,

    /// Print the zone name
    #[arg(short = 'x', long, conflicts_with = "constraint")]
    z_name: bool,

    /// Print the constraint power limit
    #[arg(short = 'l', long, requires = "constraint")]
    c_power_limit: bool,

    /// Print the constraint time window
    #[arg(short = 's', long, requires = "constraint")]
    c_time_window: bool,

    /// Print the constraint maximum allowed power
    #[arg(short = 'U', long, requires = "constraint")]
    c_max_power: bool,

    /// Print the constraint name
    #[arg(short = 'y', long, requires = "constraint")]
    c_name: bool,

    /// Print errors when attributes are not available and enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn request(&self) -> InfoRequest {
        [
            (self.nzones, InfoRequest::CountZones),
            (self.z_energy, InfoRequest::Zone(ZoneAttr::EnergyUj)),
            (
                self.z_max_energy_range,
                InfoRequest::Zone(ZoneAttr::MaxEnergyRangeUj),
            ),
            (self.z_enabled, InfoRequest::Zone(ZoneAttr::Enabled)),
            (self.z_name, InfoRequest::Zone(ZoneAttr::Name)),
            (
                self.c_power_limit,
                InfoRequest::Constraint(ConstraintAttr::PowerLimitUw),
            ),
            (
                self.c_time_window,
                InfoRequest::Constraint(ConstraintAttr::TimeWindowUs),
            ),
            (
                self.c_max_power,
                InfoRequest::Constraint(ConstraintAttr::MaxPowerUw),
            ),
            (self.c_name, InfoRequest::Constraint(ConstraintAttr::Name)),
        ]
        .into_iter()
        .find_map(|(selected, request)| selected.then_some(request))
        .unwrap_or_default()
    }

    fn query(&self) -> InfoQuery {
        InfoQuery {
            zone: self.zone.clone(),
            constraint: self.constraint,
            request: self.request(),
            verbose: self.verbose,
            ..InfoQuery::new(&self.control_type)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if args.control_type == CONTROL_TYPE_INTEL_RAPL {
                eprintln!("Ensure that the intel_rapl kernel module is loaded");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let sysfs = PowercapSysfs::new(&args.sysfs_root);
    let mut out = io::stdout().lock();
    args.query().run(&sysfs, &mut out)?;
    out.flush().context("failed to flush output")
}
