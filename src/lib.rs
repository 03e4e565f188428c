// SPDX-FileCopyrightText: The powercap-tree authors
// SPDX-License-Identifier: MPL-2.0

//! Discovery and traversal of powercap zone hierarchies.
//!
//! The shape of a control type is not known in advance. It is discovered
//! by querying a [`ZoneOracle`] for the existence of zones, level by level,
//! and materialized as an immutable [`ZoneTree`] that can be walked in
//! preorder with a callback.

pub mod info;

mod node;
pub use self::node::{ZoneNode, ZoneVisit};

mod oracle;
pub use self::oracle::ZoneOracle;

pub mod sysfs;
pub use self::sysfs::PowercapSysfs;

mod tree;
pub use self::tree::{Error, ZoneTree};

mod zones;
pub use self::zones::ZonePath;
