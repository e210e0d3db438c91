//! Core data types for manifests, package queries, vulnerabilities and scan results.
//!
//! - [`ManifestEntry`] - A direct dependency as declared in a manifest
//! - [`PackageQuery`] - The normalized lookup key sent to the vulnerability database
//! - [`Ecosystem`] - The package platform a dependency belongs to
//! - [`Vulnerability`] - An advisory affecting one package
//! - [`ScanResult`] - Complete scan results
//!
//! # Example
//!
//! ```
//! use depshield::model::{Ecosystem, ManifestEntry, ScanResult};
//!
//! let entry = ManifestEntry::new(Ecosystem::Npm, "lodash", Some("^4.17.15")).unwrap();
//! let result = ScanResult::empty("acme/app");
//!
//! assert_eq!(entry.name, "lodash");
//! assert_eq!(result.summary.total_packages, 0);
//! ```

mod package;
mod result;
mod vulnerability;

pub use package::*;
pub use result::*;
pub use vulnerability::*;
