//! # komet-core
//!
//! A Rust library for versioned clinical terminology: every edit is a new version carrying a
//! STAMP, and every read resolves versions through a coordinate.
//!
//! ## Overview
//!
//! komet-core never overwrites terminology content. Concepts and semantics are *chronologies*:
//! append-only lists of versions, each stamped with **S**tatus, **T**ime, **A**uthor,
//! **M**odule and **P**ath. What a user sees is decided at read time by a [`coordinate`]:
//! which path and point in time, which statuses and modules, which language and dialects,
//! stated or inferred logic.
//!
//! ### Key Features
//!
//! - **Version resolution**: per-path latest versions along a path's origin chain, with
//!   contradictions reported instead of silently resolved
//! - **Coordinates**: immutable stamp filter, language, logic, navigation, edit and manifold
//!   coordinates with a versioned binary marshal format
//! - **Logic graphs**: description-logic definitions as a tagged node arena with a builder,
//!   order-insensitive equivalence and UUID or nid wire encodings
//! - **Taxonomy snapshots**: cached parent/child navigation per manifold coordinate,
//!   invalidated by commits
//! - **Classification**: stated logic graphs in, inferred logic graphs out, written only when
//!   they change
//!
//! ## Architecture
//!
//! - **[`stamp`]**: stamps, positions and paths
//! - **[`coordinate`]**: coordinates, their marshal format and the coordinate interner
//! - **[`calculator`]**: `RelativePositionCalculator`, the version resolution engine
//! - **[`chronology`]** and **[`store`]**: versions, chronologies and the persistence boundary
//! - **[`logic`]**: logic graph nodes, expressions and the builder
//! - **[`commit`]**: transactions, change checkers and commit listeners
//! - **[`taxonomy`]**: taxonomy snapshots and their cache
//! - **[`index`]**: free-text and identifier lookups
//! - **[`task`]** and **[`classifier`]**: tracked background work and the classification pipeline
//! - **[`context`]**: the composition root wiring it all together
//!
//! ## Quick Start
//!
//! ```rust
//! use komet_core::{
//!     calculator::RelativePositionCalculator,
//!     chronology::{Chronology, Version, VersionData},
//!     coordinate::StampFilter,
//!     identifier::{uuid_from_name, Nid},
//!     metadata::{CORE_MODULE, DEVELOPMENT_PATH, USER},
//!     stamp::{PathRegistry, Stamp, Status},
//! };
//!
//! # fn main() -> Result<(), komet_core::KometError> {
//! let paths = PathRegistry::with_defaults();
//! let filter = StampFilter::development_latest_active_only();
//! let calc = RelativePositionCalculator::new(&filter, &paths)?;
//!
//! let stamp = |status, time| Stamp::new(status, time, USER.nid, CORE_MODULE.nid, DEVELOPMENT_PATH.nid);
//! let concept = Chronology::new_concept(Nid::new(1_000), uuid_from_name("Asthma"))
//!     .with_version(Version::new(stamp(Status::Active, 10)?, VersionData::Concept))
//!     .with_version(Version::new(stamp(Status::Inactive, 20)?, VersionData::Concept));
//!
//! // Inactive versions are discarded first; the active-only view keeps the earlier version.
//! assert_eq!(concept.latest_version(&calc).get().map(|v| v.stamp.time), Some(10));
//! # Ok(())
//! # }
//! ```

pub mod calculator;
pub mod chronology;
pub mod classifier;
pub mod commit;
pub mod config;
pub mod context;
pub mod coordinate;
pub mod error;
pub mod event;
pub mod identifier;
pub mod index;
pub mod logic;
pub mod metadata;
pub mod stamp;
pub mod store;
pub mod task;
pub mod taxonomy;
#[cfg(test)]
mod tests;

pub use error::*;
