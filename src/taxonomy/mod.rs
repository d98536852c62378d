//! Parent/child navigation over the logic graphs selected by a manifold coordinate.

pub mod service;
pub mod snapshot;

pub use service::TaxonomyService;
pub use snapshot::{TaxonomyEdge, TaxonomyLink, TaxonomySnapshot};
