pub mod blend;
pub mod common_ancestor;
pub mod normalize;

pub use blend::{blend, CombinedScore};
pub use common_ancestor::{CommonAncestor, CommonAncestorResolver, ScoredTaxon};
pub use normalize::{normalize, Scored};
