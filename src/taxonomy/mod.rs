pub mod ancestry;
pub mod taxon;

pub use ancestry::AncestryIndex;
pub use taxon::Taxon;
