pub mod assemble;
pub mod models;
pub mod normalize;

pub use assemble::{PlaceholderMedia, assemble};
pub use models::DraftListing;
pub use normalize::{ListingStatus, slugify};
