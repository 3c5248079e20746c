pub mod traits;
pub mod api;

pub use traits::ListingSource;
pub use api::ApiSource;

#[cfg(test)]
pub use traits::MockListingSource;
