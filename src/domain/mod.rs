pub mod listing;
pub mod filter;
pub mod notification;

pub use listing::{IdentityKey, ListingItem, RawListing};
pub use filter::FilterSet;
pub use notification::Notification;
