//! Domain layer: table rows and their merge semantics.

pub mod entries;
pub mod errors;

pub use entries::{AddressEntry, AddressEntryUpdate, QueryBookkeeping, SignedVersionEntry};
pub use errors::StoreError;
