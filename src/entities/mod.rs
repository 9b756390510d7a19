// Entity Models
// "Identity persists, values change"
//
// - location: the record of one tracked location (key + append-only log)
// - directory: display names → canonical codes, with inflection patterns

pub mod directory;
pub mod location;

pub use directory::{DirectoryEntry, NameDirectory, MIN_STEM_LEN, SEED_LOCATIONS};
pub use location::{EntityKey, EntityRecord, Status, StatusEvent};
