mod id;

pub use id::*;

/// The type used for primary keys of persisted records, such as users, rooms, and content.
pub type PrimaryKey = i32;
