//! Vector store backends.
//!
//! [`FlatVectorStore`] is the default: exact brute-force cosine search with an
//! atomic JSON snapshot. With the `lance` feature, [`LanceVectorStore`] keeps
//! the same contract on top of a LanceDB table.

pub mod flat;
pub mod snapshot;

#[cfg(feature = "lance")]
pub mod lance;
#[cfg(feature = "lance")]
pub mod schema;
#[cfg(feature = "lance")]
pub mod table;

pub use flat::FlatVectorStore;
#[cfg(feature = "lance")]
pub use lance::LanceVectorStore;
pub use snapshot::{SNAPSHOT_FILE, FORMAT_VERSION};
