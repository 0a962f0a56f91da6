//! Vector index, metadata store and their on-disk persistence

mod index;
pub mod persistence;
mod store;

pub use index::{cosine_similarity, FlatIndex};
pub use store::{CompactionReport, IndexEntry, IndexStore, LoadReport, SearchHit, StoreStats};
