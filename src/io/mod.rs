//! Dataset loading and pair export.

pub mod kapture;

pub use kapture::{load_dataset, load_pairs, write_pairs, write_pairs_file};
