//! Pair corresponding images from two folders by a filename-derived identity
//! token, package the matched pairs into a durable record file, and stream
//! them back as normalized pixel tensors with shuffling, batching,
//! repetition, and composable augmentation.
//!
//! Packaging: [`scan_folder`] + [`match_pairs`] + [`pack_pairs`] (or the
//! [`pack_folders`] wrapper). Loading: [`load_records`] with a
//! [`preprocess`] chain.

#![warn(missing_docs)]

/// Image codec collaborator: file reading, dimension probing, pixel decode.
pub mod codec;
/// Centralized constants for record fields, store layout, and the loader.
pub mod constants;
/// Identity extraction policies.
pub mod identity;
/// Record loading, decoding, and batching pipeline.
pub mod loader;
/// Folder scanning and pair matching.
pub mod matcher;
/// Record packaging.
pub mod packager;
/// Composable preprocessing transforms.
pub mod preprocess;
/// Record and example data types plus the flat field encoding.
pub mod records;
/// Record sink/source over the append-only key/value store.
pub mod store;
/// Shared type aliases.
pub mod types;

mod errors;

pub use errors::DatasetError;
pub use identity::{IdentityExtractor, RegexIdentity, SuffixIdentity};
pub use loader::{LoaderOptions, RecordBatches, load_records};
pub use matcher::{MatchedPair, MatchedPairs, match_pairs, scan_folder};
pub use packager::{pack_folders, pack_pairs};
pub use preprocess::{
    ExampleTransform, ImageField, Transform, random_crop, random_flips, random_rotations,
};
pub use records::{
    DecodedExample, DecodedImage, FieldValue, ImageRecord, RecordFields, TrainingExample,
};
pub use store::{RecordReader, RecordWriter};
pub use types::{FieldKey, IdentityToken, PathString};
