/// Constants used by the flat record field layout.
pub mod records {
    /// Field-key prefix for the source-side image.
    pub const PREFIX_A: &str = "A/";
    /// Field-key prefix for the target-side image.
    pub const PREFIX_B: &str = "B/";
    /// Image width field name (suffix under a side prefix).
    pub const FIELD_WIDTH: &str = "width";
    /// Image height field name (suffix under a side prefix).
    pub const FIELD_HEIGHT: &str = "height";
    /// Original basename field name (suffix under a side prefix).
    pub const FIELD_FILENAME: &str = "filename";
    /// Encoded image bytes field name (suffix under a side prefix).
    pub const FIELD_ENCODED: &str = "encoded";
    /// Identity key field name.
    pub const FIELD_KEY: &str = "key";
    /// Ordinal counter field name.
    pub const FIELD_NUM: &str = "num";
}

/// Constants used by record-store persistence and wire encoding.
pub mod store {
    /// Key used for store-level metadata.
    pub const META_KEY: &[u8] = b"__meta__";
    /// Key prefix for packed example records.
    pub const RECORD_KEY_PREFIX: &[u8] = b"rec:";
    /// Version tag for the store metadata header.
    pub const STORE_VERSION: u8 = 1;
    /// Version tag for packed example payloads.
    pub const RECORD_VERSION: u8 = 1;
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
}

/// Constants used by loader runtime behavior.
pub mod loader {
    /// Default batch size.
    pub const DEFAULT_BATCH_SIZE: usize = 32;
    /// Default windowed-shuffle buffer size.
    pub const DEFAULT_SHUFFLE_BUFFER: usize = 256;
    /// Default number of decode worker threads.
    pub const DEFAULT_NUM_THREADS: usize = 4;
    /// Default number of prefetched batches kept ahead of consumption.
    pub const DEFAULT_PREFETCH_BATCHES: usize = 10;
}
