/// Identity token extracted from a filename and shared by a matched pair.
/// Examples: `42` for `photo_42.png`; empty string means "no usable identity".
pub type IdentityToken = String;
/// File path strings used in logs and record payloads.
/// Example: `data/source/photo_42.png`
pub type PathString = String;
/// Namespaced field key inside a flattened record.
/// Examples: `A/width`, `B/encoded`, `key`, `num`
pub type FieldKey = String;
