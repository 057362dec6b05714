use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::constants::records::{
    FIELD_ENCODED, FIELD_FILENAME, FIELD_HEIGHT, FIELD_KEY, FIELD_NUM, FIELD_WIDTH, PREFIX_A,
    PREFIX_B,
};
use crate::errors::DatasetError;
use crate::types::{FieldKey, IdentityToken};

/// A single image captured for packaging: original basename, pixel
/// dimensions, and the raw encoded file bytes.
///
/// `width` always holds the image's width and `height` its height; packager
/// and loader agree on this convention.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Original basename of the image file.
    pub filename: String,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Raw encoded file contents (PNG/JPEG/... bytes, not pixels).
    pub encoded: Vec<u8>,
}

impl ImageRecord {
    /// Placeholder record standing in for a deliberately missing image.
    ///
    /// Zero dimensions mark the sentinel; `DecodedExample::both_valid`
    /// filters it out downstream.
    pub fn empty() -> Self {
        Self {
            filename: String::new(),
            width: 0,
            height: 0,
            encoded: Vec::new(),
        }
    }
}

/// One packed training example: a matched source/target image pair plus the
/// shared identity key and its ordinal position in the packaging run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Identity token shared by both images.
    pub key: IdentityToken,
    /// Monotonic ordinal assigned in (sorted) matcher order.
    pub num: i64,
    /// Source-side image.
    pub a: ImageRecord,
    /// Target-side image.
    pub b: ImageRecord,
}

/// Value stored under one flat record field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub enum FieldValue {
    /// Integer field (dimensions, ordinal).
    Int(i64),
    /// String field (filenames, identity key).
    Str(String),
    /// Byte-blob field (encoded image contents).
    Bytes(Vec<u8>),
}

/// Flattened record representation written to the record sink.
pub type RecordFields = Vec<(FieldKey, FieldValue)>;

impl TrainingExample {
    /// Flatten into the namespaced field list stored in the record sink.
    pub fn to_fields(&self) -> RecordFields {
        let mut fields = RecordFields::with_capacity(10);
        push_image_fields(&mut fields, PREFIX_A, &self.a);
        push_image_fields(&mut fields, PREFIX_B, &self.b);
        fields.push((FIELD_KEY.to_string(), FieldValue::Str(self.key.clone())));
        fields.push((FIELD_NUM.to_string(), FieldValue::Int(self.num)));
        fields
    }

    /// Rebuild the nested example from a flat field list.
    pub fn from_fields(fields: &RecordFields) -> Result<Self, DatasetError> {
        Ok(Self {
            key: take_str(fields, FIELD_KEY)?,
            num: take_int(fields, FIELD_NUM)?,
            a: image_from_fields(fields, PREFIX_A)?,
            b: image_from_fields(fields, PREFIX_B)?,
        })
    }
}

fn push_image_fields(fields: &mut RecordFields, prefix: &str, image: &ImageRecord) {
    fields.push((
        format!("{prefix}{FIELD_WIDTH}"),
        FieldValue::Int(i64::from(image.width)),
    ));
    fields.push((
        format!("{prefix}{FIELD_HEIGHT}"),
        FieldValue::Int(i64::from(image.height)),
    ));
    fields.push((
        format!("{prefix}{FIELD_FILENAME}"),
        FieldValue::Str(image.filename.clone()),
    ));
    fields.push((
        format!("{prefix}{FIELD_ENCODED}"),
        FieldValue::Bytes(image.encoded.clone()),
    ));
}

fn image_from_fields(fields: &RecordFields, prefix: &str) -> Result<ImageRecord, DatasetError> {
    let width = take_int(fields, &format!("{prefix}{FIELD_WIDTH}"))?;
    let height = take_int(fields, &format!("{prefix}{FIELD_HEIGHT}"))?;
    Ok(ImageRecord {
        filename: take_str(fields, &format!("{prefix}{FIELD_FILENAME}"))?,
        width: coerce_dimension(width, prefix, FIELD_WIDTH)?,
        height: coerce_dimension(height, prefix, FIELD_HEIGHT)?,
        encoded: take_bytes(fields, &format!("{prefix}{FIELD_ENCODED}"))?,
    })
}

fn coerce_dimension(value: i64, prefix: &str, field: &str) -> Result<u32, DatasetError> {
    u32::try_from(value).map_err(|_| {
        DatasetError::MalformedRecord(format!("field '{prefix}{field}' out of range: {value}"))
    })
}

fn lookup<'a>(fields: &'a RecordFields, key: &str) -> Result<&'a FieldValue, DatasetError> {
    fields
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value)
        .ok_or_else(|| DatasetError::MalformedRecord(format!("missing field '{key}'")))
}

fn take_int(fields: &RecordFields, key: &str) -> Result<i64, DatasetError> {
    match lookup(fields, key)? {
        FieldValue::Int(value) => Ok(*value),
        other => Err(type_mismatch(key, "int", other)),
    }
}

fn take_str(fields: &RecordFields, key: &str) -> Result<String, DatasetError> {
    match lookup(fields, key)? {
        FieldValue::Str(value) => Ok(value.clone()),
        other => Err(type_mismatch(key, "string", other)),
    }
}

fn take_bytes(fields: &RecordFields, key: &str) -> Result<Vec<u8>, DatasetError> {
    match lookup(fields, key)? {
        FieldValue::Bytes(value) => Ok(value.clone()),
        other => Err(type_mismatch(key, "bytes", other)),
    }
}

fn type_mismatch(key: &str, expected: &str, found: &FieldValue) -> DatasetError {
    let found = match found {
        FieldValue::Int(_) => "int",
        FieldValue::Str(_) => "string",
        FieldValue::Bytes(_) => "bytes",
    };
    DatasetError::MalformedRecord(format!(
        "field '{key}' has type {found}, expected {expected}"
    ))
}

/// One decoded image: stored metadata plus the normalized pixel tensor.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    /// Original basename of the image file.
    pub filename: String,
    /// Stored width in pixels.
    pub width: u32,
    /// Stored height in pixels.
    pub height: u32,
    /// Raw encoded file contents as packed.
    pub encoded: Vec<u8>,
    /// Pixel tensor, H x W x C, values normalized to [0, 1].
    pub image: Array3<f32>,
}

/// One decoded training example as handed to preprocessing and batching.
#[derive(Clone, Debug)]
pub struct DecodedExample {
    /// Identity token shared by both images.
    pub key: IdentityToken,
    /// Ordinal assigned at packaging time.
    pub num: i64,
    /// Decoded source-side image.
    pub a: DecodedImage,
    /// Decoded target-side image.
    pub b: DecodedImage,
}

impl DecodedExample {
    /// True iff both sides carry a real image (non-zero width).
    ///
    /// Filters out examples where the empty placeholder record was
    /// substituted for one side.
    pub fn both_valid(&self) -> bool {
        self.a.width != 0 && self.b.width != 0
    }
}
