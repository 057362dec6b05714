use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::ImageReader;
use ndarray::Array3;

use crate::errors::DatasetError;
use crate::records::ImageRecord;

/// Read a file and capture its basename, pixel dimensions, and raw bytes.
///
/// Dimensions are probed from the encoded bytes without a full pixel decode.
/// Unreadable files and undecodable bytes are fatal; packaging has no
/// partial-failure tolerance.
pub fn image_record(path: &Path) -> Result<ImageRecord, DatasetError> {
    let encoded = fs::read(path)?;
    let (width, height) = ImageReader::new(Cursor::new(&encoded))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|err| codec_error(path, err))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    Ok(ImageRecord {
        filename,
        width,
        height,
        encoded,
    })
}

/// Decode encoded image bytes into an H x W x C tensor of `[0, 1]` floats.
///
/// `channels` selects the output color space: 1 for greyscale, 3 for RGB.
pub fn decode_pixels(encoded: &[u8], channels: usize) -> Result<Array3<f32>, DatasetError> {
    let decoded = image::load_from_memory(encoded).map_err(|err| DatasetError::Codec {
        path: String::new(),
        reason: err.to_string(),
    })?;
    let tensor = match channels {
        1 => {
            let luma = decoded.to_luma8();
            let (width, height) = luma.dimensions();
            pixels_to_tensor(luma.into_raw(), height as usize, width as usize, 1)
        }
        3 => {
            let rgb = decoded.to_rgb8();
            let (width, height) = rgb.dimensions();
            pixels_to_tensor(rgb.into_raw(), height as usize, width as usize, 3)
        }
        other => {
            return Err(DatasetError::Configuration(format!(
                "unsupported channel count {other}, expected 1 or 3"
            )));
        }
    };
    Ok(tensor)
}

fn pixels_to_tensor(raw: Vec<u8>, height: usize, width: usize, channels: usize) -> Array3<f32> {
    let scaled: Vec<f32> = raw.into_iter().map(|byte| f32::from(byte) / 255.0).collect();
    Array3::from_shape_vec((height, width, channels), scaled)
        .expect("decoded buffer length matches its reported dimensions")
}

fn codec_error(path: &Path, err: image::ImageError) -> DatasetError {
    DatasetError::Codec {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn encode_png(image: &RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn image_record_captures_dimensions_and_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo_1.png");
        let png = encode_png(&RgbImage::from_pixel(5, 3, Rgb([10, 20, 30])));
        std::fs::write(&path, &png).unwrap();

        let record = image_record(&path).unwrap();
        assert_eq!(record.filename, "photo_1.png");
        assert_eq!(record.width, 5);
        assert_eq!(record.height, 3);
        assert_eq!(record.encoded, png);
    }

    #[test]
    fn image_record_fails_on_missing_file() {
        let dir = tempdir().unwrap();
        let err = image_record(&dir.path().join("absent.png")).unwrap_err();
        assert!(matches!(err, DatasetError::Io(_)));
    }

    #[test]
    fn image_record_fails_on_undecodable_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.png");
        std::fs::write(&path, b"not an image").unwrap();
        let err = image_record(&path).unwrap_err();
        assert!(matches!(err, DatasetError::Codec { .. }));
    }

    #[test]
    fn decode_normalizes_pixel_extremes() {
        let mut image = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        image.put_pixel(1, 1, Rgb([255, 255, 255]));
        let png = encode_png(&image);

        let tensor = decode_pixels(&png, 3).unwrap();
        assert_eq!(tensor.dim(), (2, 2, 3));
        assert!((tensor[[0, 0, 0]] - 0.0).abs() < f32::EPSILON);
        assert!((tensor[[1, 1, 0]] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn decode_supports_greyscale_output() {
        let png = encode_png(&RgbImage::from_pixel(4, 2, Rgb([255, 255, 255])));
        let tensor = decode_pixels(&png, 1).unwrap();
        assert_eq!(tensor.dim(), (2, 4, 1));
        assert!((tensor[[0, 0, 0]] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn decode_rejects_unsupported_channel_counts() {
        let png = encode_png(&RgbImage::from_pixel(1, 1, Rgb([0, 0, 0])));
        let err = decode_pixels(&png, 4).unwrap_err();
        assert!(matches!(err, DatasetError::Configuration(_)));
    }
}
