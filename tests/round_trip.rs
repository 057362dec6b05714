use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};
use tempfile::tempdir;

use pairset::{
    ExampleTransform, LoaderOptions, SuffixIdentity, load_records, pack_folders,
};

fn write_png(dir: &Path, name: &str, width: u32, height: u32, color: [u8; 3]) {
    RgbImage::from_pixel(width, height, Rgb(color))
        .save(dir.join(name))
        .unwrap();
}

fn build_folders(root: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let source = root.join("source");
    let target = root.join("target");
    fs::create_dir_all(&source).unwrap();
    fs::create_dir_all(&target).unwrap();

    // Identities 1..=3 match; 0 and 9 are orphans.
    for identity in 1..=3u32 {
        write_png(&source, &format!("photo_{identity}.png"), 6, 4, [255, 0, 0]);
        write_png(&target, &format!("mask_{identity}.png"), 5, 3, [0, 0, 255]);
    }
    write_png(&source, "photo_0.png", 6, 4, [255, 0, 0]);
    write_png(&target, "mask_9.png", 5, 3, [0, 0, 255]);

    (source, target)
}

#[test]
fn packing_then_loading_round_trips_all_matched_pairs() {
    let dir = tempdir().unwrap();
    let (source, target) = build_folders(dir.path());
    let output = dir.path().join("pairs.bin");

    let count = pack_folders(
        &output,
        &source,
        &target,
        &SuffixIdentity,
        None::<fn(&str) -> bool>,
    )
    .unwrap();
    assert_eq!(count, 3);

    let options = LoaderOptions {
        shuffle: false,
        batch_size: 2,
        repeat_count: 1,
        num_threads: 1,
        ..LoaderOptions::default()
    };
    let batches: Vec<_> = load_records(&output, ExampleTransform::identity(), options)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    // Partial final batch is kept.
    let sizes: Vec<usize> = batches.iter().map(|batch| batch.len()).collect();
    assert_eq!(sizes, vec![2, 1]);

    let examples: Vec<_> = batches.into_iter().flatten().collect();
    let keys: Vec<&str> = examples.iter().map(|example| example.key.as_str()).collect();
    assert_eq!(keys, vec!["1", "2", "3"]);

    for (position, example) in examples.iter().enumerate() {
        assert_eq!(example.num, position as i64);
        assert_eq!(example.a.filename, format!("photo_{}.png", example.key));
        assert_eq!(example.b.filename, format!("mask_{}.png", example.key));
        assert!(example.both_valid());

        assert_eq!((example.a.width, example.a.height), (6, 4));
        assert_eq!(example.a.image.dim(), (4, 6, 3));
        assert_eq!((example.b.width, example.b.height), (5, 3));
        assert_eq!(example.b.image.dim(), (3, 5, 3));

        // Red source pixels: 255 -> 1.0, 0 -> 0.0.
        assert!((example.a.image[[0, 0, 0]] - 1.0).abs() < f32::EPSILON);
        assert!((example.a.image[[0, 0, 1]] - 0.0).abs() < f32::EPSILON);
    }
}

#[test]
fn parallel_decoding_preserves_the_example_set() {
    let dir = tempdir().unwrap();
    let (source, target) = build_folders(dir.path());
    let output = dir.path().join("pairs.bin");
    pack_folders(
        &output,
        &source,
        &target,
        &SuffixIdentity,
        None::<fn(&str) -> bool>,
    )
    .unwrap();

    let options = LoaderOptions {
        shuffle: false,
        batch_size: 1,
        repeat_count: 1,
        num_threads: 4,
        ..LoaderOptions::default()
    };
    let examples: Vec<_> = load_records(&output, ExampleTransform::identity(), options)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
        .into_iter()
        .flatten()
        .collect();

    let keys: BTreeSet<String> = examples.iter().map(|example| example.key.clone()).collect();
    assert_eq!(
        keys,
        BTreeSet::from(["1".to_string(), "2".to_string(), "3".to_string()])
    );
}

#[test]
fn greyscale_loading_decodes_single_channel_tensors() {
    let dir = tempdir().unwrap();
    let (source, target) = build_folders(dir.path());
    let output = dir.path().join("pairs.bin");
    pack_folders(
        &output,
        &source,
        &target,
        &SuffixIdentity,
        None::<fn(&str) -> bool>,
    )
    .unwrap();

    let options = LoaderOptions {
        shuffle: false,
        batch_size: 8,
        repeat_count: 1,
        greyscale: true,
        num_threads: 1,
        ..LoaderOptions::default()
    };
    let batches: Vec<_> = load_records(&output, ExampleTransform::identity(), options)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(batches.len(), 1);
    for example in &batches[0] {
        assert_eq!(example.a.image.dim(), (4, 6, 1));
        assert_eq!(example.b.image.dim(), (3, 5, 1));
    }
}

#[test]
fn preprocessing_applies_to_the_bound_field_only() {
    let dir = tempdir().unwrap();
    let (source, target) = build_folders(dir.path());
    let output = dir.path().join("pairs.bin");
    pack_folders(
        &output,
        &source,
        &target,
        &SuffixIdentity,
        None::<fn(&str) -> bool>,
    )
    .unwrap();

    let crop = pairset::random_crop(2, 0, Some(13)).on(pairset::ImageField::A);
    let options = LoaderOptions {
        shuffle: false,
        batch_size: 8,
        repeat_count: 1,
        num_threads: 1,
        ..LoaderOptions::default()
    };
    let batches: Vec<_> = load_records(&output, crop, options)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    for example in batches.into_iter().flatten() {
        assert_eq!(example.a.image.dim(), (2, 2, 3));
        assert_eq!(example.b.image.dim(), (3, 5, 3));
    }
}
