use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::codec::decode_pixels;
use crate::constants::loader::{
    DEFAULT_BATCH_SIZE, DEFAULT_NUM_THREADS, DEFAULT_PREFETCH_BATCHES, DEFAULT_SHUFFLE_BUFFER,
};
use crate::errors::DatasetError;
use crate::preprocess::ExampleTransform;
use crate::records::{DecodedExample, DecodedImage, ImageRecord, RecordFields, TrainingExample};
use crate::store::RecordReader;

/// Options controlling the record loading pipeline.
#[derive(Clone, Debug)]
pub struct LoaderOptions {
    /// Whether to apply the windowed shuffle.
    pub shuffle: bool,
    /// Number of examples per emitted batch.
    pub batch_size: usize,
    /// Number of passes over the dataset; negative means repeat forever.
    pub repeat_count: i64,
    /// Decode images as 1-channel greyscale instead of 3-channel color.
    pub greyscale: bool,
    /// Number of decode worker threads.
    pub num_threads: usize,
    /// Keep raw records in memory after the first pass.
    pub cache: bool,
    /// Lookahead window size for the approximate shuffle.
    pub shuffle_buffer: usize,
    /// Number of batches prepared ahead of consumption.
    pub prefetch_batches: usize,
    /// Fixed RNG seed for the shuffle; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            shuffle: true,
            batch_size: DEFAULT_BATCH_SIZE,
            repeat_count: -1,
            greyscale: false,
            num_threads: DEFAULT_NUM_THREADS,
            cache: false,
            shuffle_buffer: DEFAULT_SHUFFLE_BUFFER,
            prefetch_batches: DEFAULT_PREFETCH_BATCHES,
            seed: None,
        }
    }
}

/// Open a record file and stream decoded, preprocessed, batched examples.
///
/// The pipeline stages run in order: raw record streaming, repetition,
/// optional caching, optional windowed shuffle, parallel decode plus
/// `preprocess`, batching, and bounded prefetch. Work only happens while
/// batches are being pulled; dropping the returned iterator cancels the
/// pipeline and joins its threads.
pub fn load_records(
    path: &Path,
    preprocess: ExampleTransform,
    options: LoaderOptions,
) -> Result<RecordBatches, DatasetError> {
    if options.batch_size == 0 {
        return Err(DatasetError::Configuration(
            "batch_size must be at least 1".to_string(),
        ));
    }
    let reader = RecordReader::open(path)?;
    debug!(
        path = %path.display(),
        records = reader.len(),
        preprocess = preprocess.name(),
        "opened record file"
    );
    Ok(RecordBatches::spawn(reader, preprocess, options))
}

/// Batched lazy sequence of decoded examples.
///
/// Yields `Err` once on the first fatal failure, then ends.
pub struct RecordBatches {
    receiver: Option<mpsc::Receiver<Result<Vec<DecodedExample>, DatasetError>>>,
    handles: Vec<thread::JoinHandle<()>>,
    failed: bool,
}

impl RecordBatches {
    fn spawn(reader: RecordReader, preprocess: ExampleTransform, options: LoaderOptions) -> Self {
        let num_threads = options.num_threads.max(1);
        let channels = if options.greyscale { 1 } else { 3 };

        let (work_tx, work_rx) = mpsc::sync_channel::<Result<RecordFields, DatasetError>>(
            num_threads.saturating_mul(2),
        );
        let (decoded_tx, decoded_rx) = mpsc::sync_channel::<Result<DecodedExample, DatasetError>>(
            num_threads.saturating_mul(2),
        );
        let (batch_tx, batch_rx) = mpsc::sync_channel(options.prefetch_batches.max(1));

        let mut handles = Vec::with_capacity(num_threads + 2);

        let feeder_options = options.clone();
        handles.push(thread::spawn(move || {
            feed_records(reader, feeder_options, work_tx);
        }));

        let shared_work = Arc::new(Mutex::new(work_rx));
        for _ in 0..num_threads {
            let work = Arc::clone(&shared_work);
            let sender = decoded_tx.clone();
            let preprocess = preprocess.clone();
            handles.push(thread::spawn(move || {
                decode_worker(work, sender, preprocess, channels);
            }));
        }
        drop(decoded_tx);

        let batch_size = options.batch_size;
        handles.push(thread::spawn(move || {
            assemble_batches(decoded_rx, batch_tx, batch_size);
        }));

        Self {
            receiver: Some(batch_rx),
            handles,
            failed: false,
        }
    }
}

impl Iterator for RecordBatches {
    type Item = Result<Vec<DecodedExample>, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.receiver.as_ref()?.recv().ok()?;
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

impl Drop for RecordBatches {
    fn drop(&mut self) {
        // Closing the batch channel unwinds the whole pipeline.
        self.receiver.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Streams raw records for the configured number of passes, applying the
/// optional in-memory cache and windowed shuffle before handing records to
/// the decode pool.
fn feed_records(
    reader: RecordReader,
    options: LoaderOptions,
    sender: mpsc::SyncSender<Result<RecordFields, DatasetError>>,
) {
    let raw = RawStream::new(reader, options.repeat_count, options.cache);
    if options.shuffle {
        let stream = WindowShuffle::new(raw, options.shuffle_buffer.max(1), options.seed);
        pump(stream, sender);
    } else {
        pump(raw, sender);
    }
}

fn pump<I>(stream: I, sender: mpsc::SyncSender<Result<RecordFields, DatasetError>>)
where
    I: Iterator<Item = Result<RecordFields, DatasetError>>,
{
    for item in stream {
        let stop = item.is_err();
        if sender.send(item).is_err() || stop {
            return;
        }
    }
}

fn decode_worker(
    work: Arc<Mutex<mpsc::Receiver<Result<RecordFields, DatasetError>>>>,
    sender: mpsc::SyncSender<Result<DecodedExample, DatasetError>>,
    preprocess: ExampleTransform,
    channels: usize,
) {
    loop {
        let item = {
            let guard = match work.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            guard.recv()
        };
        let fields = match item {
            Ok(Ok(fields)) => fields,
            Ok(Err(err)) => {
                let _ = sender.send(Err(err));
                return;
            }
            Err(_) => return,
        };
        let decoded = decode_example(&fields, channels).map(|example| preprocess.apply(example));
        let stop = decoded.is_err();
        if sender.send(decoded).is_err() || stop {
            return;
        }
    }
}

fn assemble_batches(
    decoded: mpsc::Receiver<Result<DecodedExample, DatasetError>>,
    sender: mpsc::SyncSender<Result<Vec<DecodedExample>, DatasetError>>,
    batch_size: usize,
) {
    loop {
        let mut batch = Vec::with_capacity(batch_size);
        let mut closed = false;
        while batch.len() < batch_size {
            match decoded.recv() {
                Ok(Ok(example)) => batch.push(example),
                Ok(Err(err)) => {
                    let _ = sender.send(Err(err));
                    return;
                }
                Err(_) => {
                    closed = true;
                    break;
                }
            }
        }
        // The final partial batch is kept rather than dropped.
        if !batch.is_empty() && sender.send(Ok(batch)).is_err() {
            return;
        }
        if closed {
            return;
        }
    }
}

/// Decode one flat record into the nested example structure.
fn decode_example(fields: &RecordFields, channels: usize) -> Result<DecodedExample, DatasetError> {
    let example = TrainingExample::from_fields(fields)?;
    Ok(DecodedExample {
        a: decode_image(&example.a, channels)?,
        b: decode_image(&example.b, channels)?,
        key: example.key,
        num: example.num,
    })
}

fn decode_image(record: &ImageRecord, channels: usize) -> Result<DecodedImage, DatasetError> {
    // The empty placeholder record decodes to an empty tensor so callers can
    // post-filter it with `DecodedExample::both_valid`.
    if record.width == 0 && record.encoded.is_empty() {
        return Ok(DecodedImage {
            filename: record.filename.clone(),
            width: 0,
            height: 0,
            encoded: Vec::new(),
            image: ndarray::Array3::zeros((0, 0, channels)),
        });
    }
    let image = decode_pixels(&record.encoded, channels).map_err(|err| match err {
        DatasetError::Codec { reason, .. } => DatasetError::Codec {
            path: record.filename.clone(),
            reason,
        },
        other => other,
    })?;
    Ok(DecodedImage {
        filename: record.filename.clone(),
        width: record.width,
        height: record.height,
        encoded: record.encoded.clone(),
        image,
    })
}

/// Repeating raw-record stream with optional first-pass caching.
struct RawStream {
    reader: RecordReader,
    total: u64,
    cursor: u64,
    pass: i64,
    repeat_count: i64,
    cache: Option<Vec<RecordFields>>,
}

impl RawStream {
    fn new(reader: RecordReader, repeat_count: i64, cache: bool) -> Self {
        let total = reader.len();
        Self {
            reader,
            total,
            cursor: 0,
            pass: 0,
            repeat_count,
            cache: cache.then(|| Vec::with_capacity(total as usize)),
        }
    }
}

impl Iterator for RawStream {
    type Item = Result<RecordFields, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.total == 0 {
            return None;
        }
        loop {
            if self.repeat_count >= 0 && self.pass >= self.repeat_count {
                return None;
            }
            if self.cursor < self.total {
                let ordinal = self.cursor;
                self.cursor += 1;
                if self.pass > 0
                    && let Some(cache) = self.cache.as_ref()
                {
                    return Some(Ok(cache[ordinal as usize].clone()));
                }
                let fields = match self.reader.read_fields(ordinal) {
                    Ok(fields) => fields,
                    Err(err) => return Some(Err(err)),
                };
                if let Some(cache) = self.cache.as_mut() {
                    cache.push(fields.clone());
                }
                return Some(Ok(fields));
            }
            self.pass = self.pass.saturating_add(1);
            self.cursor = 0;
        }
    }
}

/// Approximate shuffle over a bounded lookahead buffer.
///
/// Fills a window of `capacity` items and emits a uniformly random element
/// of the window each pull, refilling from the inner stream. Not a global
/// shuffle; the spread is limited by the window size.
struct WindowShuffle<I: Iterator> {
    inner: I,
    buffer: Vec<I::Item>,
    capacity: usize,
    rng: StdRng,
    exhausted: bool,
}

impl<I: Iterator> WindowShuffle<I> {
    fn new(inner: I, capacity: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            inner,
            buffer: Vec::with_capacity(capacity),
            capacity,
            rng,
            exhausted: false,
        }
    }
}

impl<I: Iterator> Iterator for WindowShuffle<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted && self.buffer.len() < self.capacity {
            match self.inner.next() {
                Some(item) => self.buffer.push(item),
                None => self.exhausted = true,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let idx = self.rng.random_range(0..self.buffer.len());
        Some(self.buffer.swap_remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_shuffle_is_a_permutation() {
        let input: Vec<u32> = (0..20).collect();
        let mut out: Vec<u32> =
            WindowShuffle::new(input.clone().into_iter(), 4, Some(7)).collect();
        assert_ne!(out, input);
        out.sort_unstable();
        assert_eq!(out, input);
    }

    #[test]
    fn window_shuffle_is_deterministic_under_a_seed() {
        let input: Vec<u32> = (0..50).collect();
        let first: Vec<u32> = WindowShuffle::new(input.clone().into_iter(), 8, Some(3)).collect();
        let second: Vec<u32> = WindowShuffle::new(input.into_iter(), 8, Some(3)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn window_shuffle_spread_is_bounded_by_the_window() {
        let input: Vec<usize> = (0..100).collect();
        let capacity = 5;
        let out: Vec<usize> =
            WindowShuffle::new(input.into_iter(), capacity, Some(1)).collect();
        for (position, &value) in out.iter().enumerate() {
            assert!(value <= position + capacity);
        }
    }

    #[test]
    fn default_options_match_the_documented_call_signature() {
        let options = LoaderOptions::default();
        assert!(options.shuffle);
        assert_eq!(options.batch_size, 32);
        assert_eq!(options.repeat_count, -1);
        assert!(!options.greyscale);
        assert_eq!(options.num_threads, 4);
        assert!(!options.cache);
    }
}
