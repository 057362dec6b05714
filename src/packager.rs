use std::path::Path;

use tracing::info;

use crate::codec::image_record;
use crate::errors::DatasetError;
use crate::identity::IdentityExtractor;
use crate::matcher::{MatchedPair, match_pairs, scan_folder};
use crate::records::TrainingExample;
use crate::store::RecordWriter;

/// Pack matched pairs into the record sink.
///
/// Pairs rejected by `filter` are skipped before any image IO. Image load
/// and decode failures abort the whole run; the writer is still released
/// through its drop guard. Returns the number of examples written.
pub fn pack_pairs<I, F>(
    writer: &mut RecordWriter,
    pairs: I,
    filter: Option<F>,
) -> Result<usize, DatasetError>
where
    I: IntoIterator<Item = MatchedPair>,
    F: Fn(&str) -> bool,
{
    for pair in pairs {
        if let Some(filter) = &filter
            && !filter(&pair.identity)
        {
            continue;
        }
        let a = image_record(&pair.source)?;
        let b = image_record(&pair.target)?;
        let example = TrainingExample {
            num: writer.count() as i64,
            key: pair.identity,
            a,
            b,
        };
        info!(
            identity = %example.key,
            source = %pair.source.display(),
            target = %pair.target.display(),
            "adding training example"
        );
        writer.append(&example.to_fields())?;
    }
    writer.finish()?;
    let count = writer.count() as usize;
    info!(count, "processed examples");
    Ok(count)
}

/// Scan two folders, match their files by identity, and pack the matched
/// pairs into a record file at `output`.
///
/// Convenience wrapper combining [`scan_folder`], [`match_pairs`], and
/// [`pack_pairs`]; this is what the CLI calls.
pub fn pack_folders<E, F>(
    output: &Path,
    source_folder: &Path,
    target_folder: &Path,
    extractor: &E,
    filter: Option<F>,
) -> Result<usize, DatasetError>
where
    E: IdentityExtractor + ?Sized,
    F: Fn(&str) -> bool,
{
    let source_files = scan_folder(source_folder)?;
    let target_files = scan_folder(target_folder)?;
    let pairs = match_pairs(source_files, target_files, extractor);
    let mut writer = RecordWriter::create(output)?;
    pack_pairs(&mut writer, pairs, filter)
}
