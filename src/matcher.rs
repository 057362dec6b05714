use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::vec;

use indexmap::IndexMap;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::DatasetError;
use crate::identity::IdentityExtractor;
use crate::types::IdentityToken;

/// A source/target file pair sharing one identity token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedPair {
    /// Identity token present on both sides.
    pub identity: IdentityToken,
    /// Path of the source-side image.
    pub source: PathBuf,
    /// Path of the target-side image.
    pub target: PathBuf,
}

/// Enumerate the regular files directly under `dir`, sorted lexicographically.
///
/// The scan is synchronous and runs once before matching begins; sorting
/// fixes the traversal order so ordinal assignment is reproducible.
pub fn scan_folder(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|err| {
            DatasetError::Io(err.into_io_error().unwrap_or_else(|| {
                std::io::Error::other(format!("walk failed under '{}'", dir.display()))
            }))
        })?;
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Associate source and target files by identity token.
///
/// Yields `(identity, source, target)` for every identity present on both
/// sides, in lexicographic identity order. Files without a usable identity
/// and identities present on one side only are skipped with a log entry.
/// When two files on the same side share an identity, the later one in
/// enumeration order wins; both paths are named in a warning.
pub fn match_pairs<I, J, E>(source_files: I, target_files: J, extractor: &E) -> MatchedPairs
where
    I: IntoIterator<Item = PathBuf>,
    J: IntoIterator<Item = PathBuf>,
    E: IdentityExtractor + ?Sized,
{
    let files_a = identity_map(source_files, extractor, "source");
    let files_b = identity_map(target_files, extractor, "target");

    let identities: BTreeSet<IdentityToken> =
        files_a.keys().chain(files_b.keys()).cloned().collect();

    MatchedPairs {
        identities: identities.into_iter().collect::<Vec<_>>().into_iter(),
        files_a,
        files_b,
    }
}

/// Lazy, single-pass sequence of matched pairs.
///
/// Not restartable; re-enumerate the input folders to iterate again.
pub struct MatchedPairs {
    identities: vec::IntoIter<IdentityToken>,
    files_a: IndexMap<IdentityToken, PathBuf>,
    files_b: IndexMap<IdentityToken, PathBuf>,
}

impl Iterator for MatchedPairs {
    type Item = MatchedPair;

    fn next(&mut self) -> Option<Self::Item> {
        for identity in self.identities.by_ref() {
            let source = match self.files_a.get(&identity) {
                Some(path) => path,
                None => {
                    info!(
                        identity = %identity,
                        target = %display_of(&self.files_b, &identity),
                        "skipping training example, corresponding source file is missing"
                    );
                    continue;
                }
            };
            let target = match self.files_b.get(&identity) {
                Some(path) => path,
                None => {
                    info!(
                        identity = %identity,
                        source = %source.display(),
                        "skipping training example, corresponding target file is missing"
                    );
                    continue;
                }
            };
            return Some(MatchedPair {
                source: source.clone(),
                target: target.clone(),
                identity,
            });
        }
        None
    }
}

fn display_of(files: &IndexMap<IdentityToken, PathBuf>, identity: &str) -> String {
    files
        .get(identity)
        .map(|path| path.display().to_string())
        .unwrap_or_default()
}

fn identity_map<I, E>(
    files: I,
    extractor: &E,
    side: &'static str,
) -> IndexMap<IdentityToken, PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
    E: IdentityExtractor + ?Sized,
{
    let mut map: IndexMap<IdentityToken, PathBuf> = IndexMap::new();
    for path in files {
        let identity = extractor.extract(&path);
        if identity.is_empty() {
            warn!(
                side,
                path = %path.display(),
                "skipping file, no usable identity could be established"
            );
        }
        let displaced = map.insert(identity.clone(), path.clone());
        if let Some(displaced) = displaced
            && !identity.is_empty()
        {
            warn!(
                side,
                identity = %identity,
                displaced = %displaced.display(),
                kept = %path.display(),
                "duplicate identity within one side, keeping the later file"
            );
        }
    }
    if map.swap_remove("").is_some() {
        debug!(side, "dropped unidentifiable entries from the mapping");
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SuffixIdentity;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn matches_only_identities_present_on_both_sides() {
        let source = paths(&["src/img_1.png", "src/img_2.png"]);
        let target = paths(&["tgt/img_2.png", "tgt/img_3.png"]);

        let pairs: Vec<MatchedPair> = match_pairs(source, target, &SuffixIdentity).collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].identity, "2");
        assert_eq!(pairs[0].source, PathBuf::from("src/img_2.png"));
        assert_eq!(pairs[0].target, PathBuf::from("tgt/img_2.png"));
    }

    #[test]
    fn yields_intersection_in_sorted_identity_order() {
        let source = paths(&["s/x_c.png", "s/x_a.png", "s/x_b.png"]);
        let target = paths(&["t/y_b.png", "t/y_c.png", "t/y_a.png"]);

        let identities: Vec<IdentityToken> = match_pairs(source, target, &SuffixIdentity)
            .map(|pair| pair.identity)
            .collect();
        assert_eq!(identities, vec!["a", "b", "c"]);
    }

    #[test]
    fn unidentifiable_files_are_excluded() {
        // A stem without an underscore matches only when both sides share it.
        let extractor = |path: &Path| {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            match stem.split_once('_') {
                Some((_, token)) => token.to_string(),
                None => String::new(),
            }
        };
        let source = paths(&["s/noid.png", "s/img_1.png"]);
        let target = paths(&["t/img_1.png", "t/noid.png"]);

        let pairs: Vec<MatchedPair> = match_pairs(source, target, &extractor).collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].identity, "1");
    }

    #[test]
    fn duplicate_identity_keeps_the_later_file() {
        let source = paths(&["s/a_1.png", "s/b_1.png"]);
        let target = paths(&["t/c_1.png"]);

        let pairs: Vec<MatchedPair> = match_pairs(source, target, &SuffixIdentity).collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].source, PathBuf::from("s/b_1.png"));
    }

    #[test]
    fn empty_enumerations_produce_no_pairs() {
        let pairs: Vec<MatchedPair> =
            match_pairs(Vec::new(), Vec::new(), &SuffixIdentity).collect();
        assert!(pairs.is_empty());
    }

    #[test]
    fn scan_folder_lists_sorted_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.png"), b"b").unwrap();
        std::fs::write(dir.path().join("a.png"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.png"), b"c").unwrap();

        let files = scan_folder(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
    }
}
