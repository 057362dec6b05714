use std::path::Path;

use regex::Regex;

use crate::errors::DatasetError;
use crate::types::IdentityToken;

/// Maps a file name to the identity token shared by corresponding files.
///
/// Returning the empty string signals that no usable identity could be
/// derived; such files are excluded from matching. Implementations must be
/// pure and must not fail on malformed input.
pub trait IdentityExtractor: Send + Sync {
    /// Extract the identity token for `file_name`.
    fn extract(&self, file_name: &Path) -> IdentityToken;
}

impl<F> IdentityExtractor for F
where
    F: Fn(&Path) -> IdentityToken + Send + Sync,
{
    fn extract(&self, file_name: &Path) -> IdentityToken {
        self(file_name)
    }
}

/// Suffix policy: assumes `path/basename_IDENTITY.extension` and extracts
/// the token after the first underscore of the extension-stripped stem.
///
/// A stem without an underscore yields the whole stem, so unadorned file
/// names still pair up when both sides use the same plain name.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuffixIdentity;

impl IdentityExtractor for SuffixIdentity {
    fn extract(&self, file_name: &Path) -> IdentityToken {
        let stem = match file_name.file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) => stem,
            None => return IdentityToken::new(),
        };
        match stem.split_once('_') {
            Some((_, token)) => token.to_string(),
            None => stem.to_string(),
        }
    }
}

/// Regex policy: applies a caller-supplied pattern to the extension-stripped
/// stem and uses the match text as the identity.
///
/// Zero matches and multiple matches are both ambiguous and yield the empty
/// sentinel.
#[derive(Debug, Clone)]
pub struct RegexIdentity {
    pattern: Regex,
}

impl RegexIdentity {
    /// Compile `pattern` into an identity policy.
    pub fn new(pattern: &str) -> Result<Self, DatasetError> {
        let pattern = Regex::new(pattern).map_err(|err| {
            DatasetError::Configuration(format!("invalid identity pattern '{pattern}': {err}"))
        })?;
        Ok(Self { pattern })
    }

    /// Default policy matching a single run of digits in the stem.
    pub fn digits() -> Self {
        Self {
            pattern: Regex::new(r"\d+").expect("digits pattern is valid"),
        }
    }
}

impl IdentityExtractor for RegexIdentity {
    fn extract(&self, file_name: &Path) -> IdentityToken {
        let stem = match file_name.file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) => stem,
            None => return IdentityToken::new(),
        };
        let mut matches = self.pattern.find_iter(stem);
        let first = match matches.next() {
            Some(found) => found,
            None => return IdentityToken::new(),
        };
        if matches.next().is_some() {
            return IdentityToken::new();
        }
        first.as_str().to_string()
    }
}
