//! Per-file reporting while a directory of monthly extracts is read.

use std::path::Path;

use crate::extracts::FilterStats;

/// Observer of [`read_extract_dir`](crate::extracts::read_extract_dir).
///
/// `()` reports nothing.
pub trait ExtractProgress {
    /// The directory listing is done and `files` extracts will be read.
    fn start(&self, files: usize);

    /// One extract has been read; `stats` covers that file only.
    fn file_read(&self, path: &Path, stats: &FilterStats);

    /// Every extract has been read; `stats` covers all of them.
    fn finish(&self, stats: &FilterStats);
}

impl ExtractProgress for () {
    fn start(&self, _files: usize) {}
    fn file_read(&self, _path: &Path, _stats: &FilterStats) {}
    fn finish(&self, _stats: &FilterStats) {}
}
