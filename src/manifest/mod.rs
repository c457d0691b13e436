//! The post manifest: an ordered table of intended posts and whether each
//! one has gone live.
//!
//! Rows are kept as raw cells, and a manifest loaded from disk also keeps
//! the source bytes of every row. A rewrite reproduces untouched rows byte
//! for byte and re-encodes only the rows a run flipped.

mod csv_store;

pub use csv_store::CsvManifest;

use crate::error::ManifestError;
use crate::model::{PostRecord, non_empty, parse_bool};

pub const POSTED: &str = "posted";
pub const SCHEDULED_TIME: &str = "scheduled_time_local";
/// Older manifests name the schedule column after the timezone.
pub const SCHEDULED_TIME_LEGACY: &str = "scheduled_time_ist";
pub const VIDEO_URL: &str = "video_url";
pub const CAPTION: &str = "caption";
pub const SHARE_TO_FEED: &str = "share_to_feed";
pub const COVER_URL: &str = "cover_url";

/// Durable home of the manifest.
pub trait ManifestStore: Send + Sync {
    fn load(&self) -> Result<Manifest, ManifestError>;
    fn save(&self, manifest: &Manifest) -> Result<(), ManifestError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Columns {
    posted: usize,
    scheduled_time: Option<usize>,
    video_url: Option<usize>,
    caption: Option<usize>,
    share_to_feed: Option<usize>,
    cover_url: Option<usize>,
}

fn find_column(headers: &[String], name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
}

/// Source bytes of a manifest as it was read.
///
/// `header` and `rows` are contiguous slices of the original file, so their
/// concatenation is the file itself.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceLayout {
    header: Vec<u8>,
    rows: Vec<Vec<u8>>,
    crlf: bool,
}

/// In-memory manifest owned by a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    columns: Columns,
    source: Option<SourceLayout>,
    touched: Vec<bool>,
}

impl Manifest {
    /// Build a manifest from a header row and data rows.
    ///
    /// A `posted` column is appended when the header lacks one, and short
    /// rows are padded with empty cells up to the header width.
    pub fn new(mut headers: Vec<String>, mut rows: Vec<Vec<String>>) -> Self {
        let posted = match find_column(&headers, POSTED) {
            Some(i) => i,
            None => {
                headers.push(POSTED.to_string());
                headers.len() - 1
            }
        };
        let columns = Columns {
            posted,
            scheduled_time: find_column(&headers, SCHEDULED_TIME)
                .or_else(|| find_column(&headers, SCHEDULED_TIME_LEGACY)),
            video_url: find_column(&headers, VIDEO_URL),
            caption: find_column(&headers, CAPTION),
            share_to_feed: find_column(&headers, SHARE_TO_FEED),
            cover_url: find_column(&headers, COVER_URL),
        };

        for row in &mut rows {
            if row.len() < headers.len() {
                row.resize(headers.len(), String::new());
            }
        }

        let touched = vec![false; rows.len()];
        Self {
            headers,
            rows,
            columns,
            source: None,
            touched,
        }
    }

    /// Attach the bytes the manifest was parsed from.
    ///
    /// Ignored when the layout does not line up with the parsed rows, or
    /// when a `posted` column had to be appended and every row changes width.
    fn with_source(mut self, source_width: usize, source: SourceLayout) -> Self {
        if source_width == self.headers.len() && source.rows.len() == self.rows.len() {
            self.source = Some(source);
        }
        self
    }

    /// Whether rewritten rows should end in `\r\n`.
    fn uses_crlf(&self) -> bool {
        self.source.as_ref().is_some_and(|s| s.crlf)
    }

    fn verbatim_header(&self) -> Option<&[u8]> {
        self.source.as_ref().map(|s| s.header.as_slice())
    }

    /// Original bytes of the row at `index`, unless this run changed it.
    fn verbatim_row(&self, index: usize) -> Option<&[u8]> {
        if self.touched.get(index).copied().unwrap_or(true) {
            return None;
        }
        self.source
            .as_ref()
            .and_then(|s| s.rows.get(index))
            .map(Vec::as_slice)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Typed view of the row at `index`.
    pub fn record(&self, index: usize) -> Option<PostRecord> {
        let row = self.rows.get(index)?;
        let cell = |col: Option<usize>| col.and_then(|i| row.get(i)).map(String::as_str);

        Some(PostRecord {
            posted: parse_bool(cell(Some(self.columns.posted)).unwrap_or_default()),
            scheduled_time: cell(self.columns.scheduled_time).and_then(non_empty),
            video_url: cell(self.columns.video_url).unwrap_or_default().trim().to_string(),
            caption: cell(self.columns.caption).unwrap_or_default().trim().to_string(),
            share_to_feed: cell(self.columns.share_to_feed)
                .and_then(non_empty)
                .map(|raw| parse_bool(&raw))
                .unwrap_or(true),
            cover_url: cell(self.columns.cover_url).and_then(non_empty),
        })
    }

    pub fn records(&self) -> impl Iterator<Item = PostRecord> + '_ {
        (0..self.rows.len()).filter_map(|i| self.record(i))
    }

    /// Flip `posted` to true for the row at `index`.
    ///
    /// Returns whether the row changed. Rows already marked posted keep their
    /// original cell text.
    pub fn mark_posted(&mut self, index: usize) -> bool {
        let col = self.columns.posted;
        match self.rows.get_mut(index).and_then(|row| row.get_mut(col)) {
            Some(cell) if !parse_bool(cell) => {
                *cell = "true".to_string();
                self.touched[index] = true;
                true
            }
            _ => false,
        }
    }
}
