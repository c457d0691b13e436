use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use super::{Manifest, ManifestStore, SourceLayout};
use crate::error::ManifestError;

/// Manifest stored as a CSV file with a header row.
#[derive(Debug, Clone)]
pub struct CsvManifest {
    path: PathBuf,
}

impl CsvManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn csv_err(&self, source: csv::Error) -> ManifestError {
        ManifestError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    fn io_err(&self, source: std::io::Error) -> ManifestError {
        ManifestError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Sibling file the new contents are written to before the rename.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("manifest.csv"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Encode one row with the manifest's line ending.
fn encode_row<I, T>(cells: I, crlf: bool) -> Result<Vec<u8>, csv::Error>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let terminator = if crlf {
        csv::Terminator::CRLF
    } else {
        csv::Terminator::Any(b'\n')
    };
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(terminator)
        .from_writer(Vec::new());
    writer.write_record(cells)?;
    writer.into_inner().map_err(|e| e.into_error().into())
}

/// Split `bytes` into the header slice and one slice per record, given
/// the reader's offset before each record.
///
/// The reader stops a CRLF record at the `\r` and skips blank lines as part
/// of the next read, so each offset is moved past any leading line breaks.
/// Every slice then ends with its own terminator.
fn slice_layout(bytes: &[u8], offsets: &[usize]) -> SourceLayout {
    let starts: Vec<usize> = offsets
        .iter()
        .map(|&offset| {
            let skipped = bytes[offset..]
                .iter()
                .take_while(|&&b| b == b'\r' || b == b'\n')
                .count();
            offset + skipped
        })
        .collect();
    let header_end = starts.first().copied().unwrap_or(bytes.len());
    let rows = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(bytes.len());
            bytes[start..end].to_vec()
        })
        .collect();
    let header = bytes[..header_end].to_vec();

    SourceLayout {
        crlf: header.ends_with(b"\r\n"),
        header,
        rows,
    }
}

impl ManifestStore for CsvManifest {
    fn load(&self) -> Result<Manifest, ManifestError> {
        let bytes = fs::read(&self.path).map_err(|e| self.io_err(e))?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes.as_slice());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| self.csv_err(e))?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.is_empty() {
            return Err(ManifestError::MissingHeader(self.path.clone()));
        }

        let mut rows = Vec::new();
        let mut starts = Vec::new();
        let mut record = csv::StringRecord::new();
        while reader
            .read_record(&mut record)
            .map_err(|e| self.csv_err(e))?
        {
            starts.push(record.position().map(|p| p.byte() as usize));
            rows.push(record.iter().map(str::to_string).collect());
        }

        debug!(path = %self.path.display(), rows = rows.len(), "Loaded manifest");
        let width = headers.len();
        let manifest = Manifest::new(headers, rows);

        match starts.into_iter().collect::<Option<Vec<usize>>>() {
            Some(offsets) => Ok(manifest.with_source(width, slice_layout(&bytes, &offsets))),
            None => Ok(manifest),
        }
    }

    fn save(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let crlf = manifest.uses_crlf();
        let mut out = match manifest.verbatim_header() {
            Some(header) => header.to_vec(),
            None => encode_row(manifest.headers(), crlf).map_err(|e| self.csv_err(e))?,
        };
        for (index, row) in manifest.rows().iter().enumerate() {
            match manifest.verbatim_row(index) {
                Some(raw) => out.extend_from_slice(raw),
                None => out.extend(encode_row(row, crlf).map_err(|e| self.csv_err(e))?),
            }
        }

        let staging = self.staging_path();
        fs::write(&staging, &out).map_err(|e| self.io_err(e))?;
        fs::rename(&staging, &self.path).map_err(|e| self.io_err(e))?;
        debug!(path = %self.path.display(), rows = manifest.len(), "Saved manifest");
        Ok(())
    }
}
