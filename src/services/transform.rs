//! Per-mode aggregation transforms.
//!
//! Both variants consume (entry name, bytes) pairs in candidate order and
//! produce a single output buffer at finalize time. The codec crates are
//! collaborators here; this module owns only the accumulation rules.

use bytes::Bytes;
use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::{DocProperties, ExcelDateTime, Workbook};
use std::io::{Cursor, Write};
use thiserror::Error;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// Sheet name of the merged workbook.
const MERGED_SHEET_NAME: &str = "Combined Data";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("workbook decode failed: {0}")]
    WorkbookDecode(#[from] calamine::XlsxError),
    #[error("workbook encode failed: {0}")]
    WorkbookEncode(#[from] rust_xlsxwriter::XlsxError),
    #[error("archive build failed: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("archive write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One transform instance per pipeline run, never shared.
pub enum AggregationTransform {
    TabularMerge(TabularMerge),
    ArchivePack(ArchivePack),
}

impl AggregationTransform {
    pub fn tabular_merge() -> Self {
        Self::TabularMerge(TabularMerge::new())
    }

    pub fn archive_pack() -> Self {
        Self::ArchivePack(ArchivePack::new())
    }

    /// Feed one candidate. `name` is the archive entry name (the key's
    /// basename); the tabular variant ignores it.
    pub fn add(&mut self, name: &str, bytes: &[u8]) -> Result<(), CodecError> {
        match self {
            Self::TabularMerge(merge) => merge.add(bytes),
            Self::ArchivePack(pack) => pack.add(name, bytes),
        }
    }

    /// Seal the transform and return the finished artifact buffer.
    ///
    /// Returns `Ok(None)` only for the tabular variant, when every fed
    /// workbook decoded to zero rows.
    pub fn finalize(self) -> Result<Option<Bytes>, CodecError> {
        match self {
            Self::TabularMerge(merge) => merge.finalize(),
            Self::ArchivePack(pack) => pack.finalize().map(Some),
        }
    }
}

/// Concatenates workbook rows under a single shared header.
///
/// The first decoded sheet of each source workbook is authoritative; other
/// sheets are ignored. The first non-empty workbook contributes every row
/// (its first row becomes the shared header); every later workbook drops
/// its first row unconditionally — no schema check, matching the merge
/// contract.
pub struct TabularMerge {
    rows: Vec<Vec<String>>,
    header_written: bool,
}

impl TabularMerge {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            header_written: false,
        }
    }

    fn add(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let decoded = decode_first_sheet(bytes)?;
        self.append_rows(decoded);
        Ok(())
    }

    /// Accumulation rule, separated from decoding so it can be tested on
    /// plain row vectors.
    fn append_rows(&mut self, decoded: Vec<Vec<String>>) {
        if decoded.is_empty() {
            return;
        }
        let skip = if self.header_written { 1 } else { 0 };
        self.rows.extend(decoded.into_iter().skip(skip));
        self.header_written = true;
    }

    fn finalize(self) -> Result<Option<Bytes>, CodecError> {
        if !self.header_written {
            return Ok(None);
        }
        encode_sheet(&self.rows).map(Some)
    }
}

/// Packs each candidate into a deflate-compressed zip entry.
///
/// Entry names are taken as given; colliding basenames become duplicate
/// entries and readers conventionally keep the last one.
pub struct ArchivePack {
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl ArchivePack {
    fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    fn add(&mut self, name: &str, bytes: &[u8]) -> Result<(), CodecError> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(9));
        self.writer.start_file(name, options)?;
        self.writer.write_all(bytes)?;
        Ok(())
    }

    /// Seal the container. No entry is valid until this completes.
    fn finalize(self) -> Result<Bytes, CodecError> {
        let cursor = self.writer.finish()?;
        Ok(Bytes::from(cursor.into_inner()))
    }
}

/// Decode the first sheet of a workbook into rows of display strings.
/// A workbook with no sheets decodes to zero rows.
fn decode_first_sheet(bytes: &[u8]) -> Result<Vec<Vec<String>>, CodecError> {
    let mut workbook = Xlsx::new(Cursor::new(bytes))?;
    let Some(range) = workbook.worksheet_range_at(0) else {
        return Ok(Vec::new());
    };
    let range = range?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Encode accumulated rows as one sheet in one workbook.
///
/// The document creation time is pinned; identical inputs must encode to
/// identical bytes so repeated requests overwrite the same key with the
/// same artifact.
fn encode_sheet(rows: &[Vec<String>]) -> Result<Bytes, CodecError> {
    let mut workbook = Workbook::new();
    workbook.set_properties(
        &DocProperties::new().set_creation_datetime(&ExcelDateTime::from_ymd(1980, 1, 1)?),
    );
    let sheet = workbook.add_worksheet();
    sheet.set_name(MERGED_SHEET_NAME)?;
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            sheet.write_string(r as u32, c as u16, cell.as_str())?;
        }
    }
    Ok(Bytes::from(workbook.save_to_buffer()?))
}
