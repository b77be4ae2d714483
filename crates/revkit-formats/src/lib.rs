//! Reading and writing bibliographic record files.

pub mod delimited;
pub mod error;
pub mod ris;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use revkit_core::RecordTable;

pub use error::{FormatError, Result};

/// On-disk record formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ris,
    Csv,
    /// Tab-separated, including `.txt` exports from citation databases.
    Tsv,
}

impl Format {
    /// Looks up a format by file extension or name (`ris`, `csv`, `tsv`, `txt`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ris" => Some(Self::Ris),
            "csv" => Some(Self::Csv),
            "tsv" | "txt" => Some(Self::Tsv),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_name)
            .ok_or_else(|| FormatError::UnsupportedFormat(path.display().to_string()))
    }

    fn delimiter(self) -> u8 {
        match self {
            Self::Tsv => b'\t',
            _ => b',',
        }
    }
}

/// Reads one file, labelling every record with the file stem as its source.
pub fn import_file(path: &Path) -> Result<RecordTable> {
    let format = Format::from_path(path)?;
    let mut table = match format {
        Format::Ris => {
            let content = std::fs::read_to_string(path)?;
            ris::to_records(&ris::parse_ris(&content)?)
        }
        Format::Csv | Format::Tsv => {
            let file = File::open(path)?;
            delimited::read_delimited(BufReader::new(file), format.delimiter())?
        }
    };

    if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
        table.set_source(stem);
    }
    tracing::debug!(
        path = %path.display(),
        ?format,
        records = table.len(),
        fields = table.fields().len(),
        "imported records"
    );
    Ok(table)
}

/// Reads every file and stacks the records in argument order.
pub fn import_files<P: AsRef<Path>>(paths: &[P]) -> Result<RecordTable> {
    let tables = paths
        .iter()
        .map(|path| import_file(path.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(RecordTable::concat(tables))
}

/// Writes `table` in the format implied by the path's extension.
pub fn export_file(table: &RecordTable, path: &Path) -> Result<()> {
    export_file_as(table, path, Format::from_path(path)?)
}

pub fn export_file_as(table: &RecordTable, path: &Path, format: Format) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_table(table, &mut writer, format)?;
    writer.flush()?;
    tracing::debug!(path = %path.display(), ?format, records = table.len(), "exported records");
    Ok(())
}

/// Writes `table` to any writer, e.g. stdout.
pub fn write_table<W: Write>(table: &RecordTable, mut writer: W, format: Format) -> Result<()> {
    match format {
        Format::Ris => writer.write_all(ris::generate_ris(table).as_bytes())?,
        Format::Csv | Format::Tsv => {
            delimited::write_delimited(table, writer, format.delimiter())?
        }
    }
    Ok(())
}
