//! Delimited text (CSV and tab-separated exports) with a header row.

use std::io::{Read, Write};

use csv::{ReaderBuilder, Trim, WriterBuilder};
use revkit_core::{RecordTable, RecordTableBuilder};

use crate::error::Result;

/// Reads a table whose first row names the fields. Short rows read as
/// absent trailing values; cells beyond the header are ignored.
pub fn read_delimited<R: Read>(reader: R, delimiter: u8) -> Result<RecordTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let mut builder = RecordTableBuilder::new();
    for name in headers.iter() {
        if !name.trim().is_empty() {
            builder.declare_field(name);
        }
    }

    for row in reader.records() {
        let row = row?;
        builder.push_fields(
            None,
            headers
                .iter()
                .zip(row.iter())
                .map(|(name, value)| (name, value.to_string())),
        );
    }

    Ok(builder.build())
}

/// Writes the header row followed by one row per record. Absent values are
/// written as empty cells.
pub fn write_delimited<W: Write>(table: &RecordTable, writer: W, delimiter: u8) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);

    writer.write_record(table.fields())?;
    for record in table.records() {
        writer.write_record(
            record
                .values()
                .iter()
                .map(|value| value.as_deref().unwrap_or("")),
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_headers_case_insensitively() {
        let input = "Title, DOI ,Year\nFire ecology,10.1/abc,2019\nGrazing,,2020\n";
        let table = read_delimited(input.as_bytes(), b',').unwrap();
        assert_eq!(table.fields(), ["title", "doi", "year"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "doi"), Some("10.1/abc"));
        assert_eq!(table.get(1, "doi"), None);
    }

    #[test]
    fn short_rows_leave_trailing_fields_absent() {
        let input = "title\tyear\tjournal\nOnly title\n";
        let table = read_delimited(input.as_bytes(), b'\t').unwrap();
        assert_eq!(table.get(0, "title"), Some("Only title"));
        assert_eq!(table.get(0, "journal"), None);
    }

    #[test]
    fn quoted_cells_keep_delimiters() {
        let input = "title,author\n\"Fire, smoke and ash\",\"Smith, J.\"\n";
        let table = read_delimited(input.as_bytes(), b',').unwrap();
        assert_eq!(table.get(0, "title"), Some("Fire, smoke and ash"));
        assert_eq!(table.get(0, "author"), Some("Smith, J."));
    }

    #[test]
    fn written_table_reads_back() {
        let input = "title,doi\n\"Fire, smoke\",\nGrazing,10.1/x\n";
        let table = read_delimited(input.as_bytes(), b',').unwrap();

        let mut out = Vec::new();
        write_delimited(&table, &mut out, b'\t').unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("title\tdoi\n"));

        let reread = read_delimited(text.as_bytes(), b'\t').unwrap();
        assert_eq!(reread, table);
    }
}
