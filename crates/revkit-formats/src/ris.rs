//! RIS reference files, as exported by most bibliographic databases.

use std::collections::{BTreeMap, HashSet};

use revkit_core::{RecordTable, RecordTableBuilder};

use crate::error::{FormatError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RisEntry {
    pub entry_type: String,
    pub fields: BTreeMap<String, Vec<String>>,
}

impl RisEntry {
    pub fn first(&self, tag: &str) -> Option<&str> {
        self.fields
            .get(tag)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    fn values<'a>(&'a self, tags: &'a [&str]) -> impl Iterator<Item = &'a str> {
        tags.iter()
            .filter_map(|tag| self.fields.get(*tag))
            .flatten()
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Copy)]
enum Combine {
    First,
    Join,
    Year,
    PageRange,
}

/// Canonical field, the tags feeding it in priority order, and how repeated
/// values combine. Row order is also the column order of imported tables.
const FIELD_TAGS: &[(&str, &[&str], Combine)] = &[
    ("title", &["TI", "T1"], Combine::First),
    ("author", &["AU", "A1", "A2"], Combine::Join),
    ("year", &["PY", "Y1", "DA"], Combine::Year),
    ("journal", &["JO", "JF", "JA", "T2"], Combine::First),
    ("volume", &["VL"], Combine::First),
    ("issue", &["IS"], Combine::First),
    ("pages", &["SP", "EP"], Combine::PageRange),
    ("doi", &["DO"], Combine::First),
    ("abstract", &["AB", "N2"], Combine::First),
    ("keywords", &["KW"], Combine::Join),
    ("url", &["UR"], Combine::First),
    ("issn", &["SN"], Combine::First),
    ("publisher", &["PB"], Combine::First),
];

const MULTI_VALUE_SEPARATOR: &str = "; ";

pub fn parse_ris(content: &str) -> Result<Vec<RisEntry>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut entries = Vec::new();
    let mut current: Option<RisEntry> = None;
    let mut last_tag: Option<String> = None;

    for (line_no, raw_line) in content.lines().enumerate() {
        let line_no = line_no + 1;
        let line = raw_line.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        let Some((tag, value)) = split_tag(line) else {
            // Wrapped continuation of the previous tag's value.
            match (current.as_mut(), last_tag.as_deref()) {
                (Some(entry), Some(tag)) => {
                    if let Some(previous) =
                        entry.fields.get_mut(tag).and_then(|values| values.last_mut())
                    {
                        previous.push(' ');
                        previous.push_str(line.trim());
                    }
                    continue;
                }
                _ => {
                    return Err(FormatError::parse(
                        line_no,
                        format!("invalid RIS line: {line}"),
                    ));
                }
            }
        };

        match tag {
            "TY" => {
                if current.is_some() {
                    return Err(FormatError::parse(line_no, "nested TY without ER"));
                }
                current = Some(RisEntry {
                    entry_type: value.to_string(),
                    fields: BTreeMap::new(),
                });
                last_tag = None;
            }
            "ER" => {
                let Some(entry) = current.take() else {
                    return Err(FormatError::parse(line_no, "ER without TY"));
                };
                entries.push(entry);
                last_tag = None;
            }
            _ => {
                let Some(entry) = current.as_mut() else {
                    return Err(FormatError::parse(
                        line_no,
                        format!("{tag} outside of RIS entry"),
                    ));
                };
                entry
                    .fields
                    .entry(tag.to_string())
                    .or_default()
                    .push(value.to_string());
                last_tag = Some(tag.to_string());
            }
        }
    }

    if let Some(entry) = current.take() {
        entries.push(entry);
    }

    Ok(entries)
}

/// `TAG  - value`, where TAG is two upper-case letters or digits.
fn split_tag(line: &str) -> Option<(&str, &str)> {
    let (tag, value) = line
        .split_once("  - ")
        .or_else(|| line.split_once("  -"))?;
    let tag = tag.trim();
    is_tag(tag).then(|| (tag, value.trim()))
}

fn is_tag(tag: &str) -> bool {
    tag.len() == 2
        && tag
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Maps RIS entries onto canonical record fields. Tags without a canonical
/// field are kept under their lower-cased tag.
pub fn to_records(entries: &[RisEntry]) -> RecordTable {
    let known: HashSet<&str> = FIELD_TAGS
        .iter()
        .flat_map(|(_, tags, _)| tags.iter().copied())
        .collect();

    let rows: Vec<Vec<(String, String)>> = entries
        .iter()
        .map(|entry| entry_fields(entry, &known))
        .collect();

    let mut builder = RecordTableBuilder::new();
    let present: HashSet<&str> = rows
        .iter()
        .flatten()
        .map(|(name, _)| name.as_str())
        .collect();
    for name in std::iter::once("type").chain(FIELD_TAGS.iter().map(|(name, _, _)| *name)) {
        if present.contains(name) {
            builder.declare_field(name);
        }
    }
    for fields in rows {
        builder.push_fields(None, fields);
    }
    builder.build()
}

fn entry_fields(entry: &RisEntry, known: &HashSet<&str>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if !entry.entry_type.is_empty() {
        out.push(("type".to_string(), entry.entry_type.clone()));
    }

    for (name, tags, combine) in FIELD_TAGS {
        let value = match combine {
            Combine::First => entry.values(tags).next().map(str::to_string),
            Combine::Join => {
                let values: Vec<&str> = entry.values(tags).collect();
                (!values.is_empty()).then(|| values.join(MULTI_VALUE_SEPARATOR))
            }
            Combine::Year => entry
                .values(tags)
                .next()
                .map(|raw| extract_year(raw).unwrap_or(raw).to_string()),
            Combine::PageRange => {
                let start = entry.values(&["SP"]).next();
                let end = entry.values(&["EP"]).next();
                match (start, end) {
                    (Some(start), Some(end)) if start != end => Some(format!("{start}-{end}")),
                    (Some(page), _) | (None, Some(page)) => Some(page.to_string()),
                    (None, None) => None,
                }
            }
        };
        if let Some(value) = value {
            out.push((name.to_string(), value));
        }
    }

    for (tag, values) in &entry.fields {
        if known.contains(tag.as_str()) {
            continue;
        }
        let values: Vec<&str> = values
            .iter()
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .collect();
        if !values.is_empty() {
            out.push((tag.to_lowercase(), values.join(MULTI_VALUE_SEPARATOR)));
        }
    }
    out
}

/// First run of four ASCII digits, e.g. `2019` from `2019/05/01/`.
fn extract_year(value: &str) -> Option<&str> {
    value
        .as_bytes()
        .windows(4)
        .position(|window| window.iter().all(u8::is_ascii_digit))
        .map(|start| &value[start..start + 4])
}

/// Writes every record as one RIS entry. Fields that have no RIS tag and
/// whose name is not itself a two-character tag are left out.
pub fn generate_ris(table: &RecordTable) -> String {
    let mut lines = Vec::new();

    for row in 0..table.len() {
        lines.push(format!(
            "TY  - {}",
            table.get(row, "type").unwrap_or("GEN")
        ));
        push_line(&mut lines, "TI", table.get(row, "title"));
        for author in split_multi(table.get(row, "author")) {
            push_line(&mut lines, "AU", Some(author));
        }
        push_line(&mut lines, "PY", table.get(row, "year"));
        push_line(&mut lines, "JO", table.get(row, "journal"));
        push_line(&mut lines, "VL", table.get(row, "volume"));
        push_line(&mut lines, "IS", table.get(row, "issue"));
        if let Some(pages) = table.get(row, "pages") {
            match pages.split_once('-') {
                Some((start, end)) => {
                    push_line(&mut lines, "SP", Some(start));
                    push_line(&mut lines, "EP", Some(end));
                }
                None => push_line(&mut lines, "SP", Some(pages)),
            }
        }
        push_line(&mut lines, "DO", table.get(row, "doi"));
        push_line(&mut lines, "AB", table.get(row, "abstract"));
        for keyword in split_multi(table.get(row, "keywords")) {
            push_line(&mut lines, "KW", Some(keyword));
        }
        push_line(&mut lines, "UR", table.get(row, "url"));
        push_line(&mut lines, "SN", table.get(row, "issn"));
        push_line(&mut lines, "PB", table.get(row, "publisher"));

        for name in table.fields() {
            if name == "type" || FIELD_TAGS.iter().any(|(canonical, _, _)| canonical == name) {
                continue;
            }
            let tag = name.to_uppercase();
            if is_tag(&tag) && tag != "TY" && tag != "ER" {
                push_line(&mut lines, &tag, table.get(row, name));
            }
        }

        lines.push("ER  -".to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}

fn split_multi(value: Option<&str>) -> impl Iterator<Item = &str> {
    value
        .into_iter()
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .filter(|part| !part.is_empty())
}

fn push_line(lines: &mut Vec<String>, tag: &str, value: Option<&str>) {
    let Some(value) = value else {
        return;
    };
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    lines.push(format!("{tag}  - {value}"));
}
