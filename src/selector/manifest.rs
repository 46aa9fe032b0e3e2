//! Patch manifest (CSV) reading and writing.
//!
//! One row per accepted patch:
//!
//! ```text
//! x,y,width,height,level,label,path
//! 1024,2048,256,256,0,1,/out/slide_1024_2048.png
//! 4096,512,256,256,0,,
//! ```
//!
//! `label` and `path` are empty when no label map was supplied or patches
//! were not saved. Paths containing a comma or a double quote are written as
//! quoted CSV fields with `""` escapes, and quoted fields are understood in
//! any column when reading. An unquoted trailing `path` column may still
//! contain raw commas.
//!
//! Reading is lenient: any header with `x` and `y` columns is accepted (other
//! columns are optional and may come in any order), and a file without a
//! header is read as `x,y` in the first two columns.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ManifestError;
use crate::patch::PatchCoordinate;

/// Header written at the top of every manifest.
pub const MANIFEST_HEADER: &str = "x,y,width,height,level,label,path";

/// One manifest record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub coordinate: PatchCoordinate,
    pub label: Option<u8>,
    pub path: Option<PathBuf>,
}

/// Write `rows` to `path`, replacing any existing file.
pub fn write_manifest(path: &Path, rows: &[ManifestRow]) -> Result<(), ManifestError> {
    let io_error = |e: std::io::Error| ManifestError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{}", MANIFEST_HEADER).map_err(io_error)?;
    for row in rows {
        let c = &row.coordinate;
        write!(
            writer,
            "{},{},{},{},{},",
            c.x, c.y, c.width, c.height, c.level
        )
        .map_err(io_error)?;
        if let Some(label) = row.label {
            write!(writer, "{}", label).map_err(io_error)?;
        }
        write!(writer, ",").map_err(io_error)?;
        if let Some(ref patch_path) = row.path {
            write!(writer, "{}", quote_field(&patch_path.display().to_string()))
                .map_err(io_error)?;
        }
        writeln!(writer).map_err(io_error)?;
    }

    writer.flush().map_err(io_error)
}

/// Read a manifest from disk.
///
/// `default_size` (`(height, width)`) and `default_level` fill in columns the
/// file does not have.
pub fn read_manifest(
    path: &Path,
    default_size: (u32, u32),
    default_level: usize,
) -> Result<Vec<ManifestRow>, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_manifest(&content, default_size, default_level)
}

/// Column positions resolved from the header.
struct Columns {
    count: usize,
    x: usize,
    y: usize,
    width: Option<usize>,
    height: Option<usize>,
    level: Option<usize>,
    label: Option<usize>,
    path: Option<usize>,
}

impl Columns {
    fn headerless() -> Self {
        Self {
            count: 2,
            x: 0,
            y: 1,
            width: None,
            height: None,
            level: None,
            label: None,
            path: None,
        }
    }

    fn from_header(line: &str) -> Result<Self, ManifestError> {
        let names: Vec<String> = split_fields(line)
            .iter()
            .map(|name| name.trim().to_ascii_lowercase())
            .collect();
        let find = |wanted: &str| names.iter().position(|name| name == wanted);

        Ok(Self {
            count: names.len(),
            x: find("x").ok_or(ManifestError::MissingColumn("x"))?,
            y: find("y").ok_or(ManifestError::MissingColumn("y"))?,
            width: find("width"),
            height: find("height"),
            level: find("level"),
            label: find("label"),
            path: find("path"),
        })
    }
}

/// Parse manifest text. See [`read_manifest`].
pub fn parse_manifest(
    content: &str,
    default_size: (u32, u32),
    default_level: usize,
) -> Result<Vec<ManifestRow>, ManifestError> {
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty())
        .peekable();

    let columns = match lines.peek() {
        None => return Ok(Vec::new()),
        Some((_, first)) if starts_with_number(first) => Columns::headerless(),
        Some((_, first)) => {
            let columns = Columns::from_header(first)?;
            lines.next();
            columns
        }
    };

    let mut rows = Vec::new();
    for (line_no, line) in lines {
        let mut fields = split_fields(line);
        // Unquoted commas in a trailing path column belong to the path.
        if columns.path == Some(columns.count - 1) && fields.len() > columns.count {
            let tail = fields.split_off(columns.count - 1).join(",");
            fields.push(tail);
        }
        rows.push(parse_row(&columns, &fields, line_no, default_size, default_level)?);
    }
    Ok(rows)
}

/// Quote `value` when it would otherwise be split or misread as a quoted field.
fn quote_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Split one CSV line into fields, honouring double-quoted fields and `""`
/// escapes inside them. An unterminated quote runs to the end of the line.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }
    fields.push(field);
    fields
}

fn starts_with_number(line: &str) -> bool {
    split_fields(line)
        .first()
        .map(|field| field.trim().parse::<f64>().is_ok())
        .unwrap_or(false)
}

fn parse_row(
    columns: &Columns,
    fields: &[String],
    line: usize,
    default_size: (u32, u32),
    default_level: usize,
) -> Result<ManifestRow, ManifestError> {
    let cell = |index: Option<usize>| {
        index
            .and_then(|i| fields.get(i))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    };

    let x = parse_coordinate(cell(Some(columns.x)), "x", line)?;
    let y = parse_coordinate(cell(Some(columns.y)), "y", line)?;

    let width = match cell(columns.width) {
        Some(value) => parse_number(value, "width", line)?,
        None => default_size.1,
    };
    let height = match cell(columns.height) {
        Some(value) => parse_number(value, "height", line)?,
        None => default_size.0,
    };
    let level = match cell(columns.level) {
        Some(value) => parse_number(value, "level", line)?,
        None => default_level,
    };
    let label = cell(columns.label)
        .map(|value| parse_number(value, "label", line))
        .transpose()?;
    let path = cell(columns.path).map(PathBuf::from);

    Ok(ManifestRow {
        coordinate: PatchCoordinate {
            x,
            y,
            height,
            width,
            level,
        },
        label,
        path,
    })
}

/// Coordinates may have been written as floats (`1024.0`); they must still
/// be whole, non-negative numbers.
fn parse_coordinate(value: Option<&str>, name: &str, line: usize) -> Result<u32, ManifestError> {
    let value = value.ok_or_else(|| ManifestError::Parse {
        line,
        message: format!("missing {}", name),
    })?;

    if let Ok(n) = value.parse::<u32>() {
        return Ok(n);
    }

    match value.parse::<f64>() {
        Ok(f) if f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) => Ok(f as u32),
        _ => Err(ManifestError::Parse {
            line,
            message: format!("invalid {} '{}'", name, value),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(
    value: &str,
    name: &str,
    line: usize,
) -> Result<T, ManifestError> {
    value.parse::<T>().map_err(|_| ManifestError::Parse {
        line,
        message: format!("invalid {} '{}'", name, value),
    })
}

// =============================================================================
// Tests
// =============================================================================
