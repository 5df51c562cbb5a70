use crate::error::HbnError;

/// Header plus data rows of a small delimited text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based line number in the source text.
    pub line: usize,
    pub fields: Vec<String>,
}

/// Parses tab- or comma-delimited text with a header row.
///
/// The delimiter is chosen from the header line: tab if it contains one,
/// comma otherwise. Blank lines are skipped, fields are trimmed and every
/// row must have exactly `columns` fields.
pub fn parse_delimited(source_name: &str, text: &str, columns: usize) -> Result<Table, HbnError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim_start_matches('\u{feff}').trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header_line) = lines
        .next()
        .ok_or_else(|| HbnError::parse(source_name, "file is empty"))?;
    let delimiter = if header_line.contains('\t') { '\t' } else { ',' };

    let header = split_fields(header_line, delimiter);
    if header.len() != columns {
        return Err(HbnError::parse(
            source_name,
            format!("expected {columns} columns in header, found {}", header.len()),
        ));
    }

    let rows = lines
        .map(|(line, raw)| {
            let fields = split_fields(raw, delimiter);
            if fields.len() != columns {
                return Err(HbnError::parse(
                    source_name,
                    format!(
                        "line {line}: expected {columns} fields, found {}",
                        fields.len()
                    ),
                ));
            }
            Ok(Row { line, fields })
        })
        .collect::<Result<Vec<_>, HbnError>>()?;

    Ok(Table { header, rows })
}

/// Splits on `delimiter` outside double quotes. Quotes are dropped and `""`
/// inside a quoted field is a literal quote.
fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ch if ch == delimiter && !quoted => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            ch => field.push(ch),
        }
    }
    fields.push(field.trim().to_string());
    fields
}
