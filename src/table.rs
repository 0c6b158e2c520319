//! Plain-text tables for terminal output.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{
    dedup::{BatchStats, Classification},
    mapping::ColumnMapping,
};

#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row = row.into_iter().map(Into::into).collect::<Vec<String>>();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let mut widths = self
            .headers
            .iter()
            .map(|header| display_width(header).max(3))
            .collect::<Vec<_>>();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(display_width(&sanitize_cell(cell)));
            }
        }

        let mut output = String::new();
        let _ = writeln!(output, "{}", format_line(&self.headers, &widths));
        let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_line(&rule, &widths));
        for row in &self.rows {
            let _ = writeln!(output, "{}", format_line(row, &widths));
        }
        output
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

fn format_line(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = sanitize_cell(value);
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

/// Character count, ignoring ANSI colour sequences.
fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

/// Header → detected target, one row per source column.
pub fn mapping_table(headers: &[String], mapping: &ColumnMapping) -> Table {
    let mut table = Table::new(["#", "column", "target"]);
    for (idx, header) in headers.iter().enumerate() {
        let target = mapping
            .target_for(header)
            .map(|field| field.to_string())
            .unwrap_or_else(|| "(custom)".to_string());
        table.push([(idx + 1).to_string(), header.clone(), target]);
    }
    table
}

pub fn stats_table(stats: &BatchStats) -> Table {
    let mut table = Table::new(["metric", "count"]);
    for (label, value) in [
        ("rows parsed", stats.rows_parsed),
        ("dropped (no name/phone/email)", stats.dropped),
        ("total", stats.total),
        ("valid", stats.valid),
        ("duplicates", stats.duplicates),
        ("  already in store", stats.existing_duplicates),
        ("  within upload", stats.internal_duplicates),
    ] {
        table.push([label.to_string(), value.to_string()]);
    }
    table
}

/// First `limit` classified leads in source order, unique and duplicate alike.
pub fn preview_table(classification: &Classification, limit: usize) -> Table {
    let mut entries = classification
        .unique
        .iter()
        .map(|lead| (lead, "new".to_string()))
        .chain(
            classification
                .duplicates
                .iter()
                .map(|dup| (&dup.lead, dup.reason.clone())),
        )
        .collect::<Vec<_>>();
    entries.sort_by_key(|(lead, _)| lead.line);

    let mut table = Table::new(["line", "name", "phone", "email", "company", "title", "status"]);
    for (lead, status) in entries.into_iter().take(limit) {
        table.push([
            lead.line.to_string(),
            lead.name.clone().unwrap_or_default(),
            lead.phone.clone(),
            lead.email.clone().unwrap_or_default(),
            lead.company_name.clone().unwrap_or_default(),
            lead.job_title.clone().unwrap_or_default(),
            status,
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_pads_columns_and_trims_trailing_space() {
        let mut table = Table::new(["id", "name"]);
        table.push(["1", "Alice"]);
        table.push(["22", "Bo"]);
        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines, vec!["id   name", "---  -----", "1    Alice", "22   Bo"]);
    }

    #[test]
    fn control_characters_become_spaces() {
        let mut table = Table::new(["note"]);
        table.push(["line1\nline2\tend"]);
        let rendered = table.render();
        assert_eq!(rendered.lines().nth(2), Some("line1 line2 end"));
    }

    #[test]
    fn ansi_sequences_do_not_count_toward_width() {
        assert_eq!(display_width("\u{1b}[31mERR\u{1b}[0m"), 3);
    }
}
