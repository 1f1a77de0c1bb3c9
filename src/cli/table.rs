//! Plain-text tables for terminal output.
//!
//! Every cell is passed through [`strip_control_chars`] first: aggregate ids,
//! event types and payloads are written by other parties and must not be able
//! to move the cursor or retitle the terminal.
use std::borrow::Cow;
use std::io::{self, Write};

use serialized::util::{display_width, pad_to_width, strip_control_chars, truncate_to_width};

/// Widest a column may grow before cells are truncated.
pub const MAX_COLUMN_WIDTH: usize = 60;

const COLUMN_GAP: &str = "  ";

pub struct Table {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn push<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rows.push(
            cells
                .into_iter()
                .map(|c| strip_control_chars(c.as_ref()).into_owned())
                .collect(),
        );
    }

    /// Column widths: the widest cell or header, capped at [`MAX_COLUMN_WIDTH`].
    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|cell| display_width(cell))
                    .fold(display_width(header), usize::max)
                    .min(MAX_COLUMN_WIDTH)
            })
            .collect()
    }

    pub fn render(&self, out: &mut impl Write) -> io::Result<()> {
        let widths = self.widths();
        writeln!(out, "{}", format_row(&self.headers, &widths))?;
        for row in &self.rows {
            writeln!(out, "{}", format_row(row, &widths))?;
        }
        Ok(())
    }
}

/// Lays out one row against fixed column widths.
///
/// The last column is not padded, so lines carry no trailing spaces.
pub fn format_row<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    let last = cells.len().saturating_sub(1);
    let mut line = String::new();
    for (i, cell) in cells.iter().enumerate() {
        let clean = strip_control_chars(cell.as_ref());
        let width = widths.get(i).copied().unwrap_or(MAX_COLUMN_WIDTH);
        let cut = truncate_to_width(&clean, width);

        if i > 0 {
            line.push_str(COLUMN_GAP);
        }
        let cell: Cow<'_, str> = if i == last {
            cut
        } else {
            Cow::Owned(pad_to_width(&cut, width).into_owned())
        };
        line.push_str(&cell);
    }
    line
}
