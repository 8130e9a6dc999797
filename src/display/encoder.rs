//! Glyph encoding: validated rows to the board's numeric grid.

use crate::display::charset::{self, VARIATION_SELECTOR};
use crate::display::{COLS, MAX_CODE, ROWS};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A full-board grid of glyph codes, always 6x22 with every code in `0..=71`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout([[u8; COLS]; ROWS]);

impl Layout {
    pub fn blank() -> Self {
        Layout([[charset::BLANK; COLS]; ROWS])
    }

    /// Build from an untrusted integer grid, checking shape and code range.
    pub fn from_codes(grid: &[Vec<i64>]) -> Result<Self, ValidationError> {
        if grid.len() != ROWS {
            return Err(ValidationError::LayoutRowCount {
                expected: ROWS,
                actual: grid.len(),
            });
        }
        let mut layout = Layout::blank();
        for (row, cells) in grid.iter().enumerate() {
            if cells.len() != COLS {
                return Err(ValidationError::LayoutRowLength {
                    row: row + 1,
                    expected: COLS,
                    actual: cells.len(),
                });
            }
            for (column, code) in cells.iter().enumerate() {
                if !(0..=MAX_CODE as i64).contains(code) {
                    return Err(ValidationError::CodeOutOfRange {
                        row: row + 1,
                        column: column + 1,
                        code: *code,
                    });
                }
                layout.0[row][column] = *code as u8;
            }
        }
        Ok(layout)
    }

    pub fn rows(&self) -> &[[u8; COLS]; ROWS] {
        &self.0
    }

    pub fn row(&self, index: usize) -> Option<&[u8; COLS]> {
        self.0.get(index)
    }

    /// Overwrite one row with already-encoded codes, padding with blanks.
    pub fn set_row(&mut self, index: usize, codes: &[u8]) {
        if let Some(row) = self.0.get_mut(index) {
            *row = [charset::BLANK; COLS];
            for (cell, code) in row.iter_mut().zip(codes.iter()) {
                *cell = (*code).min(MAX_CODE);
            }
        }
    }

    pub fn to_vec(&self) -> Vec<Vec<u8>> {
        self.0.iter().map(|row| row.to_vec()).collect()
    }

    /// Rows rendered back to characters; unassigned codes show as `?`.
    pub fn render_rows(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|row| {
                row.iter()
                    .map(|code| charset::char_for(*code).unwrap_or('?'))
                    .collect()
            })
            .collect()
    }
}

impl Default for Layout {
    fn default() -> Self {
        Layout::blank()
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, line) in self.render_rows().iter().enumerate() {
            if index + 1 < ROWS {
                writeln!(f, "|{}|", line)?;
            } else {
                write!(f, "|{}|", line)?;
            }
        }
        Ok(())
    }
}

/// Encode one row of text, uppercasing and dropping variation selectors.
pub fn encode_row(row: &str) -> Result<Vec<u8>, ValidationError> {
    let mut codes = Vec::with_capacity(COLS);
    let mut invalid = BTreeSet::new();
    for c in row.chars().filter(|c| *c != VARIATION_SELECTOR) {
        for upper in c.to_uppercase() {
            match charset::code_for(upper) {
                Some(code) => codes.push(code),
                None => {
                    invalid.insert(upper);
                }
            }
        }
    }
    if !invalid.is_empty() {
        return Err(ValidationError::InvalidCharacters(invalid));
    }
    Ok(codes)
}

/// Encode up to 6 rows of at most 22 tiles each, left-aligned and blank-padded.
pub fn encode<S: AsRef<str>>(rows: &[S]) -> Result<Layout, ValidationError> {
    if rows.len() > ROWS {
        return Err(ValidationError::TooManyLines {
            lines: rows.len(),
            max: ROWS,
        });
    }
    let mut layout = Layout::blank();
    for (index, row) in rows.iter().enumerate() {
        let codes = encode_row(row.as_ref())?;
        if codes.len() > COLS {
            return Err(ValidationError::LineTooLong {
                line: index + 1,
                length: codes.len(),
                max: COLS,
            });
        }
        layout.set_row(index, &codes);
    }
    Ok(layout)
}
