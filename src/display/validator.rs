//! Output validation: normalize, strip emoji, wrap, check the character set.

use crate::content::{GeneratedContent, LayoutPayload, OutputMode};
use crate::display::charset::{self, VARIATION_SELECTOR};
use crate::display::encoder::Layout;
use crate::display::normalize::normalize;
use crate::display::{COLS, ROWS, TEXT_COLS, TEXT_ROWS};
use crate::error::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{debug, info};
use unicode_segmentation::UnicodeSegmentation;

static PICTOGRAPHIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\p{Extended_Pictographic}").expect("Invalid pictographic pattern")
});

/// Symbols classified as pictographic that are not emoji; they are left for the
/// character-set check rather than silently removed.
const LEGACY_SYMBOLS: &[char] = &[
    '\u{00A9}', // ©
    '\u{00AE}', // ®
    '\u{2122}', // ™
    '\u{203C}', // ‼
    '\u{2049}', // ⁉
    '\u{2139}', // ℹ
];

/// Outcome of one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub line_count: usize,
    pub max_line_length: usize,
    #[serde(default)]
    pub invalid_chars: BTreeSet<char>,
    #[serde(default)]
    pub wrapping_applied: bool,
    #[serde(default)]
    pub truncation_applied: bool,
    #[serde(default)]
    pub emoji_stripped: bool,
    pub normalized_text: String,
}

impl ValidationResult {
    fn new(normalized_text: String) -> Self {
        Self {
            valid: true,
            line_count: 0,
            max_line_length: 0,
            invalid_chars: BTreeSet::new(),
            wrapping_applied: false,
            truncation_applied: false,
            emoji_stripped: false,
            normalized_text,
        }
    }

    /// Normalized rows, one entry per board line.
    pub fn lines(&self) -> Vec<&str> {
        self.normalized_text.split('\n').collect()
    }
}

/// Validates generated content against the board's physical constraints.
#[derive(Debug, Clone)]
pub struct OutputValidator {
    max_lines: usize,
    max_line_length: usize,
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputValidator {
    pub fn new() -> Self {
        Self {
            max_lines: TEXT_ROWS,
            max_line_length: TEXT_COLS,
        }
    }

    /// Validate content, failing with a classified error when it cannot be displayed.
    pub fn validate(
        &self,
        content: &GeneratedContent,
    ) -> Result<ValidationResult, ValidationError> {
        let (result, error) = self.evaluate(content);
        match error {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }

    /// Validate content and report the outcome without failing.
    pub fn inspect(&self, content: &GeneratedContent) -> ValidationResult {
        self.evaluate(content).0
    }

    pub fn validate_text(&self, text: &str) -> Result<ValidationResult, ValidationError> {
        let (result, error) = self.evaluate_text(text);
        match error {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }

    /// Encode content that already passed validation into a board layout.
    ///
    /// Text is placed top-left without a frame; layout content must fill the board.
    pub fn encode(
        &self,
        content: &GeneratedContent,
        result: &ValidationResult,
    ) -> Result<Layout, ValidationError> {
        match content.output_mode {
            OutputMode::Text => crate::display::encode(&result.lines()),
            OutputMode::Layout => match &content.layout {
                Some(LayoutPayload::Codes(grid)) => Layout::from_codes(grid),
                Some(LayoutPayload::Rows(_)) => crate::display::encode(&result.lines()),
                None => Err(ValidationError::MissingPayload("layout")),
            },
        }
    }

    fn evaluate(&self, content: &GeneratedContent) -> (ValidationResult, Option<ValidationError>) {
        match content.output_mode {
            OutputMode::Text => match &content.text {
                Some(text) => self.evaluate_text(text),
                None => Self::rejected(String::new(), ValidationError::MissingPayload("text")),
            },
            OutputMode::Layout => match &content.layout {
                Some(LayoutPayload::Rows(rows)) => self.evaluate_layout_rows(rows),
                Some(LayoutPayload::Codes(grid)) => self.evaluate_layout_codes(grid),
                None => Self::rejected(String::new(), ValidationError::MissingPayload("layout")),
            },
        }
    }

    fn rejected(
        normalized_text: String,
        error: ValidationError,
    ) -> (ValidationResult, Option<ValidationError>) {
        let mut result = ValidationResult::new(normalized_text);
        result.valid = false;
        (result, Some(error))
    }

    fn evaluate_text(&self, text: &str) -> (ValidationResult, Option<ValidationError>) {
        let normalized = normalize(text);
        let (stripped, emoji_stripped) = strip_unsupported_emoji(&normalized);
        if emoji_stripped {
            info!("Stripped unsupported emoji from generated text");
        }

        let upper = stripped.to_uppercase();
        let mut lines: Vec<String> = upper
            .trim()
            .split('\n')
            .map(|line| line.trim_end().to_string())
            .collect();
        if lines.iter().all(|line| line.is_empty()) {
            let mut rejected = Self::rejected(String::new(), ValidationError::EmptyContent);
            rejected.0.emoji_stripped = emoji_stripped;
            return rejected;
        }

        let mut wrapping_applied = false;
        let mut truncation_applied = false;
        if lines.iter().any(|line| tile_count(line) > self.max_line_length) {
            let mut wrapped = Vec::new();
            for line in &lines {
                if tile_count(line) > self.max_line_length {
                    let (pieces, truncated) = wrap_line(line, self.max_line_length);
                    truncation_applied |= truncated;
                    wrapped.extend(pieces);
                } else {
                    wrapped.push(line.clone());
                }
            }
            info!(
                before = lines.len(),
                after = wrapped.len(),
                truncated = truncation_applied,
                "Wrapped long lines to fit the board"
            );
            lines = wrapped;
            wrapping_applied = true;
        }

        let mut result = ValidationResult::new(lines.join("\n"));
        result.line_count = lines.len();
        result.max_line_length = lines.iter().map(|l| tile_count(l)).max().unwrap_or(0);
        result.wrapping_applied = wrapping_applied;
        result.truncation_applied = truncation_applied;
        result.emoji_stripped = emoji_stripped;

        if lines.len() > self.max_lines {
            result.valid = false;
            return (
                result,
                Some(ValidationError::TooManyLines {
                    lines: lines.len(),
                    max: self.max_lines,
                }),
            );
        }

        let invalid = invalid_characters(&lines);
        if !invalid.is_empty() {
            result.valid = false;
            result.invalid_chars = invalid.clone();
            return (result, Some(ValidationError::InvalidCharacters(invalid)));
        }

        debug!(
            lines = result.line_count,
            max_line_length = result.max_line_length,
            "Text validated"
        );
        (result, None)
    }

    fn evaluate_layout_rows(&self, rows: &[String]) -> (ValidationResult, Option<ValidationError>) {
        let lines: Vec<String> = rows
            .iter()
            .map(|row| {
                row.chars()
                    .filter(|c| *c != VARIATION_SELECTOR)
                    .collect::<String>()
                    .to_uppercase()
            })
            .collect();

        let mut result = ValidationResult::new(lines.join("\n"));
        result.line_count = lines.len();
        result.max_line_length = lines.iter().map(|l| tile_count(l)).max().unwrap_or(0);

        if lines.len() != ROWS {
            result.valid = false;
            return (
                result,
                Some(ValidationError::LayoutRowCount {
                    expected: ROWS,
                    actual: lines.len(),
                }),
            );
        }
        if let Some((index, line)) = lines
            .iter()
            .enumerate()
            .find(|(_, line)| tile_count(line) != COLS)
        {
            result.valid = false;
            let actual = tile_count(line);
            return (
                result,
                Some(ValidationError::LayoutRowLength {
                    row: index + 1,
                    expected: COLS,
                    actual,
                }),
            );
        }

        let invalid = invalid_characters(&lines);
        if !invalid.is_empty() {
            result.valid = false;
            result.invalid_chars = invalid.clone();
            return (result, Some(ValidationError::InvalidCharacters(invalid)));
        }
        (result, None)
    }

    fn evaluate_layout_codes(
        &self,
        grid: &[Vec<i64>],
    ) -> (ValidationResult, Option<ValidationError>) {
        match Layout::from_codes(grid) {
            Ok(layout) => {
                let mut result = ValidationResult::new(layout.render_rows().join("\n"));
                result.line_count = ROWS;
                result.max_line_length = COLS;
                (result, None)
            }
            Err(err) => {
                let mut result = ValidationResult::new(String::new());
                result.valid = false;
                result.line_count = grid.len();
                result.max_line_length = grid.iter().map(Vec::len).max().unwrap_or(0);
                (result, Some(err))
            }
        }
    }
}

/// Number of board tiles a line occupies.
pub fn tile_count(line: &str) -> usize {
    line.chars().filter(|c| *c != VARIATION_SELECTOR).count()
}

fn invalid_characters(lines: &[String]) -> BTreeSet<char> {
    lines
        .iter()
        .flat_map(|line| line.chars())
        .filter(|c| *c != '\n' && !charset::is_supported(*c))
        .collect()
}

fn is_regional_indicator(c: char) -> bool {
    ('\u{1F1E6}'..='\u{1F1FF}').contains(&c)
}

/// Remove pictographic graphemes other than color tiles and legacy symbols.
///
/// Returns the cleaned text and whether anything was removed. Color emoji lose
/// their variation selector so each occupies exactly one tile.
pub fn strip_unsupported_emoji(text: &str) -> (String, bool) {
    let mut out = String::with_capacity(text.len());
    let mut stripped = false;
    for grapheme in text.graphemes(true) {
        if let Some(code) = charset::color_code(grapheme) {
            if let Some(c) = charset::char_for(code) {
                out.push(c);
                continue;
            }
        }
        let base: String = grapheme.chars().filter(|c| *c != VARIATION_SELECTOR).collect();
        if base.chars().count() == 1
            && base.chars().all(|c| LEGACY_SYMBOLS.contains(&c))
        {
            out.push_str(&base);
            continue;
        }
        if PICTOGRAPHIC.is_match(grapheme) || grapheme.chars().any(is_regional_indicator) {
            stripped = true;
            continue;
        }
        out.push_str(&base);
    }
    (out, stripped)
}

/// Word-wrap one line to `width` tiles.
///
/// A word longer than `width` is cut to `width` tiles; the flag reports whether that
/// happened.
pub fn wrap_line(line: &str, width: usize) -> (Vec<String>, bool) {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut truncated = false;

    for word in line.split(' ').filter(|w| !w.is_empty()) {
        let word = if tile_count(word) > width {
            truncated = true;
            word.chars().take(width).collect::<String>()
        } else {
            word.to_string()
        };

        if current.is_empty() {
            current = word;
        } else if tile_count(&current) + 1 + tile_count(&word) <= width {
            current.push(' ');
            current.push_str(&word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    (lines, truncated)
}
