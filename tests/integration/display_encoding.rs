//! Validation and encoding of generated content into board layouts.

use std::collections::BTreeSet;
use tileboard::content::GeneratedContent;
use tileboard::display::{self, Layout, OutputValidator, COLS, MAX_CODE, ROWS, TEXT_COLS};
use tileboard::error::ValidationError;

#[test]
fn test_em_dash_normalizes_and_encodes() {
    let validator = OutputValidator::new();
    let content = GeneratedContent::text("Hello\u{2014}World");

    let result = validator.validate(&content).unwrap();
    assert_eq!(result.normalized_text, "HELLO-WORLD");

    let layout = validator.encode(&content, &result).unwrap();
    assert_eq!(
        &layout.rows()[0][..11],
        &[8, 5, 12, 12, 15, 44, 23, 15, 18, 12, 4]
    );
    assert!(layout.rows()[1..].iter().all(|row| row.iter().all(|c| *c == 0)));
}

#[test]
fn test_long_line_wraps_within_text_area() {
    let validator = OutputValidator::new();
    let result = validator
        .validate_text("Tomorrow brings sunshine")
        .unwrap();

    assert!(result.wrapping_applied);
    assert!(!result.truncation_applied);
    assert_eq!(result.line_count, 2);
    assert!(result.lines().iter().all(|l| l.chars().count() <= TEXT_COLS));

    let overflow = vec!["Tomorrow brings sunshine"; 3].join("\n");
    assert!(matches!(
        validator.validate_text(&overflow),
        Err(ValidationError::TooManyLines { lines: 6, max: 5 })
    ));
}

#[test]
fn test_accents_and_quotes_are_folded() {
    let result = OutputValidator::new()
        .validate_text("Caf\u{00E9} \u{201C}open\u{201D}\u{2026}")
        .unwrap();
    assert_eq!(result.normalized_text, "CAFE \"OPEN\"...");
}

#[test]
fn test_unsupported_characters_are_reported() {
    let err = OutputValidator::new()
        .validate_text("50% off <today>")
        .unwrap_err();
    assert_eq!(
        err,
        ValidationError::InvalidCharacters(BTreeSet::from(['<', '>']))
    );
}

#[test]
fn test_color_emoji_kept_and_other_emoji_stripped() {
    let validator = OutputValidator::new();
    let content = GeneratedContent::text("GO \u{1F7E9} \u{1F600}");

    let result = validator.validate(&content).unwrap();
    assert!(result.emoji_stripped);
    assert_eq!(result.normalized_text, "GO \u{1F7E9}");

    let layout = validator.encode(&content, &result).unwrap();
    assert_eq!(&layout.rows()[0][..4], &[7, 15, 0, 66]);
}

#[test]
fn test_every_encoded_code_is_in_range() {
    let layout = display::encode(&["ABC 123 !?", "0987654321", "$@#()-+&=;:'\"%,./"]).unwrap();
    for row in layout.rows() {
        assert!(row.iter().all(|code| *code <= MAX_CODE));
    }
    assert_eq!(&layout.rows()[1][..10], &[36, 35, 34, 33, 32, 31, 30, 29, 28, 27]);
}

#[test]
fn test_layout_grid_validation() {
    let validator = OutputValidator::new();

    let mut grid = vec![vec![0i64; COLS]; ROWS];
    grid[2][5] = 71;
    let content = GeneratedContent::layout_codes(grid.clone());
    let result = validator.validate(&content).unwrap();
    let layout = validator.encode(&content, &result).unwrap();
    assert_eq!(layout.rows()[2][5], 71);

    grid[3][0] = 72;
    assert!(matches!(
        validator.validate(&GeneratedContent::layout_codes(grid)),
        Err(ValidationError::CodeOutOfRange { row: 4, column: 1, code: 72 })
    ));

    let short = vec![vec![0i64; COLS]; ROWS - 1];
    assert!(matches!(
        Layout::from_codes(&short),
        Err(ValidationError::LayoutRowCount { expected: 6, actual: 5 })
    ));
}

#[test]
fn test_layout_rows_must_fill_board() {
    let validator = OutputValidator::new();
    let full_row = "X".repeat(COLS);

    let rows = vec![full_row.clone(); ROWS];
    assert!(validator.validate(&GeneratedContent::layout_rows(rows)).is_ok());

    let mut rows = vec![full_row; ROWS];
    rows[1] = "SHORT".to_string();
    assert!(matches!(
        validator.validate(&GeneratedContent::layout_rows(rows)),
        Err(ValidationError::LayoutRowLength { row: 2, .. })
    ));
}

#[test]
fn test_inspect_reports_without_failing() {
    let result = OutputValidator::new().inspect(&GeneratedContent::text("A\nB\nC\nD\nE\nF"));
    assert!(!result.valid);
    assert_eq!(result.line_count, 6);
}
