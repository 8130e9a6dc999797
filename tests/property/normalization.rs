//! Property-based tests for text normalization and encoding

use proptest::prelude::*;
use tileboard::display::{self, normalize, OutputValidator, MAX_CODE, TEXT_COLS, TEXT_ROWS};

/// Normalizing twice gives the same text as normalizing once
#[test]
fn test_normalize_idempotent_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<String>(), |text| {
            let once = normalize(&text);
            let twice = normalize(&once);
            prop_assert_eq!(once, twice);
            Ok(())
        })
        .unwrap();
}

proptest! {
    /// Whatever passes validation fits the text area and encodes to valid codes
    #[test]
    fn test_validated_text_encodes_in_range(text in "[A-Za-z0-9 .,!?'\\-\n]{0,140}") {
        let validator = OutputValidator::new();
        if let Ok(result) = validator.validate_text(&text) {
            let lines = result.lines();
            prop_assert!(lines.len() <= TEXT_ROWS);
            prop_assert!(lines.iter().all(|line| line.chars().count() <= TEXT_COLS));

            let layout = display::encode(&lines).unwrap();
            for row in layout.rows() {
                prop_assert!(row.iter().all(|code| *code <= MAX_CODE));
            }
        }
    }

    /// Validation output is uppercase and never contains unsupported glyphs
    #[test]
    fn test_validated_text_is_displayable(text in "\\PC{0,60}") {
        if let Ok(result) = OutputValidator::new().validate_text(&text) {
            prop_assert!(result.valid);
            prop_assert!(result.invalid_chars.is_empty());
            for line in result.lines() {
                prop_assert!(display::encode_row(line).is_ok());
            }
        }
    }
}
