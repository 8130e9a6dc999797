//! Glyph table: character to tile code mapping.
//!
//! Codes: 0 blank, 1-26 letters, 27-36 digits (1..9 then 0), 37-62 punctuation,
//! 63-69 colors, 70 black, 71 filled.

pub const BLANK: u8 = 0;
pub const BLACK: u8 = 70;
pub const FILLED: u8 = 71;

/// Emoji variation selector; dropped so a color emoji occupies one tile.
pub const VARIATION_SELECTOR: char = '\u{FE0F}';

const PUNCTUATION: &[(char, u8)] = &[
    ('!', 37),
    ('@', 38),
    ('#', 39),
    ('$', 40),
    ('(', 41),
    (')', 42),
    ('-', 44),
    ('+', 46),
    ('&', 47),
    ('=', 48),
    (';', 49),
    (':', 50),
    ('\'', 52),
    ('"', 53),
    ('%', 54),
    (',', 55),
    ('.', 56),
    ('/', 59),
    ('?', 60),
    ('°', 62),
];

/// Color tiles and the emoji that select them.
pub const COLOR_EMOJI: &[(char, u8)] = &[
    ('\u{1F7E5}', 63), // red square
    ('\u{1F7E7}', 64), // orange square
    ('\u{1F7E8}', 65), // yellow square
    ('\u{1F7E9}', 66), // green square
    ('\u{1F7E6}', 67), // blue square
    ('\u{1F7EA}', 68), // purple square
    ('\u{2B1C}', 69),  // white large square
    ('\u{2B1B}', BLACK),
];

/// Tile code for a single (already uppercased) character.
pub fn code_for(c: char) -> Option<u8> {
    match c {
        ' ' => Some(BLANK),
        'A'..='Z' => Some(c as u8 - b'A' + 1),
        '1'..='9' => Some(c as u8 - b'1' + 27),
        '0' => Some(36),
        _ => PUNCTUATION
            .iter()
            .chain(COLOR_EMOJI.iter())
            .find(|(ch, _)| *ch == c)
            .map(|(_, code)| *code),
    }
}

/// Character shown for a tile code, used by previews.
pub fn char_for(code: u8) -> Option<char> {
    match code {
        BLANK => Some(' '),
        1..=26 => Some((b'A' + code - 1) as char),
        27..=35 => Some((b'1' + code - 27) as char),
        36 => Some('0'),
        FILLED => Some('\u{2588}'),
        _ => PUNCTUATION
            .iter()
            .chain(COLOR_EMOJI.iter())
            .find(|(_, c)| *c == code)
            .map(|(ch, _)| *ch),
    }
}

pub fn is_supported(c: char) -> bool {
    code_for(c).is_some()
}

/// Color tile code for a grapheme, ignoring a trailing variation selector.
pub fn color_code(grapheme: &str) -> Option<u8> {
    let mut chars = grapheme.chars().filter(|c| *c != VARIATION_SELECTOR);
    let first = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    COLOR_EMOJI
        .iter()
        .find(|(ch, _)| *ch == first)
        .map(|(_, code)| *code)
}
