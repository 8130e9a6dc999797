//! Text normalization: typographic variants to ASCII.

use unicode_normalization::UnicodeNormalization;

const SUBSTITUTIONS: &[(char, &str)] = &[
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201A}', "'"),
    ('\u{201B}', "'"),
    ('\u{2032}', "'"),
    ('\u{00B4}', "'"),
    ('`', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{201E}', "\""),
    ('\u{201F}', "\""),
    ('\u{2033}', "\""),
    ('\u{00AB}', "\""),
    ('\u{00BB}', "\""),
    ('\u{2010}', "-"),
    ('\u{2011}', "-"),
    ('\u{2012}', "-"),
    ('\u{2013}', "-"),
    ('\u{2014}', "-"),
    ('\u{2015}', "-"),
    ('\u{2212}', "-"),
    ('\u{2022}', "-"),
    ('\u{2026}', "..."),
    ('\t', " "),
    ('\r', ""),
    ('\u{00A0}', " "),
    ('\u{2002}', " "),
    ('\u{2003}', " "),
    ('\u{2004}', " "),
    ('\u{2005}', " "),
    ('\u{2006}', " "),
    ('\u{2007}', " "),
    ('\u{2008}', " "),
    ('\u{2009}', " "),
    ('\u{200A}', " "),
    ('\u{202F}', " "),
    ('\u{205F}', " "),
    ('\u{3000}', " "),
    ('\u{00DF}', "ss"),
    ('\u{00E6}', "ae"),
    ('\u{00C6}', "AE"),
    ('\u{0153}', "oe"),
    ('\u{0152}', "OE"),
    ('\u{00F8}', "o"),
    ('\u{00D8}', "O"),
    ('\u{0142}', "l"),
    ('\u{0141}', "L"),
    ('\u{0111}', "d"),
    ('\u{0110}', "D"),
    ('\u{00F0}', "d"),
    ('\u{00D0}', "D"),
    ('\u{00FE}', "th"),
    ('\u{00DE}', "TH"),
    ('\u{0131}', "i"),
];

fn substitute(c: char) -> Option<&'static str> {
    SUBSTITUTIONS
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

/// Replace typographic variants and accented Latin letters with ASCII equivalents.
///
/// Canonical decomposition runs first so accents become separate combining marks,
/// which are dropped after the substitution table is applied. Every substitution
/// produces ASCII; the closing NFD pass reorders marks left adjacent by a deleted
/// character, so `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        match substitute(c) {
            Some(replacement) => out.push_str(replacement),
            None => out.push(c),
        }
    }
    out.nfd().collect()
}
