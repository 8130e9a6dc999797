//! Display constraints, validation and glyph encoding
//!
//! The board is a 6x22 grid of mechanical tiles. Framed text leaves the bottom row to
//! the time/weather decorator, so messages get 5 rows of 21 columns.

pub mod charset;
pub mod encoder;
pub mod normalize;
pub mod validator;

pub use encoder::{encode, encode_row, Layout};
pub use normalize::normalize;
pub use validator::{OutputValidator, ValidationResult};

/// Rows on the physical board
pub const ROWS: usize = 6;
/// Columns on the physical board
pub const COLS: usize = 22;
/// Rows available to framed text
pub const TEXT_ROWS: usize = 5;
/// Columns available to framed text
pub const TEXT_COLS: usize = 21;
/// Highest valid glyph code
pub const MAX_CODE: u8 = 71;
