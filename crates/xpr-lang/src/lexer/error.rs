use smol_str::SmolStr;
use thiserror::Error;

use crate::range::Range;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum LexerError {
    #[error("parse error {}: Unknown character \"{}\"", .0.start, .1)]
    UnknownCharacter(Range, char),
    #[error("parse error {}: Invalid number \"{}\"", .0.start, .1)]
    InvalidNumber(Range, String),
    #[error("parse error {}: {}", .0.start, .1)]
    InvalidString(Range, String),
    #[error("parse error {}: Invalid variable name \"{}\"", .0.start, .1)]
    InvalidName(Range, String),
    #[error("parse error {}: operator \"{}\" is disabled ({})", .0.start, .1, .2)]
    DisabledOperator(Range, SmolStr, SmolStr),
}

impl LexerError {
    #[cold]
    pub fn range(&self) -> &Range {
        match self {
            LexerError::UnknownCharacter(range, _) => range,
            LexerError::InvalidNumber(range, _) => range,
            LexerError::InvalidString(range, _) => range,
            LexerError::InvalidName(range, _) => range,
            LexerError::DisabledOperator(range, _, _) => range,
        }
    }
}
