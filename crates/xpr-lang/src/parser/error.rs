use thiserror::Error;

use crate::lexer::error::LexerError;
use crate::lexer::token::Token;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ParseError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error("parse error {}: Expected {}", .0.range.start, .1)]
    Expected(Token, String),
    #[error("parse error {}: unexpected {}", .0.range.start, describe(.0))]
    UnexpectedToken(Token),
    #[error("parse error {}: invalid assignment target", .0.range.start)]
    InvalidAssignmentTarget(Token),
    #[error("parse error {}: function definition is not permitted", .0.range.start)]
    FunctionDefinitionNotPermitted(Token),
    #[error("parse error {}: invalid case block", .0.range.start)]
    InvalidCaseBlock(Token),
    #[error("parse error {}: case block missing when/then", .0.range.start)]
    CaseMissingWhenThen(Token),
}

fn describe(token: &Token) -> String {
    if token.is_eof() { "EOF".to_string() } else { format!("\"{}\"", token) }
}

impl ParseError {
    #[cold]
    pub fn token(&self) -> Option<&Token> {
        match self {
            ParseError::Lexer(_) => None,
            ParseError::Expected(token, _) => Some(token),
            ParseError::UnexpectedToken(token) => Some(token),
            ParseError::InvalidAssignmentTarget(token) => Some(token),
            ParseError::FunctionDefinitionNotPermitted(token) => Some(token),
            ParseError::InvalidCaseBlock(token) => Some(token),
            ParseError::CaseMissingWhenThen(token) => Some(token),
        }
    }
}
