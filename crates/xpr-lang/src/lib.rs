//! `xpr-lang` parses and evaluates a small embeddable expression language.
//!
//! Expressions compile to a flat postfix program that is evaluated on a stack, with lazy
//! operands for the short-circuiting operators, closures for functions defined in an
//! expression, and deferred values for functions that answer asynchronously.
//!
//! ## Examples
//!
//! ```rs
//! use xpr_lang::{Bindings, Parser, Value};
//!
//! let parser = Parser::default();
//! let expression = parser.parse("2 * x + 1").unwrap();
//! let bindings: Bindings = [("x", 3.0)].into_iter().collect();
//!
//! assert_eq!(expression.evaluate(&bindings).unwrap(), Value::from(7.0));
//!
//! // Fold what is already known and render the result
//! let simplified = parser.parse("x * (y * atan(1))").unwrap()
//!     .simplify(&[("y", 4.0)].into_iter().collect())
//!     .unwrap();
//!
//! assert_eq!(simplified.to_string(), "(x * 3.141592653589793)");
//! assert_eq!(simplified.variables(false), vec!["x"]);
//! ```
mod error;
mod eval;
mod expression;
mod instruction;
mod lexer;
mod number;
mod optimizer;
mod parser;
mod range;
mod stringify;
mod value;

use error::InnerError;

pub use error::Error;
pub use eval::env::Bindings;
pub use eval::error::EvalError;
pub use expression::Expression;
pub use instruction::{Instruction, Program, dump};
pub use lexer::error::LexerError;
pub use lexer::token::{Keyword, Token, TokenKind};
pub use number::Number;
pub use parser::error::ParseError;
pub use parser::{DEFAULT_MAX_CALL_DEPTH, Options, Parser, Resolution, category};
pub use range::{Position, Range};
pub use stringify::Dialect;
pub use value::{Deferred, Function, Object, Value};

pub type XprResult = Result<Value, Error>;

/// Parses `source` with the default parser.
#[allow(clippy::result_large_err)]
pub fn parse(source: &str) -> Result<Expression, Error> {
    Parser::default().parse(source)
}

/// Parses and evaluates `source` with the default parser.
#[allow(clippy::result_large_err)]
pub fn evaluate(source: &str, bindings: &Bindings) -> XprResult {
    Parser::default().evaluate(source, bindings)
}

#[allow(clippy::result_large_err)]
pub fn tokenize(parser: &Parser, source: &str) -> Result<Vec<Token>, Error> {
    lexer::tokenize(parser, source).map_err(|e| Error::from_error(source, InnerError::Lexer(e)))
}
