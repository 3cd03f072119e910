use miette::{Diagnostic, SourceOffset, SourceSpan};

use crate::eval::error::EvalError;
use crate::lexer::error::LexerError;
use crate::parser::error::ParseError;
use crate::range::Range;

#[derive(Debug, thiserror::Error, PartialEq, Clone)]
pub enum InnerError {
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Represents a high-level error with diagnostic information for the user.
#[derive(PartialEq, Debug, Clone, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
    /// The source code related to the error.
    pub source_code: String,
    /// The location in the source code for diagnostics.
    pub location: SourceSpan,
}

impl Error {
    pub fn from_error(source_code: impl Into<String>, cause: InnerError) -> Self {
        let source_code = source_code.into();
        let range = match &cause {
            InnerError::Lexer(err) | InnerError::Parse(ParseError::Lexer(err)) => Some(*err.range()),
            InnerError::Parse(err) => err.token().map(|token| token.range),
            InnerError::Eval(_) => None,
        };

        let location = match range {
            Some(range) => span(&source_code, &range),
            None => SourceSpan::new(SourceOffset::from_location(&source_code, 0, 0), 1),
        };

        Self {
            cause,
            source_code,
            location,
        }
    }
}

fn span(source_code: &str, range: &Range) -> SourceSpan {
    let start = SourceOffset::from_location(source_code, range.start.line as usize, range.start.column);
    let end = SourceOffset::from_location(source_code, range.end.line as usize, range.end.column);

    SourceSpan::new(start, std::cmp::max(end.offset().saturating_sub(start.offset()), 1))
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match &self.cause {
            InnerError::Lexer(err) | InnerError::Parse(ParseError::Lexer(err)) => match err {
                LexerError::UnknownCharacter(_, _) => "LexerError::UnknownCharacter",
                LexerError::InvalidNumber(_, _) => "LexerError::InvalidNumber",
                LexerError::InvalidString(_, _) => "LexerError::InvalidString",
                LexerError::InvalidName(_, _) => "LexerError::InvalidName",
                LexerError::DisabledOperator(_, _, _) => "LexerError::DisabledOperator",
            },
            InnerError::Parse(err) => match err {
                ParseError::Lexer(_) => "ParseError::Lexer",
                ParseError::Expected(_, _) => "ParseError::Expected",
                ParseError::UnexpectedToken(_) => "ParseError::UnexpectedToken",
                ParseError::InvalidAssignmentTarget(_) => "ParseError::InvalidAssignmentTarget",
                ParseError::FunctionDefinitionNotPermitted(_) => "ParseError::FunctionDefinitionNotPermitted",
                ParseError::InvalidCaseBlock(_) => "ParseError::InvalidCaseBlock",
                ParseError::CaseMissingWhenThen(_) => "ParseError::CaseMissingWhenThen",
            },
            InnerError::Eval(err) => match err {
                EvalError::UndefinedVariable(_) => "EvalError::UndefinedVariable",
                EvalError::NotAFunction(_) => "EvalError::NotAFunction",
                EvalError::MemberAccessNotPermitted => "EvalError::MemberAccessNotPermitted",
                EvalError::PrototypeAccess(_) => "EvalError::PrototypeAccess",
                EvalError::UnknownType(_) => "EvalError::UnknownType",
                EvalError::InvalidArgument(_) => "EvalError::InvalidArgument",
                EvalError::InvalidMemberAssignment(_, _) => "EvalError::InvalidMemberAssignment",
                EvalError::UnknownOperator(_) => "EvalError::UnknownOperator",
                EvalError::Parity => "EvalError::Parity",
                EvalError::StackUnderflow => "EvalError::StackUnderflow",
                EvalError::RecursionError(_) => "EvalError::RecursionError",
                EvalError::Custom(_) => "EvalError::Custom",
            },
        };

        Some(Box::new(c))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Lexer(err) | InnerError::Parse(ParseError::Lexer(err)) => match err {
                LexerError::UnknownCharacter(_, _) => Some("Remove the character or quote it inside a string.".to_string()),
                LexerError::InvalidNumber(_, _) => Some("Check the digits, decimal point and exponent of the number.".to_string()),
                LexerError::InvalidString(_, _) => Some("Close the string and use only supported escape sequences.".to_string()),
                LexerError::InvalidName(_, _) => Some("A `$` must be followed by a letter.".to_string()),
                LexerError::DisabledOperator(_, _, category) => {
                    Some(format!("Enable the '{category}' operator category to use this operator."))
                }
            },
            InnerError::Parse(ParseError::UnexpectedToken(token)) if token.is_eof() => {
                Some("Input ended unexpectedly. Make sure all expressions are complete.".to_string())
            }
            InnerError::Parse(ParseError::UnexpectedToken(_)) => Some("Check for syntax errors or misplaced tokens.".to_string()),
            InnerError::Parse(ParseError::Expected(_, expected)) => {
                Some(format!("Insert '{expected}' or remove the tokens before it."))
            }
            InnerError::Parse(ParseError::InvalidAssignmentTarget(_)) => {
                Some("Only variables, members and `name(params)` can be assigned to.".to_string())
            }
            InnerError::Parse(ParseError::FunctionDefinitionNotPermitted(_)) => {
                Some("Enable the 'fndef' operator category to define functions.".to_string())
            }
            InnerError::Parse(ParseError::InvalidCaseBlock(_) | ParseError::CaseMissingWhenThen(_)) => {
                Some("A case block is `case [value] when cond then result ... [else result] end`.".to_string())
            }
            InnerError::Eval(EvalError::UndefinedVariable(name)) => {
                Some(format!("'{name}' is not defined. Did you forget to bind it?"))
            }
            InnerError::Eval(EvalError::MemberAccessNotPermitted) => {
                Some("Member access is disabled in the parser options.".to_string())
            }
            InnerError::Eval(EvalError::UnknownType(_)) => {
                Some("Supported conversion types are \"boolean\", \"int\", \"integer\" and \"number\".".to_string())
            }
            InnerError::Eval(EvalError::RecursionError(_)) => {
                Some("A function defined in the expression calls itself without terminating.".to_string())
            }
            InnerError::Eval(EvalError::Parity | EvalError::StackUnderflow) => {
                Some("The compiled expression is malformed. Please report this if it persists.".to_string())
            }
            _ => None,
        };

        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(miette::LabeledSpan::new_with_span(
            Some(format!("{}", self.cause)),
            self.location,
        ))))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }
}
