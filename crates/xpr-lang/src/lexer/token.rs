use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::{number::Number, range::Range};

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Keyword {
    Case,
    When,
    Then,
    Else,
    End,
}

impl Keyword {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "case" => Some(Keyword::Case),
            "when" => Some(Keyword::When),
            "then" => Some(Keyword::Then),
            "else" => Some(Keyword::Else),
            "end" => Some(Keyword::End),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Case => "case",
            Keyword::When => "when",
            Keyword::Then => "then",
            Keyword::Else => "else",
            Keyword::End => "end",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
}

#[derive(PartialEq, Debug, Clone)]
pub enum TokenKind {
    Comma,
    Const(SmolStr),
    Eof,
    Keyword(Keyword),
    LBrace,
    LBracket,
    LParen,
    Name(SmolStr),
    NumberLiteral(Number),
    Op(SmolStr),
    RBrace,
    RBracket,
    RParen,
    SemiColon,
    StringLiteral(String),
    Undefined,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn is_op(&self, op: &str) -> bool {
        matches!(&self.kind, TokenKind::Op(o) if o == op)
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(&self.kind, TokenKind::Keyword(k) if *k == keyword)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match &self {
            TokenKind::Comma => write!(f, ","),
            TokenKind::Const(name) => write!(f, "{}", name),
            TokenKind::Eof => write!(f, "EOF"),
            TokenKind::Keyword(keyword) => write!(f, "{}", keyword.as_str()),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::LParen => write!(f, "("),
            TokenKind::Name(name) => write!(f, "{}", name),
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::Op(op) => write!(f, "{}", op),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::SemiColon => write!(f, ";"),
            TokenKind::StringLiteral(s) => write!(f, "{:?}", s),
            TokenKind::Undefined => write!(f, "undefined"),
        }
    }
}
