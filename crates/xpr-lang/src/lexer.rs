pub mod error;
pub mod token;

use error::LexerError;
use nom::{Input, Parser as _};
use nom::bytes::complete::{tag, take, take_until, take_while};
use nom::character::complete::{alpha1, alphanumeric1, digit0, digit1, hex_digit0, multispace1, one_of};
use nom::combinator::{map, opt, recognize, rest, value};
use nom::multi::many0;
use nom::sequence::{pair, preceded, terminated};
use nom::{IResult, branch::alt};
use smol_str::SmolStr;
use token::{Keyword, Token, TokenKind};

use crate::number::Number;
use crate::parser::Parser;
use crate::range::{Position, Range, Span};

/// Word operators that are recognized regardless of the unary operator table.
const WORD_OPERATORS: [&str; 5] = ["and", "or", "not", "in", "as"];

macro_rules! define_token_parser {
    ($name:ident, $tag:expr, $kind:expr) => {
        fn $name(input: Span) -> IResult<Span, Token> {
            map(tag($tag), |span: Span| Token {
                range: span.into(),
                kind: $kind,
            })
            .parse(input)
        }
    };
}

define_token_parser!(comma, ",", TokenKind::Comma);
define_token_parser!(semi_colon, ";", TokenKind::SemiColon);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(l_brace, "{", TokenKind::LBrace);
define_token_parser!(r_brace, "}", TokenKind::RBrace);
define_token_parser!(l_bracket, "[", TokenKind::LBracket);
define_token_parser!(r_bracket, "]", TokenKind::RBracket);

fn punctuations(input: Span) -> IResult<Span, Token> {
    alt((comma, semi_colon, l_paren, r_paren, l_brace, r_brace, l_bracket, r_bracket)).parse(input)
}

fn block_comment(input: Span) -> IResult<Span, ()> {
    value((), preceded(tag("/*"), alt((terminated(take_until("*/"), tag("*/")), rest)))).parse(input)
}

fn trivia(input: Span) -> IResult<Span, ()> {
    value((), many0(alt((value((), multispace1), block_comment)))).parse(input)
}

fn radix_integer(input: Span) -> IResult<Span, (u32, Span)> {
    alt((
        map(preceded(tag("0x"), hex_digit0), |digits| (16, digits)),
        map(preceded(tag("0b"), take_while(|c: char| c == '0' || c == '1')), |digits| (2, digits)),
    ))
    .parse(input)
}

fn decimal_mantissa(input: Span) -> IResult<Span, Span> {
    recognize(alt((
        recognize(pair(digit1, opt(pair(tag("."), digit0)))),
        recognize(pair(tag("."), digit1)),
    )))
    .parse(input)
}

fn exponent(input: Span) -> IResult<Span, Span> {
    recognize((one_of("eE"), opt(one_of("+-")), digit1)).parse(input)
}

fn operator(input: Span) -> IResult<Span, Span> {
    alt((
        tag(">="),
        tag("<="),
        tag("=="),
        tag("!="),
        tag("||"),
        tag("??"),
        recognize(one_of("+-*/%^!<>=?:.")),
        tag("∙"),
        tag("•"),
    ))
    .parse(input)
}

fn identifier(input: Span) -> IResult<Span, Span> {
    recognize(pair(alt((alpha1, tag("_"))), many0(alt((alphanumeric1, tag("_")))))).parse(input)
}

fn sigil_identifier(input: Span) -> IResult<Span, Span> {
    recognize(pair(alt((tag("$$"), tag("$"))), pair(alpha1, many0(alt((alphanumeric1, tag("_"))))))).parse(input)
}

fn text_between<'a>(start: Span<'a>, end: Span<'a>) -> &'a str {
    let len = end.location_offset() - start.location_offset();
    &start.fragment()[..len]
}

fn range_between(start: Span, end: Span) -> Range {
    Range::new(start.into(), end.into())
}

fn range_at(span: Span) -> Range {
    let start: Position = span.into();
    Range::new(start, Position::new(start.line, start.column + 1))
}

/// A saved position of a [`TokenStream`], used by the parser to backtrack.
#[derive(Debug, Clone)]
pub struct Checkpoint<'a> {
    rest: Span<'a>,
    current: Token,
}

/// Lazily turns source text into tokens, one per call to [`TokenStream::next`].
///
/// Operator enablement, the constant table and the named unary operators are
/// read from the parser configuration the stream was created with.
pub struct TokenStream<'a> {
    parser: &'a Parser,
    rest: Span<'a>,
    current: Token,
}

impl<'a> TokenStream<'a> {
    pub fn new(parser: &'a Parser, source: &'a str) -> Self {
        let rest = Span::new(source);
        Self {
            parser,
            rest,
            current: Token {
                range: range_between(rest, rest),
                kind: TokenKind::Eof,
            },
        }
    }

    /// The most recently produced token.
    pub fn current(&self) -> &Token {
        &self.current
    }

    pub fn save(&self) -> Checkpoint<'a> {
        Checkpoint {
            rest: self.rest,
            current: self.current.clone(),
        }
    }

    pub fn restore(&mut self, checkpoint: Checkpoint<'a>) {
        self.rest = checkpoint.rest;
        self.current = checkpoint.current;
    }

    pub fn next(&mut self) -> Result<Token, LexerError> {
        let input = match trivia(self.rest) {
            Ok((input, _)) => input,
            Err(_) => self.rest,
        };

        let (rest, token) = self.token(input)?;
        self.rest = rest;
        self.current = token.clone();
        Ok(token)
    }

    fn token(&self, input: Span<'a>) -> Result<(Span<'a>, Token), LexerError> {
        if input.fragment().is_empty() {
            return Ok((
                input,
                Token {
                    range: range_between(input, input),
                    kind: TokenKind::Eof,
                },
            ));
        }

        if let Some(result) = self.number(input) {
            return result;
        }

        if let Some(result) = self.string(input) {
            return result;
        }

        if let Ok((rest, token)) = punctuations(input) {
            if matches!(token.kind, TokenKind::LBracket | TokenKind::RBracket) {
                self.check_enabled(&token.range, token.kind.to_string().as_str())?;
            }
            return Ok((rest, token));
        }

        if let Ok((rest, span)) = operator(input) {
            let op = match *span.fragment() {
                "∙" | "•" => "*",
                op => op,
            };
            let range = range_between(input, rest);

            if op != ":" {
                self.check_enabled(&range, op)?;
            }

            return Ok((
                rest,
                Token {
                    range,
                    kind: TokenKind::Op(SmolStr::new(op)),
                },
            ));
        }

        if input.fragment().starts_with('$') {
            return match sigil_identifier(input) {
                Ok((rest, span)) => Ok((
                    rest,
                    Token {
                        range: range_between(input, rest),
                        kind: TokenKind::Name(SmolStr::new(span.fragment())),
                    },
                )),
                Err(_) => {
                    let end = identifier(input.take_from(1))
                        .map(|(rest, _)| rest)
                        .unwrap_or_else(|_| input.take_from(1));
                    Err(LexerError::InvalidName(
                        range_between(input, end),
                        text_between(input, end).to_string(),
                    ))
                }
            };
        }

        if let Ok((rest, span)) = identifier(input) {
            return Ok((
                rest,
                Token {
                    range: range_between(input, rest),
                    kind: self.classify_name(span.fragment()),
                },
            ));
        }

        let c = input.fragment().chars().next().unwrap_or_default();
        Err(LexerError::UnknownCharacter(range_at(input), c))
    }

    fn classify_name(&self, name: &str) -> TokenKind {
        let is_operator = WORD_OPERATORS.contains(&name) || self.parser.unary_op(name).is_some();

        if is_operator && self.parser.is_operator_enabled(name) {
            TokenKind::Op(SmolStr::new(name))
        } else if let Some(keyword) = Keyword::from_name(name) {
            TokenKind::Keyword(keyword)
        } else if name == "undefined" {
            TokenKind::Undefined
        } else if self.parser.constant(name).is_some() {
            TokenKind::Const(SmolStr::new(name))
        } else {
            TokenKind::Name(SmolStr::new(name))
        }
    }

    fn check_enabled(&self, range: &Range, op: &str) -> Result<(), LexerError> {
        if self.parser.is_operator_enabled(op) {
            Ok(())
        } else {
            Err(LexerError::DisabledOperator(
                *range,
                SmolStr::new(op),
                SmolStr::new(crate::parser::category(op)),
            ))
        }
    }

    fn number(&self, input: Span<'a>) -> Option<Result<(Span<'a>, Token), LexerError>> {
        if let Ok((rest, (radix, digits))) = radix_integer(input) {
            let range = range_between(input, rest);

            if digits.fragment().is_empty() {
                return Some(Err(LexerError::InvalidNumber(range, text_between(input, rest).to_string())));
            }

            let n = digits
                .fragment()
                .chars()
                .filter_map(|c| c.to_digit(radix))
                .fold(0.0, |acc, d| acc * radix as f64 + d as f64);

            return Some(Ok((
                rest,
                Token {
                    range,
                    kind: TokenKind::NumberLiteral(Number::new(n)),
                },
            )));
        }

        let (mut rest, _) = decimal_mantissa(input).ok()?;

        if rest.fragment().starts_with(['e', 'E']) {
            match exponent(rest) {
                Ok((after, _)) => rest = after,
                Err(_) => {
                    let end = rest.take_from(1);
                    return Some(Err(LexerError::InvalidNumber(
                        range_between(input, end),
                        text_between(input, end).to_string(),
                    )));
                }
            }
        }

        let text = text_between(input, rest);
        let range = range_between(input, rest);
        let n = Number::parse(text);

        if n.is_nan() {
            return Some(Err(LexerError::InvalidNumber(range, text.to_string())));
        }

        Some(Ok((
            rest,
            Token {
                range,
                kind: TokenKind::NumberLiteral(n),
            },
        )))
    }

    fn string(&self, input: Span<'a>) -> Option<Result<(Span<'a>, Token), LexerError>> {
        let quote = input.fragment().chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let mut chars = input.fragment().chars().skip(1).peekable();
        let mut consumed = 1;
        let mut text = String::new();

        loop {
            let Some(c) = chars.next() else {
                return Some(Err(LexerError::InvalidString(
                    range_at(input),
                    "Unterminated string literal".to_string(),
                )));
            };
            consumed += 1;

            if c == quote {
                break;
            }

            if c != '\\' {
                text.push(c);
                continue;
            }

            let escaped = chars.next();
            consumed += 1;

            let unescaped = match escaped {
                Some('\'') => '\'',
                Some('"') => '"',
                Some('\\') => '\\',
                Some('/') => '/',
                Some('b') => '\u{8}',
                Some('f') => '\u{c}',
                Some('n') => '\n',
                Some('r') => '\r',
                Some('t') => '\t',
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    consumed += hex.chars().count();

                    let is_hex = hex.len() == 4 && hex.chars().all(|c| c.is_ascii_hexdigit());

                    match is_hex.then(|| u32::from_str_radix(&hex, 16).ok()).flatten() {
                        Some(code) => char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER),
                        None => {
                            return Some(Err(LexerError::InvalidString(
                                range_at(input),
                                format!("Illegal escape sequence: \\u{}", hex),
                            )));
                        }
                    }
                }
                Some(other) => {
                    return Some(Err(LexerError::InvalidString(
                        range_at(input),
                        format!("Illegal escape sequence: \\{}", other),
                    )));
                }
                None => {
                    return Some(Err(LexerError::InvalidString(
                        range_at(input),
                        "Unterminated string literal".to_string(),
                    )));
                }
            };

            text.push(unescaped);
        }

        let (rest, _) = match take::<usize, Span<'a>, nom::error::Error<Span<'a>>>(consumed).parse(input) {
            Ok(result) => result,
            Err(_) => return Some(Err(LexerError::InvalidString(range_at(input), "Unterminated string literal".to_string()))),
        };

        Some(Ok((
            rest,
            Token {
                range: range_between(input, rest),
                kind: TokenKind::StringLiteral(text),
            },
        )))
    }
}

/// Tokenizes the whole input, including the trailing end-of-input token.
pub fn tokenize(parser: &Parser, source: &str) -> Result<Vec<Token>, LexerError> {
    let mut stream = TokenStream::new(parser, source);
    let mut tokens = Vec::new();

    loop {
        let token = stream.next()?;
        let eof = token.is_eof();
        tokens.push(token);

        if eof {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Options;
    use rstest::rstest;

    fn kinds(parser: &Parser, source: &str) -> Result<Vec<TokenKind>, LexerError> {
        tokenize(parser, source).map(|tokens| tokens.into_iter().map(|t| t.kind).collect())
    }

    fn op(s: &str) -> TokenKind {
        TokenKind::Op(SmolStr::new(s))
    }

    fn name(s: &str) -> TokenKind {
        TokenKind::Name(SmolStr::new(s))
    }

    fn num(n: f64) -> TokenKind {
        TokenKind::NumberLiteral(Number::new(n))
    }

    #[rstest]
    #[case::integer("123", vec![num(123.0), TokenKind::Eof])]
    #[case::trailing_dot("123.", vec![num(123.0), TokenKind::Eof])]
    #[case::leading_dot(".456", vec![num(0.456), TokenKind::Eof])]
    #[case::exponent("123e-2", vec![num(1.23), TokenKind::Eof])]
    #[case::dot_exponent("123.e3", vec![num(123000.0), TokenKind::Eof])]
    #[case::hex("0xDEADBEEF", vec![num(3735928559.0), TokenKind::Eof])]
    #[case::hex_swallows_e("0x1e+4", vec![num(30.0), op("+"), num(4.0), TokenKind::Eof])]
    #[case::binary("0b101", vec![num(5.0), TokenKind::Eof])]
    #[case::name_starting_with_e("e+1", vec![name("e"), op("+"), num(1.0), TokenKind::Eof])]
    #[case::greedy_ops("a>=b??c||d", vec![name("a"), op(">="), name("b"), op("??"), name("c"), op("||"), name("d"), TokenKind::Eof])]
    #[case::bullet_multiply("2 ∙ 3 • 4", vec![num(2.0), op("*"), num(3.0), op("*"), num(4.0), TokenKind::Eof])]
    #[case::word_ops("not x in y", vec![op("not"), name("x"), op("in"), name("y"), TokenKind::Eof])]
    #[case::named_unary("sin x", vec![op("sin"), name("x"), TokenKind::Eof])]
    #[case::prefixed_names("org and android", vec![name("org"), op("and"), name("android"), TokenKind::Eof])]
    #[case::constants("PI + PITTSBURGH", vec![TokenKind::Const(SmolStr::new("PI")), op("+"), name("PITTSBURGH"), TokenKind::Eof])]
    #[case::undefined("undefined", vec![TokenKind::Undefined, TokenKind::Eof])]
    #[case::keywords("case x when 1 then 2 end", vec![
        TokenKind::Keyword(Keyword::Case), name("x"), TokenKind::Keyword(Keyword::When), num(1.0),
        TokenKind::Keyword(Keyword::Then), num(2.0), TokenKind::Keyword(Keyword::End), TokenKind::Eof])]
    #[case::sigils("$x + $$y", vec![name("$x"), op("+"), name("$$y"), TokenKind::Eof])]
    #[case::comments("2/* comment */+/* unterminated", vec![num(2.0), op("+"), TokenKind::Eof])]
    #[case::whitespace(" 3\r + \n \t 4 ", vec![num(3.0), op("+"), num(4.0), TokenKind::Eof])]
    #[case::punctuation("f(a, [b]; {c})", vec![
        name("f"), TokenKind::LParen, name("a"), TokenKind::Comma, TokenKind::LBracket, name("b"), TokenKind::RBracket,
        TokenKind::SemiColon, TokenKind::LBrace, name("c"), TokenKind::RBrace, TokenKind::RParen, TokenKind::Eof])]
    fn test_tokenize(#[case] source: &str, #[case] expected: Vec<TokenKind>) {
        assert_eq!(kinds(&Parser::default(), source), Ok(expected));
    }

    #[rstest]
    #[case::escapes(r#""\'\"\\\/\b\f\n\r\t\u1234""#, "'\"\\/\u{8}\u{c}\n\r\t\u{1234}")]
    #[case::single_quotes("'Nested \"double quotes\"'", "Nested \"double quotes\"")]
    #[case::empty("''", "")]
    #[case::unicode_keeps_only_four_digits(r#""\u11111""#, "\u{1111}1")]
    fn test_string_literal(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(
            kinds(&Parser::default(), source),
            Ok(vec![TokenKind::StringLiteral(expected.to_string()), TokenKind::Eof])
        );
    }

    #[rstest]
    #[case::unknown_character("1 + @", "parse error [1:5]: Unknown character \"@\"")]
    #[case::unknown_on_second_line("1 +\n@", "parse error [2:1]: Unknown character \"@\"")]
    #[case::single_pipe("\"a\" | \"b\"", "parse error [1:5]: Unknown character \"|\"")]
    #[case::dangling_exponent("1.23e", "parse error [1:1]: Invalid number \"1.23e\"")]
    #[case::double_exponent_sign("1.23e+-4", "parse error [1:1]: Invalid number \"1.23e\"")]
    #[case::empty_hex("0x", "parse error [1:1]: Invalid number \"0x\"")]
    #[case::bad_binary_digit("0b2", "parse error [1:1]: Invalid number \"0b\"")]
    #[case::unterminated("'asdf", "parse error [1:1]: Unterminated string literal")]
    #[case::mismatched_quotes("'asdf\"", "parse error [1:1]: Unterminated string literal")]
    #[case::unknown_escape(r#""\x""#, "parse error [1:1]: Illegal escape sequence: \\x")]
    #[case::short_unicode(r#""\u12""#, "parse error [1:1]: Illegal escape sequence: \\u12\"")]
    #[case::lone_sigil("$", "parse error [1:1]: Invalid variable name \"$\"")]
    #[case::sigil_digit("$0", "parse error [1:1]: Invalid variable name \"$\"")]
    #[case::sigil_underscore("$_x", "parse error [1:1]: Invalid variable name \"$_x\"")]
    fn test_tokenize_error(#[case] source: &str, #[case] expected: &str) {
        let err = tokenize(&Parser::default(), source).unwrap_err();
        assert_eq!(err.to_string(), expected);
    }

    #[rstest]
    #[case::add("2 + 3", "add", "parse error [1:3]: operator \"+\" is disabled (add)")]
    #[case::bullet("2 • 3", "multiply", "parse error [1:3]: operator \"*\" is disabled (multiply)")]
    #[case::array("[1]", "array", "parse error [1:1]: operator \"[\" is disabled (array)")]
    #[case::assignment("x = 1", "assignment", "parse error [1:3]: operator \"=\" is disabled (assignment)")]
    fn test_disabled_operator(#[case] source: &str, #[case] category: &str, #[case] expected: &str) {
        let parser = Parser::new(Options::default().disable(category));
        assert_eq!(tokenize(&parser, source).unwrap_err().to_string(), expected);
    }

    #[test]
    fn test_disabled_word_operator_is_a_name() {
        let parser = Parser::new(Options::default().disable("sin").disable("logical"));
        assert_eq!(
            kinds(&parser, "sin and x"),
            Ok(vec![name("sin"), name("and"), name("x"), TokenKind::Eof])
        );
    }

    #[test]
    fn test_conversion_is_disabled_by_default() {
        assert_eq!(
            kinds(&Parser::default(), "x as y"),
            Ok(vec![name("x"), name("as"), name("y"), TokenKind::Eof])
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize(&Parser::default(), "ab +\n  'c'").unwrap();
        let ranges: Vec<_> = tokens.iter().map(|t| t.range).collect();
        assert_eq!(
            ranges,
            vec![
                Range::new(Position::new(1, 1), Position::new(1, 3)),
                Range::new(Position::new(1, 4), Position::new(1, 5)),
                Range::new(Position::new(2, 3), Position::new(2, 6)),
                Range::new(Position::new(2, 6), Position::new(2, 6)),
            ]
        );
    }

    #[test]
    fn test_save_and_restore() {
        let parser = Parser::default();
        let mut stream = TokenStream::new(&parser, "not in x");
        assert_eq!(stream.next().unwrap().kind, op("not"));
        let checkpoint = stream.save();
        assert_eq!(stream.next().unwrap().kind, op("in"));
        assert_eq!(stream.next().unwrap().kind, name("x"));
        stream.restore(checkpoint);
        assert_eq!(stream.current().kind, op("not"));
        assert_eq!(stream.next().unwrap().kind, op("in"));
    }
}
