use std::mem;

use smol_str::SmolStr;

use super::Parser;
use super::error::ParseError;
use crate::instruction::Instruction;
use crate::lexer::token::{Keyword, Token, TokenKind};
use crate::lexer::{Checkpoint, TokenStream};
use crate::value::Value;

const COMPARISON_OPERATORS: [&str; 6] = ["==", "!=", "<", "<=", ">=", ">"];
const ADDITIVE_OPERATORS: [&str; 3] = ["+", "-", "||"];
const MULTIPLICATIVE_OPERATORS: [&str; 3] = ["*", "/", "%"];

struct Saved<'a> {
    checkpoint: Checkpoint<'a>,
    current: Token,
    next: Token,
}

/// Recursive-descent parser producing a post-order instruction sequence.
///
/// `next` is the one-token lookahead; `current` is the most recently accepted token.
pub struct ParserState<'a> {
    parser: &'a Parser,
    tokens: TokenStream<'a>,
    current: Token,
    next: Token,
}

impl<'a> ParserState<'a> {
    pub fn new(parser: &'a Parser, source: &'a str) -> Result<Self, ParseError> {
        let mut tokens = TokenStream::new(parser, source);
        let current = tokens.current().clone();
        let next = tokens.next()?;

        Ok(Self {
            parser,
            tokens,
            current,
            next,
        })
    }

    pub fn parse(mut self) -> Result<Vec<Instruction>, ParseError> {
        let mut instructions = Vec::new();
        self.parse_expression(&mut instructions)?;
        self.expect(|kind| matches!(kind, TokenKind::Eof), "EOF")?;
        Ok(instructions)
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        let next = self.tokens.next()?;
        self.current = mem::replace(&mut self.next, next);
        Ok(())
    }

    fn accept(&mut self, predicate: impl Fn(&TokenKind) -> bool) -> Result<bool, ParseError> {
        if predicate(&self.next.kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn accept_op(&mut self, op: &str) -> Result<bool, ParseError> {
        self.accept(|kind| matches!(kind, TokenKind::Op(o) if o == op))
    }

    fn accept_any_op(&mut self, ops: &[&str]) -> Result<Option<SmolStr>, ParseError> {
        match &self.next.kind {
            TokenKind::Op(op) if ops.contains(&op.as_str()) => {
                let op = op.clone();
                self.advance()?;
                Ok(Some(op))
            }
            _ => Ok(None),
        }
    }

    fn accept_keyword(&mut self, keyword: Keyword) -> Result<bool, ParseError> {
        self.accept(|kind| matches!(kind, TokenKind::Keyword(k) if *k == keyword))
    }

    fn expect(&mut self, predicate: impl Fn(&TokenKind) -> bool, expected: &str) -> Result<(), ParseError> {
        if self.accept(predicate)? {
            Ok(())
        } else {
            Err(ParseError::Expected(self.next.clone(), expected.to_string()))
        }
    }

    fn save(&self) -> Saved<'a> {
        Saved {
            checkpoint: self.tokens.save(),
            current: self.current.clone(),
            next: self.next.clone(),
        }
    }

    fn restore(&mut self, saved: Saved<'a>) {
        self.tokens.restore(saved.checkpoint);
        self.current = saved.current;
        self.next = saved.next;
    }

    fn is_prefix_operator(&self, kind: &TokenKind) -> bool {
        matches!(kind, TokenKind::Op(op) if op != "!" && self.parser.unary_op(op).is_some())
    }

    fn next_ends_operand(&self) -> bool {
        matches!(
            self.next.kind,
            TokenKind::SemiColon | TokenKind::Comma | TokenKind::RParen | TokenKind::Eof
        )
    }

    /// A statement sequence. Statements after a `;` are nested so only the last value survives.
    fn parse_expression(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        let mut statement = Vec::new();
        self.parse_assignment(&mut statement)?;

        if self.parse_until_end_statement(instructions, &mut statement)? {
            return Ok(());
        }

        instructions.extend(statement);
        Ok(())
    }

    fn parse_until_end_statement(
        &mut self,
        instructions: &mut Vec<Instruction>,
        statement: &mut Vec<Instruction>,
    ) -> Result<bool, ParseError> {
        if !self.accept(|kind| matches!(kind, TokenKind::SemiColon))? {
            return Ok(false);
        }

        let more = !matches!(self.next.kind, TokenKind::Eof | TokenKind::RParen);

        if more {
            statement.push(Instruction::End);
            self.parse_expression(statement)?;
        }

        instructions.push(Instruction::sub_expr(mem::take(statement)));
        Ok(true)
    }

    fn parse_assignment(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        self.parse_coalesce(instructions)?;

        while self.accept_op("=")? {
            let assign_token = self.current.clone();
            let target = instructions.pop();
            let mut value = Vec::new();

            match target {
                Some(Instruction::Call(argc)) => {
                    if !self.parser.is_operator_enabled("()=") {
                        return Err(ParseError::FunctionDefinitionNotPermitted(assign_token));
                    }

                    let start = instructions
                        .len()
                        .checked_sub(argc + 1)
                        .ok_or_else(|| ParseError::InvalidAssignmentTarget(assign_token.clone()))?;

                    for instruction in &mut instructions[start..] {
                        match instruction {
                            Instruction::Var(name) => *instruction = Instruction::VarName(name.clone()),
                            _ => return Err(ParseError::InvalidAssignmentTarget(assign_token)),
                        }
                    }

                    self.parse_assignment(&mut value)?;
                    instructions.push(Instruction::sub_expr(value));
                    instructions.push(Instruction::FnDef(argc));
                }
                Some(Instruction::Var(name)) => {
                    self.parse_assignment(&mut value)?;
                    instructions.push(Instruction::VarName(name));
                    instructions.push(Instruction::sub_expr(value));
                    instructions.push(Instruction::Binary(SmolStr::new("=")));
                }
                Some(Instruction::Member(member)) => {
                    let mut path = vec![member];

                    loop {
                        match instructions.pop() {
                            Some(Instruction::Member(member)) => path.push(member),
                            Some(Instruction::Var(name)) => {
                                path.push(name);
                                break;
                            }
                            _ => return Err(ParseError::InvalidAssignmentTarget(assign_token)),
                        }
                    }

                    path.reverse();
                    self.parse_assignment(&mut value)?;
                    instructions.push(Instruction::VarName(SmolStr::new(path.join("."))));
                    instructions.push(Instruction::sub_expr(value));
                    instructions.push(Instruction::Binary(SmolStr::new("=")));
                }
                _ => return Err(ParseError::InvalidAssignmentTarget(assign_token)),
            }
        }

        Ok(())
    }

    fn parse_coalesce(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        self.parse_conditional(instructions)?;

        while self.accept_op("??")? {
            self.parse_conditional(instructions)?;
            instructions.push(Instruction::Binary(SmolStr::new("??")));
        }

        Ok(())
    }

    fn parse_conditional(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        self.parse_or(instructions)?;

        while self.accept_op("?")? {
            let mut when_true = Vec::new();
            let mut when_false = Vec::new();

            self.parse_coalesce(&mut when_true)?;
            self.expect(|kind| matches!(kind, TokenKind::Op(op) if op == ":"), ":")?;
            self.parse_coalesce(&mut when_false)?;

            instructions.push(Instruction::sub_expr(when_true));
            instructions.push(Instruction::sub_expr(when_false));
            instructions.push(Instruction::Ternary(SmolStr::new("?")));
        }

        Ok(())
    }

    fn parse_or(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        self.parse_and(instructions)?;

        while self.accept_op("or")? {
            let mut rhs = Vec::new();
            self.parse_and(&mut rhs)?;
            instructions.push(Instruction::sub_expr(rhs));
            instructions.push(Instruction::Binary(SmolStr::new("or")));
        }

        Ok(())
    }

    fn parse_and(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        self.parse_in(instructions)?;

        while self.accept_op("and")? {
            let mut rhs = Vec::new();
            self.parse_in(&mut rhs)?;
            instructions.push(Instruction::sub_expr(rhs));
            instructions.push(Instruction::Binary(SmolStr::new("and")));
        }

        Ok(())
    }

    fn parse_in(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        self.parse_comparison(instructions)?;

        loop {
            if self.accept_op("in")? {
                self.parse_comparison(instructions)?;
                instructions.push(Instruction::Binary(SmolStr::new("in")));
                continue;
            }

            if !self.next.is_op("not") {
                break;
            }

            let saved = self.save();
            self.advance()?;

            if self.accept_op("in")? {
                self.parse_comparison(instructions)?;
                instructions.push(Instruction::Binary(SmolStr::new("in")));
                instructions.push(Instruction::Unary(SmolStr::new("not")));
            } else {
                self.restore(saved);
                break;
            }
        }

        Ok(())
    }

    fn parse_comparison(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        self.parse_additive(instructions)?;

        while let Some(op) = self.accept_any_op(&COMPARISON_OPERATORS)? {
            self.parse_additive(instructions)?;
            instructions.push(Instruction::Binary(op));
        }

        Ok(())
    }

    fn parse_additive(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        self.parse_multiplicative(instructions)?;

        while let Some(op) = self.accept_any_op(&ADDITIVE_OPERATORS)? {
            self.parse_multiplicative(instructions)?;
            instructions.push(Instruction::Binary(op));
        }

        Ok(())
    }

    fn parse_multiplicative(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        self.parse_conversion(instructions)?;

        while let Some(op) = self.accept_any_op(&MULTIPLICATIVE_OPERATORS)? {
            self.parse_conversion(instructions)?;
            instructions.push(Instruction::Binary(op));
        }

        Ok(())
    }

    fn parse_conversion(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        self.parse_factor(instructions)?;

        while self.accept_op("as")? {
            self.parse_factor(instructions)?;
            instructions.push(Instruction::Binary(SmolStr::new("as")));
        }

        Ok(())
    }

    fn parse_factor(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        if !self.is_prefix_operator(&self.next.kind) {
            return self.parse_exponential(instructions);
        }

        let saved = self.save();
        self.advance()?;
        let op = self.current.to_string();

        if op != "-" && op != "+" {
            if matches!(self.next.kind, TokenKind::LParen) {
                self.restore(saved);
                return self.parse_exponential(instructions);
            }

            if self.next_ends_operand() {
                self.restore(saved);
                return self.parse_atom(instructions);
            }
        }

        self.parse_factor(instructions)?;
        instructions.push(Instruction::Unary(SmolStr::new(op)));
        Ok(())
    }

    fn parse_exponential(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        self.parse_postfix(instructions)?;

        while self.accept_op("^")? {
            self.parse_factor(instructions)?;
            instructions.push(Instruction::Binary(SmolStr::new("^")));
        }

        Ok(())
    }

    fn parse_postfix(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        self.parse_call(instructions)?;

        while self.accept_op("!")? {
            instructions.push(Instruction::Unary(SmolStr::new("!")));
        }

        Ok(())
    }

    fn parse_call(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        if self.is_prefix_operator(&self.next.kind) {
            self.advance()?;
            let op = SmolStr::new(self.current.to_string());
            self.parse_atom(instructions)?;
            instructions.push(Instruction::Unary(op));
            return Ok(());
        }

        self.parse_atom(instructions)?;

        loop {
            if self.accept(|kind| matches!(kind, TokenKind::LParen))? {
                let argc = self.parse_arguments(instructions)?;
                instructions.push(Instruction::Call(argc));
            } else if self.accept_op(".")? {
                let name = self.parse_member_name()?;
                instructions.push(Instruction::Member(name));
            } else if self.accept(|kind| matches!(kind, TokenKind::LBracket))? {
                self.parse_expression(instructions)?;
                self.expect(|kind| matches!(kind, TokenKind::RBracket), "]")?;
                instructions.push(Instruction::Binary(SmolStr::new("[")));
            } else {
                return Ok(());
            }
        }
    }

    fn parse_member_name(&mut self) -> Result<SmolStr, ParseError> {
        match &self.next.kind {
            TokenKind::Name(name) | TokenKind::Const(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            TokenKind::Keyword(keyword) => {
                let name = SmolStr::new(keyword.as_str());
                self.advance()?;
                Ok(name)
            }
            TokenKind::Op(op) if op.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
                let name = op.clone();
                self.advance()?;
                Ok(name)
            }
            TokenKind::Undefined => {
                self.advance()?;
                Ok(SmolStr::new("undefined"))
            }
            _ => Err(ParseError::Expected(self.next.clone(), "name".to_string())),
        }
    }

    fn parse_arguments(&mut self, instructions: &mut Vec<Instruction>) -> Result<usize, ParseError> {
        if self.accept(|kind| matches!(kind, TokenKind::RParen))? {
            return Ok(0);
        }

        let mut argc = 0;

        loop {
            self.parse_expression(instructions)?;
            argc += 1;

            if !self.accept(|kind| matches!(kind, TokenKind::Comma))? {
                break;
            }
        }

        self.expect(|kind| matches!(kind, TokenKind::RParen), ")")?;
        Ok(argc)
    }

    fn parse_atom(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        match self.next.kind.clone() {
            TokenKind::Name(name) => {
                self.advance()?;
                instructions.push(Instruction::Var(name));
            }
            TokenKind::Op(op) if self.parser.unary_op(&op).is_some() => {
                self.advance()?;
                instructions.push(Instruction::Var(op));
            }
            TokenKind::Const(name) => {
                self.advance()?;
                let value = self.parser.constant(&name).cloned().unwrap_or_default();
                instructions.push(Instruction::Literal(value));
            }
            TokenKind::NumberLiteral(n) => {
                self.advance()?;
                instructions.push(Instruction::Literal(Value::Number(n)));
            }
            TokenKind::StringLiteral(s) => {
                self.advance()?;
                instructions.push(Instruction::Literal(Value::String(s.into())));
            }
            TokenKind::Undefined => {
                self.advance()?;
                instructions.push(Instruction::Undefined);
            }
            TokenKind::LParen => {
                self.advance()?;
                self.parse_expression(instructions)?;
                self.expect(|kind| matches!(kind, TokenKind::RParen), ")")?;
            }
            TokenKind::LBracket => {
                self.advance()?;
                let count = self.parse_array_elements(instructions)?;
                instructions.push(Instruction::Array(count));
            }
            TokenKind::LBrace => {
                self.advance()?;
                self.parse_object(instructions)?;
            }
            TokenKind::Keyword(Keyword::Case) => {
                self.advance()?;
                self.parse_case(instructions)?;
            }
            TokenKind::Keyword(keyword) => {
                self.advance()?;
                instructions.push(Instruction::Var(SmolStr::new(keyword.as_str())));
            }
            _ => return Err(ParseError::UnexpectedToken(self.next.clone())),
        }

        Ok(())
    }

    fn parse_array_elements(&mut self, instructions: &mut Vec<Instruction>) -> Result<usize, ParseError> {
        let mut count = 0;

        while !self.accept(|kind| matches!(kind, TokenKind::RBracket))? {
            self.parse_expression(instructions)?;
            count += 1;

            if !self.accept(|kind| matches!(kind, TokenKind::Comma))? {
                self.expect(|kind| matches!(kind, TokenKind::RBracket), "]")?;
                break;
            }
        }

        Ok(count)
    }

    fn parse_object(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        instructions.push(Instruction::ObjectStart);

        while !self.accept(|kind| matches!(kind, TokenKind::RBrace))? {
            let key = match &self.next.kind {
                TokenKind::StringLiteral(s) => {
                    let key = SmolStr::new(s);
                    self.advance()?;
                    key
                }
                _ => self.parse_member_name()?,
            };

            self.expect(|kind| matches!(kind, TokenKind::Op(op) if op == ":"), ":")?;
            self.parse_expression(instructions)?;
            instructions.push(Instruction::Property(key));

            if !self.accept(|kind| matches!(kind, TokenKind::Comma))? {
                self.expect(|kind| matches!(kind, TokenKind::RBrace), "}")?;
                break;
            }
        }

        instructions.push(Instruction::ObjectEnd);
        Ok(())
    }

    fn parse_case(&mut self, instructions: &mut Vec<Instruction>) -> Result<(), ParseError> {
        let switch = match &self.next.kind {
            TokenKind::Keyword(Keyword::When | Keyword::Else | Keyword::End) => false,
            TokenKind::Keyword(Keyword::Then) => return Err(ParseError::InvalidCaseBlock(self.next.clone())),
            _ => true,
        };

        if switch {
            self.parse_assignment(instructions)?;

            if !matches!(
                self.next.kind,
                TokenKind::Keyword(Keyword::When | Keyword::Else | Keyword::End)
            ) {
                return Err(ParseError::InvalidCaseBlock(self.next.clone()));
            }
        }

        let mut count = 0;

        while self.accept_keyword(Keyword::When)? {
            self.parse_assignment(instructions)?;

            if !self.accept_keyword(Keyword::Then)? {
                return Err(ParseError::CaseMissingWhenThen(self.next.clone()));
            }

            let mut value = Vec::new();
            self.parse_assignment(&mut value)?;
            instructions.push(Instruction::sub_expr(value));
            instructions.push(if switch {
                Instruction::WhenMatch(count)
            } else {
                Instruction::WhenCond(count)
            });
            count += 1;
        }

        if self.accept_keyword(Keyword::Else)? {
            let mut value = Vec::new();
            self.parse_assignment(&mut value)?;
            instructions.push(Instruction::sub_expr(value));
            instructions.push(Instruction::CaseElse);
            count += 1;
        }

        if !self.accept_keyword(Keyword::End)? {
            return Err(ParseError::InvalidCaseBlock(self.next.clone()));
        }

        instructions.push(if switch {
            Instruction::CaseMatch(count)
        } else {
            Instruction::CaseCond(count)
        });

        Ok(())
    }
}
