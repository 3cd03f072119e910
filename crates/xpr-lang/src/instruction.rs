use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use itertools::Itertools;
use smol_str::SmolStr;

use crate::value::Value;

/// A flat postfix program. Nested programs appear as [`Instruction::SubExpr`].
pub type Program = Rc<[Instruction]>;

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Literal(Value),
    Unary(SmolStr),
    Binary(SmolStr),
    Ternary(SmolStr),
    /// A variable read.
    Var(SmolStr),
    /// A name used as an assignment target or a parameter. Dotted for member targets.
    VarName(SmolStr),
    /// Calls the function `n` slots below the top with the `n` arguments above it.
    Call(usize),
    /// Defines a function with `n` parameters.
    FnDef(usize),
    /// A lazily evaluated program.
    SubExpr(Program),
    Member(SmolStr),
    /// Statement separator. Discards the previous statement's value.
    End,
    Array(usize),
    Undefined,
    CaseMatch(usize),
    CaseCond(usize),
    WhenCond(usize),
    WhenMatch(usize),
    CaseElse,
    ObjectStart,
    Property(SmolStr),
    ObjectEnd,
}

impl Instruction {
    pub fn is_var(&self) -> bool {
        matches!(self, Instruction::Var(_))
    }

    pub fn sub_expr(instructions: Vec<Instruction>) -> Self {
        Instruction::SubExpr(instructions.into())
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Literal(value) => write!(f, "{}", value.to_literal()),
            Instruction::Unary(op) | Instruction::Binary(op) | Instruction::Ternary(op) => write!(f, "{}", op),
            Instruction::Var(name) | Instruction::VarName(name) => write!(f, "{}", name),
            Instruction::Call(n) => write!(f, "CALL {}", n),
            Instruction::FnDef(n) => write!(f, "DEF {}", n),
            Instruction::SubExpr(program) => write!(f, "[{}]", program.iter().join(" ")),
            Instruction::Member(name) => write!(f, ".{}", name),
            Instruction::End => write!(f, ";"),
            Instruction::Array(n) => write!(f, "ARRAY {}", n),
            Instruction::Undefined => write!(f, "undefined"),
            Instruction::CaseMatch(n) | Instruction::CaseCond(n) => write!(f, "CASE {}", n),
            Instruction::WhenCond(k) | Instruction::WhenMatch(k) => write!(f, "WHEN {}", k),
            Instruction::CaseElse => write!(f, "ELSE"),
            Instruction::ObjectStart => write!(f, "OBJECT"),
            Instruction::Property(key) => write!(f, "PROPERTY {}", key),
            Instruction::ObjectEnd => write!(f, "OBJECT END"),
        }
    }
}

/// Renders a program as a space-separated postfix listing.
pub fn dump(program: &[Instruction]) -> String {
    program.iter().join(" ")
}
