use std::mem;

use crate::eval::env::{Bindings, is_reserved};
use crate::eval::error::EvalError;
use crate::eval::member;
use crate::instruction::{Instruction, Program};
use crate::parser::Parser;
use crate::value::Value;

/// Folds operators whose operands are all known, using `bindings` for variables.
///
/// Function calls, assignments, function definitions and the lazy operators are never
/// folded; their operands are simplified in place.
#[derive(Debug)]
pub struct Optimizer<'a> {
    parser: &'a Parser,
    bindings: &'a Bindings,
}

impl<'a> Optimizer<'a> {
    pub fn new(parser: &'a Parser, bindings: &'a Bindings) -> Self {
        Self { parser, bindings }
    }

    pub fn optimize(&self, program: &[Instruction]) -> Result<Vec<Instruction>, EvalError> {
        // Known values waiting for an operator; flushed as literals when one can't fold.
        let mut known: Vec<Value> = Vec::new();
        let mut optimized = Vec::with_capacity(program.len());

        for instruction in program {
            match instruction {
                Instruction::Literal(value) if !value.is_function() => known.push(value.clone()),
                Instruction::Var(name) => match self.known_variable(name) {
                    Some(value) => known.push(value),
                    None => flush(&mut known, &mut optimized, instruction.clone()),
                },
                Instruction::Unary(op) if !known.is_empty() => {
                    let f = self
                        .parser
                        .unary_op(op)
                        .ok_or_else(|| EvalError::UnknownOperator(op.clone()))?;
                    let args = known.split_off(known.len() - 1);
                    self.fold(f.call(&args)?, args, &mut known, &mut optimized, instruction)?;
                }
                Instruction::Binary(op) if known.len() >= 2 && !matches!(op.as_str(), "=" | "and" | "or") => {
                    let f = self
                        .parser
                        .binary_op(op)
                        .ok_or_else(|| EvalError::UnknownOperator(op.clone()))?;
                    let args = known.split_off(known.len() - 2);
                    self.fold(f.call(&args)?, args, &mut known, &mut optimized, instruction)?;
                }
                Instruction::Ternary(op) if known.len() >= 3 && op != "?" => {
                    let f = self
                        .parser
                        .ternary_op(op)
                        .ok_or_else(|| EvalError::UnknownOperator(op.clone()))?;
                    let args = known.split_off(known.len() - 3);
                    self.fold(f.call(&args)?, args, &mut known, &mut optimized, instruction)?;
                }
                Instruction::Array(count) if known.len() >= *count => {
                    let items = known.split_off(known.len() - count);
                    known.push(Value::Array(items));
                }
                Instruction::Member(name)
                    if !known.is_empty() && self.parser.options().allow_member_access && !is_reserved(name) =>
                {
                    let base = known.pop().unwrap_or_default();
                    known.push(member(&base, name));
                }
                Instruction::SubExpr(program) => {
                    let program: Program = self.optimize(program)?.into();
                    flush(&mut known, &mut optimized, Instruction::SubExpr(program));
                }
                _ => flush(&mut known, &mut optimized, instruction.clone()),
            }
        }

        optimized.extend(known.into_iter().map(Instruction::Literal));
        Ok(optimized)
    }

    /// A bound, non-function value for `name`, unless the name refers to a function.
    fn known_variable(&self, name: &str) -> Option<Value> {
        if is_reserved(name) || self.parser.function(name).is_some() {
            return None;
        }

        if self.parser.unary_op(name).is_some() && self.parser.is_operator_enabled(name) {
            return None;
        }

        self.bindings
            .get(name)
            .filter(|value| !value.is_function() && !value.is_deferred())
    }

    /// Keeps a folded result, or restores the operands and the operator when the result is
    /// not a plain value.
    fn fold(
        &self,
        result: Value,
        args: Vec<Value>,
        known: &mut Vec<Value>,
        optimized: &mut Vec<Instruction>,
        instruction: &Instruction,
    ) -> Result<(), EvalError> {
        if result.is_function() || result.is_deferred() {
            known.extend(args);
            flush(known, optimized, instruction.clone());
        } else {
            known.push(result);
        }

        Ok(())
    }
}

fn flush(known: &mut Vec<Value>, optimized: &mut Vec<Instruction>, instruction: Instruction) {
    optimized.extend(mem::take(known).into_iter().map(Instruction::Literal));
    optimized.push(instruction);
}

/// Replaces every read of `name` with the instructions of `replacement`. Assignment targets
/// and parameters are left alone.
pub fn substitute(program: &[Instruction], name: &str, replacement: &[Instruction]) -> Vec<Instruction> {
    program
        .iter()
        .flat_map(|instruction| match instruction {
            Instruction::Var(var) if var == name => replacement.to_vec(),
            Instruction::SubExpr(inner) => vec![Instruction::sub_expr(substitute(inner, name, replacement))],
            other => vec![other.clone()],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::dump;
    use crate::parser::Options;
    use crate::value::Object;
    use rstest::rstest;

    fn optimize(source: &str, bindings: &Bindings) -> String {
        let parser = Parser::default();
        let expression = parser.parse(source).unwrap();
        dump(&Optimizer::new(&parser, bindings).optimize(expression.program()).unwrap())
    }

    #[rstest]
    #[case::constants("2 * 3 + x", "6 x +")]
    #[case::bound_variable("x * (y * atan(1))", "x 1.5707963267948966 *")]
    #[case::unbound("x + w", "x w +")]
    #[case::branches("x ? (y + 1) : z", "x [3] [z] ?")]
    #[case::condition_only("(y/2) ? a : b", "1 [a] [b] ?")]
    #[case::assignment_target("y = 2 * y", "y [4] =")]
    #[case::member("o.a.b + 1", "3")]
    #[case::index("arr[1] + q[3]", "20 q 3 [ +")]
    #[case::array_literal("[1, 1 + 1]", "[1, 2]")]
    #[case::call_kept("max(y, 3)", "max 2 3 CALL 2")]
    #[case::lazy_kept("y and z", "2 [z] and")]
    #[case::definition("f(x) = x * y", "f x [x 2 *] DEF 1")]
    fn test_optimize(#[case] source: &str, #[case] expected: &str) {
        let bindings: Bindings = [
            ("y", Value::from(2.0)),
            ("o", Value::Object(Object::from([("a".into(), Value::Object(Object::from([("b".into(), Value::from(2.0))])))]))),
            ("arr", Value::Array(vec![Value::from(1.0), Value::from(20.0)])),
        ]
        .into_iter()
        .collect();

        assert_eq!(optimize(source, &bindings), expected);
    }

    #[test]
    fn test_optimize_propagates_errors() {
        let parser = Parser::new(Options::default().enable("conversion"));
        let expression = parser.parse("x + 1 as 'date'").unwrap();

        assert_eq!(
            Optimizer::new(&parser, &Bindings::new()).optimize(expression.program()),
            Err(EvalError::UnknownType("date".to_string()))
        );
    }

    #[test]
    fn test_optimize_keeps_function_bindings() {
        let parser = Parser::default();
        let bindings: Bindings = [("g", Value::from(parser.function("max").cloned().unwrap()))].into_iter().collect();
        let expression = parser.parse("g(1, 2) + sin(0)").unwrap();

        assert_eq!(
            dump(&Optimizer::new(&parser, &bindings).optimize(expression.program()).unwrap()),
            "g 1 2 CALL 2 0 +"
        );
    }

    #[rstest]
    #[case::simple("2 * x + 1", "4 * x", "2 4 x * * 1 +")]
    #[case::nested("x ? x : z", "y", "y [y] [z] ?")]
    #[case::assignment("x = x + 1", "7", "x [7 1 +] =")]
    fn test_substitute(#[case] source: &str, #[case] replacement: &str, #[case] expected: &str) {
        let parser = Parser::default();
        let program = parser.parse(source).unwrap();
        let replacement = parser.parse(replacement).unwrap();

        assert_eq!(dump(&substitute(program.program(), "x", replacement.program())), expected);
    }
}
