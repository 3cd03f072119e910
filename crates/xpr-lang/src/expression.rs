use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use smol_str::SmolStr;

use crate::error::Error;
use crate::eval::{self, env::Bindings, error::EvalError};
use crate::instruction::{Instruction, Program};
use crate::optimizer::{self, Optimizer};
use crate::parser::Parser;
use crate::stringify::{self, Dialect};
use crate::value::{Function, Value};

/// A parsed expression together with the parser configuration it was parsed with.
///
/// Expressions are immutable: [`Expression::simplify`] and [`Expression::substitute`]
/// return new expressions.
#[derive(Debug, Clone)]
pub struct Expression {
    program: Program,
    parser: Parser,
}

impl Expression {
    pub(crate) fn new(program: Program, parser: Parser) -> Self {
        Self { program, parser }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// Evaluates the expression. Assignments write into `bindings`.
    ///
    /// The result is a [`Value::Deferred`] when a function returned a deferred value; use
    /// [`Expression::evaluate_async`] to wait for the final value.
    pub fn evaluate(&self, bindings: &Bindings) -> Result<Value, EvalError> {
        eval::evaluate(&self.program, &self.parser, bindings)
    }

    /// Evaluates the expression and waits for any deferred result.
    pub async fn evaluate_async(&self, bindings: &Bindings) -> Result<Value, EvalError> {
        match self.evaluate(bindings)? {
            Value::Deferred(deferred) => deferred.settle().await,
            value => Ok(value),
        }
    }

    /// Folds every operator whose operands are known, reading variables from `bindings`.
    pub fn simplify(&self, bindings: &Bindings) -> Result<Expression, EvalError> {
        let optimized = Optimizer::new(&self.parser, bindings).optimize(&self.program)?;
        tracing::debug!(before = self.program.len(), after = optimized.len(), "simplify");

        Ok(Expression::new(optimized.into(), self.parser.clone()))
    }

    /// Replaces reads of the variable `name` with `replacement`, parsed with this
    /// expression's parser.
    #[allow(clippy::result_large_err)]
    pub fn substitute(&self, name: &str, replacement: &str) -> Result<Expression, Error> {
        let replacement = self.parser.parse(replacement)?;
        Ok(self.substitute_expression(name, &replacement))
    }

    pub fn substitute_expression(&self, name: &str, replacement: &Expression) -> Expression {
        let program = optimizer::substitute(&self.program, name, &replacement.program);
        Expression::new(program.into(), self.parser.clone())
    }

    /// Every name the expression reads or assigns, in order of first appearance.
    ///
    /// With `with_members`, member chains are reported as dotted paths (`user.age`).
    pub fn symbols(&self, with_members: bool) -> Vec<SmolStr> {
        let mut symbols = Vec::new();
        collect_symbols(&self.program, with_members, &mut symbols);
        symbols
    }

    /// Like [`Expression::symbols`], without the names of functions and named operators.
    pub fn variables(&self, with_members: bool) -> Vec<SmolStr> {
        self.symbols(with_members)
            .into_iter()
            .filter(|name| self.parser.function(name).is_none() && self.parser.unary_op(name).is_none())
            .collect()
    }

    /// Renders the expression as JavaScript source.
    pub fn to_js_string(&self) -> String {
        stringify::to_source(&self.program, Dialect::JavaScript)
    }

    /// Simplifies with `bindings` and wraps the result in a function taking `params`
    /// positionally. Parameters without an argument are left unbound.
    pub fn to_function(&self, params: &[&str], bindings: &Bindings) -> Result<Function, EvalError> {
        let expression = self.simplify(bindings)?;
        let params: Rc<[SmolStr]> = params.iter().map(|param| SmolStr::new(param.trim())).collect();
        let captured = bindings.snapshot();

        Ok(Function::native("anonymous", move |args| {
            let scope = Bindings::from_map(captured.clone());

            for (param, arg) in params.iter().zip(args) {
                scope.set(param.clone(), arg.clone());
            }

            expression.evaluate(&scope)
        }))
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", stringify::to_source(&self.program, Dialect::Expression))
    }
}

fn collect_symbols(program: &[Instruction], with_members: bool, symbols: &mut Vec<SmolStr>) {
    // Member path being built from the last variable.
    let mut pending: Option<String> = None;

    for instruction in program {
        match instruction {
            Instruction::Var(name) | Instruction::VarName(name) => {
                if !with_members && !symbols.contains(name) {
                    symbols.push(name.clone());
                } else {
                    flush(&mut pending, symbols);
                    pending = Some(name.to_string());
                }
            }
            Instruction::Member(name) if with_members && pending.is_some() => {
                if let Some(path) = pending.as_mut() {
                    path.push('.');
                    path.push_str(name);
                }
            }
            Instruction::SubExpr(inner) => collect_symbols(inner, with_members, symbols),
            _ => flush(&mut pending, symbols),
        }
    }

    flush(&mut pending, symbols);
}

fn flush(pending: &mut Option<String>, symbols: &mut Vec<SmolStr>) {
    if let Some(path) = pending.take()
        && !symbols.iter().any(|s| s == path.as_str())
    {
        symbols.push(path.into());
    }
}
