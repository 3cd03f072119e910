pub mod builtin;
pub mod env;
pub mod error;

use std::cell::Cell;
use std::rc::Rc;

use smallvec::{SmallVec, smallvec};
use smol_str::SmolStr;

use crate::instruction::{Instruction, Program};
use crate::number::Number;
use crate::parser::{Parser, Resolution};
use crate::value::{Deferred, Function, Object, UserFunction, Value};
use env::{Bindings, is_reserved};
use error::EvalError;

thread_local! {
    static CALL_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// An operand stack slot. Thunks are sub-programs that have not been evaluated yet.
#[derive(Debug, Clone)]
enum Operand {
    Value(Value),
    Thunk(Program),
}

enum Step {
    Done(Value),
    /// Waiting for the deferred value that will replace the stack slot.
    Suspend(usize, Deferred),
}

/// Evaluates a compiled program against `bindings`.
///
/// Returns a [`Value::Deferred`] when a function call produced a deferred value; the rest
/// of the evaluation then continues once it resolves.
pub fn evaluate(program: &Program, parser: &Parser, bindings: &Bindings) -> Result<Value, EvalError> {
    tracing::debug!(instructions = program.len(), "evaluate");
    execute(program, parser, bindings)
}

fn execute(program: &Program, parser: &Parser, bindings: &Bindings) -> Result<Value, EvalError> {
    let mut machine = Machine::new(Rc::clone(program), parser.clone(), bindings.clone());

    match machine.run()? {
        Step::Done(value) => Ok(value),
        Step::Suspend(slot, deferred) => {
            tracing::trace!(pc = machine.pc, slot, "suspend");
            Ok(Value::Deferred(Deferred::new(machine.resume(slot, deferred))))
        }
    }
}

/// Calls an expression-defined function with the bindings it captured, its own name and
/// its parameters. Missing arguments are `undefined`.
pub(crate) fn call_user_function(f: &Rc<UserFunction>, args: &[Value]) -> Result<Value, EvalError> {
    let depth = CALL_DEPTH.with(|depth| depth.get());
    let max_depth = f.parser.options().max_call_depth;

    if depth >= max_depth {
        return Err(EvalError::RecursionError(max_depth));
    }

    let bindings = Bindings::from_map(f.captured.clone());
    bindings.set(f.name.clone(), Value::Function(Function::User(Rc::clone(f))));

    for (i, param) in f.params.iter().enumerate() {
        bindings.set(param.clone(), args.get(i).cloned().unwrap_or_default());
    }

    CALL_DEPTH.with(|d| d.set(depth + 1));
    let result = execute(&f.body, &f.parser, &bindings);
    CALL_DEPTH.with(|d| d.set(depth));

    result
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Number(n) if n.is_zero() => Value::Number(Number::new(0.0)),
        Value::Deferred(deferred) => Value::Deferred(deferred.map(|value| Ok(normalize(value)))),
        value => value,
    }
}

fn name_of(value: Value) -> SmolStr {
    match value {
        Value::String(name) => name,
        other => SmolStr::new(other.to_string()),
    }
}

pub(crate) fn member(base: &Value, name: &str) -> Value {
    match base {
        Value::Object(object) => object.get(name).cloned().unwrap_or_default(),
        Value::Array(items) if name == "length" => Value::from(items.len()),
        Value::String(s) if name == "length" => Value::from(s.encode_utf16().count()),
        _ => Value::Undefined,
    }
}

struct Machine {
    program: Program,
    parser: Parser,
    bindings: Bindings,
    stack: Vec<Operand>,
    pc: usize,
}

impl Machine {
    fn new(program: Program, parser: Parser, bindings: Bindings) -> Self {
        Self {
            program,
            parser,
            bindings,
            stack: Vec::with_capacity(16),
            pc: 0,
        }
    }

    async fn resume(mut self, mut slot: usize, mut deferred: Deferred) -> Result<Value, EvalError> {
        loop {
            let value = deferred.settle().await?;
            tracing::trace!(pc = self.pc, slot, "resume");

            match self.stack.get_mut(slot) {
                Some(operand) => *operand = Operand::Value(value),
                None => return Err(EvalError::StackUnderflow),
            }

            match self.run()? {
                Step::Done(Value::Deferred(deferred)) => return deferred.settle().await,
                Step::Done(value) => return Ok(value),
                Step::Suspend(next_slot, next) => {
                    tracing::trace!(pc = self.pc, slot = next_slot, "suspend");
                    slot = next_slot;
                    deferred = next;
                }
            }
        }
    }

    fn run(&mut self) -> Result<Step, EvalError> {
        let program = Rc::clone(&self.program);

        while let Some(instruction) = program.get(self.pc) {
            for depth in self.eager_slots(instruction) {
                if let Some((slot, deferred)) = self.force(depth)? {
                    return Ok(Step::Suspend(slot, deferred));
                }
            }

            self.step(instruction)?;
            self.pc += 1;

            if let Some(Operand::Value(Value::Deferred(deferred))) = self.stack.last() {
                return Ok(Step::Suspend(self.stack.len() - 1, deferred.clone()));
            }
        }

        self.finish().map(Step::Done)
    }

    fn finish(&mut self) -> Result<Value, EvalError> {
        if self.stack.len() > 1 {
            return Err(EvalError::Parity);
        }

        let operand = self.stack.pop().ok_or(EvalError::StackUnderflow)?;
        self.resolve(operand).map(normalize)
    }

    /// Stack depths (0 is the top) that must hold plain values before `instruction` runs.
    fn eager_slots(&self, instruction: &Instruction) -> SmallVec<[usize; 4]> {
        match instruction {
            Instruction::Unary(_) | Instruction::Member(_) | Instruction::End | Instruction::Property(_) => {
                smallvec![0]
            }
            Instruction::Binary(op) if op == "and" || op == "or" => smallvec![1],
            Instruction::Binary(op) if op == "=" => SmallVec::new(),
            Instruction::Binary(_) => smallvec![1, 0],
            Instruction::Ternary(op) if op == "?" => smallvec![2],
            Instruction::Ternary(_) => smallvec![2, 1, 0],
            Instruction::Call(argc) => (0..=*argc).rev().collect(),
            Instruction::Array(count) => (0..*count).rev().collect(),
            Instruction::WhenCond(_) => smallvec![1],
            Instruction::WhenMatch(k) => smallvec![2 * k + 2, 1],
            Instruction::Literal(_)
            | Instruction::Var(_)
            | Instruction::VarName(_)
            | Instruction::FnDef(_)
            | Instruction::SubExpr(_)
            | Instruction::Undefined
            | Instruction::CaseMatch(_)
            | Instruction::CaseCond(_)
            | Instruction::CaseElse
            | Instruction::ObjectStart
            | Instruction::ObjectEnd => SmallVec::new(),
        }
    }

    /// Evaluates the thunk at `depth` in place. Returns the slot to suspend on when the
    /// result is not available yet.
    fn force(&mut self, depth: usize) -> Result<Option<(usize, Deferred)>, EvalError> {
        let slot = self
            .stack
            .len()
            .checked_sub(depth + 1)
            .ok_or(EvalError::StackUnderflow)?;

        let program = match &self.stack[slot] {
            Operand::Thunk(program) => Rc::clone(program),
            Operand::Value(Value::Deferred(deferred)) => return Ok(Some((slot, deferred.clone()))),
            Operand::Value(_) => return Ok(None),
        };

        match execute(&program, &self.parser, &self.bindings)? {
            Value::Deferred(deferred) => Ok(Some((slot, deferred))),
            value => {
                self.stack[slot] = Operand::Value(value);
                Ok(None)
            }
        }
    }

    fn resolve(&self, operand: Operand) -> Result<Value, EvalError> {
        match operand {
            Operand::Value(value) => Ok(value),
            Operand::Thunk(program) => execute(&program, &self.parser, &self.bindings),
        }
    }

    fn push(&mut self, value: Value) {
        self.stack.push(Operand::Value(value));
    }

    fn pop(&mut self) -> Result<Operand, EvalError> {
        self.stack.pop().ok_or(EvalError::StackUnderflow)
    }

    fn pop_value(&mut self) -> Result<Value, EvalError> {
        let operand = self.pop()?;
        self.resolve(operand)
    }

    fn pop_values(&mut self, count: usize) -> Result<Vec<Value>, EvalError> {
        let start = self.stack.len().checked_sub(count).ok_or(EvalError::StackUnderflow)?;
        self.stack
            .split_off(start)
            .into_iter()
            .map(|operand| self.resolve(operand))
            .collect()
    }

    fn step(&mut self, instruction: &Instruction) -> Result<(), EvalError> {
        match instruction {
            Instruction::Literal(value) => self.push(value.clone()),
            Instruction::VarName(name) => self.push(Value::String(name.clone())),
            Instruction::Undefined => self.push(Value::Undefined),
            Instruction::SubExpr(program) => self.stack.push(Operand::Thunk(Rc::clone(program))),
            Instruction::Unary(op) => {
                let f = self
                    .parser
                    .unary_op(op)
                    .cloned()
                    .ok_or_else(|| EvalError::UnknownOperator(op.clone()))?;
                let value = self.pop_value()?;
                self.push(f.call(&[value])?);
            }
            Instruction::Binary(op) => self.binary(op)?,
            Instruction::Ternary(op) => self.ternary(op)?,
            Instruction::Var(name) => {
                let value = self.lookup(name)?;
                self.push(value);
            }
            Instruction::Call(argc) => {
                let args = self.pop_values(*argc)?;
                match self.pop_value()? {
                    Value::Function(f) => self.push(f.call(&args)?),
                    other => return Err(EvalError::NotAFunction(other.to_string())),
                }
            }
            Instruction::FnDef(argc) => self.define_function(*argc)?,
            Instruction::Member(name) => {
                if !self.parser.options().allow_member_access {
                    return Err(EvalError::MemberAccessNotPermitted);
                }

                if is_reserved(name) {
                    return Err(EvalError::PrototypeAccess(name.clone()));
                }

                let base = self.pop_value()?;
                self.push(member(&base, name));
            }
            Instruction::End => {
                self.pop()?;
            }
            Instruction::Array(count) => {
                let items = self.pop_values(*count)?;
                self.push(Value::Array(items));
            }
            Instruction::WhenMatch(k) => {
                let value = self.pop()?;
                let condition = self.pop_value()?;
                let tested = self
                    .stack
                    .len()
                    .checked_sub(1 + 2 * k)
                    .and_then(|slot| self.stack.get(slot))
                    .ok_or(EvalError::StackUnderflow)?;
                let matched = matches!(tested, Operand::Value(tested) if *tested == condition);

                self.push(Value::Bool(matched));
                self.stack.push(value);
            }
            Instruction::WhenCond(_) => {
                let value = self.pop()?;
                let condition = self.pop_value()?;
                self.push(Value::Bool(condition.is_truthy()));
                self.stack.push(value);
            }
            Instruction::CaseElse => {
                let value = self.pop()?;
                self.push(Value::Bool(true));
                self.stack.push(value);
            }
            Instruction::CaseMatch(count) | Instruction::CaseCond(count) => {
                let start = self.stack.len().checked_sub(2 * count).ok_or(EvalError::StackUnderflow)?;
                let branches = self.stack.split_off(start);

                if matches!(instruction, Instruction::CaseMatch(_)) {
                    self.pop()?;
                }

                let chosen = branches
                    .chunks_exact(2)
                    .find(|branch| matches!(&branch[0], Operand::Value(flag) if flag.is_truthy()))
                    .map(|branch| branch[1].clone());

                let value = match chosen {
                    Some(operand) => self.resolve(operand)?,
                    None => Value::Undefined,
                };
                self.push(value);
            }
            Instruction::ObjectStart => self.push(Value::Object(Object::new())),
            Instruction::Property(key) => {
                if is_reserved(key) {
                    return Err(EvalError::PrototypeAccess(key.clone()));
                }

                let value = self.pop_value()?;
                match self.stack.last_mut() {
                    Some(Operand::Value(Value::Object(object))) => {
                        object.insert(key.clone(), value);
                    }
                    _ => return Err(EvalError::StackUnderflow),
                }
            }
            Instruction::ObjectEnd => {}
        }

        Ok(())
    }

    fn binary(&mut self, op: &SmolStr) -> Result<(), EvalError> {
        match op.as_str() {
            "and" | "or" => {
                let rhs = self.pop()?;
                let lhs = self.pop_value()?.is_truthy();

                if lhs != (op == "and") {
                    self.push(Value::Bool(lhs));
                    return Ok(());
                }

                let value = match self.resolve(rhs)? {
                    Value::Deferred(deferred) => {
                        Value::Deferred(deferred.map(|value| Ok(Value::Bool(value.is_truthy()))))
                    }
                    value => Value::Bool(value.is_truthy()),
                };
                self.push(value);
            }
            "=" => {
                let rhs = self.pop()?;
                let name = name_of(self.pop_value()?);

                if name.contains('.') && !self.parser.options().allow_member_access {
                    return Err(EvalError::MemberAccessNotPermitted);
                }

                let value = match self.resolve(rhs)? {
                    Value::Deferred(deferred) => {
                        let bindings = self.bindings.clone();
                        Value::Deferred(deferred.map(move |value| {
                            bindings.assign_path(&name, value.clone())?;
                            Ok(value)
                        }))
                    }
                    value => {
                        self.bindings.assign_path(&name, value.clone())?;
                        value
                    }
                };
                self.push(value);
            }
            _ => {
                let f = self
                    .parser
                    .binary_op(op)
                    .cloned()
                    .ok_or_else(|| EvalError::UnknownOperator(op.clone()))?;
                let args = self.pop_values(2)?;
                self.push(f.call(&args)?);
            }
        }

        Ok(())
    }

    fn ternary(&mut self, op: &SmolStr) -> Result<(), EvalError> {
        if op == "?" {
            let when_false = self.pop()?;
            let when_true = self.pop()?;
            let condition = self.pop_value()?;
            let value = self.resolve(if condition.is_truthy() { when_true } else { when_false })?;
            self.push(value);
            return Ok(());
        }

        let f = self
            .parser
            .ternary_op(op)
            .cloned()
            .ok_or_else(|| EvalError::UnknownOperator(op.clone()))?;
        let args = self.pop_values(3)?;
        self.push(f.call(&args)?);
        Ok(())
    }

    fn lookup(&self, name: &SmolStr) -> Result<Value, EvalError> {
        if is_reserved(name) {
            return Err(EvalError::PrototypeAccess(name.clone()));
        }

        if let Some(f) = self.parser.function(name) {
            return Ok(Value::Function(f.clone()));
        }

        if let Some(f) = self.parser.unary_op(name).filter(|_| self.parser.is_operator_enabled(name)) {
            return Ok(Value::Function(f.clone()));
        }

        if let Some(value) = self.bindings.get(name) {
            return Ok(value);
        }

        match self.parser.resolve(name) {
            Some(Resolution::Alias(alias)) => self
                .bindings
                .get(&alias)
                .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
            Some(Resolution::Value(value)) => Ok(value),
            None => Err(EvalError::UndefinedVariable(name.clone())),
        }
    }

    fn define_function(&mut self, argc: usize) -> Result<(), EvalError> {
        let body = match self.pop()? {
            Operand::Thunk(program) => program,
            Operand::Value(_) => return Err(EvalError::StackUnderflow),
        };
        let params = self.pop_values(argc)?.into_iter().map(name_of).collect();
        let name = name_of(self.pop_value()?);

        let f = Function::User(Rc::new(UserFunction {
            name: name.clone(),
            params,
            body,
            parser: self.parser.clone(),
            captured: self.bindings.snapshot(),
        }));

        self.bindings.set(name, Value::Function(f.clone()));
        self.push(Value::Function(f));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use rstest::rstest;

    fn eval(source: &str, bindings: &Bindings) -> Result<Value, EvalError> {
        let parser = Parser::default();
        let expression = parser.parse(source).unwrap();
        evaluate(expression.program(), &parser, bindings)
    }

    #[rstest]
    #[case::precedence("1 + 2 * 3", Value::from(7.0))]
    #[case::negated_power("-3^4", Value::from(-81.0))]
    #[case::grouped_power("(-3)^4", Value::from(81.0))]
    #[case::mixed("2-3^4", Value::from(-79.0))]
    #[case::statements("x = 3; x * 2", Value::from(6.0))]
    #[case::last_statement("3;2;1", Value::from(1.0))]
    #[case::conditional("1 < 2 ? 'yes' : 'no'", Value::from("yes"))]
    #[case::and_short_circuit("false and undefinedThing", Value::Bool(false))]
    #[case::or_short_circuit("true or undefinedThing", Value::Bool(true))]
    #[case::and_is_boolean("1 and 'x'", Value::Bool(true))]
    #[case::switch_case("case 2 when 1 then 'a' when 2 then 'b' else 'c' end", Value::from("b"))]
    #[case::cond_case("case when false then 1 when true then 2 end", Value::from(2.0))]
    #[case::case_no_match("case 3 when 1 then 'a' end", Value::Undefined)]
    #[case::case_else("case when false then 1 else 3 end", Value::from(3.0))]
    #[case::case_lazy("case when true then 1 when true then nope end", Value::from(1.0))]
    #[case::array("[1, 2, 3][1]", Value::from(2.0))]
    #[case::object_member("{a: {b: 2}}.a.b", Value::from(2.0))]
    #[case::missing_member("{a: 1}.b", Value::Undefined)]
    #[case::length_member("'abc'.length", Value::from(3.0))]
    #[case::undefined_member("undefined.x", Value::Undefined)]
    #[case::function_value("map(sin, [0])", Value::Array(vec![Value::from(0.0)]))]
    #[case::user_function("f(x) = x * 2; f(4)", Value::from(8.0))]
    #[case::recursive_function("fib(n) = n < 2 ? n : fib(n - 1) + fib(n - 2); fib(10)", Value::from(55.0))]
    #[case::missing_argument("f(x, y) = y; f(1)", Value::Undefined)]
    #[case::coalesce("undefined ?? undefined ?? 12", Value::from(12.0))]
    #[case::coalesce_infinity("(10/0) ?? 5", Value::from(5.0))]
    #[case::negative_zero("-0", Value::from(0.0))]
    #[case::not_in("3 not in [1, 2]", Value::Bool(true))]
    #[case::nested_statements("(a = 1; b = a + 1; b * 10)", Value::from(20.0))]
    fn test_evaluate(#[case] source: &str, #[case] expected: Value) {
        assert_eq!(eval(source, &Bindings::new()), Ok(expected));
    }

    #[test]
    fn test_negative_zero_is_positive() {
        let Ok(Value::Number(n)) = eval("-0", &Bindings::new()) else {
            panic!("not a number");
        };
        assert!(n.value().is_sign_positive());
    }

    #[rstest]
    #[case::undefined_variable("x + 1", EvalError::UndefinedVariable("x".into()))]
    #[case::not_a_function("y(1)", EvalError::NotAFunction("2".into()))]
    #[case::undefined_not_a_function("{}.a(1)", EvalError::NotAFunction("undefined".into()))]
    #[case::prototype("__proto__", EvalError::PrototypeAccess("__proto__".into()))]
    #[case::prototype_member("y.constructor", EvalError::PrototypeAccess("constructor".into()))]
    #[case::prototype_assignment("a.__proto__ = 1", EvalError::PrototypeAccess("__proto__".into()))]
    fn test_evaluate_error(#[case] source: &str, #[case] expected: EvalError) {
        let bindings: Bindings = [("y", 2.0)].into_iter().collect();
        assert_eq!(eval(source, &bindings), Err(expected));
    }

    // Unoptimized builds use large frames, so deep recursion gets its own stack.
    #[rstest]
    #[case::sum_to_hundred("f(n) = n <= 0 ? 0 : n + f(n - 1); f(100)", "5050")]
    #[case::countdown("f(n) = n <= 0 ? 'done' : f(n - 1); f(500)", "done")]
    fn test_deep_recursion(#[case] source: &'static str, #[case] expected: &str) {
        let result = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(move || eval(source, &Bindings::new()).map(|value| value.to_string()))
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(result, Ok(expected.to_string()));
    }

    #[rstest]
    #[case::infinite("f(x) = f(x); f(1)", 32)]
    #[case::too_deep("f(n) = n <= 0 ? 0 : n + f(n - 1); f(100)", 50)]
    fn test_recursion_limit(#[case] source: &str, #[case] max_depth: u32) {
        let parser = Parser::new(crate::parser::Options::default().with_max_call_depth(max_depth));
        let expression = parser.parse(source).unwrap();

        assert_eq!(
            evaluate(expression.program(), &parser, &Bindings::new()),
            Err(EvalError::RecursionError(max_depth))
        );
    }

    #[test]
    fn test_assignment_writes_bindings() {
        let bindings = Bindings::new();
        assert_eq!(eval("a.b = 3", &bindings), Ok(Value::from(3.0)));
        assert_eq!(eval("a.b + 1", &bindings), Ok(Value::from(4.0)));
    }

    #[test]
    fn test_member_access_disabled() {
        let parser = Parser::new(crate::parser::Options::default().with_member_access(false));
        let bindings: Bindings = [("o", Value::Object(Object::from([("b".into(), Value::from(1.0))])))]
            .into_iter()
            .collect();
        let expression = parser.parse("o.b").unwrap();

        assert_eq!(
            evaluate(expression.program(), &parser, &bindings),
            Err(EvalError::MemberAccessNotPermitted)
        );
    }

    #[test]
    fn test_closure_captures_definition_time_bindings() {
        let bindings: Bindings = [("y", 5.0)].into_iter().collect();
        assert_eq!(eval("f(x) = x * y; f(3)", &bindings), Ok(Value::from(15.0)));

        bindings.set("y", 10.0);
        assert_eq!(eval("f(3)", &bindings), Ok(Value::from(15.0)));
    }

    #[test]
    fn test_short_circuit_skips_calls() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut parser = Parser::default();
        parser.add_function("f", move |_| {
            counter.set(counter.get() + 1);
            Ok(Value::Bool(true))
        });

        for source in ["false and f()", "true or f()", "true ? 1 : f()"] {
            let expression = parser.parse(source).unwrap();
            evaluate(expression.program(), &parser, &Bindings::new()).unwrap();
        }

        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_resolver() {
        let mut parser = Parser::default();
        parser.set_resolver(|name| match name {
            "$x" => Some(Resolution::Alias("x".into())),
            "answer" => Some(Resolution::Value(Value::from(42.0))),
            _ => None,
        });
        let bindings: Bindings = [("x", 1.0)].into_iter().collect();

        for (source, expected) in [("$x + 1", Ok(Value::from(2.0))), ("answer", Ok(Value::from(42.0)))] {
            let expression = parser.parse(source).unwrap();
            assert_eq!(evaluate(expression.program(), &parser, &bindings), expected);
        }

        let expression = parser.parse("$y").unwrap();
        assert_eq!(
            evaluate(expression.program(), &parser, &bindings),
            Err(EvalError::UndefinedVariable("$y".into()))
        );
    }

    fn deferred_parser() -> Parser {
        let mut parser = Parser::default();
        parser.add_function("later", |args| {
            Ok(Value::Deferred(Deferred::resolved(args.first().cloned().unwrap_or_default())))
        });
        parser.add_function("fail", |_| Ok(Value::Deferred(Deferred::rejected(EvalError::custom("boom")))));
        parser
    }

    #[rstest]
    #[case::top("later(3)", Value::from(3.0))]
    #[case::operand("later(3) + 1", Value::from(4.0))]
    #[case::argument("max(later(3), 5, later(7))", Value::from(7.0))]
    #[case::chained("later(later(2) * 3) + later(1)", Value::from(7.0))]
    #[case::in_branch("true ? later(1) : 2", Value::from(1.0))]
    #[case::in_and("true and later(0)", Value::Bool(false))]
    #[case::in_case("case when later(true) then later('a') end", Value::from("a"))]
    #[case::array("[later(1), 2]", Value::Array(vec![Value::from(1.0), Value::from(2.0)]))]
    #[case::statements("x = later(2); x * 10", Value::from(20.0))]
    #[case::user_function("f(v) = later(v) * 2; f(4) + 1", Value::from(9.0))]
    fn test_deferred(#[case] source: &str, #[case] expected: Value) {
        let parser = deferred_parser();
        let expression = parser.parse(source).unwrap();
        let result = evaluate(expression.program(), &parser, &Bindings::new()).unwrap();

        let Value::Deferred(deferred) = result else {
            panic!("expected a deferred value, got {:?}", result);
        };
        assert_eq!(block_on(deferred.settle()), Ok(expected));
    }

    #[test]
    fn test_deferred_assignment_writes_after_resolution() {
        let parser = deferred_parser();
        let bindings = Bindings::new();
        let expression = parser.parse("x = later(5)").unwrap();
        let Ok(Value::Deferred(deferred)) = evaluate(expression.program(), &parser, &bindings) else {
            panic!("expected a deferred value");
        };

        assert_eq!(block_on(deferred.settle()), Ok(Value::from(5.0)));
        assert_eq!(bindings.get("x"), Some(Value::from(5.0)));
    }

    #[test]
    fn test_deferred_rejection() {
        let parser = deferred_parser();
        let expression = parser.parse("1 + fail()").unwrap();
        let Ok(Value::Deferred(deferred)) = evaluate(expression.program(), &parser, &Bindings::new()) else {
            panic!("expected a deferred value");
        };

        assert_eq!(block_on(deferred.settle()), Err(EvalError::custom("boom")));
    }
}
