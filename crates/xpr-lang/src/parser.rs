pub mod error;
pub mod state;

use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{Error, InnerError};
use crate::eval::builtin::{self, BINARY_OPS, BUILTIN_FUNCTIONS, TERNARY_OPS, UNARY_OPS};
use crate::eval::env::Bindings;
use crate::eval::error::EvalError;
use crate::expression::Expression;
use crate::number::Number;
use crate::value::{Function, Value};
use state::ParserState;

/// The operator category an operator symbol is enabled or disabled under.
///
/// Named unary operators (`sin`, `length`, ...) are their own category.
pub fn category(op: &str) -> &str {
    match op {
        "+" => "add",
        "-" => "subtract",
        "*" => "multiply",
        "/" => "divide",
        "%" => "remainder",
        "^" => "power",
        "!" => "factorial",
        "<" | ">" | "<=" | ">=" | "==" | "!=" => "comparison",
        "||" => "concatenate",
        "and" | "or" | "not" => "logical",
        "?" | ":" => "conditional",
        "=" => "assignment",
        "[" | "]" => "array",
        "()=" => "fndef",
        "??" => "coalesce",
        "as" => "conversion",
        other => other,
    }
}

/// Default limit on nested calls of expression-defined functions.
pub const DEFAULT_MAX_CALL_DEPTH: u32 = 1024;

/// Which operators the parser accepts, whether member access is allowed at evaluation and
/// how deeply expression-defined functions may recurse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Categories mapped to whether they are enabled. Missing categories are enabled.
    pub operators: FxHashMap<SmolStr, bool>,
    pub allow_member_access: bool,
    pub max_call_depth: u32,
}

impl Default for Options {
    fn default() -> Self {
        let mut operators = FxHashMap::default();
        operators.insert(SmolStr::new("conversion"), false);

        Self {
            operators,
            allow_member_access: true,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Options {
    pub fn enable(mut self, category: impl Into<SmolStr>) -> Self {
        self.operators.insert(category.into(), true);
        self
    }

    pub fn disable(mut self, category: impl Into<SmolStr>) -> Self {
        self.operators.insert(category.into(), false);
        self
    }

    pub fn with_member_access(mut self, allow: bool) -> Self {
        self.allow_member_access = allow;
        self
    }

    pub fn with_max_call_depth(mut self, depth: u32) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn is_enabled(&self, category: &str) -> bool {
        self.operators.get(category).copied().unwrap_or(true)
    }
}

/// What a resolver callback maps an unknown variable to.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Read another binding instead.
    Alias(SmolStr),
    Value(Value),
}

type Resolver = dyn Fn(&str) -> Option<Resolution>;
type Table<T> = Rc<FxHashMap<SmolStr, T>>;

/// Parser configuration: operator enablement plus the operator, function and constant tables.
///
/// Clones share the tables until one of them is modified.
#[derive(Clone)]
pub struct Parser {
    options: Options,
    unary_ops: Table<Function>,
    binary_ops: Table<Function>,
    ternary_ops: Table<Function>,
    functions: Table<Function>,
    consts: Table<Value>,
    resolver: Option<Rc<Resolver>>,
}

impl Debug for Parser {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("options", &self.options)
            .field("functions", &self.functions.len())
            .field("consts", &self.consts.len())
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Parser {
    pub fn new(options: Options) -> Self {
        let consts = FxHashMap::from_iter([
            (SmolStr::new("E"), Value::Number(Number::new(std::f64::consts::E))),
            (SmolStr::new("PI"), Value::Number(Number::new(std::f64::consts::PI))),
            (SmolStr::new("true"), Value::Bool(true)),
            (SmolStr::new("false"), Value::Bool(false)),
        ]);

        Self {
            options,
            unary_ops: Rc::new(builtin::to_functions(&UNARY_OPS)),
            binary_ops: Rc::new(builtin::to_functions(&BINARY_OPS)),
            ternary_ops: Rc::new(builtin::to_functions(&TERNARY_OPS)),
            functions: Rc::new(builtin::to_functions(&BUILTIN_FUNCTIONS)),
            consts: Rc::new(consts),
            resolver: None,
        }
    }

    #[allow(clippy::result_large_err)]
    pub fn parse(&self, source: &str) -> Result<Expression, Error> {
        tracing::debug!(source, "parse");

        ParserState::new(self, source)
            .and_then(ParserState::parse)
            .map(|instructions| Expression::new(instructions.into(), self.clone()))
            .map_err(|e| Error::from_error(source, InnerError::Parse(e)))
    }

    /// Parses and evaluates in one step.
    #[allow(clippy::result_large_err)]
    pub fn evaluate(&self, source: &str, bindings: &Bindings) -> Result<Value, Error> {
        self.parse(source)?
            .evaluate(bindings)
            .map_err(|e| Error::from_error(source, InnerError::Eval(e)))
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn is_operator_enabled(&self, op: &str) -> bool {
        self.options.is_enabled(category(op))
    }

    pub fn unary_op(&self, name: &str) -> Option<&Function> {
        self.unary_ops.get(name)
    }

    pub fn binary_op(&self, name: &str) -> Option<&Function> {
        self.binary_ops.get(name)
    }

    pub fn ternary_op(&self, name: &str) -> Option<&Function> {
        self.ternary_ops.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.consts.get(name)
    }

    pub fn add_function<F>(&mut self, name: impl Into<SmolStr>, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    {
        let name = name.into();
        Rc::make_mut(&mut self.functions).insert(name.clone(), Function::native(name, f));
        self
    }

    /// Adds a named prefix operator. It is also callable as `name(x)`.
    pub fn add_unary_op<F>(&mut self, name: impl Into<SmolStr>, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    {
        let name = name.into();
        Rc::make_mut(&mut self.unary_ops).insert(name.clone(), Function::native(name, f));
        self
    }

    /// Replaces the implementation of a binary operator. The grammar is fixed, so only
    /// existing operator symbols can be reached.
    pub fn add_binary_op<F>(&mut self, name: impl Into<SmolStr>, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    {
        let name = name.into();
        Rc::make_mut(&mut self.binary_ops).insert(name.clone(), Function::native(name, f));
        self
    }

    pub fn add_ternary_op<F>(&mut self, name: impl Into<SmolStr>, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    {
        let name = name.into();
        Rc::make_mut(&mut self.ternary_ops).insert(name.clone(), Function::native(name, f));
        self
    }

    pub fn add_const(&mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> &mut Self {
        Rc::make_mut(&mut self.consts).insert(name.into(), value.into());
        self
    }

    /// Installs a callback consulted for variables that are not bound.
    pub fn set_resolver<F>(&mut self, resolver: F) -> &mut Self
    where
        F: Fn(&str) -> Option<Resolution> + 'static,
    {
        self.resolver = Some(Rc::new(resolver));
        self
    }

    pub fn resolve(&self, name: &str) -> Option<Resolution> {
        self.resolver.as_ref().and_then(|resolver| resolver(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::add("+", "add")]
    #[case::comparison("<=", "comparison")]
    #[case::logical("not", "logical")]
    #[case::array("]", "array")]
    #[case::fndef("()=", "fndef")]
    #[case::named("sin", "sin")]
    #[case::in_operator("in", "in")]
    fn test_category(#[case] op: &str, #[case] expected: &str) {
        assert_eq!(category(op), expected);
    }

    #[rstest]
    #[case::default_enabled(Options::default(), "+", true)]
    #[case::conversion_off_by_default(Options::default(), "as", false)]
    #[case::conversion_enabled(Options::default().enable("conversion"), "as", true)]
    #[case::disabled_category(Options::default().disable("comparison"), "!=", false)]
    #[case::other_category(Options::default().disable("comparison"), "*", true)]
    fn test_is_operator_enabled(#[case] options: Options, #[case] op: &str, #[case] expected: bool) {
        assert_eq!(Parser::new(options).is_operator_enabled(op), expected);
    }

    #[test]
    fn test_options_from_json() {
        let options: Options = serde_json::from_str(r#"{"operators": {"add": false}, "allowMemberAccess": false}"#).unwrap();
        assert!(!options.is_enabled("add"));
        assert!(options.is_enabled("conversion"));
        assert!(!options.allow_member_access);
        assert_eq!(options.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
    }

    #[test]
    fn test_options_max_call_depth_from_json() {
        let options: Options = serde_json::from_str(r#"{"maxCallDepth": 16}"#).unwrap();
        assert_eq!(options, Options::default().with_max_call_depth(16));
    }

    #[test]
    fn test_options_from_empty_json() {
        let options: Options = serde_json::from_str("{}").unwrap();
        assert_eq!(options, Options::default());
    }

    #[test]
    fn test_add_function_does_not_affect_clones() {
        let parser = Parser::default();
        let mut custom = parser.clone();
        custom.add_function("twice", |args| Ok(Value::Number(args[0].to_number() * Number::new(2.0))));

        assert!(custom.function("twice").is_some());
        assert!(parser.function("twice").is_none());
    }

    #[test]
    fn test_add_const() {
        let mut parser = Parser::default();
        parser.add_const("TAU", 6.25);
        assert_eq!(parser.constant("TAU"), Some(&Value::from(6.25)));
    }

    #[test]
    fn test_resolver() {
        let mut parser = Parser::default();
        assert_eq!(parser.resolve("x"), None);

        parser.set_resolver(|name| name.strip_prefix('$').map(|rest| Resolution::Alias(rest.into())));
        assert_eq!(parser.resolve("$x"), Some(Resolution::Alias("x".into())));
        assert_eq!(parser.resolve("x"), None);
    }

    #[test]
    fn test_parse_error_is_diagnostic() {
        let err = Parser::default().parse("1 +").unwrap_err();
        assert_eq!(err.to_string(), "parse error [1:4]: unexpected EOF");
    }
}
