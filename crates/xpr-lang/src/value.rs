use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use smol_str::SmolStr;

use crate::eval::error::EvalError;
use crate::instruction::Program;
use crate::number::Number;
use crate::parser::Parser;

pub type Object = BTreeMap<SmolStr, Value>;

pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, EvalError>;

/// A host function exposed to expressions.
pub struct NativeFunction {
    pub name: SmolStr,
    body: Box<NativeFn>,
}

/// A function defined inside an expression with `name(params) = body`.
pub struct UserFunction {
    pub name: SmolStr,
    pub params: Vec<SmolStr>,
    pub body: Program,
    pub(crate) parser: Parser,
    /// Bindings as they were when the function was defined.
    pub(crate) captured: FxHashMap<SmolStr, Value>,
}

#[derive(Clone)]
pub enum Function {
    Native(Rc<NativeFunction>),
    User(Rc<UserFunction>),
}

impl Function {
    pub fn native<F>(name: impl Into<SmolStr>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    {
        Function::Native(Rc::new(NativeFunction {
            name: name.into(),
            body: Box::new(body),
        }))
    }

    pub fn name(&self) -> &str {
        match self {
            Function::Native(f) => &f.name,
            Function::User(f) => &f.name,
        }
    }

    /// Calls the function. The result may be a [`Value::Deferred`].
    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        match self {
            Function::Native(f) => (f.body)(args),
            Function::User(f) => crate::eval::call_user_function(f, args),
        }
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Native(a), Function::Native(b)) => Rc::ptr_eq(a, b),
            (Function::User(a), Function::User(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Debug for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native(native) => write!(f, "Native({})", native.name),
            Function::User(user) => write!(f, "User({}({}))", user.name, user.params.iter().join(", ")),
        }
    }
}

type SharedResult = Shared<LocalBoxFuture<'static, Result<Value, EvalError>>>;

/// A value that is not available yet. Cloning shares the same underlying computation.
#[derive(Clone)]
pub struct Deferred(SharedResult);

impl Deferred {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, EvalError>> + 'static,
    {
        Deferred(future.boxed_local().shared())
    }

    pub fn resolved(value: Value) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    pub fn rejected(error: EvalError) -> Self {
        Self::new(futures::future::ready(Err(error)))
    }

    /// Transforms the eventual value.
    pub fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(Value) -> Result<Value, EvalError> + 'static,
    {
        Self::new(async move { f(self.await?) })
    }

    /// Awaits until the value is no longer deferred.
    pub async fn settle(self) -> Result<Value, EvalError> {
        let mut value = self.await?;
        while let Value::Deferred(deferred) = value {
            value = deferred.await?;
        }
        Ok(value)
    }
}

impl Future for Deferred {
    type Output = Result<Value, EvalError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl Debug for Deferred {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Deferred")
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(SmolStr),
    Array(Vec<Value>),
    Object(Object),
    Function(Function),
    Deferred(Deferred),
}

/// Strict equality as used by `==`, `!=`, `in` and `indexOf`: no type coercion.
///
/// Arrays and objects compare structurally, by their contents rather than by identity, so
/// `[1, 2] == [1, 2]` is true. Functions compare by identity and deferred values are never
/// equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(Number::new(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value.into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value.into())
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(SmolStr::new(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(SmolStr::new(value))
    }
}

impl From<SmolStr> for Value {
    fn from(value: SmolStr) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl From<Function> for Value {
    fn from(value: Function) -> Self {
        Value::Function(value)
    }
}

impl From<Deferred> for Value {
    fn from(value: Deferred) -> Self {
        Value::Deferred(value)
    }
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Value::Deferred(_))
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Deferred(_) => "deferred",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !n.is_zero() && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Deferred(_) => true,
        }
    }

    /// Numeric coercion: `undefined` is NaN, `null` is zero, strings are parsed and
    /// arrays go through their string form.
    pub fn to_number(&self) -> Number {
        match self {
            Value::Undefined => crate::number::NAN,
            Value::Null => Number::new(0.0),
            Value::Bool(b) => Number::from(*b),
            Value::Number(n) => *n,
            Value::String(s) => Number::parse(s),
            Value::Array(items) => match items.as_slice() {
                [] => Number::new(0.0),
                [item] => Number::parse(&item.to_string()),
                _ => crate::number::NAN,
            },
            Value::Object(_) | Value::Function(_) | Value::Deferred(_) => crate::number::NAN,
        }
    }

    /// Reduces compound values to a string or keeps scalars as they are.
    pub fn to_primitive(&self) -> Value {
        match self {
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Deferred(_) => {
                Value::String(self.to_string().into())
            }
            scalar => scalar.clone(),
        }
    }

    /// Renders the value the way it appears as a literal in source text.
    pub fn to_literal(&self) -> String {
        match self {
            Value::String(s) => quote(s),
            Value::Array(items) => format!("[{}]", items.iter().map(Value::to_literal).join(", ")),
            Value::Object(object) if object.is_empty() => "{}".to_string(),
            Value::Object(object) => format!(
                "{{ {} }}",
                object.iter().map(|(k, v)| format!("{}: {}", quote(k), v.to_literal())).join(", ")
            ),
            other => other.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) | Value::Deferred(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.is_int() && n.value().abs() < 9_007_199_254_740_992.0 => {
                serde_json::Value::from(n.to_int())
            }
            Value::Number(n) => serde_json::Number::from_f64(n.value())
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(object) => {
                serde_json::Value::Object(object.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect())
            }
        }
    }
}

/// JSON string quoting, with the two line separators that JSON allows raw escaped as well.
pub fn quote(s: &str) -> String {
    serde_json::to_string(s)
        .unwrap_or_else(|_| format!("\"{}\"", s))
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(Number::new(n.as_f64().unwrap_or(f64::NAN))),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(object) => {
                Value::Object(object.into_iter().map(|(k, v)| (SmolStr::new(k), Value::from(v))).collect())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) | Value::Deferred(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.is_int() && n.value().abs() < 9_007_199_254_740_992.0 => {
                serializer.serialize_i64(n.to_int())
            }
            Value::Number(n) if n.value().is_finite() => serializer.serialize_f64(n.value()),
            Value::Number(_) => serializer.serialize_unit(),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(object) => {
                let mut map = serializer.serialize_map(Some(object.len()))?;
                for (k, v) in object {
                    map.serialize_entry(k.as_str(), v)?;
                }
                map.end()
            }
        }
    }
}

/// String conversion with JavaScript `String(value)` semantics.
impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(items) => write!(
                f,
                "{}",
                items
                    .iter()
                    .map(|item| match item {
                        Value::Undefined | Value::Null => String::new(),
                        item => item.to_string(),
                    })
                    .join(",")
            ),
            Value::Object(_) => write!(f, "[object Object]"),
            Value::Function(function) => write!(f, "function {}() {{ [native code] }}", function.name()),
            Value::Deferred(_) => write!(f, "[object Promise]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::undefined(Value::Undefined, false)]
    #[case::null(Value::Null, false)]
    #[case::zero(Value::from(0.0), false)]
    #[case::nan(Value::from(f64::NAN), false)]
    #[case::number(Value::from(-1.0), true)]
    #[case::empty_string(Value::from(""), false)]
    #[case::string(Value::from("0"), true)]
    #[case::empty_array(Value::Array(vec![]), true)]
    fn test_is_truthy(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(value.is_truthy(), expected);
    }

    #[rstest]
    #[case::number_string(Value::from(1.0), Value::from("1"), false)]
    #[case::same_array(Value::Array(vec![Value::from(1.0), Value::from(2.0)]), Value::Array(vec![Value::from(1.0), Value::from(2.0)]), true)]
    #[case::different_array(Value::Array(vec![Value::from(1.0)]), Value::Array(vec![Value::from(2.0)]), false)]
    #[case::same_object(
        Value::Object(Object::from([("a".into(), Value::from(1.0))])),
        Value::Object(Object::from([("a".into(), Value::from(1.0))])),
        true
    )]
    #[case::undefined_null(Value::Undefined, Value::Null, false)]
    fn test_eq_is_structural(#[case] a: Value, #[case] b: Value, #[case] expected: bool) {
        assert_eq!(a == b, expected);
    }

    #[rstest]
    #[case::null(Value::Null, 0.0)]
    #[case::bool(Value::Bool(true), 1.0)]
    #[case::numeric_string(Value::from(" 12.5 "), 12.5)]
    #[case::empty_array(Value::Array(vec![]), 0.0)]
    #[case::single_array(Value::Array(vec![Value::from("7")]), 7.0)]
    fn test_to_number(#[case] value: Value, #[case] expected: f64) {
        assert_eq!(value.to_number(), Number::new(expected));
    }

    #[rstest]
    #[case::undefined(Value::Undefined)]
    #[case::word(Value::from("abc"))]
    #[case::pair(Value::Array(vec![Value::from(1.0), Value::from(2.0)]))]
    fn test_to_number_nan(#[case] value: Value) {
        assert!(value.to_number().is_nan());
    }

    #[rstest]
    #[case::array(Value::Array(vec![Value::from(1.0), Value::Undefined, Value::from("a")]), "1,,a")]
    #[case::object(Value::Object(Object::new()), "[object Object]")]
    #[case::function(Value::Function(Function::native("sin", |_| Ok(Value::Undefined))), "function sin() { [native code] }")]
    fn test_display(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[rstest]
    #[case::string(Value::from("a\"b\u{2028}"), r#""a\"b\u2028""#)]
    #[case::nested(Value::Array(vec![Value::from(-1.0), Value::Array(vec![Value::from("x")])]), r#"[-1, ["x"]]"#)]
    #[case::object(Value::Object(Object::from([("k".into(), Value::from(true))])), r#"{ "k": true }"#)]
    fn test_to_literal(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_literal(), expected);
    }

    #[test]
    fn test_equality_is_structural() {
        let f = Function::native("f", |_| Ok(Value::Null));
        assert_eq!(Value::Function(f.clone()), Value::Function(f));
        assert_ne!(
            Value::Function(Function::native("f", |_| Ok(Value::Null))),
            Value::Function(Function::native("f", |_| Ok(Value::Null)))
        );
        assert_eq!(
            Value::Array(vec![Value::from(1.0), Value::from("a")]),
            Value::Array(vec![Value::from(1.0), Value::from("a")])
        );
        assert_ne!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_ne!(Value::from("1"), Value::from(1.0));
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"a": [1, 2.5, "x", null, true]});
        let value = Value::from(json.clone());
        assert_eq!(value.to_json(), json);
        assert_eq!(serde_json::to_value(&value).unwrap(), json);
        assert_eq!(Value::from(f64::INFINITY).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_deferred_map_and_settle() {
        let inner = Deferred::resolved(Value::from(2.0));
        let outer = Deferred::resolved(Value::Deferred(inner)).map(Ok);
        let value = futures::executor::block_on(outer.settle()).unwrap();
        assert_eq!(value, Value::from(2.0));
    }

    #[test]
    fn test_deferred_is_shared() {
        let deferred = Deferred::resolved(Value::from("x")).map(|v| Ok(Value::Array(vec![v])));
        let copy = deferred.clone();
        assert_eq!(futures::executor::block_on(deferred).unwrap(), futures::executor::block_on(copy).unwrap());
    }
}
