pub mod math;

use std::cmp::Ordering;
use std::sync::LazyLock;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::error::EvalError;
use crate::number::Number;
use crate::value::{Function, Value};

pub type BuiltinFn = fn(&[Value]) -> Result<Value, EvalError>;

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn number(n: f64) -> Value {
    Value::Number(Number::new(n))
}

macro_rules! math_unary {
    ($f:expr) => {
        |args: &[Value]| -> Result<Value, EvalError> {
            match args.first() {
                None | Some(Value::Undefined) => Ok(Value::Undefined),
                Some(a) => Ok(number(($f)(a.to_number().value()))),
            }
        }
    };
}

macro_rules! arithmetic {
    ($op:tt) => {
        |args: &[Value]| -> Result<Value, EvalError> {
            match (arg(args, 0), arg(args, 1)) {
                (Value::Undefined, _) | (_, Value::Undefined) => Ok(Value::Undefined),
                (a, b) => Ok(Value::Number(a.to_number() $op b.to_number())),
            }
        }
    };
}

macro_rules! relational {
    ($($ordering:pat_param)|+) => {
        |args: &[Value]| -> Result<Value, EvalError> {
            Ok(Value::Bool(matches!(compare(&arg(args, 0), &arg(args, 1)), Some($($ordering)|+))))
        }
    };
}

pub static UNARY_OPS: LazyLock<FxHashMap<SmolStr, BuiltinFn>> = LazyLock::new(|| {
    let mut map: FxHashMap<SmolStr, BuiltinFn> = FxHashMap::default();

    map.insert(SmolStr::new("-"), |args| match args.first() {
        None | Some(Value::Undefined) => Ok(Value::Undefined),
        Some(a) => Ok(Value::Number(-a.to_number())),
    });
    map.insert(SmolStr::new("+"), |args| match args.first() {
        None | Some(Value::Undefined) => Ok(Value::Undefined),
        Some(a) => Ok(Value::Number(a.to_number())),
    });
    map.insert(SmolStr::new("!"), fac);
    map.insert(SmolStr::new("not"), |args| Ok(Value::Bool(!arg(args, 0).is_truthy())));
    map.insert(SmolStr::new("length"), |args| match arg(args, 0) {
        Value::Undefined => Ok(Value::Undefined),
        Value::Array(items) => Ok(Value::from(items.len())),
        other => Ok(Value::from(other.to_string().encode_utf16().count())),
    });
    map.insert(SmolStr::new("abs"), math_unary!(f64::abs));
    map.insert(SmolStr::new("acos"), math_unary!(f64::acos));
    map.insert(SmolStr::new("acosh"), math_unary!(f64::acosh));
    map.insert(SmolStr::new("asin"), math_unary!(f64::asin));
    map.insert(SmolStr::new("asinh"), math_unary!(f64::asinh));
    map.insert(SmolStr::new("atan"), math_unary!(f64::atan));
    map.insert(SmolStr::new("atanh"), math_unary!(f64::atanh));
    map.insert(SmolStr::new("cbrt"), math_unary!(f64::cbrt));
    map.insert(SmolStr::new("ceil"), math_unary!(f64::ceil));
    map.insert(SmolStr::new("cos"), math_unary!(f64::cos));
    map.insert(SmolStr::new("cosh"), math_unary!(f64::cosh));
    map.insert(SmolStr::new("exp"), math_unary!(f64::exp));
    map.insert(SmolStr::new("expm1"), math_unary!(f64::exp_m1));
    map.insert(SmolStr::new("floor"), math_unary!(f64::floor));
    map.insert(SmolStr::new("lg"), math_unary!(f64::log10));
    map.insert(SmolStr::new("ln"), math_unary!(f64::ln));
    map.insert(SmolStr::new("log"), math_unary!(f64::ln));
    map.insert(SmolStr::new("log1p"), math_unary!(f64::ln_1p));
    map.insert(SmolStr::new("log2"), math_unary!(f64::log2));
    map.insert(SmolStr::new("log10"), math_unary!(f64::log10));
    map.insert(SmolStr::new("round"), math_unary!(|n| Number::new(n).round().value()));
    map.insert(SmolStr::new("sign"), math_unary!(math::sign));
    map.insert(SmolStr::new("sin"), math_unary!(f64::sin));
    map.insert(SmolStr::new("sinh"), math_unary!(f64::sinh));
    map.insert(SmolStr::new("sqrt"), math_unary!(f64::sqrt));
    map.insert(SmolStr::new("tan"), math_unary!(f64::tan));
    map.insert(SmolStr::new("tanh"), math_unary!(f64::tanh));
    map.insert(SmolStr::new("trunc"), math_unary!(f64::trunc));

    map
});

pub static BINARY_OPS: LazyLock<FxHashMap<SmolStr, BuiltinFn>> = LazyLock::new(|| {
    let mut map: FxHashMap<SmolStr, BuiltinFn> = FxHashMap::default();

    map.insert(SmolStr::new("+"), add);
    map.insert(SmolStr::new("-"), arithmetic!(-));
    map.insert(SmolStr::new("*"), arithmetic!(*));
    map.insert(SmolStr::new("/"), arithmetic!(/));
    map.insert(SmolStr::new("%"), arithmetic!(%));
    map.insert(SmolStr::new("^"), pow);
    map.insert(SmolStr::new("||"), |args| match (arg(args, 0), arg(args, 1)) {
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b).into())),
        _ => Ok(Value::Undefined),
    });
    map.insert(SmolStr::new("=="), |args| Ok(Value::Bool(arg(args, 0) == arg(args, 1))));
    map.insert(SmolStr::new("!="), |args| Ok(Value::Bool(arg(args, 0) != arg(args, 1))));
    map.insert(SmolStr::new(">"), relational!(Ordering::Greater));
    map.insert(SmolStr::new("<"), relational!(Ordering::Less));
    map.insert(SmolStr::new(">="), relational!(Ordering::Greater | Ordering::Equal));
    map.insert(SmolStr::new("<="), relational!(Ordering::Less | Ordering::Equal));
    map.insert(SmolStr::new("["), index);
    map.insert(SmolStr::new("and"), |args| {
        Ok(Value::Bool(arg(args, 0).is_truthy() && arg(args, 1).is_truthy()))
    });
    map.insert(SmolStr::new("or"), |args| {
        Ok(Value::Bool(arg(args, 0).is_truthy() || arg(args, 1).is_truthy()))
    });
    map.insert(SmolStr::new("in"), |args| Ok(Value::Bool(contains(&arg(args, 1), &arg(args, 0)))));
    map.insert(SmolStr::new("??"), |args| match arg(args, 0) {
        Value::Undefined | Value::Null => Ok(arg(args, 1)),
        Value::Number(n) if n.value() == f64::INFINITY => Ok(arg(args, 1)),
        a if a.to_number().is_nan() => Ok(arg(args, 1)),
        a => Ok(a),
    });
    map.insert(SmolStr::new("as"), convert);

    map
});

pub static TERNARY_OPS: LazyLock<FxHashMap<SmolStr, BuiltinFn>> = LazyLock::new(|| {
    let mut map: FxHashMap<SmolStr, BuiltinFn> = FxHashMap::default();
    map.insert(SmolStr::new("?"), condition);
    map
});

pub static BUILTIN_FUNCTIONS: LazyLock<FxHashMap<SmolStr, BuiltinFn>> = LazyLock::new(|| {
    let mut map: FxHashMap<SmolStr, BuiltinFn> = FxHashMap::default();

    map.insert(SmolStr::new("atan2"), |args| match (arg(args, 0), arg(args, 1)) {
        (Value::Undefined, _) | (_, Value::Undefined) => Ok(Value::Undefined),
        (a, b) => Ok(number(a.to_number().value().atan2(b.to_number().value()))),
    });
    map.insert(SmolStr::new("fac"), fac);
    map.insert(SmolStr::new("filter"), filter);
    map.insert(SmolStr::new("fold"), fold);
    map.insert(SmolStr::new("gamma"), math_unary!(math::gamma));
    map.insert(SmolStr::new("hypot"), hypot);
    map.insert(SmolStr::new("indexOf"), index_of);
    map.insert(SmolStr::new("if"), condition);
    map.insert(SmolStr::new("join"), join);
    map.insert(SmolStr::new("map"), map_array);
    map.insert(SmolStr::new("max"), |args| extremum(args, f64::NEG_INFINITY, f64::max));
    map.insert(SmolStr::new("min"), |args| extremum(args, f64::INFINITY, f64::min));
    map.insert(SmolStr::new("pow"), pow);
    map.insert(SmolStr::new("pyt"), hypot);
    map.insert(SmolStr::new("random"), random);
    map.insert(SmolStr::new("roundTo"), round_to);
    map.insert(SmolStr::new("sum"), sum);

    map
});

/// Wraps a table into callable function values.
pub fn to_functions(table: &FxHashMap<SmolStr, BuiltinFn>) -> FxHashMap<SmolStr, Function> {
    table
        .iter()
        .map(|(name, f)| {
            let f = *f;
            (name.clone(), Function::native(name.clone(), f))
        })
        .collect()
}

/// Relational comparison: two strings compare lexically, anything else numerically.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a.to_primitive(), b.to_primitive()) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(&b)),
        (a, b) => a.to_number().partial_cmp(&b.to_number()),
    }
}

fn add(args: &[Value]) -> Result<Value, EvalError> {
    match (arg(args, 0), arg(args, 1)) {
        (Value::Undefined, _) | (_, Value::Undefined) => Ok(Value::Undefined),
        (Value::String(a), Value::String(b)) if Number::parse(&a).is_nan() || Number::parse(&b).is_nan() => {
            Ok(Value::String(format!("{}{}", a, b).into()))
        }
        (a, b) => Ok(Value::Number(a.to_number() + b.to_number())),
    }
}

fn pow(args: &[Value]) -> Result<Value, EvalError> {
    match (arg(args, 0), arg(args, 1)) {
        (Value::Undefined, _) | (_, Value::Undefined) => Ok(Value::Undefined),
        (a, b) => Ok(number(math::pow(a.to_number().value(), b.to_number().value()))),
    }
}

fn fac(args: &[Value]) -> Result<Value, EvalError> {
    match args.first() {
        None | Some(Value::Undefined) => Ok(Value::Undefined),
        Some(a) => Ok(number(math::gamma(a.to_number().value() + 1.0))),
    }
}

fn condition(args: &[Value]) -> Result<Value, EvalError> {
    Ok(if arg(args, 0).is_truthy() { arg(args, 1) } else { arg(args, 2) })
}

fn index(args: &[Value]) -> Result<Value, EvalError> {
    let i = math::to_int32(arg(args, 1).to_number().value());

    match arg(args, 0) {
        Value::Array(items) => Ok(usize::try_from(i)
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or_default()),
        Value::String(s) => Ok(usize::try_from(i)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string().into()))
            .unwrap_or_default()),
        Value::Object(object) => Ok(object.get(i.to_string().as_str()).cloned().unwrap_or_default()),
        _ => Ok(Value::Undefined),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.contains(needle),
        Value::String(s) => s.contains(needle.to_string().as_str()),
        _ => false,
    }
}

fn convert(args: &[Value]) -> Result<Value, EvalError> {
    match (arg(args, 0), arg(args, 1)) {
        (Value::Undefined, _) | (_, Value::Undefined) => Ok(Value::Undefined),
        (a, Value::String(ty)) if ty.eq_ignore_ascii_case("boolean") => Ok(Value::Bool(a.is_truthy())),
        (a, Value::String(ty)) if ty.eq_ignore_ascii_case("int") || ty.eq_ignore_ascii_case("integer") => {
            Ok(Value::Number(a.to_number().round()))
        }
        (a, Value::String(ty)) if ty.eq_ignore_ascii_case("number") => Ok(Value::Number(a.to_number())),
        (_, ty) => Err(EvalError::UnknownType(ty.to_string())),
    }
}

fn expect_function(value: &Value, name: &str) -> Result<Function, EvalError> {
    match value {
        Value::Function(f) => Ok(f.clone()),
        _ => Err(EvalError::invalid_argument(format!("First argument to {} is not a function", name))),
    }
}

fn expect_array(value: Value, name: &str) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(EvalError::invalid_argument(format!("Second argument to {} is not an array", name))),
    }
}

fn map_array(args: &[Value]) -> Result<Value, EvalError> {
    if arg(args, 1).is_undefined() {
        return Ok(Value::Undefined);
    }

    let f = expect_function(&arg(args, 0), "map")?;
    let items = expect_array(arg(args, 1), "map")?;

    items
        .into_iter()
        .enumerate()
        .map(|(i, x)| f.call(&[x, Value::from(i)]))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn filter(args: &[Value]) -> Result<Value, EvalError> {
    if arg(args, 1).is_undefined() {
        return Ok(Value::Undefined);
    }

    let f = expect_function(&arg(args, 0), "filter")?;
    let items = expect_array(arg(args, 1), "filter")?;
    let mut kept = Vec::with_capacity(items.len());

    for (i, x) in items.into_iter().enumerate() {
        if f.call(&[x.clone(), Value::from(i)])?.is_truthy() {
            kept.push(x);
        }
    }

    Ok(Value::Array(kept))
}

fn fold(args: &[Value]) -> Result<Value, EvalError> {
    if arg(args, 2).is_undefined() {
        return Ok(Value::Undefined);
    }

    let f = expect_function(&arg(args, 0), "fold")?;
    let items = expect_array(arg(args, 2), "fold")?;

    items
        .into_iter()
        .enumerate()
        .try_fold(arg(args, 1), |acc, (i, x)| f.call(&[acc, x, Value::from(i)]))
}

fn hypot(args: &[Value]) -> Result<Value, EvalError> {
    if args.iter().any(Value::is_undefined) {
        return Ok(Value::Undefined);
    }

    let values: Vec<f64> = args.iter().map(|v| v.to_number().value()).collect();
    Ok(number(math::hypot(&values)))
}

fn index_of(args: &[Value]) -> Result<Value, EvalError> {
    let target = arg(args, 0);

    match arg(args, 1) {
        Value::Undefined => Ok(Value::Undefined),
        Value::Array(items) => Ok(items
            .iter()
            .position(|item| *item == target)
            .map(Value::from)
            .unwrap_or(number(-1.0))),
        Value::String(s) => Ok(s
            .find(target.to_string().as_str())
            .map(|byte_index| Value::from(s[..byte_index].encode_utf16().count()))
            .unwrap_or(number(-1.0))),
        _ => Err(EvalError::invalid_argument(
            "Second argument to indexOf is not a string or array",
        )),
    }
}

fn join(args: &[Value]) -> Result<Value, EvalError> {
    match (arg(args, 0), arg(args, 1)) {
        (Value::Undefined, _) | (_, Value::Undefined) => Ok(Value::Undefined),
        (separator, Value::Array(items)) => Ok(Value::String(
            items
                .iter()
                .map(|item| match item {
                    Value::Undefined | Value::Null => String::new(),
                    item => item.to_string(),
                })
                .collect::<Vec<_>>()
                .join(&separator.to_string())
                .into(),
        )),
        _ => Err(EvalError::invalid_argument("Second argument to join is not an array")),
    }
}

fn extremum(args: &[Value], initial: f64, pick: fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    let values = match args {
        [Value::Array(items)] => items.as_slice(),
        _ => args,
    };

    if values.iter().any(Value::is_undefined) {
        return Ok(Value::Undefined);
    }

    let numbers: Vec<f64> = values.iter().map(|v| v.to_number().value()).collect();

    if numbers.iter().any(|n| n.is_nan()) {
        return Ok(number(f64::NAN));
    }

    Ok(number(numbers.into_iter().fold(initial, pick)))
}

fn random(args: &[Value]) -> Result<Value, EvalError> {
    let scale = match arg(args, 0) {
        a if a.is_truthy() => a.to_number().value(),
        _ => 1.0,
    };
    let n = math::random().map_err(|e| EvalError::custom(e.to_string()))?;
    Ok(number(n * scale))
}

fn round_to(args: &[Value]) -> Result<Value, EvalError> {
    let value = arg(args, 0);
    let exp = arg(args, 1);

    if value.is_undefined() {
        return Ok(Value::Undefined);
    }

    if exp.is_undefined() || exp.to_number().is_zero() {
        return Ok(Value::Number(value.to_number().round()));
    }

    Ok(number(math::round_to(value.to_number().value(), exp.to_number().value())))
}

fn sum(args: &[Value]) -> Result<Value, EvalError> {
    match arg(args, 0) {
        Value::Undefined => Ok(Value::Undefined),
        Value::Array(items) if items.iter().any(Value::is_undefined) => Ok(Value::Undefined),
        Value::Array(items) => Ok(Value::Number(
            items.iter().fold(Number::new(0.0), |total, v| total + v.to_number()),
        )),
        _ => Err(EvalError::invalid_argument("Sum argument is not an array")),
    }
}
