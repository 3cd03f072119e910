//! Property-based tests for parsing, rendering and evaluating expressions.

use proptest::prelude::*;
use xpr_lang::{Bindings, Parser, Value};

fn bindings() -> Bindings {
    strategies::VARIABLES.iter().copied().collect()
}

/// Values compare by type and rendering so that NaN matches NaN.
fn same(a: &Value, b: &Value) -> bool {
    a.type_name() == b.type_name() && a.to_string() == b.to_string()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Rendering and re-parsing evaluates to the same value
    #[test]
    fn roundtrip_to_string(source in strategies::arb_expr()) {
        let parser = Parser::default();
        let expression = parser.parse(&source).unwrap();
        let rendered = expression.to_string();
        let reparsed = parser.parse(&rendered);

        prop_assert!(reparsed.is_ok(), "{} rendered as {} does not parse", source, rendered);
        let reparsed = reparsed.unwrap();

        let original = expression.evaluate(&bindings()).unwrap();
        let roundtrip = reparsed.evaluate(&bindings()).unwrap();
        prop_assert!(same(&original, &roundtrip), "{}: {} vs {}", rendered, original, roundtrip);
    }

    /// Rendering is a fixed point after one round trip
    #[test]
    fn to_string_is_stable(source in strategies::arb_expr()) {
        let parser = Parser::default();
        let rendered = parser.parse(&source).unwrap().to_string();
        let again = parser.parse(&rendered).unwrap().to_string();

        prop_assert_eq!(rendered, again);
    }

    /// Simplifying with every variable bound does not change the value
    #[test]
    fn simplify_preserves_value(source in strategies::arb_expr()) {
        let parser = Parser::default();
        let expression = parser.parse(&source).unwrap();
        let simplified = expression.simplify(&bindings()).unwrap();

        let original = expression.evaluate(&bindings()).unwrap();
        let folded = simplified.evaluate(&bindings()).unwrap();
        prop_assert!(same(&original, &folded), "{} simplified to {}", source, simplified);
    }

    /// Simplifying without bindings keeps every variable
    #[test]
    fn simplify_keeps_free_variables(source in strategies::arb_expr()) {
        let parser = Parser::default();
        let expression = parser.parse(&source).unwrap();
        let simplified = expression.simplify(&Bindings::new()).unwrap();

        prop_assert_eq!(expression.variables(false), simplified.variables(false));
    }

    /// Arithmetic operators propagate undefined from either side
    #[test]
    fn undefined_propagates(
        operand in strategies::arb_operand(),
        op in prop::sample::select(strategies::ARITHMETIC_OPERATORS.to_vec()),
    ) {
        let parser = Parser::default();

        for source in [format!("undefined {} {}", op, operand), format!("{} {} undefined", operand, op)] {
            let value = parser.evaluate(&source, &Bindings::new()).unwrap();
            prop_assert_eq!(value, Value::Undefined, "{}", source);
        }
    }

    /// Exponentiation binds tighter than the other arithmetic operators
    #[test]
    fn power_binds_tightest((source, expected) in strategies::arb_precedence_expr()) {
        let value = Parser::default().evaluate(&source, &Bindings::new()).unwrap();
        prop_assert_eq!(value, Value::from(expected));
    }

    /// Variables are reported in order of first appearance without duplicates
    #[test]
    fn variables_are_unique(source in strategies::arb_expr()) {
        let variables = Parser::default().parse(&source).unwrap().variables(false);
        let mut seen = variables.clone();
        seen.dedup();

        prop_assert_eq!(seen.len(), variables.len());
        prop_assert!(variables.iter().all(|name| strategies::VARIABLES.iter().any(|(v, _)| v == name)));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// The parser reports errors instead of panicking on arbitrary input
    #[test]
    fn parser_never_panics(source in "[ -~]{0,40}") {
        let _ = Parser::default().parse(&source);
    }

    /// Evaluating whatever parses never panics
    #[test]
    fn evaluate_never_panics(source in "[a-z0-9+*/%^()?:<>=!;,.\\[\\] -]{0,30}") {
        if let Ok(expression) = Parser::default().parse(&source) {
            let _ = expression.evaluate(&bindings());
        }
    }
}
