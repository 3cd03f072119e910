use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use smol_str::SmolStr;

use crate::instruction::Instruction;
use crate::value::{Value, quote};

/// The syntax a program is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Fully parenthesized expression syntax that parses back to an equivalent program.
    Expression,
    /// A JavaScript expression with the same meaning.
    JavaScript,
}

/// A rendered operand. Groups keep their contents apart from the parentheses so a case
/// block can print its values bare.
#[derive(Debug, Clone)]
enum Fragment {
    Text(String),
    Group(String),
    Object(Vec<(SmolStr, String)>),
}

impl Fragment {
    fn into_inner(self) -> String {
        match self {
            Fragment::Group(inner) => inner,
            other => other.to_string(),
        }
    }
}

impl Display for Fragment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::Text(text) => write!(f, "{}", text),
            Fragment::Group(inner) => write!(f, "({})", inner),
            Fragment::Object(properties) if properties.is_empty() => write!(f, "{{}}"),
            Fragment::Object(properties) => write!(
                f,
                "{{ {} }}",
                properties.iter().map(|(key, value)| format!("{}: {}", key, value)).join(", ")
            ),
        }
    }
}

impl From<String> for Fragment {
    fn from(text: String) -> Self {
        Fragment::Text(text)
    }
}

/// Renders a program. Every operator application is parenthesized, so the result does not
/// depend on precedence rules.
pub fn to_source(program: &[Instruction], dialect: Dialect) -> String {
    Renderer::new(dialect).render(program)
}

struct Renderer {
    dialect: Dialect,
    stack: Vec<Fragment>,
}

impl Renderer {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            stack: Vec::new(),
        }
    }

    fn js(&self) -> bool {
        self.dialect == Dialect::JavaScript
    }

    fn render(mut self, program: &[Instruction]) -> String {
        for instruction in program {
            self.step(instruction);
        }

        let separator = if self.js() { "," } else { ";" };
        self.stack.iter().join(separator)
    }

    fn pop(&mut self) -> Fragment {
        self.stack.pop().unwrap_or_else(|| Fragment::Text(String::new()))
    }

    fn pop_n(&mut self, count: usize) -> Vec<Fragment> {
        let at = self.stack.len().saturating_sub(count);
        self.stack.split_off(at)
    }

    fn push(&mut self, fragment: impl Into<Fragment>) {
        self.stack.push(fragment.into());
    }

    fn step(&mut self, instruction: &Instruction) {
        match instruction {
            Instruction::Literal(value) => self.push(literal(value)),
            Instruction::Var(name) | Instruction::VarName(name) => self.push(name.to_string()),
            Instruction::Undefined => self.push("undefined".to_string()),
            Instruction::End => {}
            Instruction::SubExpr(program) => {
                let inner = Renderer::new(self.dialect).render(program);
                self.stack.push(Fragment::Group(inner));
            }
            Instruction::Unary(op) => {
                let operand = self.pop();
                let text = self.unary(op, operand);
                self.push(text);
            }
            Instruction::Binary(op) => {
                let right = self.pop();
                let left = self.pop();
                let text = self.binary(op, left, right);
                self.push(text);
            }
            Instruction::Ternary(op) => {
                let [a, b, c] = [self.pop(), self.pop(), self.pop()];
                if op == "?" {
                    self.push(format!("({} ? {} : {})", c, b, a));
                } else {
                    self.push(format!("{}({}, {}, {})", op, c, b, a));
                }
            }
            Instruction::Call(argc) => {
                let args = self.pop_n(*argc);
                let callee = self.pop();
                self.push(format!("{}({})", callee, args.iter().join(", ")));
            }
            Instruction::FnDef(paramc) => {
                let body = self.pop();
                let params = self.pop_n(*paramc);
                let name = self.pop();

                if self.js() {
                    self.push(format!(
                        "({} = function({}) {{ return {} }})",
                        name,
                        params.iter().join(", "),
                        body
                    ));
                } else {
                    self.push(format!("({}({}) = {})", name, params.iter().join(", "), body));
                }
            }
            Instruction::Member(name) => {
                let base = self.pop();
                self.push(format!("{}.{}", base, name));
            }
            Instruction::Array(count) => {
                let items = self.pop_n(*count);
                self.push(format!("[{}]", items.iter().join(", ")));
            }
            Instruction::WhenCond(_) | Instruction::WhenMatch(_) => {
                let value = self.pop().into_inner();
                let condition = self.pop();
                self.push(format!("when {} then {}", condition, value));
            }
            Instruction::CaseElse => {
                let value = self.pop().into_inner();
                self.push(format!("else {}", value));
            }
            Instruction::CaseMatch(count) => {
                let branches = self.pop_n(*count);
                let tested = self.pop();
                self.push(
                    std::iter::once(format!("case {}", tested))
                        .chain(branches.iter().map(Fragment::to_string))
                        .chain(std::iter::once("end".to_string()))
                        .join(" "),
                );
            }
            Instruction::CaseCond(count) => {
                let branches = self.pop_n(*count);
                self.push(
                    std::iter::once("case".to_string())
                        .chain(branches.iter().map(Fragment::to_string))
                        .chain(std::iter::once("end".to_string()))
                        .join(" "),
                );
            }
            Instruction::ObjectStart => self.stack.push(Fragment::Object(Vec::new())),
            Instruction::Property(key) => {
                let value = self.pop();
                match self.stack.last_mut() {
                    Some(Fragment::Object(properties)) => properties.push((property_key(key).into(), value.to_string())),
                    _ => self.push(format!("{{ {}: {} }}", property_key(key), value)),
                }
            }
            Instruction::ObjectEnd => {}
        }
    }

    fn unary(&self, op: &str, operand: Fragment) -> String {
        match op {
            "-" | "+" => format!("({}{})", op, operand),
            "not" if self.js() => format!("(!{})", operand),
            "!" if self.js() => format!("fac({})", operand),
            _ if self.js() => format!("{}({})", op, operand),
            "!" => format!("({}!)", operand),
            _ => format!("({} {})", op, operand),
        }
    }

    fn binary(&self, op: &str, left: Fragment, right: Fragment) -> String {
        if !self.js() {
            return match op {
                "[" => format!("{}[{}]", left, right),
                _ => format!("({} {} {})", left, op, right),
            };
        }

        match op {
            "^" => format!("Math.pow({}, {})", left, right),
            "and" => format!("(!!{} && !!{})", left, right),
            "or" => format!("(!!{} || !!{})", left, right),
            "||" => format!(
                "(function(a,b){{ return Array.isArray(a) && Array.isArray(b) ? a.concat(b) : String(a) + String(b); }}(({}),({})))",
                left, right
            ),
            "==" => format!("({} === {})", left, right),
            "!=" => format!("({} !== {})", left, right),
            "[" => format!("{}[({}) | 0]", left, right),
            _ => format!("({} {} {})", left, op, right),
        }
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Number(n) if n.value() < 0.0 => format!("({})", n),
        Value::Function(f) => f.name().to_string(),
        other => other.to_literal(),
    }
}

fn property_key(key: &str) -> String {
    let mut chars = key.chars();
    let is_identifier = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$');

    if is_identifier { key.to_string() } else { quote(key) }
}
