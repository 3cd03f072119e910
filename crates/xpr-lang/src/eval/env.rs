use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::error::EvalError;
use crate::value::{Object, Value};

/// Names that can never be read or written through an expression.
pub const RESERVED_NAMES: [&str; 3] = ["__proto__", "prototype", "constructor"];

/// Only whole names match, so `myprototype` or `constructorX` are ordinary names.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// The variables an expression is evaluated against.
///
/// Clones share the same storage, so assignments made by an evaluation are visible to the
/// caller afterwards. Use [`Bindings::snapshot`] for an independent copy.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    context: Rc<RefCell<FxHashMap<SmolStr, Value>>>,
}

impl PartialEq for Bindings {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.context, &other.context) || *self.context.borrow() == *other.context.borrow()
    }
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: FxHashMap<SmolStr, Value>) -> Self {
        Self {
            context: Rc::new(RefCell::new(map)),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.context.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.context.borrow().contains_key(name)
    }

    pub fn set(&self, name: impl Into<SmolStr>, value: impl Into<Value>) {
        self.context.borrow_mut().insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.context.borrow_mut().remove(name)
    }

    pub fn len(&self) -> usize {
        self.context.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.context.borrow().is_empty()
    }

    pub fn names(&self) -> Vec<SmolStr> {
        let mut names: Vec<_> = self.context.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// An independent copy of the current contents.
    pub fn snapshot(&self) -> FxHashMap<SmolStr, Value> {
        self.context.borrow().clone()
    }

    /// Writes `value` at a dotted path, creating intermediate objects as needed.
    pub fn assign_path(&self, path: &str, value: Value) -> Result<(), EvalError> {
        let mut segments = path.split('.');
        let head = segments.next().unwrap_or(path);
        let rest: Vec<&str> = segments.collect();

        if let Some(reserved) = std::iter::once(head).chain(rest.iter().copied()).find(|s| is_reserved(s)) {
            return Err(EvalError::PrototypeAccess(reserved.into()));
        }

        if rest.is_empty() {
            self.set(head, value);
            return Ok(());
        }

        let mut context = self.context.borrow_mut();
        let root = context
            .entry(SmolStr::new(head))
            .or_insert_with(|| Value::Object(Object::new()));

        assign_into(root, head, &rest, value, path)
    }
}

fn assign_into(target: &mut Value, name: &str, path: &[&str], value: Value, full_path: &str) -> Result<(), EvalError> {
    if target.is_undefined() {
        *target = Value::Object(Object::new());
    }

    let Value::Object(object) = target else {
        return Err(EvalError::InvalidMemberAssignment(full_path.into(), name.into()));
    };

    match path {
        [] => Ok(()),
        [last] => {
            object.insert(SmolStr::new(last), value);
            Ok(())
        }
        [next, rest @ ..] => {
            let child = object
                .entry(SmolStr::new(next))
                .or_insert_with(|| Value::Object(Object::new()));
            assign_into(child, next, rest, value, full_path)
        }
    }
}

impl<K: Into<SmolStr>, V: Into<Value>> FromIterator<(K, V)> for Bindings {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Bindings {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
    }
}
