//! Call argument model.
//!
//! A cached computation is invoked with a [`CallArgs`] value: an ordered list of
//! positional values plus an insertion-ordered list of keyword values. Values are
//! `serde_json::Value`, which gives every argument a stable textual form
//! ([`repr`]) that survives process restarts, as required for keys shared
//! through a remote store.

use serde_json::Value;

/// Positional and keyword arguments of one call.
///
/// # Examples
///
/// ```
/// use cachemint_core::CallArgs;
/// use serde_json::json;
///
/// let call = CallArgs::new().arg(json!(1)).kwarg("b", json!(2));
/// assert_eq!(call.args.len(), 1);
/// assert_eq!(call.kwarg_value("b"), Some(&json!(2)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a call from raw parts.
    pub fn from_parts(args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Self {
        Self { args, kwargs }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Appends a keyword argument, replacing an earlier one with the same name.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.kwargs.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.kwargs.push((name, value)),
        }
        self
    }

    /// Prepends an implicit receiver (the `self`/`cls` of a method call).
    pub fn with_receiver(mut self, receiver: impl Into<Value>) -> Self {
        self.args.insert(0, receiver.into());
        self
    }

    /// Looks up a keyword argument by name.
    pub fn kwarg_value(&self, name: &str) -> Option<&Value> {
        self.kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Reads a parameter that may have been passed by position or by keyword.
    ///
    /// Computations use this so they work both with raw calls and with the
    /// normalized calls produced by strict key generation.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.args.get(index).or_else(|| self.kwarg_value(name))
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// Renders a value the way it appears inside a cache key.
///
/// Strings become single-quoted literals, `null` becomes `None` and booleans
/// become `True`/`False`; everything else uses compact JSON.
///
/// # Examples
///
/// ```
/// use cachemint_core::args::repr;
/// use serde_json::json;
///
/// assert_eq!(repr(&json!(1)), "1");
/// assert_eq!(repr(&json!("1")), "'1'");
/// assert_eq!(repr(&json!(null)), "None");
/// assert_eq!(repr(&json!([1, 2])), "[1,2]");
/// ```
pub fn repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::String(s) => {
            let mut out = String::with_capacity(s.len() + 2);
            out.push('\'');
            for c in s.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '\'' => out.push_str("\\'"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c => out.push(c),
                }
            }
            out.push('\'');
            out
        }
        other => other.to_string(),
    }
}

/// Renders a sequence of values as a tuple literal: `()`, `(1,)`, `(1, 'b', 2)`.
pub fn repr_tuple<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a Value>,
{
    let parts: Vec<String> = values.into_iter().map(repr).collect();
    match parts.len() {
        0 => "()".to_string(),
        1 => format!("({},)", parts[0]),
        _ => format!("({})", parts.join(", ")),
    }
}
