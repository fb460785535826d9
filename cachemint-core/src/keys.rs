//! Cache key generation.
//!
//! Two key modes are available:
//!
//! - **Fast**: the key is the tuple rendering of the raw arguments. Cheap, but
//!   `f(1, 2)` and `f(a=1, b=2)` produce different keys, and keys cannot be
//!   parsed back into parameters, so partial invalidation is unsupported.
//! - **Strict**: arguments are bound to the [`CallSignature`] first, defaults are
//!   applied, and the key is the concatenation of `name + repr(value)` in
//!   parameter order. Equivalent call spellings share one key, and a partial
//!   argument set can be turned into a [`KeyPattern`] for selective clearing.
//!
//! # Examples
//!
//! ```
//! use cachemint_core::{generate_strict_key, CallArgs, CallSignature};
//!
//! let sig = CallSignature::builder().param("a").param_with_default("b", 2).build().unwrap();
//! let positional = generate_strict_key(&CallArgs::new().arg(1), &sig, false).unwrap();
//! let keyword = generate_strict_key(&CallArgs::new().kwarg("a", 1), &sig, false).unwrap();
//! assert_eq!(positional.key, "a1b2");
//! assert_eq!(positional.key, keyword.key);
//! ```

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::args::{repr, repr_tuple, CallArgs};
use crate::error::{CacheError, Result};
use crate::signature::CallSignature;

const WILDCARD: &str = ".*?";

/// How cache keys are derived from call arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KeyMode {
    #[default]
    Fast,
    Strict,
}

impl From<bool> for KeyMode {
    /// `true` selects strict mode, mirroring the `strict` cache option.
    fn from(strict: bool) -> Self {
        if strict {
            KeyMode::Strict
        } else {
            KeyMode::Fast
        }
    }
}

/// Result of key generation.
///
/// The computation must be invoked with the original positional arguments plus
/// `keyword_args` and `residual_kwargs` (see [`GeneratedKey::invocation`]).
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedKey {
    /// Keyword values the computation receives for named parameters, defaults included.
    pub keyword_args: Vec<(String, Value)>,
    /// Leftover keyword values captured by `**kwargs`.
    pub residual_kwargs: Vec<(String, Value)>,
    pub key: String,
}

impl GeneratedKey {
    /// Builds the normalized call the computation is invoked with.
    pub fn invocation(&self, call: &CallArgs) -> CallArgs {
        let mut kwargs = self.keyword_args.clone();
        kwargs.extend(self.residual_kwargs.iter().cloned());
        CallArgs::from_parts(call.args.clone(), kwargs)
    }
}

/// Derives a key from the raw argument shape.
///
/// The receiver is dropped when `is_method` is set; keyword items follow the
/// positional values in insertion order. The keyword map is returned untouched
/// as `keyword_args` because no binding happens.
pub fn generate_fast_key(call: &CallArgs, is_method: bool) -> GeneratedKey {
    let start = usize::from(is_method).min(call.args.len());
    let mut values: Vec<Value> = call.args[start..].to_vec();
    for (name, value) in &call.kwargs {
        values.push(Value::String(name.clone()));
        values.push(value.clone());
    }
    GeneratedKey {
        keyword_args: call.kwargs.clone(),
        residual_kwargs: Vec::new(),
        key: repr_tuple(&values),
    }
}

/// Fast keys cannot be turned into patterns.
pub fn generate_fast_key_pattern(_call: &CallArgs, _is_method: bool) -> Result<String> {
    Err(CacheError::Unsupported(
        "key patterns require strict key mode".to_string(),
    ))
}

/// Positional parameters visible to binding: the receiver counts as an ordinary
/// parameter unless the call is a method call, in which case it is skipped.
fn bindable_params<'a>(sig: &'a CallSignature, is_method: bool) -> Vec<(&'a str, Option<&'a Value>)> {
    let receiver = if is_method { None } else { sig.receiver() };
    receiver
        .map(|name| (name, None))
        .into_iter()
        .chain(
            sig.positional()
                .iter()
                .map(|p| (p.name.as_str(), p.default.as_ref())),
        )
        .collect()
}

fn take_kwarg(kwargs: &mut Vec<(String, Value)>, name: &str) -> Option<Value> {
    let pos = kwargs.iter().position(|(k, _)| k == name)?;
    Some(kwargs.remove(pos).1)
}

/// Binds `call` to `sig` and derives the canonical key.
///
/// # Errors
///
/// [`CacheError::Binding`] when a required parameter is missing, a parameter is
/// given twice, or arguments are left over without a matching catch-all.
pub fn generate_strict_key(
    call: &CallArgs,
    sig: &CallSignature,
    is_method: bool,
) -> Result<GeneratedKey> {
    let start = usize::from(is_method).min(call.args.len());
    let actual = &call.args[start..];
    let params = bindable_params(sig, is_method);
    let mut kwargs = call.kwargs.clone();
    let mut keyword_args = Vec::new();
    let mut key = String::new();

    for (index, (name, default)) in params.iter().enumerate() {
        if let Some(value) = actual.get(index) {
            if kwargs.iter().any(|(k, _)| k == name) {
                return Err(CacheError::Binding(format!(
                    "multiple values for argument '{}'",
                    name
                )));
            }
            key.push_str(name);
            key.push_str(&repr(value));
        } else {
            let value = match take_kwarg(&mut kwargs, name) {
                Some(value) => value,
                None => match default {
                    Some(default) => (*default).clone(),
                    None => {
                        return Err(CacheError::Binding(format!(
                            "missing required argument '{}'",
                            name
                        )))
                    }
                },
            };
            key.push_str(name);
            key.push_str(&repr(&value));
            keyword_args.push((name.to_string(), value));
        }
    }

    for param in sig.keyword_only() {
        let value = match take_kwarg(&mut kwargs, &param.name) {
            Some(value) => value,
            None => match &param.default {
                Some(default) => default.clone(),
                None => {
                    return Err(CacheError::Binding(format!(
                        "missing required keyword-only argument '{}'",
                        param.name
                    )))
                }
            },
        };
        key.push_str(&param.name);
        key.push_str(&repr(&value));
        keyword_args.push((param.name.clone(), value));
    }

    if actual.len() > params.len() {
        let Some(name) = sig.var_args() else {
            return Err(CacheError::Binding(format!(
                "takes {} positional arguments but {} were given",
                params.len(),
                actual.len()
            )));
        };
        for (sub_index, value) in actual[params.len()..].iter().enumerate() {
            key.push_str(&format!("{}{}", name, sub_index));
            key.push_str(&repr(value));
        }
    }

    if !kwargs.is_empty() {
        if sig.var_kwargs().is_none() {
            return Err(CacheError::Binding(format!(
                "unexpected keyword argument '{}'",
                kwargs[0].0
            )));
        }
        let mut sorted: Vec<&(String, Value)> = kwargs.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in sorted {
            key.push_str(name);
            key.push_str(&repr(value));
        }
    }

    Ok(GeneratedKey {
        keyword_args,
        residual_kwargs: kwargs,
        key,
    })
}

/// Accumulates pattern source, never emitting two wildcards in a row.
struct PatternWriter {
    source: String,
    open: bool,
}

impl PatternWriter {
    fn new() -> Self {
        Self {
            source: String::new(),
            open: false,
        }
    }

    fn literal(&mut self, text: &str) {
        self.source.push_str(&regex::escape(text));
        self.open = false;
    }

    fn wildcard(&mut self) {
        if !self.open {
            self.source.push_str(WILDCARD);
            self.open = true;
        }
    }

    fn finish(mut self) -> String {
        self.source.push('$');
        self.source
    }
}

/// Builds the invalidation pattern for a partial argument set.
///
/// Pinned parameters contribute `name + repr(value)`, unpinned ones
/// `name + .*?`. The catch-all sections always end in a wildcard. The returned
/// source is anchored at the end; [`KeyPattern::new`] anchors the start.
///
/// # Errors
///
/// [`CacheError::Binding`] when the pinned arguments cannot belong to `sig`.
pub fn generate_strict_key_pattern(
    call: &CallArgs,
    sig: &CallSignature,
    is_method: bool,
) -> Result<String> {
    let start = usize::from(is_method).min(call.args.len());
    let actual = &call.args[start..];
    let params = bindable_params(sig, is_method);
    let mut kwargs = call.kwargs.clone();
    let mut out = PatternWriter::new();

    for (index, (name, _)) in params.iter().enumerate() {
        let pinned = match actual.get(index) {
            Some(value) => Some(value.clone()),
            None => take_kwarg(&mut kwargs, name),
        };
        match pinned {
            Some(value) => out.literal(&format!("{}{}", name, repr(&value))),
            None => {
                out.literal(name);
                out.wildcard();
            }
        }
    }

    for param in sig.keyword_only() {
        match take_kwarg(&mut kwargs, &param.name) {
            Some(value) => out.literal(&format!("{}{}", param.name, repr(&value))),
            None => {
                out.literal(&param.name);
                out.wildcard();
            }
        }
    }

    match sig.var_args() {
        Some(name) => {
            if actual.len() > params.len() {
                for (sub_index, value) in actual[params.len()..].iter().enumerate() {
                    out.literal(&format!("{}{}{}", name, sub_index, repr(value)));
                }
            }
            out.wildcard();
        }
        None if actual.len() > params.len() => {
            return Err(CacheError::Binding(format!(
                "takes {} positional arguments but {} were given",
                params.len(),
                actual.len()
            )));
        }
        None => {}
    }

    match sig.var_kwargs() {
        Some(_) => {
            kwargs.sort_by(|a, b| a.0.cmp(&b.0));
            for (name, value) in &kwargs {
                out.wildcard();
                out.literal(&format!("{}{}", name, repr(value)));
            }
            out.wildcard();
        }
        None if !kwargs.is_empty() => {
            return Err(CacheError::Binding(format!(
                "unexpected keyword argument '{}'",
                kwargs[0].0
            )));
        }
        None => {}
    }

    Ok(out.finish())
}

/// Compiled invalidation matcher over namespaced cache keys.
#[derive(Clone)]
pub struct KeyPattern {
    regex: Regex,
}

impl KeyPattern {
    /// Compiles `body` (from [`generate_strict_key_pattern`]) behind the literal
    /// key prefix of a namespace, so only keys of that namespace can match.
    pub fn new(prefix: &str, body: &str) -> Result<Self> {
        let source = format!("(?s)^{}{}", regex::escape(prefix), body);
        let regex = Regex::new(&source)
            .map_err(|e| CacheError::InvalidArgument(format!("invalid key pattern: {}", e)))?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl fmt::Debug for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyPattern").field(&self.as_str()).finish()
    }
}

/// Key generator bound to one cached computation.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    mode: KeyMode,
    signature: Arc<CallSignature>,
    is_method: bool,
}

impl KeyCodec {
    pub fn new(mode: KeyMode, signature: Arc<CallSignature>, is_method: bool) -> Self {
        Self {
            mode,
            signature,
            is_method,
        }
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    pub fn signature(&self) -> &CallSignature {
        &self.signature
    }

    /// Generates the (un-namespaced) key for `call`.
    pub fn generate(&self, call: &CallArgs) -> Result<GeneratedKey> {
        match self.mode {
            KeyMode::Fast => Ok(generate_fast_key(call, self.is_method)),
            KeyMode::Strict => generate_strict_key(call, &self.signature, self.is_method),
        }
    }

    /// Generates the pattern source for a partial argument set.
    pub fn pattern(&self, call: &CallArgs) -> Result<String> {
        match self.mode {
            KeyMode::Fast => generate_fast_key_pattern(call, self.is_method),
            KeyMode::Strict => generate_strict_key_pattern(call, &self.signature, self.is_method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sig_ab_default() -> CallSignature {
        CallSignature::builder()
            .param("a")
            .param_with_default("b", 1)
            .build()
            .unwrap()
    }

    fn strict(call: CallArgs, sig: &CallSignature) -> String {
        generate_strict_key(&call, sig, false).unwrap().key
    }

    fn pattern(call: CallArgs, sig: &CallSignature) -> String {
        generate_strict_key_pattern(&call, sig, false).unwrap()
    }

    fn compiled(body: &str) -> KeyPattern {
        KeyPattern::new("", body).unwrap()
    }

    #[test]
    fn test_strict_key_var_args() {
        let sig = CallSignature::builder().var_args("a").build().unwrap();
        assert_eq!(strict(CallArgs::new(), &sig), "");
        assert_eq!(strict(CallArgs::new().arg(1), &sig), "a01");
        assert_eq!(strict(CallArgs::new().arg(1).arg(2), &sig), "a01a12");
    }

    #[test]
    fn test_strict_key_var_kwargs_sorted() {
        let sig = CallSignature::builder().var_kwargs("k").build().unwrap();
        assert_eq!(strict(CallArgs::new().kwarg("b", 2).kwarg("a", "1"), &sig), "a'1'b2");
        assert_eq!(strict(CallArgs::new().kwarg("a", "1"), &sig), "a'1'");

        let both = CallSignature::builder().var_args("a").var_kwargs("k").build().unwrap();
        assert_eq!(strict(CallArgs::new().arg(1).arg(2).kwarg("b", 2), &both), "a01a12b2");
    }

    #[test]
    fn test_strict_key_defaults() {
        let sig = sig_ab_default();
        assert_eq!(strict(CallArgs::new().arg(1), &sig), "a1b1");
        assert_eq!(strict(CallArgs::new().kwarg("a", 1), &sig), "a1b1");
        assert_eq!(strict(CallArgs::new().arg(1).kwarg("b", 2), &sig), "a1b2");
        assert_eq!(strict(CallArgs::new().arg(1).arg(2), &sig), "a1b2");

        let all_default = CallSignature::builder()
            .param_with_default("a", 1)
            .param_with_default("b", 1)
            .build()
            .unwrap();
        assert_eq!(strict(CallArgs::new(), &all_default), "a1b1");
        assert_eq!(strict(CallArgs::new().arg(3), &all_default), "a3b1");
        assert_eq!(strict(CallArgs::new().kwarg("b", 2), &all_default), "a1b2");
    }

    #[test]
    fn test_strict_key_keyword_only() {
        let sig = CallSignature::builder()
            .param("a")
            .keyword_only_with_default("b", 1)
            .build()
            .unwrap();
        assert_eq!(strict(CallArgs::new().arg(1).kwarg("b", 2), &sig), "a1b2");
        assert_eq!(strict(CallArgs::new().arg(1), &sig), "a1b1");
    }

    #[test]
    fn test_strict_key_receiver() {
        let sig = CallSignature::builder()
            .receiver("cls")
            .param("a")
            .param_with_default("b", 1)
            .build()
            .unwrap();
        let call = CallArgs::new().arg(1).with_receiver("Tmp");
        assert_eq!(generate_strict_key(&call, &sig, false).unwrap().key, "cls'Tmp'a1b1");
        assert_eq!(generate_strict_key(&call, &sig, true).unwrap().key, "a1b1");

        let call = CallArgs::new().arg(1).arg(3).with_receiver("tmp");
        assert_eq!(generate_strict_key(&call, &sig, true).unwrap().key, "a1b3");
    }

    #[test]
    fn test_strict_key_keyword_args_normalized() {
        let sig = sig_ab_default();
        let generated = generate_strict_key(&CallArgs::new().kwarg("a", 1), &sig, false).unwrap();
        assert_eq!(
            generated.keyword_args,
            vec![("a".to_string(), json!(1)), ("b".to_string(), json!(1))]
        );
        assert!(generated.residual_kwargs.is_empty());

        let invocation = generated.invocation(&CallArgs::new().kwarg("a", 1));
        assert_eq!(invocation.get(0, "a"), Some(&json!(1)));
        assert_eq!(invocation.get(1, "b"), Some(&json!(1)));
    }

    #[test]
    fn test_strict_key_residual_kwargs() {
        let sig = CallSignature::builder().param("a").var_kwargs("kw").build().unwrap();
        let generated =
            generate_strict_key(&CallArgs::new().arg(1).kwarg("z", 2), &sig, false).unwrap();
        assert_eq!(generated.key, "a1z2");
        assert_eq!(generated.residual_kwargs, vec![("z".to_string(), json!(2))]);
    }

    #[test]
    fn test_strict_key_binding_errors() {
        let sig = CallSignature::builder().param("a").param("b").build().unwrap();
        let missing = generate_strict_key(&CallArgs::new().arg(1), &sig, false);
        assert!(matches!(missing, Err(CacheError::Binding(_))));

        let unknown = generate_strict_key(&CallArgs::new().arg(1).arg(2).kwarg("c", 3), &sig, false);
        assert!(matches!(unknown, Err(CacheError::Binding(_))));

        let too_many = generate_strict_key(&CallArgs::new().arg(1).arg(2).arg(3), &sig, false);
        assert!(matches!(too_many, Err(CacheError::Binding(_))));

        let twice = generate_strict_key(&CallArgs::new().arg(1).arg(2).kwarg("a", 1), &sig, false);
        assert!(matches!(twice, Err(CacheError::Binding(_))));
    }

    #[test]
    fn test_fast_key_shapes() {
        assert_eq!(generate_fast_key(&CallArgs::new(), false).key, "()");
        assert_eq!(generate_fast_key(&CallArgs::new().arg(1), false).key, "(1,)");
        assert_eq!(
            generate_fast_key(&CallArgs::new().kwarg("a", "1").kwarg("b", 2), false).key,
            "('a', '1', 'b', 2)"
        );
        assert_eq!(
            generate_fast_key(&CallArgs::new().arg(1).arg(2).kwarg("b", 2), false).key,
            "(1, 2, 'b', 2)"
        );
        let method = CallArgs::new().arg(1).kwarg("b", 2).with_receiver("tmp");
        assert_eq!(generate_fast_key(&method, true).key, "(1, 'b', 2)");
        assert_eq!(generate_fast_key(&method, false).key, "('tmp', 1, 'b', 2)");
    }

    #[test]
    fn test_fast_key_passes_kwargs_through() {
        let call = CallArgs::new().arg(1).kwarg("b", 2);
        let generated = generate_fast_key(&call, false);
        assert_eq!(generated.keyword_args, call.kwargs);
        assert!(generated.residual_kwargs.is_empty());
        assert_eq!(generated.invocation(&call), call);
    }

    #[test]
    fn test_fast_and_strict_diverge() {
        let sig = CallSignature::builder().param("a").param("b").build().unwrap();
        let positional = CallArgs::new().arg(1).arg(2);
        let keyword = CallArgs::new().kwarg("a", 1).kwarg("b", 2);

        assert_ne!(
            generate_fast_key(&positional, false).key,
            generate_fast_key(&keyword, false).key
        );
        assert_eq!(strict(positional, &sig), strict(keyword, &sig));
    }

    #[test]
    fn test_fast_pattern_unsupported() {
        let err = generate_fast_key_pattern(&CallArgs::new(), true).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_pattern_sources() {
        let var_args = CallSignature::builder().var_args("a").build().unwrap();
        assert_eq!(pattern(CallArgs::new(), &var_args), ".*?$");
        assert_eq!(pattern(CallArgs::new().arg(1), &var_args), "a01.*?$");

        let ab = CallSignature::builder().param("a").param("b").build().unwrap();
        assert_eq!(pattern(CallArgs::new().arg(1), &ab), "a1b.*?$");
        assert_eq!(pattern(CallArgs::new().kwarg("b", 1), &ab), "a.*?b1$");
        assert_eq!(pattern(CallArgs::new().arg(1).kwarg("b", 2), &ab), "a1b2$");

        let both = CallSignature::builder().var_args("a").var_kwargs("k").build().unwrap();
        assert_eq!(
            pattern(CallArgs::new().arg(1).arg(2).kwarg("b", 2), &both),
            "a01a12.*?b2.*?$"
        );
    }

    #[test]
    fn test_pattern_escapes_values() {
        let sig = CallSignature::builder().param("a").param("b").build().unwrap();
        let body = pattern(CallArgs::new().arg("x.y*"), &sig);
        assert_eq!(body, "a'x\\.y\\*'b.*?$");
        let p = compiled(&body);
        assert!(p.is_match("a'x.y*'b1"));
        assert!(!p.is_match("a'xzyy'b1"));
    }

    #[test]
    fn test_pattern_matches_complete_keys() {
        let sig = CallSignature::builder()
            .param("a")
            .param_with_default("b", 2)
            .build()
            .unwrap();
        let p = compiled(&pattern(CallArgs::new().kwarg("a", 1), &sig));
        assert!(p.is_match(&strict(CallArgs::new().arg(1).arg(2), &sig)));
        assert!(p.is_match(&strict(CallArgs::new().arg(1).arg(9), &sig)));
        assert!(!p.is_match(&strict(CallArgs::new().arg(2).arg(2), &sig)));
    }

    #[test]
    fn test_pattern_var_kwargs_any_position() {
        let sig = CallSignature::builder().var_kwargs("k").build().unwrap();
        let p = compiled(&pattern(CallArgs::new().kwarg("b", 2), &sig));
        assert!(p.is_match("a1b2c3"));
        assert!(p.is_match("b2"));
        assert!(!p.is_match("a1b3"));
    }

    #[test]
    fn test_pattern_receiver() {
        let sig = CallSignature::builder()
            .receiver("self")
            .param("a")
            .param_with_default("b", 1)
            .build()
            .unwrap();
        let call = CallArgs::new().arg(1).with_receiver("tmp");
        let body = generate_strict_key_pattern(&call, &sig, true).unwrap();
        assert_eq!(body, "a1b.*?$");
    }

    #[test]
    fn test_pattern_is_namespace_anchored() {
        let sig = CallSignature::builder().param("a").build().unwrap();
        let body = pattern(CallArgs::new(), &sig);
        let p = KeyPattern::new("Memory:add-keys:", &body).unwrap();
        assert!(p.is_match("Memory:add-keys:a1"));
        assert!(!p.is_match("Memory:mul-keys:a1"));
        assert!(!p.is_match("xMemory:add-keys:a1"));
    }

    #[test]
    fn test_codec_modes() {
        let sig = Arc::new(sig_ab_default());
        let fast = KeyCodec::new(KeyMode::Fast, sig.clone(), false);
        let strict_codec = KeyCodec::new(KeyMode::from(true), sig, false);

        assert_eq!(fast.generate(&CallArgs::new().arg(1)).unwrap().key, "(1,)");
        assert_eq!(strict_codec.generate(&CallArgs::new().arg(1)).unwrap().key, "a1b1");
        assert!(fast.pattern(&CallArgs::new().arg(1)).unwrap_err().is_unsupported());
        assert_eq!(strict_codec.pattern(&CallArgs::new().arg(1)).unwrap(), "a1b.*?$");
    }
}
