//! Static call-signature metadata.
//!
//! Strict key generation binds every actual argument to a declared parameter.
//! Rust functions carry no runtime parameter list, so the signature of a cached
//! computation is described once, at cache construction, with
//! [`CallSignature::builder`].

use serde_json::Value;
use std::collections::HashSet;

use crate::error::{CacheError, Result};

/// One named parameter, with its default value when it has one.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

impl Param {
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// Ordered parameter metadata of a cached computation.
///
/// The layout mirrors a full parameter list:
/// `receiver, a, b=2, *args, d, e=2, **kwargs`.
///
/// # Examples
///
/// ```
/// use cachemint_core::CallSignature;
///
/// let sig = CallSignature::builder()
///     .param("a")
///     .param_with_default("b", 2)
///     .build()
///     .unwrap();
/// assert_eq!(sig.positional().len(), 2);
/// assert_eq!(sig.required_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallSignature {
    receiver: Option<String>,
    positional: Vec<Param>,
    var_args: Option<String>,
    keyword_only: Vec<Param>,
    var_kwargs: Option<String>,
}

impl CallSignature {
    pub fn builder() -> SignatureBuilder {
        SignatureBuilder::default()
    }

    /// Signature of a computation accepting anything: `(*args, **kwargs)`.
    pub fn variadic() -> Self {
        Self {
            var_args: Some("args".to_string()),
            var_kwargs: Some("kwargs".to_string()),
            ..Self::default()
        }
    }

    /// Name of the implicit receiver parameter, if the computation is a method.
    pub fn receiver(&self) -> Option<&str> {
        self.receiver.as_deref()
    }

    /// Positional-or-keyword parameters in declaration order, receiver excluded.
    pub fn positional(&self) -> &[Param] {
        &self.positional
    }

    pub fn var_args(&self) -> Option<&str> {
        self.var_args.as_deref()
    }

    pub fn keyword_only(&self) -> &[Param] {
        &self.keyword_only
    }

    pub fn var_kwargs(&self) -> Option<&str> {
        self.var_kwargs.as_deref()
    }

    /// Number of leading positional parameters without a default.
    pub fn required_count(&self) -> usize {
        self.positional.iter().take_while(|p| !p.has_default()).count()
    }
}

/// Builder for [`CallSignature`]; validation happens in [`SignatureBuilder::build`].
#[derive(Debug, Default)]
pub struct SignatureBuilder {
    signature: CallSignature,
}

impl SignatureBuilder {
    /// Declares the implicit first parameter (`self`/`cls`).
    pub fn receiver(mut self, name: impl Into<String>) -> Self {
        self.signature.receiver = Some(name.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.signature.positional.push(Param {
            name: name.into(),
            default: None,
        });
        self
    }

    pub fn param_with_default(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.signature.positional.push(Param {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    pub fn var_args(mut self, name: impl Into<String>) -> Self {
        self.signature.var_args = Some(name.into());
        self
    }

    pub fn keyword_only(mut self, name: impl Into<String>) -> Self {
        self.signature.keyword_only.push(Param {
            name: name.into(),
            default: None,
        });
        self
    }

    pub fn keyword_only_with_default(
        mut self,
        name: impl Into<String>,
        default: impl Into<Value>,
    ) -> Self {
        self.signature.keyword_only.push(Param {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    pub fn var_kwargs(mut self, name: impl Into<String>) -> Self {
        self.signature.var_kwargs = Some(name.into());
        self
    }

    /// Validates and returns the signature.
    ///
    /// Fails with [`CacheError::Config`] when a parameter name repeats or a
    /// positional parameter without default follows one with a default.
    pub fn build(self) -> Result<CallSignature> {
        let sig = self.signature;

        let mut seen_default = false;
        for p in &sig.positional {
            if p.has_default() {
                seen_default = true;
            } else if seen_default {
                return Err(CacheError::Config(format!(
                    "non-default parameter '{}' follows default parameter",
                    p.name
                )));
            }
        }

        let mut names = HashSet::new();
        let all = sig
            .receiver
            .iter()
            .chain(sig.positional.iter().map(|p| &p.name))
            .chain(sig.var_args.iter())
            .chain(sig.keyword_only.iter().map(|p| &p.name))
            .chain(sig.var_kwargs.iter());
        for name in all {
            if !names.insert(name.as_str()) {
                return Err(CacheError::Config(format!(
                    "duplicate parameter name '{}'",
                    name
                )));
            }
        }

        Ok(sig)
    }
}
