//! # sleuth-schema
//!
//! Parameter validation for kubesleuth tools.
//!
//! [`validator::ParameterValidator`] checks a tool's parameter map in two
//! phases:
//!
//! 1. **Structural**: JSON Schema validation via the `jsonschema` crate.
//! 2. **Semantic**: rules (`RequiredField`, `AllowedValues`,
//!    `ForbiddenTokens`, `Custom`) evaluated against the map.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use sleuth_schema::validator::ParameterValidator;
//!
//! let mut validator = ParameterValidator::new(schema)?;
//! validator.register_check("namespace-allowed", Box::new(|params| {
//!     match params.get("namespace").and_then(|v| v.as_str()) {
//!         Some("kube-system") => Some("kube-system is off limits".to_string()),
//!         _ => None,
//!     }
//! }));
//! validator.check(&parameters)?;
//! ```

pub mod validator;
