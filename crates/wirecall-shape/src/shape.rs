use std::fmt;
use std::sync::Arc;

use jsonschema::Validator;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ShapeError};

/// A compiled payload shape.
///
/// Cloning is cheap: the compiled validator is shared. Boolean schemas
/// are accepted, so `Shape::anything()` and `Shape::nothing()` come for
/// free from `true`/`false` schemas.
#[derive(Clone)]
pub struct Shape {
    source: Arc<Value>,
    validator: Arc<Validator>,
}

impl Shape {
    /// Compile a shape from a JSON Schema value.
    pub fn compile(schema: &Value) -> Result<Self> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|err| ShapeError::CompileFailed(err.to_string()))?;
        debug!("compiled payload shape");
        Ok(Self {
            source: Arc::new(schema.clone()),
            validator: Arc::new(validator),
        })
    }

    /// Compile a shape from a JSON Schema string.
    pub fn parse(schema_json: &str) -> Result<Self> {
        let schema: Value = serde_json::from_str(schema_json)?;
        Self::compile(&schema)
    }

    /// A shape every value conforms to.
    pub fn anything() -> Self {
        Self::compile(&Value::Bool(true)).expect("boolean schema always compiles")
    }

    /// A shape no value conforms to.
    pub fn nothing() -> Self {
        Self::compile(&Value::Bool(false)).expect("boolean schema always compiles")
    }

    /// Whether the value conforms to this shape.
    pub fn conforms(&self, value: &Value) -> bool {
        self.validator.is_valid(value)
    }

    /// Validate the value, reporting the first few mismatches.
    pub fn check(&self, value: &Value) -> Result<()> {
        let mut errors = self.validator.iter_errors(value);
        if let Some(first) = errors.next() {
            let mut message = first.to_string();
            for err in errors.take(3) {
                message.push_str("; ");
                message.push_str(&err.to_string());
            }
            return Err(ShapeError::Mismatch { message });
        }
        Ok(())
    }

    /// The schema this shape was compiled from.
    pub fn source(&self) -> &Value {
        &self.source
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape").field("source", &self.source).finish()
    }
}
