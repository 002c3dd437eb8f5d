use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::marker::PhantomData;

use crate::errors::{AgentError, AgentResult};

/// How a tool describes and checks its parameters.
///
/// Every violation is reported, not only the first, as
/// `"Parameter {field}: {problem}"`.
pub trait ParamsSchema: Send + Sync {
    fn validate(&self, params: &Value) -> Vec<String>;

    /// The `{"type": "object", ...}` map declared to the model.
    fn parameters(&self) -> Value;
}

/// A raw declarative map. A map wrapped as `{"parameters": {...}}` is
/// unwrapped.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonSchema(Value);

impl JsonSchema {
    pub fn new(schema: Value) -> Self {
        Self(schema)
    }
}

impl ParamsSchema for JsonSchema {
    fn validate(&self, params: &Value) -> Vec<String> {
        check_declared(&self.parameters(), params)
    }

    fn parameters(&self) -> Value {
        match self.0.get("parameters") {
            Some(parameters) => parameters.clone(),
            None => self.0.clone(),
        }
    }
}

/// Parameters backed by a deserializable type. The declared map is checked
/// first; whatever it cannot express is caught by deserializing into `T`.
pub struct TypedSchema<T> {
    properties: Map<String, Value>,
    required: Vec<String>,
    _params: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedSchema<T> {
    /// `properties` is the object map of field schemas.
    pub fn new(properties: Value, required: &[&str]) -> Self {
        Self {
            properties: properties.as_object().cloned().unwrap_or_default(),
            required: required.iter().map(|field| field.to_string()).collect(),
            _params: PhantomData,
        }
    }

    pub fn parse(&self, params: &Value) -> AgentResult<T> {
        serde_json::from_value(params.clone())
            .map_err(|e| AgentError::InvalidParameters(e.to_string()))
    }
}

impl<T: DeserializeOwned> ParamsSchema for TypedSchema<T> {
    fn validate(&self, params: &Value) -> Vec<String> {
        let violations = check_declared(&self.parameters(), params);
        if !violations.is_empty() {
            return violations;
        }
        match self.parse(params) {
            Ok(_) => Vec::new(),
            Err(e) => vec![format!("Parameters: {}", e)],
        }
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

fn check_declared(schema: &Value, params: &Value) -> Vec<String> {
    let Some(params) = params.as_object() else {
        return vec!["Parameters must be a JSON object".to_string()];
    };

    let mut violations = Vec::new();
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|field| field.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        if !params.contains_key(*field) {
            violations.push(format!("Parameter {}: Field required", field));
        }
    }

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return violations;
    };
    for (field, property) in properties {
        let Some(value) = params.get(field) else {
            continue;
        };
        if value.is_null() && !required.contains(&field.as_str()) {
            continue;
        }
        for problem in check_property(property, value) {
            violations.push(format!("Parameter {}: {}", field, problem));
        }
    }
    violations
}

fn check_property(property: &Value, value: &Value) -> Vec<String> {
    let mut problems = Vec::new();

    let types: Vec<&str> = match property.get("type") {
        Some(Value::String(ty)) => vec![ty.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(|ty| ty.as_str()).collect(),
        _ => Vec::new(),
    };
    if !types.is_empty() && !types.iter().any(|ty| matches_type(ty, value)) {
        problems.push(format!("Input should be a valid {}", types.join(" or ")));
        return problems;
    }

    if let Some(allowed) = property.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            let allowed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
            problems.push(format!("Input should be {}", allowed.join(", ")));
        }
    }

    if let (Some(minimum), Some(number)) = (
        property.get("minimum").and_then(|m| m.as_f64()),
        value.as_f64(),
    ) {
        if number < minimum {
            problems.push(format!("Input should be greater than or equal to {}", minimum));
        }
    }
    problems
}

fn matches_type(ty: &str, value: &Value) -> bool {
    match ty {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
