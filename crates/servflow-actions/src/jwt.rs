//! The `jwt` action: HS256 token generation and validation.

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use servflow_config::{FieldInfo, FieldType};
use servflow_core::{ActionDescriptor, ActionExecutable, Error, RequestContext, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

const DEFAULT_EXPIRY_MINUTES: i64 = 60;

#[derive(Debug, Deserialize)]
struct JwtConfig {
    #[serde(default = "default_mode")]
    mode: String,
    secret: String,
    #[serde(default)]
    claims: Map<String, Value>,
    #[serde(default)]
    token: String,
    #[serde(default)]
    expiry_minutes: Option<i64>,
}

fn default_mode() -> String {
    "generate".to_string()
}

struct JwtAction {
    config: String,
}

#[async_trait]
impl ActionExecutable for JwtAction {
    fn action_type(&self) -> &str {
        "jwt"
    }

    fn config_template(&self) -> String {
        self.config.clone()
    }

    async fn execute(&self, _ctx: &RequestContext, rendered_config: &str) -> Result<Value> {
        let config: JwtConfig = serde_json::from_str(rendered_config)
            .map_err(|e| Error::generic(format!("jwt action: invalid config: {e}")))?;
        if config.secret.is_empty() {
            return Err(Error::generic("jwt action: secret is empty"));
        }
        match config.mode.as_str() {
            "generate" => generate(&config),
            "validate" => validate(&config),
            other => Err(Error::generic(format!("jwt action: unknown mode {other:?}"))),
        }
    }
}

fn generate(config: &JwtConfig) -> Result<Value> {
    let mut claims = config.claims.clone();
    if !claims.contains_key("exp") {
        let minutes = config.expiry_minutes.unwrap_or(DEFAULT_EXPIRY_MINUTES);
        let exp = chrono::Utc::now() + chrono::Duration::minutes(minutes);
        claims.insert("exp".to_string(), json!(exp.timestamp()));
    }
    let token = encode(
        &Header::new(Algorithm::HS256),
        &Value::Object(claims),
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| Error::generic(format!("jwt action: signing failed: {e}")))?;
    Ok(json!({"token": token}))
}

fn validate(config: &JwtConfig) -> Result<Value> {
    if config.token.is_empty() {
        return Err(Error::generic("jwt action: token is empty"));
    }
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Value>(
        &config.token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| Error::generic(format!("jwt action: token invalid: {e}")))?;
    Ok(json!({"valid": true, "claims": data.claims}))
}

fn construct(config: &str) -> Result<Arc<dyn ActionExecutable>> {
    let parsed: Value = serde_json::from_str(config)
        .map_err(|e| Error::config(format!("jwt action: config is not valid JSON: {e}")))?;
    match parsed.get("mode").and_then(Value::as_str) {
        None | Some("generate") | Some("validate") => {}
        // Templated modes are resolved per request.
        Some(templated) if templated.contains("{{") => {}
        Some(other) => {
            return Err(Error::config(format!("jwt action: unknown mode {other:?}")));
        }
    }
    Ok(Arc::new(JwtAction {
        config: config.to_string(),
    }))
}

pub(crate) fn descriptor() -> ActionDescriptor {
    let mut fields = BTreeMap::new();
    fields.insert(
        "mode".to_string(),
        FieldInfo::optional(FieldType::String, "Operation mode")
            .with_default(json!("generate"))
            .with_values(vec!["generate".to_string(), "validate".to_string()]),
    );
    fields.insert("secret".to_string(), FieldInfo::required_string("Signing secret"));
    fields.insert(
        "claims".to_string(),
        FieldInfo::optional(FieldType::Map, "Claims for generated tokens"),
    );
    fields.insert(
        "token".to_string(),
        FieldInfo::optional(FieldType::String, "Token to validate"),
    );
    fields.insert(
        "expiry_minutes".to_string(),
        FieldInfo::optional(FieldType::String, "Expiry in minutes for generated tokens"),
    );
    ActionDescriptor {
        name: "jwt".to_string(),
        description: "Generates and validates HS256 JSON Web Tokens".to_string(),
        fields,
        constructor: construct,
    }
}
