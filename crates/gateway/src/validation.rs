//! Request shape checks run before any message operation.
//!
//! Failures are reported together as
//! `400 {"errors":[{"location","path","msg"}]}`.

use std::collections::HashMap;

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::{Serialize, de::DeserializeOwned},
    serde_json::{Value, json},
};

const INVALID_VALUE: &str = "Invalid value";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Body,
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub location: Location,
    pub path: String,
    pub msg: String,
}

/// All field errors of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    fn push(&mut self, location: Location, path: impl Into<String>, msg: impl Into<String>) {
        self.0.push(FieldError {
            location,
            path: path.into(),
            msg: msg.into(),
        });
    }

    fn invalid(&mut self, location: Location, path: impl Into<String>) {
        self.push(location, path, INVALID_VALUE);
    }

    fn single(location: Location, path: impl Into<String>, msg: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(location, path, msg);
        errors
    }

    fn into_result(self) -> Result<(), Self> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }
}

impl IntoResponse for ValidationErrors {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(json!({ "errors": self.0 }))).into_response()
    }
}

/// Parse a JSON request body.
pub fn parse_body(raw: &[u8]) -> Result<Value, ValidationErrors> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(raw)
        .map_err(|e| ValidationErrors::single(Location::Body, "", format!("Malformed JSON: {e}")))
}

/// Deserialize an already-checked body into its typed request.
pub fn decode<T: DeserializeOwned>(body: Value) -> Result<T, ValidationErrors> {
    serde_json::from_value(body).map_err(|e| ValidationErrors::single(Location::Body, "", e.to_string()))
}

fn non_empty_object(v: Option<&Value>) -> bool {
    v.and_then(Value::as_object).is_some_and(|o| !o.is_empty())
}

fn check_kind(errors: &mut ValidationErrors, item: &Value, prefix: &str) {
    let kind = item.get("type").or_else(|| item.get("kind"));
    if let Some(kind) = kind
        && !matches!(kind.as_str(), Some("number" | "group"))
    {
        errors.invalid(Location::Body, format!("{prefix}type"));
    }
}

fn check_jid(errors: &mut ValidationErrors, item: &Value, prefix: &str) {
    let jid = item.get("jid").or_else(|| item.get("destination"));
    if !jid.and_then(Value::as_str).is_some_and(|s| !s.trim().is_empty()) {
        errors.invalid(Location::Body, format!("{prefix}jid"));
    }
}

fn check_send_item(errors: &mut ValidationErrors, item: &Value, prefix: &str) {
    if !item.is_object() {
        errors.invalid(Location::Body, prefix.trim_end_matches('.'));
        return;
    }
    check_jid(errors, item, prefix);
    check_kind(errors, item, prefix);

    let message = item.get("message").or_else(|| item.get("content"));
    if !non_empty_object(message) {
        errors.invalid(Location::Body, format!("{prefix}message"));
    }
    if let Some(options) = item.get("options")
        && !options.is_object()
    {
        errors.invalid(Location::Body, format!("{prefix}options"));
    }

    match item.get("quoted").or_else(|| item.get("quote")) {
        None | Some(Value::Null) => {},
        Some(Value::Object(quoted)) => {
            if !quoted.get("id").is_some_and(Value::is_string) {
                errors.invalid(Location::Body, format!("{prefix}quoted.id"));
            }
            let remote = quoted
                .get("remoteJid")
                .or_else(|| quoted.get("conversationId"));
            if remote.is_some_and(|v| !v.is_string()) {
                errors.invalid(Location::Body, format!("{prefix}quoted.remoteJid"));
            }
        },
        Some(_) => errors.invalid(Location::Body, format!("{prefix}quoted")),
    }

    let delay = item.get("delay").or_else(|| item.get("delayMs"));
    if delay.is_some_and(|v| v.as_u64().is_none()) {
        errors.invalid(Location::Body, format!("{prefix}delay"));
    }
}

pub fn validate_send(body: &Value) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if body.is_object() {
        check_send_item(&mut errors, body, "");
    } else {
        errors.invalid(Location::Body, "");
    }
    errors.into_result()
}

pub fn validate_bulk(body: &Value) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    match body.as_array() {
        Some(items) if !items.is_empty() => {
            for (i, item) in items.iter().enumerate() {
                check_send_item(&mut errors, item, &format!("[{i}]."));
            }
        },
        _ => errors.invalid(Location::Body, ""),
    }
    errors.into_result()
}

pub fn validate_delete(body: &Value) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if !body.is_object() {
        errors.invalid(Location::Body, "");
        return errors.into_result();
    }
    check_jid(&mut errors, body, "");
    check_kind(&mut errors, body, "");
    if !non_empty_object(body.get("message")) {
        errors.invalid(Location::Body, "message");
    }
    errors.into_result()
}

/// The download body is a whole received message.
pub fn validate_envelope(body: &Value) -> Result<(), ValidationErrors> {
    if non_empty_object(Some(body)) {
        Ok(())
    } else {
        Err(ValidationErrors::single(Location::Body, "", INVALID_VALUE))
    }
}

/// Parsed `?cursor=&limit=` of the list route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub cursor: Option<i64>,
    pub limit: Option<u32>,
}

pub fn parse_list_query(params: &HashMap<String, String>) -> Result<ListQuery, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let mut query = ListQuery::default();

    if let Some(raw) = params.get("cursor") {
        match raw.trim().parse() {
            Ok(cursor) => query.cursor = Some(cursor),
            Err(_) => errors.invalid(Location::Query, "cursor"),
        }
    }
    if let Some(raw) = params.get("limit") {
        match raw.trim().parse() {
            Ok(limit) => query.limit = Some(limit),
            Err(_) => errors.invalid(Location::Query, "limit"),
        }
    }
    errors.into_result().map(|()| query)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn paths(result: Result<(), ValidationErrors>) -> Vec<String> {
        result
            .unwrap_err()
            .errors()
            .iter()
            .map(|e| e.path.clone())
            .collect()
    }

    #[test]
    fn send_accepts_minimal_body() {
        validate_send(&json!({ "jid": "123", "message": { "text": "hi" } })).unwrap();
        validate_send(&json!({
            "jid": "123@g.us",
            "type": "group",
            "message": { "text": "hi" },
            "options": {},
            "quoted": { "id": "Q1", "remoteJid": "123@g.us" }
        }))
        .unwrap();
    }

    #[test]
    fn send_reports_every_bad_field() {
        let errors = paths(validate_send(&json!({
            "jid": "",
            "type": "channel",
            "message": {},
            "options": [],
            "quoted": { "remoteJid": 1 }
        })));
        assert_eq!(
            errors,
            vec!["jid", "type", "message", "options", "quoted.id", "quoted.remoteJid"]
        );
        assert_eq!(paths(validate_send(&json!([]))), vec![""]);
    }

    #[test]
    fn bulk_paths_carry_index() {
        assert_eq!(paths(validate_bulk(&json!([]))), vec![""]);
        assert_eq!(paths(validate_bulk(&json!({}))), vec![""]);
        let errors = paths(validate_bulk(&json!([
            { "jid": "1", "message": { "text": "a" } },
            { "jid": "2", "message": "text", "delay": -5 }
        ])));
        assert_eq!(errors, vec!["[1].message", "[1].delay"]);
    }

    #[test]
    fn delete_and_envelope() {
        validate_delete(&json!({ "jid": "1", "message": { "id": "M1" } })).unwrap();
        assert_eq!(paths(validate_delete(&json!({ "jid": "1" }))), vec!["message"]);
        validate_envelope(&json!({ "key": {} })).unwrap();
        assert!(validate_envelope(&json!({})).is_err());
        assert!(validate_envelope(&Value::Null).is_err());
    }

    #[test]
    fn list_query() {
        let mut params = HashMap::new();
        assert_eq!(parse_list_query(&params).unwrap(), ListQuery::default());

        params.insert("cursor".to_string(), "42".to_string());
        params.insert("limit".to_string(), "10".to_string());
        assert_eq!(parse_list_query(&params).unwrap(), ListQuery {
            cursor: Some(42),
            limit: Some(10),
        });

        params.insert("limit".to_string(), "ten".to_string());
        let err = parse_list_query(&params).unwrap_err();
        assert_eq!(err.errors()[0].location, Location::Query);
        assert_eq!(err.errors()[0].path, "limit");
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        let err = parse_body(b"{nope").unwrap_err();
        assert!(err.errors()[0].msg.starts_with("Malformed JSON"));
        assert_eq!(parse_body(b"").unwrap(), Value::Null);
    }

    #[test]
    fn error_body_shape() {
        let body = serde_json::to_value(
            ValidationErrors::single(Location::Query, "cursor", INVALID_VALUE).0,
        )
        .unwrap();
        assert_eq!(
            body,
            json!([{ "location": "query", "path": "cursor", "msg": "Invalid value" }])
        );
    }
}
