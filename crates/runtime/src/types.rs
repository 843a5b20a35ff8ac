//! Core type definitions shared by the resolver, client and loop.

use crate::interfaces::InitError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Runtime API version segment used in every control-plane URL.
pub const API_VERSION: &str = "2018-06-01";

/// Delimiter between entry path and method name in a handler reference.
pub const HANDLER_DELIMITER: &str = "::";

pub const REQUEST_ID_HEADER: &str = "Lambda-Runtime-Aws-Request-Id";
pub const DEADLINE_HEADER: &str = "Lambda-Runtime-Deadline-Ms";
pub const FUNCTION_ARN_HEADER: &str = "Lambda-Runtime-Invoked-Function-Arn";
pub const TRACE_ID_HEADER: &str = "Lambda-Runtime-Trace-Id";

/// Error type reported when the handler cannot be resolved.
pub const INIT_ERROR_TYPE: &str = "InitError";

/// Error type reported when a handler invocation fails.
pub const RUNTIME_ERROR_TYPE: &str = "RuntimeError";

/// A parsed `entry::method` handler reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerReference {
    pub entry_path: String,
    pub method_name: String,
}

impl HandlerReference {
    /// Parse a handler reference, splitting on the first `::`.
    ///
    /// # Errors
    /// Returns `InitError::MalformedHandlerReference` if the delimiter is absent
    /// or either side is empty.
    pub fn parse(raw: &str) -> Result<Self, InitError> {
        let (entry, method) = raw
            .trim()
            .split_once(HANDLER_DELIMITER)
            .ok_or_else(|| InitError::MalformedHandlerReference(raw.to_string()))?;

        let entry = entry.trim();
        let method = method.trim();
        if entry.is_empty() || method.is_empty() {
            return Err(InitError::MalformedHandlerReference(raw.to_string()));
        }

        Ok(Self {
            entry_path: entry.to_string(),
            method_name: method.to_string(),
        })
    }
}

impl std::fmt::Display for HandlerReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.entry_path, HANDLER_DELIMITER, self.method_name)
    }
}

/// One unit of work handed out by the control plane.
///
/// Header names are stored lowercased; values keep their wire order.
#[derive(Debug, Clone, Default)]
pub struct InvocationEvent {
    pub request_id: String,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

impl InvocationEvent {
    /// Build an event from captured headers, extracting the request id.
    ///
    /// Returns `None` when the request id header is absent or empty.
    pub fn from_parts(headers: BTreeMap<String, Vec<String>>, body: Vec<u8>) -> Option<Self> {
        let request_id = header_value(&headers, REQUEST_ID_HEADER)?;
        if request_id.is_empty() {
            return None;
        }
        Some(Self {
            request_id,
            headers,
            body,
        })
    }

    /// Single logical value of a header; multiple values are joined with `,`.
    pub fn header(&self, name: &str) -> Option<String> {
        header_value(&self.headers, name)
    }

    /// Invocation deadline in milliseconds since the Unix epoch.
    pub fn deadline_ms(&self) -> Option<u64> {
        self.header(DEADLINE_HEADER)?.trim().parse().ok()
    }

    pub fn function_arn(&self) -> Option<String> {
        self.header(FUNCTION_ARN_HEADER)
    }

    pub fn trace_id(&self) -> Option<String> {
        self.header(TRACE_ID_HEADER)
    }
}

/// Look up a header case-insensitively and join its values with `,`.
pub fn header_value(headers: &BTreeMap<String, Vec<String>>, name: &str) -> Option<String> {
    headers
        .get(&name.to_ascii_lowercase())
        .map(|values| values.join(","))
}

/// Structured error record posted back to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "errorMessage")]
    pub error_message: String,
    #[serde(rename = "errorType")]
    pub error_type: String,
}

impl ErrorEnvelope {
    pub fn new(error_message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            error_type: error_type.into(),
        }
    }

    /// Envelope for a failed handler resolution.
    pub fn init(error_message: impl Into<String>) -> Self {
        Self::new(error_message, INIT_ERROR_TYPE)
    }

    /// Serialize to the two-field JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, vs)| {
                (
                    k.to_ascii_lowercase(),
                    vs.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_parse_handler_reference() {
        let reference = HandlerReference::parse("example.Hello::handleRequest").unwrap();
        assert_eq!(reference.entry_path, "example.Hello");
        assert_eq!(reference.method_name, "handleRequest");
        assert_eq!(reference.to_string(), "example.Hello::handleRequest");
    }

    #[test]
    fn test_parse_splits_on_first_delimiter() {
        let reference = HandlerReference::parse("a::b::c").unwrap();
        assert_eq!(reference.entry_path, "a");
        assert_eq!(reference.method_name, "b::c");
    }

    #[test]
    fn test_parse_rejects_missing_delimiter() {
        let result = HandlerReference::parse("example.Hello.handleRequest");
        assert!(matches!(result, Err(InitError::MalformedHandlerReference(_))));
    }

    #[test]
    fn test_parse_rejects_empty_parts() {
        for raw in ["::handle", "entry::", "::", "", "   "] {
            let result = HandlerReference::parse(raw);
            assert!(
                matches!(result, Err(InitError::MalformedHandlerReference(_))),
                "expected malformed reference for {raw:?}"
            );
        }
    }

    #[test]
    fn test_event_extracts_request_id() {
        let event = InvocationEvent::from_parts(
            headers(&[(REQUEST_ID_HEADER, &["abc123"][..])]),
            b"hello".to_vec(),
        )
        .unwrap();
        assert_eq!(event.request_id, "abc123");
        assert_eq!(event.body, b"hello");
    }

    #[test]
    fn test_event_without_request_id() {
        assert!(InvocationEvent::from_parts(BTreeMap::new(), vec![]).is_none());
        assert!(InvocationEvent::from_parts(headers(&[(REQUEST_ID_HEADER, &[""][..])]), vec![]).is_none());
    }

    #[test]
    fn test_multi_value_header_is_joined() {
        let event = InvocationEvent::from_parts(
            headers(&[
                (REQUEST_ID_HEADER, &["a", "b"][..]),
                ("X-Custom", &["1", "2", "3"][..]),
            ]),
            vec![],
        )
        .unwrap();
        assert_eq!(event.request_id, "a,b");
        assert_eq!(event.header("x-custom").as_deref(), Some("1,2,3"));
        assert_eq!(event.header("X-CUSTOM").as_deref(), Some("1,2,3"));
    }

    #[test]
    fn test_event_metadata_accessors() {
        let event = InvocationEvent::from_parts(
            headers(&[
                (REQUEST_ID_HEADER, &["id-1"][..]),
                (DEADLINE_HEADER, &["1700000000000"][..]),
                (FUNCTION_ARN_HEADER, &["arn:aws:lambda:us-east-1:123:function:f"][..]),
                (TRACE_ID_HEADER, &["Root=1-abc"][..]),
            ]),
            vec![],
        )
        .unwrap();
        assert_eq!(event.deadline_ms(), Some(1_700_000_000_000));
        assert_eq!(
            event.function_arn().as_deref(),
            Some("arn:aws:lambda:us-east-1:123:function:f")
        );
        assert_eq!(event.trace_id().as_deref(), Some("Root=1-abc"));
    }

    #[test]
    fn test_error_envelope_json_format() {
        let envelope = ErrorEnvelope::new("boom \"quoted\"", RUNTIME_ERROR_TYPE);
        let json = envelope.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"errorMessage":"boom \"quoted\"","errorType":"RuntimeError"}"#
        );

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_init_envelope_type() {
        assert_eq!(ErrorEnvelope::init("x").error_type, "InitError");
    }
}
