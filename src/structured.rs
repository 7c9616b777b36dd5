//! Structured responses: pull a JSON object out of free-form model output,
//! decode it into a typed shape, validate it, and retry the whole
//! invoke-and-parse step a bounded number of times.

use rand::Rng;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{GenerationError, ParseError};
use crate::inference::{InferenceClient, ModelRequest};
use crate::logging;

/// Shape checks applied after decoding.
pub trait Validate {
    /// Reject values outside their declared ranges.
    fn validate(&self) -> Result<(), ParseError> {
        Ok(())
    }

    /// Whether a successful parse carries no usable items.
    fn is_empty(&self) -> bool {
        false
    }
}

pub(crate) fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), ParseError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ParseError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        })
    }
}

/// Locate the JSON payload inside raw model output.
///
/// A response that is exactly one fenced block has its fence markers removed.
/// Otherwise the payload runs from the first `{` to the last `}`.
pub fn extract_json(raw: &str) -> Result<&str, ParseError> {
    let trimmed = raw.trim();

    if trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() >= 6 {
        let inner = &trimmed[3..trimmed.len() - 3];
        // Drop the info string (```json) up to the first newline
        let body = match inner.find('\n') {
            Some(idx) if !inner[..idx].contains('{') => &inner[idx + 1..],
            _ => inner,
        };
        let body = body.trim();
        if body.starts_with('{') && body.ends_with('}') {
            return Ok(body);
        }
    }

    let start = trimmed.find('{').ok_or(ParseError::NoJsonObject)?;
    let end = trimmed.rfind('}').ok_or(ParseError::NoJsonObject)?;
    if end < start {
        return Err(ParseError::NoJsonObject);
    }
    Ok(&trimmed[start..=end])
}

/// Decode the JSON object embedded in `raw` into `T` and validate it.
pub fn parse_structured<T>(raw: &str) -> Result<T, ParseError>
where
    T: DeserializeOwned + Validate,
{
    let json = extract_json(raw)?;
    let value: T = serde_json::from_str(json)?;
    value.validate()?;
    Ok(value)
}

/// Issues structured requests with the shared retry policy.
#[derive(Clone)]
pub struct StructuredClient {
    inference: InferenceClient,
    max_attempts: u32,
    backoff: Duration,
}

impl StructuredClient {
    pub fn new(inference: InferenceClient, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            inference,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Invoke, parse and validate, retrying on any failure. With
    /// `require_items`, an empty successful parse also counts as a failure.
    pub async fn request<T>(
        &self,
        request: &ModelRequest,
        require_items: bool,
    ) -> Result<T, GenerationError>
    where
        T: DeserializeOwned + Validate,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.delay_before(attempt)).await;
            }

            match self.attempt::<T>(request, require_items).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    logging::log_inference(Some(&request.label), &format!(
                        "Attempt {}/{} failed: {}", attempt, self.max_attempts, e
                    ));
                    last_error = Some(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| GenerationError::EmptyResult(request.label.clone()));
        Err(GenerationError::Exhausted {
            attempts: self.max_attempts,
            last: Box::new(last),
        })
    }

    async fn attempt<T>(&self, request: &ModelRequest, require_items: bool) -> Result<T, GenerationError>
    where
        T: DeserializeOwned + Validate,
    {
        let raw = self.inference.invoke(request).await?;
        let value: T = parse_structured(&raw)?;
        if require_items && Validate::is_empty(&value) {
            return Err(GenerationError::EmptyResult(request.label.clone()));
        }
        Ok(value)
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        if self.backoff.is_zero() {
            return Duration::ZERO;
        }
        let base = self.backoff * (attempt - 1);
        let jitter_ms = rand::rng().random_range(0..=self.backoff.as_millis() as u64);
        base + Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::testing::StubBackend;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Deserialize, PartialEq)]
    struct A {
        a: i64,
    }

    impl Validate for A {}

    #[derive(Debug, Deserialize)]
    struct Items {
        items: Vec<String>,
    }

    impl Validate for Items {
        fn is_empty(&self) -> bool {
            self.items.is_empty()
        }
    }

    #[test]
    fn parses_raw_json() {
        assert_eq!(parse_structured::<A>(r#"{"a":1}"#).unwrap(), A { a: 1 });
    }

    #[test]
    fn parses_fenced_json() {
        assert_eq!(parse_structured::<A>("```json\n{\"a\":1}\n```").unwrap(), A { a: 1 });
        assert_eq!(parse_structured::<A>("```\n{\"a\":2}\n```").unwrap(), A { a: 2 });
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let raw = r#"Here you go: {"a":1} Thanks!"#;
        assert_eq!(parse_structured::<A>(raw).unwrap(), A { a: 1 });
    }

    #[test]
    fn parses_nested_objects_first_to_last_brace() {
        let raw = r#"Sure! {"items": ["x"], "meta": {"n": 1}} hope that helps"#;
        let parsed: Items = parse_structured(raw).unwrap();
        assert_eq!(parsed.items, vec!["x".to_string()]);
    }

    #[test]
    fn fails_without_braces() {
        assert!(matches!(parse_structured::<A>("no json here"), Err(ParseError::NoJsonObject)));
        assert!(matches!(parse_structured::<A>("} backwards {"), Err(ParseError::NoJsonObject)));
    }

    #[test]
    fn fails_on_wrong_shape() {
        assert!(matches!(parse_structured::<A>(r#"{"b":1}"#), Err(ParseError::InvalidJson(_))));
        assert!(matches!(parse_structured::<A>("{not json}"), Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn range_check_rejects_outside_and_nan() {
        assert!(check_range("x", 0.0, 0.0, 1.0).is_ok());
        assert!(check_range("x", 1.0, 0.0, 1.0).is_ok());
        assert!(check_range("x", 1.01, 0.0, 1.0).is_err());
        assert!(check_range("x", f64::NAN, 0.0, 1.0).is_err());
    }

    fn request(label: &str) -> ModelRequest {
        ModelRequest {
            label: label.to_string(),
            model: "m".to_string(),
            prompt: "p".to_string(),
            system: "s".to_string(),
            temperature: None,
        }
    }

    fn client(backend: Arc<StubBackend>, attempts: u32) -> StructuredClient {
        StructuredClient::new(InferenceClient::new(backend), attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let backend = Arc::new(StubBackend::new(|_| Ok(r#"{"a":7}"#.to_string())));
        let value: A = client(backend.clone(), 3).request(&request("a"), false).await.unwrap();
        assert_eq!(value, A { a: 7 });
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn transport_and_parse_failures_are_retried() {
        let backend = Arc::new(StubBackend::sequence(vec![
            Err(InferenceError::Transport("reset".into())),
            Ok("garbage".to_string()),
            Ok(r#"{"a":3}"#.to_string()),
        ]));
        let value: A = client(backend.clone(), 3).request(&request("a"), false).await.unwrap();
        assert_eq!(value, A { a: 3 });
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn empty_result_is_retried_when_items_are_required() {
        let backend = Arc::new(StubBackend::sequence(vec![
            Ok(r#"{"items":[]}"#.to_string()),
            Ok(r#"{"items":["chess"]}"#.to_string()),
        ]));
        let value: Items = client(backend.clone(), 3).request(&request("items"), true).await.unwrap();
        assert_eq!(value.items, vec!["chess".to_string()]);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn empty_result_is_accepted_when_not_required() {
        let backend = Arc::new(StubBackend::new(|_| Ok(r#"{"items":[]}"#.to_string())));
        let value: Items = client(backend.clone(), 3).request(&request("items"), false).await.unwrap();
        assert!(value.items.is_empty());
    }

    #[tokio::test]
    async fn exhaustion_reports_last_failure() {
        let backend = Arc::new(StubBackend::new(|_| Ok(r#"{"items":[]}"#.to_string())));
        let err = client(backend.clone(), 2)
            .request::<Items>(&request("items"), true)
            .await
            .unwrap_err();
        assert_eq!(backend.call_count(), 2);
        match err {
            GenerationError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, GenerationError::EmptyResult(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let backend = Arc::new(StubBackend::new(|_| Ok(String::new())));
        let c = StructuredClient::new(InferenceClient::new(backend), 3, Duration::from_millis(100));
        let second = c.delay_before(2);
        let third = c.delay_before(3);
        assert!(second >= Duration::from_millis(100) && second <= Duration::from_millis(200));
        assert!(third >= Duration::from_millis(200) && third <= Duration::from_millis(300));
    }
}
