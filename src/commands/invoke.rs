use aws_lambda_events::event::s3::S3Event;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::generator::GenerateOutcome;
use crate::state::AppState;

/// One "make a thumbnail for this key" request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub object_key: String,
    #[serde(default, alias = "bucketName")]
    pub bucket: Option<String>,
}

/// Result of one request. Generation failures are reported here with
/// `success: false`. `retryable` marks failures worth another attempt;
/// an S3 notification carrying one fails the whole invocation so the
/// platform redelivers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    pub message: String,
    pub original_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<InvocationResponse>,
}

/// Requests extracted from a payload. S3 notifications may carry several
/// records; a record whose key does not decode is kept as its raw key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Single(GenerateRequest),
    Batch(Vec<Result<GenerateRequest, String>>),
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("unrecognized payload: {0}")]
    Payload(String),
    #[error("cannot encode response: {0}")]
    Response(#[from] serde_json::Error),
    #[error("{failed} of {total} record(s) failed with a retryable error: {first}")]
    Retryable {
        failed: usize,
        total: usize,
        first: String,
    },
}

/// Decode an S3 notification key: `+` is a space, the rest is percent-encoded.
pub fn decode_s3_key(raw: &str) -> Result<String, std::str::Utf8Error> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
}

/// Recognize the payload shapes the function is invoked with: an S3
/// notification, a GraphQL resolver call (`arguments`), an API gateway call
/// (`body`, string or object), or a bare request.
pub fn parse_payload(payload: Value) -> Result<Invocation, InvokeError> {
    let bad = |e: serde_json::Error| InvokeError::Payload(e.to_string());

    let Value::Object(mut map) = payload else {
        return Err(InvokeError::Payload("expected a JSON object".to_string()));
    };

    if map.contains_key("Records") {
        let event: S3Event = serde_json::from_value(Value::Object(map)).map_err(bad)?;
        let requests = event
            .records
            .into_iter()
            .filter_map(|record| {
                let raw = record.s3.object.key?;
                Some(
                    decode_s3_key(&raw)
                        .map(|object_key| GenerateRequest {
                            object_key,
                            bucket: record.s3.bucket.name,
                        })
                        .map_err(|_| raw),
                )
            })
            .collect();
        return Ok(Invocation::Batch(requests));
    }

    if let Some(arguments) = map.remove("arguments") {
        return serde_json::from_value(arguments)
            .map(Invocation::Single)
            .map_err(bad);
    }

    if let Some(body) = map.remove("body") {
        return match body {
            Value::String(text) => serde_json::from_str(&text),
            other => serde_json::from_value(other),
        }
        .map(Invocation::Single)
        .map_err(bad);
    }

    serde_json::from_value(Value::Object(map))
        .map(Invocation::Single)
        .map_err(bad)
}

/// Generate the thumbnail for one request and describe the result.
pub async fn handle_request(state: &AppState, request: &GenerateRequest) -> InvocationResponse {
    let key = request.object_key.as_str();
    let Some(bucket) = state.bucket_for(request.bucket.as_deref()) else {
        tracing::warn!("invoke: no bucket for {} and no default configured", key);
        return failure(key, "no bucket in request and no default bucket configured", false);
    };
    tracing::info!("invoke: processing {}/{}", bucket, key);

    match state.generator.generate(bucket, key).await {
        Ok(GenerateOutcome::Generated {
            thumbnail_key,
            thumbnail_size,
            ..
        }) => InvocationResponse {
            success: true,
            skipped: false,
            message: "Thumbnail generated successfully".to_string(),
            original_key: key.to_string(),
            thumbnail_key: Some(thumbnail_key),
            thumbnail_size: Some(thumbnail_size),
            error: None,
            retryable: false,
        },
        Ok(GenerateOutcome::Skipped { .. }) => InvocationResponse {
            success: true,
            skipped: true,
            message: "Skipped thumbnail file".to_string(),
            original_key: key.to_string(),
            thumbnail_key: None,
            thumbnail_size: None,
            error: None,
            retryable: false,
        },
        Err(e) => {
            tracing::warn!("invoke: thumbnail generation failed for {}: {}", key, e);
            failure(key, &e.to_string(), e.is_retryable())
        }
    }
}

fn failure(key: &str, error: &str, retryable: bool) -> InvocationResponse {
    InvocationResponse {
        success: false,
        skipped: false,
        message: "Original upload successful, thumbnail generation failed".to_string(),
        original_key: key.to_string(),
        thumbnail_key: None,
        thumbnail_size: None,
        error: Some(error.to_string()),
        retryable,
    }
}

/// Entry point for raw invocation payloads.
///
/// Direct calls always answer in-band. An S3 notification is answered
/// in-band unless a record failed with a retryable error; then the
/// invocation fails and the platform redelivers the event. Every record
/// has been attempted by then, and regenerating an existing thumbnail
/// rewrites identical bytes.
pub async fn handle_payload(state: &AppState, payload: Value) -> Result<Value, InvokeError> {
    let value = match parse_payload(payload)? {
        Invocation::Single(request) => serde_json::to_value(handle_request(state, &request).await)?,
        Invocation::Batch(records) => {
            tracing::info!("invoke: {} record(s) in notification", records.len());
            let mut results = Vec::with_capacity(records.len());
            for record in &records {
                let response = match record {
                    Ok(request) => handle_request(state, request).await,
                    Err(raw) => {
                        tracing::warn!("invoke: undecodable object key {:?}", raw);
                        failure(raw, "object key is not valid percent-encoded UTF-8", false)
                    }
                };
                results.push(response);
            }

            let retryable: Vec<&InvocationResponse> =
                results.iter().filter(|r| r.retryable).collect();
            if let Some(first) = retryable.first() {
                let err = InvokeError::Retryable {
                    failed: retryable.len(),
                    total: results.len(),
                    first: first.error.clone().unwrap_or_default(),
                };
                tracing::warn!("invoke: failing notification for redelivery: {}", err);
                return Err(err);
            }
            serde_json::to_value(BatchResponse { results })?
        }
    };
    Ok(value)
}
