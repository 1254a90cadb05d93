/// Tests for payload recognition and the invocation responses.
use super::invoke::{
    decode_s3_key, handle_payload, handle_request, parse_payload, GenerateRequest, Invocation,
    InvokeError,
};
use crate::config::Config;
use crate::state::AppState;
use crate::storage::{MemoryStore, PutObject};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;

const BUCKET: &str = "portfolio";

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::new_rgb8(width, height);
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn state_with(default_bucket: Option<&str>) -> (Arc<MemoryStore>, AppState) {
    let store = Arc::new(MemoryStore::new());
    let config = Config {
        bucket: default_bucket.map(str::to_string),
        ..Config::default()
    };
    let state = AppState::new(config, store.clone());
    (store, state)
}

fn seed(store: &MemoryStore, key: &str) {
    store.insert(
        BUCKET,
        key,
        PutObject {
            body: png(640, 480),
            content_type: "image/png".to_string(),
            cache_control: None,
        },
    );
}

fn s3_record(bucket: &str, key: &str) -> Value {
    json!({
        "eventVersion": "2.1",
        "eventSource": "aws:s3",
        "awsRegion": "us-east-1",
        "eventTime": "2024-03-14T10:15:30.000Z",
        "eventName": "ObjectCreated:Put",
        "userIdentity": { "principalId": "AWS:AIDAEXAMPLE" },
        "requestParameters": { "sourceIPAddress": "127.0.0.1" },
        "responseElements": {
            "x-amz-request-id": "C3D13FE58DE4C810",
            "x-amz-id-2": "FMyUVURIY8/IgAtTv8xRjskZQpcIZ9KG4V5Wp6S7S/JRWeUWerMUE5JgHvANOjpD"
        },
        "s3": {
            "s3SchemaVersion": "1.0",
            "configurationId": "thumbnail-trigger",
            "bucket": {
                "name": bucket,
                "ownerIdentity": { "principalId": "A3NL1KOZZKExample" },
                "arn": format!("arn:aws:s3:::{}", bucket)
            },
            "object": {
                "key": key,
                "size": 1024,
                "eTag": "d41d8cd98f00b204e9800998ecf8427e",
                "sequencer": "0055AED6DCD90281E5"
            }
        }
    })
}

// ── payload recognition ──

#[test]
fn test_direct_payload() {
    let parsed = parse_payload(json!({ "objectKey": "a/b.jpg", "bucket": "other" })).unwrap();
    assert_eq!(
        parsed,
        Invocation::Single(GenerateRequest {
            object_key: "a/b.jpg".to_string(),
            bucket: Some("other".to_string()),
        })
    );
}

#[test]
fn test_bucket_name_alias() {
    let parsed = parse_payload(json!({ "objectKey": "a.jpg", "bucketName": "legacy" })).unwrap();
    let Invocation::Single(request) = parsed else {
        panic!("expected a single request");
    };
    assert_eq!(request.bucket.as_deref(), Some("legacy"));
}

#[test]
fn test_arguments_payload() {
    let parsed = parse_payload(json!({ "arguments": { "objectKey": "gallery/x.png" } })).unwrap();
    assert_eq!(
        parsed,
        Invocation::Single(GenerateRequest {
            object_key: "gallery/x.png".to_string(),
            bucket: None,
        })
    );
}

#[test]
fn test_body_payload_as_string_and_object() {
    let from_string =
        parse_payload(json!({ "body": "{\"objectKey\":\"p/q.webp\"}" })).unwrap();
    let from_object = parse_payload(json!({ "body": { "objectKey": "p/q.webp" } })).unwrap();
    assert_eq!(from_string, from_object);
}

#[test]
fn test_s3_notification_decodes_keys() {
    let payload = json!({
        "Records": [
            s3_record(BUCKET, "vacation/my+beach%281%29.png"),
            s3_record("second", "plain.jpg"),
        ]
    });
    let Invocation::Batch(requests) = parse_payload(payload).unwrap() else {
        panic!("expected a batch");
    };
    let requests: Vec<GenerateRequest> = requests.into_iter().map(Result::unwrap).collect();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].object_key, "vacation/my beach(1).png");
    assert_eq!(requests[0].bucket.as_deref(), Some(BUCKET));
    assert_eq!(requests[1].object_key, "plain.jpg");
    assert_eq!(requests[1].bucket.as_deref(), Some("second"));
}

#[test]
fn test_s3_notification_keeps_undecodable_key() {
    let payload = json!({ "Records": [s3_record(BUCKET, "bad%FF%FE.png")] });
    let Invocation::Batch(records) = parse_payload(payload).unwrap() else {
        panic!("expected a batch");
    };
    assert_eq!(records, vec![Err("bad%FF%FE.png".to_string())]);
}

#[test]
fn test_decode_s3_key() {
    assert_eq!(decode_s3_key("a+b%2Bc.jpg").unwrap(), "a b+c.jpg");
    assert_eq!(decode_s3_key("%E2%9C%93.png").unwrap(), "\u{2713}.png");
    assert!(decode_s3_key("%C3%28.png").is_err());
}

#[test]
fn test_unrecognized_payloads() {
    for payload in [
        json!("objectKey"),
        json!({ "key": "a.jpg" }),
        json!({ "body": "not json" }),
        json!({ "arguments": {} }),
    ] {
        let err = parse_payload(payload).unwrap_err();
        assert!(matches!(err, InvokeError::Payload(_)), "{:?}", err);
    }
}

// ── handling ──

#[tokio::test]
async fn test_generated_response_shape() {
    let (store, state) = state_with(Some(BUCKET));
    seed(&store, "vacation/beach.png");

    let value = handle_payload(&state, json!({ "objectKey": "vacation/beach.png" }))
        .await
        .unwrap();

    assert_eq!(value["success"], json!(true));
    assert_eq!(value["message"], json!("Thumbnail generated successfully"));
    assert_eq!(value["originalKey"], json!("vacation/beach.png"));
    assert_eq!(value["thumbnailKey"], json!("vacation/beach_thumb.png"));
    assert!(value["thumbnailSize"].as_u64().unwrap() > 0);
    assert!(value.get("skipped").is_none());
    assert!(value.get("error").is_none());
    assert!(store.contains(BUCKET, "vacation/beach_thumb.png"));
}

#[tokio::test]
async fn test_thumbnail_key_is_skipped() {
    let (store, state) = state_with(Some(BUCKET));

    let value = handle_payload(&state, json!({ "objectKey": "vacation/beach_thumb.png" }))
        .await
        .unwrap();

    assert_eq!(value["success"], json!(true));
    assert_eq!(value["skipped"], json!(true));
    assert_eq!(value["originalKey"], json!("vacation/beach_thumb.png"));
    assert_eq!(store.calls().gets, 0);
    assert_eq!(store.calls().puts, 0);
}

#[tokio::test]
async fn test_failure_is_reported_in_band() {
    let (_store, state) = state_with(Some(BUCKET));

    let value = handle_payload(&state, json!({ "objectKey": "missing/photo.jpg" }))
        .await
        .unwrap();

    assert_eq!(value["success"], json!(false));
    assert_eq!(value["originalKey"], json!("missing/photo.jpg"));
    assert!(value["error"].as_str().unwrap().contains("missing/photo.jpg"));
    assert!(value.get("thumbnailKey").is_none());
    assert!(value.get("retryable").is_none());
}

#[tokio::test]
async fn test_missing_bucket_without_default_is_in_band() {
    let (store, state) = state_with(None);

    let response = handle_request(
        &state,
        &GenerateRequest {
            object_key: "a.png".to_string(),
            bucket: None,
        },
    )
    .await;

    assert!(!response.success);
    assert!(response.error.unwrap().contains("bucket"));
    assert_eq!(store.calls().gets, 0);
}

#[tokio::test]
async fn test_request_bucket_overrides_default() {
    let (store, state) = state_with(Some("elsewhere"));
    seed(&store, "a.png");

    let response = handle_request(
        &state,
        &GenerateRequest {
            object_key: "a.png".to_string(),
            bucket: Some(BUCKET.to_string()),
        },
    )
    .await;

    assert!(response.success, "{:?}", response);
    assert!(store.contains(BUCKET, "a_thumb.png"));
}

#[tokio::test]
async fn test_s3_batch_processes_every_record() {
    let (store, state) = state_with(None);
    seed(&store, "one.png");
    seed(&store, "two words.png");

    let payload = json!({
        "Records": [
            s3_record(BUCKET, "one.png"),
            s3_record(BUCKET, "two+words.png"),
            s3_record(BUCKET, "one_thumb.png"),
            s3_record(BUCKET, "gone.png"),
        ]
    });
    let value = handle_payload(&state, payload).await.unwrap();
    let results = value["results"].as_array().unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(results[0]["success"], json!(true));
    assert_eq!(results[1]["thumbnailKey"], json!("two words_thumb.png"));
    assert_eq!(results[2]["skipped"], json!(true));
    assert_eq!(results[3]["success"], json!(false));
    assert!(store.contains(BUCKET, "one_thumb.png"));
    assert!(store.contains(BUCKET, "two words_thumb.png"));
}

#[tokio::test]
async fn test_s3_batch_with_retryable_failure_fails_invocation() {
    let (store, state) = state_with(None);
    seed(&store, "up/photo.png");
    seed(&store, "up/other.png");
    store.set_fail_puts(true);

    let payload = json!({
        "Records": [
            s3_record(BUCKET, "up/photo.png"),
            s3_record(BUCKET, "up/other.png"),
            s3_record(BUCKET, "up/gone.png"),
        ]
    });
    let err = handle_payload(&state, payload).await.unwrap_err();

    let InvokeError::Retryable { failed, total, first } = &err else {
        panic!("expected a retryable invocation error, got {:?}", err);
    };
    assert_eq!((*failed, *total), (2, 3));
    assert!(first.contains("up/photo_thumb.png"), "{}", first);
    assert_eq!(store.calls().puts, 2, "every record is attempted before failing");

    // Redelivery after the store recovers succeeds.
    store.set_fail_puts(false);
    let payload = json!({ "Records": [s3_record(BUCKET, "up/photo.png")] });
    let value = handle_payload(&state, payload).await.unwrap();
    assert_eq!(value["results"][0]["success"], json!(true));
    assert!(store.contains(BUCKET, "up/photo_thumb.png"));
}

#[tokio::test]
async fn test_direct_retryable_failure_stays_in_band() {
    let (store, state) = state_with(Some(BUCKET));
    seed(&store, "up/photo.png");
    store.set_fail_puts(true);

    let value = handle_payload(&state, json!({ "objectKey": "up/photo.png" }))
        .await
        .unwrap();

    assert_eq!(value["success"], json!(false));
    assert_eq!(value["retryable"], json!(true));
}

#[tokio::test]
async fn test_undecodable_key_is_reported_in_band() {
    let (store, state) = state_with(None);

    let payload = json!({ "Records": [s3_record(BUCKET, "bad%FF.png")] });
    let value = handle_payload(&state, payload).await.unwrap();
    let result = &value["results"][0];

    assert_eq!(result["success"], json!(false));
    assert_eq!(result["originalKey"], json!("bad%FF.png"));
    assert!(result["error"].as_str().unwrap().contains("percent-encoded"));
    assert!(result.get("retryable").is_none());
    assert_eq!(store.calls().gets, 0);
}

#[tokio::test]
async fn test_unparseable_payload_fails_invocation() {
    let (_store, state) = state_with(Some(BUCKET));
    let err = handle_payload(&state, json!([1, 2, 3])).await.unwrap_err();
    assert!(err.to_string().contains("unrecognized payload"));
}
