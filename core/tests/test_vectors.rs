//! Verify request building and response decoding against JSON test vectors
//! stored in `test-vectors/`.
//!
//! Request bodies are compared as raw strings, not parsed JSON: field order
//! and the absence of omitted keys are both part of what is being checked.

use ml_client::decode::{extract_integer_field, response_as_string};
use ml_client::{ClientConfig, Credentials, DecodeError, Endpoint, HttpMethod, HttpResponse, MlHttpClient};

const BASE_URL: &str = "https://localhost:9443";

fn client() -> MlHttpClient {
    MlHttpClient::new(&ClientConfig::new(
        Endpoint::https("localhost", 9443),
        Credentials::new("admin", "admin"),
    ))
}

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn response(body: &str) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: Vec::new(),
        body: body.to_string(),
    }
}

fn check_request(name: &str, req: &ml_client::HttpRequest, expected: &serde_json::Value) {
    assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
    assert_eq!(req.url, format!("{BASE_URL}{}", expected["path"].as_str().unwrap()), "{name}: url");
    assert_eq!(req.header("Content-Type"), Some("application/json"), "{name}: content type");
    assert_eq!(req.header("Authorization"), Some("Basic YWRtaW46YWRtaW4="), "{name}: auth");
    assert_eq!(req.json_body(), expected["body"].as_str(), "{name}: body");
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[test]
fn project_test_vectors() {
    let raw = include_str!("../../test-vectors/projects.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let input = &case["input"];
        let req = c
            .build_create_project(input["name"].as_str(), input["datasetName"].as_str())
            .unwrap();
        check_request(name, &req, &case["expected_request"]);
    }
}

// ---------------------------------------------------------------------------
// Analyses
// ---------------------------------------------------------------------------

#[test]
fn analysis_test_vectors() {
    let raw = include_str!("../../test-vectors/analyses.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let input = &case["input"];
        let req = c
            .build_create_analysis(input["name"].as_str(), input["projectId"].as_i64())
            .unwrap();
        check_request(name, &req, &case["expected_request"]);
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[test]
fn decode_test_vectors() {
    let raw = include_str!("../../test-vectors/decode.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let body = case["body"].as_str().unwrap();

        let as_string = response_as_string(response(body));
        match case["as_string"].as_str() {
            Some(expected) => assert_eq!(as_string.unwrap(), expected, "{name}: as string"),
            None => assert!(as_string.is_err(), "{name}: as string should fail"),
        }

        let id = extract_integer_field(response(body), "id");
        match (case["error"].as_str(), case["id"].as_i64()) {
            (None, Some(expected)) => assert_eq!(id.unwrap(), expected, "{name}: id"),
            (Some("empty"), _) => assert!(matches!(id, Err(DecodeError::EmptyBody)), "{name}"),
            (Some("malformed"), _) => assert!(matches!(id, Err(DecodeError::Malformed(_))), "{name}"),
            (Some("empty_array"), _) => assert!(matches!(id, Err(DecodeError::EmptyArray)), "{name}"),
            other => panic!("{name}: bad vector {other:?}"),
        }
    }
}
