//! Blocking client for the ML server's REST API, used by integration tests.
//!
//! # Overview
//! `MlHttpClient` turns high-level intents ("create a project named P over
//! dataset D") into authenticated requests, sends them through an owned
//! `Transport`, and hands back raw responses for the caller to assert on.
//! `ReadinessPoller` waits for asynchronous server-side work such as dataset
//! ingestion to become observable.
//!
//! # Design
//! - Each operation has a pure `build_*` half returning an `HttpRequest`, so
//!   payloads are testable without a server.
//! - Request bodies are built with `JsonPayload` and serialized by
//!   `serde_json`; absent optional fields are omitted, never `null`.
//! - Transport and decode failures surface as `TransportError` and
//!   `DecodeError`, wrapped in `ClientError` by the resource helpers.
//! - Everything is synchronous; a client issues one request at a time and
//!   shares no mutable state with other clients.

pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod http;
pub mod payload;
pub mod poller;
pub mod transport;

pub use client::MlHttpClient;
pub use config::{ClientConfig, Credentials, Endpoint, Scheme};
pub use decode::Parsed;
pub use error::{ClientError, ConfigError, DecodeError, ErrorCause, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, MultipartForm, Part, RequestBody};
pub use payload::JsonPayload;
pub use poller::{Clock, ManualClock, PollOutcome, ReadinessPoller, SystemClock};
pub use transport::{Transport, UreqTransport};
