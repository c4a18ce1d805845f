//! Authenticated HTTP client for the ML server's REST API.
//!
//! # Design
//! `MlHttpClient` holds the base URL, the precomputed basic-auth header and
//! one transport handle, and carries no mutable state between calls. Every
//! operation has a pure `build_*` method that produces the `HttpRequest`
//! and an executing method that sends it. Tests assert on payloads through
//! the `build_*` side without any network.
//!
//! The generic verbs (`get`, `post`, `delete`) return the raw `HttpResponse`
//! or a `TransportError`. Resource helpers wrap every failure in a
//! `ClientError` naming the operation. Status codes are never interpreted
//! here; the caller asserts on them.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::decode;
use crate::error::{ClientError, ErrorCause, TransportError};
use crate::http::{
    HttpMethod, HttpRequest, HttpResponse, MultipartForm, RequestBody, APPLICATION_JSON,
    APPLICATION_OCTET_STREAM, AUTHORIZATION, CONTENT_TYPE,
};
use crate::payload::JsonPayload;
use crate::poller::ReadinessPoller;
use crate::transport::{Transport, UreqTransport};

const PROJECT_DESCRIPTION: &str = "Test Project";
const ANALYSIS_COMMENTS: &str = "Test Analysis";
const DATASET_DESCRIPTION: &str = "Sample dataset for Testing";
const DATA_FORMAT_CSV: &str = "CSV";
/// Filename sent with the empty file part of a DAS upload.
const DAS_PLACEHOLDER_FILENAME: &str = "empty.csv";

#[derive(Serialize)]
struct ConfigurationEntry<'a> {
    key: &'a str,
    value: &'a str,
}

/// Client for the ML REST API.
#[derive(Debug, Clone)]
pub struct MlHttpClient<T = UreqTransport> {
    base_url: String,
    auth_header: String,
    transport: T,
}

impl MlHttpClient<UreqTransport> {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> MlHttpClient<T> {
    pub fn with_transport(config: &ClientConfig, transport: T) -> Self {
        Self {
            base_url: config.endpoint.base_url(),
            auth_header: config.credentials.basic_auth_header(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The `Authorization` header value sent with every request.
    pub fn basic_auth_key(&self) -> &str {
        &self.auth_header
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Generic verbs
    // -----------------------------------------------------------------------

    fn request(&self, method: HttpMethod, path: &str, body: Option<RequestBody>) -> HttpRequest {
        let content_type = match &body {
            Some(RequestBody::Multipart(form)) => form.content_type(),
            _ => APPLICATION_JSON.to_string(),
        };
        HttpRequest {
            method,
            url: format!("{}{path}", self.base_url),
            headers: vec![
                (CONTENT_TYPE.to_string(), content_type),
                (AUTHORIZATION.to_string(), self.auth_header.clone()),
            ],
            body,
        }
    }

    pub fn build_get(&self, path: &str) -> HttpRequest {
        self.request(HttpMethod::Get, path, None)
    }

    pub fn build_post(&self, path: &str, body: Option<&str>) -> HttpRequest {
        let body = body.map(|json| RequestBody::Json(json.to_string()));
        self.request(HttpMethod::Post, path, body)
    }

    pub fn build_delete(&self, path: &str) -> HttpRequest {
        self.request(HttpMethod::Delete, path, None)
    }

    /// Send a prepared request.
    pub fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = request.method;
        let url = request.url.clone();
        match self.transport.execute(request) {
            Ok(response) => {
                debug!(%method, %url, status = response.status, "ml request");
                Ok(response)
            }
            Err(err) => {
                debug!(%method, %url, error = %err, "ml request failed");
                Err(err)
            }
        }
    }

    pub fn get(&self, path: &str) -> Result<HttpResponse, TransportError> {
        self.send(self.build_get(path))
    }

    pub fn post(&self, path: &str, body: Option<&str>) -> Result<HttpResponse, TransportError> {
        self.send(self.build_post(path, body))
    }

    pub fn post_without_body(&self, path: &str) -> Result<HttpResponse, TransportError> {
        self.post(path, None)
    }

    pub fn delete(&self, path: &str) -> Result<HttpResponse, TransportError> {
        self.send(self.build_delete(path))
    }

    /// Send `request`, attributing a transport failure to `operation`.
    fn perform(
        &self,
        request: HttpRequest,
        operation: impl FnOnce() -> String,
    ) -> Result<HttpResponse, ClientError> {
        self.send(request).map_err(|err| ClientError::new(operation(), err))
    }

    /// Like `perform`, for requests whose construction can fail.
    fn perform_built<E: Into<ErrorCause>>(
        &self,
        built: Result<HttpRequest, E>,
        operation: impl FnOnce() -> String,
    ) -> Result<HttpResponse, ClientError> {
        match built {
            Ok(request) => self.perform(request, operation),
            Err(err) => Err(ClientError::new(operation(), err)),
        }
    }

    fn json_post(&self, path: &str, payload: &impl Serialize) -> Result<HttpRequest, serde_json::Error> {
        let body = serde_json::to_string(payload)?;
        Ok(self.build_post(path, Some(&body)))
    }

    // -----------------------------------------------------------------------
    // Projects and analyses
    // -----------------------------------------------------------------------

    /// `name` or `dataset_name` left as `None` is omitted from the payload.
    pub fn build_create_project(
        &self,
        name: Option<&str>,
        dataset_name: Option<&str>,
    ) -> Result<HttpRequest, serde_json::Error> {
        let payload = JsonPayload::new()
            .optional("name", name)
            .field("description", PROJECT_DESCRIPTION)
            .optional("datasetName", dataset_name);
        self.json_post("/api/projects", &payload)
    }

    pub fn create_project(
        &self,
        name: Option<&str>,
        dataset_name: Option<&str>,
    ) -> Result<HttpResponse, ClientError> {
        self.perform_built(self.build_create_project(name, dataset_name), || {
            format!("failed to create project {}", name.unwrap_or("<unnamed>"))
        })
    }

    /// `name` or `project_id` left as `None` is omitted from the payload.
    pub fn build_create_analysis(
        &self,
        name: Option<&str>,
        project_id: Option<i64>,
    ) -> Result<HttpRequest, serde_json::Error> {
        let payload = JsonPayload::new()
            .optional("name", name)
            .field("comments", ANALYSIS_COMMENTS)
            .optional("projectId", project_id);
        self.json_post("/api/analyses", &payload)
    }

    pub fn create_analysis(
        &self,
        name: Option<&str>,
        project_id: Option<i64>,
    ) -> Result<HttpResponse, ClientError> {
        self.perform_built(self.build_create_analysis(name, project_id), || {
            let project = project_id.map_or_else(|| "<none>".to_string(), |id| id.to_string());
            format!(
                "failed to create analysis: {} in project: {project}",
                name.unwrap_or("<unnamed>")
            )
        })
    }

    pub fn build_set_feature_defaults(&self, analysis_id: i64) -> Result<HttpRequest, serde_json::Error> {
        let payload = JsonPayload::new()
            .field("include", true)
            .field("imputeOption", "DISCARD");
        self.json_post(&format!("/api/analyses/{analysis_id}/features/defaults"), &payload)
    }

    pub fn set_feature_defaults(&self, analysis_id: i64) -> Result<HttpResponse, ClientError> {
        self.perform_built(self.build_set_feature_defaults(analysis_id), || {
            format!("failed to set feature defaults to analysis: {analysis_id}")
        })
    }

    /// `customized_features` is sent verbatim.
    pub fn build_set_feature_customized(&self, analysis_id: i64, customized_features: &str) -> HttpRequest {
        self.build_post(
            &format!("/api/analyses/{analysis_id}/features"),
            Some(customized_features),
        )
    }

    pub fn set_feature_customized(
        &self,
        analysis_id: i64,
        customized_features: &str,
    ) -> Result<HttpResponse, ClientError> {
        let request = self.build_set_feature_customized(analysis_id, customized_features);
        self.perform(request, || {
            format!("failed to set customized features to analysis: {analysis_id}")
        })
    }

    /// Configurations are sent as `[{"key":..,"value":..}]` in slice order.
    pub fn build_set_model_configuration(
        &self,
        analysis_id: i64,
        configurations: &[(&str, &str)],
    ) -> Result<HttpRequest, serde_json::Error> {
        let entries: Vec<ConfigurationEntry<'_>> = configurations
            .iter()
            .map(|&(key, value)| ConfigurationEntry { key, value })
            .collect();
        self.json_post(&format!("/api/analyses/{analysis_id}/configurations"), &entries)
    }

    pub fn set_model_configuration(
        &self,
        analysis_id: i64,
        configurations: &[(&str, &str)],
    ) -> Result<HttpResponse, ClientError> {
        self.perform_built(self.build_set_model_configuration(analysis_id, configurations), || {
            format!("failed to set model configurations to analysis: {analysis_id}")
        })
    }

    // -----------------------------------------------------------------------
    // Models
    // -----------------------------------------------------------------------

    pub fn build_create_model(
        &self,
        analysis_id: i64,
        version_set_id: i64,
    ) -> Result<HttpRequest, serde_json::Error> {
        let payload = JsonPayload::new()
            .field("analysisId", analysis_id)
            .field("versionSetId", version_set_id);
        self.json_post("/api/models/", &payload)
    }

    pub fn create_model(&self, analysis_id: i64, version_set_id: i64) -> Result<HttpResponse, ClientError> {
        self.perform_built(self.build_create_model(analysis_id, version_set_id), || {
            format!(
                "failed to create a model in analysis: {analysis_id} using versionset: {version_set_id}"
            )
        })
    }

    pub fn build_create_file_model_storage(
        &self,
        model_id: i64,
        folder_name: &str,
    ) -> Result<HttpRequest, serde_json::Error> {
        let payload = JsonPayload::new()
            .field("type", "file")
            .field("location", folder_name);
        self.json_post(&format!("/api/models/{model_id}/storages"), &payload)
    }

    pub fn create_file_model_storage(
        &self,
        model_id: i64,
        folder_name: &str,
    ) -> Result<HttpResponse, ClientError> {
        self.perform_built(self.build_create_file_model_storage(model_id, folder_name), || {
            format!("failed to create file storage for model: {model_id}")
        })
    }

    /// Download a model serialized as PMML.
    pub fn export_as_pmml(&self, model_id: i64) -> Result<HttpResponse, ClientError> {
        self.get(&format!("/api/models/{model_id}/export?mode=pmml"))
            .map_err(|e| {
                ClientError::new(
                    format!("failed to download model as PMML for model [id] {model_id}"),
                    e,
                )
            })
    }

    pub fn build_predict_from_csv(
        &self,
        model_id: i64,
        file: Option<&Path>,
    ) -> Result<HttpRequest, std::io::Error> {
        let mut form = MultipartForm::new()
            .text("modelId", &model_id.to_string())
            .text("dataFormat", DATA_FORMAT_CSV);
        if let Some(path) = file {
            form = attach_file(form, path)?;
        }
        Ok(self.request(
            HttpMethod::Post,
            "/api/models/predict",
            Some(RequestBody::Multipart(form)),
        ))
    }

    pub fn predict_from_csv(&self, model_id: i64, file: Option<&Path>) -> Result<HttpResponse, ClientError> {
        self.perform_built(self.build_predict_from_csv(model_id, file), || {
            format!("failed to predict from csv {}", display_path(file))
        })
    }

    // -----------------------------------------------------------------------
    // Datasets
    // -----------------------------------------------------------------------

    /// Upload a CSV dataset. The file part is omitted when `file` is `None`.
    pub fn build_upload_dataset_from_csv(
        &self,
        dataset_name: Option<&str>,
        version: Option<&str>,
        file: Option<&Path>,
    ) -> Result<HttpRequest, std::io::Error> {
        let mut form = MultipartForm::new()
            .text("description", DATASET_DESCRIPTION)
            .text("sourceType", "file")
            .text("destination", "file")
            .text("dataFormat", DATA_FORMAT_CSV)
            .text("containsHeader", "true")
            .optional_text("datasetName", dataset_name)
            .optional_text("version", version);
        if let Some(path) = file {
            form = attach_file(form, path)?;
        }
        Ok(self.request(
            HttpMethod::Post,
            "/api/datasets/",
            Some(RequestBody::Multipart(form)),
        ))
    }

    pub fn upload_dataset_from_csv(
        &self,
        dataset_name: Option<&str>,
        version: Option<&str>,
        file: Option<&Path>,
    ) -> Result<HttpResponse, ClientError> {
        self.perform_built(self.build_upload_dataset_from_csv(dataset_name, version, file), || {
            format!("failed to upload dataset from csv {}", display_path(file))
        })
    }

    /// Register a dataset backed by a table of the external analytics store.
    pub fn build_upload_dataset_from_das(
        &self,
        dataset_name: Option<&str>,
        version: Option<&str>,
        table_name: &str,
    ) -> HttpRequest {
        let form = MultipartForm::new()
            .text("description", DATASET_DESCRIPTION)
            .text("sourceType", "das")
            .text("destination", "file")
            .text("dataFormat", DATA_FORMAT_CSV)
            .text("sourcePath", table_name)
            .optional_text("datasetName", dataset_name)
            .optional_text("version", version)
            .file("file", DAS_PLACEHOLDER_FILENAME, APPLICATION_OCTET_STREAM, Vec::new());
        self.request(
            HttpMethod::Post,
            "/api/datasets/",
            Some(RequestBody::Multipart(form)),
        )
    }

    pub fn upload_dataset_from_das(
        &self,
        dataset_name: Option<&str>,
        version: Option<&str>,
        table_name: &str,
    ) -> Result<HttpResponse, ClientError> {
        let request = self.build_upload_dataset_from_das(dataset_name, version, table_name);
        self.perform(request, || format!("failed to upload dataset from DAS {table_name}"))
    }

    /// Poll the sample of a version set until it exists or `timeout` elapses.
    ///
    /// Returns `Ok(true)` as soon as the sample endpoint answers anything but
    /// 404, `Ok(false)` on timeout.
    pub fn check_dataset_status(
        &self,
        version_set_id: i64,
        timeout: Duration,
        interval: Duration,
    ) -> Result<bool, ClientError> {
        let path = format!("/api/datasets/versions/{version_set_id}/sample");
        ReadinessPoller::new(timeout, interval)
            .poll(|| self.get(&path).map(|response| response.status))
            .map_err(|e| {
                ClientError::new(
                    format!("failed to check status of version set: {version_set_id}"),
                    e,
                )
            })
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    fn fetch_integer(&self, path: &str, field: &str, operation: impl FnOnce() -> String) -> Result<i64, ClientError> {
        self.get(path)
            .map_err(ErrorCause::from)
            .and_then(|response| decode::extract_integer_field(response, field).map_err(ErrorCause::from))
            .map_err(|cause| ClientError::new(operation(), cause))
    }

    pub fn get_project_id(&self, project_name: &str) -> Result<i64, ClientError> {
        self.fetch_integer(&format!("/api/projects/{project_name}"), "id", || {
            format!("failed to get ID of project: {project_name}")
        })
    }

    pub fn get_analysis_id(&self, project_id: i64, analysis_name: &str) -> Result<i64, ClientError> {
        self.fetch_integer(
            &format!("/api/projects/{project_id}/analyses/{analysis_name}"),
            "id",
            || format!("failed to get ID of analysis: {analysis_name}"),
        )
    }

    /// ID of the first version set listed for the dataset.
    pub fn get_a_version_set_id_of_dataset(&self, dataset_id: i64) -> Result<i64, ClientError> {
        self.fetch_integer(&format!("/api/datasets/{dataset_id}/versions"), "id", || {
            format!("failed to get a version set ID of dataset: {dataset_id}")
        })
    }

    pub fn get_version_set_id_of_dataset(&self, dataset_id: i64, version: &str) -> Result<i64, ClientError> {
        self.fetch_integer(
            &format!("/api/datasets/{dataset_id}/versions/{version}"),
            "id",
            || format!("failed to get version set {version} of dataset: {dataset_id}"),
        )
    }

    pub fn get_model_id(&self, model_name: &str) -> Result<i64, ClientError> {
        self.fetch_integer(&format!("/api/models/{model_name}"), "id", || {
            format!("failed to get ID of model: {model_name}")
        })
    }

    // -----------------------------------------------------------------------
    // Response decoding
    // -----------------------------------------------------------------------

    pub fn get_model_name(&self, response: HttpResponse) -> Result<String, ClientError> {
        decode::extract_string_field(response, "name")
            .map_err(|e| ClientError::new("failed to get the name of model", e))
    }

    pub fn response_as_string(&self, response: HttpResponse) -> Result<String, ClientError> {
        decode::response_as_string(response)
            .map_err(|e| ClientError::new("failed to extract the response body", e))
    }

    pub fn response_as_json_object(&self, response: HttpResponse) -> Result<serde_json::Value, ClientError> {
        decode::response_as_json_object(response)
            .map_err(|e| ClientError::new("failed to extract the response body", e))
    }
}

fn attach_file(form: MultipartForm, path: &Path) -> Result<MultipartForm, std::io::Error> {
    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data.csv".to_string());
    Ok(form.file("file", &filename, APPLICATION_OCTET_STREAM, bytes))
}

fn display_path(file: Option<&Path>) -> String {
    file.map_or_else(|| "<none>".to_string(), |path| path.display().to_string())
}
