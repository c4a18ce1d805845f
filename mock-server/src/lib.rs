use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;

/// Behaviour knobs for the mock ML server.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub username: String,
    pub password: String,
    /// Number of sample requests per version set answered with 404 before
    /// the sample becomes available.
    pub sample_ready_after: u32,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
            sample_ready_after: 2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSet {
    pub id: i64,
    pub dataset_id: i64,
    pub version: String,
    #[serde(skip)]
    pub sample_checks: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub dataset_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: i64,
    pub name: String,
    pub project_id: i64,
    #[serde(skip)]
    pub feature_defaults: Option<Value>,
    #[serde(skip)]
    pub customized_features: Option<Value>,
    #[serde(skip)]
    pub configurations: Vec<ConfigEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Storage {
    #[serde(rename = "type")]
    pub kind: String,
    pub location: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: i64,
    pub name: String,
    pub analysis_id: i64,
    pub version_set_id: i64,
    #[serde(skip)]
    pub storage: Option<Storage>,
}

#[derive(Debug, Default)]
pub struct Store {
    pub datasets: Vec<Dataset>,
    pub version_sets: Vec<VersionSet>,
    pub projects: Vec<Project>,
    pub analyses: Vec<Analysis>,
    pub models: Vec<Model>,
}

impl Store {
    fn dataset_id_or_insert(&mut self, name: &str) -> i64 {
        if let Some(dataset) = self.datasets.iter().find(|d| d.name == name) {
            return dataset.id;
        }
        let id = self.datasets.len() as i64 + 1;
        self.datasets.push(Dataset {
            id,
            name: name.to_string(),
        });
        id
    }

    fn analysis_mut(&mut self, id: i64) -> Option<&mut Analysis> {
        self.analyses.iter_mut().find(|a| a.id == id)
    }
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
struct AppState {
    config: Arc<MockConfig>,
    db: Db,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProject {
    name: Option<String>,
    dataset_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAnalysis {
    name: Option<String>,
    project_id: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateModel {
    analysis_id: i64,
    version_set_id: i64,
}

#[derive(Deserialize)]
struct ExportQuery {
    mode: Option<String>,
}

pub fn app(config: MockConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
        db: Db::default(),
    };
    Router::new()
        .route("/api/datasets/", post(upload_dataset))
        .route("/api/datasets/{dataset}/versions", get(list_versions))
        .route("/api/datasets/{dataset}/versions/{version}", get(get_version))
        .route("/api/datasets/versions/{version_set}/sample", get(get_sample))
        .route("/api/projects", post(create_project))
        .route("/api/projects/{project}", get(get_project))
        .route("/api/projects/{project}/analyses/{analysis}", get(get_analysis))
        .route("/api/analyses", post(create_analysis))
        .route("/api/analyses/{analysis}/features", post(set_customized_features))
        .route("/api/analyses/{analysis}/features/defaults", post(set_feature_defaults))
        .route("/api/analyses/{analysis}/configurations", post(set_configurations))
        .route("/api/models/", post(create_model))
        .route("/api/models/predict", post(predict))
        .route("/api/models/{model}", get(get_model))
        .route("/api/models/{model}/storages", post(create_storage))
        .route("/api/models/{model}/export", get(export_model))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_basic_auth))
        .with_state(state)
}

pub async fn run(listener: TcpListener, config: MockConfig) -> Result<(), std::io::Error> {
    axum::serve(listener, app(config)).await
}

/// Split a `Basic` authorization header into username and password.
pub fn decode_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

async fn require_basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(decode_basic_auth)
        .is_some_and(|(username, password)| {
            username == state.config.username && password == state.config.password
        });
    if !authorized {
        debug!(uri = %request.uri(), "rejected unauthenticated request");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    next.run(request).await
}

/// Text fields and the optional `file` part of a multipart body.
async fn read_form(
    mut multipart: Multipart,
) -> Result<(HashMap<String, String>, Option<Vec<u8>>), StatusCode> {
    let mut fields = HashMap::new();
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        if name == "file" {
            file = Some(data.to_vec());
        } else {
            fields.insert(name, String::from_utf8_lossy(&data).into_owned());
        }
    }
    Ok((fields, file))
}

// --- datasets ---

async fn upload_dataset(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, StatusCode> {
    let (fields, file) = read_form(multipart).await?;
    let (Some(dataset_name), Some(version)) = (fields.get("datasetName"), fields.get("version"))
    else {
        return Err(StatusCode::BAD_REQUEST);
    };
    match fields.get("sourceType").map(String::as_str) {
        Some("file") if file.as_ref().is_some_and(|bytes| !bytes.is_empty()) => {}
        Some("das") if fields.contains_key("sourcePath") => {}
        _ => return Err(StatusCode::BAD_REQUEST),
    }

    let mut db = state.db.write().await;
    let dataset_id = db.dataset_id_or_insert(dataset_name);
    let version_set_id = db.version_sets.len() as i64 + 1;
    db.version_sets.push(VersionSet {
        id: version_set_id,
        dataset_id,
        version: version.clone(),
        sample_checks: 0,
    });
    debug!(dataset_id, version_set_id, "dataset uploaded");
    Ok(Json(json!({ "id": dataset_id, "versionSetId": version_set_id })))
}

async fn list_versions(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
) -> Result<Json<Vec<VersionSet>>, StatusCode> {
    let db = state.db.read().await;
    if !db.datasets.iter().any(|d| d.id == dataset_id) {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(
        db.version_sets
            .iter()
            .filter(|v| v.dataset_id == dataset_id)
            .cloned()
            .collect(),
    ))
}

async fn get_version(
    State(state): State<AppState>,
    Path((dataset_id, version)): Path<(i64, String)>,
) -> Result<Json<VersionSet>, StatusCode> {
    let db = state.db.read().await;
    db.version_sets
        .iter()
        .find(|v| v.dataset_id == dataset_id && v.version == version)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// 404 until the version set has been asked for `sample_ready_after` times.
async fn get_sample(
    State(state): State<AppState>,
    Path(version_set_id): Path<i64>,
) -> Result<Json<Value>, StatusCode> {
    let mut db = state.db.write().await;
    let version_set = db
        .version_sets
        .iter_mut()
        .find(|v| v.id == version_set_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    version_set.sample_checks += 1;
    if version_set.sample_checks <= state.config.sample_ready_after {
        debug!(version_set_id, checks = version_set.sample_checks, "sample not ready");
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({ "versionSetId": version_set_id, "ready": true })))
}

// --- projects ---

async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProject>,
) -> Result<Json<Project>, StatusCode> {
    let (Some(name), Some(dataset_name)) = (input.name, input.dataset_name) else {
        return Err(StatusCode::BAD_REQUEST);
    };
    // Duplicate names are accepted, as the real server does.
    let mut db = state.db.write().await;
    let project = Project {
        id: db.projects.len() as i64 + 1,
        name,
        dataset_name,
    };
    db.projects.push(project.clone());
    Ok(Json(project))
}

async fn get_project(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Project>, StatusCode> {
    let db = state.db.read().await;
    db.projects
        .iter()
        .rev()
        .find(|p| p.name == name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

// --- analyses ---

async fn create_analysis(
    State(state): State<AppState>,
    Json(input): Json<CreateAnalysis>,
) -> Result<Json<Analysis>, StatusCode> {
    let (Some(name), Some(project_id)) = (input.name, input.project_id) else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let mut db = state.db.write().await;
    if !db.projects.iter().any(|p| p.id == project_id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let analysis = Analysis {
        id: db.analyses.len() as i64 + 1,
        name,
        project_id,
        feature_defaults: None,
        customized_features: None,
        configurations: Vec::new(),
    };
    db.analyses.push(analysis.clone());
    Ok(Json(analysis))
}

async fn get_analysis(
    State(state): State<AppState>,
    Path((project_id, name)): Path<(i64, String)>,
) -> Result<Json<Analysis>, StatusCode> {
    let db = state.db.read().await;
    db.analyses
        .iter()
        .find(|a| a.project_id == project_id && a.name == name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn set_feature_defaults(
    State(state): State<AppState>,
    Path(analysis_id): Path<i64>,
    Json(defaults): Json<Value>,
) -> StatusCode {
    let mut db = state.db.write().await;
    match db.analysis_mut(analysis_id) {
        Some(analysis) => {
            analysis.feature_defaults = Some(defaults);
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn set_customized_features(
    State(state): State<AppState>,
    Path(analysis_id): Path<i64>,
    Json(features): Json<Value>,
) -> StatusCode {
    if !features.is_array() {
        return StatusCode::BAD_REQUEST;
    }
    let mut db = state.db.write().await;
    match db.analysis_mut(analysis_id) {
        Some(analysis) => {
            analysis.customized_features = Some(features);
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn set_configurations(
    State(state): State<AppState>,
    Path(analysis_id): Path<i64>,
    Json(entries): Json<Vec<ConfigEntry>>,
) -> StatusCode {
    let mut db = state.db.write().await;
    match db.analysis_mut(analysis_id) {
        Some(analysis) => {
            analysis.configurations.extend(entries);
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

// --- models ---

async fn create_model(
    State(state): State<AppState>,
    Json(input): Json<CreateModel>,
) -> Result<Json<Model>, StatusCode> {
    let mut db = state.db.write().await;
    let analysis_name = db
        .analyses
        .iter()
        .find(|a| a.id == input.analysis_id)
        .map(|a| a.name.clone())
        .ok_or(StatusCode::NOT_FOUND)?;
    if !db.version_sets.iter().any(|v| v.id == input.version_set_id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let id = db.models.len() as i64 + 1;
    let model = Model {
        id,
        name: format!("{analysis_name}.Model.{id}"),
        analysis_id: input.analysis_id,
        version_set_id: input.version_set_id,
        storage: None,
    };
    db.models.push(model.clone());
    Ok(Json(model))
}

async fn get_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Model>, StatusCode> {
    let db = state.db.read().await;
    db.models
        .iter()
        .find(|m| m.name == name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_storage(
    State(state): State<AppState>,
    Path(model_id): Path<i64>,
    Json(storage): Json<Storage>,
) -> StatusCode {
    if storage.kind != "file" {
        return StatusCode::BAD_REQUEST;
    }
    let mut db = state.db.write().await;
    match db.models.iter_mut().find(|m| m.id == model_id) {
        Some(model) => {
            model.storage = Some(storage);
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn export_model(
    State(state): State<AppState>,
    Path(model_id): Path<i64>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, StatusCode> {
    if query.mode.as_deref() != Some("pmml") {
        return Err(StatusCode::BAD_REQUEST);
    }
    let db = state.db.read().await;
    let model = db
        .models
        .iter()
        .find(|m| m.id == model_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    let pmml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <PMML xmlns=\"http://www.dmg.org/PMML-4_2\" version=\"4.2\">\
         <Header description=\"{}\"/></PMML>",
        model.name
    );
    Ok(([(header::CONTENT_TYPE, "application/xml")], pmml).into_response())
}

/// One prediction per non-empty CSV row.
async fn predict(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Vec<i64>>, StatusCode> {
    let (fields, file) = read_form(multipart).await?;
    let model_id: i64 = fields
        .get("modelId")
        .and_then(|id| id.parse().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;
    let file = file.ok_or(StatusCode::BAD_REQUEST)?;

    let db = state.db.read().await;
    if !db.models.iter().any(|m| m.id == model_id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let rows = String::from_utf8_lossy(&file)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count();
    Ok(Json(vec![0; rows]))
}
