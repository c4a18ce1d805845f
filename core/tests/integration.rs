//! Create-project scenarios and a full model lifecycle against the live mock
//! server.
//!
//! # Design
//! Each test starts the mock server on a random port in a background tokio
//! runtime, then drives `MlHttpClient` over real HTTP. Assertions are on the
//! raw status codes, the way the ML integration suite checks the server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ml_client::{ClientConfig, Credentials, Endpoint, MlHttpClient};
use mock_server::MockConfig;

const DATASET_NAME: &str = "SampleDataForCreateProjectTestCase";
const PROJECT_NAME: &str = "TestProjectForCreatProjectTestCase";

fn start_server(config: MockConfig) -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, config).await
        })
        .unwrap();
    });

    addr
}

fn client_for(addr: SocketAddr, credentials: Credentials) -> MlHttpClient {
    let config = ClientConfig::new(Endpoint::http(&addr.ip().to_string(), addr.port()), credentials);
    MlHttpClient::new(&config)
}

fn admin_client(addr: SocketAddr) -> MlHttpClient {
    client_for(addr, Credentials::new("admin", "admin"))
}

fn resource(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}

#[test]
fn create_projects() {
    let client = admin_client(start_server(MockConfig::default()));

    // Setup: the dataset every project refers to.
    let csv = resource("fcSample.csv");
    let response = client
        .upload_dataset_from_csv(Some(DATASET_NAME), Some("1.0"), Some(&csv))
        .unwrap();
    assert_eq!(response.status, 200);

    // Create a project.
    let response = client
        .create_project(Some(PROJECT_NAME), Some(DATASET_NAME))
        .unwrap();
    assert_eq!(response.status, 200);

    // Same name again: the server accepts duplicates.
    let response = client
        .create_project(Some(PROJECT_NAME), Some(DATASET_NAME))
        .unwrap();
    assert_eq!(response.status, 200);

    // Without a name.
    let response = client.create_project(None, Some(DATASET_NAME)).unwrap();
    assert_eq!(response.status, 400);

    // Without a dataset.
    let response = client
        .create_project(Some("TestProjectForCreatProjectTestCase-2"), None)
        .unwrap();
    assert_eq!(response.status, 400);
}

#[test]
fn model_lifecycle() {
    let client = admin_client(start_server(MockConfig::default()));

    // Step 1: upload and resolve the version set.
    let response = client
        .upload_dataset_from_csv(Some("forest"), Some("1.0"), Some(&resource("fcSample.csv")))
        .unwrap();
    assert_eq!(response.status, 200);
    let uploaded = client.response_as_json_object(response).unwrap();
    let dataset_id = uploaded["id"].as_i64().unwrap();

    let version_set_id = client.get_a_version_set_id_of_dataset(dataset_id).unwrap();
    assert_eq!(
        client.get_version_set_id_of_dataset(dataset_id, "1.0").unwrap(),
        version_set_id
    );

    // Step 2: wait for the sample; the mock answers 404 twice first.
    let ready = client
        .check_dataset_status(version_set_id, Duration::from_secs(2), Duration::from_millis(50))
        .unwrap();
    assert!(ready, "dataset sample never became available");

    // Step 3: project and analysis.
    let response = client.create_project(Some("forest-project"), Some("forest")).unwrap();
    assert_eq!(response.status, 200);
    let project_id = client.get_project_id("forest-project").unwrap();

    let response = client.create_analysis(Some("forest-analysis"), Some(project_id)).unwrap();
    assert_eq!(response.status, 200);
    let analysis_id = client.get_analysis_id(project_id, "forest-analysis").unwrap();

    assert_eq!(client.set_feature_defaults(analysis_id).unwrap().status, 200);
    let customized = r#"[{"name":"Slope","type":"NUMERICAL","imputeOption":"REPLACE_WITH_MEAN","include":true}]"#;
    assert_eq!(
        client.set_feature_customized(analysis_id, customized).unwrap().status,
        200
    );
    let response = client
        .set_model_configuration(
            analysis_id,
            &[
                ("algorithmName", "LOGISTIC_REGRESSION"),
                ("algorithmType", "Classification"),
                ("responseVariable", "Cover_Type"),
                ("trainDataFraction", "0.7"),
            ],
        )
        .unwrap();
    assert_eq!(response.status, 200);

    // Step 4: model, storage, export, prediction.
    let response = client.create_model(analysis_id, version_set_id).unwrap();
    assert_eq!(response.status, 200);
    let model_name = client.get_model_name(response).unwrap();
    let model_id = client.get_model_id(&model_name).unwrap();

    let response = client.create_file_model_storage(model_id, "/tmp/ml-models").unwrap();
    assert_eq!(response.status, 200);

    let response = client.export_as_pmml(model_id).unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.contains("<PMML"), "{}", response.body);

    let response = client
        .predict_from_csv(model_id, Some(&resource("fcPredict.csv")))
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(client.response_as_string(response).unwrap(), "[0,0,0]");
}

#[test]
fn upload_from_das() {
    let client = admin_client(start_server(MockConfig::default()));
    let response = client
        .upload_dataset_from_das(Some("das-dataset"), Some("1.0"), "ML_TABLE")
        .unwrap();
    assert_eq!(response.status, 200);
}

#[test]
fn dataset_status_times_out_for_unknown_version_set() {
    let client = admin_client(start_server(MockConfig::default()));
    let ready = client
        .check_dataset_status(999, Duration::from_millis(200), Duration::from_millis(50))
        .unwrap();
    assert!(!ready);
}

#[test]
fn wrong_credentials_are_rejected() {
    let addr = start_server(MockConfig::default());
    let client = client_for(addr, Credentials::new("admin", "not-the-password"));
    let response = client.create_project(Some(PROJECT_NAME), Some(DATASET_NAME)).unwrap();
    assert_eq!(response.status, 401);
}

#[test]
fn unreachable_server_is_a_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let client = admin_client(addr);

    assert!(client.get("/api/projects/P").is_err());
    let err = client.create_project(Some(PROJECT_NAME), Some(DATASET_NAME)).unwrap_err();
    assert!(err.is_transport(), "{err}");
    assert_eq!(err.operation(), format!("failed to create project {PROJECT_NAME}"));
}
