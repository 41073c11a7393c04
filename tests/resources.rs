mod common;

use common::*;
use serde_json::json;
use tircloud::prelude::*;
use tircloud::v1::manager::{ManagerError, ResourceManager};
use wiremock::{
    matchers::{any, body_json, body_partial_json, method, path, query_param},
    Mock, ResponseTemplate,
};

fn dataset_config() -> DatasetConfig {
    DatasetConfig {
        name: "eos".into(),
        scope: scope(),
        ..Default::default()
    }
}

#[test]
fn dataset_lifecycle() {
    let api = Api::start();
    let manager = DatasetManager::new(api.handle(), &api.client);
    api.mount(
        Mock::given(method("POST"))
            .and(path(project_path("datasets/")))
            .and(body_json(json!({
                "name": "eos", "encryption_enable": false, "storage_type": "managed"
            })))
            .respond_with(created(json!({
                "id": 42,
                "status": "creating",
                "bucket": {"bucket_name": "eos-42", "bucket_url": "https://objectstore/eos-42", "endpoint": "objectstore"},
                "access_key": {"access_key": "AK", "secret_key": "SK"}
            })))
            .expect(1),
    );
    let state = manager.create(&dataset_config()).unwrap();
    assert_eq!(state.id, "42");
    assert_eq!(state.name, "eos");
    assert_eq!(state.storage_type, "managed");
    assert_eq!(state.bucket_name, "eos-42");
    assert_eq!(state.access_key, "AK");

    api.mount(
        Mock::given(method("GET"))
            .and(path(project_path("datasets/42/")))
            .respond_with(ok(json!({"id": "42", "name": "eos", "status": "ready", "storage_type": "managed"}))),
    );
    let current = manager.read(&dataset_config(), &state).unwrap().unwrap();
    assert_eq!(current.status, "ready");

    api.mount(
        Mock::given(method("DELETE"))
            .and(path(project_path("datasets/42/")))
            .respond_with(ResponseTemplate::new(200)),
    );
    assert!(manager.delete(&dataset_config(), &state).unwrap());

    api.reset();
    api.mount(Mock::given(any()).respond_with(ResponseTemplate::new(404)));
    assert_eq!(manager.read(&dataset_config(), &state).unwrap(), None);
    assert!(!manager.delete(&dataset_config(), &state).unwrap());
}

#[test]
fn dataset_preconditions_are_checked_before_any_call() {
    let api = Api::start();
    api.mount(Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0));
    let manager = DatasetManager::new(api.handle(), &api.client);

    let existing = DatasetConfig {
        storage_type: DatasetStorage::ExistingBucket,
        ..dataset_config()
    };
    assert!(matches!(
        manager.create(&existing),
        Err(ManagerError::InvalidConfig(_))
    ));
    let encrypted = DatasetConfig {
        encryption_enable: true,
        ..dataset_config()
    };
    assert!(matches!(
        manager.create(&encrypted),
        Err(ManagerError::InvalidConfig(_))
    ));
}

#[test]
fn read_failure_other_than_not_found_is_an_error() {
    let api = Api::start();
    api.mount(Mock::given(any()).respond_with(ResponseTemplate::new(503)));
    let manager = DatasetManager::new(api.handle(), &api.client);
    let state = DatasetState {
        id: "42".into(),
        ..Default::default()
    };
    assert!(matches!(
        manager.read(&dataset_config(), &state),
        Err(ManagerError::LookupFail(_))
    ));
    assert!(matches!(
        manager.delete(&dataset_config(), &state),
        Err(ManagerError::DeleteFail(_))
    ));
}

fn node_config() -> NodeConfig {
    NodeConfig {
        name: "node-1".into(),
        image_name: "pytorch".into(),
        image_version: "2.1".into(),
        sku_name: "C3.8GB".into(),
        sku_type: SkuType::Hourly,
        scope: scope(),
        ..Default::default()
    }
}

fn node_details(name: &str, status: &str) -> serde_json::Value {
    json!({
        "id": 77,
        "name": name,
        "status": status,
        "image_details": {"image_name": "pytorch", "image_version": "2.1"},
        "sku_details": {"specs": {"name": "C3.8GB"}, "plan": {"sku_type": "hourly", "committed_days": 0, "currency": "INR"}},
        "lab_url": "https://notebooks/77"
    })
}

#[test]
fn node_create_fills_state_from_config() {
    let api = Api::start();
    api.mount(
        Mock::given(method("POST"))
            .and(path(project_path("notebooks/")))
            .and(body_partial_json(json!({
                "name": "node-1", "disk_size_in_gb": 30, "image_name": "pytorch", "sku_type": "hourly"
            })))
            .respond_with(created(json!({"id": 77, "status": "waiting", "created_at": "2024-05-01"})))
            .expect(1),
    );
    let manager = NodeManager::new(api.handle(), &api.client);
    let state = manager.create(&node_config()).unwrap();
    assert_eq!(state.id, "77");
    assert_eq!(state.name, "node-1");
    assert_eq!(state.image_version, "2.1");
    assert_eq!(state.sku_type, Some(SkuType::Hourly));
    assert_eq!(state.currency, Some(Currency::INR));
    assert!(!state.stop_node);
}

#[test]
fn node_rename_then_refresh() {
    let api = Api::start();
    api.mount(
        Mock::given(method("PUT"))
            .and(path(project_path("notebooks/77/actions/")))
            .and(query_param("action", "rename"))
            .and(body_json(json!({"name": "node-2"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1),
    );
    api.mount(
        Mock::given(method("GET"))
            .and(path(project_path("notebooks/77/")))
            .respond_with(ok(node_details("node-2", "running"))),
    );
    let manager = NodeManager::new(api.handle(), &api.client);
    let latest = NodeState {
        id: "77".into(),
        status: "running".into(),
        ..Default::default()
    };
    let renamed = NodeConfig {
        name: "node-2".into(),
        ..node_config()
    };
    let state = manager.update(&node_config(), &renamed, &latest).unwrap();
    assert_eq!(state.name, "node-2");
    assert_eq!(state.notebook_url_at_tir.as_deref(), Some("https://notebooks/77"));
}

#[test]
fn node_stop_then_start() {
    let api = Api::start();
    api.mount(
        Mock::given(method("PUT"))
            .and(path(project_path("notebooks/77/actions/")))
            .and(query_param("action", "stop"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1),
    );
    api.mount(
        Mock::given(method("GET"))
            .and(path(project_path("notebooks/77/")))
            .respond_with(ok(node_details("node-1", "stopped"))),
    );
    let manager = NodeManager::new(api.handle(), &api.client);
    let running = NodeState {
        id: "77".into(),
        status: "running".into(),
        ..Default::default()
    };
    let stop = NodeConfig {
        stop_node: true,
        ..node_config()
    };
    let state = manager.update(&node_config(), &stop, &running).unwrap();
    assert!(state.stop_node);
    assert_eq!(state.status, "stopped");
}

#[test]
fn node_rejected_changes_make_no_call() {
    let api = Api::start();
    api.mount(Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0));
    let manager = NodeManager::new(api.handle(), &api.client);
    let running = NodeState {
        id: "77".into(),
        status: "running".into(),
        ..Default::default()
    };

    let stopped_at_birth = NodeConfig {
        stop_node: true,
        ..node_config()
    };
    assert!(matches!(
        manager.create(&stopped_at_birth),
        Err(ManagerError::InvalidConfig(_))
    ));

    let committed = NodeConfig {
        sku_type: SkuType::Committed,
        committed_days: 30,
        ..node_config()
    };
    let stop_committed = NodeConfig {
        stop_node: true,
        ..committed.clone()
    };
    assert!(matches!(
        manager.update(&committed, &stop_committed, &running),
        Err(ManagerError::InvalidConfig(_))
    ));

    let bigger = NodeConfig {
        sku_name: "C3.16GB".into(),
        ..node_config()
    };
    assert!(matches!(
        manager.update(&node_config(), &bigger, &running),
        Err(ManagerError::InvalidConfig(_))
    ));

    let newer_image = NodeConfig {
        image_version: "2.2".into(),
        ..node_config()
    };
    assert!(matches!(
        manager.update(&node_config(), &newer_image, &running),
        Err(ManagerError::InvalidConfig(_))
    ));
}

#[test]
fn model_repo_create_and_read() {
    let api = Api::start();
    api.mount(
        Mock::given(method("POST"))
            .and(path(project_path("serving/model/")))
            .and(body_partial_json(json!({"name": "weights", "model_type": "pytorch", "storage_type": "managed"})))
            .respond_with(created(json!({
                "id": 8,
                "bucket": {"bucket_name": "weights-8", "bucket_url": "https://objectstore/weights-8", "endpoint": "objectstore"},
                "access_key": {"access_key": "AK", "secret_key": "SK"}
            })))
            .expect(1),
    );
    api.mount(
        Mock::given(method("GET"))
            .and(path(project_path("serving/model/8/")))
            .respond_with(ok(json!({"id": 8, "name": "weights", "model_type": "pytorch", "status": "ready"}))),
    );
    let manager = ModelRepoManager::new(api.handle(), &api.client);
    let config = ModelRepoConfig {
        name: "weights".into(),
        model_type: "pytorch".into(),
        scope: scope(),
        ..Default::default()
    };
    let state = manager.create(&config).unwrap();
    assert_eq!(state.id, "8");
    assert_eq!(state.name, "weights");
    assert_eq!(state.model_type, "pytorch");
    assert_eq!(state.bucket_name, "weights-8");
    assert_eq!(state.secret_key, "SK");

    let current = manager.read(&config, &state).unwrap().unwrap();
    assert_eq!(current.status, "ready");
}

#[test]
fn integration_create_and_read() {
    let api = Api::start();
    api.mount(
        Mock::given(method("POST"))
            .and(path(project_path("integrations/")))
            .and(body_json(json!({
                "integration_details": {"hugging_face_token": "hf_abc"},
                "integration_type": "hugging_face",
                "name": "hf"
            })))
            .respond_with(created(json!({"id": 5})))
            .expect(1),
    );
    api.mount(
        Mock::given(method("GET"))
            .and(path(project_path("integrations/5/")))
            .respond_with(ok(json!({"id": 5, "name": "hf", "integration_type": "hugging_face"}))),
    );
    let manager = IntegrationManager::new(api.handle(), &api.client);
    let config = IntegrationConfig {
        name: "hf".into(),
        integration_type: "hugging_face".into(),
        hugging_face_token: "hf_abc".into(),
        scope: scope(),
    };
    let state = manager.create(&config).unwrap();
    assert_eq!(
        state,
        IntegrationState {
            id: "5".into(),
            name: "hf".into(),
            integration_type: "hugging_face".into(),
        }
    );
    assert_eq!(manager.read(&config, &state).unwrap(), Some(state));
}

fn cluster_config() -> PrivateClusterConfig {
    PrivateClusterConfig {
        name: "pc".into(),
        nodes_count: 2,
        sku_name: "GPU-H100".into(),
        sku_type: SkuType::Committed,
        committed_days: 30,
        location: "Delhi".into(),
        scope: scope(),
        ..Default::default()
    }
}

#[test]
fn private_cluster_is_created_with_ok_status() {
    let api = Api::start();
    api.mount(
        Mock::given(method("POST"))
            .and(path(project_path("private-cluster/")))
            .and(body_partial_json(json!({"category": "private_cloud", "nodes_count": 2})))
            .respond_with(ok(json!({"id": 11, "created_at": "2024-05-01"})))
            .expect(1),
    );
    let manager = PrivateClusterManager::new(api.handle(), &api.client);
    let state = manager.create(&cluster_config()).unwrap();
    assert_eq!(state.id, "11");
    assert_eq!(state.name, "pc");
    assert_eq!(state.nodes_count, 2);
    assert_eq!(state.sku_type, Some(SkuType::Committed));
    assert_eq!(state.committed_days, 30);
}

#[test]
fn private_cluster_update_always_fails() {
    let api = Api::start();
    api.mount(Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0));
    let manager = PrivateClusterManager::new(api.handle(), &api.client);
    let latest = PrivateClusterState {
        id: "11".into(),
        ..Default::default()
    };
    let bigger = PrivateClusterConfig {
        nodes_count: 4,
        ..cluster_config()
    };
    assert!(matches!(
        manager.update(&cluster_config(), &bigger, &latest),
        Err(ManagerError::CannotSyncWithoutRecreate(_))
    ));
    assert!(matches!(
        manager.update(&cluster_config(), &cluster_config(), &latest),
        Err(ManagerError::CannotSyncWithoutRecreate(_))
    ));
}

/// Deletes a live item, then checks that it reads as absent and that deleting
/// it again reports nothing removed.
fn deleted_item_reads_as_absent<C, S>(
    api: &Api,
    manager: &impl ResourceManager<C, S>,
    config: &C,
    latest: &S,
    item: &str,
) where
    S: PartialEq + std::fmt::Debug,
{
    api.mount(
        Mock::given(method("DELETE"))
            .and(path(project_path(item)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1),
    );
    assert!(manager.delete(config, latest).unwrap());

    api.reset();
    api.mount(Mock::given(any()).respond_with(ResponseTemplate::new(404)));
    assert_eq!(manager.read(config, latest).unwrap(), None);
    assert!(!manager.delete(config, latest).unwrap());
}

#[test]
fn deleted_node_reads_as_absent() {
    let api = Api::start();
    let manager = NodeManager::new(api.handle(), &api.client);
    let latest = NodeState {
        id: "77".into(),
        status: "running".into(),
        ..Default::default()
    };
    deleted_item_reads_as_absent(&api, &manager, &node_config(), &latest, "notebooks/77/");
}

#[test]
fn deleted_model_repo_reads_as_absent() {
    let api = Api::start();
    let manager = ModelRepoManager::new(api.handle(), &api.client);
    let config = ModelRepoConfig {
        name: "weights".into(),
        model_type: "pytorch".into(),
        scope: scope(),
        ..Default::default()
    };
    let latest = ModelRepoState {
        id: "8".into(),
        ..Default::default()
    };
    deleted_item_reads_as_absent(&api, &manager, &config, &latest, "serving/model/8/");
}

#[test]
fn deleted_integration_reads_as_absent() {
    let api = Api::start();
    let manager = IntegrationManager::new(api.handle(), &api.client);
    let config = IntegrationConfig {
        name: "hf".into(),
        integration_type: "hugging_face".into(),
        hugging_face_token: "hf_abc".into(),
        scope: scope(),
    };
    let latest = IntegrationState {
        id: "5".into(),
        ..Default::default()
    };
    deleted_item_reads_as_absent(&api, &manager, &config, &latest, "integrations/5/");
}

#[test]
fn deleted_private_cluster_reads_as_absent() {
    let api = Api::start();
    let manager = PrivateClusterManager::new(api.handle(), &api.client);
    let latest = PrivateClusterState {
        id: "11".into(),
        ..Default::default()
    };
    deleted_item_reads_as_absent(&api, &manager, &cluster_config(), &latest, "private-cluster/11/");
}
