use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tfimport::backend::{FileStateStore, LocalBackend, LockInfo, get_backend};
use tfimport::config::load_module_tree;
use tfimport::{
    BackendError, ImportError, ImportOutcome, OperationRequest, Provider, ProviderError,
    ProviderSet, RawInstanceState, ResourceAddress, Settings, StateSnapshot, StateStore, address,
    workflow,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Echoes the requested ID back as a single instance and counts calls.
#[derive(Default)]
struct EchoProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "aws"
    }

    fn resource_types(&self) -> Vec<&str> {
        vec!["aws_instance"]
    }

    async fn import_resource_state(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<RawInstanceState>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            RawInstanceState::new(resource_type, id).with_attribute("instance_type", "t3.micro"),
        ])
    }
}

/// Reads as empty, refuses every write.
#[derive(Default)]
struct ReadOnlyStore {
    unlocks: AtomicUsize,
}

#[async_trait]
impl StateStore for ReadOnlyStore {
    fn describe(&self) -> String {
        "read-only".to_string()
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(None)
    }

    async fn write(&self, _data: &[u8], _lock_id: Option<&str>) -> Result<(), BackendError> {
        Err(BackendError::Http {
            status: 507,
            message: "Insufficient Storage".to_string(),
        })
    }

    async fn lock(&self, info: &LockInfo) -> Result<String, BackendError> {
        Ok(info.id.clone())
    }

    async fn unlock(&self, _lock_id: &str) -> Result<(), BackendError> {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn write_config(dir: &Path, config: serde_json::Value) {
    std::fs::write(
        dir.join("main.tf.json"),
        serde_json::to_vec_pretty(&config).unwrap(),
    )
    .unwrap();
}

fn settings_for(dir: &TempDir) -> Settings {
    Settings {
        config_dir: dir.path().to_path_buf(),
        state_path: Some(dir.path().join("terraform.tfstate")),
        ..Settings::default()
    }
}

async fn import_with(
    settings: &Settings,
    provider: Arc<EchoProvider>,
    addr: &str,
    id: &str,
) -> Result<ImportOutcome, ImportError> {
    let tree = load_module_tree(&settings.config_dir).unwrap();
    let target = workflow::prepare_target(&tree, address::resolve(addr)?, id, None)?;
    let backend = get_backend(tree.backend_config(), settings).unwrap();
    let providers = ProviderSet::new().with("aws", provider);
    let request = OperationRequest::new(tree, providers, settings);
    workflow::execute(backend.as_ref(), request, target).await
}

fn read_state(path: &Path) -> StateSnapshot {
    StateSnapshot::from_json(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_import_round_trips_through_state_file() {
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        serde_json::json!({ "resource": { "aws_instance": { "foo": { "ami": "ami-1" } } } }),
    );
    let settings = settings_for(&dir);
    let provider = Arc::new(EchoProvider::default());

    let outcome = import_with(&settings, provider.clone(), "aws_instance.foo", "i-123")
        .await
        .unwrap();

    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.state.resource_count(), 1);
    let addr = ResourceAddress::managed("aws_instance", "foo");
    let resource = outcome.state.resource(&addr).unwrap();
    assert_eq!(resource.primary.id, "i-123");
    assert_eq!(resource.primary.attributes["instance_type"], "t3.micro");

    let reread = read_state(&dir.path().join("terraform.tfstate"));
    assert_eq!(reread, outcome.state);
    assert_eq!(reread.serial, 1);
    assert!(!dir.path().join(".terraform.tfstate.lock.info").exists());
}

#[tokio::test]
async fn test_reimport_overwrites_and_backs_up_previous_state() {
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        serde_json::json!({ "resource": { "aws_instance": { "foo": {} } } }),
    );
    let settings = settings_for(&dir);
    let provider = Arc::new(EchoProvider::default());

    import_with(&settings, provider.clone(), "aws_instance.foo", "i-1")
        .await
        .unwrap();
    let outcome = import_with(&settings, provider.clone(), "aws_instance.foo", "i-2")
        .await
        .unwrap();

    let addr = ResourceAddress::managed("aws_instance", "foo");
    assert_eq!(outcome.state.resource_count(), 1);
    assert_eq!(outcome.state.resource(&addr).unwrap().primary.id, "i-2");
    assert_eq!(outcome.state.serial, 2);

    let backup = read_state(&dir.path().join("terraform.tfstate.backup"));
    assert_eq!(backup.resource(&addr).unwrap().primary.id, "i-1");
    assert_eq!(backup.lineage, outcome.state.lineage);
}

#[tokio::test]
async fn test_reimport_same_id_overwrites_in_place() {
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        serde_json::json!({ "resource": { "aws_instance": { "foo": {} } } }),
    );
    let settings = settings_for(&dir);
    let provider = Arc::new(EchoProvider::default());

    let first = import_with(&settings, provider.clone(), "aws_instance.foo", "i-123")
        .await
        .unwrap();
    let second = import_with(&settings, provider.clone(), "aws_instance.foo", "i-123")
        .await
        .unwrap();

    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    let addr = ResourceAddress::managed("aws_instance", "foo");
    assert_eq!(second.state.resource_count(), 1);
    assert_eq!(second.state.resource(&addr).unwrap().primary.id, "i-123");
    assert_eq!(second.imported[0].address, addr);

    let reread = read_state(&dir.path().join("terraform.tfstate"));
    assert_eq!(reread.resource_count(), 1);
    assert_eq!(reread.lineage, first.state.lineage);
    assert_eq!(reread.serial, first.state.serial);
}

#[tokio::test]
async fn test_reimport_with_state_out_writes_output_file() {
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        serde_json::json!({ "resource": { "aws_instance": { "foo": {} } } }),
    );
    let settings = settings_for(&dir);
    let provider = Arc::new(EchoProvider::default());
    import_with(&settings, provider.clone(), "aws_instance.foo", "i-123")
        .await
        .unwrap();
    let input = std::fs::read(dir.path().join("terraform.tfstate")).unwrap();

    let out_path = dir.path().join("out.tfstate");
    let redirected = Settings {
        state_out_path: Some(out_path.clone()),
        ..settings_for(&dir)
    };
    let outcome = import_with(&redirected, provider, "aws_instance.foo", "i-123")
        .await
        .unwrap();

    let written = read_state(&out_path);
    assert_eq!(written, outcome.state);
    assert_eq!(
        written
            .resource(&ResourceAddress::managed("aws_instance", "foo"))
            .unwrap()
            .primary
            .id,
        "i-123"
    );
    assert_eq!(std::fs::read(dir.path().join("terraform.tfstate")).unwrap(), input);
    assert_eq!(std::fs::read(dir.path().join("out.tfstate.backup")).unwrap(), input);
}

#[tokio::test]
async fn test_import_into_child_module() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("net")).unwrap();
    write_config(
        dir.path(),
        serde_json::json!({ "module": { "net": { "source": "./net" } } }),
    );
    write_config(
        &dir.path().join("net"),
        serde_json::json!({ "resource": { "aws_instance": { "web": { "count": 2 } } } }),
    );
    let settings = settings_for(&dir);

    let outcome = import_with(
        &settings,
        Arc::new(EchoProvider::default()),
        "module.net.aws_instance.web[1]",
        "i-9",
    )
    .await
    .unwrap();

    let module = outcome
        .state
        .module(&["root".to_string(), "net".to_string()])
        .unwrap();
    assert_eq!(module.resources["aws_instance.web.1"].primary.id, "i-9");
}

#[tokio::test]
async fn test_held_lock_prevents_provider_call() {
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        serde_json::json!({ "resource": { "aws_instance": { "foo": {} } } }),
    );
    let settings = Settings {
        lock_timeout: Duration::from_millis(200),
        ..settings_for(&dir)
    };
    let state_path = dir.path().join("terraform.tfstate");
    let other = FileStateStore::new(state_path.clone(), state_path, None);
    other.lock(&LockInfo::new("OperationTypeApply")).await.unwrap();
    let provider = Arc::new(EchoProvider::default());

    let result = import_with(&settings, provider.clone(), "aws_instance.foo", "i-123").await;

    assert!(matches!(
        result,
        Err(ImportError::ContextAcquisitionFailed(
            BackendError::LockTimeout { .. }
        ))
    ));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("terraform.tfstate").exists());
}

#[tokio::test]
async fn test_persist_failure_reports_error_and_unlocks() {
    let store = Arc::new(ReadOnlyStore::default());
    let backend = LocalBackend::new("local", store.clone());
    let tree = tfimport::ConfigTree::new(
        tfimport::Module::root()
            .with_resource(tfimport::ResourceDecl::managed("aws_instance", "foo")),
    );
    let target = workflow::prepare_target(
        &tree,
        ResourceAddress::managed("aws_instance", "foo"),
        "i-123",
        None,
    )
    .unwrap();
    let providers = ProviderSet::new().with("aws", Arc::new(EchoProvider::default()));
    let request = OperationRequest::new(tree, providers, &Settings::default());

    let result = workflow::execute(&backend, request, target).await;

    match result {
        Err(ImportError::StatePersistError(BackendError::Http { status, .. })) => {
            assert_eq!(status, 507)
        }
        other => panic!("expected StatePersistError, got {:?}", other),
    }
    assert_eq!(store.unlocks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_remote_backend_is_unsupported() {
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        serde_json::json!({
            "terraform": { "backend": { "remote": { "organization": "acme" } } },
            "resource": { "aws_instance": { "foo": {} } }
        }),
    );

    let result = workflow::run(&settings_for(&dir), "aws_instance.foo", "i-123").await;

    match result {
        Err(ImportError::UnsupportedBackend { backend }) => assert_eq!(backend, "remote"),
        other => panic!("expected UnsupportedBackend, got {:?}", other),
    }
}

#[tokio::test]
async fn test_undeclared_resource_leaves_state_untouched() {
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        serde_json::json!({ "resource": { "aws_instance": { "foo": {} } } }),
    );

    let result = workflow::run(&settings_for(&dir), "aws_instance.bar", "i-123").await;

    let err = result.unwrap_err();
    assert!(err.is_user_error());
    assert!(err.to_string().contains("resource \"aws_instance\" \"bar\""));
    assert!(!dir.path().join("terraform.tfstate").exists());
}

#[tokio::test]
async fn test_run_imports_cloudflare_record_end_to_end() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/tokens/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "errors": [],
            "result": { "status": "active" }
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones/zone123/dns_records/rec1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "errors": [],
            "result": {
                "id": "rec1",
                "name": "www.example.com",
                "type": "A",
                "content": "198.51.100.4",
                "ttl": 3600
            }
        })))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        serde_json::json!({
            "provider": { "cloudflare": { "api_token": "test_token", "base_url": mock_server.uri() } },
            "resource": { "cloudflare_dns_record": { "www": {} } }
        }),
    );

    let outcome = workflow::run(&settings_for(&dir), "cloudflare_dns_record.www", "zone123/rec1")
        .await
        .unwrap();

    assert_eq!(outcome.imported.len(), 1);
    assert_eq!(outcome.imported[0].provider, "provider.cloudflare");

    let state = read_state(&dir.path().join("terraform.tfstate"));
    let resource = state
        .resource(&ResourceAddress::managed("cloudflare_dns_record", "www"))
        .unwrap();
    assert_eq!(resource.primary.id, "rec1");
    assert_eq!(resource.primary.attributes["zone_id"], "zone123");
    assert_eq!(resource.primary.attributes["content"], "198.51.100.4");
}

#[tokio::test]
async fn test_run_reports_missing_remote_object() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/tokens/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "errors": [],
            "result": null
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones/zone123/dns_records/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        serde_json::json!({
            "provider": { "cloudflare": { "api_token": "test_token", "base_url": mock_server.uri() } },
            "resource": { "cloudflare_dns_record": { "www": {} } }
        }),
    );

    let result = workflow::run(&settings_for(&dir), "cloudflare_dns_record.www", "zone123/gone").await;

    assert!(matches!(
        result,
        Err(ImportError::ImportExecutionError {
            source: ProviderError::NoInstances { .. },
            ..
        })
    ));
    assert!(!dir.path().join("terraform.tfstate").exists());
}
