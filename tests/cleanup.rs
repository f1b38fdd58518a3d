mod common;

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::delete, Router};
use common::{harness, release};
use relsync::model::{DeleteInfo, Instance, Module, Variable};
use relsync::sync::CreateInstance;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// Module owner answering delete callbacks with a fixed status
#[derive(Clone)]
struct CallbackServer {
    hits: Arc<AtomicUsize>,
    user_ids: Arc<Mutex<Vec<String>>>,
    status: StatusCode,
    delay: Duration,
}

async fn handle_delete(State(server): State<CallbackServer>, headers: HeaderMap) -> StatusCode {
    server.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(server.delay).await;
    if let Some(user) = headers.get("X-UserId").and_then(|v| v.to_str().ok()) {
        server.user_ids.lock().unwrap().push(user.to_string());
    }
    server.status
}

async fn spawn_callback_server(status: StatusCode) -> (CallbackServer, SocketAddr) {
    spawn_slow_callback_server(status, Duration::ZERO).await
}

async fn spawn_slow_callback_server(status: StatusCode, delay: Duration) -> (CallbackServer, SocketAddr) {
    let server = CallbackServer {
        hits: Arc::new(AtomicUsize::new(0)),
        user_ids: Arc::new(Mutex::new(Vec::new())),
        status,
        delay,
    };
    let app = Router::new()
        .route("/modules/{id}", delete(handle_delete))
        .with_state(server.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (server, addr)
}

fn stored_instance(id: &str) -> Instance {
    Instance {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        design_id: "d1".to_string(),
        release_id: "r1".to_string(),
        new_release_id: None,
        name: "kitchen".to_string(),
        description: String::new(),
        ready: true,
        error: None,
        parameters: Vec::new(),
        running_maintenance_ids: Vec::new(),
    }
}

fn module(id: &str, instance_id: &str, callback: Option<String>) -> Module {
    Module {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        instance_id: instance_id.to_string(),
        design_id: "d1".to_string(),
        release_id: "r1".to_string(),
        module_type: "thermostat".to_string(),
        module_data: json!({"device": id}),
        delete_info: callback.map(|url| DeleteInfo {
            url,
            user_id: "owner-7".to_string(),
        }),
    }
}

fn variable(instance_id: &str, name: &str) -> Variable {
    Variable {
        instance_id: instance_id.to_string(),
        user_id: "user-1".to_string(),
        name: name.to_string(),
        value: json!(1),
    }
}

#[tokio::test]
async fn orphaned_engine_processes_are_removed_in_one_pass() {
    let h = harness().await;
    h.controller.create_release(release("r1", "d1")).await.unwrap();
    let instance = h
        .controller
        .create_instance(
            "user-1",
            CreateInstance {
                release_id: "r1".to_string(),
                name: "kitchen".to_string(),
                description: String::new(),
                parameters: Vec::new(),
            },
        )
        .await
        .unwrap();

    let orphan = h.engine.inject_process(Some("vanished-instance"), false);
    let finished_orphan = h.engine.inject_process(Some("vanished-too"), true);
    let keyless = h.engine.inject_process(None, false);

    let errors = h.controller.cleanup(false).await;
    assert!(errors.is_empty(), "{:?}", errors);

    assert!(!h.engine.has_process(&orphan));
    assert!(!h.engine.has_process(&finished_orphan));
    assert!(!h.engine.has_process(&keyless));

    let remaining = h.engine.processes.lock().unwrap().clone();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].business_key.as_deref(), Some(instance.id.as_str()));
}

#[tokio::test]
async fn orphaned_modules_invoke_their_callback_exactly_once() {
    let h = harness().await;
    let (server, addr) = spawn_callback_server(StatusCode::OK).await;
    h.store.save_instance(&stored_instance("alive")).await.unwrap();

    // more modules than one page, orphans spread across pages
    h.store
        .save_modules(&[
            module("m1", "alive", None),
            module("m2", "gone", Some(format!("http://{}/modules/m2", addr))),
            module("m3", "alive", None),
            module("m4", "gone", None),
            module("m5", "alive", None),
        ])
        .await
        .unwrap();

    let errors = h.controller.cleanup(false).await;
    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    assert_eq!(server.user_ids.lock().unwrap().as_slice(), ["owner-7".to_string()]);

    let ids: Vec<String> = h.store.list_modules(100, 0).await.unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["m1", "m3", "m5"]);

    // a second pass finds nothing to do
    assert!(h.controller.cleanup(false).await.is_empty());
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn callback_already_gone_counts_as_deleted() {
    let h = harness().await;
    let (server, addr) = spawn_callback_server(StatusCode::NOT_FOUND).await;
    h.store
        .save_modules(&[module("m1", "gone", Some(format!("http://{}/modules/m1", addr)))])
        .await
        .unwrap();

    assert!(h.controller.cleanup(false).await.is_empty());
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    assert!(h.store.list_modules(100, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn failing_callbacks_keep_the_module_unless_ignored() {
    let h = harness().await;
    let (server, addr) = spawn_callback_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    h.store
        .save_modules(&[module("m1", "gone", Some(format!("http://{}/modules/m1", addr)))])
        .await
        .unwrap();

    let errors = h.controller.cleanup(false).await;
    assert_eq!(errors.len(), 1);
    assert_eq!(h.store.list_modules(100, 0).await.unwrap().len(), 1);

    let errors = h.controller.cleanup(true).await;
    assert!(errors.is_empty(), "{:?}", errors);
    assert!(h.store.list_modules(100, 0).await.unwrap().is_empty());
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn orphaned_variables_are_removed() {
    let h = harness().await;
    h.store.save_instance(&stored_instance("alive")).await.unwrap();
    for name in ["a", "b", "c"] {
        h.store.save_variable(&variable("alive", name)).await.unwrap();
        h.store.save_variable(&variable("gone", name)).await.unwrap();
    }

    assert!(h.controller.cleanup(false).await.is_empty());

    let all = h.store.list_all_variables(100, 0).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|v| v.instance_id == "alive"));
}

#[tokio::test]
async fn engine_outage_is_reported_without_aborting_other_passes() {
    let h = harness().await;
    h.store.save_variable(&variable("gone", "a")).await.unwrap();
    h.engine.set_failing(true);

    let errors = h.controller.cleanup(false).await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_retryable());
    assert!(h.store.list_all_variables(100, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn scalar_payloads_do_not_stall_collection() {
    let h = harness().await;
    h.store.save_instance(&stored_instance("alive")).await.unwrap();
    let mut numeric = module("m1", "gone", None);
    numeric.module_data = json!(5);
    h.store.save_modules(&[numeric, module("m2", "alive", None)]).await.unwrap();
    h.store
        .save_variable(&Variable {
            value: json!(22),
            ..variable("gone", "setpoint")
        })
        .await
        .unwrap();

    let errors = h.controller.cleanup(false).await;
    assert!(errors.is_empty(), "{:?}", errors);

    let ids: Vec<String> = h.store.list_modules(100, 0).await.unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["m2"]);
    assert!(h.store.list_all_variables(100, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn instance_deletion_and_cleanup_call_back_once() {
    let h = harness().await;
    let (server, addr) = spawn_slow_callback_server(StatusCode::OK, Duration::from_millis(200)).await;
    h.controller.create_release(release("r1", "d1")).await.unwrap();
    let instance = h
        .controller
        .create_instance(
            "user-1",
            CreateInstance {
                release_id: "r1".to_string(),
                name: "kitchen".to_string(),
                description: String::new(),
                parameters: Vec::new(),
            },
        )
        .await
        .unwrap();
    h.store
        .save_modules(&[module("m1", &instance.id, Some(format!("http://{}/modules/m1", addr)))])
        .await
        .unwrap();

    let (deleted, errors) = tokio::join!(h.controller.delete_instance(&instance.id), async {
        // start while the deletion waits on the module owner
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.controller.cleanup(false).await
    });
    deleted.unwrap();
    assert!(errors.is_empty(), "{:?}", errors);

    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    assert!(h.store.list_modules(100, 0).await.unwrap().is_empty());
}
