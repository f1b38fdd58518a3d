mod common;

use common::{harness, release, Harness};
use relsync::error::Error;
use relsync::model::{Instance, InstanceParameter, Module, Variable};
use relsync::sync::CreateInstance;
use serde_json::json;
use std::collections::HashMap;

async fn running_instance(h: &Harness) -> Instance {
    h.controller.create_release(release("r1", "d1")).await.unwrap();
    h.controller
        .create_instance(
            "user-1",
            CreateInstance {
                release_id: "r1".to_string(),
                name: "kitchen".to_string(),
                description: String::new(),
                parameters: vec![InstanceParameter {
                    id: "temperature".to_string(),
                    value: json!(19),
                }],
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn instance_start_passes_typed_parameters() {
    let h = harness().await;
    let instance = running_instance(&h).await;

    let started = h.engine.started.lock().unwrap().clone();
    assert_eq!(started.len(), 1);
    let (key, business_key, variables) = &started[0];
    assert_eq!(key, "release_r1");
    assert_eq!(business_key, &instance.id);
    assert_eq!(variables.get("temperature"), Some(&json!(19)));
}

#[tokio::test]
async fn maintenance_id_resolves_to_the_owning_instance() {
    let h = harness().await;
    let instance = running_instance(&h).await;

    let maintenance_id = h
        .controller
        .start_maintenance_procedure(&instance.id, "reset", HashMap::new())
        .await
        .unwrap();

    let started = h.engine.maintenance_started.lock().unwrap().clone();
    assert_eq!(started, vec![("release_r1_maintenance_reset".to_string(), maintenance_id.clone())]);

    let by_id = h.controller.get_instance(&instance.id).await.unwrap();
    let by_alias = h.controller.get_instance(&maintenance_id).await.unwrap();
    assert_eq!(by_id, by_alias);
    assert_eq!(by_alias.running_maintenance_ids, vec![maintenance_id]);
}

#[tokio::test]
async fn writes_through_an_alias_land_on_the_instance() {
    let h = harness().await;
    let instance = running_instance(&h).await;
    let maintenance_id = h
        .controller
        .start_maintenance_procedure(&instance.id, "reset", HashMap::new())
        .await
        .unwrap();

    h.controller
        .set_variable(Variable {
            instance_id: maintenance_id.clone(),
            user_id: "user-1".to_string(),
            name: "setpoint".to_string(),
            value: json!(22),
        })
        .await
        .unwrap();
    h.controller
        .set_modules(vec![Module {
            id: "thermostat-1".to_string(),
            user_id: String::new(),
            instance_id: maintenance_id.clone(),
            design_id: String::new(),
            release_id: String::new(),
            module_type: "thermostat".to_string(),
            module_data: json!({}),
            delete_info: None,
        }])
        .await
        .unwrap();
    h.controller.set_instance_ready(&maintenance_id, true, None).await.unwrap();

    let variables = h.controller.list_variables(&instance.id).await.unwrap();
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0].instance_id, instance.id);

    let modules = h.controller.list_modules(&instance.id).await.unwrap();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].instance_id, instance.id);
    assert_eq!(modules[0].release_id, "r1");
    assert_eq!(modules[0].user_id, "user-1");

    assert!(h.controller.get_instance(&instance.id).await.unwrap().ready);
}

#[tokio::test]
async fn finished_maintenance_drops_the_alias() {
    let h = harness().await;
    let instance = running_instance(&h).await;
    let maintenance_id = h
        .controller
        .start_maintenance_procedure(&instance.id, "reset", HashMap::new())
        .await
        .unwrap();

    h.controller.finish_maintenance(&maintenance_id).await.unwrap();

    let err = h.controller.get_instance(&maintenance_id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert!(h.controller.get_instance(&instance.id).await.unwrap().running_maintenance_ids.is_empty());
}

#[tokio::test]
async fn failed_maintenance_start_leaves_no_alias() {
    let h = harness().await;
    let instance = running_instance(&h).await;
    h.engine.set_failing(true);

    let err = h
        .controller
        .start_maintenance_procedure(&instance.id, "reset", HashMap::new())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(h.controller.get_instance(&instance.id).await.unwrap().running_maintenance_ids.is_empty());
}

#[tokio::test]
async fn unknown_procedures_are_rejected() {
    let h = harness().await;
    let instance = running_instance(&h).await;

    let err = h
        .controller
        .start_maintenance_procedure(&instance.id, "descale", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn cleanup_prunes_aliases_of_finished_procedures() {
    let h = harness().await;
    let instance = running_instance(&h).await;
    let done = h
        .controller
        .start_maintenance_procedure(&instance.id, "reset", HashMap::new())
        .await
        .unwrap();
    let running = h
        .controller
        .start_maintenance_procedure(&instance.id, "reset", HashMap::new())
        .await
        .unwrap();
    h.engine.finish_business_key(&done);

    let errors = h.controller.cleanup(false).await;
    assert!(errors.is_empty(), "{:?}", errors);

    let instance = h.controller.get_instance(&instance.id).await.unwrap();
    assert_eq!(instance.running_maintenance_ids, vec![running]);
}

#[tokio::test]
async fn deleting_an_instance_stops_its_processes_and_data() {
    let h = harness().await;
    let instance = running_instance(&h).await;
    let maintenance_id = h
        .controller
        .start_maintenance_procedure(&instance.id, "reset", HashMap::new())
        .await
        .unwrap();
    h.controller
        .set_variable(Variable {
            instance_id: instance.id.clone(),
            user_id: "user-1".to_string(),
            name: "setpoint".to_string(),
            value: json!(22),
        })
        .await
        .unwrap();

    h.controller.delete_instance(&maintenance_id).await.unwrap();

    assert!(matches!(
        h.controller.get_instance(&instance.id).await,
        Err(Error::NotFound { .. })
    ));
    assert!(h.store.list_variables(&instance.id).await.unwrap().is_empty());
    assert!(h
        .engine
        .processes
        .lock()
        .unwrap()
        .iter()
        .all(|p| p.end_time.is_some()));

    // the release is free again
    h.controller.delete_release("r1").await.unwrap();
}

#[tokio::test]
async fn instances_need_a_committed_release() {
    let h = harness().await;
    h.engine.set_failing(true);
    assert!(h.controller.create_release(release("r1", "d1")).await.is_err());
    h.engine.set_failing(false);

    let err = h
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
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}
