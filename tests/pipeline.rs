//! End-to-end pipeline tests: config bootstrap through route dispatch to
//! real sinks, without a cluster.

use k8s_openapi::api::core::v1::{Event, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::Arc;
use virta::engine::{ClusterNameTagger, Engine, EventHandler};
use virta::event::EnhancedEvent;
use virta::metrics::Store;
use virta::registry::ReceiverRegistry;
use virta::Config;

fn event(name: &str, reason: &str, type_: &str, namespace: &str) -> EnhancedEvent {
    EnhancedEvent::new(Event {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            ..Default::default()
        },
        reason: Some(reason.into()),
        type_: Some(type_.into()),
        involved_object: ObjectReference {
            kind: Some("Pod".into()),
            name: Some("pod-a".into()),
            uid: Some("test".into()),
            ..Default::default()
        },
        ..Default::default()
    })
}

async fn build_engine(config: &Config) -> Engine {
    let store = Arc::new(Store::new("pipeline_test_").unwrap());
    let registry = ReceiverRegistry::new(store, config.throttle_period);
    for receiver in &config.receivers {
        let sink = receiver.create().await.unwrap();
        registry.register(&receiver.name, sink);
    }
    Engine::new(&config.route, registry).unwrap()
}

fn read_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
    let contents = std::fs::read_to_string(path).unwrap_or_default();
    contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_fan_out_reaches_only_matching_receiver() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("images.json");
    let alerts = dir.path().join("alerts.json");

    let config = Config::from_yaml(&format!(
        r#"
route:
  routes:
    - match:
        - reason: Pulled
      receiver: images
    - match:
        - type: Warning
      receiver: alerts
receivers:
  - name: images
    file:
      path: {}
  - name: alerts
    file:
      path: {}
"#,
        images.display(),
        alerts.display()
    ))
    .unwrap();
    config.validate().unwrap();

    let engine = build_engine(&config).await;
    engine
        .on_event(event("ev-1", "Pulled", "Normal", "default"))
        .await;
    engine.stop().await;

    assert_eq!(read_lines(&images).len(), 1);
    assert_eq!(read_lines(&images)[0]["reason"], "Pulled");
    assert!(read_lines(&alerts).is_empty());
}

#[tokio::test]
async fn test_drop_prunes_whole_subtree() {
    let dir = tempfile::tempdir().unwrap();
    let x = dir.path().join("x.json");
    let y = dir.path().join("y.json");

    let config = Config::from_yaml(&format!(
        r#"
route:
  routes:
    - drop:
        - namespace: kube-system
      receivers: [x]
      routes:
        - receiver: y
receivers:
  - name: x
    file:
      path: {}
  - name: y
    file:
      path: {}
"#,
        x.display(),
        y.display()
    ))
    .unwrap();

    let engine = build_engine(&config).await;
    engine
        .on_event(event("ev-1", "Pulled", "Normal", "kube-system"))
        .await;
    engine
        .on_event(event("ev-2", "Pulled", "Normal", "default"))
        .await;
    engine.stop().await;

    // The kube-system event never reached either receiver; the default one
    // reached both.
    assert_eq!(read_lines(&x).len(), 1);
    assert_eq!(read_lines(&x)[0]["metadata"]["namespace"], "default");
    assert_eq!(read_lines(&y).len(), 1);
}

#[tokio::test]
async fn test_per_receiver_delivery_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.json");

    let config = Config::from_yaml(&format!(
        "route:\n  receiver: out\nreceivers:\n  - name: out\n    file:\n      path: {}",
        out.display()
    ))
    .unwrap();

    let engine = build_engine(&config).await;
    for i in 0..50 {
        engine
            .on_event(event(&format!("ev-{i}"), "Created", "Normal", "default"))
            .await;
    }
    engine.stop().await;

    let lines = read_lines(&out);
    assert_eq!(lines.len(), 50);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line["metadata"]["name"], format!("ev-{i}"));
    }
}

#[tokio::test]
async fn test_cluster_name_tag_flows_to_sink() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.json");

    let config = Config::from_yaml(&format!(
        "route:\n  receiver: out\nreceivers:\n  - name: out\n    file:\n      path: {}",
        out.display()
    ))
    .unwrap();

    let engine = Arc::new(build_engine(&config).await);
    let tagger = ClusterNameTagger::new(
        "prod-eu".into(),
        Arc::clone(&engine) as Arc<dyn EventHandler>,
    );

    tagger
        .handle(event("ev-1", "Created", "Normal", "default"))
        .await;
    engine.stop().await;

    let lines = read_lines(&out);
    assert_eq!(lines[0]["clusterName"], "prod-eu");
}

#[tokio::test]
async fn test_layout_shapes_sink_payload() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.json");

    let config = Config::from_yaml(&format!(
        r#"
route:
  receiver: out
receivers:
  - name: out
    file:
      path: {}
      layout:
        summary: "{{{{ reason }}}} on {{{{ involvedObject.name }}}}"
        namespace: "{{{{ namespace }}}}"
"#,
        out.display()
    ))
    .unwrap();

    let engine = build_engine(&config).await;
    engine
        .on_event(event("ev-1", "Killing", "Normal", "prod"))
        .await;
    engine.stop().await;

    let lines = read_lines(&out);
    assert_eq!(
        lines[0],
        serde_json::json!({"summary": "Killing on pod-a", "namespace": "prod"})
    );
}

#[tokio::test]
async fn test_repeated_stop_is_safe() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.json");

    let config = Config::from_yaml(&format!(
        "route:\n  receiver: out\nreceivers:\n  - name: out\n    file:\n      path: {}",
        out.display()
    ))
    .unwrap();

    let engine = build_engine(&config).await;
    engine.stop().await;
    engine.stop().await;
}
