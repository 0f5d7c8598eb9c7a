//! Layout bindings over a workspace synced with a remote host.

use meshsync_layout::{LayoutHost, RendererRegistry};
use meshsync_state::{Path, Reference};
use meshsync_workspace::{LoopbackHost, RemoteSync, SyncConfig, Workspace};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let reached = timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

async fn session(host: &LoopbackHost) -> (LayoutHost, RemoteSync) {
    let data = Workspace::new("data", Value::Null);
    let sync = RemoteSync::spawn(
        data.clone(),
        Reference::path(Path::root().key("forms").key("f1")),
        Arc::new(host.clone()),
        SyncConfig::default().with_request_timeout(Duration::from_millis(200)),
    );
    timeout(Duration::from_secs(2), sync.ready())
        .await
        .expect("ready in time")
        .expect("binding live");

    let layout = Workspace::new(
        "layout",
        json!({"areas": {"main": {
            "component": "TextBox",
            "props": {"value": {"$binding": "$.name"}}
        }}}),
    );
    let rendered = LayoutHost::new(layout, data, RendererRegistry::with_defaults(), "main");
    (rendered, sync)
}

#[tokio::test]
async fn ui_edit_reaches_the_host() {
    let host = LoopbackHost::new(json!({"forms": {"f1": {"name": "Ann"}}}));
    let (layout, _sync) = session(&host).await;
    assert_eq!(layout.store().get("main").unwrap().props["value"], json!("Ann"));

    layout.update_binding("main", "value", json!("Bea")).unwrap();

    let remote = host.workspace().clone();
    eventually("host commit", || {
        remote.current() == json!({"forms": {"f1": {"name": "Bea"}}})
    })
    .await;
}

#[tokio::test]
async fn host_edit_reaches_the_store() {
    let host = LoopbackHost::new(json!({"forms": {"f1": {"name": "Ann"}}}));
    let (layout, _sync) = session(&host).await;

    host.workspace()
        .update(json!({"forms": {"f1": {"name": "Cid"}}}));

    let store = layout.store().clone();
    eventually("store update", || {
        store.get("main").map(|m| m.props["value"].clone()) == Some(json!("Cid"))
    })
    .await;
}
