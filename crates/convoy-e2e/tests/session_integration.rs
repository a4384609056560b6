//! The e2e component driven by a real emit run.

use std::path::Path;
use std::sync::{Arc, Mutex};

use convoy_core::{
    ComponentState, Container, EmitComponent, Emitter, Gated, Pipeline, PipelineError,
};
use convoy_e2e::{E2eComponent, E2E_ASSET_ADD, E2E_SESSION_END, E2E_SESSION_START};
use serde_json::{json, Value};

fn write(root: &Path, relative: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"// test").unwrap();
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "web/login.e2e.js");
    write(dir.path(), "web/util.js");
    write(dir.path(), "api/health.e2e.js");
    dir
}

fn root_config(dir: &Path, e2e: Value) -> Arc<Container> {
    Arc::new(Container::from_file(
        "root",
        json!({
            "$": { "emit": { "pattern": ["/\\.js$/"] }, "e2e": e2e },
            "web": { "root": "web" },
            "api": { "root": "api" }
        }),
        &dir.join(".convoy.yml"),
    ))
}

fn record(emitter: &Emitter, events: &[&'static str]) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for event in events.iter().copied() {
        let log = log.clone();
        emitter.on_blocking(event, move |payload| {
            let detail = payload
                .as_asset()
                .map(|a| format!(":{}", a.file))
                .unwrap_or_default();
            log.lock().unwrap().push(format!("{event}{detail}"));
            futures::future::ready(Ok(()))
        });
    }
    log
}

#[tokio::test]
async fn session_runs_over_collected_assets() {
    let dir = fixture();
    let emitter = Emitter::new();
    let log = record(&emitter, &[E2E_ASSET_ADD, E2E_SESSION_START, E2E_SESSION_END]);

    let mut pipeline = Pipeline::with_emitter(emitter);
    pipeline
        .add(EmitComponent::new())
        .add(Gated::new(E2eComponent::new()));

    let report = pipeline
        .run(root_config(
            dir.path(),
            json!({
                "pattern": "*.e2e.js",
                "command": ["sh", "-c", "printf '%s\\n' \"$@\" > ran.txt", "sh"],
                "cwd": "."
            }),
        ))
        .await
        .unwrap();

    assert_eq!(report.state_of("e2e"), Some(ComponentState::Done));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "e2e.asset.add:login.e2e.js",
            "e2e.asset.add:health.e2e.js",
            "e2e.session.start",
            "e2e.session.end",
        ]
    );

    let ran = std::fs::read_to_string(dir.path().join("ran.txt")).unwrap();
    let files: Vec<&str> = ran.lines().collect();
    assert_eq!(files.len(), 2);
    assert!(files[0].ends_with("web/login.e2e.js"));
    assert!(files[1].ends_with("api/health.e2e.js"));
}

#[tokio::test]
async fn failing_session_fails_the_run() {
    let dir = fixture();
    let mut pipeline = Pipeline::new();
    pipeline
        .add(EmitComponent::new())
        .add(Gated::new(E2eComponent::new()));

    let err = pipeline
        .run(root_config(
            dir.path(),
            json!({ "pattern": "*.e2e.js", "command": "false" }),
        ))
        .await
        .unwrap_err();

    match err {
        PipelineError::ComponentFailed { component, source } => {
            assert_eq!(component, "e2e");
            assert!(source.to_string().contains("exit code"));
        }
        other => panic!("expected ComponentFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn no_matching_assets_is_success() {
    let dir = fixture();
    let mut pipeline = Pipeline::new();
    pipeline
        .add(EmitComponent::new())
        .add(Gated::new(E2eComponent::new()));

    let report = pipeline
        .run(root_config(
            dir.path(),
            json!({ "pattern": "*.spec.ts", "command": "false" }),
        ))
        .await
        .unwrap();
    assert_eq!(report.ran_count(), 2);
}
