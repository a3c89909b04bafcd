use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use server::auth::StaticTokenVerifier;
use server::{create_router, state::AppState, ServiceConfig};
use std::sync::Arc;
use std::time::Duration;

use host::ScriptedPackageManager;
use toolshed_core::{Catalog, CatalogEntry, Identity, PackageKind, Role};

const ADA: &str = "ada-token";
const GRACE: &str = "grace-token";
const ADMIN: &str = "admin-token";

struct TestApp {
    server: TestServer,
    state: AppState,
    pm: Arc<ScriptedPackageManager>,
}

fn catalog() -> Catalog {
    Catalog::new(vec![
        CatalogEntry::new("git", "Git", PackageKind::Formula),
        CatalogEntry::new("node", "Node.js", PackageKind::Formula),
        CatalogEntry::new("jenkins", "Jenkins", PackageKind::Formula),
        CatalogEntry::new("figma", "Figma", PackageKind::Cask),
        CatalogEntry::new("slack", "Slack", PackageKind::Cask),
    ])
    .expect("valid catalog")
}

fn verifier() -> StaticTokenVerifier {
    StaticTokenVerifier::new()
        .with_token(ADA, Identity::new("user-1", "ada@example.com", "Ada"))
        .with_token(GRACE, Identity::new("user-2", "grace@example.com", "Grace"))
        .with_token(
            ADMIN,
            Identity::new("admin-1", "root@example.com", "Root").with_role(Role::Admin),
        )
}

async fn setup_with(pm: ScriptedPackageManager, config: ServiceConfig) -> TestApp {
    let pool = db::create_pool("sqlite::memory:")
        .await
        .expect("Failed to create pool");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let pm = Arc::new(pm);
    let state = AppState::new(pool, config, catalog(), pm.clone(), Arc::new(verifier()));
    let server = TestServer::new(create_router(state.clone())).expect("Failed to create test server");

    TestApp { server, state, pm }
}

async fn setup(pm: ScriptedPackageManager) -> TestApp {
    setup_with(pm, ServiceConfig::default()).await
}

/// `data:` payloads of an SSE body, in order.
fn sse_events(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str(data.trim()).ok())
        .collect()
}

fn describe(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event["type"].as_str() {
            Some("progress") => format!("progress({})", event["progress"]),
            Some(other) => other.to_string(),
            None => "?".to_string(),
        })
        .collect()
}

mod health {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = setup(ScriptedPackageManager::new()).await;

        let response = app.server.get("/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["catalog_entries"], 5);
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let app = setup(ScriptedPackageManager::new()).await;

        let response = app.server.get("/api/openapi.json").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert!(body["paths"]["/api/software/install"].is_object());
    }
}

mod auth {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let app = setup(ScriptedPackageManager::new()).await;

        let response = app.server.get("/api/software").await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthorized() {
        let app = setup(ScriptedPackageManager::new()).await;

        let response = app
            .server
            .get("/api/software")
            .authorization_bearer("nope")
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_query_token_is_accepted() {
        let app = setup(ScriptedPackageManager::new()).await;

        let response = app
            .server
            .get("/api/software/installed")
            .add_query_param("token", ADA)
            .await;

        response.assert_status_ok();
    }

    #[tokio::test]
    async fn test_admin_listing_requires_admin() {
        let app = setup(ScriptedPackageManager::new().with_available("git", "2.45.0")).await;

        app.server
            .post("/api/software/install")
            .authorization_bearer(ADA)
            .json(&json!({ "app_id": "git", "kind": "formula" }))
            .await
            .assert_status(StatusCode::CREATED);

        app.server
            .get("/api/software/users/user-1")
            .authorization_bearer(GRACE)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let response = app
            .server
            .get("/api/software/users/user-1")
            .authorization_bearer(ADMIN)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["app_id"], "git");
    }
}

mod install {
    use super::*;

    #[tokio::test]
    async fn test_install_returns_201_and_persists() {
        let app = setup(ScriptedPackageManager::new().with_available("git", "2.45.0")).await;

        let response = app
            .server
            .post("/api/software/install")
            .authorization_bearer(ADA)
            .json(&json!({ "app_id": "git", "kind": "formula" }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["app_id"], "git");
        assert_eq!(body["status"], "installed");
        assert_eq!(body["version"], "2.45.0");
        assert_eq!(body["owner_email"], "ada@example.com");

        let installed: Value = app
            .server
            .get("/api/software/installed")
            .authorization_bearer(ADA)
            .await
            .json();
        assert_eq!(installed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_install_streams_progress_to_channel() {
        let app = setup(ScriptedPackageManager::new().with_available("git", "2.45.0")).await;

        let stream = async {
            app.server
                .get("/api/software/install-progress")
                .add_query_param("token", ADA)
                .await
        };

        let install = async {
            while !app.state.channels.is_open("user-1") {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            app.server
                .post("/api/software/install")
                .authorization_bearer(ADA)
                .json(&json!({ "app_id": "git", "kind": "formula" }))
                .await
        };

        let (stream, install) = tokio::join!(stream, install);

        install.assert_status(StatusCode::CREATED);
        stream.assert_status_ok();
        assert_eq!(
            describe(&sse_events(&stream.text())),
            vec!["connected", "progress(10)", "progress(30)", "progress(70)", "complete"]
        );
    }

    #[tokio::test]
    async fn test_already_installed_is_bad_request_without_host_calls() {
        let app = setup(ScriptedPackageManager::new().with_available("figma", "124.1")).await;

        app.server
            .post("/api/software/install")
            .authorization_bearer(ADA)
            .json(&json!({ "app_id": "figma", "kind": "cask" }))
            .await
            .assert_status(StatusCode::CREATED);
        let installs = app.pm.install_calls();
        let queries = app.pm.query_calls();

        let response = app
            .server
            .post("/api/software/install")
            .authorization_bearer(ADA)
            .json(&json!({ "app_id": "figma", "kind": "cask" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "already_installed");
        assert_eq!(app.pm.install_calls(), installs);
        assert_eq!(app.pm.query_calls(), queries);
    }

    #[tokio::test]
    async fn test_absent_on_host_is_not_found() {
        let app = setup(ScriptedPackageManager::new()).await;

        let response = app
            .server
            .post("/api/software/install")
            .authorization_bearer(ADA)
            .json(&json!({ "app_id": "jenkins", "kind": "formula" }))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"], "not_found_on_host");

        let installed: Value = app
            .server
            .get("/api/software/installed")
            .authorization_bearer(ADA)
            .await
            .json();
        assert!(installed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_bad_request() {
        let app = setup(ScriptedPackageManager::new().with_available("git", "2.45.0")).await;

        let response = app
            .server
            .post("/api/software/install")
            .authorization_bearer(ADA)
            .json(&json!({ "app_id": "git", "kind": "cask" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["message"], "invalid package type");
        assert_eq!(app.pm.install_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_app_is_not_found() {
        let app = setup(ScriptedPackageManager::new()).await;

        app.server
            .post("/api/software/install")
            .authorization_bearer(ADA)
            .json(&json!({ "app_id": "emacs", "kind": "formula" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_permission_failure_is_server_error() {
        let app = setup(ScriptedPackageManager::new().with_available("slack", "4.38")).await;
        app.pm.fail_install(
            "slack",
            host::HostError::PermissionDenied("/Applications is not writable".into()),
        );

        let response = app
            .server
            .post("/api/software/install")
            .authorization_bearer(ADA)
            .json(&json!({ "app_id": "slack", "kind": "cask" }))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["error"], "permission_denied");
    }

    #[tokio::test]
    async fn test_install_survives_dropped_request() {
        let app = setup(ScriptedPackageManager::new().with_available("git", "2.45.0")).await;
        app.pm.set_install_delay(Duration::from_millis(300));

        let request = app
            .server
            .post("/api/software/install")
            .authorization_bearer(ADA)
            .json(&json!({ "app_id": "git", "kind": "formula" }));
        assert!(tokio::time::timeout(Duration::from_millis(100), request)
            .await
            .is_err());

        let mut recorded = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if app.state.repository.exists("user-1", "git").await.unwrap() {
                recorded = true;
                break;
            }
        }

        assert!(recorded);
        assert!(app.pm.is_installed("git"));
    }
}

mod progress_channel {
    use super::*;

    #[tokio::test]
    async fn test_channel_requires_token() {
        let app = setup(ScriptedPackageManager::new()).await;

        app.server
            .get("/api/software/install-progress")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_idle_channel_heartbeats_then_times_out() {
        let app = setup_with(
            ScriptedPackageManager::new(),
            ServiceConfig {
                heartbeat_interval_secs: 1,
                install_timeout_secs: 2,
                ..Default::default()
            },
        )
        .await;

        let response = app
            .server
            .get("/api/software/install-progress")
            .add_query_param("token", ADA)
            .await;

        response.assert_status_ok();
        let body = response.text();
        assert!(body.contains(": heartbeat"));

        let events = sse_events(&body);
        assert_eq!(describe(&events), vec!["connected", "error"]);
        assert_eq!(events[1]["message"], "Installation timed out");

        let installed: Value = app
            .server
            .get("/api/software/installed")
            .authorization_bearer(ADA)
            .await
            .json();
        assert!(installed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_finishing_after_channel_deadline_is_not_recorded() {
        let app = setup_with(
            ScriptedPackageManager::new().with_available("git", "2.45.0"),
            ServiceConfig {
                install_timeout_secs: 2,
                ..Default::default()
            },
        )
        .await;
        // would finish inside its own budget, but after the channel gave up
        app.pm.set_install_delay(Duration::from_millis(1500));

        let stream = async {
            app.server
                .get("/api/software/install-progress")
                .add_query_param("token", ADA)
                .await
        };

        let install = async {
            while !app.state.channels.is_open("user-1") {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            app.server
                .post("/api/software/install")
                .authorization_bearer(ADA)
                .json(&json!({ "app_id": "git", "kind": "formula" }))
                .await
        };

        let (stream, install) = tokio::join!(stream, install);

        install.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = install.json();
        assert_eq!(body["error"], "timeout");

        let events = sse_events(&stream.text());
        assert_eq!(events.last().unwrap()["message"], "Installation timed out");
        assert!(!describe(&events).contains(&"complete".to_string()));
        assert!(!app.state.repository.exists("user-1", "git").await.unwrap());
    }
}

mod scan {
    use super::*;

    #[tokio::test]
    async fn test_scan_matches_host() {
        let app = setup(
            ScriptedPackageManager::new()
                .with_installed("git", "2.45.0")
                .with_installed("figma", "124.1"),
        )
        .await;

        let response = app
            .server
            .post("/api/software/scan")
            .authorization_bearer(ADA)
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["report"]["detected"], json!(["figma", "git"]));

        app.pm.remove("figma");
        app.server
            .post("/api/software/scan")
            .authorization_bearer(ADA)
            .await
            .assert_status_ok();

        let installed: Value = app
            .server
            .get("/api/software/installed")
            .authorization_bearer(ADA)
            .await
            .json();
        let ids: Vec<_> = installed
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["app_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["git"]);
    }

    #[tokio::test]
    async fn test_scan_reports_partial_failure() {
        let app = setup(ScriptedPackageManager::new().with_installed("git", "2.45.0")).await;
        app.pm.fail_query(
            "node",
            host::HostError::CommandFailed {
                code: 1,
                stderr: "Another active Homebrew process is running".into(),
            },
        );

        let body: Value = app
            .server
            .post("/api/software/scan")
            .authorization_bearer(ADA)
            .await
            .json();

        assert_eq!(body["success"], false);
        assert_eq!(body["report"]["failed"], json!(["node"]));
        assert_eq!(body["report"]["detected"], json!(["git"]));
    }

    #[tokio::test]
    async fn test_scan_overlapping_install_keeps_new_record() {
        let app = setup(ScriptedPackageManager::new().with_available("git", "2.45.0")).await;
        app.pm
            .set_query_delay_for("slack", Duration::from_millis(300));

        let scan = async {
            app.server
                .post("/api/software/scan")
                .authorization_bearer(ADA)
                .await
        };
        let install = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            app.server
                .post("/api/software/install")
                .authorization_bearer(ADA)
                .json(&json!({ "app_id": "git", "kind": "formula" }))
                .await
        };

        let (scan, install) = tokio::join!(scan, install);

        install.assert_status(StatusCode::CREATED);
        scan.assert_status_ok();
        let report: Value = scan.json();
        assert_eq!(report["report"]["removed"], json!([]));

        assert!(app.pm.is_installed("git"));
        assert!(app.state.repository.exists("user-1", "git").await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_on_spawned_task() {
        let app = setup(ScriptedPackageManager::new().with_installed("node", "22.3.0")).await;
        let owner = Identity::new("user-1", "ada@example.com", "Ada");

        let reconciler = app.state.reconciler.clone();
        let report = tokio::spawn(async move { reconciler.scan(&owner).await })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.detected, vec!["node"]);
        assert!(app.state.repository.exists("user-1", "node").await.unwrap());
    }
}

mod records {
    use super::*;

    async fn with_git(app: &TestApp) {
        app.server
            .post("/api/software/install")
            .authorization_bearer(ADA)
            .json(&json!({ "app_id": "git", "kind": "formula" }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_listing_marks_installed_entries() {
        let app = setup(ScriptedPackageManager::new().with_available("git", "2.45.0")).await;
        with_git(&app).await;

        let body: Value = app
            .server
            .get("/api/software")
            .authorization_bearer(ADA)
            .await
            .json();

        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 5);
        let git = entries.iter().find(|e| e["id"] == "git").unwrap();
        assert_eq!(git["installed"], true);
        let slack = entries.iter().find(|e| e["id"] == "slack").unwrap();
        assert_eq!(slack["installed"], false);

        let other: Value = app
            .server
            .get("/api/software")
            .authorization_bearer(GRACE)
            .await
            .json();
        assert!(other
            .as_array()
            .unwrap()
            .iter()
            .all(|e| e["installed"] == false));
    }

    #[tokio::test]
    async fn test_check_command() {
        let app = setup(ScriptedPackageManager::new().with_installed("git", "2.45.0")).await;
        app.pm.add_command("jq", Some("1.7.1"));

        let body: Value = app
            .server
            .post("/api/software/check-command")
            .authorization_bearer(ADA)
            .json(&json!({ "command": "git" }))
            .await
            .json();
        assert_eq!(body["exists"], true);
        assert_eq!(body["version"], "2.45.0");
        assert_eq!(body["kind"], "formula");

        let body: Value = app
            .server
            .post("/api/software/check-command")
            .authorization_bearer(ADA)
            .json(&json!({ "command": "jq" }))
            .await
            .json();
        assert_eq!(body["exists"], true);
        assert!(body["kind"].is_null());

        app.server
            .post("/api/software/check-command")
            .authorization_bearer(ADA)
            .json(&json!({ "command": "" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_updates_version_and_uninstall() {
        let app = setup(ScriptedPackageManager::new().with_available("git", "2.45.0")).await;
        with_git(&app).await;

        app.pm.set_installed("git", "2.46.0");
        let body: Value = app
            .server
            .get("/api/software/git/updates")
            .authorization_bearer(ADA)
            .await
            .json();
        assert_eq!(body["has_update"], true);
        assert_eq!(body["current_version"], "2.45.0");
        assert_eq!(body["latest_version"], "2.46.0");

        let body: Value = app
            .server
            .put("/api/software/git")
            .authorization_bearer(ADA)
            .json(&json!({ "version": "2.46.0" }))
            .await
            .json();
        assert_eq!(body["version"], "2.46.0");

        app.server
            .delete("/api/software/git")
            .authorization_bearer(ADA)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        app.server
            .delete("/api/software/git")
            .authorization_bearer(ADA)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        app.server
            .get("/api/software/git/updates")
            .authorization_bearer(ADA)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
