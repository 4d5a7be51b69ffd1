//! Browse and storage endpoint tests

mod common;

use axum::http::StatusCode;
use common::{create_test_setup, create_test_setup_with, test_config, upload_form};
use serde_json::{json, Value};
use tempfile::TempDir;

async fn seeded() -> common::TestSetup {
    let setup = create_test_setup().await.unwrap();
    setup
        .server
        .post("/api/upload/local/releases")
        .multipart(upload_form("org.example:lib:1.0.0", b"jar"))
        .await
        .assert_status(StatusCode::CREATED);
    setup
}

#[tokio::test]
async fn test_storage_endpoints() {
    let setup = seeded().await;

    let list: Value = setup.server.get("/api/storages/list").await.json();
    assert_eq!(list["success"], true);
    assert_eq!(list["data"][0]["name"], "local");
    let id = list["data"][0]["id"].as_i64().unwrap();

    let one: Value = setup
        .server
        .get(&format!("/api/storages/id/{id}"))
        .await
        .json();
    assert_eq!(one["data"]["repositories"][0]["name"], "releases");
    assert_eq!(one["data"]["repositories"][1]["policy"], "snapshot");

    let names: Value = setup.server.get("/storages.json").await.json();
    assert_eq!(names["data"], serde_json::json!(["local"]));

    setup
        .server
        .get("/api/storages/id/999")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_browse_levels() {
    let setup = seeded().await;

    let storages: Value = setup.server.get("/api/browse").await.json();
    assert_eq!(storages["data"]["type"], "storages");
    assert_eq!(storages["data"]["data"][0]["fullPath"], "local");

    let repositories: Value = setup.server.get("/api/browse/local").await.json();
    assert_eq!(repositories["data"]["type"], "repositories");
    assert_eq!(repositories["data"]["data"].as_array().unwrap().len(), 2);

    let root: Value = setup.server.get("/api/browse/local/releases").await.json();
    assert_eq!(root["data"]["type"], "directory");
    assert_eq!(root["data"]["data"][0]["name"], "org");
    assert_eq!(root["data"]["data"][0]["directory"], true);

    let artifact: Value = setup
        .server
        .get("/api/browse/local/releases/org/example/lib/1.0.0/lib-1.0.0.jar")
        .await
        .json();
    assert_eq!(artifact["data"]["type"], "artifact");
    assert_eq!(artifact["data"]["data"]["coordinate"], "org.example:lib:1.0.0");
    assert_eq!(artifact["data"]["data"]["size"], 3);
}

#[tokio::test]
async fn test_path_below_artifact_is_too_deep() {
    let setup = seeded().await;

    for url in [
        "/api/browse/local/releases/org/example/lib/1.0.0/lib-1.0.0.jar/extra",
        "/storages/local/releases/org/example/lib/1.0.0/lib-1.0.0.jar/extra/more",
    ] {
        let response = setup.server.get(url).await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["code"], "path_too_deep");
        assert_eq!(
            body["details"]["leaf"],
            "org/example/lib/1.0.0/lib-1.0.0.jar"
        );
    }
}

#[tokio::test]
async fn test_reads_are_idempotent() {
    let setup = seeded().await;
    let url = "/api/browse/local/releases/org/example/lib";

    let first: Value = setup.server.get(url).await.json();
    let second: Value = setup.server.get(url).await.json();
    assert_eq!(first, second);

    let listing: Value = setup
        .server
        .get("/storages/local/releases/org/example/lib")
        .await
        .json();
    let names: Vec<&str> = listing["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["1.0.0", "maven-metadata.xml", "maven-metadata.xml.sha1"]
    );
}

#[tokio::test]
async fn test_unknown_names_are_not_found() {
    let setup = seeded().await;

    for url in [
        "/api/browse/missing",
        "/api/browse/local/missing",
        "/api/browse/local/releases/org/missing",
        "/storages/local/releases/org/example/lib/9.9.9/lib-9.9.9.jar",
    ] {
        setup
            .server
            .get(url)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_admin_lifecycle() {
    let setup = create_test_setup().await.unwrap();

    let created: Value = setup
        .server
        .post("/api/admin/storages")
        .json(&serde_json::json!({ "name": "team" }))
        .await
        .json();
    let id = created["data"]["id"].as_i64().unwrap();

    let repo = setup
        .server
        .post(&format!("/api/admin/storages/{id}/repositories"))
        .json(&serde_json::json!({ "name": "libs", "policy": "mixed" }))
        .await;
    repo.assert_status(StatusCode::CREATED);

    setup
        .server
        .post("/api/admin/storages")
        .json(&serde_json::json!({ "name": "team" }))
        .await
        .assert_status(StatusCode::CONFLICT);

    setup
        .server
        .post("/api/upload/team/libs")
        .multipart(upload_form("org.example:lib:1.0.0-SNAPSHOT", b"snap"))
        .await
        .assert_status(StatusCode::CREATED);

    setup
        .server
        .delete(&format!("/api/admin/storages/{id}/repositories/libs"))
        .await
        .assert_status_ok();
    setup
        .server
        .get("/api/browse/team/libs")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    setup
        .server
        .delete(&format!("/api/admin/storages/{id}"))
        .await
        .assert_status_ok();
    let names: Value = setup.server.get("/storages.json").await.json();
    assert_eq!(names["data"], serde_json::json!(["local"]));
}

async fn storage_id(setup: &common::TestSetup, name: &str) -> i64 {
    setup.app_state.index.storage_by_name(name).unwrap().id
}

#[tokio::test]
async fn test_repository_settings_endpoint() {
    let setup = seeded().await;
    let id = storage_id(&setup, "local").await;
    let settings_url = format!("/api/admin/storages/{id}/repositories/releases/settings");
    let jar_url = "/storages/local/releases/org/example/lib/1.0.0/lib-1.0.0.jar";

    let hidden: Value = setup
        .server
        .put(&settings_url)
        .json(&json!({ "visibility": "hidden" }))
        .await
        .json();
    assert_eq!(hidden["data"]["visibility"], "hidden");
    assert_eq!(hidden["data"]["active"], true);

    // Hidden: left out of the listing, still readable by path.
    let repositories: Value = setup.server.get("/api/browse/local").await.json();
    let names: Vec<&str> = repositories["data"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["snapshots"]);
    setup.server.get(jar_url).await.assert_status_ok();

    setup
        .server
        .put(&settings_url)
        .json(&json!({ "active": false }))
        .await
        .assert_status_ok();
    let refused = setup.server.get(jar_url).await;
    refused.assert_status(StatusCode::FORBIDDEN);
    let body: Value = refused.json();
    assert_eq!(body["code"], "repository_inactive");
    setup
        .server
        .post("/api/upload/local/releases")
        .multipart(upload_form("org.example:lib:2.0.0", b"jar"))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    setup
        .server
        .put(&settings_url)
        .json(&json!({}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    setup
        .server
        .put(&format!("/api/admin/storages/{id}/repositories/missing/settings"))
        .json(&json!({ "active": true }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    setup
        .server
        .put(&settings_url)
        .json(&json!({ "active": true }))
        .await
        .assert_status_ok();
    setup.server.get(jar_url).await.assert_status_ok();
}

#[tokio::test]
async fn test_private_repository_reads_need_a_key() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    config.security.require_authentication = true;
    config.security.api_keys = vec!["deploy-key".to_string()];
    let setup = create_test_setup_with(config, temp_dir).await.unwrap();
    let id = storage_id(&setup, "local").await;

    setup
        .server
        .post("/api/upload/local/releases")
        .authorization_bearer("deploy-key")
        .multipart(upload_form("org.example:lib:1.0.0", b"jar"))
        .await
        .assert_status(StatusCode::CREATED);

    let jar_url = "/storages/local/releases/org/example/lib/1.0.0/lib-1.0.0.jar";
    setup.server.get(jar_url).await.assert_status_ok();

    setup
        .server
        .put(&format!("/api/admin/storages/{id}/repositories/releases/settings"))
        .json(&json!({ "visibility": "private" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    setup
        .server
        .put(&format!("/api/admin/storages/{id}/repositories/releases/settings"))
        .authorization_bearer("deploy-key")
        .json(&json!({ "visibility": "private" }))
        .await
        .assert_status_ok();

    for url in [
        jar_url,
        "/api/browse/local/releases/org/example",
        "/api/versions/local/releases/org/example/lib",
    ] {
        setup
            .server
            .get(url)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        setup
            .server
            .get(url)
            .authorization_bearer("deploy-key")
            .await
            .assert_status_ok();
    }

    // Other repositories stay public.
    setup
        .server
        .get("/api/browse/local/snapshots")
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_version_queries() {
    let setup = seeded().await;
    setup
        .server
        .post("/api/upload/local/releases")
        .multipart(upload_form("org.example:lib:1.1.0", b"jar 1.1"))
        .await
        .assert_status(StatusCode::CREATED);

    let versions: Value = setup
        .server
        .get("/api/versions/local/releases/org/example/lib")
        .await
        .json();
    assert_eq!(versions["data"]["groupId"], "org.example");
    assert_eq!(versions["data"]["versions"][0]["version"], "1.0.0");
    assert_eq!(versions["data"]["versions"][1]["version"], "1.1.0");
    assert_eq!(versions["data"]["versions"][1]["snapshot"], false);
    assert_eq!(versions["data"]["release"], "1.1.0");

    let version: Value = setup
        .server
        .get("/api/version/local/releases/org/example/lib/1.0.0")
        .await
        .json();
    assert_eq!(version["data"]["version"], "1.0.0");
    assert_eq!(version["data"]["files"][0]["name"], "lib-1.0.0.jar");
    assert_eq!(version["data"]["descriptor"]["artifactId"], "lib");

    let project: Value = setup
        .server
        .get("/api/project/local/releases/org/example/lib")
        .await
        .json();
    assert_eq!(project["data"]["latest"], "1.1.0");
    assert_eq!(project["data"]["descriptor"]["version"], "1.1.0");
    assert_eq!(project["data"]["descriptor"]["packaging"], "jar");

    for url in [
        "/api/versions/local/releases/org/example/missing",
        "/api/version/local/releases/org/example/lib/9.9.9",
        "/api/project/local/missing/org/example/lib",
    ] {
        setup
            .server
            .get(url)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
    setup
        .server
        .get("/api/versions/local/releases/lib")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}
