//! E2E tests for repository listing and connections

mod common;

use common::TestServer;
use serde_json::json;

#[tokio::test]
async fn listing_repos_requires_a_github_token() {
    let server = TestServer::new().await;

    // Google-only account has no stored GitHub token
    let session = server.login_google().await;

    let response = server
        .client
        .get(server.url("/core/repos"))
        .header("Cookie", session.header())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn repos_are_listed_from_github() {
    let server = TestServer::new().await;
    let session = server.login_github().await;

    let response = server
        .client
        .get(server.url("/core/repos"))
        .header("Cookie", session.header())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let repos: serde_json::Value = response.json().await.unwrap();
    assert_eq!(repos.as_array().unwrap().len(), 2);
    assert_eq!(repos[0]["name"], "dox");
    assert_eq!(repos[1]["private"], true);
}

#[tokio::test]
async fn connect_and_disconnect_roundtrip() {
    let server = TestServer::new().await;
    let session = server.login_github().await;

    let connect = server
        .client
        .post(server.url("/core/connect-repo"))
        .header("Cookie", session.header())
        .json(&json!({ "repoName": "dox", "owner": "ada-dev" }))
        .send()
        .await
        .unwrap();
    assert_eq!(connect.status(), 200);
    let connected: serde_json::Value = connect.json().await.unwrap();
    assert_eq!(connected["repoId"], "500");
    // Branch defaults to the repository default
    assert_eq!(connected["branch"], "main");

    let list = server
        .client
        .get(server.url("/core/connected-repos"))
        .header("Cookie", session.header())
        .send()
        .await
        .unwrap();
    let repos: serde_json::Value = list.json().await.unwrap();
    assert_eq!(repos.as_array().unwrap().len(), 1);
    assert_eq!(repos[0]["owner"], "ada-dev");

    let disconnect = server
        .client
        .post(server.url("/core/disconnect-repo"))
        .header("Cookie", session.header())
        .json(&json!({ "repoId": "500" }))
        .send()
        .await
        .unwrap();
    assert_eq!(disconnect.status(), 200);
    let body: serde_json::Value = disconnect.json().await.unwrap();
    assert_eq!(body["success"], true);

    let list = server
        .client
        .get(server.url("/core/connected-repos"))
        .header("Cookie", session.header())
        .send()
        .await
        .unwrap();
    let repos: serde_json::Value = list.json().await.unwrap();
    assert!(repos.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn connecting_twice_is_a_conflict() {
    let server = TestServer::new().await;
    let session = server.login_github().await;

    let payload = json!({ "repoName": "notes", "owner": "ada-dev", "branch": "docs" });

    let first = server
        .client
        .post(server.url("/core/connect-repo"))
        .header("Cookie", session.header())
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    let connected: serde_json::Value = first.json().await.unwrap();
    // The requested branch wins over the default
    assert_eq!(connected["branch"], "docs");

    let second = server
        .client
        .post(server.url("/core/connect-repo"))
        .header("Cookie", session.header())
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 409);
}

#[tokio::test]
async fn disconnecting_an_unknown_repo_is_not_found() {
    let server = TestServer::new().await;
    let session = server.login_github().await;

    let response = server
        .client
        .post(server.url("/core/disconnect-repo"))
        .header("Cookie", session.header())
        .json(&json!({ "repoId": "999" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn connecting_an_unknown_repo_is_not_found() {
    let server = TestServer::new().await;
    let session = server.login_github().await;

    let response = server
        .client
        .post(server.url("/core/connect-repo"))
        .header("Cookie", session.header())
        .json(&json!({ "repoName": "missing", "owner": "ada-dev" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn connect_validates_the_payload() {
    let server = TestServer::new().await;
    let session = server.login_github().await;

    let response = server
        .client
        .post(server.url("/core/connect-repo"))
        .header("Cookie", session.header())
        .json(&json!({ "repoName": "", "owner": "ada-dev" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}
