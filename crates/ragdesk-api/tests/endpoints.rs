//! REST endpoint tests against a mock backend

use std::time::Duration;

use ragdesk_api::{
    notification_for, ApiClient, ApiError, ClientConfig, DocumentStatus, Review,
    GUEST_EMAIL_HEADER,
};
use ragdesk_common::{AuthState, UserRole};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ApiClient {
    let config = ClientConfig::new(server.uri()).with_retry_delay(Duration::from_millis(10));
    ApiClient::new(config, AuthState::new()).unwrap()
}

async fn logged_in(server: &MockServer, role: &str) -> ApiClient {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "admin-token",
            "token_type": "bearer",
            "user": {"id": 1, "email": "root@example.com", "role": role}
        })))
        .mount(server)
        .await;

    let client = client(server);
    client.login("root@example.com", "pw").await.unwrap();
    client
}

#[tokio::test]
async fn test_login_sets_bearer_token() {
    let server = MockServer::start().await;
    let client = logged_in(&server, "superadmin").await;

    assert!(client.auth().is_authenticated());
    assert_eq!(client.auth().role(), Some(UserRole::Superadmin));

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer admin-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "1", "email": "root@example.com", "name": "Root", "role": "superadmin"
        })))
        .mount(&server)
        .await;

    let me = client.me().await.unwrap();
    assert_eq!(me.name.as_deref(), Some("Root"));

    client.logout();
    assert!(!client.auth().is_authenticated());
}

#[tokio::test]
async fn test_bad_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid credentials"})),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client.login("a@b.c", "nope").await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized);
    assert!(!client.auth().is_authenticated());
}

#[tokio::test]
async fn test_guest_email_header_when_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions"))
        .and(header(GUEST_EMAIL_HEADER, "guest@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"session_id": "s1", "title": "First", "message_count": 4}
        ])))
        .mount(&server)
        .await;

    let client = client(&server);
    client.set_guest_email(Some("guest@example.com".to_string()));
    let sessions = client.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].message_count, 4);
}

#[tokio::test]
async fn test_get_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rag/collections"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/rag/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collections": [{"id": 5, "name": "Manuals", "document_count": 3}]
        })))
        .mount(&server)
        .await;

    let collections = client(&server).list_collections().await.unwrap();
    assert_eq!(collections[0].id, "5");
    assert_eq!(collections[0].document_count, 3);
}

#[tokio::test]
async fn test_session_resources() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/sessions/s%201"))
        .and(body_json(json!({"title": "Renamed"})))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/sessions/s1/messages"))
        .and(body_json(json!({"messages": [{"role": "user", "content": "hi"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/s1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/sessions/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Session not found"})))
        .mount(&server)
        .await;

    let client = client(&server);
    client.rename_session("s 1", "Renamed").await.unwrap();

    let messages = vec![json!({"role": "user", "content": "hi"})];
    client.put_session_messages("s1", &messages).await.unwrap();

    let fetched: Vec<serde_json::Value> = client.get_session_messages("s1").await.unwrap();
    assert_eq!(fetched, messages);

    let err = client.delete_session("gone").await.unwrap_err();
    assert_eq!(err, ApiError::NotFound("Session not found".to_string()));
}

#[tokio::test]
async fn test_documents_flow() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rag/documents"))
        .and(query_param("collection_id", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "filename": "a.pdf", "size": 10, "chunk_count": 2, "status": "ready"},
            {"id": 2, "filename": "b.pdf", "size": 20, "chunk_count": 0, "status": "needs_review"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/rag/documents/2/approve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ready"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/rag/documents"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 3, "filename": "notes.txt", "size": 5, "status": "pending", "collection_id": 7
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let docs = client.list_documents(Some("7")).await.unwrap();
    assert_eq!(docs.len(), 2);

    let err = client.review_document(&docs[0], Review::Approve).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    client.review_document(&docs[1], Review::Approve).await.unwrap();

    let uploaded = client
        .upload_document("notes.txt", b"hello".to_vec(), Some("7"))
        .await
        .unwrap();
    assert_eq!(uploaded.status, DocumentStatus::Pending);
    assert_eq!(uploaded.collection_id.as_deref(), Some("7"));
}

#[tokio::test]
async fn test_impersonation_round_trip() {
    let server = MockServer::start().await;
    let client = logged_in(&server, "superadmin").await;

    Mock::given(method("POST"))
        .and(path("/api/admin/impersonate/42"))
        .and(header("authorization", "Bearer admin-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "user-token",
            "user": {"id": 42, "email": "user@example.com", "role": "user"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/admin/stats"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"detail": "Superadmin access required"})),
        )
        .mount(&server)
        .await;

    let session = client.start_impersonation("42").await.unwrap();
    assert_eq!(session.impersonating.as_deref(), Some("user@example.com"));
    assert!(client.is_impersonating());
    assert_eq!(
        client.impersonation_origin().map(|s| s.token).as_deref(),
        Some("admin-token")
    );

    let err = client.system_stats().await.unwrap_err();
    assert!(matches!(err, ApiError::Permission(_)));
    assert!(notification_for(&err, client.is_impersonating()).is_none());

    let admin = client.stop_impersonation().unwrap();
    assert_eq!(admin.token, "admin-token");
    assert!(!client.is_impersonating());
    assert!(notification_for(&err, client.is_impersonating()).is_some());
    assert!(client.stop_impersonation().is_err());

    client.resume_impersonation(admin);
    assert!(client.stop_impersonation().is_ok());
}

#[tokio::test]
async fn test_admin_user_actions_and_usage() {
    let server = MockServer::start().await;
    let client = logged_in(&server, "admin").await;

    Mock::given(method("GET"))
        .and(path("/api/admin/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"users": [
            {"id": 2, "email": "x@example.com", "role": "user", "is_blocked": false}
        ]})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/admin/users/2/block"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/admin/activity"))
        .and(query_param("page", "1"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 9, "action": "login"}], "total": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/monitoring/usage/today"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "requests": 3, "tokens": 120, "users": []
        })))
        .mount(&server)
        .await;

    let users = client.list_users().await.unwrap();
    client.block_user(&users[0].id).await.unwrap();

    let page = client.activity_log(0, 20).await.unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.items[0].id.as_deref(), Some("9"));
    assert!(!page.has_more());

    let usage = client.usage_today().await.unwrap();
    assert_eq!(usage.tokens, 120);
}
