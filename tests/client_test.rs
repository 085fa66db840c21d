//! Tests for DriveClient and authentication with mocked HTTP responses.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use gget::flow::ClientSecrets;
use gget::remote::{ChildFilter, RemoteStore};
use gget::storage::{StoredCredentials, TokenStorage};
use gget::{Authenticator, DriveClient, DriveError};
use mockito::{Matcher, Server};
use serde_json::json;
use tempfile::tempdir;

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

fn secrets(server_url: &str) -> ClientSecrets {
    ClientSecrets::from_json(
        &json!({
            "installed": {
                "client_id": "client-id",
                "client_secret": "client-secret",
                "token_uri": format!("{}/token", server_url)
            }
        })
        .to_string(),
    )
    .unwrap()
}

fn user_auth(server_url: &str, dir: &Path, access_token: &str, expiry: u64) -> (Authenticator, TokenStorage) {
    let storage = TokenStorage::new(dir.join("auth.dat"));
    let credentials = StoredCredentials {
        client_id: "client-id".to_string(),
        token_uri: format!("{}/token", server_url),
        access_token: Some(access_token.to_string()),
        refresh_token: Some("refresh-me".to_string()),
        token_expiry: Some(expiry),
    };
    storage.put(&credentials).unwrap();
    let auth = Authenticator::installed(secrets(server_url), storage.clone(), credentials);
    (auth, storage)
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn test_follows_page_tokens() {
        let mut server = Server::new_async().await;
        let dir = tempdir().unwrap();
        let (auth, _) = user_auth(&server.url(), dir.path(), "live-token", now() + 3600);
        let client = DriveClient::new(auth).with_base_url(server.url());

        let second = server
            .mock("GET", "/files")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "page-2".into()))
            .match_header("authorization", "Bearer live-token")
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [{"id": "c", "name": "c.txt"}]}).to_string())
            .create_async()
            .await;

        let first = server
            .mock("GET", "/files")
            .match_query(Matcher::UrlEncoded(
                "q".into(),
                "'root' in parents and trashed = false".into(),
            ))
            .match_header("authorization", "Bearer live-token")
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "files": [{"id": "a", "name": "a.txt"}, {"id": "b", "name": "b.txt"}],
                    "nextPageToken": "page-2"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let files = client.list_children("root", &ChildFilter::All).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);

        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_shared_drive_parameters() {
        let mut server = Server::new_async().await;
        let dir = tempdir().unwrap();
        let (auth, _) = user_auth(&server.url(), dir.path(), "live-token", now() + 3600);
        let client = DriveClient::new(auth)
            .with_base_url(server.url())
            .with_drive_id("shared-1");

        let mock = server
            .mock("GET", "/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("driveId".into(), "shared-1".into()),
                Matcher::UrlEncoded("corpora".into(), "drive".into()),
                Matcher::UrlEncoded(
                    "q".into(),
                    "'root' in parents and trashed = false and name = 'it\\'s'".into(),
                ),
            ]))
            .with_body(json!({"files": []}).to_string())
            .create_async()
            .await;

        let files = client
            .list_children("root", &ChildFilter::Named("it's".to_string()))
            .await
            .unwrap();
        assert!(files.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_envelope() {
        let mut server = Server::new_async().await;
        let dir = tempdir().unwrap();
        let (auth, _) = user_auth(&server.url(), dir.path(), "live-token", now() + 3600);
        let client = DriveClient::new(auth).with_base_url(server.url());

        let _mock = server
            .mock("GET", "/files/missing")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(json!({"error": {"code": 404, "message": "File not found: missing."}}).to_string())
            .create_async()
            .await;

        let err = client.get_by_id("missing").await.unwrap_err();
        match err {
            DriveError::ApiError { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("File not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

mod tokens {
    use super::*;

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_stored() {
        let mut server = Server::new_async().await;
        let dir = tempdir().unwrap();
        let (auth, storage) = user_auth(&server.url(), dir.path(), "stale-token", 0);

        let token = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "refresh-me".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                json!({"access_token": "new-token", "token_type": "Bearer", "expires_in": 3600}).to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        assert_eq!(auth.get_access_token().await.unwrap(), "new-token");
        // Served from cache the second time.
        assert_eq!(auth.get_access_token().await.unwrap(), "new-token");
        token.assert_async().await;

        let stored = storage.get().unwrap().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("new-token"));
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-me"));
        assert!(stored.token_expiry.unwrap() > now());
    }

    #[tokio::test]
    async fn test_revoked_refresh_token() {
        let mut server = Server::new_async().await;
        let dir = tempdir().unwrap();
        let (auth, storage) = user_auth(&server.url(), dir.path(), "stale-token", 0);

        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(
                json!({"error": "invalid_grant", "error_description": "Token has been expired or revoked."})
                    .to_string(),
            )
            .create_async()
            .await;

        let err = auth.get_access_token().await.unwrap_err();
        assert!(err.is_revoked());

        // The next run must see the credentials as invalid and re-authorize.
        let stored = storage.get().unwrap().unwrap();
        assert!(stored.invalid());
        assert!(stored.access_token.is_none());
    }

    #[tokio::test]
    async fn test_server_error_keeps_refresh_token() {
        let mut server = Server::new_async().await;
        let dir = tempdir().unwrap();
        let (auth, storage) = user_auth(&server.url(), dir.path(), "stale-token", 0);

        let _mock = server
            .mock("POST", "/token")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let err = auth.get_access_token().await.unwrap_err();
        assert!(matches!(err, DriveError::TokenRefreshError(_)));

        let stored = storage.get().unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-me"));
    }

    #[tokio::test]
    async fn test_live_token_needs_no_network() {
        let server = Server::new_async().await;
        let dir = tempdir().unwrap();
        let (auth, _) = user_auth(&server.url(), dir.path(), "live-token", now() + 3600);

        assert_eq!(auth.get_access_token().await.unwrap(), "live-token");
    }
}

mod service_account {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_authenticator_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let creds_json = json!({
            "client_email": "test@project.iam.gserviceaccount.com",
            "private_key": "key"
        });
        temp_file.write_all(creds_json.to_string().as_bytes()).unwrap();

        assert!(Authenticator::from_file(temp_file.path()).is_ok());
    }

    #[test]
    fn test_authenticator_from_invalid_json() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not valid json").unwrap();

        assert!(Authenticator::from_file(temp_file.path()).is_err());
        assert!(Authenticator::from_file("/nonexistent/path/credentials.json").is_err());
    }

    #[tokio::test]
    async fn test_bad_private_key_is_reported() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let creds_json = json!({
            "client_email": "test@project.iam.gserviceaccount.com",
            "private_key": "not a pem key"
        });
        temp_file.write_all(creds_json.to_string().as_bytes()).unwrap();

        let auth = Authenticator::from_file(temp_file.path()).unwrap();
        let err = auth.get_access_token().await.unwrap_err();
        assert!(matches!(err, DriveError::JwtError(_)));
    }
}
