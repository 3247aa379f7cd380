use github::{Client, CommitStatusState};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> Client {
    Client::builder()
        .base_url(format!("{}/", server.uri()))
        .personal_token("test-token")
        .build()
        .unwrap()
}

#[tokio::test]
async fn merge_sends_merge_method() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/repos/owner/name/pulls/1/merge"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(serde_json::json!({
            "commit_title": "Title (#1)",
            "commit_message": "",
            "merge_method": "squash"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sha": "abc",
            "merged": true,
            "message": "Pull Request successfully merged"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client
        .pulls()
        .merge("owner", "name", 1, "Title (#1)", "", "squash")
        .await
        .unwrap();
}

#[tokio::test]
async fn status_errors_are_retried_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/repos/owner/name/statuses/abcdef"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/repos/owner/name/statuses/abcdef"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client
        .repos()
        .create_commit_status(
            "owner",
            "name",
            "abcdef",
            CommitStatusState::Success,
            "Validation",
            "All good",
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn labels_are_drained_across_pages() {
    let server = MockServer::start().await;

    let first_page: Vec<serde_json::Value> = (0..100)
        .map(|i| serde_json::json!({"name": format!("label-{}", i), "color": null, "description": null}))
        .collect();

    Mock::given(method("GET"))
        .and(path("/repos/owner/name/issues/1/labels"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(first_page))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/owner/name/issues/1/labels"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"name": "step/awaiting-merge", "color": null, "description": null}
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let labels = client.issues().labels("owner", "name", 1).await.unwrap();

    assert_eq!(labels.len(), 101);
    assert_eq!(labels[100], "step/awaiting-merge");
}

#[tokio::test]
async fn review_decision_null_means_skipped() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"repository": {"pullRequest": {"reviewDecision": null}}}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let decision = client
        .pulls()
        .review_decision("owner", "name", 1)
        .await
        .unwrap();

    assert!(decision.is_none());
}
