use std::sync::Arc;

use axum::http::{self, Request, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use mock_server::{app, app_with, router, AppState, MockConfig, TEST_API_KEY, TEST_API_TOKEN};
use serde_json::Value;
use tower::ServiceExt;

const CREDS: &str = "api_key=test-key&api_token=test-token";

async fn body_bytes(response: axum::response::Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn form_request(uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            http::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        )
        .body(body.to_string())
        .unwrap()
}

fn get_request(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

fn signed(fields: &str) -> String {
    if fields.is_empty() {
        CREDS.to_string()
    } else {
        format!("{CREDS}&{fields}")
    }
}

const DEPLOY_FIELDS: &str = "name=trainer&gpu_count=2&gpu_model=geforcertx3090-pcie-24gb\
&vcpus=8&ram=32&external_ports=%7B20022%2C%2028888%7D&internal_ports=%7B22%2C%208888%7D\
&hostnode=hn-3090-nyc&storage=100&operating_system=Ubuntu%2022.04%20LTS&password=hunter22\
&deployment_type=local";

// --- auth ---

#[tokio::test]
async fn test_authorization_succeeds_with_valid_credentials() {
    let resp = app()
        .oneshot(form_request("/api/v0/auth/test", CREDS))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, serde_json::json!({ "success": true }));
}

#[tokio::test]
async fn test_authorization_rejects_wrong_token() {
    let resp = app()
        .oneshot(form_request(
            "/api/v0/auth/test",
            "api_key=test-key&api_token=nope",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn list_authorizations_names_the_key() {
    let resp = app()
        .oneshot(form_request("/api/v0/auth/list", CREDS))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["authorizations"][TEST_API_KEY]["api_key"], TEST_API_KEY);
}

// --- billing ---

#[tokio::test]
async fn balance_starts_full_with_no_spending() {
    let resp = app()
        .oneshot(form_request("/api/v0/billing/balance", CREDS))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["balance"], 100.0);
    assert_eq!(body["hourly_spending_rate"], 0.0);
}

#[tokio::test]
async fn replies_are_json_objects() {
    let resp = app()
        .oneshot(form_request("/api/v0/billing/balance", CREDS))
        .await
        .unwrap();

    let content_type = resp.headers()[http::header::CONTENT_TYPE].to_str().unwrap();
    assert_eq!(content_type, "application/json");
    let raw = body_bytes(resp).await;
    assert!(raw.starts_with(b"{"), "{raw:?}");
}

// --- hostnodes ---

#[tokio::test]
async fn anonymous_hostnode_list_hides_reserved() {
    let resp = app()
        .oneshot(get_request("/api/v0/client/deploy/hostnodes"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let hostnodes = body["hostnodes"].as_object().unwrap();
    assert_eq!(hostnodes.len(), 3);
    assert!(!hostnodes.contains_key("hn-a100-reserved"));
}

#[tokio::test]
async fn authenticated_hostnode_list_includes_reserved() {
    let resp = app()
        .oneshot(get_request(&format!(
            "/api/v0/client/deploy/hostnodes?{CREDS}"
        )))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert!(body["hostnodes"]
        .as_object()
        .unwrap()
        .contains_key("hn-a100-reserved"));
}

#[tokio::test]
async fn hostnode_filters_apply() {
    let resp = app()
        .oneshot(get_request(
            "/api/v0/client/deploy/hostnodes?minRAM=100&requiresRTX=true",
        ))
        .await
        .unwrap();

    let body = body_json(resp).await;
    let ids: Vec<&String> = body["hostnodes"].as_object().unwrap().keys().collect();
    assert_eq!(ids, vec!["hn-3090-nyc", "hn-a6000-chi"]);
}

#[tokio::test]
async fn specific_hostnode_found_and_missing() {
    let resp = app()
        .oneshot(get_request("/api/v0/client/deploy/hostnodes/hn-1080-lv"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["hostnode"]["gpu_model"], "geforcegtx1080ti-pcie-11gb");

    let resp = app()
        .oneshot(get_request("/api/v0/client/deploy/hostnodes/abc-123"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- deploy ---

#[tokio::test]
async fn deploy_returns_server_and_port_forwards() {
    let resp = app()
        .oneshot(form_request(
            "/api/v0/client/deploy/single",
            &signed(DEPLOY_FIELDS),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert!(!body["server"].as_str().unwrap().is_empty());
    assert_eq!(body["port_forwards"]["22"], 20022);
    assert_eq!(body["port_forwards"]["8888"], 28888);
}

#[tokio::test]
async fn deploy_rejects_malformed_ports() {
    let fields = DEPLOY_FIELDS.replace(
        "external_ports=%7B20022%2C%2028888%7D",
        "external_ports=20022",
    );
    let resp = app()
        .oneshot(form_request("/api/v0/client/deploy/single", &signed(&fields)))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deploy_unknown_hostnode_is_unsuccessful() {
    let fields = DEPLOY_FIELDS.replace("hostnode=hn-3090-nyc", "hostnode=nowhere");
    let resp = app()
        .oneshot(form_request("/api/v0/client/deploy/single", &signed(&fields)))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn deploy_missing_field_is_bad_request() {
    let resp = app()
        .oneshot(form_request(
            "/api/v0/client/deploy/single",
            &signed("name=only-a-name"),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- spot ---

#[tokio::test]
async fn spot_validation_compares_against_floor() {
    let new_spot = "gpu_count=1&gpu_model=rtxa6000-pcie-48gb&vcpus=4\
&hostnode=hn-a6000-chi&ram=16&storage=50";

    let resp = app()
        .oneshot(form_request(
            "/api/v0/client/spot/validate/new",
            &signed(&format!("{new_spot}&price=0.3")),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["success"], true);

    let resp = app()
        .oneshot(form_request(
            "/api/v0/client/spot/validate/new",
            &signed(&format!("{new_spot}&price=0.01")),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["success"], false);
}

#[tokio::test]
async fn existing_spot_validation_needs_known_server() {
    let resp = app()
        .oneshot(form_request(
            "/api/v0/client/spot/validate/new",
            &signed("server=missing&price=5.0"),
        ))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "no such server");
}

// --- failure injection ---

#[tokio::test]
async fn failing_config_answers_every_endpoint_with_status() {
    let app = app_with(MockConfig::failing(StatusCode::INTERNAL_SERVER_ERROR));
    let resp = app
        .clone()
        .oneshot(form_request("/api/v0/auth/test", CREDS))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let resp = app
        .oneshot(get_request("/api/v0/client/deploy/hostnodes"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// --- full VM lifecycle ---

#[tokio::test]
async fn vm_lifecycle() {
    use tower::Service;

    let state = Arc::new(AppState::new(MockConfig::default()));
    let mut app = router(Arc::clone(&state)).into_service();

    macro_rules! call {
        ($req:expr) => {{
            let resp = ServiceExt::ready(&mut app)
                .await
                .unwrap()
                .call($req)
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            body_json(resp).await
        }};
    }

    // deploy on network storage so the VM can be modified later
    let fields = format!(
        "{DEPLOY_FIELDS}&location=Chicago"
    )
    .replace("deployment_type=local", "deployment_type=network");
    let deployed = call!(form_request("/api/v0/client/deploy/single", &signed(&fields)));
    assert_eq!(deployed["success"], true);
    let id = deployed["server"].as_str().unwrap().to_string();

    // list
    let listed = call!(form_request("/api/v0/client/list", CREDS));
    assert!(listed["virtualmachines"].as_object().unwrap().contains_key(&id));

    // modify while running is refused
    let modify = format!(
        "server_id={id}&gpu_model=geforcertx3090-pcie-24gb&gpu_count=1&ram=16&vcpus=4&storage=100"
    );
    let refused = call!(form_request("/api/v0/client/modify/single", &signed(&modify)));
    assert_eq!(refused["success"], false);

    // stop, keeping the GPU
    let stopped = call!(form_request(
        "/api/v0/client/stop/single",
        &signed(&format!("server={id}&disassociate_resources=false"))
    ));
    assert_eq!(stopped["success"], true);
    let vm = state.virtual_machine(&id).await.unwrap();
    assert_eq!(vm.status, "stopped");
    assert!(!vm.gpu_released);

    // modify now succeeds
    let modified = call!(form_request("/api/v0/client/modify/single", &signed(&modify)));
    assert_eq!(modified["success"], true);
    let details = call!(form_request(
        "/api/v0/client/get/single",
        &signed(&format!("server={id}"))
    ));
    assert_eq!(details["virtualmachine"]["gpu_count"], 1);
    assert_eq!(details["virtualmachine"]["ram"], 16);

    // start
    let started = call!(form_request(
        "/api/v0/client/start/single",
        &signed(&format!("server={id}"))
    ));
    assert_eq!(started["success"], true);

    // delete, then it is gone
    let deleted = call!(form_request(
        "/api/v0/client/delete/single",
        &signed(&format!("server={id}"))
    ));
    assert_eq!(deleted["success"], true);
    let gone = call!(form_request(
        "/api/v0/client/get/single",
        &signed(&format!("server={id}"))
    ));
    assert_eq!(gone["success"], false);

    // every request carried the credentials
    let requests = state.requests().await;
    assert_eq!(requests.len(), 9);
    for req in requests {
        assert_eq!(req.fields.get("api_key").map(String::as_str), Some(TEST_API_KEY));
        assert_eq!(req.fields.get("api_token").map(String::as_str), Some(TEST_API_TOKEN));
    }
}
