//! End-to-end tests: the real server on an ephemeral port, every upstream
//! mocked with wiremock, driven over HTTP with reqwest.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use kontakt_bff::content::ContentType;
use kontakt_bff::{AppState, Config, Server, app};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use wiremock::matchers::{body_string, body_string_contains, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASE: &str = "/person/pb-kontakt-oss-api";
const COOKIE: &str = "selvbetjening-idtoken";

struct Harness {
    url: String,
    client: reqwest::Client,
    sanity: MockServer,
    enheter: MockServer,
    mottak: MockServer,
    tokens: MockServer,
}

impl Harness {
    async fn start(overrides: &[(&'static str, &str)]) -> Self {
        let sanity = MockServer::start().await;
        let enheter = MockServer::start().await;
        let mottak = MockServer::start().await;
        let tokens = MockServer::start().await;

        let mut vars: HashMap<&'static str, String> = HashMap::from([
            ("SANITY_PROJECT_ID", "proj".to_owned()),
            ("SANITY_DATASET", "test".to_owned()),
            ("SANITY_TOKEN", "sanity-token".to_owned()),
            ("SANITY_API_HOST", sanity.uri()),
            ("SANITY_MANAGEMENT_HOST", sanity.uri()),
            ("ENHETERRS_URL", format!("{}/api", enheter.uri())),
            ("TILBAKEMELDINGSMOTTAK_URL", mottak.uri()),
            ("TOKEN_ENDPOINT", format!("{}/token", tokens.uri())),
            ("TOKEN_CLIENT_ID", "bff".to_owned()),
            ("TOKEN_CLIENT_SECRET", "s3cret".to_owned()),
            ("MOTTAK_AUDIENCE", "mottak-audience".to_owned()),
        ]);
        for (k, v) in overrides {
            vars.insert(*k, (*v).to_owned());
        }

        let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        let state = Arc::new(AppState::from_config(&config).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(
            Server::from_listener(listener)
                .serve_with_shutdown(app::router(state), std::future::pending()),
        );

        Self {
            url: format!("http://{addr}{BASE}"),
            client: reqwest::Client::new(),
            sanity,
            enheter,
            mottak,
            tokens,
        }
    }

    fn get(&self, suffix: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{suffix}", self.url))
    }

    fn post(&self, suffix: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{suffix}", self.url))
    }
}

fn id_token(sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": sub }).to_string());
    format!("{header}.{payload}.sig")
}

async fn mock_content(server: &MockServer, kind: ContentType, result: Value, times: u64) {
    Mock::given(method("GET"))
        .and(path("/v2021-06-07/data/query/test"))
        .and(query_param("query", kind.query()))
        .and(header("authorization", "Bearer sanity-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ms": 3,
            "query": kind.query(),
            "result": result,
        })))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn health_probes_answer_200() {
    let h = Harness::start(&[]).await;
    for probe in ["/internal/isAlive", "/internal/isReady"] {
        assert_eq!(h.get(probe).send().await.unwrap().status(), 200);
    }
}

#[tokio::test]
async fn fodselsnr_comes_from_identity_cookie() {
    let h = Harness::start(&[]).await;

    let res = h
        .get("/fodselsnr")
        .header("cookie", format!("{COOKIE}={}", id_token("12345678901")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "fodselsnr": "12345678901" }));

    let res = h.get("/fodselsnr").send().await.unwrap();
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn content_is_fetched_once_within_ttl() {
    let h = Harness::start(&[]).await;
    let alerts = json!([{ "_id": "a1", "_type": "alert", "title": "Driftsmelding" }]);
    mock_content(&h.sanity, ContentType::Alerts, alerts.clone(), 1).await;

    for _ in 0..3 {
        let res = h.get("/alerts").send().await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.json::<Value>().await.unwrap(), alerts);
    }
}

#[tokio::test]
async fn each_content_type_has_its_own_query() {
    let h = Harness::start(&[]).await;
    for kind in ContentType::ALL {
        mock_content(&h.sanity, kind, json!([{ "_type": kind.document_type() }]), 1).await;
    }
    for kind in ContentType::ALL {
        let body: Value = h.get(&format!("/{kind}")).send().await.unwrap().json().await.unwrap();
        assert_eq!(body[0]["_type"], kind.document_type());
    }
}

#[tokio::test]
async fn clear_cache_forces_refetch() {
    let h = Harness::start(&[]).await;
    mock_content(&h.sanity, ContentType::Faq, json!([]), 2).await;

    h.get("/faq").send().await.unwrap();
    h.get("/faq").send().await.unwrap();

    let res = h.post("/clear-cache").send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "result": "Cache cleared" }));

    h.get("/faq").send().await.unwrap();
}

#[tokio::test]
async fn content_failure_is_502_and_not_cached() {
    let h = Harness::start(&[]).await;
    Mock::given(method("GET"))
        .and(path("/v2021-06-07/data/query/test"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(2)
        .mount(&h.sanity)
        .await;

    for _ in 0..2 {
        let res = h.get("/themes").send().await.unwrap();
        assert_eq!(res.status(), 502);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["message"], "upstream unavailable: sanity responded 500 Internal Server Error: boom");
    }
}

#[tokio::test]
async fn update_permissions_returns_static_ack() {
    let h = Harness::start(&[]).await;
    Mock::given(method("PATCH"))
        .and(path("/v2021-06-07/projects/proj/datasets/test"))
        .and(header("authorization", "Bearer sanity-token"))
        .and(body_string(r#"{"aclMode":"public"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "aclMode": "public" })))
        .expect(1)
        .mount(&h.sanity)
        .await;

    let res = h.get("/update-permissions").send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.json::<Value>().await.unwrap(),
        json!({ "result": "Updated Sanity permissions" })
    );
}

#[tokio::test]
async fn enheter_is_forwarded_with_prefix_stripped() {
    let h = Harness::start(&[("ENHETER_API_KEY", "enheter-key")]).await;
    Mock::given(method("GET"))
        .and(path("/api/123"))
        .and(query_param("geo", "0301"))
        .and(header("nav-consumer-id", "pb-kontakt-oss-api"))
        .and(header("x-nav-apikey", "enheter-key"))
        .and(header_exists("nav-call-id"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-upstream", "enheter")
                .set_body_json(json!({ "enhetNr": "123" })),
        )
        .expect(1)
        .mount(&h.enheter)
        .await;

    let res = h.get("/enheter/123?geo=0301").send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-upstream"], "enheter");
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "enhetNr": "123" }));
}

#[tokio::test]
async fn enheter_relays_upstream_status_and_keeps_call_id() {
    let h = Harness::start(&[]).await;
    Mock::given(method("DELETE"))
        .and(path("/api/9"))
        .and(header("nav-call-id", "call-42"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such enhet"))
        .expect(1)
        .mount(&h.enheter)
        .await;

    let res = h
        .client
        .delete(format!("{}/enheter/9", h.url))
        .header("nav-call-id", "call-42")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "no such enhet");
}

#[tokio::test]
async fn enheter_redirects_are_relayed_not_followed() {
    let h = Harness::start(&[]).await;
    Mock::given(method("POST"))
        .and(path("/api/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/api/new"))
        .expect(1)
        .mount(&h.enheter)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("followed"))
        .expect(0)
        .mount(&h.enheter)
        .await;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let res = client
        .post(format!("{}/enheter/old", h.url))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(res.headers()["location"], "/api/new");
}

#[tokio::test]
async fn mottak_exchanges_token_before_forwarding() {
    let h = Harness::start(&[]).await;
    let id = id_token("12345678901");

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Atoken-exchange"))
        .and(body_string_contains(format!("subject_token={id}")))
        .and(body_string_contains("audience=mottak-audience"))
        .and(body_string_contains("client_id=bff"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "service-token",
            "token_type": "Bearer",
            "expires_in": 300,
        })))
        .expect(1)
        .mount(&h.tokens)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/tilbakemelding/ros"))
        .and(header("authorization", "Bearer service-token"))
        .and(header("nav-consumer-id", "pb-kontakt-oss-api"))
        .and(body_string(r#"{"hvaSlagsTilbakemelding":"ROS"}"#))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&h.mottak)
        .await;

    let res = h
        .post("/mottak/rest/tilbakemelding/ros")
        .header("cookie", format!("{COOKIE}={id}"))
        .header("content-type", "application/json")
        .body(r#"{"hvaSlagsTilbakemelding":"ROS"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
}

#[tokio::test]
async fn rejected_token_exchange_is_502_with_endpoint_reason() {
    let h = Harness::start(&[]).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .expect(1)
        .mount(&h.tokens)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&h.mottak)
        .await;

    let res = h
        .post("/mottak/ros")
        .header("cookie", format!("{COOKIE}={}", id_token("12345678901")))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        "upstream unavailable: token exchange responded 400 Bad Request: invalid_grant"
    );
}

#[tokio::test]
async fn mottak_without_identity_is_rejected_before_any_upstream_call() {
    let h = Harness::start(&[]).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.tokens)
        .await;

    let res = h.post("/mottak/ros").body("{}").send().await.unwrap();
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn unreachable_upstream_is_502() {
    let h = Harness::start(&[("ENHETERRS_URL", "http://127.0.0.1:1")]).await;
    let res = h.get("/enheter/1").send().await.unwrap();
    assert_eq!(res.status(), 502);
}

#[tokio::test]
async fn cors_headers_follow_environment() {
    let h = Harness::start(&[("APP_ENV", "production")]).await;

    let res = h.get("/internal/isAlive").header("origin", "https://foo.nav.no").send().await.unwrap();
    assert_eq!(res.headers()["access-control-allow-origin"], "https://foo.nav.no");
    assert_eq!(res.headers()["access-control-allow-credentials"], "true");

    let res = h.get("/internal/isAlive").header("origin", "https://evil.com").send().await.unwrap();
    assert!(res.headers().get("access-control-allow-origin").is_none());

    let res = h.get("/internal/isAlive").send().await.unwrap();
    assert!(res.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn unknown_routes_and_methods() {
    let h = Harness::start(&[]).await;
    assert_eq!(h.get("/nope").send().await.unwrap().status(), 404);
    assert_eq!(h.post("/alerts").send().await.unwrap().status(), 405);
    assert_eq!(h.get("/clear-cache").send().await.unwrap().status(), 405);
}
