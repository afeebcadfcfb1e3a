use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use runwatch_core::{Feature, RunId};
use runwatch_engine::sse::SseDecoder;
use runwatch_engine::{
    fetch_summary, trigger_run, FailureKind, ReqwestSource, StreamSource, SupervisorSettings,
    TriggerError, TriggerOutcome,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source() -> ReqwestSource {
    ReqwestSource::new(&SupervisorSettings::default()).expect("client")
}

fn url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{route}", server.uri())).expect("url")
}

#[tokio::test]
async fn summary_poll_parses_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/run/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"running":true,"raw_started_ts":1700000000,
                "features":{"ratings":{"added":2,"removed":1,"updated":3}}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let summary = fetch_summary(&source(), &url(&server, "/api/run/summary"))
        .await
        .expect("summary");
    assert!(summary.running);
    assert_eq!(summary.run_id, Some(RunId::issued(1_700_000_000)));
    assert_eq!(summary.lanes[&Feature::Ratings].updated, 3);
}

#[tokio::test]
async fn summary_poll_reports_status_and_decode_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let err = fetch_summary(&source(), &url(&server, "/missing"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::HttpStatus(503));

    let err = fetch_summary(&source(), &url(&server, "/garbage"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Decode);
}

#[tokio::test]
async fn trigger_distinguishes_started_skipped_and_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/started"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"ok":true,"run_id":"1700000000"}"#, "application/json"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/skipped"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"ok":true,"skipped":"no_pairs_configured"}"#,
            "application/json",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rejected"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"ok":false,"error":"sync already running"}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let source = source();
    assert_eq!(
        trigger_run(&source, &url(&server, "/started")).await.unwrap(),
        TriggerOutcome::Started {
            run_id: Some(RunId::issued(1_700_000_000))
        }
    );
    assert_eq!(
        trigger_run(&source, &url(&server, "/skipped")).await.unwrap(),
        TriggerOutcome::Skipped {
            reason: "no_pairs_configured".to_string()
        }
    );
    match trigger_run(&source, &url(&server, "/rejected")).await {
        Err(TriggerError::Rejected(reason)) => assert_eq!(reason, "sync already running"),
        other => panic!("unexpected trigger result: {other:?}"),
    }
}

#[tokio::test]
async fn event_stream_body_decodes_into_frames() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/run/summary/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "event: run:start\ndata: {\"event\":\"run:start\"}\n\ndata: {\"running\":true}\n\n",
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let mut stream = source()
        .open(&url(&server, "/api/run/summary/stream"))
        .await
        .expect("stream");
    let mut decoder = SseDecoder::new();
    let mut frames = Vec::new();
    while let Some(chunk) = stream.next().await {
        frames.extend(decoder.push(&chunk.expect("chunk")));
    }

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].event.as_deref(), Some("run:start"));
    assert_eq!(frames[1].event, None);
    assert_eq!(frames[1].data, r#"{"running":true}"#);
}

#[tokio::test]
async fn stream_open_fails_on_http_status() {
    let server = MockServer::start().await;
    let err = match source().open(&url(&server, "/nowhere")).await {
        Ok(_) => panic!("stream should not open"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), FailureKind::HttpStatus(404));
}
