use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use pretty_assertions::assert_eq;
use runwatch_core::{Feature, Phase, PipelineSettings, RunId, RunSnapshot};
use runwatch_engine::{
    ByteStream, ChannelError, RunHooks, StreamSource, SupervisorSettings, TelemetryHandle,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(runwatch_logging::initialize_for_tests);
}

fn fast_settings(base_url: &str) -> SupervisorSettings {
    SupervisorSettings {
        base_url: base_url.to_string(),
        reconnect_delay: Duration::from_millis(20),
        max_reconnect_delay: Duration::from_millis(100),
        watchdog_timeout: Duration::from_millis(300),
        watchdog_check_interval: Duration::from_millis(50),
        poll_active: Duration::from_millis(50),
        poll_idle: Duration::from_millis(50),
        poll_hidden: Duration::from_secs(60),
        tick_interval: Duration::from_millis(100),
        ..SupervisorSettings::default()
    }
}

async fn wait_for(
    handle: &TelemetryHandle,
    what: &str,
    mut done: impl FnMut(&RunSnapshot) -> bool,
) -> RunSnapshot {
    for _ in 0..250 {
        let snapshot = handle.snapshot();
        if done(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}: {:?}", handle.snapshot());
}

#[derive(Default)]
struct Recorder {
    active: Mutex<Vec<bool>>,
    refreshed: Mutex<Vec<RunId>>,
}

impl RunHooks for Recorder {
    fn run_active(&self, active: bool) {
        self.active.lock().unwrap().push(active);
    }

    fn refresh_downstream(&self, run_id: &RunId) {
        self.refreshed.lock().unwrap().push(*run_id);
    }
}

/// Push streams that go silent after an optional opening frame, and a
/// summary endpoint whose counts grow with every poll.
#[derive(Default)]
struct SilentSource {
    announce_run: bool,
    open_delay: Duration,
    opens: Mutex<HashMap<String, usize>>,
    polls: Mutex<u64>,
}

impl SilentSource {
    fn opens(&self, route: &str) -> usize {
        self.opens.lock().unwrap().get(route).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StreamSource for SilentSource {
    async fn open(&self, url: &Url) -> Result<ByteStream, ChannelError> {
        let route = url.path().to_string();
        let count = {
            let mut opens = self.opens.lock().unwrap();
            let count = opens.entry(route.clone()).or_insert(0);
            *count += 1;
            *count
        };
        tokio::time::sleep(self.open_delay).await;
        let opening: Vec<Result<Bytes, ChannelError>> =
            if self.announce_run && count == 1 && route.ends_with("/summary/stream") {
                vec![Ok(Bytes::from_static(
                    b"event: run:start\ndata: {\"event\":\"run:start\"}\n\n",
                ))]
            } else {
                Vec::new()
            };
        Ok(stream::iter(opening).chain(stream::pending()).boxed())
    }

    async fn fetch(&self, _url: &Url) -> Result<Bytes, ChannelError> {
        let mut polls = self.polls.lock().unwrap();
        *polls += 1;
        Ok(Bytes::from(format!(
            r#"{{"running":{},"features":{{"watchlist":{{"added":{}}}}}}}"#,
            self.announce_run, *polls
        )))
    }

    async fn post(&self, _url: &Url) -> Result<Bytes, ChannelError> {
        Ok(Bytes::from_static(br#"{"ok":true}"#))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_push_streams_are_reopened_while_run_is_active() {
    init_logging();
    let source = Arc::new(SilentSource {
        announce_run: true,
        ..SilentSource::default()
    });
    let hooks = Arc::new(Recorder::default());
    let handle = TelemetryHandle::start_with_source(
        fast_settings("http://runner.invalid"),
        PipelineSettings::default(),
        source.clone(),
        hooks.clone(),
    )
    .expect("engine");

    wait_for(&handle, "run to become active", |s| s.run_active).await;
    for _ in 0..250 {
        if source.opens("/api/run/summary/stream") >= 2 && source.opens("/api/logs/stream") >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(source.opens("/api/run/summary/stream") >= 2);
    assert!(source.opens("/api/logs/stream") >= 2);

    // Polling keeps the lanes moving while push is silent.
    let snapshot = wait_for(&handle, "polled lane growth", |s| {
        s.lane(Feature::Watchlist).is_some_and(|lane| lane.added >= 3)
    })
    .await;
    assert!(snapshot.timeline.phase.is_active());
    assert_eq!(hooks.active.lock().unwrap().first(), Some(&true));
    handle.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn becoming_visible_reopens_both_streams() {
    init_logging();
    let source = Arc::new(SilentSource::default());
    let handle = TelemetryHandle::start_with_source(
        fast_settings("http://runner.invalid"),
        PipelineSettings::default(),
        source.clone(),
        Arc::new(Recorder::default()),
    )
    .expect("engine");

    for _ in 0..100 {
        if source.opens("/api/run/summary/stream") == 1 && source.opens("/api/logs/stream") == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // Idle: the watchdog stays disarmed however long push is silent.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(source.opens("/api/run/summary/stream"), 1);

    handle.set_visible(false);
    handle.set_visible(true);
    for _ in 0..100 {
        if source.opens("/api/run/summary/stream") >= 2 && source.opens("/api/logs/stream") >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(source.opens("/api/run/summary/stream"), 2);
    assert_eq!(source.opens("/api/logs/stream"), 2);
    assert_eq!(handle.snapshot().timeline.phase, Phase::Idle);
    handle.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn reopen_requested_while_connecting_does_not_reconnect_again() {
    init_logging();
    let source = Arc::new(SilentSource {
        open_delay: Duration::from_millis(300),
        ..SilentSource::default()
    });
    let handle = TelemetryHandle::start_with_source(
        fast_settings("http://runner.invalid"),
        PipelineSettings::default(),
        source.clone(),
        Arc::new(Recorder::default()),
    )
    .expect("engine");

    for _ in 0..100 {
        if source.opens("/api/run/summary/stream") == 1 && source.opens("/api/logs/stream") == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // Both opens are still in flight.
    handle.set_visible(false);
    handle.set_visible(true);

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(source.opens("/api/run/summary/stream"), 1);
    assert_eq!(source.opens("/api/logs/stream"), 1);
    handle.shutdown();
}

const PUSH_BODY: &str = "\
event: run:start\n\
data: {\"event\":\"run:start\",\"run_id\":\"1700000000\"}\n\
\n\
event: feature:start\n\
data: {\"event\":\"feature:start\",\"feature\":\"watchlist\"}\n\
\n\
: keepalive\n\
\n\
event: two:apply:add:A:done\n\
data: {\"event\":\"two:apply:add:A:done\",\"dst\":\"PLEX\",\"result\":{\"count\":3}}\n\
\n\
event: two:apply:add:B:done\n\
data: {\"event\":\"two:apply:add:B:done\",\"dst\":\"SIMKL\",\"count\":2}\n\
\n\
event: run:done\n\
data: {\"event\":\"run:done\",\"added\":5,\"removed\":0,\"pairs\":1}\n\
\n";

#[tokio::test(flavor = "multi_thread")]
async fn replayed_push_stream_completes_the_run_once() {
    init_logging();
    let server = MockServer::start().await;
    // The server closes the stream after each body, so the engine reconnects
    // and receives the whole buffer again.
    Mock::given(method("GET"))
        .and(path("/api/run/summary/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PUSH_BODY, "text/event-stream"))
        .mount(&server)
        .await;

    let hooks = Arc::new(Recorder::default());
    let handle = TelemetryHandle::start(
        fast_settings(&server.uri()),
        PipelineSettings::default(),
        hooks.clone(),
    )
    .expect("engine");

    let snapshot = wait_for(&handle, "run completion", |s| s.timeline.phase == Phase::Done).await;
    assert_eq!(snapshot.timeline.pct, 100);

    // Let a few replays go by.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.timeline.phase, Phase::Done);
    assert_eq!(snapshot.lane(Feature::Watchlist).map(|lane| lane.added), Some(5));
    assert_eq!(hooks.refreshed.lock().unwrap().len(), 1);
    assert_eq!(*hooks.active.lock().unwrap(), vec![true, false]);
    handle.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn start_run_reports_trigger_outcome() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/run"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"ok":true,"skipped":"no_pairs_configured"}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let handle = TelemetryHandle::start(
        fast_settings(&server.uri()),
        PipelineSettings::default(),
        Arc::new(Recorder::default()),
    )
    .expect("engine");

    let outcome = handle.start_run().await.expect("reply").expect("trigger");
    assert_eq!(
        outcome,
        runwatch_engine::TriggerOutcome::Skipped {
            reason: "no_pairs_configured".to_string()
        }
    );
    // A skipped trigger rolls the optimistic start back.
    wait_for(&handle, "reset to idle", |s| s.timeline.phase == Phase::Idle).await;
    handle.shutdown();
}
