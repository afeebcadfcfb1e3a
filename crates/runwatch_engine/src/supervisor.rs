//! The three update channels and the watchdog that keeps the push pair honest.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{FutureExt, StreamExt};
use runwatch_core::{ChannelKind, Msg};
use runwatch_logging::{rw_debug, rw_info, rw_warn};
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::poll::fetch_summary;
use crate::source::ByteStream;
use crate::sse::SseDecoder;
use crate::{now_ms, ChannelError, StreamSource, SupervisorSettings};

/// State shared between the dispatcher and the channel tasks.
#[derive(Debug, Default)]
pub(crate) struct Control {
    active: AtomicBool,
    hidden: AtomicBool,
    last_push_ms: AtomicU64,
    reopen_summary: Notify,
    reopen_log: Notify,
    poll_now: Notify,
    pub(crate) cancel: CancellationToken,
}

impl Control {
    pub(crate) fn new() -> Self {
        let control = Self::default();
        control.touch();
        control
    }

    pub(crate) fn touch(&self) {
        self.last_push_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub(crate) fn set_active(&self, active: bool) {
        if self.active.swap(active, Ordering::Relaxed) != active {
            // Re-evaluate the poll interval right away.
            self.poll_now.notify_one();
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub(crate) fn set_visible(&self, visible: bool) {
        let was_hidden = self.hidden.swap(!visible, Ordering::Relaxed);
        if visible && was_hidden {
            rw_info!("view visible again; reopening streams");
            self.touch();
            self.force_reopen();
            self.poll_now.notify_one();
        }
    }

    pub(crate) fn force_reopen(&self) {
        self.reopen_summary.notify_one();
        self.reopen_log.notify_one();
    }

    fn reopen_signal(&self, kind: ChannelKind) -> &Notify {
        match kind {
            ChannelKind::Log => &self.reopen_log,
            ChannelKind::Push | ChannelKind::Poll => &self.reopen_summary,
        }
    }

    fn poll_interval(&self, settings: &SupervisorSettings) -> Duration {
        if self.hidden.load(Ordering::Relaxed) {
            settings.poll_hidden
        } else if self.is_active() {
            settings.poll_active
        } else {
            settings.poll_idle
        }
    }
}

enum StreamEnd {
    Cancelled,
    Reopen,
    Closed,
    Failed(ChannelError),
}

/// Keeps one push stream open, reconnecting with capped backoff.
pub(crate) async fn run_stream(
    kind: ChannelKind,
    url: Url,
    source: Arc<dyn StreamSource>,
    settings: Arc<SupervisorSettings>,
    control: Arc<Control>,
    tx: mpsc::UnboundedSender<Msg>,
) {
    let reopen = control.reopen_signal(kind);
    let mut failures = 0u32;
    loop {
        let opened = tokio::select! {
            _ = control.cancel.cancelled() => return,
            opened = source.open(&url) => opened,
        };

        let end = match opened {
            Ok(stream) => {
                failures = 0;
                // A reopen requested while connecting is satisfied by this connection.
                let _ = reopen.notified().now_or_never();
                rw_info!("{} stream connected to {}", kind, url);
                control.touch();
                if tx
                    .send(Msg::ChannelOpened {
                        channel: kind,
                        at: now_ms(),
                    })
                    .is_err()
                {
                    return;
                }
                let end = pump(kind, stream, &control, reopen, &tx).await;
                let _ = tx.send(Msg::ChannelLost {
                    channel: kind,
                    at: now_ms(),
                });
                end
            }
            Err(err) => StreamEnd::Failed(err),
        };

        let delay = match end {
            StreamEnd::Cancelled => return,
            StreamEnd::Reopen => {
                rw_info!("{} stream reopening on request", kind);
                continue;
            }
            StreamEnd::Closed => {
                failures += 1;
                rw_warn!("{} stream closed by server", kind);
                settings.backoff(failures)
            }
            StreamEnd::Failed(err) => {
                failures += 1;
                rw_warn!("{} stream failed ({}): {}", kind, err.kind(), err);
                settings.backoff(failures)
            }
        };
        rw_debug!("{} stream retry in {:?}", kind, delay);

        tokio::select! {
            _ = control.cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
            _ = reopen.notified() => {}
        }
    }
}

async fn pump(
    kind: ChannelKind,
    mut stream: ByteStream,
    control: &Control,
    reopen: &Notify,
    tx: &mpsc::UnboundedSender<Msg>,
) -> StreamEnd {
    let mut decoder = SseDecoder::new();
    loop {
        let next = tokio::select! {
            _ = control.cancel.cancelled() => return StreamEnd::Cancelled,
            _ = reopen.notified() => return StreamEnd::Reopen,
            next = stream.next() => next,
        };
        let chunk = match next {
            None => return StreamEnd::Closed,
            Some(Err(err)) => return StreamEnd::Failed(err),
            Some(Ok(chunk)) => chunk,
        };
        control.touch();
        for frame in decoder.push(&chunk) {
            let at = now_ms();
            let msg = match kind {
                // The log tail carries one line of text per frame.
                ChannelKind::Log => Msg::LogChunk {
                    text: frame.data + "\n",
                    at,
                },
                ChannelKind::Push | ChannelKind::Poll => Msg::PushEvent {
                    name: frame.event,
                    data: frame.data,
                    at,
                },
            };
            if tx.send(msg).is_err() {
                return StreamEnd::Cancelled;
            }
        }
    }
}

/// Forces both push streams to reconnect when they have been silent for too
/// long during a run, even if they never reported an error.
pub(crate) async fn run_watchdog(settings: Arc<SupervisorSettings>, control: Arc<Control>) {
    let mut interval = tokio::time::interval(settings.watchdog_check_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let timeout_ms = u64::try_from(settings.watchdog_timeout.as_millis()).unwrap_or(u64::MAX);
    loop {
        tokio::select! {
            _ = control.cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        if !control.is_active() {
            continue;
        }
        let silent = now_ms().saturating_sub(control.last_push_ms.load(Ordering::Relaxed));
        if silent >= timeout_ms {
            rw_warn!("no push traffic for {} ms; forcing both streams to reconnect", silent);
            control.touch();
            control.force_reopen();
        }
    }
}

/// Periodic summary fetch; the interval follows run activity and visibility.
pub(crate) async fn run_poller(
    url: Url,
    source: Arc<dyn StreamSource>,
    settings: Arc<SupervisorSettings>,
    control: Arc<Control>,
    tx: mpsc::UnboundedSender<Msg>,
) {
    loop {
        // Stamped at send time so a slow response cannot look newer than it is.
        let at = now_ms();
        let fetched = tokio::select! {
            _ = control.cancel.cancelled() => return,
            fetched = fetch_summary(source.as_ref(), &url) => fetched,
        };
        match fetched {
            Ok(summary) => {
                let msg = Msg::Summary {
                    channel: ChannelKind::Poll,
                    summary,
                    at,
                };
                if tx.send(msg).is_err() {
                    return;
                }
            }
            Err(err) => rw_warn!("summary poll failed ({}): {}", err.kind(), err),
        }

        let interval = control.poll_interval(&settings);
        tokio::select! {
            _ = control.cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
            _ = control.poll_now.notified() => {}
        }
    }
}
