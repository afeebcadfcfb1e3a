use std::sync::Arc;
use std::thread;

use runwatch_core::{
    update, ChannelKind, Effect, Msg, PipelineSettings, Renderable, RunId, RunSnapshot, RunState,
};
use runwatch_logging::{rw_info, rw_warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::settings::Endpoints;
use crate::supervisor::{run_poller, run_stream, run_watchdog, Control};
use crate::trigger::trigger_run;
use crate::{
    now_ms, ChannelError, ReqwestSource, StreamSource, SupervisorSettings, TriggerError,
    TriggerOutcome,
};

const RENDERABLE_BACKLOG: usize = 256;

/// External reactions to run lifecycle changes.
pub trait RunHooks: Send + Sync {
    /// A run became active or inactive; a start control should follow this.
    fn run_active(&self, _active: bool) {}

    /// A run completed; called at most once per run.
    fn refresh_downstream(&self, _run_id: &RunId) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl RunHooks for NoHooks {}

enum Command {
    Dispatch(Msg),
    Start(oneshot::Sender<Result<TriggerOutcome, TriggerError>>),
}

/// Owns the channel tasks and the single-writer dispatch loop on a dedicated
/// runtime thread.
pub struct TelemetryHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<RunSnapshot>,
    renderables: broadcast::Sender<Renderable>,
    control: Arc<Control>,
    thread: Option<thread::JoinHandle<()>>,
}

impl TelemetryHandle {
    pub fn start(
        settings: SupervisorSettings,
        pipeline: PipelineSettings,
        hooks: Arc<dyn RunHooks>,
    ) -> Result<Self, ChannelError> {
        let source = Arc::new(ReqwestSource::new(&settings)?);
        Self::start_with_source(settings, pipeline, source, hooks)
    }

    pub fn start_with_source(
        settings: SupervisorSettings,
        pipeline: PipelineSettings,
        source: Arc<dyn StreamSource>,
        hooks: Arc<dyn RunHooks>,
    ) -> Result<Self, ChannelError> {
        let endpoints = settings.endpoints()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("runwatch-engine")
            .enable_all()
            .build()?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let state = RunState::new(&pipeline);
        let (snapshot_tx, snapshots) = watch::channel(state.view());
        let (renderables, _) = broadcast::channel(RENDERABLE_BACKLOG);
        let control = Arc::new(Control::new());

        let dispatcher = Dispatcher {
            state: Some(state),
            snapshot_tx,
            renderables: renderables.clone(),
            hooks,
            control: control.clone(),
        };
        let settings = Arc::new(settings);
        let task_control = control.clone();
        let thread = thread::Builder::new()
            .name("runwatch-engine".to_string())
            .spawn(move || {
                runtime.block_on(run(
                    dispatcher,
                    cmd_rx,
                    endpoints,
                    source,
                    settings,
                    task_control,
                ));
            })?;

        Ok(Self {
            cmd_tx,
            snapshots,
            renderables,
            control,
            thread: Some(thread),
        })
    }

    /// Optimistic start followed by the trigger request.
    pub fn start_run(&self) -> oneshot::Receiver<Result<TriggerOutcome, TriggerError>> {
        let (reply, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(Command::Start(reply))) =
            self.cmd_tx.send(Command::Start(reply))
        {
            let _ = reply.send(Err(TriggerError::Stopped));
        }
        rx
    }

    /// Feeds a message straight into the pipeline.
    pub fn dispatch(&self, msg: Msg) {
        let _ = self.cmd_tx.send(Command::Dispatch(msg));
    }

    /// Hidden views poll slowly; becoming visible reopens both streams and
    /// polls immediately.
    pub fn set_visible(&self, visible: bool) {
        self.control.set_visible(visible);
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn snapshots(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshots.clone()
    }

    pub fn renderables(&self) -> broadcast::Receiver<Renderable> {
        self.renderables.subscribe()
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.control.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for TelemetryHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Dispatcher {
    /// Always `Some` between messages; taken while `update` owns it.
    state: Option<RunState>,
    snapshot_tx: watch::Sender<RunSnapshot>,
    renderables: broadcast::Sender<Renderable>,
    hooks: Arc<dyn RunHooks>,
    control: Arc<Control>,
}

impl Dispatcher {
    fn apply(&mut self, msg: Msg) {
        let Some(state) = self.state.take() else {
            return;
        };
        let (state, effects) = update(state, msg);
        self.state = Some(state);
        for effect in effects {
            match effect {
                Effect::Render(snapshot) => {
                    self.snapshot_tx.send_replace(snapshot);
                }
                Effect::Append(renderable) => {
                    // No subscribers is fine.
                    let _ = self.renderables.send(renderable);
                }
                Effect::RunActive(active) => {
                    self.control.set_active(active);
                    self.hooks.run_active(active);
                }
                Effect::RefreshDownstream { run_id } => self.hooks.refresh_downstream(&run_id),
            }
        }
    }
}

async fn run(
    mut dispatcher: Dispatcher,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    endpoints: Endpoints,
    source: Arc<dyn StreamSource>,
    settings: Arc<SupervisorSettings>,
    control: Arc<Control>,
) {
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();

    // Every channel writes to `msg_tx`; only this task touches the state.
    tokio::spawn(run_stream(
        ChannelKind::Push,
        endpoints.summary_stream.clone(),
        source.clone(),
        settings.clone(),
        control.clone(),
        msg_tx.clone(),
    ));
    tokio::spawn(run_stream(
        ChannelKind::Log,
        endpoints.log_stream.clone(),
        source.clone(),
        settings.clone(),
        control.clone(),
        msg_tx.clone(),
    ));
    tokio::spawn(run_poller(
        endpoints.summary.clone(),
        source.clone(),
        settings.clone(),
        control.clone(),
        msg_tx.clone(),
    ));
    tokio::spawn(run_watchdog(settings.clone(), control.clone()));

    let mut ticks = tokio::time::interval(settings.tick_interval);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = control.cancel.cancelled() => break,
            command = cmd_rx.recv() => match command {
                None => break,
                Some(Command::Dispatch(msg)) => dispatcher.apply(msg),
                Some(Command::Start(reply)) => {
                    dispatcher.apply(Msg::StartClicked { at: now_ms() });
                    let source = source.clone();
                    let url = endpoints.run.clone();
                    let msg_tx = msg_tx.clone();
                    tokio::spawn(async move {
                        let outcome = trigger_run(source.as_ref(), &url).await;
                        match &outcome {
                            Ok(TriggerOutcome::Started { run_id: Some(run_id) }) => {
                                rw_info!("server started run {}", run_id);
                                let _ = msg_tx.send(Msg::RunAccepted {
                                    run_id: *run_id,
                                    at: now_ms(),
                                });
                            }
                            Ok(TriggerOutcome::Started { run_id: None }) => {
                                rw_info!("server started a run without reporting its id");
                            }
                            Ok(TriggerOutcome::Skipped { reason }) => {
                                rw_info!("run start skipped: {}", reason);
                                let _ = msg_tx.send(Msg::Reset);
                            }
                            Err(err) => {
                                rw_warn!("run start failed: {}", err);
                                let _ = msg_tx.send(Msg::Reset);
                            }
                        }
                        let _ = reply.send(outcome);
                    });
                }
            },
            msg = msg_rx.recv() => match msg {
                None => break,
                Some(msg) => dispatcher.apply(msg),
            },
            _ = ticks.tick() => dispatcher.apply(Msg::Tick { at: now_ms() }),
        }
    }
    control.cancel.cancel();
}
