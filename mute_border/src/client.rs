use crate::protocol::{ClientEvent, Control, SourceEvent};
use crate::state::SourceKey;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const RPC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimings {
    pub reconnect_delay: Duration,
    pub rpc_timeout: Duration,
}

impl Default for ClientTimings {
    fn default() -> Self {
        Self {
            reconnect_delay: RECONNECT_DELAY,
            rpc_timeout: RPC_TIMEOUT,
        }
    }
}

/// Why a connection attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Transport failed or closed; report and retry after the delay.
    Dropped,
    /// `connect()` was called while connected; reopen right away.
    Reconnect,
    /// The handle is gone.
    Shutdown,
}

impl SessionEnd {
    pub fn from_control(cmd: Option<Control>) -> Self {
        match cmd {
            Some(Control::Connect) => SessionEnd::Reconnect,
            None => SessionEnd::Shutdown,
        }
    }
}

/// One protocol's connect/discover/watch cycle. `run` owns a single
/// transport from open to close.
pub trait Connection: Send + 'static {
    fn run<'a>(
        &'a mut self,
        control: &'a mut mpsc::UnboundedReceiver<Control>,
        sink: &'a EventSink,
    ) -> impl Future<Output = SessionEnd> + Send + 'a;
}

#[derive(Clone)]
pub struct EventSink {
    source: SourceKey,
    tx: mpsc::UnboundedSender<SourceEvent>,
    destroyed: Arc<AtomicBool>,
}

impl EventSink {
    pub fn source(&self) -> SourceKey {
        self.source
    }

    pub fn emit(&self, event: ClientEvent) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }
        debug!(source = %self.source, ?event, "client event");
        let _ = self.tx.send(SourceEvent {
            source: self.source,
            event,
        });
    }
}

pub struct ClientHandle {
    source: SourceKey,
    control: mpsc::UnboundedSender<Control>,
    destroyed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ClientHandle {
    /// Starts the client task in the idle state. Must be called from within a
    /// tokio runtime.
    pub fn spawn<C: Connection>(
        source: SourceKey,
        connection: C,
        reconnect_delay: Duration,
        events: mpsc::UnboundedSender<SourceEvent>,
    ) -> Self {
        let destroyed = Arc::new(AtomicBool::new(false));
        let sink = EventSink {
            source,
            tx: events,
            destroyed: Arc::clone(&destroyed),
        };
        let (control, control_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(supervise(connection, control_rx, sink, reconnect_delay));
        Self {
            source,
            control,
            destroyed,
            task,
        }
    }

    pub fn source(&self) -> SourceKey {
        self.source
    }

    pub fn connect(&self) {
        if self.is_destroyed() {
            return;
        }
        let _ = self.control.send(Control::Connect);
    }

    /// Stops the client for good. No event is emitted once this returns,
    /// even for calls or timers that were in flight.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.task.abort();
        info!(source = %self.source, "client destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn supervise<C: Connection>(
    mut connection: C,
    mut control: mpsc::UnboundedReceiver<Control>,
    sink: EventSink,
    reconnect_delay: Duration,
) {
    // Idle until the first connect().
    if control.recv().await.is_none() {
        return;
    }

    loop {
        match connection.run(&mut control, &sink).await {
            SessionEnd::Reconnect => continue,
            SessionEnd::Shutdown => return,
            SessionEnd::Dropped => {
                sink.emit(ClientEvent::Disconnected);
                info!(
                    source = %sink.source(),
                    "reconnecting in {}s",
                    reconnect_delay.as_secs_f32()
                );
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_delay) => {}
                    cmd = control.recv() => {
                        if cmd.is_none() {
                            return;
                        }
                    }
                }
            }
        }
    }
}
