use crate::aggregator::MuteAggregator;
use crate::config::Config;
use crate::protocol::{ClientEvent, SourceEvent};
use crate::state::{SourceKey, SourceState};
use std::future::Future;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info};

/// Whatever shows the mute state to the user (border overlay, tray icon).
pub trait Presenter {
    fn set_muted(&mut self, muted: bool);
    fn source_changed(&mut self, source: SourceKey, state: &SourceState, event: &ClientEvent);
}

pub struct MainLoop<P: Presenter> {
    events: mpsc::UnboundedReceiver<SourceEvent>,
    aggregator: MuteAggregator,
    presenter: P,
}

impl<P: Presenter> MainLoop<P> {
    pub fn new(events: mpsc::UnboundedReceiver<SourceEvent>, config: &Config, mut presenter: P) -> Self {
        let mut aggregator = MuteAggregator::new();
        let initial = [
            (SourceKey::WaveLink, config.wave_link.enabled),
            (SourceKey::Obs, config.obs.enabled),
        ];
        let mut announced = None;
        for (source, enabled) in initial {
            let state = if enabled {
                SourceState::Disconnected
            } else {
                SourceState::Disabled
            };
            announced = aggregator.set_source_state(source, state).or(announced);
        }
        if let Some(muted) = announced {
            presenter.set_muted(muted);
        }

        Self {
            events,
            aggregator,
            presenter,
        }
    }

    pub fn aggregator(&self) -> &MuteAggregator {
        &self.aggregator
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn handle(&mut self, SourceEvent { source, event }: SourceEvent) {
        let current = self
            .aggregator
            .source(source)
            .cloned()
            .unwrap_or(SourceState::Disconnected);
        let next = current.apply(&event);
        if next == current && matches!(event, ClientEvent::MuteChanged(_)) {
            debug!(%source, ?event, "mute report without state change");
        }
        info!(%source, ?event, state = ?next, "source update");

        self.presenter.source_changed(source, &next, &event);
        if let Some(muted) = self.aggregator.set_source_state(source, next) {
            info!(muted, "mute state");
            self.presenter.set_muted(muted);
        }
    }

    /// Handles everything already queued without waiting.
    pub fn tick(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.handle(event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    pub async fn run(&mut self) {
        while let Some(event) = self.events.recv().await {
            self.handle(event);
        }
    }

    /// Handles events until `shutdown` resolves. Losing every sender does not
    /// end the loop; with no source enabled there is just nothing to show.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) -> F::Output {
        tokio::pin!(shutdown);
        let mut open = true;
        loop {
            tokio::select! {
                out = &mut shutdown => return out,
                event = self.events.recv(), if open => match event {
                    Some(event) => self.handle(event),
                    None => {
                        debug!("event channel closed, waiting for shutdown");
                        open = false;
                    }
                },
            }
        }
    }
}
