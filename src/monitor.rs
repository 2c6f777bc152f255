//! Consumer side: applies blocks to the model and notifies an observer

use crate::connection::{ClientEvent, ConnectionStatus, EventReceiver};
use crate::model::{ProcessModel, TickDelta};
use tracing::debug;

/// Receives connection status changes and model updates, in wire order.
#[async_trait::async_trait]
pub trait ModelObserver: Send {
    async fn on_status(&mut self, status: &ConnectionStatus);
    async fn on_model(&mut self, model: &ProcessModel, delta: &TickDelta);
}

/// Sole owner of the [`ProcessModel`].
#[derive(Debug, Default)]
pub struct Monitor {
    model: ProcessModel,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&self) -> &ProcessModel {
        &self.model
    }

    pub fn into_model(self) -> ProcessModel {
        self.model
    }

    /// Applies one event from the connection and forwards it to `observer`.
    pub async fn handle<O>(&mut self, event: ClientEvent, observer: &mut O)
    where
        O: ModelObserver + ?Sized,
    {
        match event {
            ClientEvent::Status(status) => observer.on_status(&status).await,
            ClientEvent::Block(block) => {
                let delta = self.model.apply(&block);
                debug!(
                    "Tick {}: {} events, {} active",
                    delta.tick,
                    block.len(),
                    self.model.active().count()
                );
                observer.on_model(&self.model, &delta).await;
            }
        }
    }

    /// Drains `events` until the connection task finishes. Returns the last
    /// status seen, normally `Failed` or `Closed`.
    pub async fn run<O>(&mut self, mut events: EventReceiver, observer: &mut O) -> Option<ConnectionStatus>
    where
        O: ModelObserver + ?Sized,
    {
        let mut last_status = None;
        while let Some(event) = events.recv().await {
            if let ClientEvent::Status(status) = &event {
                last_status = Some(status.clone());
            }
            self.handle(event, observer).await;
        }
        last_status
    }
}
