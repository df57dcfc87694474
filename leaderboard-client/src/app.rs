//! Single-queue driver that runs controller effects against the backend.
//!
//! REST calls and one-shot stream waits run as spawned tasks and post their
//! completions back onto the queue, so the controller only ever sees one
//! input at a time.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::config::Config;
use crate::constants::{
    CHANNEL_CONNECT, CHANNEL_CONNECT_ERROR, CHANNEL_PLAYER_COUNT, CHANNEL_SIMULATE,
};
use crate::controller::{Controller, Effect, Input, Notice, ViewModel};
use crate::models::{parse_player_count, SimulationTick};
use crate::stream::{EventStream, HandlerId};

pub struct App {
    controller: Controller,
    api: ApiClient,
    stream: EventStream,
    sender: mpsc::UnboundedSender<Input>,
    queue: mpsc::UnboundedReceiver<Input>,
    page_count_wait: Duration,
    simulation_watch: Option<(u64, HandlerId)>,
    status_handlers: Vec<(&'static str, HandlerId)>,
}

impl App {
    pub fn new(config: &Config, api: ApiClient, stream: EventStream) -> Self {
        let (sender, queue) = mpsc::unbounded_channel();

        let connected = sender.clone();
        let connect_id = stream.subscribe(CHANNEL_CONNECT, move |_| {
            let _ = connected.send(Input::StreamConnected);
        });
        let failed = sender.clone();
        let error_id = stream.subscribe(CHANNEL_CONNECT_ERROR, move |data: &Value| {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("stream unavailable")
                .to_string();
            let _ = failed.send(Input::StreamUnavailable { message });
        });

        Self {
            controller: Controller::new(),
            api,
            stream,
            sender,
            queue,
            page_count_wait: config.page_count_wait,
            simulation_watch: None,
            status_handlers: vec![
                (CHANNEL_CONNECT, connect_id),
                (CHANNEL_CONNECT_ERROR, error_id),
            ],
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn view(&self) -> ViewModel {
        self.controller.view()
    }

    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    pub async fn next_input(&mut self) -> Option<Input> {
        self.queue.recv().await
    }

    /// Feeds one input through the controller and starts its effects.
    /// Returns the notices the user should see.
    pub fn dispatch(&mut self, input: Input) -> Vec<Notice> {
        let effects = self.controller.handle(input);
        let mut notices = Vec::new();
        for effect in effects {
            match effect {
                Effect::Notify(notice) => notices.push(notice),
                other => self.run_effect(other),
            }
        }
        notices
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::LoadPage { seq, offset, limit } => {
                // Armed before the request goes out so the count cannot be missed.
                let player_count = self.stream.once(CHANNEL_PLAYER_COUNT);
                let api = self.api.clone();
                let sender = self.sender.clone();
                let wait = self.page_count_wait;
                tokio::spawn(async move {
                    let result = api.fetch_page(offset, limit).await;
                    let fetched = result.is_ok();
                    let _ = sender.send(Input::PageLoaded {
                        seq,
                        offset,
                        result,
                    });
                    if !fetched {
                        return;
                    }
                    match tokio::time::timeout(wait, player_count).await {
                        Ok(Some(value)) => match parse_player_count(&value) {
                            Some(player_count) => {
                                let _ = sender.send(Input::PageCountResolved { seq, player_count });
                            }
                            None => warn!(%value, "unexpected playerCount payload"),
                        },
                        Ok(None) => debug!(seq, "player count wait cancelled"),
                        Err(_) => debug!(seq, "no player count within wait window"),
                    }
                });
            }
            Effect::RequestReset => {
                let api = self.api.clone();
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let result = api.reset().await;
                    let _ = sender.send(Input::ResetFinished { result });
                });
            }
            Effect::StartSimulation { run } => {
                let ticks = self.sender.clone();
                let id = self.stream.subscribe(CHANNEL_SIMULATE, move |data: &Value| {
                    match serde_json::from_value::<SimulationTick>(data.clone()) {
                        Ok(tick) => {
                            let _ = ticks.send(Input::SimulationTick { run, tick });
                        }
                        Err(err) => warn!(?err, "malformed simulate event"),
                    }
                });
                if let Some((previous, stale)) = self.simulation_watch.replace((run, id)) {
                    warn!(previous, "replacing an unfinished simulation watch");
                    self.stream.unsubscribe(CHANNEL_SIMULATE, stale);
                }

                let api = self.api.clone();
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let result = api.simulate().await;
                    let _ = sender.send(Input::SimulationAck { run, result });
                });
            }
            Effect::StopSimulationWatch { run } => {
                let watched = self
                    .simulation_watch
                    .filter(|(watched_run, _)| *watched_run == run);
                match watched {
                    Some((_, id)) => {
                        self.stream.unsubscribe(CHANNEL_SIMULATE, id);
                        self.simulation_watch = None;
                    }
                    None => debug!(run, "no simulation watch to stop"),
                }
            }
            Effect::RequestDistribution { seq, ratio } => {
                let api = self.api.clone();
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let result = api.distribute(ratio).await;
                    let _ = sender.send(Input::DistributionFinished { seq, result });
                });
            }
            Effect::Notify(_) => {}
        }
    }

    /// Releases every handler this app registered and closes the stream.
    pub fn shutdown(mut self) {
        if let Some((_, id)) = self.simulation_watch.take() {
            self.stream.unsubscribe(CHANNEL_SIMULATE, id);
        }
        for (channel, id) in self.status_handlers.drain(..) {
            self.stream.unsubscribe(channel, id);
        }
        self.stream.close();
    }
}
