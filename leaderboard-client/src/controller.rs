//! View model and the synchronization state machine.
//!
//! The controller never performs I/O. Every input (a user action, a REST
//! completion, a stream event) goes through [`Controller::handle`], which
//! updates state synchronously and returns the [`Effect`]s the driver must
//! carry out. Page-replacing requests carry a sequence number and only the
//! most recently issued one may install rows.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::constants::{PER_PAGE, SIMULATION_DAYS};
use crate::lifecycle::{OperationKind, OperationLock, OperationState};
use crate::models::{PageWindow, PlayerPage, PlayerRecord, ResetResponse, SimulationTick};
use crate::normalize::{normalize, NormalizeError};

pub type Seq = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserAction {
    Mount,
    GetTop(u64),
    /// Zero-based pager index.
    SelectPage(u64),
    Reset,
    Simulate,
    Distribute(u32),
}

#[derive(Debug)]
pub enum Input {
    User(UserAction),
    PageLoaded {
        seq: Seq,
        offset: u64,
        result: Result<PlayerPage>,
    },
    PageCountResolved {
        seq: Seq,
        player_count: u64,
    },
    ResetFinished {
        result: Result<ResetResponse>,
    },
    SimulationAck {
        run: u64,
        result: Result<()>,
    },
    SimulationTick {
        run: u64,
        tick: SimulationTick,
    },
    DistributionFinished {
        seq: Seq,
        result: Result<PlayerPage>,
    },
    StreamConnected,
    StreamUnavailable {
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Arm a one-shot `playerCount` wait, then fetch the page.
    LoadPage { seq: Seq, offset: u64, limit: u64 },
    RequestReset,
    /// Subscribe to `simulate` ticks, then trigger the simulation.
    StartSimulation { run: u64 },
    StopSimulationWatch { run: u64 },
    RequestDistribution { seq: Seq, ratio: u32 },
    Notify(Notice),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StreamStatus {
    #[default]
    Connecting,
    Connected,
    Unavailable(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SimulationRun {
    run: u64,
    day: u8,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ButtonView {
    pub kind: OperationKind,
    pub label: &'static str,
    pub state: OperationState,
}

/// Everything the presentation layer needs for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewModel {
    pub rows: Vec<PlayerRecord>,
    pub offset: u64,
    pub page_count: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub loading: bool,
    pub buttons: Vec<ButtonView>,
    pub simulation_day: Option<u8>,
    pub stream: StreamStatus,
}

#[derive(Debug, Default)]
pub struct Controller {
    window: PageWindow,
    lock: OperationLock,
    next_seq: Seq,
    latest_page_seq: Seq,
    page_count_seq: Seq,
    pending_page: Option<Seq>,
    next_run: u64,
    simulation: Option<SimulationRun>,
    stream: StreamStatus,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self) -> &PageWindow {
        &self.window
    }

    pub fn lock(&self) -> OperationLock {
        self.lock
    }

    pub fn operation_state(&self, kind: OperationKind) -> OperationState {
        self.lock.state_of(kind)
    }

    pub fn stream_status(&self) -> &StreamStatus {
        &self.stream
    }

    pub fn view(&self) -> ViewModel {
        let buttons = OperationKind::ALL
            .iter()
            .map(|kind| ButtonView {
                kind: *kind,
                label: self.lock.label_of(*kind),
                state: self.lock.state_of(*kind),
            })
            .collect();
        ViewModel {
            rows: self.window.rows.clone(),
            offset: self.window.offset,
            page_count: self.window.page_count,
            per_page: self.window.per_page,
            current_page: self.window.current_page(),
            loading: self.pending_page.is_some(),
            buttons,
            simulation_day: self.simulation.map(|run| run.day).filter(|day| *day > 0),
            stream: self.stream.clone(),
        }
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::User(action) => self.on_user(action),
            Input::PageLoaded {
                seq,
                offset,
                result,
            } => self.on_page_loaded(seq, offset, result),
            Input::PageCountResolved { seq, player_count } => {
                self.on_page_count(seq, player_count);
                Vec::new()
            }
            Input::ResetFinished { result } => self.on_reset_finished(result),
            Input::SimulationAck { run, result } => self.on_simulation_ack(run, result),
            Input::SimulationTick { run, tick } => self.on_simulation_tick(run, tick),
            Input::DistributionFinished { seq, result } => {
                self.on_distribution_finished(seq, result)
            }
            Input::StreamConnected => {
                self.stream = StreamStatus::Connected;
                Vec::new()
            }
            Input::StreamUnavailable { message } => self.on_stream_unavailable(message),
        }
    }

    fn on_user(&mut self, action: UserAction) -> Vec<Effect> {
        match action {
            UserAction::Mount => vec![self.load_page(0, PER_PAGE)],
            UserAction::GetTop(n) => {
                let limit = n.clamp(1, self.window.per_page);
                vec![self.load_page(0, limit)]
            }
            UserAction::SelectPage(page) => {
                if self.window.page_count > 0 && page >= self.window.page_count {
                    return vec![Effect::Notify(Notice::error(format!(
                        "Page {} does not exist ({} pages)",
                        page.saturating_add(1),
                        self.window.page_count
                    )))];
                }
                let Some(offset) = self.window.offset_for_page(page) else {
                    warn!(page, "page offset out of range");
                    return vec![Effect::Notify(Notice::error(format!(
                        "Page {} is out of range",
                        page.saturating_add(1)
                    )))];
                };
                vec![self.load_page(offset, self.window.per_page)]
            }
            UserAction::Reset => match self.lock.start(OperationKind::Reset) {
                Ok(()) => {
                    info!("leaderboard reset requested");
                    vec![Effect::RequestReset]
                }
                Err(err) => vec![Effect::Notify(Notice::error(err.to_string()))],
            },
            UserAction::Simulate => match self.lock.start(OperationKind::Simulation) {
                Ok(()) => {
                    self.next_run += 1;
                    let run = self.next_run;
                    self.simulation = Some(SimulationRun { run, day: 0 });
                    info!(run, "weekly simulation started");
                    vec![Effect::StartSimulation { run }]
                }
                Err(err) => vec![Effect::Notify(Notice::error(err.to_string()))],
            },
            UserAction::Distribute(ratio) => match self.lock.start(OperationKind::Distribution) {
                Ok(()) => {
                    let seq = self.issue_page_seq();
                    info!(ratio, seq, "prize pool distribution requested");
                    vec![Effect::RequestDistribution { seq, ratio }]
                }
                Err(err) => vec![Effect::Notify(Notice::error(err.to_string()))],
            },
        }
    }

    fn issue_page_seq(&mut self) -> Seq {
        self.next_seq += 1;
        self.latest_page_seq = self.next_seq;
        self.pending_page = Some(self.next_seq);
        self.next_seq
    }

    fn load_page(&mut self, offset: u64, limit: u64) -> Effect {
        let seq = self.issue_page_seq();
        debug!(seq, offset, limit, "page requested");
        Effect::LoadPage { seq, offset, limit }
    }

    fn is_current(&self, seq: Seq) -> bool {
        seq == self.latest_page_seq
    }

    fn settle(&mut self, seq: Seq) {
        if self.pending_page == Some(seq) {
            self.pending_page = None;
        }
    }

    /// Normalizes and installs a page; the previous rows survive a rejection.
    fn install(&mut self, page: PlayerPage, offset: u64) -> Result<usize, NormalizeError> {
        let (source, info) = page.into_source()?;
        let rows = normalize(&source, &info, offset)?;
        let count = rows.len();
        self.window.replace(rows, offset);
        if self.lock.data_arrived(count > 0) {
            info!("controls re-enabled by fresh leaderboard data");
        }
        Ok(count)
    }

    fn on_page_loaded(&mut self, seq: Seq, offset: u64, result: Result<PlayerPage>) -> Vec<Effect> {
        if !self.is_current(seq) {
            debug!(seq, latest = self.latest_page_seq, "dropping superseded page");
            return Vec::new();
        }
        self.settle(seq);

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                warn!(?err, offset, "page fetch failed");
                return vec![Effect::Notify(Notice::error(format!(
                    "Failed to load leaderboard: {:#}",
                    err
                )))];
            }
        };

        match self.install(page, offset) {
            Ok(count) => {
                debug!(seq, offset, count, "page installed");
                Vec::new()
            }
            Err(err) => {
                warn!(%err, offset, "page rejected");
                vec![Effect::Notify(Notice::error(format!(
                    "Leaderboard data rejected: {}",
                    err
                )))]
            }
        }
    }

    fn on_page_count(&mut self, seq: Seq, player_count: u64) {
        if seq < self.page_count_seq {
            debug!(seq, applied = self.page_count_seq, "ignoring older player count");
            return;
        }
        self.page_count_seq = seq;
        self.window.page_count = self.window.page_count_for(player_count);
        debug!(player_count, page_count = self.window.page_count, "page count updated");
    }

    fn on_reset_finished(&mut self, result: Result<ResetResponse>) -> Vec<Effect> {
        if self.lock.running() != Some(OperationKind::Reset) {
            warn!("reset response without a running reset");
            return Vec::new();
        }

        match result {
            Ok(ResetResponse { success: true }) => {
                self.window.clear();
                self.window.page_count = 0;
                // In-flight loads and their player counts predate the wipe.
                self.next_seq += 1;
                self.latest_page_seq = self.next_seq;
                self.page_count_seq = self.next_seq;
                self.pending_page = None;
                let _ = self.lock.await_data(OperationKind::Reset);
                info!("leaderboard reset");
                vec![Effect::Notify(Notice::info("Leaderboard reset!"))]
            }
            Ok(ResetResponse { success: false }) => {
                let _ = self.lock.abort(OperationKind::Reset);
                warn!("backend reported reset failure");
                vec![Effect::Notify(Notice::error(
                    "Something failed while resetting the leaderboard!",
                ))]
            }
            Err(err) => {
                let _ = self.lock.abort(OperationKind::Reset);
                warn!(?err, "reset request failed");
                vec![Effect::Notify(Notice::error(format!(
                    "Reset failed: {:#}",
                    err
                )))]
            }
        }
    }

    fn end_simulation(&mut self, run: u64, completed: bool) -> Vec<Effect> {
        self.simulation = None;
        let _ = if completed {
            self.lock.finish(OperationKind::Simulation)
        } else {
            self.lock.abort(OperationKind::Simulation)
        };
        vec![Effect::StopSimulationWatch { run }]
    }

    fn active_run(&self, run: u64) -> bool {
        self.simulation.map(|active| active.run) == Some(run)
    }

    fn on_simulation_ack(&mut self, run: u64, result: Result<()>) -> Vec<Effect> {
        match result {
            Ok(()) => {
                debug!(run, "simulation trigger acknowledged");
                Vec::new()
            }
            Err(err) => {
                if !self.active_run(run) {
                    return Vec::new();
                }
                warn!(?err, run, "simulation trigger failed");
                let mut effects = self.end_simulation(run, false);
                effects.push(Effect::Notify(Notice::error(format!(
                    "Simulation failed: {:#}",
                    err
                ))));
                effects
            }
        }
    }

    fn on_simulation_tick(&mut self, run: u64, tick: SimulationTick) -> Vec<Effect> {
        if !self.active_run(run) {
            debug!(run, day = tick.day, "tick for inactive simulation");
            return Vec::new();
        }
        info!(run, day = tick.day, "simulation day");
        debug!(players = %tick.players, players_info = %tick.players_info, "simulation standings");

        if tick.day != SIMULATION_DAYS {
            if let Some(active) = self.simulation.as_mut() {
                active.day = tick.day;
            }
            return Vec::new();
        }

        info!(run, "weekly simulation finished");
        let mut effects = self.end_simulation(run, true);
        effects.push(Effect::Notify(Notice::info("Weekly simulation finished")));
        effects
    }

    fn on_distribution_finished(&mut self, seq: Seq, result: Result<PlayerPage>) -> Vec<Effect> {
        if self.lock.running() != Some(OperationKind::Distribution) {
            warn!("distribution response without a running distribution");
            return Vec::new();
        }

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                let _ = self.lock.abort(OperationKind::Distribution);
                self.settle(seq);
                warn!(?err, "distribution failed");
                return vec![Effect::Notify(Notice::error(format!(
                    "Prize pool distribution failed: {:#}",
                    err
                )))];
            }
        };

        let _ = self.lock.finish(OperationKind::Distribution);
        let mut effects = Vec::new();
        if self.is_current(seq) {
            self.settle(seq);
            if let Err(err) = self.install(page, 0) {
                warn!(%err, "distribution page rejected");
                effects.push(Effect::Notify(Notice::error(format!(
                    "Leaderboard data rejected: {}",
                    err
                ))));
            }
        } else {
            debug!(seq, latest = self.latest_page_seq, "distribution page superseded");
        }
        effects.push(Effect::Notify(Notice::info(
            "Prize pool distributed among players",
        )));
        effects
    }

    fn on_stream_unavailable(&mut self, message: String) -> Vec<Effect> {
        self.stream = StreamStatus::Unavailable(message);
        match self.simulation {
            Some(active) => {
                warn!(run = active.run, "event stream lost during simulation");
                let mut effects = self.end_simulation(active.run, false);
                effects.push(Effect::Notify(Notice::error(
                    "Event stream lost; simulation progress is unknown",
                )));
                effects
            }
            None => Vec::new(),
        }
    }
}
