use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::feed::FeedSubscriber;
use super::gate::{RenderGate, DEFAULT_RENDER_GATE_DELAY};
use super::notice::{self, Notice};
use super::refresh::{Completion, FetchPlan, FetchTicket, RefreshController};
use super::replica::ReplicaStore;
use crate::models::{Coordinates, Event, NewEvent};
use crate::store::{ChangeKind, EventStore, StoreError, EVENTS_RESOURCE};
use crate::wizard::{
    failure_message, Advance, CreationWizard, Retreat, SubmitOutcome, WizardError, WizardInput,
    WizardView,
};

const SESSION_EVENTS_CAPACITY: usize = 64;
const JOB_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Change-feed resource name.
    pub resource: String,
    pub render_gate_delay: Duration,
    /// Offset used to combine the wizard's date and time.
    pub utc_offset: FixedOffset,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resource: EVENTS_RESOURCE.to_string(),
            render_gate_delay: DEFAULT_RENDER_GATE_DELAY,
            utc_offset: Utc.fix(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No event is being created")]
    NoWizard,

    #[error("An event creation flow is already open")]
    WizardOpen,

    #[error(transparent)]
    Wizard(#[from] WizardError),

    #[error("The map session is no longer mounted")]
    Unmounted,
}

/// Notifications for collaborators outside the session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Fired once per successful wizard submission.
    EventCreated(Event),
    WizardClosed,
    TrackingFrozen,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub events: Vec<Event>,
    pub notices: Vec<Notice>,
    pub tracking_enabled: bool,
    pub focused: bool,
    pub live_updates: bool,
    pub wizard_open: bool,
}

enum SessionMsg {
    FetchFinished {
        ticket: FetchTicket,
        result: Result<Vec<Event>, StoreError>,
    },
    InsertFinished(Result<Event, StoreError>),
    RenderGateElapsed,
}

/// Screen-lifetime owner of the replica and everything that feeds it.
///
/// All state changes happen on the task that drives [`MapSession::process_next`];
/// I/O runs on spawned tasks that report back through the inbox. Every
/// completion checks the liveness flag, and unmounting clears it, aborts
/// outstanding work and releases the feed.
pub struct MapSession<S: EventStore> {
    store: Arc<S>,
    config: SessionConfig,
    replica: ReplicaStore,
    refresh: RefreshController,
    feed: FeedSubscriber,
    gate: RenderGate,
    wizard: Option<CreationWizard>,
    notices: Vec<Notice>,
    alive: Arc<AtomicBool>,
    inbox_tx: mpsc::UnboundedSender<SessionMsg>,
    inbox: mpsc::UnboundedReceiver<SessionMsg>,
    events: broadcast::Sender<SessionEvent>,
    tasks: Vec<JoinHandle<()>>,
    unmount_requested: bool,
}

impl<S: EventStore> MapSession<S> {
    /// Subscribes to the change feed, starts the initial fetch and arms the
    /// render gate.
    pub async fn mount(store: Arc<S>, config: SessionConfig) -> Self {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(SESSION_EVENTS_CAPACITY);
        let mut session = Self {
            feed: FeedSubscriber::new(config.resource.clone()),
            store,
            config,
            replica: ReplicaStore::new(),
            refresh: RefreshController::new(),
            gate: RenderGate::new(),
            wizard: None,
            notices: Vec::new(),
            alive: Arc::new(AtomicBool::new(true)),
            inbox_tx,
            inbox,
            events,
            tasks: Vec::new(),
            unmount_requested: false,
        };

        // Subscribe before fetching so nothing between the two is missed.
        if session.feed.subscribe(session.store.as_ref()).await.is_err() {
            session.push_notice(notice::feed_unavailable());
        }

        let ticket = session.refresh.on_mount();
        session.spawn_fetch(ticket);
        session.arm_render_gate();

        info!(resource = %session.config.resource, "Map session mounted");
        session
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn on_focus(&mut self) {
        let ticket = self.refresh.on_focus();
        debug!(ticket = ticket.id(), "Screen focused");
        self.spawn_fetch(ticket);
    }

    pub fn on_blur(&mut self) {
        debug!("Screen blurred");
        self.refresh.on_blur();
    }

    pub fn on_feed_notification(&mut self, kind: ChangeKind) {
        debug!(?kind, "Change feed notification");
        if let FetchPlan::Start(ticket) = self.refresh.on_feed_notification() {
            self.spawn_fetch(ticket);
        }
    }

    /// Waits for and applies the next completion, feed notification or timer.
    pub async fn process_next(&mut self) {
        tokio::select! {
            biased;
            Some(msg) = self.inbox.recv() => self.handle(msg),
            kind = self.feed.next() => self.on_feed_notification(kind),
        }
    }

    fn handle(&mut self, msg: SessionMsg) {
        if !self.alive.load(Ordering::Acquire) {
            return;
        }
        match msg {
            SessionMsg::FetchFinished { ticket, result } => self.apply_fetch(ticket, result),
            SessionMsg::InsertFinished(result) => self.apply_insert(result),
            SessionMsg::RenderGateElapsed => {
                if self.gate.freeze() {
                    debug!("Marker view tracking frozen");
                    let _ = self.events.send(SessionEvent::TrackingFrozen);
                }
            }
        }
    }

    fn apply_fetch(&mut self, ticket: FetchTicket, result: Result<Vec<Event>, StoreError>) {
        if self.refresh.complete(ticket) == Completion::Superseded {
            debug!(ticket = ticket.id(), "Discarding superseded fetch");
            return;
        }
        match result {
            Ok(events) => {
                self.replica.replace_all(events);
                info!(ticket = ticket.id(), count = self.replica.len(), "Replica refreshed");
            }
            Err(e) => {
                error!(ticket = ticket.id(), error = ?e, "Fetch failed, keeping current replica");
                self.push_notice(notice::fetch_failed());
            }
        }
    }

    /// Repeats of the newest notice are folded into it.
    fn push_notice(&mut self, notice: Notice) {
        if self.notices.last() != Some(&notice) {
            self.notices.push(notice);
        }
    }

    fn apply_insert(&mut self, result: Result<Event, StoreError>) {
        let Some(wizard) = self.wizard.as_mut() else {
            warn!("Insert finished without an open wizard");
            if let Ok(event) = result {
                self.replica.append(event);
            }
            return;
        };

        match wizard.finish_submission(result) {
            Ok(SubmitOutcome::Created(event)) => {
                let message = wizard.created_message(&event);
                self.wizard = None;
                self.replica.append(event.clone());
                self.push_notice(Notice::info("Event Created!", message));
                let _ = self.events.send(SessionEvent::EventCreated(event));
                let _ = self.events.send(SessionEvent::WizardClosed);
            }
            Ok(SubmitOutcome::Failed(e)) => {
                error!(error = ?e, "Error creating event");
                let (title, message) = failure_message(&e);
                self.push_notice(Notice::error(title, message));
            }
            Err(e) => warn!(error = %e, "Unexpected insert completion"),
        }
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.replica.snapshot()
    }

    pub fn tracking_enabled(&self) -> bool {
        self.gate.tracking_enabled()
    }

    pub fn is_focused(&self) -> bool {
        self.refresh.is_focused()
    }

    pub fn fetches_issued(&self) -> u64 {
        self.refresh.issued()
    }

    pub fn fetch_in_flight(&self) -> bool {
        self.refresh.in_flight().is_some()
    }

    pub fn has_live_updates(&self) -> bool {
        self.feed.is_active()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn dismiss_notice(&mut self, index: usize) -> Option<Notice> {
        (index < self.notices.len()).then(|| self.notices.remove(index))
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            events: self.snapshot(),
            notices: self.notices.clone(),
            tracking_enabled: self.tracking_enabled(),
            focused: self.is_focused(),
            live_updates: self.has_live_updates(),
            wizard_open: self.wizard.is_some(),
        }
    }

    /// Opens the creation flow bound to the tapped location.
    pub fn open_wizard(&mut self, at: Coordinates) -> Result<WizardView, SessionError> {
        if self.wizard.is_some() {
            return Err(SessionError::WizardOpen);
        }
        let wizard = CreationWizard::open(at, Utc::now(), self.config.utc_offset);
        let view = wizard.view();
        self.wizard = Some(wizard);
        info!(latitude = at.latitude, longitude = at.longitude, "Creation wizard opened");
        Ok(view)
    }

    pub fn wizard_view(&self) -> Option<WizardView> {
        self.wizard.as_ref().map(CreationWizard::view)
    }

    pub fn wizard_input(&mut self, input: WizardInput) -> Result<WizardView, SessionError> {
        let wizard = self.wizard.as_mut().ok_or(SessionError::NoWizard)?;
        wizard.apply(input)?;
        Ok(wizard.view())
    }

    /// Advances the wizard; from the capacity step this starts the insert.
    pub fn wizard_next(&mut self) -> Result<WizardView, SessionError> {
        let wizard = self.wizard.as_mut().ok_or(SessionError::NoWizard)?;
        let advance = wizard.next()?;
        let view = wizard.view();
        if let Advance::Submit(payload) = advance {
            self.spawn_insert(payload);
        }
        Ok(view)
    }

    pub fn wizard_previous(&mut self) -> Result<WizardView, SessionError> {
        let wizard = self.wizard.as_mut().ok_or(SessionError::NoWizard)?;
        let retreat = wizard.previous()?;
        let view = wizard.view();
        if retreat == Retreat::Cancelled {
            self.wizard = None;
            let _ = self.events.send(SessionEvent::WizardClosed);
        }
        Ok(view)
    }

    pub fn close_wizard(&mut self) -> Result<(), SessionError> {
        let wizard = self.wizard.as_mut().ok_or(SessionError::NoWizard)?;
        wizard.close()?;
        self.wizard = None;
        let _ = self.events.send(SessionEvent::WizardClosed);
        Ok(())
    }

    fn spawn_fetch(&mut self, ticket: FetchTicket) {
        let store = Arc::clone(&self.store);
        let alive = Arc::clone(&self.alive);
        let tx = self.inbox_tx.clone();
        debug!(ticket = ticket.id(), "Fetching events");
        self.track(tokio::spawn(async move {
            let result = store.query_all_events().await;
            if alive.load(Ordering::Acquire) {
                let _ = tx.send(SessionMsg::FetchFinished { ticket, result });
            }
        }));
    }

    fn spawn_insert(&mut self, payload: NewEvent) {
        let store = Arc::clone(&self.store);
        let alive = Arc::clone(&self.alive);
        let tx = self.inbox_tx.clone();
        self.track(tokio::spawn(async move {
            let result = store.insert_event(payload).await;
            if alive.load(Ordering::Acquire) {
                let _ = tx.send(SessionMsg::InsertFinished(result));
            }
        }));
    }

    fn arm_render_gate(&mut self) {
        let delay = self.config.render_gate_delay;
        let alive = Arc::clone(&self.alive);
        let tx = self.inbox_tx.clone();
        self.track(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if alive.load(Ordering::Acquire) {
                let _ = tx.send(SessionMsg::RenderGateElapsed);
            }
        }));
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(task);
    }

    /// Asks a spawned session loop to unmount after the current job.
    pub fn request_unmount(&mut self) {
        self.unmount_requested = true;
    }

    pub fn unmount(self) {
        drop(self);
    }

    fn teardown(&mut self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        self.feed.unsubscribe();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.wizard = None;
        info!(resource = %self.config.resource, "Map session unmounted");
    }

    /// Moves the session onto its own task and returns a handle to it.
    pub fn spawn(self) -> (SessionHandle<S>, JoinHandle<()>) {
        let (jobs_tx, jobs) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let task = tokio::spawn(self.run(jobs));
        (SessionHandle { jobs: jobs_tx }, task)
    }

    async fn run(mut self, mut jobs: mpsc::Receiver<Job<S>>) {
        while !self.unmount_requested {
            tokio::select! {
                job = jobs.recv() => match job {
                    Some(job) => job(&mut self),
                    None => break,
                },
                _ = self.process_next() => {}
            }
        }
        self.teardown();
    }
}

impl<S: EventStore> Drop for MapSession<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// How a spawned session task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    Unmounted,
    Panicked(String),
    Cancelled,
}

impl SessionExit {
    /// Classifies the result of awaiting the task returned by [`MapSession::spawn`].
    pub fn from_join(result: Result<(), JoinError>) -> Self {
        match result {
            Ok(()) => SessionExit::Unmounted,
            Err(e) if e.is_panic() => {
                let payload = e.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(%message, "Map session task panicked");
                SessionExit::Panicked(message)
            }
            Err(_) => {
                warn!("Map session task cancelled");
                SessionExit::Cancelled
            }
        }
    }
}

type Job<S> = Box<dyn FnOnce(&mut MapSession<S>) + Send>;

/// Runs closures against a spawned [`MapSession`] on its own task.
pub struct SessionHandle<S: EventStore> {
    jobs: mpsc::Sender<Job<S>>,
}

impl<S: EventStore> Clone for SessionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
        }
    }
}

impl<S: EventStore> SessionHandle<S> {
    pub async fn call<R, F>(&self, f: F) -> Result<R, SessionError>
    where
        R: Send + 'static,
        F: FnOnce(&mut MapSession<S>) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<S> = Box::new(move |session| {
            let _ = reply_tx.send(f(session));
        });
        self.jobs
            .send(job)
            .await
            .map_err(|_| SessionError::Unmounted)?;
        reply_rx.await.map_err(|_| SessionError::Unmounted)
    }

    pub async fn unmount(&self) -> Result<(), SessionError> {
        self.call(|session| session.request_unmount()).await
    }
}
