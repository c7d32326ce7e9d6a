//! Turns raw keystrokes into a bounded stream of searches
//!
//! Input is debounced, identical queries are not re-issued while one is in flight (or right after
//! it resolved), and accepting a new query cancels the previous one. A settlement that belongs to
//! a superseded query is dropped before it can reach the listener.

use super::search_client::{SearchClient, SearchOutcome};
use crate::error::SearchError;
use crate::types::{SearchQuery, SearchResultPage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Quiet window before the current input is dispatched
    pub debounce: Duration,
    /// Shorter trimmed input clears the results instead of searching
    pub min_query_length: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            min_query_length: 2,
        }
    }
}

/// Notifications delivered to the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    Loading { query: String },
    Result { query: String, page: SearchResultPage, degraded: bool },
    Error { query: String, message: String, retryable: bool },
    Cleared,
}

/// Receiver of search progress
pub trait SearchListener: Send + Sync {
    fn on_loading(&self, query: &str);
    fn on_result(&self, query: &str, page: &SearchResultPage, degraded: bool);
    fn on_error(&self, query: &str, error: &SearchError);
    fn on_cleared(&self);
}

impl SearchListener for mpsc::UnboundedSender<SearchEvent> {
    fn on_loading(&self, query: &str) {
        let _ = self.send(SearchEvent::Loading { query: query.to_string() });
    }

    fn on_result(&self, query: &str, page: &SearchResultPage, degraded: bool) {
        let _ = self.send(SearchEvent::Result {
            query: query.to_string(),
            page: page.clone(),
            degraded,
        });
    }

    fn on_error(&self, query: &str, error: &SearchError) {
        let _ = self.send(SearchEvent::Error {
            query: query.to_string(),
            message: error.to_string(),
            retryable: error.is_retryable() || matches!(error, SearchError::Degraded(_)),
        });
    }

    fn on_cleared(&self) {
        let _ = self.send(SearchEvent::Cleared);
    }
}

/// Latest settled state, observable through [`SearchOrchestrator::subscribe`]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SearchState {
    #[default]
    Idle,
    Loading { query: String },
    Ready { query: String, page: SearchResultPage, degraded: bool },
    Failed { query: String, message: String },
}

struct InFlight {
    text: String,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    in_flight: Option<InFlight>,
    last_resolved: Option<String>,
    last_accepted: Option<String>,
}

impl Inner {
    /// Returns whether a search was actually in flight
    fn cancel_in_flight(&mut self) -> bool {
        match self.in_flight.take() {
            Some(previous) => {
                debug!("Cancelling in-flight search for '{}'", previous.text);
                previous.token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Debouncing, deduplicating front end of a [`SearchClient`]
#[derive(Clone)]
pub struct SearchOrchestrator {
    client: Arc<SearchClient>,
    listener: Arc<dyn SearchListener>,
    config: OrchestratorConfig,
    inner: Arc<Mutex<Inner>>,
    state: Arc<watch::Sender<SearchState>>,
}

impl SearchOrchestrator {
    pub fn new(client: Arc<SearchClient>, listener: Arc<dyn SearchListener>, config: OrchestratorConfig) -> Self {
        let (state, _) = watch::channel(SearchState::Idle);
        Self {
            client,
            listener,
            config,
            inner: Arc::new(Mutex::new(Inner::default())),
            state: Arc::new(state),
        }
    }

    /// Watch the latest settled state
    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    /// Consume raw input until the sender side closes.
    ///
    /// Pending input is dispatched immediately on close and the last dispatched search is
    /// awaited before returning.
    pub async fn run(&self, mut input: mpsc::Receiver<String>) {
        let mut pending: Option<String> = None;
        let timer = sleep_until(Instant::now() + self.config.debounce);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;
                received = input.recv() => match received {
                    Some(text) => {
                        pending = Some(text);
                        timer.as_mut().reset(Instant::now() + self.config.debounce);
                    }
                    None => break,
                },
                _ = &mut timer, if pending.is_some() => {
                    if let Some(text) = pending.take() {
                        self.submit(&text).await;
                    }
                }
            }
        }

        if let Some(text) = pending.take() {
            self.submit(&text).await;
        }
        self.settle().await;
    }

    /// Accept `raw` as the current query, bypassing the debounce window
    pub async fn submit(&self, raw: &str) {
        let text = raw.trim();
        let mut inner = self.inner.lock().await;

        if text.chars().count() < self.config.min_query_length {
            inner.cancel_in_flight();
            inner.generation += 1;
            inner.last_resolved = None;
            self.listener.on_cleared();
            self.state.send_replace(SearchState::Idle);
            return;
        }

        match &inner.in_flight {
            Some(in_flight) if in_flight.text == text => {
                debug!("Skipping duplicate of in-flight query");
                return;
            }
            None if inner.last_resolved.as_deref() == Some(text) => {
                debug!("Skipping query identical to the last resolved one");
                return;
            }
            _ => {}
        }

        inner.cancel_in_flight();
        inner.generation += 1;
        inner.last_accepted = Some(text.to_string());

        let generation = inner.generation;
        let token = CancellationToken::new();

        self.listener.on_loading(text);
        self.state.send_replace(SearchState::Loading { query: text.to_string() });

        let this = self.clone();
        let query_text = text.to_string();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            this.dispatch(query_text, task_token, generation).await;
        });

        inner.in_flight = Some(InFlight {
            text: text.to_string(),
            token,
            handle: Some(handle),
        });
    }

    /// Re-issue the last accepted query, even if it already resolved
    pub async fn retry(&self) {
        let text = {
            let mut inner = self.inner.lock().await;
            inner.last_resolved = None;
            inner.last_accepted.clone()
        };

        if let Some(text) = text {
            self.submit(&text).await;
        }
    }

    /// Cancel the in-flight search, if any, and return to idle.
    ///
    /// The last resolved query is forgotten so that submitting it again searches instead of being
    /// skipped as a duplicate. Nothing is emitted when no search was in flight.
    pub async fn cancel(&self) {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        if !inner.cancel_in_flight() {
            return;
        }

        inner.last_resolved = None;
        self.listener.on_cleared();
        self.state.send_replace(SearchState::Idle);
    }

    /// Wait until the current in-flight search has settled
    pub async fn settle(&self) {
        let handle = {
            let mut inner = self.inner.lock().await;
            inner.in_flight.as_mut().and_then(|f| f.handle.take())
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Search task failed: {}", e);
            }
        }
    }

    /// Run one accepted query and publish its settlement unless a newer one superseded it
    pub(super) async fn dispatch(&self, text: String, token: CancellationToken, generation: u64) {
        let query = SearchQuery::new(&text);
        let outcome = self.client.search(&query, &token).await;

        let mut inner = self.inner.lock().await;
        if token.is_cancelled() || inner.generation != generation {
            debug!("Dropping stale settlement for generation {}", generation);
            return;
        }
        inner.in_flight = None;

        match outcome {
            Ok(outcome) => {
                let degraded = outcome.is_degraded();
                let page = match outcome {
                    SearchOutcome::Fresh(page) | SearchOutcome::Cached(page) => {
                        inner.last_resolved = Some(text.clone());
                        page
                    }
                    // A degraded page should not stop the user from retyping the same query
                    SearchOutcome::Degraded(page) => page,
                };
                self.listener.on_result(&text, &page, degraded);
                self.state.send_replace(SearchState::Ready { query: text, page, degraded });
            }
            Err(err) if err.is_cancellation() => {}
            Err(err) => {
                self.listener.on_error(&text, &err);
                self.state.send_replace(SearchState::Failed { query: text, message: err.to_string() });
            }
        }
    }
}
