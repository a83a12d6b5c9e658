//! Debounced, validated place search in front of a [`GeoResolver`].
//!
//! Every keystroke bumps a generation counter and aborts whatever the
//! previous keystroke scheduled. A scheduled search only starts, and its
//! results are only applied, while its generation is still current, so a
//! slow earlier lookup can never overwrite a later one.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle};
use unicode_normalization::char::is_combining_mark;

use crate::{
    error::{ResolutionError, SearchError, StoreError, ValidationError},
    history::RecentSearches,
    model::LocationCandidate,
    provider::GeoResolver,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SearchState {
    Idle,
    /// The latest input failed validation; nothing was submitted.
    Invalid(ValidationError),
    Debouncing { query: String },
    InFlight { query: String },
    Resolved { query: String, candidates: Vec<LocationCandidate> },
    Failed { query: String, error: ResolutionError },
}

impl SearchState {
    /// Waiting on the debounce timer or the resolver.
    pub fn is_pending(&self) -> bool {
        matches!(self, SearchState::Debouncing { .. } | SearchState::InFlight { .. })
    }

    pub fn candidates(&self) -> Option<&[LocationCandidate]> {
        match self {
            SearchState::Resolved { candidates, .. } => Some(candidates),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<SearchError> {
        match self {
            SearchState::Invalid(err) => Some(SearchError::Validation(*err)),
            SearchState::Failed { error, .. } => Some(SearchError::Resolution(error.clone())),
            _ => None,
        }
    }
}

/// Snapshot of the search box, published on every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSession {
    pub text: String,
    pub state: SearchState,
    pub last_search_at: Option<DateTime<Utc>>,
    pub recent: Vec<String>,
}

impl SearchSession {
    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, SearchState::InFlight { .. })
    }
}

/// Accept letters and spaces only; returns the trimmed query.
///
/// Combining marks count as part of the letter they follow, so
/// decomposed text such as "Sa\u{303}o Paulo" is accepted.
pub fn validate_query(text: &str) -> Result<&str, ValidationError> {
    let query = text.trim();
    if query.is_empty() {
        return Err(ValidationError::Empty);
    }

    let mut after_letter = false;
    for c in query.chars() {
        if c.is_alphabetic() {
            after_letter = true;
        } else if is_combining_mark(c) && after_letter {
            continue;
        } else if c == '\t' || (c.is_whitespace() && !c.is_control()) {
            after_letter = false;
        } else {
            return Err(ValidationError::InvalidCharacters);
        }
    }

    Ok(query)
}

#[derive(Debug)]
struct Shared {
    resolver: Arc<dyn GeoResolver>,
    generation: AtomicU64,
    session: watch::Sender<SearchSession>,
    history: Mutex<RecentSearches>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn record_recent(&self, query: &str) -> Vec<String> {
        let mut history = self.history.lock();
        if let Err(err) = history.record(query) {
            tracing::warn!("Failed to persist recent searches: {}", err);
        }
        history.entries().to_vec()
    }
}

/// Owns the search session. Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct SearchController {
    shared: Arc<Shared>,
    debounce: Duration,
    pending: Option<JoinHandle<()>>,
}

impl SearchController {
    pub fn new(
        resolver: Arc<dyn GeoResolver>,
        history: RecentSearches,
        debounce: Duration,
    ) -> Self {
        let session = SearchSession {
            text: String::new(),
            state: SearchState::Idle,
            last_search_at: None,
            recent: history.entries().to_vec(),
        };
        let (session, _) = watch::channel(session);

        Self {
            shared: Arc::new(Shared {
                resolver,
                generation: AtomicU64::new(0),
                session,
                history: Mutex::new(history),
            }),
            debounce,
            pending: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchSession> {
        self.shared.session.subscribe()
    }

    pub fn session(&self) -> SearchSession {
        self.shared.session.borrow().clone()
    }

    /// Feed the full text of the search box after a keystroke.
    ///
    /// Valid text is submitted once it has been stable for the debounce
    /// interval. Invalid text is rejected immediately and cancels any
    /// pending submission.
    pub fn input(&mut self, text: &str) -> Result<(), ValidationError> {
        self.schedule(text, self.debounce)
    }

    /// Search immediately, e.g. when a recent search is picked.
    pub fn submit(&mut self, text: &str) -> Result<(), ValidationError> {
        self.schedule(text, Duration::ZERO)
    }

    /// Reset text and results and cancel any pending work.
    pub fn clear(&mut self) {
        self.supersede(|s| {
            s.text.clear();
            s.state = SearchState::Idle;
        });
    }

    /// Wait until the session is no longer debouncing or in flight.
    pub async fn settled(&self) -> SearchSession {
        let mut rx = self.shared.session.subscribe();
        match rx.wait_for(|s| !s.state.is_pending()).await {
            Ok(session) => session.clone(),
            Err(_) => self.session(),
        }
    }

    pub fn recent(&self) -> Vec<String> {
        self.shared.history.lock().entries().to_vec()
    }

    pub fn remove_recent(&mut self, query: &str) -> Result<(), StoreError> {
        let recent = {
            let mut history = self.shared.history.lock();
            history.remove(query)?;
            history.entries().to_vec()
        };
        self.shared.session.send_modify(|s| s.recent = recent);
        Ok(())
    }

    pub fn clear_recent(&mut self) -> Result<(), StoreError> {
        self.shared.history.lock().clear()?;
        self.shared.session.send_modify(|s| s.recent.clear());
        Ok(())
    }

    fn schedule(&mut self, text: &str, delay: Duration) -> Result<(), ValidationError> {
        let query = match validate_query(text) {
            Ok(query) => query.to_string(),
            Err(err) => {
                tracing::debug!("Rejected search input {:?}: {}", text, err);
                self.supersede(|s| {
                    s.text = text.to_string();
                    s.state = SearchState::Invalid(err);
                });
                return Err(err);
            }
        };

        let generation = self.supersede(|s| {
            s.text = text.to_string();
            s.state = SearchState::Debouncing { query: query.clone() };
        });

        let shared = Arc::clone(&self.shared);
        self.pending = Some(tokio::spawn(run_search(shared, generation, query, delay)));
        Ok(())
    }

    /// Cancel pending work and start a new generation, applying `update`
    /// to the session in the same step.
    fn supersede(&mut self, update: impl FnOnce(&mut SearchSession)) -> u64 {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }

        let mut generation = 0;
        self.shared.session.send_modify(|s| {
            generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            update(s);
        });
        generation
    }
}

impl Drop for SearchController {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

async fn run_search(shared: Arc<Shared>, generation: u64, query: String, delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let started = shared.session.send_if_modified(|s| {
        if !shared.is_current(generation) {
            return false;
        }
        s.state = SearchState::InFlight { query: query.clone() };
        s.last_search_at = Some(Utc::now());
        true
    });
    if !started {
        return;
    }

    tracing::debug!("Searching for '{}'", query);
    let result = shared.resolver.resolve(&query).await;
    if !shared.is_current(generation) {
        tracing::debug!("Discarding superseded results for '{}'", query);
        return;
    }

    // Persist before taking the session lock; `set` may hit the disk.
    let recent = match &result {
        Ok(candidates) => {
            tracing::debug!("'{}' resolved to {} candidate(s)", query, candidates.len());
            Some(shared.record_recent(&query))
        }
        Err(error) => {
            tracing::debug!("Search for '{}' failed: {}", query, error);
            None
        }
    };

    shared.session.send_if_modified(|s| {
        if !shared.is_current(generation) {
            return false;
        }

        if let Some(recent) = recent {
            s.recent = recent;
        }
        s.state = match result {
            Ok(candidates) => SearchState::Resolved { query, candidates },
            Err(error) => SearchState::Failed { query, error },
        };
        true
    });
}
