//! The ingestion run loop.
//!
//! One worker pulls lines from a single stream session, turns each into a
//! post, filters it and persists it. Per-record failures are counted and
//! logged here and never end the run. Lost sessions are re-acquired with
//! backoff; a clean upstream close or the stop signal drains the pipeline.

use crate::backoff::Backoff;
use crate::config::PipelineConfig;
use crate::connection::Connector;
use crate::db::{Gateway, Persisted, UpsertOutcome};
use crate::error::{ParseError, PipelineError, StoreError};
use crate::extract::{extract, ControlMessage, Record};
use crate::filters::{apply_filters, Filter, FilterResult};
use crate::settings::Settings;
use crate::stream::{ByteStream, StreamReader};
use crate::utils::logs;
use std::time::Duration;
use strum::Display;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PipelineState {
    Starting,
    Streaming,
    Extracting,
    Filtering,
    Persisting,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub records: usize,
    pub heartbeats: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub edges: usize,
    pub retweets: usize,
    pub empty_text: usize,
    pub limit_notices: usize,
    pub dropped_upstream: u64,
    pub other_notices: usize,
    pub parse_errors: usize,
    pub store_errors: usize,
    pub reconnects: usize,
}

/// What happened to one non-empty line.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Persisted(Persisted),
    /// The post row was handled but an edge write failed.
    PartiallyPersisted { persisted: Persisted, reason: String },
    Skipped(Filter),
    Control(ControlMessage),
    Invalid(ParseError),
    StoreFailed(String),
}

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub chunk_size: usize,
    pub max_line_bytes: usize,
    pub stall_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub stream: StreamOptions,
    pub reconnect: Backoff,
}

impl From<&Settings> for PipelineOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            stream: StreamOptions {
                chunk_size: settings.stream.chunk_size,
                max_line_bytes: settings.stream.max_line_bytes,
                stall_timeout: settings.stream.stall_timeout(),
            },
            reconnect: settings.reconnect.clone(),
        }
    }
}

enum SessionEnd {
    Closed,
    Stopped,
    Lost(String),
}

/// Resolves once the stop flag is set; never resolves if the sender is gone.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub struct Pipeline<C> {
    connector: C,
    gateway: Gateway,
    edge_source: String,
    options: PipelineOptions,
    reader: StreamReader,
    stop: watch::Receiver<bool>,
    state: PipelineState,
    reconnect_attempts: u32,
    stats: RunStats,
}

impl<C: Connector> Pipeline<C> {
    /// Opens the store, then the stream. Either failure is fatal.
    pub async fn start(
        config: &PipelineConfig,
        settings: &Settings,
        connector: C,
        stop: watch::Receiver<bool>,
    ) -> Result<Self, PipelineError> {
        logs::log_state(PipelineState::Starting);

        let database_url = config.store.database_url.clone();
        let store = settings.store.clone();
        let policy = settings.graph.edge_policy;
        let gateway = tokio::task::spawn_blocking(move || Gateway::open(&database_url, &store, policy))
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))??;
        logs::log_db_ready(gateway.pool_size(), &gateway.edge_policy().to_string());

        Self::with_gateway(
            gateway,
            config.edge_source(),
            PipelineOptions::from(settings),
            connector,
            stop,
        )
        .await
    }

    pub async fn with_gateway(
        gateway: Gateway,
        edge_source: String,
        options: PipelineOptions,
        connector: C,
        stop: watch::Receiver<bool>,
    ) -> Result<Self, PipelineError> {
        let stream = connector.acquire().await?;
        let reader = Self::open_reader(&options.stream, stream);

        Ok(Self {
            connector,
            gateway,
            edge_source,
            options,
            reader,
            stop,
            state: PipelineState::Starting,
            reconnect_attempts: 0,
            stats: RunStats::default(),
        })
    }

    fn open_reader(options: &StreamOptions, stream: ByteStream) -> StreamReader {
        StreamReader::new(
            stream,
            options.chunk_size,
            options.max_line_bytes,
            options.stall_timeout,
        )
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    fn transition(&mut self, state: PipelineState) {
        if self.state != state {
            self.state = state;
            logs::log_state(state);
        }
    }

    pub async fn run(mut self) -> Result<RunStats, PipelineError> {
        let result = loop {
            match self.stream_session().await {
                SessionEnd::Closed => {
                    logs::log_stream_closed();
                    break Ok(());
                }
                SessionEnd::Stopped => {
                    logs::log_stop_requested();
                    break Ok(());
                }
                SessionEnd::Lost(reason) => {
                    logs::log_stream_lost(&reason);
                    match self.reconnect(reason).await {
                        Ok(true) => continue,
                        Ok(false) => {
                            logs::log_stop_requested();
                            break Ok(());
                        }
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        self.transition(PipelineState::Draining);
        let Pipeline { gateway, stats, .. } = self;
        drop(gateway);
        logs::log_pool_released();
        logs::log_state(PipelineState::Stopped);
        logs::log_run_summary(&stats);

        result.map(|()| stats)
    }

    async fn stream_session(&mut self) -> SessionEnd {
        loop {
            self.transition(PipelineState::Streaming);
            if *self.stop.borrow() {
                return SessionEnd::Stopped;
            }

            let next = tokio::select! {
                _ = stop_requested(&mut self.stop) => return SessionEnd::Stopped,
                next = self.reader.next_line() => next,
            };

            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => return SessionEnd::Closed,
                Err(e) => return SessionEnd::Lost(e.to_string()),
            };

            self.reconnect_attempts = 0;
            if line.is_empty() {
                self.stats.heartbeats += 1;
                continue;
            }

            if let RecordOutcome::Control(ControlMessage::Disconnect { code, reason }) =
                self.process_line(&line).await
            {
                return SessionEnd::Lost(format!("disconnect {code}: {reason}"));
            }
        }
    }

    /// `Ok(false)` when the stop signal arrived while waiting to reconnect.
    async fn reconnect(&mut self, mut last: String) -> Result<bool, PipelineError> {
        loop {
            let attempt = self.reconnect_attempts + 1;
            if !self.options.reconnect.allows(attempt) {
                return Err(PipelineError::ReconnectsExhausted {
                    attempts: self.reconnect_attempts,
                    last,
                });
            }
            self.reconnect_attempts = attempt;

            let delay = self.options.reconnect.delay(attempt);
            logs::log_reconnect(attempt, delay);
            tokio::select! {
                _ = stop_requested(&mut self.stop) => return Ok(false),
                _ = tokio::time::sleep(delay) => {}
            }

            let acquired = tokio::select! {
                _ = stop_requested(&mut self.stop) => return Ok(false),
                acquired = self.connector.acquire() => acquired,
            };

            match acquired {
                Ok(stream) => {
                    self.reader = Self::open_reader(&self.options.stream, stream);
                    self.stats.reconnects += 1;
                    return Ok(true);
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    last = e.to_string();
                    logs::log_stream_lost(&last);
                }
            }
        }
    }

    fn count_persisted(&mut self, persisted: &Persisted) {
        match persisted.post {
            UpsertOutcome::Inserted => self.stats.inserted += 1,
            UpsertOutcome::DuplicateIgnored => self.stats.duplicates += 1,
        }
        self.stats.edges += persisted.edges;
    }

    /// Extract, filter and persist one non-empty line. Never fails.
    pub async fn process_line(&mut self, line: &[u8]) -> RecordOutcome {
        self.stats.records += 1;
        self.transition(PipelineState::Extracting);

        let post = match extract(line) {
            Record::Post(post) => post,
            Record::Control(message) => {
                logs::log_control(&message);
                match &message {
                    ControlMessage::Limit { dropped } => {
                        self.stats.limit_notices += 1;
                        self.stats.dropped_upstream += dropped;
                    }
                    _ => self.stats.other_notices += 1,
                }
                return RecordOutcome::Control(message);
            }
            Record::Invalid(err) => {
                logs::log_parse_error(&err);
                self.stats.parse_errors += 1;
                return RecordOutcome::Invalid(err);
            }
        };

        self.transition(PipelineState::Filtering);
        if let FilterResult::Reject(filter) = apply_filters(&post) {
            match filter {
                Filter::Retweet => self.stats.retweets += 1,
                Filter::EmptyText => self.stats.empty_text += 1,
            }
            logs::log_post_skipped(&post, filter);
            return RecordOutcome::Skipped(filter);
        }

        self.transition(PipelineState::Persisting);
        let gateway = self.gateway.clone();
        let source = self.edge_source.clone();
        let id = post.id.clone();
        let task = tokio::task::spawn_blocking(move || {
            let result = gateway.persist(&post, &source);
            (post, result)
        });

        match task.await {
            Ok((post, Ok(persisted))) => {
                self.count_persisted(&persisted);
                logs::log_post_persisted(&post, &persisted);
                RecordOutcome::Persisted(persisted)
            }
            Ok((_, Err(StoreError::PartialEdges { post, written, source }))) => {
                let persisted = Persisted {
                    post,
                    edges: written,
                };
                self.count_persisted(&persisted);
                self.stats.store_errors += 1;
                let err = StoreError::PartialEdges {
                    post,
                    written,
                    source,
                };
                logs::log_store_error(&id, &err);
                RecordOutcome::PartiallyPersisted {
                    persisted,
                    reason: err.to_string(),
                }
            }
            Ok((_, Err(err))) => {
                self.stats.store_errors += 1;
                logs::log_store_error(&id, &err);
                RecordOutcome::StoreFailed(err.to_string())
            }
            Err(join) => {
                self.stats.store_errors += 1;
                logs::log_persist_panicked(&id, &join.to_string());
                RecordOutcome::StoreFailed(join.to_string())
            }
        }
    }
}
