//! Actor Pool
//!
//! Each actor runs on its own task behind a bounded queue, so commands for one
//! actor are applied strictly in order while different actors run in parallel.

use crate::{ActorError, PoolError, RuleActor, RuleDefinition};
use chrono::{DateTime, Utc};
use insight::Occurrence;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Commands buffered per actor before senders wait (default: 1024)
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug)]
enum Command {
    Ingest {
        signal: String,
        timestamp: DateTime<Utc>,
        value: f64,
    },
    Flush(DateTime<Utc>),
}

/// Final state of an actor once its queue is drained
#[derive(Debug, Clone, Serialize)]
pub struct ActorReport {
    pub rule_id: String,
    pub equipment_id: String,
    pub occurrences: Vec<Occurrence>,
    /// Closed occurrences dropped by the history limit
    pub dropped_occurrences: u64,
    /// Samples dropped as unknown, out of order or non-finite
    pub rejected: u64,
}

/// Sending side of one running actor
#[derive(Debug)]
pub struct ActorHandle {
    rule_id: String,
    equipment_id: String,
    signals: Vec<String>,
    sender: mpsc::Sender<Command>,
    task: JoinHandle<ActorReport>,
}

impl ActorHandle {
    /// Start `actor` on a new task
    pub fn spawn(actor: RuleActor, queue_capacity: usize) -> Self {
        let definition = actor.definition();
        let rule_id = definition.rule_id.clone();
        let equipment_id = definition.equipment_id.clone();
        let signals = definition.signals.clone();

        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let task = tokio::spawn(run(actor, receiver));

        Self {
            rule_id,
            equipment_id,
            signals,
            sender,
            task,
        }
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn equipment_id(&self) -> &str {
        &self.equipment_id
    }

    /// Whether the actor declares `signal`
    pub fn accepts(&self, signal: &str) -> bool {
        self.signals.iter().any(|s| s == signal)
    }

    /// Queue a sample
    pub async fn ingest(
        &self,
        signal: impl Into<String>,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Result<(), PoolError> {
        self.send(Command::Ingest {
            signal: signal.into(),
            timestamp,
            value,
        })
        .await
    }

    /// Queue a flush of the open occurrence
    pub async fn flush(&self, as_of: DateTime<Utc>) -> Result<(), PoolError> {
        self.send(Command::Flush(as_of)).await
    }

    async fn send(&self, command: Command) -> Result<(), PoolError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| PoolError::Closed(self.rule_id.clone()))
    }

    /// Close the queue, wait for every queued command and return the result
    pub async fn finish(self) -> Result<ActorReport, PoolError> {
        drop(self.sender);
        Ok(self.task.await?)
    }
}

async fn run(mut actor: RuleActor, mut receiver: mpsc::Receiver<Command>) -> ActorReport {
    let rule_id = actor.definition().rule_id.clone();
    debug!("Actor task started for rule {}", rule_id);
    let mut rejected = 0u64;

    while let Some(command) = receiver.recv().await {
        match command {
            Command::Ingest {
                signal,
                timestamp,
                value,
            } => {
                if let Err(e) = actor.ingest(&signal, timestamp, value) {
                    rejected += 1;
                    debug!("Rule {} dropped sample: {}", rule_id, e);
                }
            }
            Command::Flush(as_of) => {
                actor.flush(as_of);
            }
        }
    }

    debug!("Actor task for rule {} drained ({} rejected)", rule_id, rejected);
    let definition = actor.definition();
    ActorReport {
        rule_id: definition.rule_id.clone(),
        equipment_id: definition.equipment_id.clone(),
        occurrences: actor.occurrences().cloned().collect(),
        dropped_occurrences: actor.dropped_occurrences(),
        rejected,
    }
}

/// Runs many actors, routing samples by equipment and signal name
pub struct ActorPool {
    config: PoolConfig,
    actors: Vec<ActorHandle>,
}

impl ActorPool {
    /// Create an empty pool
    pub fn new(config: PoolConfig) -> Self {
        info!("Creating actor pool with config: {:?}", config);
        Self {
            config,
            actors: Vec::new(),
        }
    }

    /// Compile `definition` and start its actor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&mut self, definition: RuleDefinition) -> Result<&ActorHandle, ActorError> {
        let actor = RuleActor::new(definition)?;
        self.actors
            .push(ActorHandle::spawn(actor, self.config.queue_capacity));
        let index = self.actors.len() - 1;
        Ok(&self.actors[index])
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Send a sample to every actor on `equipment_id` that declares `signal`.
    ///
    /// Returns how many actors received it.
    pub async fn dispatch(
        &self,
        equipment_id: &str,
        signal: &str,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Result<usize, PoolError> {
        let mut routed = 0;
        for handle in self
            .actors
            .iter()
            .filter(|h| h.equipment_id == equipment_id && h.accepts(signal))
        {
            handle.ingest(signal, timestamp, value).await?;
            routed += 1;
        }
        if routed == 0 {
            warn!("No rule on {} consumes signal '{}'", equipment_id, signal);
        }
        Ok(routed)
    }

    /// Flush every actor at `as_of`
    pub async fn flush_all(&self, as_of: DateTime<Utc>) -> Result<(), PoolError> {
        for handle in &self.actors {
            handle.flush(as_of).await?;
        }
        Ok(())
    }

    /// Drain every actor and collect the reports in spawn order
    pub async fn finish(self) -> Result<Vec<ActorReport>, PoolError> {
        let mut reports = Vec::with_capacity(self.actors.len());
        for handle in self.actors {
            reports.push(handle.finish().await?);
        }
        info!("Actor pool finished: {} reports", reports.len());
        Ok(reports)
    }
}
