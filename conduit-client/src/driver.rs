//! Concurrent multi-conversation driver.
//!
//! Each conversation runs in its own task for a batch; the batch completes
//! when every task has finished. Failures are reported per conversation and
//! never cancel siblings.

use std::sync::Arc;
use std::time::Duration;

use conduit_core::wire::codes;
use conduit_core::{DrbgEngine, ReseedMonitor, StatefulEngine};
use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::conversation::{Conversation, TripOutcome};
use crate::handshake::HandshakeOrchestrator;
use crate::transport::PeerTransport;

/// Outcome of one conversation within one batch (or of its initial handshake).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationReport {
    pub client: usize,
    pub conversation_id: String,
    pub trips_attempted: u32,
    pub trips_completed: u32,
    pub rotations: u32,
    pub recoveries: u32,
    /// Replies whose plaintext differed from the message sent.
    pub mismatches: u32,
    /// Terminal error as (result code, message).
    pub error: Option<(String, String)>,
}

impl ConversationReport {
    fn new(client: usize, conversation_id: &str) -> Self {
        Self {
            client,
            conversation_id: conversation_id.to_string(),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.mismatches == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batch: u32,
    pub conversations: Vec<ConversationReport>,
}

impl BatchReport {
    pub fn trips_completed(&self) -> u32 {
        self.conversations.iter().map(|c| c.trips_completed).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConversationReport> {
        self.conversations.iter().filter(|c| !c.is_clean())
    }
}

/// Demo message for `client` on its `trip`th round trip.
pub fn demo_message(client: usize, trip: u32) -> String {
    format!("Hello from client {} for the {} time.", client, trip)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    pub max_trips: u32,
    pub max_delay: Duration,
}

struct Slot<T, E: StatefulEngine> {
    client: usize,
    conversation: Conversation<T, E>,
}

pub struct ConversationDriver<T, E: StatefulEngine = DrbgEngine> {
    orchestrator: Arc<HandshakeOrchestrator<T, E>>,
    monitor: Arc<ReseedMonitor>,
    settings: DriverSettings,
    slots: Vec<Slot<T, E>>,
    batches_run: u32,
}

impl<T: PeerTransport, E: StatefulEngine> ConversationDriver<T, E> {
    pub fn new(
        orchestrator: Arc<HandshakeOrchestrator<T, E>>,
        monitor: Arc<ReseedMonitor>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            orchestrator,
            monitor,
            settings,
            slots: Vec::new(),
            batches_run: 0,
        }
    }

    /// Number of conversations with an established session.
    pub fn conversations(&self) -> usize {
        self.slots.len()
    }

    pub fn conversation_ids(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| slot.conversation.id().to_string())
            .collect()
    }

    /// Handshake `clients` new conversations with fresh uuid ids. Returns a
    /// report for each conversation whose handshake failed; those are not
    /// driven.
    pub async fn open(&mut self, clients: usize) -> Vec<ConversationReport> {
        let mut failures = Vec::new();
        let first = self.slots.len() + 1;

        for client in first..first + clients {
            let id = Uuid::new_v4().to_string();
            match Conversation::open(id.clone(), self.orchestrator.clone(), self.monitor.clone())
                .await
            {
                Ok(conversation) => {
                    info!(client, conversation_id = %id, "Conversation opened");
                    self.slots.push(Slot {
                        client,
                        conversation,
                    });
                }
                Err(e) => {
                    error!(client, conversation_id = %id, "Handshake failed: {}", e);
                    let mut report = ConversationReport::new(client, &id);
                    report.error = Some((e.result_code(), e.to_string()));
                    failures.push(report);
                }
            }
        }

        failures
    }

    /// Drive every open conversation through 1..=max_trips round trips
    /// concurrently and wait for all of them.
    pub async fn run_batch(&mut self) -> BatchReport {
        self.batches_run += 1;
        let batch = self.batches_run;
        let settings = self.settings;

        let (owners, handles): (Vec<_>, Vec<_>) = std::mem::take(&mut self.slots)
            .into_iter()
            .map(|slot| {
                let owner = ConversationReport::new(slot.client, slot.conversation.id());
                (owner, tokio::spawn(drive(slot, settings)))
            })
            .unzip();

        let mut conversations = Vec::with_capacity(handles.len());
        for (mut owner, joined) in owners.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok((slot, report)) => {
                    self.slots.push(slot);
                    conversations.push(report);
                }
                Err(e) => {
                    // The slot went down with the task; the conversation is not driven again.
                    error!(
                        client = owner.client,
                        conversation_id = %owner.conversation_id,
                        "Conversation task failed: {}",
                        e
                    );
                    owner.error = Some((codes::HTTP_EXCEPTION.to_string(), e.to_string()));
                    conversations.push(owner);
                }
            }
        }
        conversations.sort_by_key(|report| report.client);
        self.slots.sort_by_key(|slot| slot.client);

        let report = BatchReport {
            batch,
            conversations,
        };
        info!(
            batch,
            conversations = report.conversations.len(),
            trips_completed = report.trips_completed(),
            failures = report.failures().count(),
            "Batch complete"
        );
        report
    }
}

async fn drive<T: PeerTransport, E: StatefulEngine>(
    mut slot: Slot<T, E>,
    settings: DriverSettings,
) -> (Slot<T, E>, ConversationReport) {
    let mut rng = StdRng::from_entropy();
    let conversation = &mut slot.conversation;
    let mut report = ConversationReport::new(slot.client, conversation.id());
    let trips = rng.gen_range(1..=settings.max_trips.max(1));

    for trip in 1..=trips {
        report.trips_attempted += 1;
        let message = demo_message(slot.client, trip);

        let reply = match conversation.round_trip(&message).await {
            Ok(TripOutcome::Completed { reply }) => reply,
            Ok(TripOutcome::Rotated { reply }) => {
                report.rotations += 1;
                reply
            }
            Ok(TripOutcome::Recovered) => {
                report.recoveries += 1;
                break;
            }
            Err(e) => {
                error!(
                    client = slot.client,
                    conversation_id = %conversation.id(),
                    trip,
                    "Round trip failed: {}",
                    e
                );
                report.error = Some((e.result_code(), e.to_string()));
                break;
            }
        };

        report.trips_completed += 1;
        if reply == message {
            info!(client = slot.client, trip, "Reply: {}", reply);
        } else {
            warn!(client = slot.client, trip, "Reply mismatch: {:?}", reply);
            report.mismatches += 1;
        }

        let max_delay_ms = u64::try_from(settings.max_delay.as_millis()).unwrap_or(u64::MAX);
        if max_delay_ms > 0 {
            let delay = rng.gen_range(0..=max_delay_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    (slot, report)
}
