use std::time::Duration;

use log::{debug, error, warn};

use super::handler::Handler;
use super::history::{HistoryEvent, HistoryType};
use crate::error::{Error, Result};
use crate::gmail::GmailClient;
use crate::gmail::models::HistoryEntry;

/// Tuning for the polling loop.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Cap on history pages fetched per poll. `None` drains the backlog.
    pub max_pages_per_poll: Option<u32>,
    /// Which change categories to request from the API.
    pub history_types: Vec<HistoryType>,
    /// Restrict history to changes touching this label.
    pub label_id: Option<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            poll_interval: Duration::from_secs(3),
            max_pages_per_poll: None,
            history_types: vec![HistoryType::MessageAdded],
            label_id: None,
        }
    }
}

/// Incremental mailbox watcher. Polls `history.list` from a checkpoint and
/// dispatches each change to the matching handlers, in mailbox order.
///
/// Delivery is at least once: the checkpoint only advances after a whole
/// batch is dispatched, so a handler failure replays the full batch on the
/// next poll. Handlers must tolerate duplicates.
pub struct Watcher {
    client: GmailClient,
    config: WatcherConfig,
    handlers: Vec<Handler>,
    checkpoint: Option<String>,
}

impl Watcher {
    pub fn new(client: GmailClient, config: WatcherConfig) -> Self {
        Watcher {
            client,
            config,
            handlers: Vec::new(),
            checkpoint: None,
        }
    }

    pub fn add_handler(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Resume from a previously saved checkpoint instead of the mailbox's
    /// current position.
    pub fn with_checkpoint(mut self, history_id: impl Into<String>) -> Self {
        self.checkpoint = Some(history_id.into());
        self
    }

    /// The current checkpoint, for persisting across restarts.
    pub fn checkpoint(&self) -> Option<&str> {
        self.checkpoint.as_deref()
    }

    /// One poll cycle. Returns the number of handler invocations.
    ///
    /// The first call only anchors the checkpoint at the mailbox's current
    /// history id; changes older than that first call are never reported.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let checkpoint = match &self.checkpoint {
            Some(checkpoint) => checkpoint.clone(),
            None => {
                let profile = self.client.profile().await?;
                debug!("watch anchored at history id {}", profile.history_id);
                self.checkpoint = Some(profile.history_id);
                return Ok(0);
            }
        };

        let (entries, next_checkpoint) = match self.collect_entries(&checkpoint).await {
            Ok(batch) => batch,
            Err(Error::CheckpointExpired(reason)) => {
                // The retention window moved past our checkpoint. Changes in
                // the gap are unrecoverable; re-anchor and keep going.
                warn!("history checkpoint {checkpoint} expired ({reason}), re-anchoring");
                let profile = self.client.profile().await?;
                self.checkpoint = Some(profile.history_id);
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let events = self.build_events(&entries).await?;
        let mut dispatched = 0;
        for event in &events {
            for handler in &mut self.handlers {
                if handler.matches(event) {
                    handler.call(event)?;
                    dispatched += 1;
                }
            }
        }

        // Only now is the batch done; an error above leaves the checkpoint
        // at its old value so the next poll redelivers everything.
        self.checkpoint = Some(next_checkpoint);
        Ok(dispatched)
    }

    /// Poll forever at the configured interval. Authentication failures are
    /// fatal; everything else is logged and retried on the next tick.
    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(0) => {}
                Ok(count) => debug!("dispatched {count} mailbox events"),
                Err(e @ Error::Auth(_)) => return Err(e),
                Err(e) => error!("mailbox poll failed: {e}"),
            }
        }
    }

    // Drain history pages from `checkpoint`, up to the page cap. Returns the
    // entries plus the checkpoint the batch advances to: the server's current
    // history id, or the last fetched record when the cap truncated the read.
    async fn collect_entries(
        &self,
        checkpoint: &str,
    ) -> Result<(Vec<HistoryEntry>, String)> {
        let type_names: Vec<&str> = self
            .config
            .history_types
            .iter()
            .map(|t| t.wire_name())
            .collect();
        let mut entries: Vec<HistoryEntry> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = self
                .client
                .list_history(
                    checkpoint,
                    &type_names,
                    self.config.label_id.as_deref(),
                    page_token.as_deref(),
                    None,
                )
                .await?;
            let current = page.history_id;
            entries.extend(page.history);
            page_token = page.next_page_token;
            pages += 1;

            if page_token.is_none() {
                return Ok((entries, current));
            }
            if let Some(max) = self.config.max_pages_per_poll {
                if pages >= max {
                    // Truncated read: advance only as far as we actually got.
                    // With no record id to anchor on, stay put and let the
                    // next poll retry from the same spot.
                    let reached = entries
                        .last()
                        .and_then(|entry| entry.id.clone())
                        .unwrap_or_else(|| checkpoint.to_string());
                    return Ok((entries, reached));
                }
            }
        }
    }

    // Flatten history records into events, preserving mailbox order. Added
    // messages are fetched eagerly; ones already gone again are skipped.
    async fn build_events(&self, entries: &[HistoryEntry]) -> Result<Vec<HistoryEvent>> {
        let mut events = Vec::new();
        for entry in entries {
            for added in &entry.messages_added {
                let reference = &added.message;
                let message = match self.client.get_message(&reference.id).await {
                    Ok(message) => message,
                    Err(Error::NotFound(_)) => {
                        warn!("message {} vanished before fetch, skipping", reference.id);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                events.push(HistoryEvent {
                    kind: HistoryType::MessageAdded,
                    message_id: reference.id.clone(),
                    thread_id: reference.thread_id.clone(),
                    label_ids: message.label_ids.clone(),
                    changed_label_ids: Vec::new(),
                    message: Some(message),
                });
            }
            for deleted in &entry.messages_deleted {
                let reference = &deleted.message;
                events.push(HistoryEvent {
                    kind: HistoryType::MessageDeleted,
                    message_id: reference.id.clone(),
                    thread_id: reference.thread_id.clone(),
                    label_ids: reference.label_ids.clone(),
                    changed_label_ids: Vec::new(),
                    message: None,
                });
            }
            for change in &entry.labels_added {
                events.push(HistoryEvent {
                    kind: HistoryType::LabelAdded,
                    message_id: change.message.id.clone(),
                    thread_id: change.message.thread_id.clone(),
                    label_ids: change.message.label_ids.clone(),
                    changed_label_ids: change.label_ids.clone(),
                    message: None,
                });
            }
            for change in &entry.labels_removed {
                events.push(HistoryEvent {
                    kind: HistoryType::LabelRemoved,
                    message_id: change.message.id.clone(),
                    thread_id: change.message.thread_id.clone(),
                    label_ids: change.message.label_ids.clone(),
                    changed_label_ids: change.label_ids.clone(),
                    message: None,
                });
            }
        }
        Ok(events)
    }
}
