//! Decided-history sync
//!
//! A controller that learns of a decided height above its own fills the gap
//! from peers in a background task:
//!
//! ```text
//! process_decided(h) ──behind──→ trigger_sync(local+1, h-1)
//!                                     │  (aborts an older, lower target)
//!                                     ↓
//!                 DecidedRange batches of `sync_max_batch`
//!                 rate limited, each request under `sync_request_timeout`
//!                                     │
//!                                     ↓
//!                 validate → persist → DecidedEvent per height
//! ```
//!
//! The same module answers peers' requests from storage, including the
//! last round change they can ask for to see which instance this node is
//! on.

use std::time::Duration;

use qv_01_messages::{SignedMessage, SsvMessage, SyncPayload, SyncRequest, SyncResponse};
use qv_02_instance::domain::justification::valid_round_change;
use qv_02_instance::domain::Scope;
use shared_types::Height;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Controller;
use crate::domain::DecidedEvent;
use crate::error::{ControllerError, ControllerResult};
use crate::metrics;

/// Background sync toward `target`.
pub(crate) struct SyncTask {
    target: Height,
    handle: JoinHandle<()>,
}

impl Controller {
    /// Fetch decided messages for `from..=to` in the background. A running
    /// sync with a lower target is aborted; one already covering `to` is
    /// kept.
    pub fn trigger_sync(&self, from: Height, to: Height) {
        if from > to {
            return;
        }
        let mut slot = self.inner.sync.lock();
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() && task.target >= to {
                debug!(target = task.target, requested = to, "Sync already in flight");
                return;
            }
        }
        if let Some(old) = slot.take() {
            if !old.handle.is_finished() {
                info!(old = old.target, new = to, "Superseding running sync");
            }
            old.handle.abort();
        }

        let this = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = this.sync_decided(from, to).await {
                warn!(from, to, error = %e, "Decided sync failed");
            }
        });
        *slot = Some(SyncTask { target: to, handle });
    }

    /// Target of the background sync still running, if any.
    pub fn sync_target(&self) -> Option<Height> {
        self.inner
            .sync
            .lock()
            .as_ref()
            .filter(|task| !task.handle.is_finished())
            .map(|task| task.target)
    }

    /// Wait for the current background sync, if any, to end.
    pub async fn await_sync(&self) {
        let task = self.inner.sync.lock().take();
        if let Some(task) = task {
            // an aborted task is as finished as a completed one
            let _ = task.handle.await;
        }
    }

    async fn sync_decided(&self, from: Height, to: Height) -> ControllerResult<()> {
        info!(from, to, "Syncing decided history");
        let batch = self.inner.config.sync_max_batch.max(1);
        let mut next = from;
        while next <= to {
            let end = to.min(next.saturating_add(batch - 1));
            let response = self
                .request(SyncRequest::DecidedRange { from: next, to: end })
                .await?;
            for msg in response.messages {
                let height = msg.message.height;
                if !(next..=end).contains(&height) {
                    debug!(height, "Ignoring synced message outside requested range");
                    continue;
                }
                if let Err(e) = self.apply_synced(msg).await {
                    warn!(height, error = %e, "Rejected synced decided message");
                }
            }
            next = end.saturating_add(1);
            if end == Height::MAX {
                break;
            }
        }
        info!(from, to, "Decided sync finished");
        Ok(())
    }

    async fn apply_synced(&self, msg: SignedMessage) -> ControllerResult<()> {
        self.validate_decided(&msg)?;
        let height = msg.message.height;
        if self.get_decided(height)?.is_some() {
            return Ok(());
        }
        let value = msg.message.commit_data()?.data;
        self.persist_decided(&msg)?;
        metrics::record_decided_persisted("sync");
        self.inner.state.lock().await.note_decided(height);
        self.emit(DecidedEvent {
            identifier: self.inner.identifier.clone(),
            height,
            value,
            aggregated_commit: msg,
        });
        Ok(())
    }

    /// Ask a peer for its highest decided message and process it.
    pub async fn sync_highest_decided(&self) -> ControllerResult<()> {
        let response = self.request(SyncRequest::LastDecided).await?;
        match response.messages.into_iter().max_by_key(|m| m.message.height) {
            Some(msg) => self.process_decided(msg).await,
            None => Ok(()),
        }
    }

    /// Ask a peer which height and round it is working on, as its last
    /// validated round change.
    pub async fn current_instance_of_peer(&self) -> ControllerResult<Option<SignedMessage>> {
        let response = self.request(SyncRequest::CurrentInstance).await?;
        let Some(msg) = response.messages.into_iter().next() else {
            return Ok(None);
        };
        if msg.message.identifier != self.inner.identifier {
            return Err(ControllerError::WrongIdentifier);
        }
        let scope = Scope {
            share: &self.inner.share,
            identifier: &self.inner.identifier,
            height: msg.message.height,
        };
        valid_round_change(scope, &msg)?;
        Ok(Some(msg))
    }

    /// One rate-limited request, retried up to `sync_max_attempts`.
    async fn request(&self, request: SyncRequest) -> ControllerResult<SyncResponse> {
        let config = &self.inner.config;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.request_once(&request, config.sync_request_timeout).await;
            metrics::record_sync_request(match &result {
                Ok(_) => "ok",
                Err(ControllerError::SyncTimeout) => "timeout",
                Err(ControllerError::RateLimited) => "rate_limited",
                Err(_) => "error",
            });
            match result {
                Ok(response) => return Ok(response),
                Err(ControllerError::RateLimited) => return Err(ControllerError::RateLimited),
                Err(e) if attempt < config.sync_max_attempts => {
                    warn!(attempt, error = %e, "Sync request failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(&self, request: &SyncRequest, timeout: Duration) -> ControllerResult<SyncResponse> {
        if !self.inner.sync_limiter.try_acquire() {
            return Err(ControllerError::RateLimited);
        }
        let envelope = SsvMessage::sync(
            self.inner.identifier.clone(),
            &SyncPayload::Request(request.clone()),
        )?;
        let frame = self.encode_frame(&envelope)?;

        let reply = tokio::time::timeout(timeout, self.inner.network.request(frame))
            .await
            .map_err(|_| ControllerError::SyncTimeout)??;

        match self.decode_frame(&reply)?.sync_payload()? {
            SyncPayload::Response(response) => match response.error {
                Some(reason) => Err(ControllerError::SyncRefused(reason)),
                None => Ok(response),
            },
            SyncPayload::Request(_) => Err(ControllerError::UnexpectedMessage("sync request as reply".into())),
        }
    }

    // =========================================================================
    // Responder
    // =========================================================================

    /// Answer a peer's history request from storage.
    pub fn handle_sync_request(&self, request: &SyncRequest) -> SyncResponse {
        if !self.inner.responder_limiter.try_acquire() {
            return SyncResponse::error("rate limited");
        }
        let store = &self.inner.store;
        let id = &self.inner.identifier;
        let result = match *request {
            SyncRequest::LastDecided => store
                .get_last_decided(id)
                .map(|msg| msg.into_iter().collect()),
            SyncRequest::CurrentInstance => store
                .get_last_change_round(id)
                .map(|msg| msg.into_iter().collect()),
            SyncRequest::DecidedRange { from, to } => {
                if to < from {
                    return SyncResponse::error(format!("invalid range {from}..={to}"));
                }
                let batch = self.inner.config.sync_max_batch.max(1);
                let to = to.min(from.saturating_add(batch - 1));
                store.get_decided(id, from, to)
            }
        };
        match result {
            Ok(decided) => SyncResponse::ok(decided),
            Err(e) => {
                warn!(error = %e, "Failed to serve sync request");
                SyncResponse::error(e.to_string())
            }
        }
    }

    /// Decode a request frame and encode the reply with the active codec.
    pub fn handle_request_frame(&self, frame: &[u8]) -> ControllerResult<Vec<u8>> {
        let request = match self.decode_frame(frame)?.sync_payload()? {
            SyncPayload::Request(request) => request,
            SyncPayload::Response(_) => {
                return Err(ControllerError::UnexpectedMessage("unsolicited sync response".into()))
            }
        };
        let response = self.handle_sync_request(&request);
        let envelope = SsvMessage::sync(self.inner.identifier.clone(), &SyncPayload::Response(response))?;
        self.encode_frame(&envelope)
    }
}
