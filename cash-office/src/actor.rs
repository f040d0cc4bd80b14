//! Single-writer task for closings
//!
//! Every closing mutation goes through one Tokio task:
//! - A save (lock check, upsert, row replacement) finishes before the next
//!   message is read, so two saves for the same (user, date) never
//!   interleave and the last one wins
//! - The bounded mailbox applies backpressure to callers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │             ClosingWriterHandle (Clone)               │
//! │         Sends messages to the writer mailbox          │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              ClosingWriter (Single Task)              │
//! │   Save:   reject if closed → upsert_closing           │
//! │           → replace_movements → replace_denominations │
//! │   Close:  status = closed, closed_at = now            │
//! │   Delete: delete_closings (rows cascade)              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//!               PersistenceGateway
//! ```

use crate::{
    storage::{ClosingFilter, PersistenceGateway},
    Error, Result,
};
use chrono::Utc;
use reconciliation_core::{
    CashClosing, ClosingStatus, DenominationCount, ProductCount, ProductMovement,
    SupplyDenomination,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// A closing together with its stored rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredClosing {
    /// Closing record
    pub closing: CashClosing,
    /// Product rows
    pub movements: Vec<ProductMovement>,
    /// Vault rows
    pub denominations: Vec<SupplyDenomination>,
}

/// Message sent to the closing writer
#[derive(Debug)]
pub enum WriterMessage {
    /// Upsert a closing and replace its rows
    Save {
        closing: CashClosing,
        products: Vec<ProductCount>,
        denominations: Vec<DenominationCount>,
        response: oneshot::Sender<Result<StoredClosing>>,
    },

    /// Mark a closing read-only
    Close {
        closing_id: Uuid,
        response: oneshot::Sender<Result<CashClosing>>,
    },

    /// Delete closings and their rows
    Delete {
        filter: ClosingFilter,
        response: oneshot::Sender<Result<usize>>,
    },

    /// Stop the writer
    Shutdown,
}

/// Task that owns every closing write
pub struct ClosingWriter {
    store: Arc<dyn PersistenceGateway>,
    mailbox: mpsc::Receiver<WriterMessage>,
}

impl std::fmt::Debug for ClosingWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosingWriter").finish_non_exhaustive()
    }
}

impl ClosingWriter {
    /// Create new writer
    pub fn new(store: Arc<dyn PersistenceGateway>, mailbox: mpsc::Receiver<WriterMessage>) -> Self {
        Self { store, mailbox }
    }

    /// Run the writer loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                WriterMessage::Save {
                    closing,
                    products,
                    denominations,
                    response,
                } => {
                    let result = self.save(closing, products, denominations).await;
                    if let Err(e) = &result {
                        tracing::warn!(error = %e, "Closing save rejected");
                    }
                    let _ = response.send(result);
                }

                WriterMessage::Close {
                    closing_id,
                    response,
                } => {
                    let _ = response.send(self.close(closing_id).await);
                }

                WriterMessage::Delete { filter, response } => {
                    let _ = response.send(self.store.delete_closings(&filter).await);
                }

                WriterMessage::Shutdown => break,
            }
        }

        tracing::debug!("Closing writer stopped");
    }

    async fn save(
        &self,
        closing: CashClosing,
        products: Vec<ProductCount>,
        denominations: Vec<DenominationCount>,
    ) -> Result<StoredClosing> {
        let current = self
            .store
            .select_closings(&ClosingFilter::for_day(closing.user_id, closing.date))
            .await?;
        if let Some(existing) = current.iter().find(|c| c.is_closed()) {
            return Err(Error::ClosingLocked(existing.id));
        }

        let closing = self.store.upsert_closing(closing).await?;
        let movements = self.store.replace_movements(closing.id, products).await?;
        let denominations = self
            .store
            .replace_denominations(closing.id, denominations)
            .await?;

        tracing::info!(
            closing_id = %closing.id,
            user_id = %closing.user_id,
            date = %closing.date,
            difference = %closing.difference,
            "Closing saved"
        );

        Ok(StoredClosing {
            closing,
            movements,
            denominations,
        })
    }

    async fn close(&self, closing_id: Uuid) -> Result<CashClosing> {
        let mut closing = self
            .store
            .select_closings(&ClosingFilter::by_id(closing_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("closing {}", closing_id)))?;

        if closing.is_closed() {
            return Ok(closing);
        }

        let now = Utc::now();
        closing.status = ClosingStatus::Closed;
        closing.closed_at = Some(now);
        closing.updated_at = now;
        let closing = self.store.upsert_closing(closing).await?;

        tracing::info!(closing_id = %closing.id, user_id = %closing.user_id, "Closing closed");
        Ok(closing)
    }
}

/// Handle for sending messages to the writer
#[derive(Clone, Debug)]
pub struct ClosingWriterHandle {
    sender: mpsc::Sender<WriterMessage>,
}

impl ClosingWriterHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<WriterMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> WriterMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Writer mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Save a closing and replace its rows
    pub async fn save(
        &self,
        closing: CashClosing,
        products: Vec<ProductCount>,
        denominations: Vec<DenominationCount>,
    ) -> Result<StoredClosing> {
        self.request(|response| WriterMessage::Save {
            closing,
            products,
            denominations,
            response,
        })
        .await
    }

    /// Mark a closing read-only
    pub async fn close(&self, closing_id: Uuid) -> Result<CashClosing> {
        self.request(|response| WriterMessage::Close {
            closing_id,
            response,
        })
        .await
    }

    /// Delete closings and their rows
    pub async fn delete(&self, filter: ClosingFilter) -> Result<usize> {
        self.request(|response| WriterMessage::Delete { filter, response })
            .await
    }

    /// Shutdown writer
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(WriterMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Writer mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the closing writer
pub fn spawn_closing_writer(
    store: Arc<dyn PersistenceGateway>,
    mailbox_capacity: usize,
) -> ClosingWriterHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let writer = ClosingWriter::new(store, rx);

    tokio::spawn(async move {
        writer.run().await;
    });

    ClosingWriterHandle::new(tx)
}
