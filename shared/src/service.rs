//! Boundary to the external media resolution/download collaborator.
use async_trait::async_trait;

use crate::errors::ServiceError;
use crate::models::{MediaInfo, ProgressSample, TransferJob, TransferOutcome};

/// Callback receiving progress samples, invoked inline with the transfer loop.
pub type ProgressSink<'a> = dyn FnMut(ProgressSample) + Send + 'a;

/// Resolves URLs into metadata and performs transfers.
///
/// Implementations own all network, protocol and format negotiation logic.
/// Callers only see metadata, serialized progress samples and a final path.
#[async_trait]
pub trait MediaService: Send + Sync {
    /// Name of the backend (for logging).
    fn name(&self) -> &'static str;

    /// Resolve metadata only. Must not write anything to disk.
    async fn resolve_metadata(&self, url: &str) -> Result<MediaInfo, ServiceError>;

    /// Download the item described by `job`, calling `sink` for every progress tick.
    async fn transfer(
        &self,
        job: &TransferJob,
        sink: &mut ProgressSink<'_>,
    ) -> Result<TransferOutcome, ServiceError>;
}
