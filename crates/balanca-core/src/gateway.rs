//! Persistence contract for confirmed measurements.
//!
//! The session does not know where measurements go; it hands the confirmed
//! sample plus device provenance to a [`MeasurementGateway`] and reacts to
//! the structured [`SaveError`](crate::SaveError) reasons on failure.

use async_trait::async_trait;
use time::OffsetDateTime;

use balanca_types::MeasurementSample;

use crate::error::SaveError;
use crate::transport::DiscoveredDevice;

/// Proof that a measurement was appended to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Row id of the stored record.
    pub id: i64,
    /// The table the record landed in.
    pub table: String,
    /// When the record was written.
    pub saved_at: OffsetDateTime,
}

/// Sink for confirmed measurement samples.
///
/// A successful `save` appends exactly one record. Duplicate suppression is
/// the session's single-flight concern; implementations must not dedup.
#[async_trait]
pub trait MeasurementGateway: Send + Sync {
    /// Persist a confirmed sample with its device provenance.
    async fn save(
        &self,
        sample: &MeasurementSample,
        device: &DiscoveredDevice,
    ) -> Result<Receipt, SaveError>;
}

#[async_trait]
impl<G: MeasurementGateway + ?Sized> MeasurementGateway for std::sync::Arc<G> {
    async fn save(
        &self,
        sample: &MeasurementSample,
        device: &DiscoveredDevice,
    ) -> Result<Receipt, SaveError> {
        (**self).save(sample, device).await
    }
}
