//! [`MeasurementGateway`] implementation over the SQLite store.
//!
//! This is the piece the session hands confirmed samples to. It enforces
//! the save-side rules: an authenticated user must be present, a weight
//! sample must actually carry a plausible weight, and storage failures are
//! reported as transient so the session can offer a retry.

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{debug, info};

use balanca_core::{DiscoveredDevice, MeasurementGateway, Receipt, SaveError};
use balanca_types::{MeasurementSample, SampleKind};

use crate::models::{HeartRateRecord, WeightMeasurement};
use crate::store::Store;

/// Persists confirmed samples into the local store.
///
/// The store's `rusqlite` connection is not `Sync`, so it sits behind an
/// async mutex; saves are infrequent enough that serializing them is fine.
pub struct StoreGateway {
    store: tokio::sync::Mutex<Store>,
    user_id: std::sync::Mutex<Option<String>>,
}

impl StoreGateway {
    /// Wrap a store with no user context.
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store: tokio::sync::Mutex::new(store),
            user_id: std::sync::Mutex::new(None),
        }
    }

    /// Wrap a store with an authenticated user.
    #[must_use]
    pub fn with_user(store: Store, user_id: impl Into<String>) -> Self {
        let gateway = Self::new(store);
        gateway.set_user(Some(user_id.into()));
        gateway
    }

    /// Change the authenticated user; `None` signs out.
    pub fn set_user(&self, user_id: Option<String>) {
        *self.user_id.lock().unwrap_or_else(|e| e.into_inner()) = user_id;
    }

    fn current_user(&self) -> Option<String> {
        self.user_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl MeasurementGateway for StoreGateway {
    async fn save(
        &self,
        sample: &MeasurementSample,
        device: &DiscoveredDevice,
    ) -> Result<Receipt, SaveError> {
        let user_id = self.current_user().ok_or(SaveError::Unauthenticated)?;
        let store = self.store.lock().await;

        let (id, table) = match sample.kind() {
            SampleKind::Weight => {
                match sample.weight_kg {
                    Some(weight) if weight > 0.0 => {}
                    _ => {
                        return Err(SaveError::ValidationFailed(
                            "weight sample without a positive weight".to_string(),
                        ));
                    }
                }

                let height_m = store
                    .get_profile(&user_id)
                    .map_err(|e| SaveError::TransientIo(e.to_string()))?
                    .and_then(|profile| profile.height_m);
                if height_m.is_none() {
                    debug!("no profile height for {}, storing without BMI", user_id);
                }

                let record = WeightMeasurement::from_sample(&user_id, sample, device, height_m)
                    .ok_or_else(|| {
                        SaveError::ValidationFailed("sample is not a weight measurement".to_string())
                    })?;
                let id = store
                    .insert_weight(&record)
                    .map_err(|e| SaveError::TransientIo(e.to_string()))?;
                (id, "weight_measurements")
            }
            SampleKind::HeartRate => {
                let record = HeartRateRecord::from_sample(&user_id, sample, device)
                    .ok_or_else(|| {
                        SaveError::ValidationFailed(
                            "sample is not a heart-rate measurement".to_string(),
                        )
                    })?;
                let id = store
                    .insert_heart_rate(&record)
                    .map_err(|e| SaveError::TransientIo(e.to_string()))?;
                (id, "heart_rate_data")
            }
        };

        info!("saved measurement {} into {}", id, table);
        Ok(Receipt {
            id,
            table: table.to_string(),
            saved_at: OffsetDateTime::now_utc(),
        })
    }
}
