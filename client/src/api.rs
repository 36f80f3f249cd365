//! The remote API the sync engine drives.

use async_trait::async_trait;
use ferry_engine::{RemoteError, RequestOptions};
use serde_json::Value;

/// Result of a remote call: the server's response body.
pub type ApiResult = Result<Value, RemoteError>;

/// Booking and trip endpoints.
///
/// Every call receives the [`RequestOptions`] of the operation it performs,
/// so an implementation can forward the idempotency key and overwrite intent.
#[async_trait]
pub trait RemoteApi: Send + Sync + 'static {
    async fn create_booking(&self, booking: &Value, options: &RequestOptions) -> ApiResult;

    async fn create_trip(
        &self,
        trip: &Value,
        booking_ids: &[String],
        options: &RequestOptions,
    ) -> ApiResult;

    async fn update_booking(
        &self,
        booking_id: &str,
        updates: &Value,
        options: &RequestOptions,
    ) -> ApiResult;

    async fn update_booking_status(
        &self,
        booking_id: &str,
        status: &str,
        options: &RequestOptions,
    ) -> ApiResult;

    async fn update_trip_status(
        &self,
        trip_id: &str,
        status: &str,
        options: &RequestOptions,
    ) -> ApiResult;
}
