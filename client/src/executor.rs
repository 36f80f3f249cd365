//! Dispatch of a queued operation to the remote API.

use crate::api::{ApiResult, RemoteApi};
use ferry_engine::{Operation, RemoteCall, RequestOptions};

/// Perform the remote call for an operation.
///
/// Payload problems are reported without touching the network.
pub async fn execute(api: &dyn RemoteApi, op: &Operation) -> ApiResult {
    let call = RemoteCall::from_operation(op)?;
    let options = RequestOptions::for_operation(op);

    match &call {
        RemoteCall::CreateBooking { booking } => api.create_booking(booking, &options).await,
        RemoteCall::CreateTrip { trip, booking_ids } => {
            api.create_trip(trip, booking_ids, &options).await
        }
        RemoteCall::UpdateBooking {
            booking_id,
            updates,
        } => api.update_booking(booking_id, updates, &options).await,
        RemoteCall::UpdateBookingStatus { booking_id, status } => {
            api.update_booking_status(booking_id, status, &options).await
        }
        RemoteCall::UpdateTripStatus { trip_id, status } => {
            api.update_trip_status(trip_id, status, &options).await
        }
    }
}
