//! Scripted RemoteApi for scheduler tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ferry_client::{ApiResult, RemoteApi};
use ferry_engine::{RemoteError, RequestOptions};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One call seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: &'static str,
    pub target: Option<String>,
    pub body: Value,
    pub options: RequestOptions,
}

/// Replies with scripted results, then with the fallback.
pub struct MockApi {
    script: Mutex<VecDeque<ApiResult>>,
    fallback: ApiResult,
    latency: Duration,
    calls: Mutex<Vec<Call>>,
}

impl MockApi {
    pub fn ok() -> Self {
        Self::always(Ok(json!({"ok": true})))
    }

    pub fn always(result: ApiResult) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: result,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, result: ApiResult) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn reply(
        &self,
        name: &'static str,
        target: Option<&str>,
        body: Value,
        options: &RequestOptions,
    ) -> ApiResult {
        self.calls.lock().unwrap().push(Call {
            name,
            target: target.map(str::to_string),
            body,
            options: options.clone(),
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn create_booking(&self, booking: &Value, options: &RequestOptions) -> ApiResult {
        self.reply("create_booking", None, booking.clone(), options)
            .await
    }

    async fn create_trip(
        &self,
        trip: &Value,
        booking_ids: &[String],
        options: &RequestOptions,
    ) -> ApiResult {
        let body = json!({"trip": trip, "bookingIds": booking_ids});
        self.reply("create_trip", None, body, options).await
    }

    async fn update_booking(
        &self,
        booking_id: &str,
        updates: &Value,
        options: &RequestOptions,
    ) -> ApiResult {
        self.reply("update_booking", Some(booking_id), updates.clone(), options)
            .await
    }

    async fn update_booking_status(
        &self,
        booking_id: &str,
        status: &str,
        options: &RequestOptions,
    ) -> ApiResult {
        let body = json!({"status": status});
        self.reply("update_booking_status", Some(booking_id), body, options)
            .await
    }

    async fn update_trip_status(
        &self,
        trip_id: &str,
        status: &str,
        options: &RequestOptions,
    ) -> ApiResult {
        let body = json!({"status": status});
        self.reply("update_trip_status", Some(trip_id), body, options)
            .await
    }
}

pub fn timeout() -> RemoteError {
    RemoteError::Timeout("request timed out".into())
}

pub fn version_conflict(server_version: u64) -> RemoteError {
    RemoteError::Conflict {
        message: "version mismatch".into(),
        server_version: Some(server_version),
        server_data: Some(json!({"id": "B1", "version": server_version, "status": "loaded"})),
    }
}
