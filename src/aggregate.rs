//! Aggregate event streams: append with optimistic concurrency, load, probe
//! and bulk delete.
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::client::{expect_found, expect_status, Client};
use crate::error::{Error, Result};
use crate::event::Event;

/// The full event history of one aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub aggregate_id: String,
    /// Number of event batches stored so far; 0 for a new aggregate.
    #[serde(default)]
    pub aggregate_version: u64,
    #[serde(default)]
    pub aggregate_type: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreRequest<'a> {
    aggregate_id: &'a str,
    events: &'a [Event],
    #[serde(skip_serializing_if = "is_zero")]
    expected_version: u64,
}

fn is_zero(version: &u64) -> bool {
    *version == 0
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteTokenResponse {
    #[serde(default)]
    delete_token: String,
}

impl Client {
    /// Appends `events` atomically to an aggregate's stream.
    ///
    /// `expected_version` is the version the caller last saw; the store is
    /// rejected if the aggregate has moved on. `0` skips the check.
    ///
    /// # Errors
    ///
    /// - [`Error::Conflict`] if the aggregate is not at `expected_version`
    /// - [`Error::UnexpectedStatus`] for any other non-200 response
    pub async fn store(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        expected_version: u64,
        events: &[Event],
    ) -> Result<()> {
        let url = self.endpoint(&["aggregates", aggregate_type, "events"])?;
        let body = StoreRequest {
            aggregate_id,
            events,
            expected_version,
        };

        let request = Client::with_json(self.request(Method::POST, url), &body)?;
        let response = self.send(request).await?;

        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(
                aggregate_type = %aggregate_type,
                aggregate_id = %aggregate_id,
                expected_version = expected_version,
                "Store rejected: version conflict"
            );
            return Err(Error::Conflict {
                aggregate_type: aggregate_type.to_string(),
                aggregate_id: aggregate_id.to_string(),
                expected_version,
            });
        }
        expect_status(&response, StatusCode::OK)?;

        tracing::debug!(
            aggregate_type = %aggregate_type,
            aggregate_id = %aggregate_id,
            events = events.len(),
            "Stored events"
        );
        Ok(())
    }

    /// Loads every event stored for an aggregate, oldest first.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no events exist for `aggregate_id`.
    pub async fn load_aggregate(&self, aggregate_type: &str, aggregate_id: &str) -> Result<Aggregate> {
        let url = self.endpoint(&["aggregates", aggregate_type, aggregate_id])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        expect_found(&response, StatusCode::OK, || {
            format!("aggregate {aggregate_type}/{aggregate_id}")
        })?;
        self.read_json(response).await
    }

    /// Checks whether any events exist for an aggregate.
    ///
    /// A missing aggregate is a valid `false`, not an error.
    pub async fn aggregate_exists(&self, aggregate_type: &str, aggregate_id: &str) -> Result<bool> {
        let url = self.endpoint(&["aggregates", aggregate_type, aggregate_id])?;
        let response = self.send(self.request(Method::HEAD, url)).await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(Error::UnexpectedStatus(other.as_u16())),
        }
    }

    /// First step of deleting every aggregate of a type: returns the token
    /// that [`delete_aggregate_type`](Self::delete_aggregate_type) requires.
    pub async fn request_delete_aggregate_type(&self, aggregate_type: &str) -> Result<String> {
        let url = self.endpoint(&["aggregates", aggregate_type])?;
        let response = self.send(self.request(Method::DELETE, url)).await?;
        expect_status(&response, StatusCode::OK)?;

        let body: DeleteTokenResponse = self.read_json(response).await?;
        Ok(body.delete_token)
    }

    /// Permanently deletes every aggregate of a type.
    pub async fn delete_aggregate_type(&self, aggregate_type: &str, delete_token: &str) -> Result<()> {
        let mut url = self.endpoint(&["aggregates", aggregate_type])?;
        url.query_pairs_mut().append_pair("deleteToken", delete_token);

        let response = self.send(self.request(Method::DELETE, url)).await?;
        expect_status(&response, StatusCode::NO_CONTENT)?;

        tracing::info!(aggregate_type = %aggregate_type, "Deleted all aggregates of type");
        Ok(())
    }
}
