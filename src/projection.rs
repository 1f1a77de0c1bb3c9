//! Projections: server-side read models built from feeds.
//!
//! A [`ProjectionDefinition`] says which feed to follow and which functions
//! to apply per event type. The server materializes one projection per
//! aggregate ("single") or one across all aggregates ("aggregated").
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{expect_found, expect_status, Client};
use crate::error::Result;

/// A materialized projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub projection_id: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionDefinition {
    pub projection_name: String,
    pub feed_name: String,
    #[serde(default)]
    pub handlers: Vec<EventHandler>,
}

/// Functions applied to a projection when an event of `event_type` arrives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHandler {
    pub event_type: String,
    #[serde(default)]
    pub functions: Vec<Function>,
}

/// One projection function, e.g. `set`, `inc` or `push`, with JSONPath
/// selectors and filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<Value>,
}

#[derive(Default, Deserialize)]
struct DefinitionList {
    #[serde(default)]
    definitions: Vec<ProjectionDefinition>,
}

#[derive(Default, Deserialize)]
struct ProjectionList {
    #[serde(default)]
    projections: Vec<Projection>,
}

impl Client {
    pub async fn projection_definitions(&self) -> Result<Vec<ProjectionDefinition>> {
        let url = self.endpoint(&["projections", "definitions"])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        expect_status(&response, StatusCode::OK)?;

        let list: DefinitionList = self.read_json(response).await?;
        Ok(list.definitions)
    }

    pub async fn projection_definition(&self, name: &str) -> Result<ProjectionDefinition> {
        let url = self.endpoint(&["projections", "definitions", name])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        expect_found(&response, StatusCode::OK, || {
            format!("projection definition '{name}'")
        })?;
        self.read_json(response).await
    }

    pub async fn create_projection_definition(&self, definition: &ProjectionDefinition) -> Result<()> {
        let url = self.endpoint(&["projections", "definitions"])?;
        let request = Client::with_json(self.request(Method::POST, url), definition)?;
        let response = self.send(request).await?;
        expect_status(&response, StatusCode::OK)?;

        tracing::info!(name = %definition.projection_name, feed = %definition.feed_name, "Created projection definition");
        Ok(())
    }

    pub async fn delete_projection_definition(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&["projections", "definitions", name])?;
        let response = self.send(self.request(Method::DELETE, url)).await?;
        expect_found(&response, StatusCode::OK, || {
            format!("projection definition '{name}'")
        })?;

        tracing::info!(name = %name, "Deleted projection definition");
        Ok(())
    }

    /// The projection `name` materialized for one aggregate.
    pub async fn single_projection(&self, name: &str, aggregate_id: &str) -> Result<Projection> {
        let url = self.endpoint(&["projections", "single", name, aggregate_id])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        expect_found(&response, StatusCode::OK, || {
            format!("projection {name}/{aggregate_id}")
        })?;
        self.read_json(response).await
    }

    /// Every per-aggregate projection of definition `name`.
    pub async fn single_projections(&self, name: &str) -> Result<Vec<Projection>> {
        let url = self.endpoint(&["projections", "single", name])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        expect_found(&response, StatusCode::OK, || format!("projection '{name}'"))?;

        let list: ProjectionList = self.read_json(response).await?;
        Ok(list.projections)
    }

    pub async fn aggregated_projection(&self, name: &str) -> Result<Projection> {
        let url = self.endpoint(&["projections", "aggregated", name])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        expect_found(&response, StatusCode::OK, || {
            format!("aggregated projection '{name}'")
        })?;
        self.read_json(response).await
    }

    pub async fn aggregated_projections(&self) -> Result<Vec<Projection>> {
        let url = self.endpoint(&["projections", "aggregated"])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        expect_status(&response, StatusCode::OK)?;

        let list: ProjectionList = self.read_json(response).await?;
        Ok(list.projections)
    }
}
