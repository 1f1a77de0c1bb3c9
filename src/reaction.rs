//! Reactions: server-side triggers that call out when an event shows up on a
//! feed.
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{expect_found, expect_status, Client};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionDefinition {
    pub reaction_name: String,
    pub feed_name: String,
    pub react_on_event_type: String,
    /// Event types that cancel a scheduled reaction for the same aggregate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cancel_on_event_types: Vec<String>,
    /// Event data field holding the time the reaction should fire at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_time_field: Option<String>,
    /// ISO-8601 duration added to the trigger time, e.g. `PT1H`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    pub action: Action,
}

/// What a reaction does when it fires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// `HTTP_POST`, `SLACK_POST`, ...
    pub action_type: String,
    pub target_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Default, Deserialize)]
struct DefinitionList {
    #[serde(default)]
    definitions: Vec<ReactionDefinition>,
}

impl Client {
    pub async fn reaction_definitions(&self) -> Result<Vec<ReactionDefinition>> {
        let url = self.endpoint(&["reactions", "definitions"])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        expect_status(&response, StatusCode::OK)?;

        let list: DefinitionList = self.read_json(response).await?;
        Ok(list.definitions)
    }

    pub async fn reaction_definition(&self, name: &str) -> Result<ReactionDefinition> {
        let url = self.endpoint(&["reactions", "definitions", name])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        expect_found(&response, StatusCode::OK, || {
            format!("reaction definition '{name}'")
        })?;
        self.read_json(response).await
    }

    pub async fn create_reaction_definition(&self, definition: &ReactionDefinition) -> Result<()> {
        let url = self.endpoint(&["reactions", "definitions"])?;
        let request = Client::with_json(self.request(Method::POST, url), definition)?;
        let response = self.send(request).await?;
        expect_status(&response, StatusCode::CREATED)?;

        tracing::info!(
            name = %definition.reaction_name,
            feed = %definition.feed_name,
            event_type = %definition.react_on_event_type,
            "Created reaction definition"
        );
        Ok(())
    }

    pub async fn delete_reaction_definition(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&["reactions", "definitions", name])?;
        let response = self.send(self.request(Method::DELETE, url)).await?;
        expect_found(&response, StatusCode::OK, || {
            format!("reaction definition '{name}'")
        })?;

        tracing::info!(name = %name, "Deleted reaction definition");
        Ok(())
    }
}
