//! Client for placing outbound calls through the ElevenLabs conversational agent.

use serde::{Deserialize, Serialize};
use shared::{AgentOverride, ConversationConfigOverride};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::config::VoiceConfig;

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Voice service error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Call was not placed: {0}")]
    Rejected(String),
}

/// An outbound call: who to ring and what the agent opens with
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCall {
    pub to_number: String,
    pub first_message: String,
    pub dynamic_variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutboundCallResult {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub conversation_id: Option<String>,
    #[serde(rename = "callSid")]
    pub call_sid: Option<String>,
}

#[derive(Serialize)]
struct OutboundCallBody<'a> {
    agent_id: &'a str,
    agent_phone_number_id: &'a str,
    to_number: &'a str,
    conversation_initiation_client_data: ClientData<'a>,
}

#[derive(Serialize)]
struct ClientData<'a> {
    dynamic_variables: &'a BTreeMap<String, String>,
    conversation_config_override: ConversationConfigOverride,
}

#[derive(Clone)]
pub struct VoiceClient {
    http: reqwest::Client,
    api_key: String,
    agent_id: String,
    phone_number_id: String,
    base_url: String,
}

impl VoiceClient {
    pub fn new(config: &VoiceConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            agent_id: config.agent_id.clone(),
            phone_number_id: config.phone_number_id.clone(),
            base_url: config.base_url.clone(),
        }
    }

    #[instrument(skip(self, call), fields(to = %call.to_number))]
    pub async fn place_call(&self, call: &OutboundCall) -> Result<OutboundCallResult, VoiceError> {
        let body = OutboundCallBody {
            agent_id: &self.agent_id,
            agent_phone_number_id: &self.phone_number_id,
            to_number: &call.to_number,
            conversation_initiation_client_data: ClientData {
                dynamic_variables: &call.dynamic_variables,
                conversation_config_override: ConversationConfigOverride {
                    agent: AgentOverride {
                        first_message: call.first_message.clone(),
                    },
                },
            },
        };

        debug!("Placing outbound call");

        let response = self
            .http
            .post(format!("{}/v1/convai/twilio/outbound-call", self.base_url))
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoiceError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let result: OutboundCallResult = response.json().await?;
        if !result.success {
            return Err(VoiceError::Rejected(result.message));
        }

        debug!(conversation_id = ?result.conversation_id, "Outbound call placed");
        Ok(result)
    }
}
