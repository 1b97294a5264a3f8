//! Ko-fi payment notifications. Ko-fi posts an urlencoded form whose `data`
//! field is a JSON document; verified payloads are relayed to a fixed Discord
//! channel as an embed. Runs behind a TLS-terminating reverse proxy, so the
//! listener itself is plain HTTP.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Router};
use serde::Deserialize;
use serenity::all::{ChannelId, CreateMessage, Http};
use tracing::{error, info, warn};

use crate::ui::embeds;

#[derive(Deserialize, Debug, Clone)]
pub struct KofiPayload {
    pub verification_token: String,
    pub message_id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub from_name: String,
    pub message: Option<String>,
    pub amount: String,
    pub currency: String,
    pub email: Option<String>,
    pub is_subscription_payment: Option<bool>,
    pub is_first_subscription_payment: Option<bool>,
    pub kofi_transaction_id: String,
    pub tier_name: Option<String>,
    pub discord_username: Option<String>,
    pub discord_userid: Option<String>,
}

#[derive(Deserialize)]
struct KofiForm {
    data: String,
}

#[derive(Clone)]
pub struct WebhookState {
    pub http: Arc<Http>,
    pub channel_id: i64,
    pub verification_token: String,
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/ko-fi", post(handle_kofi)).with_state(state)
}

async fn handle_kofi(
    State(state): State<WebhookState>,
    Form(form): Form<KofiForm>,
) -> StatusCode {
    let payload: KofiPayload = match serde_json::from_str(&form.data) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "rejecting malformed ko-fi payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    if payload.verification_token != state.verification_token {
        warn!(message_id = %payload.message_id, "rejecting ko-fi payload with bad token");
        return StatusCode::UNAUTHORIZED;
    }

    info!(message_id = %payload.message_id, kind = %payload.kind, "ko-fi payment received");
    let message = CreateMessage::new().embed(embeds::kofi_payment(&payload));
    if let Err(err) = ChannelId::new(state.channel_id as u64)
        .send_message(&state.http, message)
        .await
    {
        error!(error = %err, "failed to relay ko-fi payment");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

pub async fn serve(state: WebhookState, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "ko-fi webhook listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_parses_from_kofi_json() {
        let data = r#"{
            "verification_token": "tok",
            "message_id": "m-1",
            "timestamp": "2025-03-01T18:30:00Z",
            "type": "Subscription",
            "from_name": "Jo",
            "message": "keep it up",
            "amount": "3.00",
            "currency": "USD",
            "email": "jo@example.com",
            "is_subscription_payment": true,
            "is_first_subscription_payment": false,
            "kofi_transaction_id": "tx-9",
            "tier_name": "Silver",
            "discord_username": "jo#0",
            "discord_userid": "1234"
        }"#;
        let payload: KofiPayload = serde_json::from_str(data).unwrap();
        assert_eq!(payload.kind, "Subscription");
        assert_eq!(payload.tier_name.as_deref(), Some("Silver"));
        assert_eq!(payload.is_first_subscription_payment, Some(false));
    }

    #[test]
    fn missing_optionals_still_parse() {
        let data = r#"{
            "verification_token": "tok",
            "message_id": "m-2",
            "timestamp": "2025-03-01T18:30:00Z",
            "type": "Donation",
            "from_name": "Anonymous",
            "message": null,
            "amount": "1.00",
            "currency": "EUR",
            "kofi_transaction_id": "tx-10"
        }"#;
        let payload: KofiPayload = serde_json::from_str(data).unwrap();
        assert!(payload.tier_name.is_none());
        assert!(payload.discord_userid.is_none());
    }
}
