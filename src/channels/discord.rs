//! Discord channel — slash-command surface for credential issuance.
//!
//! ## Architecture
//! - **Incoming**: persistent Gateway WebSocket (Hello → Identify →
//!   heartbeat → dispatch), reconnecting with backoff on disconnect
//! - **Outgoing**: REST API calls with `Bot` token authentication
//!
//! Two global slash commands are registered on READY:
//! - `/generate` — any caller; issues a random credential pair, delivers
//!   it via DM, and acknowledges ephemerally in the invocation context
//! - `/register <username> <password>` — requires the configured
//!   authorized role; stores caller-supplied credentials
//!
//! Every command invocation sweeps expired auto-generated credentials
//! (inside the store operation) before touching the map — this is the
//! only path that evicts.
//!
//! A failed DM (user blocks server DMs, Discord error 50007) is reported
//! as a distinct condition; the stored credential is NOT rolled back and
//! stays valid even though it was never delivered.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::traits::{Channel, SendMessage};
use crate::store::{CredentialStore, IssuedCredential, RegisteredCredential};

/// Discord REST API base URL.
const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Discord Gateway WebSocket URL.
const DISCORD_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Gateway intents: GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES.
const GATEWAY_INTENTS: u64 = 1 | (1 << 9) | (1 << 12);

/// Message flag for ephemeral interaction replies.
const EPHEMERAL: u64 = 64;

/// Discord API error code: cannot send messages to this user.
const CANNOT_MESSAGE_USER: u64 = 50_007;

/// Delay between gateway reconnection attempts.
const RECONNECT_DELAY_SECS: u64 = 5;

const MSG_DM_SENT: &str = "✅ Credentials have been sent to your DMs!";
const MSG_DM_CLOSED: &str =
    "❌ Could not send credentials. Please enable DMs from server members!";
const MSG_GENERATE_FAILED: &str = "❌ An error occurred while generating credentials.";
const MSG_REGISTER_FAILED: &str = "❌ An error occurred while registering credentials.";
const MSG_NO_PERMISSION: &str = "❌ You do not have permission to use this command.";

/// Why a private delivery failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The recipient does not accept DMs from this server (code 50007).
    #[error("recipient cannot receive direct messages")]
    DmsClosed,
    #[error("Discord API error: {0}")]
    Api(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// A parsed application-command interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashCommand {
    /// Interaction ID (for the callback URL).
    pub id: String,
    /// Interaction token (for the callback URL).
    pub token: String,
    /// Command name ("generate" or "register").
    pub name: String,
    /// Discord user ID of the invoker.
    pub invoker_id: String,
    /// Role IDs held by the invoker (empty when invoked from a DM).
    pub invoker_roles: Vec<String>,
    /// String options by name.
    pub options: HashMap<String, String>,
}

/// Discord slash-command channel.
pub struct DiscordChannel {
    token: String,
    authorized_role_id: String,
    store: Arc<CredentialStore>,
    client: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(token: String, authorized_role_id: String, store: Arc<CredentialStore>) -> Self {
        Self {
            token,
            authorized_role_id,
            store,
            client: reqwest::Client::new(),
        }
    }

    /// Check if an invoker may use `/register`.
    pub fn is_authorized_registrar(&self, command: &SlashCommand) -> bool {
        command
            .invoker_roles
            .iter()
            .any(|role| role == &self.authorized_role_id)
    }

    // ── Gateway loop ─────────────────────────────────────────────────

    /// Run one gateway session. Returns when the connection drops or the
    /// server requests a reconnect.
    async fn run_session(&self) -> anyhow::Result<()> {
        let (ws, _) = connect_async(DISCORD_GATEWAY_URL).await?;
        let (mut write, mut read) = ws.split();

        // Hello frame carries the heartbeat interval.
        let heartbeat_interval_ms = loop {
            let Some(frame) = read.next().await else {
                anyhow::bail!("Gateway closed before Hello");
            };
            if let Message::Text(text) = frame? {
                let payload: Value = serde_json::from_str(text.as_str())?;
                if payload["op"].as_u64() == Some(10) {
                    break payload["d"]["heartbeat_interval"]
                        .as_u64()
                        .unwrap_or(41_250);
                }
            }
        };

        let identify = json!({
            "op": 2,
            "d": {
                "token": self.token,
                "intents": GATEWAY_INTENTS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "passforge",
                    "device": "passforge",
                },
            },
        });
        write.send(Message::Text(identify.to_string().into())).await?;

        let mut heartbeat = tokio::time::interval(Duration::from_millis(heartbeat_interval_ms));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seq: Option<u64> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let beat = json!({"op": 1, "d": last_seq});
                    write.send(Message::Text(beat.to_string().into())).await?;
                }
                frame = read.next() => {
                    let Some(frame) = frame else {
                        anyhow::bail!("Gateway connection closed");
                    };
                    match frame? {
                        Message::Text(text) => {
                            let payload: Value = serde_json::from_str(text.as_str())?;
                            if let Some(seq) = payload["s"].as_u64() {
                                last_seq = Some(seq);
                            }
                            match payload["op"].as_u64() {
                                // Dispatch
                                Some(0) => self.handle_dispatch(&payload).await,
                                // Server requests an immediate heartbeat
                                Some(1) => {
                                    let beat = json!({"op": 1, "d": last_seq});
                                    write.send(Message::Text(beat.to_string().into())).await?;
                                }
                                // Reconnect / invalid session
                                Some(7) | Some(9) => {
                                    anyhow::bail!("Gateway requested reconnect");
                                }
                                // Heartbeat ACK
                                Some(11) => {}
                                _ => {}
                            }
                        }
                        Message::Ping(data) => write.send(Message::Pong(data)).await?,
                        Message::Close(_) => anyhow::bail!("Gateway sent close frame"),
                        _ => {}
                    }
                }
            }
        }
    }

    /// Handle an op-0 dispatch event.
    async fn handle_dispatch(&self, payload: &Value) {
        match payload["t"].as_str() {
            Some("READY") => {
                let application_id = payload["d"]["application"]["id"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                tracing::info!("🤖 Discord bot is ready");
                if let Err(e) = self.register_commands(&application_id).await {
                    tracing::error!("Failed to register slash commands: {e}");
                } else {
                    tracing::info!("Slash commands registered");
                }
            }
            Some("INTERACTION_CREATE") => {
                let Some(command) = parse_interaction(&payload["d"]) else {
                    return;
                };
                if let Err(e) = self.handle_command(&command).await {
                    tracing::error!(command = %command.name, "Command handling failed: {e}");
                }
            }
            _ => {}
        }
    }

    // ── Command handling ─────────────────────────────────────────────

    async fn handle_command(&self, command: &SlashCommand) -> anyhow::Result<()> {
        match command.name.as_str() {
            "generate" => self.handle_generate(command).await,
            "register" => self.handle_register(command).await,
            other => {
                tracing::warn!("Ignoring unknown slash command: {other}");
                Ok(())
            }
        }
    }

    /// `/generate` — issue a random credential pair and DM it to the invoker.
    async fn handle_generate(&self, command: &SlashCommand) -> anyhow::Result<()> {
        let issued = self.store.generate();

        // Delivery failure does not roll back the insertion: the
        // credential is already live even if the invoker never sees it.
        match self.deliver_credentials(&command.invoker_id, &issued).await {
            Ok(()) => {
                self.reply_content(command, MSG_DM_SENT).await
            }
            Err(DeliveryError::DmsClosed) => {
                tracing::warn!(user = %command.invoker_id, "Credential DM rejected — DMs closed");
                self.reply_content(command, MSG_DM_CLOSED).await
            }
            Err(e) => {
                tracing::error!("Credential delivery failed: {e}");
                self.reply_content(command, MSG_GENERATE_FAILED).await
            }
        }
    }

    /// `/register` — store caller-supplied credentials (authorized role only).
    async fn handle_register(&self, command: &SlashCommand) -> anyhow::Result<()> {
        if !self.is_authorized_registrar(command) {
            tracing::warn!(user = %command.invoker_id, "Unauthorized /register attempt");
            return self.reply_content(command, MSG_NO_PERMISSION).await;
        }

        let (Some(username), Some(password)) =
            (command.options.get("username"), command.options.get("password"))
        else {
            tracing::error!("/register invoked without required options");
            return self.reply_content(command, MSG_REGISTER_FAILED).await;
        };

        let registered = self.store.register(username, password);
        self.reply_embed(command, registered_embed(&registered)).await
    }

    // ── REST helpers ─────────────────────────────────────────────────

    /// Register the two global slash commands.
    async fn register_commands(&self, application_id: &str) -> anyhow::Result<()> {
        for definition in command_definitions() {
            let resp = self
                .client
                .post(format!(
                    "{DISCORD_API_BASE}/applications/{application_id}/commands"
                ))
                .header("Authorization", format!("Bot {}", self.token))
                .json(&definition)
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Command registration failed: {status} — {body}");
            }
        }
        Ok(())
    }

    /// DM the generated credentials to the invoker as an embed.
    async fn deliver_credentials(
        &self,
        user_id: &str,
        issued: &IssuedCredential,
    ) -> Result<(), DeliveryError> {
        let channel_id = self.create_dm_channel(user_id).await?;
        self.post_dm(&channel_id, json!({"embeds": [credentials_embed(issued)]}))
            .await
    }

    /// Open (or reuse) the DM channel with a user. Returns the channel ID.
    async fn create_dm_channel(&self, user_id: &str) -> Result<String, DeliveryError> {
        let resp = self
            .client
            .post(format!("{DISCORD_API_BASE}/users/@me/channels"))
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({"recipient_id": user_id}))
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_delivery_failure(&body));
        }

        let channel: Value = resp.json().await?;
        channel["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DeliveryError::Api("DM channel response had no id".into()))
    }

    async fn post_dm(&self, channel_id: &str, body: Value) -> Result<(), DeliveryError> {
        let resp = self
            .client
            .post(format!("{DISCORD_API_BASE}/channels/{channel_id}/messages"))
            .header("Authorization", format!("Bot {}", self.token))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_delivery_failure(&body));
        }
        Ok(())
    }

    /// Ephemeral text reply to an interaction.
    async fn reply_content(&self, command: &SlashCommand, content: &str) -> anyhow::Result<()> {
        self.interaction_callback(command, json!({"content": content, "flags": EPHEMERAL}))
            .await
    }

    /// Ephemeral embed reply to an interaction.
    async fn reply_embed(&self, command: &SlashCommand, embed: Value) -> anyhow::Result<()> {
        self.interaction_callback(command, json!({"embeds": [embed], "flags": EPHEMERAL}))
            .await
    }

    async fn interaction_callback(
        &self,
        command: &SlashCommand,
        data: Value,
    ) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!(
                "{DISCORD_API_BASE}/interactions/{}/{}/callback",
                command.id, command.token
            ))
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({"type": 4, "data": data}))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Interaction callback failed: {status} — {body}");
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, message: &SendMessage) -> anyhow::Result<()> {
        let channel_id = self
            .create_dm_channel(&message.recipient)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        self.post_dm(&channel_id, json!({"content": message.content}))
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(())
    }

    async fn listen(&self) -> anyhow::Result<()> {
        loop {
            if let Err(e) = self.run_session().await {
                tracing::warn!("Discord gateway session ended: {e} — reconnecting");
            }
            tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
        }
    }

    async fn health_check(&self) -> bool {
        let resp = self
            .client
            .get(format!("{DISCORD_API_BASE}/users/@me"))
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await;

        match resp {
            Ok(r) => r.status().is_success(),
            Err(_) => false,
        }
    }
}

// ── Pure helpers ─────────────────────────────────────────────────────

/// Parse an INTERACTION_CREATE payload into a slash command.
///
/// Returns `None` for anything that is not an application command
/// (type 2) or that lacks the fields we need.
pub fn parse_interaction(data: &Value) -> Option<SlashCommand> {
    if data["type"].as_u64() != Some(2) {
        return None;
    }

    let id = data["id"].as_str()?.to_string();
    let token = data["token"].as_str()?.to_string();
    let name = data["data"]["name"].as_str()?.to_string();

    // Guild invocations carry `member.user`; DM invocations carry `user`.
    let invoker_id = data["member"]["user"]["id"]
        .as_str()
        .or_else(|| data["user"]["id"].as_str())?
        .to_string();

    let invoker_roles = data["member"]["roles"]
        .as_array()
        .map(|roles| {
            roles
                .iter()
                .filter_map(|r| r.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let options = data["data"]["options"]
        .as_array()
        .map(|opts| {
            opts.iter()
                .filter_map(|opt| {
                    let key = opt["name"].as_str()?.to_string();
                    let value = opt["value"].as_str()?.to_string();
                    Some((key, value))
                })
                .collect()
        })
        .unwrap_or_default();

    Some(SlashCommand {
        id,
        token,
        name,
        invoker_id,
        invoker_roles,
        options,
    })
}

/// Global slash-command definitions registered on READY.
pub fn command_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "generate",
            "description": "Generate login credentials",
        }),
        json!({
            "name": "register",
            "description": "Register custom credentials (Authorized role only)",
            "options": [
                {
                    "name": "username",
                    "description": "The username to register",
                    "type": 3,
                    "required": true,
                },
                {
                    "name": "password",
                    "description": "The password to register",
                    "type": 3,
                    "required": true,
                },
            ],
        }),
    ]
}

/// Embed DMed to the invoker after `/generate`. Contains the plaintext
/// password — this is the single time it leaves the process.
pub fn credentials_embed(issued: &IssuedCredential) -> Value {
    json!({
        "title": "Your Login Credentials",
        "description": "These credentials will expire in 12 hours.",
        "color": 0x00ff00,
        "fields": [
            {"name": "Username", "value": format!("```{}```", issued.username), "inline": false},
            {"name": "Password", "value": format!("```{}```", issued.password), "inline": false},
            {"name": "Expiry", "value": format!("<t:{}:R>", issued.expires_at), "inline": false},
        ],
        "footer": {"text": "Keep these credentials private!"},
    })
}

/// Ephemeral embed shown after `/register`. Never echoes the password.
pub fn registered_embed(registered: &RegisteredCredential) -> Value {
    json!({
        "title": "Custom Credentials Registered",
        "description": "These credentials will expire in 12 hours.",
        "color": 0x0099ff,
        "fields": [
            {"name": "Username", "value": format!("```{}```", registered.username), "inline": false},
            {"name": "Expiry", "value": format!("<t:{}:R>", registered.expires_at), "inline": false},
        ],
        "footer": {"text": "Credentials registered successfully"},
    })
}

/// Map a Discord API error body to a delivery failure.
pub fn classify_delivery_failure(body: &str) -> DeliveryError {
    let code = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["code"].as_u64());
    if code == Some(CANNOT_MESSAGE_USER) {
        DeliveryError::DmsClosed
    } else {
        DeliveryError::Api(body.to_string())
    }
}
