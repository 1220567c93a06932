//! # Chats
//!
//! Resolving the per-chat shared key and decrypting chat previews.
//!
//! ```text
//! Chat { participants: [me, them], lastMessage }
//!            │
//!            ▼
//!   find participant with id != self_id ──none──► ParticipantNotFound
//!            │
//!            ▼
//!   derive_key(them.publicKey, my_private) ──► shared key
//!            │
//!            ▼
//!   open_message(lastMessage, shared key) ──► DecryptedChat
//! ```
//!
//! [`ChatCodec::decrypt_chats`] runs one blocking task per chat, at most
//! `max_concurrency` at a time, or decrypts inline when no tokio runtime is
//! running. Output order matches input order and the first failure fails
//! the whole batch.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use super::{ChatCodec, ChatMessage, DecryptedChatMessage};
use crate::crypto::{EcdhPrivateKey, EcdhPublicKey, Jwk, SymmetricKey};
use crate::error::{Error, Result};

/// A chat member and their published key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParticipant {
    /// User ID
    pub id: String,
    /// Display name
    pub username: String,
    /// P-521 public key as published to the identity service
    pub public_key: Jwk,
}

/// A chat as returned by the chat service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Chat ID
    pub id: String,
    /// Both members of the chat
    pub participants: Vec<ChatParticipant>,
    /// Most recent message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<ChatMessage>,
}

impl Chat {
    /// The first participant that is not `self_id`
    pub fn counterparty(&self, self_id: &str) -> Option<&ChatParticipant> {
        self.participants.iter().find(|p| p.id != self_id)
    }
}

/// A chat with its shared key resolved and its last message decrypted
#[derive(Debug, Clone)]
pub struct DecryptedChat {
    /// The chat as received
    pub chat: Chat,
    /// Key shared with the counterparty
    pub shared_key: SymmetricKey,
    /// Decrypted last message
    pub last_message: Option<DecryptedChatMessage>,
}

impl DecryptedChat {
    /// The other member of the chat
    pub fn counterparty(&self, self_id: &str) -> Option<&ChatParticipant> {
        self.chat.counterparty(self_id)
    }
}

impl ChatCodec {
    /// Derive the shared key for `chat` and decrypt its last message
    pub fn decrypt_chat(
        &self,
        chat: Chat,
        self_id: &str,
        my_private: &EcdhPrivateKey,
    ) -> Result<DecryptedChat> {
        let counterparty = chat
            .counterparty(self_id)
            .ok_or_else(|| Error::ParticipantNotFound(chat.id.clone()))?;

        let their_public = EcdhPublicKey::from_jwk(&counterparty.public_key)?;
        let shared_key = self.agreement.derive_key(&their_public, my_private)?;

        let last_message = chat
            .last_message
            .as_ref()
            .map(|message| self.open_message(message, &shared_key))
            .transpose()?;

        Ok(DecryptedChat {
            chat,
            shared_key,
            last_message,
        })
    }

    /// Decrypt many chats on the blocking pool
    ///
    /// At most `max_concurrency` chats are in flight. The result is in input
    /// order; any failure fails the whole call. Outside a tokio runtime the
    /// chats are decrypted one after another on the calling thread.
    pub async fn decrypt_chats(
        &self,
        chats: Vec<Chat>,
        self_id: &str,
        my_private: &EcdhPrivateKey,
        max_concurrency: usize,
    ) -> Result<Vec<DecryptedChat>> {
        let count = chats.len();

        if tokio::runtime::Handle::try_current().is_err() {
            tracing::debug!(count, "No tokio runtime, decrypting chats inline");
            let decrypted = chats
                .into_iter()
                .map(|chat| self.decrypt_chat(chat, self_id, my_private))
                .collect::<Result<Vec<_>>>()?;
            tracing::info!(count, "Decrypted chats");
            return Ok(decrypted);
        }

        let self_id: Arc<str> = Arc::from(self_id);

        let decrypted: Vec<DecryptedChat> = stream::iter(chats.into_iter().map(|chat| {
            let codec = self.clone();
            let self_id = Arc::clone(&self_id);
            let my_private = my_private.clone();
            async move {
                tokio::task::spawn_blocking(move || codec.decrypt_chat(chat, &self_id, &my_private))
                    .await
                    .map_err(|e| Error::Internal(format!("Chat decryption task failed: {}", e)))?
            }
        }))
        .buffered(max_concurrency.max(1))
        .try_collect()
        .await?;

        tracing::info!(count, "Decrypted chats");
        Ok(decrypted)
    }
}

// ============================================================================
// TESTS
// ============================================================================
