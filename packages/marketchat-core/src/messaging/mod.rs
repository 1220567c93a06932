//! # Messaging Module
//!
//! End-to-end encrypted chat payloads between two marketplace users.
//!
//! ## Message Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE ENCRYPTION                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender (Alice)                                                        │
//! │  ─────────────────────────────────────────────────────────────         │
//! │                                                                         │
//! │  Input: ChatContent::Text("hello world")                               │
//! │                                                                         │
//! │  1. Get shared key                                                     │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  ECDH(alice_p521_private, bob_p521_public) → AES-256 key    │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  2. Build the plaintext envelope                                       │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  { "data": "hello world",                                   │       │
//! │  │    "type": "Text",                                          │       │
//! │  │    "nonce": hex(16 random bytes) }                          │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  3. Encrypt                                                            │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  AES-256-GCM(key = shared, iv = random_16_bytes, envelope)  │       │
//! │  │  Attachments: filename sealed under the same (key, iv)      │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Output: EncryptedChatMessage                                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Protocol
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      STORED MESSAGE FORMAT                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ChatMessage (JSON)                                                    │
//! │  {                                                                      │
//! │    "id": "...",                     // Message ID                       │
//! │    "chatId": "...",                 // Chat the message belongs to      │
//! │    "sender": "...",                 // Sender user ID                   │
//! │    "sentAt": "2024-...Z",           // RFC 3339                         │
//! │    "type": "Text",                  // Text | Attachment | MarketListing│
//! │    "content": "base64...",          // Encrypted envelope               │
//! │    "contentFilename": "base64...",  // Attachments only                 │
//! │    "e2e": { "iv": "base64..." }     // 16-byte IV                       │
//! │  }                                                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reusing the IV for the attachment filename is part of the stored format.
//! Changing it needs a new format version.

mod chat;
mod history;

pub use chat::{Chat, ChatParticipant, DecryptedChat};
pub use history::{Page, PageMeta};

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{CryptoProvider, KeyAgreement, SymmetricCipher, SymmetricKey};
use crate::error::{Error, Result};

/// Size of the random envelope nonce in bytes
pub const ENVELOPE_NONCE_SIZE: usize = 16;

/// Kind of chat payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatMessageType {
    /// Plain text
    Text,
    /// File bytes with an optional filename
    Attachment,
    /// Reference to a marketplace listing
    MarketListing,
}

impl fmt::Display for ChatMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatMessageType::Text => write!(f, "Text"),
            ChatMessageType::Attachment => write!(f, "Attachment"),
            ChatMessageType::MarketListing => write!(f, "MarketListing"),
        }
    }
}

/// The JSON plaintext that gets encrypted as a message's `content`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Text, listing id, or base64 file bytes
    pub data: String,
    /// Declared payload type
    #[serde(rename = "type")]
    pub message_type: ChatMessageType,
    /// Hex-encoded random nonce
    pub nonce: String,
}

/// Plaintext chat content
#[derive(Clone, PartialEq, Eq)]
pub enum ChatContent {
    /// A text message
    Text(String),
    /// A marketplace listing id
    MarketListing(String),
    /// A file attachment
    Attachment {
        /// File contents
        bytes: Vec<u8>,
        /// Original filename, if any
        filename: Option<String>,
    },
}

impl ChatContent {
    /// Wire type of this content
    pub fn message_type(&self) -> ChatMessageType {
        match self {
            ChatContent::Text(_) => ChatMessageType::Text,
            ChatContent::MarketListing(_) => ChatMessageType::MarketListing,
            ChatContent::Attachment { .. } => ChatMessageType::Attachment,
        }
    }

    fn envelope_data(&self) -> String {
        match self {
            ChatContent::Text(text) => text.clone(),
            ChatContent::MarketListing(listing_id) => listing_id.clone(),
            ChatContent::Attachment { bytes, .. } => BASE64.encode(bytes),
        }
    }
}

impl fmt::Debug for ChatContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Sizes only; plaintext never ends up in logs
        match self {
            ChatContent::Text(text) => write!(f, "Text({} bytes)", text.len()),
            ChatContent::MarketListing(id) => f.debug_tuple("MarketListing").field(id).finish(),
            ChatContent::Attachment { bytes, filename } => f
                .debug_struct("Attachment")
                .field("len", &bytes.len())
                .field("has_filename", &filename.is_some())
                .finish(),
        }
    }
}

/// End-to-end encryption parameters carried with a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2eParams {
    /// IV shared by `content` and `contentFilename`
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
}

/// An encrypted message, ready for transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedChatMessage {
    /// Declared payload type
    #[serde(rename = "type")]
    pub message_type: ChatMessageType,
    /// Encrypted [`MessageEnvelope`]
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    /// Encrypted filename, attachments only
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes_opt")]
    pub content_filename: Option<Vec<u8>>,
    /// Encryption parameters
    pub e2e: E2eParams,
}

/// A message as stored and returned by the chat service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message ID
    pub id: String,
    /// Chat the message belongs to
    pub chat_id: String,
    /// Sender user ID
    pub sender: String,
    /// When the message was sent
    pub sent_at: DateTime<Utc>,
    /// Encrypted payload
    #[serde(flatten)]
    pub encrypted: EncryptedChatMessage,
}

/// A stored message with its content decrypted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedChatMessage {
    /// Message ID
    pub id: String,
    /// Chat the message belongs to
    pub chat_id: String,
    /// Sender user ID
    pub sender: String,
    /// When the message was sent
    pub sent_at: DateTime<Utc>,
    /// Decrypted content
    pub content: ChatContent,
    /// Envelope nonce
    pub nonce: String,
}

/// Encrypts and decrypts chat payloads under a shared key
#[derive(Debug, Clone)]
pub struct ChatCodec {
    provider: Arc<dyn CryptoProvider>,
    cipher: SymmetricCipher,
    agreement: KeyAgreement,
}

impl ChatCodec {
    /// Create a codec drawing IVs and nonces from `provider`
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            cipher: SymmetricCipher::new(provider.clone()),
            agreement: KeyAgreement::new(provider.clone()),
            provider,
        }
    }

    /// The cipher used for message payloads
    pub fn cipher(&self) -> &SymmetricCipher {
        &self.cipher
    }

    /// The key agreement used to derive per-chat keys
    pub fn agreement(&self) -> &KeyAgreement {
        &self.agreement
    }

    /// Encrypt `content` under `shared_key`
    ///
    /// Every payload type is wrapped in a [`MessageEnvelope`] with a fresh
    /// nonce and encrypted under a fresh 16-byte IV. An attachment filename
    /// is encrypted separately under the same IV.
    pub fn encrypt_chat_message(
        &self,
        content: &ChatContent,
        shared_key: &SymmetricKey,
    ) -> Result<EncryptedChatMessage> {
        let envelope = MessageEnvelope {
            data: content.envelope_data(),
            message_type: content.message_type(),
            nonce: hex::encode(self.provider.random_bytes(ENVELOPE_NONCE_SIZE)?),
        };
        let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(&envelope)?);

        let payload = self.cipher.encrypt(&plaintext, shared_key, None)?;

        let content_filename = match content {
            ChatContent::Attachment {
                filename: Some(filename),
                ..
            } => Some(
                self.cipher
                    .encrypt(filename.as_bytes(), shared_key, Some(payload.iv.as_slice()))?
                    .ciphertext,
            ),
            _ => None,
        };

        tracing::debug!(
            message_type = %envelope.message_type,
            content_len = payload.ciphertext.len(),
            "Encrypted chat message"
        );

        Ok(EncryptedChatMessage {
            message_type: envelope.message_type,
            content: payload.ciphertext,
            content_filename,
            e2e: E2eParams { iv: payload.iv },
        })
    }

    /// Decrypt a single ciphertext; callers parse the bytes themselves
    pub fn decrypt_message(
        &self,
        ciphertext: &[u8],
        iv: &[u8],
        shared_key: &SymmetricKey,
    ) -> Result<Vec<u8>> {
        self.cipher.decrypt(ciphertext, iv, shared_key)
    }

    /// Parse decrypted `content` bytes as a [`MessageEnvelope`]
    pub fn parse_envelope(plaintext: &[u8]) -> Result<MessageEnvelope> {
        serde_json::from_slice(plaintext)
            .map_err(|e| Error::InvalidMessageContent(format!("Malformed envelope: {}", e)))
    }

    /// Decrypt an encrypted message into its content and envelope nonce
    pub fn open(
        &self,
        message: &EncryptedChatMessage,
        shared_key: &SymmetricKey,
    ) -> Result<(ChatContent, String)> {
        let iv = &message.e2e.iv;
        let plaintext = zeroize::Zeroizing::new(self.decrypt_message(&message.content, iv, shared_key)?);
        let envelope = Self::parse_envelope(&plaintext)?;

        if envelope.message_type != message.message_type {
            return Err(Error::InvalidMessageContent(format!(
                "Envelope type {} does not match message type {}",
                envelope.message_type, message.message_type
            )));
        }

        let content = match envelope.message_type {
            ChatMessageType::Text => ChatContent::Text(envelope.data),
            ChatMessageType::MarketListing => ChatContent::MarketListing(envelope.data),
            ChatMessageType::Attachment => {
                let bytes = BASE64.decode(envelope.data.as_bytes()).map_err(|e| {
                    Error::InvalidMessageContent(format!("Attachment is not base64: {}", e))
                })?;
                let filename = match &message.content_filename {
                    Some(sealed) => {
                        let raw = self.decrypt_message(sealed, iv, shared_key)?;
                        Some(String::from_utf8(raw).map_err(|_| {
                            Error::InvalidMessageContent("Filename is not UTF-8".into())
                        })?)
                    }
                    None => None,
                };
                ChatContent::Attachment { bytes, filename }
            }
        };

        Ok((content, envelope.nonce))
    }

    /// Decrypt a stored message
    pub fn open_message(
        &self,
        message: &ChatMessage,
        shared_key: &SymmetricKey,
    ) -> Result<DecryptedChatMessage> {
        let (content, nonce) = self.open(&message.encrypted, shared_key)?;
        Ok(DecryptedChatMessage {
            id: message.id.clone(),
            chat_id: message.chat_id.clone(),
            sender: message.sender.clone(),
            sent_at: message.sent_at,
            content,
            nonce,
        })
    }

    /// Decrypt a newest-first page of messages into chronological order
    ///
    /// The page is reversed before any message is decrypted, so index `i`
    /// of the result is the `i`-th message of the conversation window.
    pub fn decrypt_message_page(
        &self,
        page: Page<ChatMessage>,
        shared_key: &SymmetricKey,
    ) -> Result<Page<DecryptedChatMessage>> {
        let page = page.into_chronological();
        let count = page.data.len();
        let decrypted = page.try_map(|message| self.open_message(&message, shared_key))?;
        tracing::debug!(count, "Decrypted message page");
        Ok(decrypted)
    }
}

/// Serde helper for serializing byte buffers as standard base64
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Serde helper for optional base64 byte buffers
mod base64_bytes_opt {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_some(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// ============================================================================
// TESTS
// ============================================================================
