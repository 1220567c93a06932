//! # Storage Module
//!
//! Local persistence for the chat core. Only two kinds of entries are kept:
//! the user's wrapped private key and cached public keys of chat partners.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Identity::lock ──► UEK envelope ──► LocalKeyStore ──► keys.json      │
//! │                                            │                            │
//! │   Identity::unlock ◄── UEK envelope ◄──────┘                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod key_store;

pub use key_store::{keys, LocalKeyStore};
