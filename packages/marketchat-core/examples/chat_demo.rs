//! # Chat Demo
//!
//! A buyer and a seller set up an encrypted conversation about a listing.
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=marketchat_core=debug cargo run --example chat_demo
//! ```
//!
//! Set `MARKETCHAT_PBKDF2_ITERATIONS=1000` for a faster (non-interoperable) run.

use chrono::Utc;
use marketchat_core::messaging::{Chat, ChatContent, ChatMessage, ChatParticipant};
use marketchat_core::{CoreConfig, MarketChatCore};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketchat_core=info".into()),
        )
        .init();

    println!("=== MarketChat Core: Encrypted Listing Chat ===\n");

    let config = CoreConfig::from_env().expect("Invalid configuration");
    let core = MarketChatCore::new(config).expect("Failed to initialize core");

    // Step 1: identities
    println!("Step 1: Buyer signs up, seller logs in from credentials...");
    let buyer = core.signup().expect("Signup failed");
    let seller = core.login("seller", "correct horse").expect("Login failed");

    let buyer_jwk = buyer.public_key_jwk().expect("Buyer key export failed");
    let seller_jwk = seller.public_key_jwk().expect("Seller key export failed");
    println!("  Buyer public x:  {}...", &buyer_jwk.x.as_deref().unwrap_or("")[..16]);
    println!("  Seller public x: {}...", &seller_jwk.x.as_deref().unwrap_or("")[..16]);
    println!();

    // Step 2: shared key
    println!("Step 2: Deriving the conversation key (ECDH P-521)...");
    let buyer_key = core.shared_key(&buyer, &seller_jwk).expect("Derive failed");
    println!("  Key length: {} bits\n", buyer_key.length().bits());

    // Step 3: messages
    println!("Step 3: Buyer sends the listing and a question...");
    let codec = core.codec();
    let listing = codec
        .encrypt_chat_message(&ChatContent::MarketListing("listing-1138".into()), &buyer_key)
        .expect("Encrypt failed");
    let question = codec
        .encrypt_chat_message(&ChatContent::Text("Is the bike still available?".into()), &buyer_key)
        .expect("Encrypt failed");
    println!("  Listing ciphertext: {} bytes", listing.content.len());
    println!("  Question ciphertext: {} bytes", question.content.len());
    println!(
        "  Wire form: {}\n",
        serde_json::to_string(&question).expect("Serialize failed")
    );

    // Step 4: seller decrypts the chat list
    println!("Step 4: Seller opens the chat list...");
    let chat = Chat {
        id: "chat-1".into(),
        participants: vec![
            ChatParticipant {
                id: "buyer".into(),
                username: "buyer".into(),
                public_key: buyer_jwk,
            },
            ChatParticipant {
                id: "seller".into(),
                username: "seller".into(),
                public_key: seller_jwk,
            },
        ],
        last_message: Some(ChatMessage {
            id: "m2".into(),
            chat_id: "chat-1".into(),
            sender: "buyer".into(),
            sent_at: Utc::now(),
            encrypted: question,
        }),
    };

    let chats = core
        .decrypt_chats(vec![chat], "seller", &seller)
        .await
        .expect("Chat decryption failed");
    if let Some(message) = &chats[0].last_message {
        if let ChatContent::Text(text) = &message.content {
            println!("  Last message from {}: {:?}", message.sender, text);
        }
    }
    println!();

    // Step 5: seller locks their key for next time
    println!("Step 5: Seller locks their identity...");
    core.lock(&seller, "seller", "correct horse").expect("Lock failed");
    let unlocked = core.unlock("seller", "correct horse").expect("Unlock failed");
    println!(
        "  Unlocked key matches: {}",
        unlocked.public_key() == seller.public_key()
    );

    println!("\n=== Demo Complete ===");
}
