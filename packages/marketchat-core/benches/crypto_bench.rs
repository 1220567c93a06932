use criterion::{black_box, criterion_group, criterion_main, Criterion};
use marketchat_core::crypto::{Kdf, KdfParams, KeyAgreement, OsCryptoProvider};
use marketchat_core::messaging::{ChatCodec, ChatContent};

fn pbkdf2(c: &mut Criterion) {
    let kdf = Kdf::default();
    c.bench_function("pbkdf2_sha512_100k", |b| {
        b.iter(|| kdf.derive_bits(black_box("hunter2"), black_box("alice"), 32).unwrap())
    });

    let fast = Kdf::new(KdfParams { iterations: 1_000 }).unwrap();
    c.bench_function("deterministic_key_pair_1k", |b| {
        b.iter(|| fast.generate_deterministic_key_pair(black_box("hunter2"), "alice").unwrap())
    });
}

fn key_agreement(c: &mut Criterion) {
    let agreement = KeyAgreement::new(OsCryptoProvider::shared());
    let alice = agreement.generate_random_key_pair().unwrap();
    let bob = agreement.generate_random_key_pair().unwrap();

    c.bench_function("p521_generate_key_pair", |b| {
        b.iter(|| agreement.generate_random_key_pair().unwrap())
    });
    c.bench_function("p521_derive_key", |b| {
        b.iter(|| {
            agreement
                .derive_key(black_box(&bob.public_key), &alice.private_key)
                .unwrap()
        })
    });
}

fn messages(c: &mut Criterion) {
    let codec = ChatCodec::new(OsCryptoProvider::shared());
    let alice = codec.agreement().generate_random_key_pair().unwrap();
    let bob = codec.agreement().generate_random_key_pair().unwrap();
    let key = codec
        .agreement()
        .derive_key(&bob.public_key, &alice.private_key)
        .unwrap();

    let text = ChatContent::Text("Is the bike still available? I can pick it up today.".into());
    c.bench_function("encrypt_text_message", |b| {
        b.iter(|| codec.encrypt_chat_message(black_box(&text), &key).unwrap())
    });

    let sealed = codec.encrypt_chat_message(&text, &key).unwrap();
    c.bench_function("open_text_message", |b| {
        b.iter(|| codec.open(black_box(&sealed), &key).unwrap())
    });

    let attachment = ChatContent::Attachment {
        bytes: vec![0xAB; 256 * 1024],
        filename: Some("photo.jpg".into()),
    };
    c.bench_function("encrypt_256k_attachment", |b| {
        b.iter(|| codec.encrypt_chat_message(black_box(&attachment), &key).unwrap())
    });
}

criterion_group!(benches, pbkdf2, key_agreement, messages);
criterion_main!(benches);
