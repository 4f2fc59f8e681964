//! Two parties agreeing on secrets over ECDH and driving paired engines,
//! with every state passing through the encrypted store between calls.

use conduit_core::{
    DrbgConfig, DrbgEngine, EngineError, EngineRole, KeyExchange, SeedMaterial,
    SessionStateStore, StatefulEngine,
};

const NONCE: u64 = 1_700_000_000_000;

struct Side {
    encoder: DrbgEngine,
    decoder: DrbgEngine,
}

/// Client encoder pairs with peer decoder and vice versa.
fn paired_sides(conversation_id: &str) -> (Side, Side) {
    let mut client_enc = KeyExchange::new();
    let mut client_dec = KeyExchange::new();
    let mut peer_dec = KeyExchange::new();
    let mut peer_enc = KeyExchange::new();

    let client_enc_pub = client_enc.generate_key_pair().unwrap();
    let client_dec_pub = client_dec.generate_key_pair().unwrap();
    let peer_dec_pub = peer_dec.generate_key_pair().unwrap();
    let peer_enc_pub = peer_enc.generate_key_pair().unwrap();

    let up = client_enc.derive_shared_secret(&peer_dec_pub).unwrap();
    let down = client_dec.derive_shared_secret(&peer_enc_pub).unwrap();
    let peer_up = peer_dec.derive_shared_secret(&client_enc_pub).unwrap();
    let peer_down = peer_enc.derive_shared_secret(&client_dec_pub).unwrap();
    assert_eq!(up.as_bytes(), peer_up.as_bytes());
    assert_eq!(down.as_bytes(), peer_down.as_bytes());
    assert_ne!(up.as_bytes(), down.as_bytes());

    let engine = |role, entropy: &[u8]| {
        DrbgEngine::instantiate(
            &DrbgConfig::default(),
            role,
            SeedMaterial {
                entropy,
                nonce: NONCE,
                personalization: conversation_id,
            },
        )
        .unwrap()
    };

    let client = Side {
        encoder: engine(EngineRole::Encoder, up.as_ref()),
        decoder: engine(EngineRole::Decoder, down.as_ref()),
    };
    let peer = Side {
        encoder: engine(EngineRole::Encoder, down.as_ref()),
        decoder: engine(EngineRole::Decoder, up.as_ref()),
    };
    (client, peer)
}

#[test]
fn test_echo_through_store() {
    let (client, peer) = paired_sides("c1");
    let client_store = SessionStateStore::default();
    let peer_store = SessionStateStore::default();

    client_store.put_engine("c1", client.encoder).unwrap();
    client_store.put_engine("c1", client.decoder).unwrap();
    peer_store.put_engine("c1", peer.encoder).unwrap();
    peer_store.put_engine("c1", peer.decoder).unwrap();

    for trip in 1..=10 {
        let message = format!("Hello from client 1 for the {trip} time.");

        let mut enc: DrbgEngine = client_store.take_engine(EngineRole::Encoder, "c1").unwrap();
        let outbound = enc.encode(message.as_bytes()).unwrap();
        client_store.put_engine("c1", enc).unwrap();

        let mut peer_dec: DrbgEngine = peer_store.take_engine(EngineRole::Decoder, "c1").unwrap();
        let received = peer_dec.decode(&outbound).unwrap();
        peer_store.put_engine("c1", peer_dec).unwrap();
        assert_eq!(received, message.as_bytes());

        let mut peer_enc: DrbgEngine = peer_store.take_engine(EngineRole::Encoder, "c1").unwrap();
        let reply = peer_enc.encode(&received).unwrap();
        peer_store.put_engine("c1", peer_enc).unwrap();

        let mut dec: DrbgEngine = client_store.take_engine(EngineRole::Decoder, "c1").unwrap();
        assert_eq!(dec.decode(&reply).unwrap(), message.as_bytes());
        client_store.put_engine("c1", dec).unwrap();
    }
}

#[test]
fn test_client_cannot_decode_its_own_output() {
    let (mut client, _) = paired_sides("c1");
    let encoded = client.encoder.encode(b"hello").unwrap();
    assert_eq!(
        client.decoder.decode(&encoded),
        Err(EngineError::IntegrityCheckFailed)
    );
}

#[test]
fn test_other_conversation_cannot_decode() {
    let (mut client_a, _) = paired_sides("a");
    let (_, mut peer_b) = paired_sides("b");
    let encoded = client_a.encoder.encode(b"for a only").unwrap();
    assert_eq!(
        peer_b.decoder.decode(&encoded),
        Err(EngineError::IntegrityCheckFailed)
    );
}
