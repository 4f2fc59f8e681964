//! Reference engine: HMAC-DRBG (SHA-256) keystream with a truncated HMAC tag.
//!
//! Each encode or decode is exactly one generate call, producing a 32-byte
//! tag key followed by a keystream as long as the message. The wire form is
//! `base64(plaintext XOR keystream || tag)`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{EngineRole, SeedMaterial, StateBlob, StatefulEngine};
use crate::error::EngineError;

type HmacSha256 = Hmac<Sha256>;

/// SP 800-90A maximum number of requests between reseeds for HMAC-DRBG.
pub const DEFAULT_RESEED_INTERVAL: u64 = 1 << 48;

/// Minimum entropy for a 256-bit security strength.
pub const MIN_ENTROPY_LEN: usize = 32;

const OUT_LEN: usize = 32;
const TAG_KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;

const STATE_VERSION: u8 = 1;
const STATE_LEN: usize = 1 + 1 + OUT_LEN + OUT_LEN + 8 + 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrbgConfig {
    pub reseed_interval: u64,
}

impl Default for DrbgConfig {
    fn default() -> Self {
        Self {
            reseed_interval: DEFAULT_RESEED_INTERVAL,
        }
    }
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct DrbgState {
    key: [u8; OUT_LEN],
    value: [u8; OUT_LEN],
    reseed_counter: u64,
    reseed_interval: u64,
}

impl DrbgState {
    fn instantiate(seed: &SeedMaterial<'_>, reseed_interval: u64) -> Result<Self, EngineError> {
        let mut state = Self {
            key: [0x00; OUT_LEN],
            value: [0x01; OUT_LEN],
            reseed_counter: 1,
            reseed_interval,
        };
        let nonce = seed.nonce.to_be_bytes();
        state.update(&[seed.entropy, &nonce, seed.personalization.as_bytes()])?;
        Ok(state)
    }

    fn update(&mut self, provided: &[&[u8]]) -> Result<(), EngineError> {
        let has_data = provided.iter().any(|part| !part.is_empty());

        self.key = self.next_key(0x00, provided)?;
        self.value = mac(&self.key, &[self.value.as_slice()])?;

        if has_data {
            self.key = self.next_key(0x01, provided)?;
            self.value = mac(&self.key, &[self.value.as_slice()])?;
        }
        Ok(())
    }

    fn next_key(&self, separator: u8, provided: &[&[u8]]) -> Result<[u8; OUT_LEN], EngineError> {
        let separator = [separator];
        let mut parts: Vec<&[u8]> = Vec::with_capacity(provided.len() + 2);
        parts.push(&self.value);
        parts.push(&separator);
        parts.extend_from_slice(provided);
        mac(&self.key, &parts)
    }

    fn generate(&mut self, out: &mut [u8]) -> Result<(), EngineError> {
        if self.reseed_counter > self.reseed_interval {
            return Err(EngineError::ReseedRequired {
                counter: self.reseed_counter,
                interval: self.reseed_interval,
            });
        }

        for chunk in out.chunks_mut(OUT_LEN) {
            self.value = mac(&self.key, &[self.value.as_slice()])?;
            chunk.copy_from_slice(&self.value[..chunk.len()]);
        }

        self.update(&[])?;
        self.reseed_counter += 1;
        Ok(())
    }
}

fn mac(key: &[u8], parts: &[&[u8]]) -> Result<[u8; OUT_LEN], EngineError> {
    let mut mac = hmac_sha256(key)?;
    for part in parts {
        mac.update(part);
    }
    let result = mac.finalize().into_bytes();

    let mut out = [0u8; OUT_LEN];
    out.copy_from_slice(&result);
    Ok(out)
}

fn hmac_sha256(key: &[u8]) -> Result<HmacSha256, EngineError> {
    <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| EngineError::BadState(format!("HMAC key rejected: {e}")))
}

pub struct DrbgEngine {
    role: EngineRole,
    state: DrbgState,
}

impl std::fmt::Debug for DrbgEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrbgEngine")
            .field("role", &self.role)
            .field("reseed_counter", &self.state.reseed_counter)
            .field("reseed_interval", &self.state.reseed_interval)
            .finish_non_exhaustive()
    }
}

impl DrbgEngine {
    fn require_role(&self, role: EngineRole, operation: &'static str) -> Result<(), EngineError> {
        if self.role == role {
            Ok(())
        } else {
            Err(EngineError::WrongRole {
                operation,
                role: self.role.as_str(),
            })
        }
    }
}

impl StatefulEngine for DrbgEngine {
    type Config = DrbgConfig;

    fn instantiate(
        config: &DrbgConfig,
        role: EngineRole,
        seed: SeedMaterial<'_>,
    ) -> Result<Self, EngineError> {
        if seed.entropy.len() < MIN_ENTROPY_LEN {
            return Err(EngineError::EntropyTooShort {
                got: seed.entropy.len(),
                min: MIN_ENTROPY_LEN,
            });
        }
        if config.reseed_interval == 0 {
            return Err(EngineError::BadState(
                "reseed interval must be positive".to_string(),
            ));
        }

        Ok(Self {
            role,
            state: DrbgState::instantiate(&seed, config.reseed_interval)?,
        })
    }

    fn role(&self) -> EngineRole {
        self.role
    }

    fn encode(&mut self, plaintext: &[u8]) -> Result<String, EngineError> {
        self.require_role(EngineRole::Encoder, "encode")?;

        let mut stream = vec![0u8; TAG_KEY_LEN + plaintext.len()];
        self.state.generate(&mut stream)?;
        let (tag_key, pad) = stream.split_at(TAG_KEY_LEN);

        let mut out: Vec<u8> = plaintext.iter().zip(pad).map(|(p, k)| p ^ k).collect();
        let mut mac = hmac_sha256(tag_key)?;
        mac.update(&out);
        let tag = mac.finalize().into_bytes();
        out.extend_from_slice(&tag[..TAG_LEN]);

        stream.zeroize();
        Ok(BASE64.encode(out))
    }

    fn decode(&mut self, ciphertext_b64: &str) -> Result<Vec<u8>, EngineError> {
        self.require_role(EngineRole::Decoder, "decode")?;

        let bytes = BASE64
            .decode(ciphertext_b64.trim())
            .map_err(|e| EngineError::Malformed(e.to_string()))?;
        if bytes.len() < TAG_LEN {
            return Err(EngineError::Malformed(format!(
                "ciphertext shorter than {TAG_LEN}-byte tag"
            )));
        }
        let (body, tag) = bytes.split_at(bytes.len() - TAG_LEN);

        // Advance a scratch copy; commit only once the tag verifies.
        let mut scratch = self.state.clone();
        let mut stream = vec![0u8; TAG_KEY_LEN + body.len()];
        scratch.generate(&mut stream)?;
        let (tag_key, pad) = stream.split_at(TAG_KEY_LEN);

        let mut mac = hmac_sha256(tag_key)?;
        mac.update(body);
        if mac.verify_truncated_left(tag).is_err() {
            stream.zeroize();
            return Err(EngineError::IntegrityCheckFailed);
        }

        let plaintext = body.iter().zip(pad).map(|(c, k)| c ^ k).collect();
        stream.zeroize();
        self.state = scratch;
        Ok(plaintext)
    }

    fn save_state(self) -> StateBlob {
        let mut raw = Vec::with_capacity(STATE_LEN);
        raw.push(STATE_VERSION);
        raw.push(match self.role {
            EngineRole::Encoder => 0,
            EngineRole::Decoder => 1,
        });
        raw.extend_from_slice(&self.state.key);
        raw.extend_from_slice(&self.state.value);
        raw.extend_from_slice(&self.state.reseed_counter.to_be_bytes());
        raw.extend_from_slice(&self.state.reseed_interval.to_be_bytes());

        let blob = StateBlob::new(BASE64.encode(&raw));
        raw.zeroize();
        blob
    }

    fn restore_state(blob: StateBlob) -> Result<Self, EngineError> {
        let mut raw = BASE64
            .decode(blob.expose())
            .map_err(|e| EngineError::BadState(e.to_string()))?;
        drop(blob);

        let restored = parse_state(&raw);
        raw.zeroize();
        restored
    }

    fn reseed_counter(&self) -> u64 {
        self.state.reseed_counter
    }

    fn reseed_interval(&self) -> u64 {
        self.state.reseed_interval
    }

    fn uninstantiate(self) -> Result<(), EngineError> {
        // DrbgState zeroizes on drop.
        drop(self);
        Ok(())
    }
}

fn parse_state(raw: &[u8]) -> Result<DrbgEngine, EngineError> {
    if raw.len() != STATE_LEN {
        return Err(EngineError::BadState(format!(
            "expected {STATE_LEN} bytes, got {}",
            raw.len()
        )));
    }
    if raw[0] != STATE_VERSION {
        return Err(EngineError::BadState(format!(
            "unsupported state version {}",
            raw[0]
        )));
    }
    let role = match raw[1] {
        0 => EngineRole::Encoder,
        1 => EngineRole::Decoder,
        other => return Err(EngineError::BadState(format!("unknown role {other}"))),
    };

    let mut key = [0u8; OUT_LEN];
    let mut value = [0u8; OUT_LEN];
    key.copy_from_slice(&raw[2..2 + OUT_LEN]);
    value.copy_from_slice(&raw[2 + OUT_LEN..2 + 2 * OUT_LEN]);

    let mut counter = [0u8; 8];
    let mut interval = [0u8; 8];
    counter.copy_from_slice(&raw[2 + 2 * OUT_LEN..2 + 2 * OUT_LEN + 8]);
    interval.copy_from_slice(&raw[2 + 2 * OUT_LEN + 8..]);

    let reseed_counter = u64::from_be_bytes(counter);
    if reseed_counter == 0 {
        return Err(EngineError::NotInstantiated);
    }

    Ok(DrbgEngine {
        role,
        state: DrbgState {
            key,
            value,
            reseed_counter,
            reseed_interval: u64::from_be_bytes(interval),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTROPY: [u8; 32] = [7u8; 32];

    fn pair(config: &DrbgConfig) -> (DrbgEngine, DrbgEngine) {
        let seed = || SeedMaterial {
            entropy: &ENTROPY,
            nonce: 1_700_000_000_000,
            personalization: "c1",
        };
        let encoder = DrbgEngine::instantiate(config, EngineRole::Encoder, seed()).unwrap();
        let decoder = DrbgEngine::instantiate(config, EngineRole::Decoder, seed()).unwrap();
        (encoder, decoder)
    }

    #[test]
    fn test_hmac_accepts_any_key_length() {
        for len in [0, 1, 32, 64, 65, 200] {
            let key = vec![0x5a; len];
            assert!(hmac_sha256(&key).is_ok(), "key of {len} bytes");
            assert!(mac(&key, &[b"data".as_slice()]).is_ok());
        }
    }

    #[test]
    fn test_encode_decode_in_order() {
        let (mut encoder, mut decoder) = pair(&DrbgConfig::default());
        for i in 0..20 {
            let msg = format!("message {i}");
            let encoded = encoder.encode(msg.as_bytes()).unwrap();
            assert_eq!(decoder.decode(&encoded).unwrap(), msg.as_bytes());
        }
    }

    #[test]
    fn test_same_plaintext_encodes_differently() {
        let (mut encoder, _) = pair(&DrbgConfig::default());
        let a = encoder.encode(b"hello").unwrap();
        let b = encoder.encode(b"hello").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_out_of_order_decode_fails_without_advancing() {
        let (mut encoder, mut decoder) = pair(&DrbgConfig::default());
        let first = encoder.encode(b"first").unwrap();
        let second = encoder.encode(b"second").unwrap();

        let counter = decoder.reseed_counter();
        assert_eq!(
            decoder.decode(&second),
            Err(EngineError::IntegrityCheckFailed)
        );
        assert_eq!(decoder.reseed_counter(), counter);

        assert_eq!(decoder.decode(&first).unwrap(), b"first");
        assert_eq!(decoder.decode(&second).unwrap(), b"second");
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let (mut encoder, mut decoder) = pair(&DrbgConfig::default());
        let encoded = encoder.encode(b"payload").unwrap();
        let mut raw = BASE64.decode(&encoded).unwrap();
        raw[0] ^= 0x01;
        assert_eq!(
            decoder.decode(&BASE64.encode(raw)),
            Err(EngineError::IntegrityCheckFailed)
        );
    }

    #[test]
    fn test_malformed_ciphertext_rejected() {
        let (_, mut decoder) = pair(&DrbgConfig::default());
        assert!(matches!(
            decoder.decode("not base64!"),
            Err(EngineError::Malformed(_))
        ));
        assert!(matches!(
            decoder.decode(&BASE64.encode([1u8, 2, 3])),
            Err(EngineError::Malformed(_))
        ));
    }

    #[test]
    fn test_roles_are_enforced() {
        let (mut encoder, mut decoder) = pair(&DrbgConfig::default());
        assert!(matches!(
            encoder.decode("AAAA"),
            Err(EngineError::WrongRole { .. })
        ));
        assert!(matches!(
            decoder.encode(b"x"),
            Err(EngineError::WrongRole { .. })
        ));
    }

    #[test]
    fn test_short_entropy_rejected() {
        let result = DrbgEngine::instantiate(
            &DrbgConfig::default(),
            EngineRole::Encoder,
            SeedMaterial {
                entropy: &[1u8; 16],
                nonce: 1,
                personalization: "c1",
            },
        );
        assert!(matches!(
            result,
            Err(EngineError::EntropyTooShort { got: 16, min: 32 })
        ));
    }

    #[test]
    fn test_different_nonce_cannot_decode() {
        let config = DrbgConfig::default();
        let mut encoder = DrbgEngine::instantiate(
            &config,
            EngineRole::Encoder,
            SeedMaterial {
                entropy: &ENTROPY,
                nonce: 1,
                personalization: "c1",
            },
        )
        .unwrap();
        let mut decoder = DrbgEngine::instantiate(
            &config,
            EngineRole::Decoder,
            SeedMaterial {
                entropy: &ENTROPY,
                nonce: 2,
                personalization: "c1",
            },
        )
        .unwrap();

        let encoded = encoder.encode(b"hello").unwrap();
        assert_eq!(
            decoder.decode(&encoded),
            Err(EngineError::IntegrityCheckFailed)
        );
    }

    #[test]
    fn test_counter_increments_per_operation() {
        let (mut encoder, mut decoder) = pair(&DrbgConfig::default());
        assert_eq!(encoder.reseed_counter(), 1);

        let encoded = encoder.encode(b"a").unwrap();
        assert_eq!(encoder.reseed_counter(), 2);
        decoder.decode(&encoded).unwrap();
        assert_eq!(decoder.reseed_counter(), 2);
    }

    #[test]
    fn test_reseed_required_past_interval() {
        let (mut encoder, _) = pair(&DrbgConfig { reseed_interval: 3 });
        for _ in 0..3 {
            encoder.encode(b"x").unwrap();
        }
        assert_eq!(
            encoder.encode(b"x"),
            Err(EngineError::ReseedRequired {
                counter: 4,
                interval: 3
            })
        );
    }

    #[test]
    fn test_save_restore_continues_stream() {
        let (mut encoder, mut decoder) = pair(&DrbgConfig::default());
        let first = encoder.encode(b"one").unwrap();
        assert_eq!(decoder.decode(&first).unwrap(), b"one");

        let mut encoder = DrbgEngine::restore_state(encoder.save_state()).unwrap();
        let mut decoder = DrbgEngine::restore_state(decoder.save_state()).unwrap();
        assert_eq!(encoder.role(), EngineRole::Encoder);
        assert_eq!(decoder.role(), EngineRole::Decoder);

        let second = encoder.encode(b"two").unwrap();
        assert_eq!(decoder.decode(&second).unwrap(), b"two");
        assert_eq!(encoder.reseed_counter(), 3);
    }

    #[test]
    fn test_state_changes_after_operation() {
        let (encoder, _) = pair(&DrbgConfig::default());
        let before = encoder.save_state();

        let mut encoder = DrbgEngine::restore_state(StateBlob::new(before.expose().to_string()))
            .unwrap();
        encoder.encode(b"hello").unwrap();
        let after = encoder.save_state();

        assert_ne!(before, after);
    }

    #[test]
    fn test_restore_rejects_garbage() {
        assert!(matches!(
            DrbgEngine::restore_state(StateBlob::new("%%%".to_string())),
            Err(EngineError::BadState(_))
        ));
        assert!(matches!(
            DrbgEngine::restore_state(StateBlob::new(BASE64.encode([1u8; 10]))),
            Err(EngineError::BadState(_))
        ));
    }

    #[test]
    fn test_restore_rejects_zero_counter() {
        let mut raw = vec![STATE_VERSION, 0];
        raw.extend_from_slice(&[0u8; 2 * OUT_LEN + 8]);
        raw.extend_from_slice(&10u64.to_be_bytes());
        assert_eq!(
            DrbgEngine::restore_state(StateBlob::new(BASE64.encode(raw))).err(),
            Some(EngineError::NotInstantiated)
        );
    }
}
