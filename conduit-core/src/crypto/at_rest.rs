use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const STATE_KEY_INFO: &[u8] = b"conduit-state-at-rest";

/// Sealed engine state as it sits in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedState {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

/// AES-256-GCM cipher for engine state at rest.
///
/// The per-conversation key is HKDF-SHA256 over a process master secret,
/// salted with the conversation id. Every seal draws a fresh random nonce
/// and binds the cache key as associated data, so a sealed encoder state
/// cannot be replayed into the decoder slot.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct StateCipher {
    master: [u8; KEY_LEN],
}

impl Default for StateCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCipher {
    /// Cipher with a random master secret; state sealed by it does not
    /// survive the process.
    pub fn new() -> Self {
        let mut master = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut master);
        Self { master }
    }

    pub fn from_master(master: [u8; KEY_LEN]) -> Self {
        Self { master }
    }

    fn conversation_key(&self, conversation_id: &str) -> Result<Aes256Gcm, aes_gcm::Error> {
        let hk = Hkdf::<Sha256>::new(Some(conversation_id.as_bytes()), &self.master);
        let mut key = [0u8; KEY_LEN];
        hk.expand(STATE_KEY_INFO, &mut key).map_err(|_| aes_gcm::Error)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| aes_gcm::Error);
        key.zeroize();
        cipher
    }

    pub fn seal(
        &self,
        conversation_id: &str,
        cache_key: &str,
        plaintext: &[u8],
    ) -> Result<SealedState, aes_gcm::Error> {
        let cipher = self.conversation_key(conversation_id)?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher.encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: cache_key.as_bytes(),
            },
        )?;

        Ok(SealedState { nonce, ciphertext })
    }

    pub fn open(
        &self,
        conversation_id: &str,
        cache_key: &str,
        sealed: &SealedState,
    ) -> Result<Vec<u8>, aes_gcm::Error> {
        let cipher = self.conversation_key(conversation_id)?;
        cipher.decrypt(
            Nonce::from_slice(&sealed.nonce),
            Payload {
                msg: &sealed.ciphertext,
                aad: cache_key.as_bytes(),
            },
        )
    }
}
