use serde::{Deserialize, Serialize};

/// Header naming the conversation a request belongs to.
pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const HANDSHAKE_ROUTE: &str = "/api/handshake";
pub const MESSAGE_ROUTE: &str = "/api/multiclient";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Result codes carried in `ResponseModel::result_code`.
pub mod codes {
    pub const SUCCESS: &str = "000";
    pub const VALIDATION_ERROR: &str = "100";
    pub const ENCODE_EXCEPTION: &str = "104";
    pub const DECODE_EXCEPTION: &str = "112";
    pub const STATE_CREATION: &str = "114";
    pub const STATE_RETRIEVAL: &str = "115";
    pub const STATE_SAVE: &str = "116";
    /// Peer holds no state for the conversation; the client must rehandshake.
    pub const STATE_NOT_FOUND: &str = "117";
    pub const HTTP_ERROR: &str = "200";
    pub const HTTP_EXCEPTION: &str = "201";
    pub const HANDSHAKE_EXCEPTION: &str = "302";
}

/// Handshake request and response body.
///
/// Each side fills the key fields from its own perspective: the peer
/// returns, under `ClientEncoderPublicKey`, the key that pairs with the
/// client's encoder channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeModel {
    /// Decimal u64, set by the peer; empty on requests.
    #[serde(rename = "Timestamp", default)]
    pub timestamp: String,
    #[serde(rename = "ConversationIdentifier")]
    pub conversation_identifier: String,
    #[serde(rename = "ClientEncoderPublicKey", with = "base64_bytes")]
    pub client_encoder_public_key: Vec<u8>,
    #[serde(rename = "ClientDecoderPublicKey", with = "base64_bytes")]
    pub client_decoder_public_key: Vec<u8>,
}

impl HandshakeModel {
    pub fn request(
        conversation_id: &str,
        encoder_public_key: Vec<u8>,
        decoder_public_key: Vec<u8>,
    ) -> Self {
        Self {
            timestamp: String::new(),
            conversation_identifier: conversation_id.to_string(),
            client_encoder_public_key: encoder_public_key,
            client_decoder_public_key: decoder_public_key,
        }
    }

    /// Timestamp parsed as the engine nonce.
    pub fn nonce(&self) -> Result<u64, String> {
        self.timestamp
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("Invalid handshake timestamp {:?}: {}", self.timestamp, e))
    }
}

/// Envelope for every peer response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseModel<T> {
    #[serde(rename = "Data")]
    pub data: Option<T>,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "ResultCode", default)]
    pub result_code: String,
    #[serde(rename = "ExceptionUid", default)]
    pub exception_uid: String,
    #[serde(default)]
    pub access_token: String,
}

impl<T> ResponseModel<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            message: "Success".to_string(),
            success: true,
            result_code: codes::SUCCESS.to_string(),
            exception_uid: String::new(),
            access_token: String::new(),
        }
    }

    pub fn failure(result_code: &str, message: impl Into<String>) -> Self {
        Self {
            data: None,
            message: message.into(),
            success: false,
            result_code: result_code.to_string(),
            exception_uid: String::new(),
            access_token: String::new(),
        }
    }

    pub fn is_state_not_found(&self) -> bool {
        !self.success && self.result_code == codes::STATE_NOT_FOUND
    }
}

/// Serde adapter for byte arrays carried as standard base64 strings.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}
