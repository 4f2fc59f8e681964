//! Input validation for identifiers that cross the wire.

/// Conversation ids double as cache keys and HTTP header values.
pub const MAX_CONVERSATION_ID_LENGTH: usize = 128;

/// Validate a conversation identifier
pub fn validate_conversation_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("Conversation id cannot be empty".to_string());
    }
    if id.len() > MAX_CONVERSATION_ID_LENGTH {
        return Err(format!(
            "Conversation id too long (max {} bytes)",
            MAX_CONVERSATION_ID_LENGTH
        ));
    }
    // Must survive as an HTTP header value unchanged
    if !id.bytes().all(|b| b.is_ascii_graphic()) {
        return Err("Conversation id must be visible ASCII without spaces".to_string());
    }
    Ok(())
}

/// Validate that the header id and the body id name the same conversation
pub fn validate_matching_ids(header_id: &str, body_id: &str) -> Result<(), String> {
    validate_conversation_id(header_id)?;
    if header_id != body_id {
        return Err("Conversation id does not match x-client-id header".to_string());
    }
    Ok(())
}
