use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::product::ProductContext;

/// Body of `POST /api/widget/chat`.
///
/// `sessionId` and `message` default to empty so that a missing field is
/// reported by the chat pipeline with its own message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatBody {
    #[serde(default)]
    #[garde(length(max = 128))]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(max = 128))]
    pub visitor_id: Option<String>,
    #[serde(default)]
    #[garde(length(max = 4000))]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(max = 64))]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(dive)]
    pub product_context: Option<ProductContext>,
}

/// `data` of a successful chat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReplyData {
    pub conversation_id: String,
    /// The assistant's reply text, markup included.
    pub message: String,
    /// The reply rendered to widget HTML.
    #[serde(default)]
    pub html: Option<String>,
}

/// `meta` of a successful chat response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReplyMeta {
    pub messages_remaining: i64,
}

/// A successful chat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    pub data: ChatReplyData,
    pub meta: ChatReplyMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: Result<ChatBody, _> =
            serde_json::from_str(r#"{"sessionId":"s","message":"hi","storeId":"x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn optional_fields_are_left_out_when_serialised() {
        let body = ChatBody {
            session_id: "s".to_string(),
            message: "hi".to_string(),
            ..ChatBody::default()
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"sessionId":"s","message":"hi"}"#
        );
    }

    #[test]
    fn oversized_message_fails_validation() {
        let body = ChatBody {
            session_id: "s".to_string(),
            message: "x".repeat(4001),
            ..ChatBody::default()
        };
        assert!(body.validate().is_err());
    }
}
