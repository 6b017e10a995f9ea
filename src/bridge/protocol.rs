//! Wire message types exchanged with the analysis backend.
//!
//! Every frame is a JSON object carrying the correlation `id` and a `type`
//! discriminant. Replies additionally carry `error_message`; when it is set
//! the payload fields are ignored.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Discriminant shared by requests and their replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    GetDecompilation,
    GetDefinedFunctionList,
    GetFunctionCount,
    RenameVariable,
    GetReferences,
    SetComment,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetDecompilation => "get_decompilation",
            Self::GetDefinedFunctionList => "get_defined_function_list",
            Self::GetFunctionCount => "get_function_count",
            Self::RenameVariable => "rename_variable",
            Self::GetReferences => "get_references",
            Self::SetComment => "set_comment",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local or stack variable as reported in a decompilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

/// Request sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestMessage {
    GetDecompilation {
        #[serde(default, with = "hex_address_opt")]
        address: Option<u64>,
        #[serde(default)]
        function: Option<String>,
    },
    GetDefinedFunctionList {
        page: u32,
        page_size: u32,
    },
    GetFunctionCount {},
    RenameVariable {
        function_name: String,
        old_name: String,
        new_name: String,
    },
    GetReferences {
        address_or_symbol: String,
    },
    SetComment {
        symbol_or_address: String,
        comment: String,
    },
}

impl RequestMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::GetDecompilation { .. } => MessageKind::GetDecompilation,
            Self::GetDefinedFunctionList { .. } => MessageKind::GetDefinedFunctionList,
            Self::GetFunctionCount {} => MessageKind::GetFunctionCount,
            Self::RenameVariable { .. } => MessageKind::RenameVariable,
            Self::GetReferences { .. } => MessageKind::GetReferences,
            Self::SetComment { .. } => MessageKind::SetComment,
        }
    }
}

/// Reply payload. Fields default when absent so that an error reply with
/// no payload still decodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseMessage {
    GetDecompilation {
        #[serde(default)]
        function: String,
        #[serde(default)]
        function_signature: String,
        #[serde(default, with = "hex_address")]
        address: u64,
        #[serde(default)]
        decompilation: String,
        #[serde(default)]
        variables: Vec<Variable>,
    },
    GetDefinedFunctionList {
        #[serde(default)]
        function_list: Vec<String>,
    },
    GetFunctionCount {
        #[serde(default)]
        function_count: u64,
    },
    RenameVariable {},
    GetReferences {
        #[serde(default)]
        references_to: Vec<String>,
        #[serde(default)]
        references_from: Vec<String>,
    },
    SetComment {},
}

impl ResponseMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::GetDecompilation { .. } => MessageKind::GetDecompilation,
            Self::GetDefinedFunctionList { .. } => MessageKind::GetDefinedFunctionList,
            Self::GetFunctionCount { .. } => MessageKind::GetFunctionCount,
            Self::RenameVariable {} => MessageKind::RenameVariable,
            Self::GetReferences { .. } => MessageKind::GetReferences,
            Self::SetComment {} => MessageKind::SetComment,
        }
    }
}

/// Outbound frame: correlation id plus the flattened request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub message: RequestMessage,
}

/// Inbound frame: correlation id, error state, flattened payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub message: ResponseMessage,
}

impl ResponseEnvelope {
    pub fn ok(id: u64, message: ResponseMessage) -> Self {
        Self {
            id,
            error_message: None,
            message,
        }
    }

    pub fn error(id: u64, message: ResponseMessage, error: impl Into<String>) -> Self {
        Self {
            id,
            error_message: Some(error.into()),
            message,
        }
    }

    /// Split into the error description (if non-empty) and the payload.
    pub fn into_parts(self) -> (Option<String>, ResponseMessage) {
        let error = self.error_message.filter(|e| !e.trim().is_empty());
        (error, self.message)
    }
}

/// Format an address the way it appears on the wire and in tool results.
pub fn format_address(addr: u64) -> String {
    format!("{addr:#x}")
}

/// Parse a base-16 address, with or without a `0x` prefix.
pub fn parse_hex_address(s: &str) -> Option<u64> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireAddress {
    Number(u64),
    Text(String),
}

impl WireAddress {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            WireAddress::Number(n) => Ok(n),
            WireAddress::Text(s) => parse_hex_address(&s)
                .ok_or_else(|| E::custom(format!("invalid hex address: {s}"))),
        }
    }
}

/// Addresses travel as `0x`-prefixed hex strings; integers are accepted on input.
mod hex_address {
    use super::*;

    pub fn serialize<S: Serializer>(addr: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_address(*addr))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        WireAddress::deserialize(d)?.into_u64()
    }
}

mod hex_address_opt {
    use super::*;

    pub fn serialize<S: Serializer>(addr: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
        match addr {
            Some(addr) => s.serialize_str(&format_address(*addr)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Option::<WireAddress>::deserialize(d)?
            .map(WireAddress::into_u64)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_carries_discriminant_and_hex_address() {
        let env = RequestEnvelope {
            id: 7,
            message: RequestMessage::GetDecompilation {
                address: Some(0x401000),
                function: None,
            },
        };
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["type"], "get_decompilation");
        assert_eq!(value["address"], "0x401000");
    }

    #[test]
    fn unit_requests_serialize_with_type_only() {
        let env = RequestEnvelope {
            id: 1,
            message: RequestMessage::GetFunctionCount {},
        };
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"id": 1, "type": "get_function_count"})
        );
    }

    #[test]
    fn response_decodes_integer_or_hex_address() {
        let from_int: ResponseEnvelope = serde_json::from_value(json!({
            "id": 3,
            "type": "get_decompilation",
            "function": "main",
            "function_signature": "int main(void)",
            "address": 4198400,
            "decompilation": "return 0;",
            "variables": [{"name": "local_8", "type": "int"}]
        }))
        .unwrap();
        let from_hex: ResponseEnvelope = serde_json::from_value(json!({
            "id": 3,
            "type": "get_decompilation",
            "address": "0x401000"
        }))
        .unwrap();
        match (from_int.message, from_hex.message) {
            (
                ResponseMessage::GetDecompilation {
                    address: a,
                    variables,
                    ..
                },
                ResponseMessage::GetDecompilation { address: b, .. },
            ) => {
                assert_eq!(a, 0x401000);
                assert_eq!(b, 0x401000);
                assert_eq!(variables[0].data_type.as_deref(), Some("int"));
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn error_reply_without_payload_decodes() {
        let env: ResponseEnvelope = serde_json::from_value(json!({
            "id": 9,
            "type": "get_references",
            "error_message": "Symbol not found"
        }))
        .unwrap();
        let (error, message) = env.into_parts();
        assert_eq!(error.as_deref(), Some("Symbol not found"));
        assert_eq!(message.kind(), MessageKind::GetReferences);
    }

    #[test]
    fn blank_error_message_is_success() {
        let env = ResponseEnvelope::error(1, ResponseMessage::SetComment {}, "  ");
        assert!(env.into_parts().0.is_none());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let res: Result<ResponseEnvelope, _> =
            serde_json::from_value(json!({"id": 1, "type": "launch_missiles"}));
        assert!(res.is_err());
    }

    #[test]
    fn parse_hex_accepts_optional_prefix() {
        assert_eq!(parse_hex_address("0x10"), Some(16));
        assert_eq!(parse_hex_address("deadbeef"), Some(0xdead_beef));
        assert_eq!(parse_hex_address("main"), None);
        assert_eq!(parse_hex_address("0x"), None);
    }
}
