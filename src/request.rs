//! Ledger-agnostic request/response types (spec §3).

use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// A normalised cross-chain request decoded from a source-chain event.
///
/// `id` is immutable and non-empty for the lifetime of the request; it is
/// the source ledger's request identifier (typically a 32-byte hash,
/// hex-encoded without a `0x` prefix once normalised).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterchainRequest {
    pub id: String,
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub dest_sub_chain_id: String,
    pub dest_chain_type: String,
    pub endpoint_address: String,
    pub endpoint_type: String,
    pub method: String,
    #[serde(with = "hex_bytes")]
    pub call_data: Vec<u8>,
    pub sender: String,
    pub tx_hash: String,
}

/// The JSON sub-structure embedded in a cross-chain request event
/// (spec §6 `endpoint_info`).
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointInfo {
    pub dest_chain_id: String,
    pub dest_sub_chain_id: String,
    pub dest_chain_type: String,
    pub endpoint_address: String,
    pub endpoint_type: String,
}

/// Hub-side identifiers returned from a successful submission (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterchainRequestInfo {
    pub hub_req_tx_id: String,
    pub ic_request_id: String,
}

/// A response delivered by the hub for a previously submitted request
/// (spec §3). `status_code` is always 200 once the hub has delivered a
/// response; `output` may itself carry a provider-side error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseAdaptor {
    pub status_code: u16,
    pub result: String,
    pub output: String,
    pub ic_request_id: String,
}

impl ResponseAdaptor {
    /// Whether the provider's `output` carries an error rather than a payload.
    ///
    /// The wire format gives no dedicated error field for provider-side
    /// failures (spec §3): by convention an empty `result` field or a
    /// non-success `result` code indicates the provider returned an error
    /// message in `output` instead of a normal payload.
    pub fn is_error(&self) -> bool {
        !self.result.eq_ignore_ascii_case("ok") && !self.result.is_empty()
    }
}

/// Normalises an event's raw `call_data` field into bytes.
///
/// Per spec §4.2, tries in order: hex decoding (`0x`-prefix accepted), then
/// base64, then the input is treated as already-raw bytes. The first
/// decoding that succeeds wins.
pub fn normalise_call_data(raw: &[u8]) -> Vec<u8> {
    if let Ok(s) = std::str::from_utf8(raw) {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        if let Ok(bytes) = hex::decode(trimmed) {
            return bytes;
        }
        if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(s) {
            return bytes;
        }
    }
    raw.to_vec()
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let trimmed = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(trimmed).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalise_prefers_hex_with_0x_prefix() {
        let input = b"0x1234";
        assert_eq!(normalise_call_data(input), vec![0x12, 0x34]);
    }

    #[test]
    fn normalise_prefers_hex_without_prefix() {
        let input = b"abcd";
        assert_eq!(normalise_call_data(input), vec![0xab, 0xcd]);
    }

    #[test]
    fn normalise_falls_back_to_base64() {
        // "not-hex!" is not valid hex (odd length, non-hex chars) but is valid base64.
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"hello world");
        let decoded = normalise_call_data(encoded.as_bytes());
        assert_eq!(decoded, b"hello world");
    }

    #[test]
    fn normalise_falls_back_to_raw_bytes() {
        // Not valid hex, not valid base64 (invalid padding/alphabet) -> raw.
        let input = vec![0xff, 0x00, 0xfe, 0x01];
        assert_eq!(normalise_call_data(&input), input);
    }

    #[test]
    fn normalise_reencodes_to_canonical_hex_independent_of_input_encoding() {
        let via_hex = normalise_call_data(b"0xdeadbeef");
        let encoded_b64 = base64::engine::general_purpose::STANDARD.encode([0xde, 0xad, 0xbe, 0xef]);
        let via_b64 = normalise_call_data(encoded_b64.as_bytes());
        assert_eq!(hex::encode(&via_hex), hex::encode(&via_b64));
    }

    #[test]
    fn response_adaptor_detects_provider_error() {
        let resp = ResponseAdaptor {
            status_code: 200,
            result: "error".to_string(),
            output: "insufficient funds".to_string(),
            ic_request_id: "ic-1".to_string(),
        };
        assert!(resp.is_error());

        let ok = ResponseAdaptor {
            status_code: 200,
            result: "ok".to_string(),
            output: "42".to_string(),
            ic_request_id: "ic-1".to_string(),
        };
        assert!(!ok.is_error());
    }
}
