use crate::TelemetrySample;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The body a client receives in place of the sandbox's raw body: host
/// telemetry next to the sandbox's original status, headers and body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrappedResponse {
    #[serde(rename = "TotalMem")]
    pub total_mem: i64,
    #[serde(rename = "FreeMem")]
    pub free_mem: i64,
    #[serde(rename = "CPUUsage")]
    pub cpu_usage: f32,
    #[serde(rename = "ResponseHeader", default)]
    pub response_header: BTreeMap<String, Vec<String>>,
    #[serde(rename = "ResponseBody", with = "base64_body")]
    pub response_body: Vec<u8>,
    #[serde(rename = "ResponseCode")]
    pub response_code: u16,
}

impl WrappedResponse {
    pub fn new(
        sample: &TelemetrySample,
        headers: &[(String, String)],
        body: &[u8],
        status: u16,
    ) -> Self {
        Self {
            total_mem: sample.memory.total_kb,
            free_mem: sample.memory.free_kb,
            cpu_usage: sample.cpu_usage,
            response_header: header_map(headers),
            response_body: body.to_vec(),
            response_code: status,
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Serializes the envelope for a sandbox response. Pure: the same inputs
/// always produce the same bytes.
pub fn wrap(
    sample: &TelemetrySample,
    headers: &[(String, String)],
    body: &[u8],
    status: u16,
) -> serde_json::Result<Vec<u8>> {
    WrappedResponse::new(sample, headers, body, status).encode()
}

/// Groups header pairs by canonical name, keeping values in arrival order.
pub fn header_map(headers: &[(String, String)]) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        map.entry(canonical_header_key(name))
            .or_default()
            .push(value.clone());
    }
    map
}

/// `content-type` -> `Content-Type`. Names with characters outside the
/// token set are returned unchanged.
pub fn canonical_header_key(name: &str) -> String {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
    if !valid {
        return name.to_string();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

mod base64_body {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?;
        match encoded {
            Some(encoded) => STANDARD.decode(encoded).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStats;

    fn sample() -> TelemetrySample {
        TelemetrySample {
            memory: MemoryStats {
                total_kb: 2048,
                free_kb: 1024,
            },
            cpu_usage: 0.5,
        }
    }

    fn headers() -> Vec<(String, String)> {
        vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("x-trace".to_string(), "a".to_string()),
            ("X-Trace".to_string(), "b".to_string()),
        ]
    }

    #[test]
    fn test_canonical_header_key() {
        assert_eq!(canonical_header_key("content-type"), "Content-Type");
        assert_eq!(canonical_header_key("X-REQUESTED-WITH"), "X-Requested-With");
        assert_eq!(canonical_header_key("etag"), "Etag");
        assert_eq!(canonical_header_key("bad header"), "bad header");
    }

    #[test]
    fn test_header_map_merges_repeated_names_in_order() {
        let map = header_map(&headers());
        assert_eq!(map["Content-Type"], vec!["application/json"]);
        assert_eq!(map["X-Trace"], vec!["a", "b"]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_wire_field_names() {
        let bytes = wrap(&sample(), &headers(), b"{}", 200).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["TotalMem"], 2048);
        assert_eq!(json["FreeMem"], 1024);
        assert_eq!(json["CPUUsage"], 0.5);
        assert_eq!(json["ResponseCode"], 200);
        // byte bodies travel as base64
        assert_eq!(json["ResponseBody"], "e30=");
        assert_eq!(json["ResponseHeader"]["X-Trace"][1], "b");
    }

    #[test]
    fn test_envelope_decode_restores_response() {
        let body = vec![0u8, 159, 146, 150, b'{', b'}'];
        let bytes = wrap(&sample(), &headers(), &body, 503).unwrap();
        let decoded = WrappedResponse::decode(&bytes).unwrap();

        assert_eq!(decoded.response_header, header_map(&headers()));
        assert_eq!(decoded.response_body, body);
        assert_eq!(decoded.response_code, 503);
    }

    #[test]
    fn test_wrap_is_deterministic() {
        let first = wrap(&sample(), &headers(), b"payload", 200).unwrap();
        let second = wrap(&sample(), &headers(), b"payload", 200).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_accepts_null_body() {
        let raw = br#"{"TotalMem":-1,"FreeMem":-1,"CPUUsage":0,"ResponseHeader":{},"ResponseBody":null,"ResponseCode":204}"#;
        let decoded = WrappedResponse::decode(raw).unwrap();
        assert!(decoded.response_body.is_empty());
        assert_eq!(decoded.total_mem, -1);
    }
}
