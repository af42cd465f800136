// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use serde::{de::DeserializeOwned, Serialize};

use aba_common::config::CodecKind;

use crate::error::{Result, StorageError};

/// Serializes objects into entry payloads and back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Codec {
    kind: CodecKind,
}

impl Codec {
    pub fn new(kind: CodecKind) -> Self {
        Codec { kind }
    }

    pub fn json() -> Self {
        Codec::new(CodecKind::Json)
    }

    pub fn yaml() -> Self {
        Codec::new(CodecKind::Yaml)
    }

    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    pub fn encode<T: Serialize>(&self, object: &T) -> Result<Vec<u8>> {
        match self.kind {
            CodecKind::Json => serde_json::to_vec(object).map_err(|e| StorageError::Encode(e.to_string())),
            CodecKind::Yaml => serde_yaml::to_string(object)
                .map(String::into_bytes)
                .map_err(|e| StorageError::Encode(e.to_string())),
        }
    }

    /// Decode a payload. `name` identifies the entry in the error.
    pub fn decode<T: DeserializeOwned>(&self, name: &str, data: &[u8]) -> Result<T> {
        let decoded = match self.kind {
            CodecKind::Json => serde_json::from_slice(data).map_err(|e| e.to_string()),
            CodecKind::Yaml => serde_yaml::from_slice(data).map_err(|e| e.to_string()),
        };
        decoded.map_err(|message| StorageError::Decode {
            name: name.to_string(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        replicas: i32,
    }

    #[test]
    fn test_yaml_payload_is_text() {
        let encoded = Codec::yaml().encode(&Sample { replicas: 3 }).expect("encoded");
        assert_eq!(String::from_utf8(encoded).expect("utf8"), "replicas: 3\n");
    }

    #[test]
    fn test_decode_errors_name_the_entry() {
        let err = Codec::json()
            .decode::<Sample>("tidb-config-default-broken", b"{not json")
            .expect_err("garbage payload");

        assert!(matches!(err, StorageError::Decode { ref name, .. } if name == "tidb-config-default-broken"));
    }

    #[test]
    fn test_codecs_disagree_on_payloads() {
        let json = Codec::json().encode(&Sample { replicas: 1 }).expect("encoded");
        let decoded: Sample = Codec::yaml().decode("x", &json).expect("json is valid yaml");
        assert_eq!(decoded, Sample { replicas: 1 });

        let yaml = Codec::yaml().encode(&Sample { replicas: 1 }).expect("encoded");
        assert!(Codec::json().decode::<Sample>("x", &yaml).is_err());
    }
}
