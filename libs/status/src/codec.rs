//! Payload codecs for status channels.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::CodecError;

/// Encoding used for status payloads on the wire and in the status store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// UTF-8 JSON documents.
    #[default]
    Json,
    /// MessagePack maps with named fields.
    MsgPack,
}

impl Codec {
    /// Short name of the codec.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::MsgPack => "msgpack",
        }
    }

    /// Encodes a value.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let encoded = match self {
            Codec::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
            Codec::MsgPack => rmp_serde::to_vec_named(value).map_err(|e| e.to_string()),
        };
        encoded.map_err(|reason| CodecError::Encode {
            codec: self.name(),
            reason,
        })
    }

    /// Decodes a value. Trailing whitespace after a JSON document is allowed.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError> {
        let decoded = match self {
            Codec::Json => serde_json::from_slice(data).map_err(|e| e.to_string()),
            Codec::MsgPack => rmp_serde::from_slice(data).map_err(|e| e.to_string()),
        };
        decoded.map_err(|reason| CodecError::Decode {
            codec: self.name(),
            reason,
        })
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Codec {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Codec::Json),
            "msgpack" | "messagepack" => Ok(Codec::MsgPack),
            other => Err(CodecError::UnknownCodec(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeviceDetails, DeviceStatus, TaskStatus, Variant};
    use rackwatch_id::{RackKey, TaskKey};
    use rstest::rstest;

    #[rstest]
    #[case(Codec::Json)]
    #[case(Codec::MsgPack)]
    fn test_device_status_survives_codec(#[case] codec: Codec) {
        let status = DeviceStatus::new(
            "dev1",
            Variant::Error,
            "Device error state",
            DeviceDetails {
                rack: RackKey::from_raw(65537),
                device: "dev1".into(),
            },
        );
        let bytes = codec.encode(&status).unwrap();
        let decoded: DeviceStatus = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, status);
    }

    #[test]
    fn test_json_decode_tolerates_trailing_newline() {
        let mut bytes = Codec::Json
            .encode(&TaskStatus::unknown(TaskKey::from_raw(1)))
            .unwrap();
        bytes.push(b'\n');
        let decoded: TaskStatus = Codec::Json.decode(&bytes).unwrap();
        assert_eq!(decoded.details.task, TaskKey::from_raw(1));
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = Codec::Json.decode::<TaskStatus>(b"not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode { codec: "json", .. }));
    }

    #[test]
    fn test_codec_from_str() {
        assert_eq!("JSON".parse::<Codec>().unwrap(), Codec::Json);
        assert_eq!("msgpack".parse::<Codec>().unwrap(), Codec::MsgPack);
        assert!(matches!(
            "xml".parse::<Codec>(),
            Err(CodecError::UnknownCodec(_))
        ));
    }
}
