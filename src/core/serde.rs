use serde::{Serialize, Deserialize, Serializer, Deserializer};
use std::time::Duration;

/// Serializes Duration as whole milliseconds
pub fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    millis.serialize(serializer)
}

/// Deserializes Duration from whole milliseconds
pub fn deserialize_duration_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// Serializes an extended (IEEE) address as a `0x`-prefixed hex string
///
/// JSON consumers lose precision on integers above 2^53, so 64-bit addresses
/// always leave the crate as strings.
pub fn serialize_ext_address<S>(addr: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    crate::util::format_ext_address(*addr).serialize(serializer)
}

/// Deserializes an extended address from its `0x`-prefixed hex form
pub fn deserialize_ext_address<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    crate::util::parse_ext_address(&text).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[test]
    fn test_duration_ms_serialization() {
        #[derive(Serialize, Deserialize)]
        struct Test {
            #[serde(serialize_with = "serialize_duration_ms")]
            #[serde(deserialize_with = "deserialize_duration_ms")]
            delay: Duration,
        }

        let original = Test {
            delay: Duration::from_millis(5000),
        };

        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(serialized, r#"{"delay":5000}"#);

        let deserialized: Test = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.delay, original.delay);
    }

    #[test]
    fn test_ext_address_serialization() {
        #[derive(Serialize, Deserialize)]
        struct Test {
            #[serde(serialize_with = "serialize_ext_address")]
            #[serde(deserialize_with = "deserialize_ext_address")]
            addr: u64,
        }

        let original = Test { addr: 0x00124B0008682C02 };
        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(serialized, r#"{"addr":"0x00124B0008682C02"}"#);

        let deserialized: Test = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.addr, original.addr);
    }
}
