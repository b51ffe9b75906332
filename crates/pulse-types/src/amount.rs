//! Decimal-string serde for unbounded integers.
//!
//! Balances, amounts, and fees are [`BigUint`]s in memory but cross the JSON
//! boundary as decimal strings, so arbitrary precision survives parsers that
//! truncate large numbers to floats.

use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_str_radix(10))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    text.parse::<BigUint>()
        .map_err(|e| de::Error::custom(format!("invalid decimal integer {text:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrapper {
        #[serde(with = "super")]
        value: BigUint,
    }

    #[test]
    fn serializes_as_decimal_string() {
        let wrapper = Wrapper {
            value: BigUint::from(1_000_000_000u64),
        };
        assert_eq!(
            serde_json::to_string(&wrapper).unwrap(),
            r#"{"value":"1000000000"}"#
        );
    }

    #[test]
    fn survives_values_beyond_u64() {
        let big = "340282366920938463463374607431768211456"; // 2^128
        let wrapper: Wrapper = serde_json::from_str(&format!(r#"{{"value":"{big}"}}"#)).unwrap();
        assert_eq!(wrapper.value.to_str_radix(10), big);
    }

    #[test]
    fn rejects_non_numeric_strings() {
        assert!(serde_json::from_str::<Wrapper>(r#"{"value":"12abc"}"#).is_err());
    }
}
