use serde::{Deserialize, Deserializer};

/// Parses an Ethereum JSON-RPC quantity (`0x`-prefixed hex) into a `u64`.
pub(crate) fn parse_hex_u64(value: &str) -> Result<u64, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| format!("quantity {value:?} is missing the 0x prefix"))?;

    if digits.is_empty() {
        return Err(format!("quantity {value:?} has no digits"));
    }

    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity {value:?}: {e}"))
}

pub(crate) fn deserialize_hex_to_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_u64(&s).map_err(serde::de::Error::custom)
}

/// Cuts a response payload down to something that fits in a log line.
pub(crate) fn truncate_payload(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }

    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &body[..end], body.len())
}
