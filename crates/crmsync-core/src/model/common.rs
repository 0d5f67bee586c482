// ── Shared decoding helpers ──

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::error::CoreError;

/// Decode an envelope payload into a typed value.
///
/// `what` names the payload in the resulting error (e.g. `"presence"`).
pub fn decode_payload<T: DeserializeOwned>(
    what: &'static str,
    payload: &serde_json::Value,
) -> Result<T, CoreError> {
    T::deserialize(payload).map_err(|e| CoreError::Decode {
        what,
        message: e.to_string(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

/// Accept record ids sent either as strings or as integers.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Optional variant of [`deserialize_id`].
pub(crate) fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    }))
}
