use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{OracleError, OracleResult};

/// key: decrypted-payload
/// Validated contents of a decrypted blob. Lives only for the duration of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedPayload {
    pub key: String,
    pub deprecate_at: Option<DateTime<Utc>>,
}

/// Field layout of the decrypted document. Presence is tracked separately from
/// type so that `{"key": null}` and `{}` fail differently.
#[derive(Debug, Default, Deserialize)]
struct PayloadFields {
    #[serde(default, deserialize_with = "present")]
    key: Option<Value>,
    #[serde(default, deserialize_with = "present", alias = "deprecateAt")]
    deprecate_at: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Parses and checks decrypted bytes in order: document shape, `key`, then the
/// optional `deprecate_at` gate evaluated against `now`.
pub fn validate_payload(plaintext: &[u8], now: DateTime<Utc>) -> OracleResult<DecryptedPayload> {
    let document: Map<String, Value> =
        serde_json::from_slice(plaintext).map_err(|err| OracleError::InvalidPayloadFormat {
            line: err.line(),
            column: err.column(),
        })?;
    let fields: PayloadFields = serde_json::from_value(Value::Object(document))
        .map_err(|_| OracleError::InvalidPayloadFormat { line: 0, column: 0 })?;

    let key = match fields.key {
        None => return Err(OracleError::MissingKeyField),
        Some(Value::String(key)) => key,
        Some(_) => return Err(OracleError::InvalidKeyFieldType),
    };

    let deprecate_at = match fields.deprecate_at {
        None => None,
        Some(Value::String(raw)) => Some(
            DateTime::parse_from_rfc3339(&raw)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|_| OracleError::InvalidExpiryFormat)?,
        ),
        Some(_) => return Err(OracleError::InvalidExpiryFormat),
    };

    if let Some(deadline) = deprecate_at {
        if deadline < now {
            return Err(OracleError::KeyDeprecated(deadline));
        }
    }

    Ok(DecryptedPayload { key, deprecate_at })
}
