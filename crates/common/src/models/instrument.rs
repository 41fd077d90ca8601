//! Per-observation instrument payloads held by the instrument data store

use super::{ObservationId, ProposalId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Primary key of an instrument payload.
///
/// The instrument store exchanges both ids as strings; numbers are accepted
/// on input as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadKey {
    #[serde(rename = "proposalID", with = "string_id")]
    pub proposal_id: ProposalId,

    #[serde(rename = "observationID", with = "string_id")]
    pub observation_id: ObservationId,
}

impl PayloadKey {
    pub fn new(proposal_id: ProposalId, observation_id: ObservationId) -> Self {
        Self {
            proposal_id,
            observation_id,
        }
    }
}

/// Opaque instrument configuration for one observation.
///
/// Only the primary key is interpreted; the rest of the document is carried
/// as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentPayload {
    #[serde(rename = "primaryKey")]
    pub primary_key: PayloadKey,

    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl InstrumentPayload {
    pub fn new(primary_key: PayloadKey, body: Map<String, Value>) -> Self {
        Self { primary_key, body }
    }

    /// Same payload re-keyed to another proposal/observation
    pub fn rekeyed(mut self, key: PayloadKey) -> Self {
        self.primary_key = key;
        self
    }
}

mod string_id {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(id: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Ok(n),
            RawId::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| de::Error::custom(format!("invalid numeric id: {:?}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_accepts_strings_and_numbers() {
        let payload: InstrumentPayload = serde_json::from_value(json!({
            "primaryKey": {"proposalID": "12", "observationID": 40},
            "telescopeName": "TBL",
            "instrumentName": "Neo-Narval",
            "choices": {"instrumentMode": "POL3 (polarimetry R:65000)"}
        }))
        .unwrap();

        assert_eq!(payload.primary_key, PayloadKey::new(12, 40));
        assert_eq!(payload.body["telescopeName"], "TBL");
    }

    #[test]
    fn test_rekeyed_keeps_body_and_writes_string_ids() {
        let mut body = Map::new();
        body.insert("telescopeName".to_string(), json!("TBL"));
        let payload = InstrumentPayload::new(PayloadKey::new(1, 2), body).rekeyed(PayloadKey::new(30, 41));

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["primaryKey"]["proposalID"], "30");
        assert_eq!(value["primaryKey"]["observationID"], "41");
        assert_eq!(value["telescopeName"], "TBL");
    }

    #[test]
    fn test_rejects_non_numeric_key() {
        let result: Result<InstrumentPayload, _> = serde_json::from_value(json!({
            "primaryKey": {"proposalID": "abc", "observationID": "1"}
        }));
        assert!(result.is_err());
    }
}
