//! Export/import encoding.
//!
//! A bincode-encoded envelope holding a format version and the ordered list
//! of fact property maps. Index state is not part of it.

use serde::{Deserialize, Serialize};

use crate::error::{FactbaseError, Result};
use crate::fact::Props;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    facts: Vec<Props>,
}

pub(crate) fn encode(facts: Vec<Props>) -> Result<Vec<u8>> {
    let envelope = Envelope {
        version: FORMAT_VERSION,
        facts,
    };
    Ok(bincode::serialize(&envelope)?)
}

/// Decode and validate every fact; nothing is returned unless all are valid.
pub(crate) fn decode(bytes: &[u8]) -> Result<Vec<Props>> {
    if bytes.is_empty() {
        return Err(FactbaseError::Invariant("empty input".to_string()));
    }
    let envelope: Envelope = bincode::deserialize(bytes)?;
    if envelope.version != FORMAT_VERSION {
        return Err(FactbaseError::Invariant(format!(
            "unsupported export format version {}",
            envelope.version
        )));
    }
    for props in &envelope.facts {
        props.validate()?;
    }
    Ok(envelope.facts.into_iter().map(Props::normalized).collect())
}
