//! JSON bodies returned by the archive service.

use hd_core::HoardError;
use hd_core::HoardResult;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Identifiers arrive as strings from some deployments and numbers from others.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Text(String),
    Number(u64),
}

impl WireId {
    pub(crate) fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WhoAmIBody {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub hello: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenBody {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub txid: Option<WireId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttachmentBody {
    #[serde(default)]
    pub attachment_id: Option<WireId>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OkBody {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub document_id: Option<WireId>,
}

pub(crate) fn decode<T: DeserializeOwned>(endpoint: &str, bytes: &[u8]) -> HoardResult<T> {
    serde_json::from_slice(bytes).map_err(|error| {
        HoardError::new(
            "archive.protocol.malformed_json",
            format!("`{endpoint}` returned malformed JSON: {error}"),
        )
    })
}
