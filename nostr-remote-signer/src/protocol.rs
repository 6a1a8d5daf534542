//! Wire protocol for remote signer communication.
//!
//! Messages are JSON objects. A request is `{id, type, params?}` and the
//! matching response is `{id, result}` or `{id, error}`, never both.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use nostr_secp::EventTemplate;

/// Request `type` strings understood by the signer.
pub mod methods {
    pub const GET_PUBLIC_KEY: &str = "getPublicKey";
    pub const SIGN_EVENT: &str = "signEvent";
    pub const GET_RELAYS: &str = "getRelays";
    pub const NIP04_ENCRYPT: &str = "nip04.encrypt";
    pub const NIP04_DECRYPT: &str = "nip04.decrypt";
    pub const NIP44_ENCRYPT: &str = "nip44.encrypt";
    pub const NIP44_DECRYPT: &str = "nip44.decrypt";
}

/// A request as it travels over the channel.
///
/// `method` is kept as a string so that unknown types still reach the
/// dispatcher and get an "Unsupported method" reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id chosen by the sender, echoed in the response
    pub id: String,
    #[serde(rename = "type")]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: impl Into<String>, method: &Method) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: id.into(),
            method: method.name().to_string(),
            params: method.params()?,
        })
    }

    /// Shape an inbound message into a request.
    ///
    /// Returns `None` unless `data` is an object with non-empty string `id`
    /// and `type` fields; the channel may carry unrelated traffic.
    pub fn from_message(data: &Value) -> Option<Self> {
        let object = data.as_object()?;
        let id = object.get("id")?.as_str().filter(|s| !s.is_empty())?;
        let method = object.get("type")?.as_str().filter(|s| !s.is_empty())?;
        let params = object.get("params").filter(|p| !p.is_null()).cloned();

        Some(Self {
            id: id.to_string(),
            method: method.to_string(),
            params,
        })
    }
}

/// Params for `nip04.encrypt` / `nip44.encrypt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptParams {
    /// Counterparty public key, hex
    pub pubkey: String,
    pub plaintext: String,
}

/// Params for `nip04.decrypt` / `nip44.decrypt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptParams {
    /// Counterparty public key, hex
    pub pubkey: String,
    pub ciphertext: String,
}

/// The closed set of operations, with typed params.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    GetPublicKey,
    SignEvent(EventTemplate),
    GetRelays,
    Nip04Encrypt(EncryptParams),
    Nip04Decrypt(DecryptParams),
    Nip44Encrypt(EncryptParams),
    Nip44Decrypt(DecryptParams),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MethodError {
    #[error("Unsupported method")]
    Unsupported(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::GetPublicKey => methods::GET_PUBLIC_KEY,
            Method::SignEvent(_) => methods::SIGN_EVENT,
            Method::GetRelays => methods::GET_RELAYS,
            Method::Nip04Encrypt(_) => methods::NIP04_ENCRYPT,
            Method::Nip04Decrypt(_) => methods::NIP04_DECRYPT,
            Method::Nip44Encrypt(_) => methods::NIP44_ENCRYPT,
            Method::Nip44Decrypt(_) => methods::NIP44_DECRYPT,
        }
    }

    pub fn params(&self) -> Result<Option<Value>, serde_json::Error> {
        let params = match self {
            Method::GetPublicKey | Method::GetRelays => return Ok(None),
            Method::SignEvent(template) => serde_json::to_value(template)?,
            Method::Nip04Encrypt(p) | Method::Nip44Encrypt(p) => serde_json::to_value(p)?,
            Method::Nip04Decrypt(p) | Method::Nip44Decrypt(p) => serde_json::to_value(p)?,
        };
        Ok(Some(params))
    }

    /// Resolve a wire `type` and its params into a typed method.
    pub fn parse(name: &str, params: Option<&Value>) -> Result<Self, MethodError> {
        match name {
            methods::GET_PUBLIC_KEY => Ok(Method::GetPublicKey),
            methods::GET_RELAYS => Ok(Method::GetRelays),
            methods::SIGN_EVENT => decode_params(params).map(Method::SignEvent),
            methods::NIP04_ENCRYPT => decode_params(params).map(Method::Nip04Encrypt),
            methods::NIP04_DECRYPT => decode_params(params).map(Method::Nip04Decrypt),
            methods::NIP44_ENCRYPT => decode_params(params).map(Method::Nip44Encrypt),
            methods::NIP44_DECRYPT => decode_params(params).map(Method::Nip44Decrypt),
            other => Err(MethodError::Unsupported(other.to_string())),
        }
    }
}

fn decode_params<T: serde::de::DeserializeOwned>(params: Option<&Value>) -> Result<T, MethodError> {
    let params = params.ok_or_else(|| MethodError::InvalidParams("missing params".to_string()))?;
    T::deserialize(params).map_err(|e| MethodError::InvalidParams(e.to_string()))
}

/// Response to a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireResponse", try_from = "WireResponse")]
pub struct Response {
    /// Echo of the request id
    pub id: String,
    /// Success payload or human-readable failure
    pub outcome: Result<Value, String>,
}

impl Response {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            outcome: Ok(result),
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            outcome: Err(message.into()),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.outcome.as_ref().err().map(String::as_str)
    }
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<Response> for WireResponse {
    fn from(response: Response) -> Self {
        match response.outcome {
            Ok(result) => WireResponse {
                id: response.id,
                result: Some(result),
                error: None,
            },
            Err(error) => WireResponse {
                id: response.id,
                result: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<WireResponse> for Response {
    type Error = String;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        let outcome = match (wire.result, wire.error) {
            (Some(result), None) => Ok(result),
            (None, Some(error)) => Err(error),
            (Some(_), Some(_)) => return Err("response has both result and error".to_string()),
            (None, None) => return Err("response has neither result nor error".to_string()),
        };
        Ok(Response {
            id: wire.id,
            outcome,
        })
    }
}
