//! Feed payloads.
//!
//! All payloads are JSON objects. A verdict may also be a bare integer
//! action code (`1`); no other shape is accepted.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tapgate_core::{CardPass, CardUid};
use uuid::Uuid;

use crate::error::{ProtocolError, Result};

fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// The authority's decision on a check request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub enum Verdict {
    Denied,
    Granted,
    CheckedOut,
}

impl Verdict {
    /// Wire action code.
    pub fn code(&self) -> u8 {
        match self {
            Verdict::Denied => 0,
            Verdict::Granted => 1,
            Verdict::CheckedOut => 2,
        }
    }
}

impl TryFrom<i64> for Verdict {
    type Error = ProtocolError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Verdict::Denied),
            1 => Ok(Verdict::Granted),
            2 => Ok(Verdict::CheckedOut),
            other => Err(ProtocolError::UnknownAction(other)),
        }
    }
}

impl From<Verdict> for u8 {
    fn from(verdict: Verdict) -> Self {
        verdict.code()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Verdict::Denied => write!(f, "denied"),
            Verdict::Granted => write!(f, "granted"),
            Verdict::CheckedOut => write!(f, "checked_out"),
        }
    }
}

/// User reference attached to a verdict: numeric id or name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(u64),
    Name(String),
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UserRef::Id(id) => write!(f, "{id}"),
            UserRef::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Check request published on `scanner.checkcard`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Card UID as dot-separated decimal bytes, e.g. `4.171.205.239`.
    /// Older scanners wrapped it in brackets; the authority matches on the
    /// bare form.
    pub uid: String,
    pub pass: String,
    /// Identity of the requesting scanner.
    pub ip: String,
    pub request_id: Uuid,
}

impl CheckRequest {
    /// Build a request with a fresh correlation id.
    pub fn new(uid: &CardUid, pass: &CardPass, ip: impl Into<String>) -> Self {
        Self {
            uid: uid.to_dotted(),
            pass: pass.as_str().to_string(),
            ip: ip.into(),
            request_id: Uuid::new_v4(),
        }
    }

    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    pub fn to_payload(&self) -> Result<Bytes> {
        encode(self)
    }

    /// # Errors
    /// Returns `ProtocolError::Malformed` for anything but a check request object.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl fmt::Debug for CheckRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRequest")
            .field("uid", &self.uid)
            .field("pass", &"******")
            .field("ip", &self.ip)
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// Verdict published on `scanner.action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMessage {
    pub action: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    /// Door to open on a grant; the scanner's own door when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub door_ip: Option<String>,
    /// Echo of the request's correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl ActionMessage {
    pub fn new(action: Verdict) -> Self {
        Self {
            action,
            user: None,
            door_ip: None,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_user(mut self, user: UserRef) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_door_ip(mut self, door_ip: impl Into<String>) -> Self {
        self.door_ip = Some(door_ip.into());
        self
    }

    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    pub fn to_payload(&self) -> Result<Bytes> {
        encode(self)
    }

    /// Parse a verdict in any accepted shape.
    ///
    /// ```
    /// use tapgate_protocol::{ActionMessage, Verdict};
    ///
    /// assert_eq!(ActionMessage::parse(b"1").unwrap().action, Verdict::Granted);
    /// assert_eq!(
    ///     ActionMessage::parse(br#"{"action":2,"user":"ann"}"#).unwrap().action,
    ///     Verdict::CheckedOut
    /// );
    /// assert!(ActionMessage::parse(b"7").is_err());
    /// ```
    ///
    /// # Errors
    /// `ProtocolError::UnknownAction` for an action code outside 0-2,
    /// `ProtocolError::Malformed` for anything else that is not a verdict.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload)?;
        Self::from_value(value)
    }

    /// The `request_id` a verdict payload echoes, read without validating
    /// the rest of the payload.
    ///
    /// ```
    /// use tapgate_protocol::ActionMessage;
    ///
    /// let payload = br#"{"action":7,"request_id":"67e55044-10b1-426f-9247-bb680e5fe0c8"}"#;
    /// assert!(ActionMessage::echoed_request_id(payload).is_some());
    /// assert!(ActionMessage::echoed_request_id(b"1").is_none());
    /// ```
    pub fn echoed_request_id(payload: &[u8]) -> Option<Uuid> {
        let value: Value = serde_json::from_slice(payload).ok()?;
        value
            .get("request_id")
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Number(code) => {
                let code = code
                    .as_i64()
                    .ok_or_else(|| ProtocolError::Malformed(format!("action code {code}")))?;
                Ok(Self::new(Verdict::try_from(code)?))
            }
            Value::Object(fields) => Self::from_fields(fields),
            other => Err(ProtocolError::Malformed(format!(
                "expected an action object, got {other}"
            ))),
        }
    }

    fn from_fields(mut fields: Map<String, Value>) -> Result<Self> {
        let code = match fields.remove("action") {
            Some(Value::Number(code)) => code.as_i64(),
            _ => None,
        }
        .ok_or_else(|| ProtocolError::Malformed("missing integer action field".to_string()))?;

        let user = match fields.remove("user") {
            None | Some(Value::Null) => None,
            Some(user) => Some(serde_json::from_value(user)?),
        };
        let door_ip = match fields.remove("door_ip") {
            Some(Value::String(ip)) => Some(ip),
            _ => None,
        };
        let request_id = match fields.remove("request_id") {
            None | Some(Value::Null) => None,
            Some(id) => Some(serde_json::from_value(id)?),
        };

        Ok(Self {
            action: Verdict::try_from(code)?,
            user,
            door_ip,
            request_id,
        })
    }
}

/// Lock release trigger published on `lock.open`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOpen {
    pub door_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl LockOpen {
    pub fn new(door_ip: impl Into<String>) -> Self {
        Self {
            door_ip: door_ip.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    pub fn to_payload(&self) -> Result<Bytes> {
        encode(self)
    }

    /// Parse a trigger: a JSON object, or the bare door address as older
    /// scanners send it.
    ///
    /// # Errors
    /// Returns `ProtocolError::Malformed` for an empty or non-UTF-8 payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(_)) => Ok(serde_json::from_slice(payload)?),
            Ok(Value::String(ip)) => Self::from_address(&ip),
            _ => {
                let text = std::str::from_utf8(payload)
                    .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
                Self::from_address(text)
            }
        }
    }

    fn from_address(text: &str) -> Result<Self> {
        let ip = text.trim();
        if ip.is_empty() {
            return Err(ProtocolError::Malformed("empty door address".to_string()));
        }
        Ok(Self::new(ip))
    }

    pub fn is_for(&self, door_ip: &str) -> bool {
        self.door_ip == door_ip
    }
}

/// Registration of a freshly provisioned card, published on
/// `scanner.setcardpass`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRegistration {
    pub uid: String,
    pub pass: String,
    pub user: String,
}

impl CardRegistration {
    pub fn new(uid: &CardUid, pass: &CardPass, user: impl Into<String>) -> Self {
        Self {
            uid: uid.to_dotted(),
            pass: pass.as_str().to_string(),
            user: user.into(),
        }
    }

    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    pub fn to_payload(&self) -> Result<Bytes> {
        encode(self)
    }

    /// # Errors
    /// Returns `ProtocolError::Malformed` for anything but a registration object.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl fmt::Debug for CardRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardRegistration")
            .field("uid", &self.uid)
            .field("pass", &"******")
            .field("user", &self.user)
            .finish()
    }
}

/// Door contact position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DoorState {
    Closed,
    Open,
}

impl DoorState {
    pub fn code(&self) -> u8 {
        match self {
            DoorState::Closed => 1,
            DoorState::Open => 2,
        }
    }
}

impl From<bool> for DoorState {
    fn from(open: bool) -> Self {
        if open { DoorState::Open } else { DoorState::Closed }
    }
}

impl TryFrom<u8> for DoorState {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(DoorState::Closed),
            2 => Ok(DoorState::Open),
            other => Err(ProtocolError::Malformed(format!("door status {other}"))),
        }
    }
}

impl From<DoorState> for u8 {
    fn from(state: DoorState) -> Self {
        state.code()
    }
}

/// Door contact report published on `lock.status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorStatus {
    pub door_ip: String,
    pub status: DoorState,
}

impl DoorStatus {
    pub fn new(door_ip: impl Into<String>, status: DoorState) -> Self {
        Self {
            door_ip: door_ip.into(),
            status,
        }
    }

    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    pub fn to_payload(&self) -> Result<Bytes> {
        encode(self)
    }

    /// # Errors
    /// Returns `ProtocolError::Malformed` for anything but a status object.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn uid() -> CardUid {
        CardUid::new(vec![1, 2, 3, 4]).unwrap()
    }

    #[test]
    fn test_check_request_payload() {
        let pass = CardPass::new("abc").unwrap();
        let request = CheckRequest::new(&uid(), &pass, "10.0.0.7");

        let json: Value = serde_json::from_slice(&request.to_payload().unwrap()).unwrap();
        assert_eq!(json["uid"], "1.2.3.4");
        assert_eq!(json["pass"], "abc");
        assert_eq!(json["ip"], "10.0.0.7");
        assert_eq!(json["request_id"], request.request_id.to_string());

        let parsed = CheckRequest::parse(&request.to_payload().unwrap()).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_check_request_ids_are_fresh() {
        let pass = CardPass::new("abc").unwrap();
        let a = CheckRequest::new(&uid(), &pass, "ip");
        let b = CheckRequest::new(&uid(), &pass, "ip");
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_check_request_debug_hides_pass() {
        let pass = CardPass::new("hunter2").unwrap();
        let request = CheckRequest::new(&uid(), &pass, "ip");
        assert!(!format!("{request:?}").contains("hunter2"));
    }

    #[rstest]
    #[case(b"0".as_slice(), Verdict::Denied)]
    #[case(b"1".as_slice(), Verdict::Granted)]
    #[case(b" 2 ".as_slice(), Verdict::CheckedOut)]
    #[case(br#"{"action":1}"#.as_slice(), Verdict::Granted)]
    #[case(br#"{"action":2,"user":0}"#.as_slice(), Verdict::CheckedOut)]
    fn test_action_shapes(#[case] payload: &[u8], #[case] expected: Verdict) {
        assert_eq!(ActionMessage::parse(payload).unwrap().action, expected);
    }

    #[rstest]
    #[case(b"3".as_slice())]
    #[case(b"-1".as_slice())]
    #[case(br#"{"action":9}"#.as_slice())]
    fn test_unknown_action_code(#[case] payload: &[u8]) {
        assert!(matches!(
            ActionMessage::parse(payload),
            Err(ProtocolError::UnknownAction(_))
        ));
    }

    #[rstest]
    #[case(b"".as_slice())]
    #[case(b"granted".as_slice())]
    #[case(br#"{"user":"ann"}"#.as_slice())]
    #[case(br#"[1]"#.as_slice())]
    #[case(br#"{"action":1,"request_id":"not-a-uuid"}"#.as_slice())]
    #[case(br#""{\"action\":1}""#.as_slice())]
    #[case(br#"{"action":"1"}"#.as_slice())]
    #[case(br#""1""#.as_slice())]
    fn test_malformed_action(#[case] payload: &[u8]) {
        assert!(matches!(
            ActionMessage::parse(payload),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_action_message_full_roundtrip() {
        let id = Uuid::new_v4();
        let message = ActionMessage::new(Verdict::Granted)
            .with_user(UserRef::Name("ann".into()))
            .with_door_ip("10.0.0.9")
            .with_request_id(id);

        let parsed = ActionMessage::parse(&message.to_payload().unwrap()).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_echoed_request_id_survives_bad_action() {
        let id = Uuid::new_v4();
        let payload = format!(r#"{{"action":7,"request_id":"{id}"}}"#);
        assert!(ActionMessage::parse(payload.as_bytes()).is_err());
        assert_eq!(ActionMessage::echoed_request_id(payload.as_bytes()), Some(id));

        assert_eq!(ActionMessage::echoed_request_id(br#"{"action":1}"#), None);
        assert_eq!(ActionMessage::echoed_request_id(b"not json"), None);
    }

    #[test]
    fn test_action_payload_omits_absent_fields() {
        let payload = ActionMessage::new(Verdict::Denied).to_payload().unwrap();
        assert_eq!(&payload[..], br#"{"action":0}"#);
    }

    #[rstest]
    #[case(br#"{"door_ip":"10.0.0.9"}"#.as_slice())]
    #[case(br#""10.0.0.9""#.as_slice())]
    #[case(b"10.0.0.9".as_slice())]
    #[case(b" 10.0.0.9\n".as_slice())]
    fn test_lock_open_shapes(#[case] payload: &[u8]) {
        let trigger = LockOpen::parse(payload).unwrap();
        assert!(trigger.is_for("10.0.0.9"));
        assert!(!trigger.is_for("10.0.0.1"));
    }

    #[test]
    fn test_lock_open_rejects_empty() {
        assert!(LockOpen::parse(b"  ").is_err());
    }

    #[test]
    fn test_door_status_codes() {
        let status = DoorStatus::new("10.0.0.9", DoorState::from(true));
        let json: Value = serde_json::from_slice(&status.to_payload().unwrap()).unwrap();
        assert_eq!(json["status"], 2);
        let parsed = DoorStatus::parse(br#"{"door_ip":"x","status":1}"#).unwrap();
        assert_eq!(parsed.status, DoorState::Closed);
        assert!(DoorStatus::parse(br#"{"door_ip":"x","status":3}"#).is_err());
    }

    #[test]
    fn test_card_registration_payload() {
        let pass = CardPass::new("abc").unwrap();
        let registration = CardRegistration::new(&uid(), &pass, "ann");
        let json: Value = serde_json::from_slice(&registration.to_payload().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"uid": "1.2.3.4", "pass": "abc", "user": "ann"}));
        assert!(!format!("{registration:?}").contains("abc"));
    }

    proptest! {
        #[test]
        fn prop_action_parse_never_panics(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = ActionMessage::parse(&payload);
        }

        #[test]
        fn prop_verdict_code_roundtrip(code in 0i64..3) {
            let verdict = Verdict::try_from(code).unwrap();
            prop_assert_eq!(i64::from(verdict.code()), code);
        }
    }
}
