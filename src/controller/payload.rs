//! Payload normalization for inbound controller messages
//!
//! Every message that reaches the play loop, whether it came from the MQTT broker
//! or from the debug input, passes through [`normalize`]. The result is a fully
//! populated [`ControllerEvent`] so nothing downstream ever re-inspects raw JSON.
//!
//! # Accepted shapes
//!
//! ```text
//! {"event":"connect","id":"AA:BB:CC:DD:EE:10"}   -> Connect, source = hardware address
//! {"event":"run"}                                -> Run impulse
//! {"button":"RIGHT","step":4}                    -> Move, button = "right"
//! {"x":1.5,"y":-2}                               -> Move, axis displacement
//! up                                             -> Move, button = "up" (plain text)
//! ```

use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Displacement applied per discrete button press when the payload carries no `step`
pub const DEFAULT_STEP: f64 = 6.0;

/// What a normalized message asks the system to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventKind {
    /// Pair the sending controller with the active drawing
    Connect,
    /// Directional input or displacement
    Move,
    /// Shake impulse without direction
    Run,
    #[default]
    Unknown,
}

impl EventKind {
    /// Whether this event can advance a racer
    pub fn is_impulse(&self) -> bool {
        matches!(self, EventKind::Move | EventKind::Run)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EventKind::Connect => write!(f, "connect"),
            EventKind::Move => write!(f, "move"),
            EventKind::Run => write!(f, "run"),
            EventKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Continuous displacement, both components optional
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Axis {
    pub dx: Option<f64>,
    pub dy: Option<f64>,
}

impl Axis {
    pub fn is_empty(&self) -> bool {
        self.dx.is_none() && self.dy.is_none()
    }
}

/// Canonical form of any inbound controller message
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerEvent {
    /// Original payload text, kept for diagnostics
    pub raw: String,
    /// Controller identity: upper-cased hardware address, or the topic hint
    pub source_id: Option<String>,
    pub kind: EventKind,
    pub axis: Axis,
    /// Lower-cased direction/action token
    pub button: Option<String>,
    pub step: f64,
    /// Trailing topic segment, e.g. `player2`
    pub topic_hint: Option<String>,
}

impl ControllerEvent {
    /// Key used by the race impulse gate to detect press edges
    pub fn impulse_key(&self) -> String {
        match (&self.button, self.kind) {
            (Some(button), _) if !button.is_empty() => button.clone(),
            (_, EventKind::Run) => "run".to_string(),
            _ => "axis".to_string(),
        }
    }
}

/// Turns an opaque payload and its topic into a [`ControllerEvent`]. Never fails.
pub fn normalize(raw_bytes: &[u8], topic: &str) -> ControllerEvent {
    let raw = String::from_utf8_lossy(raw_bytes).into_owned();
    let topic_hint = topic_hint(topic);

    let event = match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(fields)) => from_fields(raw, &fields, topic_hint),
        _ => from_text(raw, topic_hint),
    };

    debug!(
        "Normalized payload on '{}' -> kind={} source={:?} button={:?}",
        topic, event.kind, event.source_id, event.button
    );
    event
}

fn from_fields(
    raw: String,
    fields: &Map<String, Value>,
    topic_hint: Option<String>,
) -> ControllerEvent {
    let number = |primary: &str, alias: &str| {
        fields
            .get(primary)
            .and_then(Value::as_f64)
            .or_else(|| fields.get(alias).and_then(Value::as_f64))
    };
    let text = |primary: &str, alias: &str| {
        fields
            .get(primary)
            .and_then(Value::as_str)
            .or_else(|| fields.get(alias).and_then(Value::as_str))
    };

    let axis = Axis {
        dx: number("dx", "x"),
        dy: number("dy", "y"),
    };
    let button = text("button", "key").map(str::to_lowercase);
    let step = fields
        .get("step")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_STEP);

    let kind = match fields.get("event").and_then(Value::as_str) {
        Some("connect") => EventKind::Connect,
        Some("run") => EventKind::Run,
        _ if button.is_some() || !axis.is_empty() => EventKind::Move,
        _ => EventKind::Unknown,
    };

    let identity = fields.get("id").and_then(Value::as_str);
    let source_id = resolve_source_id(identity, topic_hint.as_deref());

    ControllerEvent {
        raw,
        source_id,
        kind,
        axis,
        button,
        step,
        topic_hint,
    }
}

fn from_text(raw: String, topic_hint: Option<String>) -> ControllerEvent {
    let token = raw.trim().to_lowercase();
    let kind = if token.is_empty() {
        EventKind::Unknown
    } else {
        EventKind::Move
    };
    let source_id = resolve_source_id(None, topic_hint.as_deref());

    ControllerEvent {
        raw,
        source_id,
        kind,
        axis: Axis::default(),
        button: Some(token),
        step: DEFAULT_STEP,
        topic_hint,
    }
}

fn topic_hint(topic: &str) -> Option<String> {
    topic
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn resolve_source_id(identity: Option<&str>, topic_hint: Option<&str>) -> Option<String> {
    match identity {
        Some(id) if looks_like_hardware_address(id) => Some(id.trim().to_uppercase()),
        _ => topic_hint.map(str::to_string),
    }
}

/// True when `candidate` contains a colon-delimited byte group such as `EE:10`
pub fn looks_like_hardware_address(candidate: &str) -> bool {
    candidate.as_bytes().windows(5).any(|w| {
        w[0].is_ascii_hexdigit()
            && w[1].is_ascii_hexdigit()
            && w[2] == b':'
            && w[3].is_ascii_hexdigit()
            && w[4].is_ascii_hexdigit()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn connect_with_hardware_address() {
        let event = normalize(
            br#"{"event":"connect","id":"aa:bb:cc:dd:ee:10"}"#,
            "dorosupi/controller",
        );
        assert_eq!(event.kind, EventKind::Connect);
        assert_eq!(event.source_id.as_deref(), Some("AA:BB:CC:DD:EE:10"));
        assert_eq!(event.topic_hint.as_deref(), Some("controller"));
        assert_eq!(event.button, None);
    }

    #[test]
    fn json_button_is_lowercased_and_uses_topic_hint() {
        let event = normalize(
            br#"{"button":"RIGHT"}"#,
            "yokohama/hackathon/running/player2",
        );
        assert_eq!(event.kind, EventKind::Move);
        assert_eq!(event.button.as_deref(), Some("right"));
        assert_eq!(event.source_id.as_deref(), Some("player2"));
        assert_eq!(event.step, DEFAULT_STEP);
    }

    #[test]
    fn aliased_keys_are_accepted() {
        let event = normalize(br#"{"x":1.5,"y":-2,"key":"Up","step":3}"#, "p/player1");
        assert_eq!(event.axis.dx, Some(1.5));
        assert_eq!(event.axis.dy, Some(-2.0));
        assert_eq!(event.button.as_deref(), Some("up"));
        assert_eq!(event.step, 3.0);
    }

    #[test]
    fn primary_keys_win_over_aliases() {
        let event = normalize(br#"{"dx":1,"x":9,"button":"a","key":"b"}"#, "t");
        assert_eq!(event.axis.dx, Some(1.0));
        assert_eq!(event.button.as_deref(), Some("a"));
    }

    #[test]
    fn non_numeric_step_falls_back_to_default() {
        let event = normalize(br#"{"button":"left","step":"9"}"#, "t");
        assert_eq!(event.step, DEFAULT_STEP);
    }

    #[test]
    fn run_event_is_an_impulse() {
        let event = normalize(br#"{"event":"run"}"#, "base/player1");
        assert_eq!(event.kind, EventKind::Run);
        assert!(event.kind.is_impulse());
        assert_eq!(event.impulse_key(), "run");
    }

    #[test]
    fn object_without_inputs_is_unknown() {
        let event = normalize(br#"{"hello":"world"}"#, "t/x");
        assert_eq!(event.kind, EventKind::Unknown);
    }

    #[test]
    fn non_hardware_identity_falls_back_to_topic() {
        let event = normalize(br#"{"event":"connect","id":"stick-one"}"#, "base/player1");
        assert_eq!(event.source_id.as_deref(), Some("player1"));
    }

    #[test]
    fn plain_text_becomes_button() {
        let event = normalize(b"  UP \n", "base/player1");
        assert_eq!(event.kind, EventKind::Move);
        assert_eq!(event.button.as_deref(), Some("up"));
        assert_eq!(event.raw, "  UP \n");
    }

    #[test]
    fn blank_text_is_unknown() {
        let event = normalize(b"   ", "base/player1");
        assert_eq!(event.kind, EventKind::Unknown);
        assert_eq!(event.button.as_deref(), Some(""));
    }

    #[test]
    fn json_scalar_is_treated_as_text() {
        let event = normalize(b"42", "t");
        assert_eq!(event.kind, EventKind::Move);
        assert_eq!(event.button.as_deref(), Some("42"));
    }

    #[test]
    fn empty_topic_has_no_hint() {
        let event = normalize(b"up", "");
        assert_eq!(event.topic_hint, None);
        assert_eq!(event.source_id, None);
    }

    #[test]
    fn hardware_address_detection() {
        assert!(looks_like_hardware_address("00:4B:12:C4:FF:18"));
        assert!(looks_like_hardware_address("dev-ab:cd"));
        assert!(!looks_like_hardware_address("player1"));
        assert!(!looks_like_hardware_address("a:b"));
    }

    proptest! {
        #[test]
        fn normalize_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256), topic in ".{0,40}") {
            let event = normalize(&bytes, &topic);
            prop_assert_eq!(event.raw, String::from_utf8_lossy(&bytes).into_owned());
        }

        #[test]
        fn unparseable_text_is_move_or_unknown(text in "[a-zA-Z ]{0,20}") {
            let event = normalize(text.as_bytes(), "base/player1");
            prop_assert!(matches!(event.kind, EventKind::Move | EventKind::Unknown));
            prop_assert_eq!(event.button, Some(text.trim().to_lowercase()));
        }
    }
}
