//! Transport-agnostic inline buttons.
//!
//! The engine describes a session's actions as [`ButtonDescriptor`]
//! sequences; a chat-transport adapter converts these to its native widget
//! type at the boundary. Callback data travels as `action&id`.

use crate::event::SessionId;

/// Actions a session's inline buttons can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Show the session status block in an alert.
    Info,
    /// Send an Enter keystroke (submits the last typed line).
    Enter,
    /// Toggle exclusive interactive mode for this session.
    Interact,
    /// Kill the session's process.
    Terminate,
    /// Send the session's output as a standalone HTML snapshot file.
    Html,
}

impl SessionAction {
    /// Wire tag used in callback data.
    pub fn tag(&self) -> &'static str {
        match self {
            SessionAction::Info => "info",
            SessionAction::Enter => "enter",
            SessionAction::Interact => "interact",
            SessionAction::Terminate => "terminate",
            SessionAction::Html => "html",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "info" => Some(SessionAction::Info),
            "enter" => Some(SessionAction::Enter),
            "interact" => Some(SessionAction::Interact),
            "terminate" => Some(SessionAction::Terminate),
            "html" => Some(SessionAction::Html),
            _ => None,
        }
    }
}

/// A single inline button, independent of any transport's widget type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonDescriptor {
    pub label: String,
    pub action: SessionAction,
    /// The session this button targets.
    pub target: SessionId,
}

impl ButtonDescriptor {
    pub fn new(label: impl Into<String>, action: SessionAction, target: SessionId) -> Self {
        Self {
            label: label.into(),
            action,
            target,
        }
    }

    /// Wire form carried back by the transport when the button is pressed.
    pub fn callback_data(&self) -> String {
        format!("{}&{}", self.action.tag(), self.target)
    }
}

/// Parse inline callback data of the form `action&id`.
pub fn parse_callback_data(data: &str) -> Option<(SessionAction, SessionId)> {
    let (tag, id) = data.split_once('&')?;
    Some((SessionAction::from_tag(tag)?, id.parse().ok()?))
}

/// Derive the action-button set for a session from its lifecycle state.
///
/// Running sessions expose the full five actions; finished sessions keep
/// only the ones that still make sense against frozen output.
pub fn button_set(id: SessionId, running: bool, interactive: bool) -> Vec<ButtonDescriptor> {
    if running {
        let interact_label = if interactive {
            "Exit interactive mode"
        } else {
            "Interactive mode"
        };
        vec![
            ButtonDescriptor::new("Info", SessionAction::Info, id),
            ButtonDescriptor::new("Enter", SessionAction::Enter, id),
            ButtonDescriptor::new(interact_label, SessionAction::Interact, id),
            ButtonDescriptor::new("Terminate", SessionAction::Terminate, id),
            ButtonDescriptor::new("Snapshot", SessionAction::Html, id),
        ]
    } else {
        vec![
            ButtonDescriptor::new("Info", SessionAction::Info, id),
            ButtonDescriptor::new("Snapshot", SessionAction::Html, id),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_set_has_five_buttons() {
        let buttons = button_set(42, true, false);
        assert_eq!(buttons.len(), 5);
        assert!(buttons.iter().any(|b| b.action == SessionAction::Terminate));
        assert!(buttons.iter().all(|b| b.target == 42));
    }

    #[test]
    fn finished_set_has_two_buttons() {
        let buttons = button_set(42, false, false);
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0].action, SessionAction::Info);
        assert_eq!(buttons[1].action, SessionAction::Html);
    }

    #[test]
    fn interact_label_reflects_mode() {
        let normal = button_set(1, true, false);
        let interactive = button_set(1, true, true);
        assert_eq!(normal[2].label, "Interactive mode");
        assert_eq!(interactive[2].label, "Exit interactive mode");
        // only the label differs, so the sets compare unequal
        assert_ne!(normal, interactive);
    }

    #[test]
    fn callback_data_round_trip() {
        let button = ButtonDescriptor::new("Terminate", SessionAction::Terminate, 4321);
        assert_eq!(button.callback_data(), "terminate&4321");
        assert_eq!(
            parse_callback_data("terminate&4321"),
            Some((SessionAction::Terminate, 4321))
        );
    }

    #[test]
    fn malformed_callback_data_is_rejected() {
        assert_eq!(parse_callback_data("terminate"), None);
        assert_eq!(parse_callback_data("bogus&12"), None);
        assert_eq!(parse_callback_data("info&notanumber"), None);
    }
}
