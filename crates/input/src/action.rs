use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Platform-independent key identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    W,
    A,
    S,
    D,
    Q,
    E,
    Space,
    Shift,
    Ctrl,
    Tab,
    F1,
    Escape,
}

impl Key {
    pub const ALL: [Key; 12] = [
        Key::W,
        Key::A,
        Key::S,
        Key::D,
        Key::Q,
        Key::E,
        Key::Space,
        Key::Shift,
        Key::Ctrl,
        Key::Tab,
        Key::F1,
        Key::Escape,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Key::W => "w",
            Key::A => "a",
            Key::S => "s",
            Key::D => "d",
            Key::Q => "q",
            Key::E => "e",
            Key::Space => "space",
            Key::Shift => "shift",
            Key::Ctrl => "ctrl",
            Key::Tab => "tab",
            Key::F1 => "f1",
            Key::Escape => "escape",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("unknown key {0:?}")]
    UnknownKey(String),
}

impl FromStr for Key {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Key::ALL
            .into_iter()
            .find(|k| k.name() == lower)
            .ok_or_else(|| BindingError::UnknownKey(s.to_string()))
    }
}

/// What a key means to the application.
///
/// Movement actions are held; the rest fire once per press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    MoveForward,
    MoveBack,
    StrafeLeft,
    StrafeRight,
    Ascend,
    Descend,
    Sprint,
    ToggleOverlay,
    CycleDebugBuffer,
    Quit,
}

impl Action {
    pub fn is_held(self) -> bool {
        matches!(
            self,
            Action::MoveForward
                | Action::MoveBack
                | Action::StrafeLeft
                | Action::StrafeRight
                | Action::Ascend
                | Action::Descend
                | Action::Sprint
        )
    }
}

/// Key to action table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bindings(HashMap<Key, Action>);

impl Default for Bindings {
    fn default() -> Self {
        Self(HashMap::from([
            (Key::W, Action::MoveForward),
            (Key::S, Action::MoveBack),
            (Key::A, Action::StrafeLeft),
            (Key::D, Action::StrafeRight),
            (Key::E, Action::Ascend),
            (Key::Space, Action::Ascend),
            (Key::Q, Action::Descend),
            (Key::Ctrl, Action::Descend),
            (Key::Shift, Action::Sprint),
            (Key::F1, Action::ToggleOverlay),
            (Key::Tab, Action::CycleDebugBuffer),
            (Key::Escape, Action::Quit),
        ]))
    }
}

impl Bindings {
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Bind `key`, returning the action it replaced.
    pub fn bind(&mut self, key: Key, action: Action) -> Option<Action> {
        self.0.insert(key, action)
    }

    pub fn unbind(&mut self, key: Key) -> Option<Action> {
        self.0.remove(&key)
    }

    pub fn action(&self, key: Key) -> Option<Action> {
        self.0.get(&key).copied()
    }

    /// Keys bound to `action`, in [`Key::ALL`] order.
    pub fn keys_for(&self, action: Action) -> Vec<Key> {
        Key::ALL
            .into_iter()
            .filter(|k| self.action(*k) == Some(action))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bindings_cover_wasd() {
        let b = Bindings::default();
        assert_eq!(b.action(Key::W), Some(Action::MoveForward));
        assert_eq!(b.action(Key::A), Some(Action::StrafeLeft));
        assert_eq!(b.action(Key::S), Some(Action::MoveBack));
        assert_eq!(b.action(Key::D), Some(Action::StrafeRight));
        assert_eq!(b.keys_for(Action::Ascend), vec![Key::E, Key::Space]);
    }

    #[test]
    fn rebinding_returns_previous_action() {
        let mut b = Bindings::default();
        assert_eq!(b.bind(Key::Q, Action::Quit), Some(Action::Descend));
        assert_eq!(b.keys_for(Action::Quit), vec![Key::Q, Key::Escape]);
        assert_eq!(b.unbind(Key::Q), Some(Action::Quit));
        assert_eq!(b.action(Key::Q), None);
    }

    #[test]
    fn keys_parse_case_insensitively() {
        assert_eq!("Space".parse::<Key>(), Ok(Key::Space));
        assert_eq!(" f1 ".parse::<Key>(), Ok(Key::F1));
        assert_eq!(
            "hyper".parse::<Key>(),
            Err(BindingError::UnknownKey("hyper".into()))
        );
    }

    #[test]
    fn bindings_load_from_yaml() {
        let b: Bindings = serde_yaml::from_str("w: move_forward\ntab: quit\n").unwrap();
        assert_eq!(b.action(Key::W), Some(Action::MoveForward));
        assert_eq!(b.action(Key::Tab), Some(Action::Quit));
        assert_eq!(b.action(Key::S), None);
    }

    #[test]
    fn only_movement_is_held() {
        assert!(Action::Sprint.is_held());
        assert!(!Action::ToggleOverlay.is_held());
        assert!(!Action::Quit.is_held());
    }
}
