//! Runtime controls: the shared overlay/vsync flags and the key mapping that toggles them

use common::ControlSignal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Flags read by the render loop every iteration.
///
/// The two flags are independent and carry no data, so relaxed ordering is
/// enough. Shared through an `Arc` scoped to the session.
#[derive(Debug)]
pub struct ControlState {
    show_overlay: AtomicBool,
    vsync: AtomicBool,
}

impl ControlState {
    pub fn new(show_overlay: bool, vsync: bool) -> Self {
        Self {
            show_overlay: AtomicBool::new(show_overlay),
            vsync: AtomicBool::new(vsync),
        }
    }

    pub fn show_overlay(&self) -> bool {
        self.show_overlay.load(Ordering::Relaxed)
    }

    pub fn vsync(&self) -> bool {
        self.vsync.load(Ordering::Relaxed)
    }

    pub fn set_show_overlay(&self, show: bool) {
        self.show_overlay.store(show, Ordering::Relaxed);
    }

    pub fn set_vsync(&self, vsync: bool) {
        self.vsync.store(vsync, Ordering::Relaxed);
    }

    /// Flip the overlay flag and return the new value.
    pub fn toggle_overlay(&self) -> bool {
        !self.show_overlay.fetch_xor(true, Ordering::Relaxed)
    }

    /// Flip the vsync flag and return the new value.
    pub fn toggle_vsync(&self) -> bool {
        !self.vsync.fetch_xor(true, Ordering::Relaxed)
    }
}

/// Canonical form of a key name ("escape" and "ESCAPE" are the same key).
pub fn normalize_key(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}

/// Turns key presses into control signals, once per press.
///
/// A signal fires on the released -> pressed transition only; holding the
/// key (auto-repeat) does not fire it again.
#[derive(Debug)]
pub struct ControlInput {
    bindings: Vec<(String, ControlSignal)>,
    held: HashSet<ControlSignal>,
}

impl ControlInput {
    pub fn new(toggle_overlay: &str, toggle_vsync: &str, exit: &str) -> Self {
        Self {
            bindings: vec![
                (normalize_key(toggle_overlay), ControlSignal::ToggleOverlay),
                (normalize_key(toggle_vsync), ControlSignal::ToggleVsync),
                (normalize_key(exit), ControlSignal::RequestExit),
            ],
            held: HashSet::new(),
        }
    }

    /// Signal bound to `key`, regardless of its state.
    pub fn signal_for(&self, key: &str) -> Option<ControlSignal> {
        let key = normalize_key(key);
        self.bindings
            .iter()
            .find(|(bound, _)| *bound == key)
            .map(|(_, signal)| *signal)
    }

    /// Feed a key state change; returns the signal to raise, if any.
    pub fn on_key(&mut self, key: &str, pressed: bool) -> Option<ControlSignal> {
        let signal = self.signal_for(key)?;
        if pressed {
            self.held.insert(signal).then_some(signal)
        } else {
            self.held.remove(&signal);
            None
        }
    }

    /// Forget held keys (e.g. when the window loses focus and releases go missing).
    pub fn reset(&mut self) {
        self.held.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggles_return_new_value() {
        let state = ControlState::new(false, true);
        assert!(state.toggle_overlay());
        assert!(state.show_overlay());
        assert!(!state.toggle_vsync());
        assert!(!state.vsync());
        assert!(state.toggle_vsync());
    }

    #[test]
    fn test_flags_are_independent() {
        let state = ControlState::new(false, false);
        state.set_vsync(true);
        assert!(!state.show_overlay());
        state.set_show_overlay(true);
        assert!(state.vsync());
    }

    #[test]
    fn test_key_mapping_is_case_insensitive() {
        let input = ControlInput::new("F", "v", "Escape");
        assert_eq!(input.signal_for("f"), Some(ControlSignal::ToggleOverlay));
        assert_eq!(input.signal_for("V"), Some(ControlSignal::ToggleVsync));
        assert_eq!(input.signal_for("ESCAPE"), Some(ControlSignal::RequestExit));
        assert_eq!(input.signal_for("Q"), None);
    }

    #[test]
    fn test_edge_triggered() {
        let mut input = ControlInput::new("F", "V", "Escape");
        assert_eq!(input.on_key("F", true), Some(ControlSignal::ToggleOverlay));
        // auto-repeat while held
        assert_eq!(input.on_key("F", true), None);
        assert_eq!(input.on_key("F", true), None);
        assert_eq!(input.on_key("F", false), None);
        assert_eq!(input.on_key("F", true), Some(ControlSignal::ToggleOverlay));
    }

    #[test]
    fn test_reset_forgets_held_keys() {
        let mut input = ControlInput::new("F", "V", "Escape");
        assert!(input.on_key("V", true).is_some());
        input.reset();
        assert_eq!(input.on_key("V", true), Some(ControlSignal::ToggleVsync));
    }

    #[test]
    fn test_unbound_keys_are_ignored() {
        let mut input = ControlInput::new("F", "V", "Escape");
        assert_eq!(input.on_key("Space", true), None);
        assert_eq!(input.on_key("Space", false), None);
    }
}
