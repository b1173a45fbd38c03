use std::collections::HashSet;

use glam::{Vec2, Vec3};
use prism_scene::FlyCameraController;

use crate::action::{Action, Bindings, Key};

/// Speed factor while [`Action::Sprint`] is held.
pub const DEFAULT_SPRINT_MULTIPLIER: f32 = 3.0;

/// Keys currently down, pending one-shot actions, and accumulated mouse look.
#[derive(Debug, Clone)]
pub struct InputState {
    bindings: Bindings,
    held: HashSet<Key>,
    triggered: Vec<Action>,
    look: Vec2,
    pub sprint_multiplier: f32,
}

impl Default for InputState {
    fn default() -> Self {
        Self::new(Bindings::default())
    }
}

impl InputState {
    pub fn new(bindings: Bindings) -> Self {
        Self {
            bindings,
            held: HashSet::new(),
            triggered: Vec::new(),
            look: Vec2::ZERO,
            sprint_multiplier: DEFAULT_SPRINT_MULTIPLIER,
        }
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn key_down(&mut self, key: Key) {
        // key repeat arrives as extra presses
        if !self.held.insert(key) {
            return;
        }
        if let Some(action) = self.bindings.action(key) {
            if !action.is_held() {
                tracing::debug!("{:?} -> {:?}", key, action);
                self.triggered.push(action);
            }
        }
    }

    pub fn key_up(&mut self, key: Key) {
        self.held.remove(&key);
    }

    /// Forget held keys, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.held.clear();
    }

    pub fn mouse_motion(&mut self, dx: f32, dy: f32) {
        self.look += Vec2::new(dx, dy);
    }

    pub fn is_active(&self, action: Action) -> bool {
        self.held
            .iter()
            .any(|k| self.bindings.action(*k) == Some(action))
    }

    /// Held movement as x right, y up, z forward. Opposing keys cancel.
    pub fn move_vector(&self) -> Vec3 {
        let axis = |pos: Action, neg: Action| {
            f32::from(u8::from(self.is_active(pos))) - f32::from(u8::from(self.is_active(neg)))
        };
        Vec3::new(
            axis(Action::StrafeRight, Action::StrafeLeft),
            axis(Action::Ascend, Action::Descend),
            axis(Action::MoveForward, Action::MoveBack),
        )
        .normalize_or_zero()
    }

    pub fn take_look(&mut self) -> Vec2 {
        std::mem::take(&mut self.look)
    }

    /// One-shot actions since the last call, in press order.
    pub fn take_triggered(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.triggered)
    }

    /// Feed this frame's movement and look into `controller`.
    ///
    /// `base_speed` is the controller speed without sprint.
    pub fn apply(&mut self, controller: &mut FlyCameraController, base_speed: f32) {
        controller.set_move_input(self.move_vector());
        controller.add_look_input(self.take_look());
        controller.speed = if self.is_active(Action::Sprint) {
            base_speed * self.sprint_multiplier
        } else {
            base_speed
        };
    }
}
