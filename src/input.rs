use glam::Vec2;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};

/// Mouse buttons held during a motion event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ButtonState(u8);

impl ButtonState {
    pub const NONE: ButtonState = ButtonState(0);
    /// Primary (left) button.
    pub const BUTTON_1: ButtonState = ButtonState(1);
    /// Middle button.
    pub const BUTTON_2: ButtonState = ButtonState(2);
    /// Secondary (right) button.
    pub const BUTTON_3: ButtonState = ButtonState(4);

    pub fn from_button(button: MouseButton) -> Self {
        match button {
            MouseButton::Left => Self::BUTTON_1,
            MouseButton::Middle => Self::BUTTON_2,
            MouseButton::Right => Self::BUTTON_3,
            _ => Self::NONE,
        }
    }

    pub fn contains(self, other: ButtonState) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: ButtonState) -> Self {
        Self(self.0 | other.0)
    }

    pub fn without(self, other: ButtonState) -> Self {
        Self(self.0 & !other.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
}

impl From<ModifiersState> for Modifiers {
    fn from(state: ModifiersState) -> Self {
        Self {
            shift: state.shift_key(),
            control: state.control_key(),
            alt: state.alt_key(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionAction {
    Down,
    Move,
    Up,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

/// Editor input in window coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    Motion {
        action: MotionAction,
        /// Buttons held, including the one that went down or up.
        state: ButtonState,
        position: Vec2,
        modifiers: Modifiers,
    },
    Key {
        action: KeyAction,
        key: KeyCode,
        modifiers: Modifiers,
    },
}

/// Whether a handler consumed an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputStatus {
    Handled,
    Unhandled,
}

/// Turns winit window events into [`InputEvent`]s, tracking pointer
/// position, held buttons and modifiers between events.
#[derive(Clone, Debug, Default)]
pub struct InputTranslator {
    position: Vec2,
    buttons: ButtonState,
    modifiers: Modifiers,
}

impl InputTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, event: &WindowEvent) -> Option<InputEvent> {
        match event {
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state().into();
                None
            }
            WindowEvent::CursorMoved { position, .. } => {
                Some(self.pointer_moved(Vec2::new(position.x as f32, position.y as f32)))
            }
            WindowEvent::MouseInput { state, button, .. } => Some(self.button(*button, *state)),
            WindowEvent::KeyboardInput { event, .. } => match event.physical_key {
                PhysicalKey::Code(key) if !event.repeat => Some(self.key(key, event.state)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn pointer_moved(&mut self, position: Vec2) -> InputEvent {
        self.position = position;
        self.motion(MotionAction::Move, self.buttons)
    }

    pub fn button(&mut self, button: MouseButton, state: ElementState) -> InputEvent {
        let button = ButtonState::from_button(button);
        match state {
            ElementState::Pressed => {
                self.buttons = self.buttons.with(button);
                self.motion(MotionAction::Down, self.buttons)
            }
            ElementState::Released => {
                let held = self.buttons;
                self.buttons = self.buttons.without(button);
                self.motion(MotionAction::Up, held)
            }
        }
    }

    pub fn key(&mut self, key: KeyCode, state: ElementState) -> InputEvent {
        let action = match state {
            ElementState::Pressed => KeyAction::Down,
            ElementState::Released => KeyAction::Up,
        };
        // winit reports shift changes separately; track them from the keys too
        if matches!(key, KeyCode::ShiftLeft | KeyCode::ShiftRight) {
            self.modifiers.shift = action == KeyAction::Down;
        }
        InputEvent::Key {
            action,
            key,
            modifiers: self.modifiers,
        }
    }

    pub fn set_modifiers(&mut self, modifiers: Modifiers) {
        self.modifiers = modifiers;
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn buttons(&self) -> ButtonState {
        self.buttons
    }

    fn motion(&self, action: MotionAction, state: ButtonState) -> InputEvent {
        InputEvent::Motion {
            action,
            state,
            position: self.position,
            modifiers: self.modifiers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_move_release() {
        let mut input = InputTranslator::new();
        input.pointer_moved(Vec2::new(10.0, 20.0));

        let down = input.button(MouseButton::Left, ElementState::Pressed);
        assert_eq!(
            down,
            InputEvent::Motion {
                action: MotionAction::Down,
                state: ButtonState::BUTTON_1,
                position: Vec2::new(10.0, 20.0),
                modifiers: Modifiers::default(),
            }
        );

        let moved = input.pointer_moved(Vec2::new(15.0, 20.0));
        assert!(matches!(
            moved,
            InputEvent::Motion { action: MotionAction::Move, state, .. } if state == ButtonState::BUTTON_1
        ));

        let up = input.button(MouseButton::Left, ElementState::Released);
        assert!(matches!(
            up,
            InputEvent::Motion { action: MotionAction::Up, state, .. } if state == ButtonState::BUTTON_1
        ));
        assert_eq!(input.buttons(), ButtonState::NONE);
    }

    #[test]
    fn test_button_state_bits() {
        let both = ButtonState::BUTTON_1.with(ButtonState::BUTTON_2);
        assert!(both.contains(ButtonState::BUTTON_2));
        assert_eq!(both.without(ButtonState::BUTTON_1), ButtonState::BUTTON_2);
        assert_eq!(ButtonState::from_button(MouseButton::Middle), ButtonState::BUTTON_2);
    }

    #[test]
    fn test_shift_tracked_from_keys() {
        let mut input = InputTranslator::new();
        input.key(KeyCode::ShiftLeft, ElementState::Pressed);
        let event = input.button(MouseButton::Middle, ElementState::Pressed);
        assert!(matches!(event, InputEvent::Motion { modifiers, .. } if modifiers.shift));

        let key = input.key(KeyCode::ShiftLeft, ElementState::Released);
        assert!(matches!(key, InputEvent::Key { modifiers, .. } if !modifiers.shift));
    }
}
