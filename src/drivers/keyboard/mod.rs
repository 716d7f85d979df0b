pub mod scancodes;

use scancodes::{Decoder, Key, Modifiers};

/// What the console layer should do with one scancode. The keyboard itself
/// touches no console state; the kernel entry point applies the action to
/// the foreground console or runs the requested switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardAction {
    /// Append a printable byte to the input line and echo it.
    Input(u8),
    /// Drop the last input byte and erase its cell.
    Backspace,
    /// Terminate the input line.
    Enter,
    /// Expand to spaces in the input line.
    Tab,
    /// Ctrl+L: blank the visible screen, keeping the input line.
    ClearScreen,
    /// Alt+F1..F3: bring the named console to the foreground.
    SwitchConsole(usize),
    None,
}

pub struct Keyboard {
    decoder: Decoder,
}

impl Keyboard {
    pub const fn new() -> Self {
        Keyboard {
            decoder: Decoder::new(),
        }
    }

    pub fn scancode(&mut self, code: u8) -> KeyboardAction {
        let key = self.decoder.decode(code);
        let modifiers = self.decoder.modifiers();

        match key {
            Key::Function(n @ 1..=3) if modifiers.contains(Modifiers::ALT) => {
                KeyboardAction::SwitchConsole(n as usize - 1)
            }
            Key::Char(b'l') | Key::Char(b'L') if modifiers.contains(Modifiers::CTRL) => {
                KeyboardAction::ClearScreen
            }
            // Other control chords are swallowed, not inserted.
            Key::Char(_) if modifiers.contains(Modifiers::CTRL) => KeyboardAction::None,
            Key::Char(byte) => KeyboardAction::Input(byte),
            Key::Enter => KeyboardAction::Enter,
            Key::Backspace => KeyboardAction::Backspace,
            Key::Tab => KeyboardAction::Tab,
            Key::Function(_) | Key::None => KeyboardAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_plain_text() {
        let mut kb = Keyboard::new();
        assert_eq!(kb.scancode(0x23), KeyboardAction::Input(b'h'));
        assert_eq!(kb.scancode(0x17), KeyboardAction::Input(b'i'));
        assert_eq!(kb.scancode(0x1C), KeyboardAction::Enter);
    }

    #[test]
    fn alt_function_keys_request_switches() {
        let mut kb = Keyboard::new();
        assert_eq!(kb.scancode(0x3C), KeyboardAction::None);
        kb.scancode(0x38);
        assert_eq!(kb.scancode(0x3B), KeyboardAction::SwitchConsole(0));
        assert_eq!(kb.scancode(0x3C), KeyboardAction::SwitchConsole(1));
        assert_eq!(kb.scancode(0x3D), KeyboardAction::SwitchConsole(2));
        // F4 has no console behind it.
        assert_eq!(kb.scancode(0x3E), KeyboardAction::None);
        kb.scancode(0xB8);
        assert_eq!(kb.scancode(0x3C), KeyboardAction::None);
    }

    #[test]
    fn ctrl_l_clears_and_other_chords_are_swallowed() {
        let mut kb = Keyboard::new();
        kb.scancode(0x1D);
        assert_eq!(kb.scancode(0x26), KeyboardAction::ClearScreen);
        assert_eq!(kb.scancode(0x2E), KeyboardAction::None);
        kb.scancode(0x9D);
        assert_eq!(kb.scancode(0x26), KeyboardAction::Input(b'l'));
    }

    #[test]
    fn editing_keys_map_to_actions() {
        let mut kb = Keyboard::new();
        assert_eq!(kb.scancode(0x0E), KeyboardAction::Backspace);
        assert_eq!(kb.scancode(0x0F), KeyboardAction::Tab);
        assert_eq!(kb.scancode(0x39), KeyboardAction::Input(b' '));
    }
}
