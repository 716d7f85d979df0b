use bitflags::bitflags;

bitflags! {
    /// Modifier keys currently held (caps lock is a toggle).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CTRL = 1 << 1;
        const ALT = 1 << 2;
        const CAPS_LOCK = 1 << 3;
    }
}

/// One decoded key, modifiers already applied to the character value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(u8),
    Enter,
    Backspace,
    Tab,
    Function(u8),
    None,
}

/// Scancode set 1 decoder. Break codes and the 0xE0 prefix are folded into
/// the modifier state; only make codes produce a [`Key`].
pub struct Decoder {
    modifiers: Modifiers,
    extended: bool,
}

impl Decoder {
    pub const fn new() -> Self {
        Decoder {
            modifiers: Modifiers::empty(),
            extended: false,
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn decode(&mut self, scancode: u8) -> Key {
        if scancode == 0xE0 {
            self.extended = true;
            return Key::None;
        }
        let extended = self.extended;
        self.extended = false;

        if extended {
            // Only the right-hand modifiers matter here; keypad arrows and
            // the rest have no role in line editing.
            return match scancode {
                0x1D => self.set(Modifiers::CTRL, true),
                0x9D => self.set(Modifiers::CTRL, false),
                0x38 => self.set(Modifiers::ALT, true),
                0xB8 => self.set(Modifiers::ALT, false),
                _ => Key::None,
            };
        }

        match scancode {
            // Modifier make/break
            0x2A | 0x36 => self.set(Modifiers::SHIFT, true),
            0xAA | 0xB6 => self.set(Modifiers::SHIFT, false),
            0x1D => self.set(Modifiers::CTRL, true),
            0x9D => self.set(Modifiers::CTRL, false),
            0x38 => self.set(Modifiers::ALT, true),
            0xB8 => self.set(Modifiers::ALT, false),
            0x3A => {
                self.modifiers.toggle(Modifiers::CAPS_LOCK);
                Key::None
            }

            // Number row
            0x02 => self.shifted(b'1', b'!'),
            0x03 => self.shifted(b'2', b'@'),
            0x04 => self.shifted(b'3', b'#'),
            0x05 => self.shifted(b'4', b'$'),
            0x06 => self.shifted(b'5', b'%'),
            0x07 => self.shifted(b'6', b'^'),
            0x08 => self.shifted(b'7', b'&'),
            0x09 => self.shifted(b'8', b'*'),
            0x0A => self.shifted(b'9', b'('),
            0x0B => self.shifted(b'0', b')'),
            0x0C => self.shifted(b'-', b'_'),
            0x0D => self.shifted(b'=', b'+'),

            // Letter rows
            0x10 => self.shifted(b'q', b'Q'),
            0x11 => self.shifted(b'w', b'W'),
            0x12 => self.shifted(b'e', b'E'),
            0x13 => self.shifted(b'r', b'R'),
            0x14 => self.shifted(b't', b'T'),
            0x15 => self.shifted(b'y', b'Y'),
            0x16 => self.shifted(b'u', b'U'),
            0x17 => self.shifted(b'i', b'I'),
            0x18 => self.shifted(b'o', b'O'),
            0x19 => self.shifted(b'p', b'P'),
            0x1A => self.shifted(b'[', b'{'),
            0x1B => self.shifted(b']', b'}'),
            0x1E => self.shifted(b'a', b'A'),
            0x1F => self.shifted(b's', b'S'),
            0x20 => self.shifted(b'd', b'D'),
            0x21 => self.shifted(b'f', b'F'),
            0x22 => self.shifted(b'g', b'G'),
            0x23 => self.shifted(b'h', b'H'),
            0x24 => self.shifted(b'j', b'J'),
            0x25 => self.shifted(b'k', b'K'),
            0x26 => self.shifted(b'l', b'L'),
            0x27 => self.shifted(b';', b':'),
            0x28 => self.shifted(b'\'', b'"'),
            0x29 => self.shifted(b'`', b'~'),
            0x2B => self.shifted(b'\\', b'|'),
            0x2C => self.shifted(b'z', b'Z'),
            0x2D => self.shifted(b'x', b'X'),
            0x2E => self.shifted(b'c', b'C'),
            0x2F => self.shifted(b'v', b'V'),
            0x30 => self.shifted(b'b', b'B'),
            0x31 => self.shifted(b'n', b'N'),
            0x32 => self.shifted(b'm', b'M'),
            0x33 => self.shifted(b',', b'<'),
            0x34 => self.shifted(b'.', b'>'),
            0x35 => self.shifted(b'/', b'?'),

            0x39 => Key::Char(b' '),
            0x0F => Key::Tab,
            0x1C => Key::Enter,
            0x0E => Key::Backspace,

            0x3B => Key::Function(1),
            0x3C => Key::Function(2),
            0x3D => Key::Function(3),
            0x3E => Key::Function(4),
            0x3F => Key::Function(5),
            0x40 => Key::Function(6),
            0x41 => Key::Function(7),
            0x42 => Key::Function(8),
            0x43 => Key::Function(9),
            0x44 => Key::Function(10),
            0x57 => Key::Function(11),
            0x58 => Key::Function(12),

            _ => Key::None,
        }
    }

    fn set(&mut self, which: Modifiers, held: bool) -> Key {
        self.modifiers.set(which, held);
        Key::None
    }

    fn shifted(&self, lower: u8, upper: u8) -> Key {
        let is_letter = lower.is_ascii_lowercase();
        // Caps lock flips shift for letters only.
        let shift = if is_letter && self.modifiers.contains(Modifiers::CAPS_LOCK) {
            !self.modifiers.contains(Modifiers::SHIFT)
        } else {
            self.modifiers.contains(Modifiers::SHIFT)
        };
        if shift {
            Key::Char(upper)
        } else {
            Key::Char(lower)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_shifted_letters() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.decode(0x1E), Key::Char(b'a'));
        decoder.decode(0x2A);
        assert_eq!(decoder.decode(0x1E), Key::Char(b'A'));
        assert_eq!(decoder.decode(0x03), Key::Char(b'@'));
        decoder.decode(0xAA);
        assert_eq!(decoder.decode(0x1E), Key::Char(b'a'));
    }

    #[test]
    fn caps_lock_flips_letters_not_digits() {
        let mut decoder = Decoder::new();
        decoder.decode(0x3A);
        assert_eq!(decoder.decode(0x1E), Key::Char(b'A'));
        assert_eq!(decoder.decode(0x03), Key::Char(b'2'));
        // Shift under caps lock goes back to lowercase.
        decoder.decode(0x2A);
        assert_eq!(decoder.decode(0x1E), Key::Char(b'a'));
        decoder.decode(0xAA);
        decoder.decode(0x3A);
        assert_eq!(decoder.decode(0x1E), Key::Char(b'a'));
    }

    #[test]
    fn extended_prefix_reaches_right_modifiers() {
        let mut decoder = Decoder::new();
        decoder.decode(0xE0);
        decoder.decode(0x1D);
        assert!(decoder.modifiers().contains(Modifiers::CTRL));
        decoder.decode(0xE0);
        decoder.decode(0x9D);
        assert!(!decoder.modifiers().contains(Modifiers::CTRL));
        // An extended arrow make code decodes to nothing.
        decoder.decode(0xE0);
        assert_eq!(decoder.decode(0x48), Key::None);
    }

    #[test]
    fn break_codes_produce_nothing() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.decode(0x9E), Key::None);
        assert_eq!(decoder.decode(0x8F), Key::None);
    }
}
