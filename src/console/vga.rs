use volatile::Volatile;

pub const BUFFER_WIDTH: usize = 80;
pub const BUFFER_HEIGHT: usize = 25;

/// Light grey on black, the only attribute this kernel renders.
pub const ATTRIBUTE: u8 = 0x07;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ScreenChar {
    pub ascii_character: u8,
    pub color_code: u8,
}

const BLANK: ScreenChar = ScreenChar {
    ascii_character: b' ',
    color_code: ATTRIBUTE,
};

/// One 80x25 text frame: the physical display or a console's backing store.
#[repr(transparent)]
pub struct VideoFrame(pub [[Volatile<ScreenChar>; BUFFER_WIDTH]; BUFFER_HEIGHT]);

impl VideoFrame {
    pub fn blank() -> VideoFrame {
        VideoFrame(core::array::from_fn(|_| {
            core::array::from_fn(|_| Volatile::new(BLANK))
        }))
    }

    pub fn char_at(&self, row: usize, col: usize) -> ScreenChar {
        self.0[row][col].read()
    }
}

/// Per-console cursor coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub col: usize,
    pub row: usize,
}

/// Render one byte at the cursor, advancing it and scrolling at the bottom.
pub fn put_byte(frame: &mut VideoFrame, cursor: &mut Cursor, byte: u8) {
    match byte {
        b'\n' => {
            cursor.col = 0;
            cursor.row += 1;
        }
        byte => {
            frame.0[cursor.row][cursor.col].write(ScreenChar {
                ascii_character: byte,
                color_code: ATTRIBUTE,
            });
            cursor.col += 1;
            if cursor.col == BUFFER_WIDTH {
                cursor.col = 0;
                cursor.row += 1;
            }
        }
    }
    if cursor.row == BUFFER_HEIGHT {
        scroll(frame);
        cursor.row = BUFFER_HEIGHT - 1;
    }
}

/// Blank the cell before the cursor and step back onto it.
pub fn erase_last(frame: &mut VideoFrame, cursor: &mut Cursor) {
    if cursor.col > 0 {
        cursor.col -= 1;
    } else if cursor.row > 0 {
        cursor.row -= 1;
        cursor.col = BUFFER_WIDTH - 1;
    } else {
        return;
    }
    frame.0[cursor.row][cursor.col].write(BLANK);
}

pub fn clear(frame: &mut VideoFrame, cursor: &mut Cursor) {
    for row in 0..BUFFER_HEIGHT {
        for col in 0..BUFFER_WIDTH {
            frame.0[row][col].write(BLANK);
        }
    }
    *cursor = Cursor::default();
}

fn scroll(frame: &mut VideoFrame) {
    for row in 1..BUFFER_HEIGHT {
        for col in 0..BUFFER_WIDTH {
            let ch = frame.0[row][col].read();
            frame.0[row - 1][col].write(ch);
        }
    }
    for col in 0..BUFFER_WIDTH {
        frame.0[BUFFER_HEIGHT - 1][col].write(BLANK);
    }
}

/// Cell-by-cell copy between the display and a console's backing frame.
pub fn copy_frame(dst: &mut VideoFrame, src: &VideoFrame) {
    for row in 0..BUFFER_HEIGHT {
        for col in 0..BUFFER_WIDTH {
            dst.0[row][col].write(src.0[row][col].read());
        }
    }
}
