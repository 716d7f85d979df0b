//! Program image loading.
//!
//! Program files are flat images copied whole into the user page: a 4-byte
//! executable marker up front, the 32-bit entry point at offset 24, and the
//! text itself expecting to sit at the fixed load address.

use crate::error::{KernelError, KResult};
use crate::fs::FileStore;
use crate::memory::{USER_IMAGE_BASE, USER_LOAD_ADDR};

/// Executable marker at image offset 0.
pub const EXEC_MARKER: [u8; 4] = [0x7F, b'E', b'L', b'F'];
/// Image offset of the little-endian entry-point field.
const ENTRY_OFFSET: usize = 24;

/// Check the marker of the file at `inode` without loading it.
pub fn check_marker(store: &FileStore, inode: u32) -> KResult<()> {
    let mut head = [0u8; 4];
    if store.read_data(inode, 0, &mut head)? != 4 || head != EXEC_MARKER {
        return Err(KernelError::FormatError);
    }
    Ok(())
}

/// Copy the whole image through the user window to the fixed load address
/// and return its entry point. The caller has already activated the target
/// address space; `window` is the 4MB image page.
pub fn load_image(store: &FileStore, inode: u32, window: &mut [u8]) -> KResult<u32> {
    let length = store.file_length(inode)?;
    if length < ENTRY_OFFSET + 4 {
        return Err(KernelError::FormatError);
    }
    let load_off = (USER_LOAD_ADDR - USER_IMAGE_BASE) as usize;
    if load_off + length > window.len() {
        return Err(KernelError::FormatError);
    }
    store.read_data(inode, 0, &mut window[load_off..load_off + length])?;

    let mut entry = [0u8; 4];
    entry.copy_from_slice(&window[load_off + ENTRY_OFFSET..load_off + ENTRY_OFFSET + 4]);
    Ok(u32::from_le_bytes(entry))
}

#[cfg(test)]
pub mod testprog {
    //! Minimal valid program images for tests elsewhere in the crate.

    use super::EXEC_MARKER;
    use std::vec;
    use std::vec::Vec;

    pub fn build(entry: u32) -> Vec<u8> {
        let mut image = vec![0u8; 48];
        image[..4].copy_from_slice(&EXEC_MARKER);
        image[24..28].copy_from_slice(&entry.to_le_bytes());
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::testimg;
    use crate::memory::LARGE_PAGE_SIZE;
    use std::vec;

    #[test]
    fn marker_check_accepts_programs_only() {
        let program = testprog::build(0x0804_80A0);
        let image = testimg::build(&[(b"shell", &program), (b"notes.txt", b"plain text")]);
        let store = FileStore::new(image).unwrap();

        let shell = store.dentry_by_name(b"shell").unwrap();
        assert!(check_marker(&store, shell.inode).is_ok());

        let notes = store.dentry_by_name(b"notes.txt").unwrap();
        assert_eq!(
            check_marker(&store, notes.inode),
            Err(KernelError::FormatError)
        );
    }

    #[test]
    fn short_files_fail_the_marker_check() {
        let image = testimg::build(&[(b"stub", b"\x7fE")]);
        let store = FileStore::new(image).unwrap();
        assert_eq!(check_marker(&store, 0), Err(KernelError::FormatError));
    }

    #[test]
    fn load_places_bytes_at_the_load_address() {
        let mut program = testprog::build(0x0804_8018);
        program.extend_from_slice(b"payload");
        let image = testimg::build(&[(b"prog", &program)]);
        let store = FileStore::new(image).unwrap();

        let mut window = vec![0u8; LARGE_PAGE_SIZE as usize];
        let entry = load_image(&store, 0, &mut window).unwrap();
        assert_eq!(entry, 0x0804_8018);

        let load_off = (USER_LOAD_ADDR - USER_IMAGE_BASE) as usize;
        assert_eq!(&window[load_off..load_off + 4], &EXEC_MARKER);
        assert_eq!(
            &window[load_off + 48..load_off + 48 + 7],
            b"payload"
        );
    }

    #[test]
    fn load_rejects_images_shorter_than_the_header() {
        let image = testimg::build(&[(b"tiny", b"\x7fELF")]);
        let store = FileStore::new(image).unwrap();
        let mut window = vec![0u8; LARGE_PAGE_SIZE as usize];
        assert_eq!(
            load_image(&store, 0, &mut window),
            Err(KernelError::FormatError)
        );
    }
}
