//! Read-only file store.
//!
//! The store is a flat byte image handed to the kernel at boot: one boot
//! block describing the layout, `inode_count` inode blocks, then data
//! blocks. All blocks are 4KB. Nothing here writes; the write paths of the
//! fd layer reject with [`KernelError::NotPermitted`].

use crate::error::{KernelError, KResult};
use crate::process::fd::FileKind;

pub const BLOCK_SIZE: usize = 4096;
/// Bytes reserved for a file name in a directory entry.
pub const NAME_CAPACITY: usize = 32;
/// Directory entries the boot block has room for.
pub const MAX_DENTRIES: usize = 63;
/// Data-block indices one inode has room for.
pub const INODE_SLOTS: usize = 1023;

const DENTRY_SIZE: usize = 64;
const DENTRY_TABLE_OFFSET: usize = 64;

const KIND_DEVICE: u32 = 0;
const KIND_DIRECTORY: u32 = 1;
const KIND_REGULAR: u32 = 2;

/// One directory entry, decoded out of the boot block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dentry {
    /// NUL-padded name field. A 32-character name fills it completely.
    pub name: [u8; NAME_CAPACITY],
    pub kind: FileKind,
    pub inode: u32,
}

impl Dentry {
    /// The name without its NUL padding.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_CAPACITY);
        &self.name[..end]
    }
}

/// Accessor over the boot image. Copyable handle; the backing bytes live
/// for the kernel's lifetime.
#[derive(Clone, Copy)]
pub struct FileStore {
    image: &'static [u8],
}

impl FileStore {
    pub fn new(image: &'static [u8]) -> KResult<FileStore> {
        if image.len() < BLOCK_SIZE {
            return Err(KernelError::FormatError);
        }
        let store = FileStore { image };
        // The declared inode blocks must actually be present.
        let needed = (1 + store.inode_count()) * BLOCK_SIZE;
        if image.len() < needed {
            return Err(KernelError::FormatError);
        }
        Ok(store)
    }

    pub fn dentry_count(&self) -> usize {
        core::cmp::min(le32(self.image, 0) as usize, MAX_DENTRIES)
    }

    pub fn inode_count(&self) -> usize {
        le32(self.image, 4) as usize
    }

    pub fn data_block_count(&self) -> usize {
        le32(self.image, 8) as usize
    }

    fn block(&self, index: usize) -> KResult<&[u8]> {
        let start = index * BLOCK_SIZE;
        let end = start + BLOCK_SIZE;
        if end > self.image.len() {
            return Err(KernelError::InvalidArgument);
        }
        Ok(&self.image[start..end])
    }

    /// Find a directory entry by exact name. Queries longer than the name
    /// field cannot match anything and report [`KernelError::NotFound`].
    pub fn dentry_by_name(&self, name: &[u8]) -> KResult<Dentry> {
        if name.is_empty() || name.len() > NAME_CAPACITY {
            return Err(KernelError::NotFound);
        }
        let mut padded = [0u8; NAME_CAPACITY];
        padded[..name.len()].copy_from_slice(name);
        for index in 0..self.dentry_count() {
            let dentry = self.dentry_by_index(index)?;
            if dentry.name == padded {
                return Ok(dentry);
            }
        }
        Err(KernelError::NotFound)
    }

    pub fn dentry_by_index(&self, index: usize) -> KResult<Dentry> {
        if index >= self.dentry_count() {
            return Err(KernelError::InvalidArgument);
        }
        let offset = DENTRY_TABLE_OFFSET + index * DENTRY_SIZE;
        let raw = &self.image[offset..offset + DENTRY_SIZE];

        let mut name = [0u8; NAME_CAPACITY];
        name.copy_from_slice(&raw[..NAME_CAPACITY]);
        let kind = match le32(raw, 32) {
            KIND_DEVICE => FileKind::Device,
            KIND_DIRECTORY => FileKind::Directory,
            KIND_REGULAR => FileKind::Regular,
            _ => return Err(KernelError::FormatError),
        };
        Ok(Dentry {
            name,
            kind,
            inode: le32(raw, 36),
        })
    }

    /// Byte length of a regular file.
    pub fn file_length(&self, inode: u32) -> KResult<usize> {
        let block = self.inode_block(inode)?;
        Ok(le32(block, 0) as usize)
    }

    /// Copy file bytes starting at `offset` into `buf`. Reads past the end
    /// are truncated; a read starting at or past the end copies nothing.
    pub fn read_data(&self, inode: u32, offset: usize, buf: &mut [u8]) -> KResult<usize> {
        let inode_block = self.inode_block(inode)?;
        let length = le32(inode_block, 0) as usize;
        if offset >= length {
            return Ok(0);
        }
        let n = core::cmp::min(buf.len(), length - offset);

        let mut copied = 0;
        while copied < n {
            let pos = offset + copied;
            let slot = pos / BLOCK_SIZE;
            if slot >= INODE_SLOTS {
                return Err(KernelError::InvalidArgument);
            }
            let data_index = le32(inode_block, 4 + 4 * slot) as usize;
            if data_index >= self.data_block_count() {
                return Err(KernelError::InvalidArgument);
            }
            let data = self.block(1 + self.inode_count() + data_index)?;

            let start = pos % BLOCK_SIZE;
            let take = core::cmp::min(BLOCK_SIZE - start, n - copied);
            buf[copied..copied + take].copy_from_slice(&data[start..start + take]);
            copied += take;
        }
        Ok(n)
    }

    fn inode_block(&self, inode: u32) -> KResult<&[u8]> {
        if inode as usize >= self.inode_count() {
            return Err(KernelError::InvalidArgument);
        }
        self.block(1 + inode as usize)
    }
}

fn le32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
pub mod testimg {
    //! Synthetic boot images for tests elsewhere in the crate.

    use super::*;
    use std::boxed::Box;
    use std::vec;
    use std::vec::Vec;

    /// Build an image holding `files` as regular files (name, contents),
    /// one data block per 4KB chunk, plus a leading `.` directory entry.
    pub fn build(files: &[(&[u8], &[u8])]) -> &'static [u8] {
        build_inner(files, None)
    }

    /// Same image plus one device node (carrying no data).
    pub fn build_with_device(files: &[(&[u8], &[u8])], device: &[u8]) -> &'static [u8] {
        build_inner(files, Some(device))
    }

    fn build_inner(files: &[(&[u8], &[u8])], device: Option<&[u8]>) -> &'static [u8] {
        let inode_count = files.len();
        let data_block_count: usize = files
            .iter()
            .map(|(_, contents)| contents.len().div_ceil(BLOCK_SIZE).max(1))
            .sum();
        let total_blocks = 1 + inode_count + data_block_count;
        let mut image = vec![0u8; total_blocks * BLOCK_SIZE];

        let dentry_count = files.len() + 1 + device.is_some() as usize;
        image[0..4].copy_from_slice(&(dentry_count as u32).to_le_bytes());
        image[4..8].copy_from_slice(&(inode_count as u32).to_le_bytes());
        image[8..12].copy_from_slice(&(data_block_count as u32).to_le_bytes());

        // Entry 0: the directory itself.
        write_dentry(&mut image, 0, b".", KIND_DIRECTORY, 0);
        if let Some(name) = device {
            write_dentry(&mut image, 1 + files.len(), name, KIND_DEVICE, 0);
        }

        let mut next_data_block = 0usize;
        for (i, (name, contents)) in files.iter().enumerate() {
            write_dentry(&mut image, 1 + i, name, KIND_REGULAR, i as u32);

            let inode_off = (1 + i) * BLOCK_SIZE;
            image[inode_off..inode_off + 4].copy_from_slice(&(contents.len() as u32).to_le_bytes());

            let chunks = contents.len().div_ceil(BLOCK_SIZE).max(1);
            for chunk in 0..chunks {
                let slot_off = inode_off + 4 + 4 * chunk;
                image[slot_off..slot_off + 4]
                    .copy_from_slice(&(next_data_block as u32).to_le_bytes());

                let data_off = (1 + inode_count + next_data_block) * BLOCK_SIZE;
                let lo = chunk * BLOCK_SIZE;
                let hi = core::cmp::min(lo + BLOCK_SIZE, contents.len());
                image[data_off..data_off + (hi - lo)].copy_from_slice(&contents[lo..hi]);
                next_data_block += 1;
            }
        }
        Box::leak(image.into_boxed_slice())
    }

    fn write_dentry(image: &mut Vec<u8>, index: usize, name: &[u8], kind: u32, inode: u32) {
        let off = DENTRY_TABLE_OFFSET + index * DENTRY_SIZE;
        image[off..off + name.len()].copy_from_slice(name);
        image[off + 32..off + 36].copy_from_slice(&kind.to_le_bytes());
        image[off + 36..off + 40].copy_from_slice(&inode.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;

    fn sample() -> FileStore {
        let image = testimg::build(&[
            (b"shell", b"\x7fELF shell image"),
            (b"counter", b"counts forever"),
        ]);
        FileStore::new(image).unwrap()
    }

    #[test]
    fn rejects_truncated_image() {
        let image: &'static [u8] = std::boxed::Box::leak(vec![0u8; 100].into_boxed_slice());
        assert!(FileStore::new(image).is_err());
    }

    #[test]
    fn lookup_by_name() {
        let store = sample();
        let dentry = store.dentry_by_name(b"counter").unwrap();
        assert_eq!(dentry.kind, FileKind::Regular);
        assert_eq!(dentry.name_bytes(), b"counter");

        assert_eq!(store.dentry_by_name(b"missing"), Err(KernelError::NotFound));
        assert_eq!(store.dentry_by_name(b""), Err(KernelError::NotFound));
        let long = [b'x'; NAME_CAPACITY + 1];
        assert_eq!(store.dentry_by_name(&long), Err(KernelError::NotFound));
    }

    #[test]
    fn full_width_names_match_without_terminator() {
        let name = [b'n'; NAME_CAPACITY];
        let image = testimg::build(&[(&name, b"data")]);
        let store = FileStore::new(image).unwrap();
        let dentry = store.dentry_by_name(&name).unwrap();
        assert_eq!(dentry.name_bytes(), &name);
    }

    #[test]
    fn listing_by_index_ends_cleanly() {
        let store = sample();
        assert_eq!(store.dentry_by_index(0).unwrap().name_bytes(), b".");
        assert_eq!(store.dentry_by_index(1).unwrap().name_bytes(), b"shell");
        assert_eq!(store.dentry_by_index(2).unwrap().name_bytes(), b"counter");
        assert_eq!(
            store.dentry_by_index(3),
            Err(KernelError::InvalidArgument)
        );
    }

    #[test]
    fn read_tracks_offsets_and_eof() {
        let store = sample();
        let inode = store.dentry_by_name(b"counter").unwrap().inode;
        assert_eq!(store.file_length(inode).unwrap(), 14);

        let mut buf = [0u8; 6];
        assert_eq!(store.read_data(inode, 0, &mut buf).unwrap(), 6);
        assert_eq!(&buf, b"counts");
        assert_eq!(store.read_data(inode, 7, &mut buf).unwrap(), 6);
        assert_eq!(&buf, b"foreve");
        // Tail read truncates, read at EOF copies nothing.
        assert_eq!(store.read_data(inode, 13, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'r');
        assert_eq!(store.read_data(inode, 14, &mut buf).unwrap(), 0);
        assert_eq!(store.read_data(inode, 500, &mut buf).unwrap(), 0);
    }

    #[test]
    fn read_spans_block_boundaries() {
        let mut contents = vec![0u8; BLOCK_SIZE + 100];
        for (i, byte) in contents.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        let image = testimg::build(&[(b"big", &contents)]);
        let store = FileStore::new(image).unwrap();

        let mut buf = vec![0u8; 200];
        let n = store
            .read_data(0, BLOCK_SIZE - 100, &mut buf)
            .unwrap();
        assert_eq!(n, 200);
        assert_eq!(&buf[..], &contents[BLOCK_SIZE - 100..BLOCK_SIZE + 100]);
    }

    #[test]
    fn corrupt_block_index_is_rejected() {
        let image = testimg::build(&[(b"bad", b"x")]);
        // Point the inode's first slot past the data region.
        let mut owned = image.to_vec();
        let inode_off = BLOCK_SIZE;
        owned[inode_off + 4..inode_off + 8].copy_from_slice(&999u32.to_le_bytes());
        let store = FileStore::new(std::boxed::Box::leak(owned.into_boxed_slice())).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(
            store.read_data(0, 0, &mut buf),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(store.read_data(99, 0, &mut buf), Err(KernelError::InvalidArgument));
    }
}
