// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A simulated client-server storage environment.
//!
//! The server holds named, length-bounded arrays of serialized elements.
//! Algorithms manipulate array contents exclusively through this interface,
//! so the sequence of [`ArrayServer::get`]/[`ArrayServer::put`] calls is
//! exactly the access trace the (honest-but-curious) storage tier observes.

#![warn(clippy::doc_markdown, missing_docs)]

use std::collections::HashMap;

use crate::{block_value::BlockValue, element::Element, ArrayIndex, ArrayName, BlockSize, OrpError};

/// Serialized bytes per element slot: a little-endian `u64` packing `key` in
/// the low half and `aux` in the high half, then one terminator byte.
pub const BYTES_PER_SLOT: usize = 9;

const SLOT_TERMINATOR: u8 = b'\n';

/// Named, length-bounded arrays of fixed-size records on simulated durable
/// storage.
///
/// All operations are synchronous; there is no concurrency contract. Slots
/// not yet written return undefined elements, so callers must write every
/// slot of a pass before reading it in a later pass.
pub trait ArrayServer<const B: BlockSize> {
    /// Allocates a new array of `length` slots under `name`. Fails if `name`
    /// is already live.
    fn create_array(&mut self, name: ArrayName, length: u32) -> Result<(), OrpError>;

    /// Retrieves a freshly owned element from `name[index]`.
    fn get(&mut self, name: ArrayName, index: ArrayIndex) -> Result<Element<B>, OrpError>;

    /// Stores an element at `name[index]`, consuming it.
    fn put(&mut self, name: ArrayName, index: ArrayIndex, element: Element<B>)
        -> Result<(), OrpError>;

    /// Returns whether `name` exists and `index` lies within its declared
    /// length. Not counted as I/O.
    fn check(&self, name: ArrayName, index: ArrayIndex) -> bool;

    /// Releases the array `name`.
    fn delete_array(&mut self, name: ArrayName) -> Result<(), OrpError>;
}

/// An array as held on the simulated disk.
#[derive(Debug)]
struct DiskArray {
    data: Vec<u8>,
    length: u32,
}

impl DiskArray {
    fn new(length: u32) -> Self {
        Self {
            data: vec![0u8; length as usize * BYTES_PER_SLOT],
            length,
        }
    }
}

/// A simple `ArrayServer` that serializes elements into in-memory byte
/// arrays, standing in for files on a remote disk.
///
/// Only `key` and `aux` are persisted; the payload is reconstructed blank on
/// retrieval, modelling the client memory a real deployment would spend per
/// transferred block.
#[derive(Debug, Default)]
pub struct SimpleServer<const B: BlockSize> {
    table: HashMap<ArrayName, DiskArray>,
}

impl<const B: BlockSize> SimpleServer<B> {
    /// Returns a new server holding no arrays.
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Returns the number of arrays currently live at the server.
    pub fn array_count(&self) -> usize {
        self.table.len()
    }

    fn array(&self, name: ArrayName) -> Result<&DiskArray, OrpError> {
        self.table.get(&name).ok_or(OrpError::ArrayNotFoundError(name))
    }

    fn array_mut(&mut self, name: ArrayName) -> Result<&mut DiskArray, OrpError> {
        self.table
            .get_mut(&name)
            .ok_or(OrpError::ArrayNotFoundError(name))
    }
}

impl<const B: BlockSize> ArrayServer<B> for SimpleServer<B> {
    fn create_array(&mut self, name: ArrayName, length: u32) -> Result<(), OrpError> {
        if self.table.contains_key(&name) {
            return Err(OrpError::ArrayAlreadyExistsError(name));
        }
        self.table.insert(name, DiskArray::new(length));
        Ok(())
    }

    fn get(&mut self, name: ArrayName, index: ArrayIndex) -> Result<Element<B>, OrpError> {
        let array = self.array(name)?;
        if index >= array.length {
            return Err(OrpError::AddressOutOfBoundsError {
                name,
                index,
                length: array.length,
            });
        }
        let offset = index as usize * BYTES_PER_SLOT;
        let mut word = [0u8; 8];
        word.copy_from_slice(&array.data[offset..offset + 8]);
        let word = u64::from_le_bytes(word);
        Ok(Element {
            key: word as u32,
            aux: (word >> 32) as u32,
            value: BlockValue::default(),
        })
    }

    fn put(
        &mut self,
        name: ArrayName,
        index: ArrayIndex,
        element: Element<B>,
    ) -> Result<(), OrpError> {
        let array = self.array_mut(name)?;
        if index >= array.length {
            return Err(OrpError::AddressOutOfBoundsError {
                name,
                index,
                length: array.length,
            });
        }
        let word = ((element.aux as u64) << 32) | element.key as u64;
        let offset = index as usize * BYTES_PER_SLOT;
        array.data[offset..offset + 8].copy_from_slice(&word.to_le_bytes());
        array.data[offset + 8] = SLOT_TERMINATOR;
        Ok(())
    }

    fn check(&self, name: ArrayName, index: ArrayIndex) -> bool {
        match self.table.get(&name) {
            Some(array) => index < array.length,
            None => false,
        }
    }

    fn delete_array(&mut self, name: ArrayName) -> Result<(), OrpError> {
        self.table
            .remove(&name)
            .map(|_| ())
            .ok_or(OrpError::ArrayNotFoundError(name))
    }
}

/// A server that counts gets and puts.
///
/// `check` is a metadata probe and is deliberately not counted; everything
/// else forwards to an inner [`SimpleServer`].
#[derive(Debug, Default)]
pub struct CountAccessesServer<const B: BlockSize> {
    server: SimpleServer<B>,
    get_count: u64,
    put_count: u64,
}

impl<const B: BlockSize> CountAccessesServer<B> {
    /// Returns a new counting server holding no arrays.
    pub fn new() -> Self {
        Self {
            server: SimpleServer::new(),
            get_count: 0,
            put_count: 0,
        }
    }

    /// Returns the total number of gets served.
    pub fn get_count(&self) -> u64 {
        self.get_count
    }

    /// Returns the total number of puts served.
    pub fn put_count(&self) -> u64 {
        self.put_count
    }

    /// Returns the total number of I/O operations (gets plus puts) served.
    pub fn io_count(&self) -> u64 {
        self.get_count + self.put_count
    }

    /// Resets the I/O counters.
    pub fn reset_io(&mut self) {
        self.get_count = 0;
        self.put_count = 0;
    }

    /// Returns the number of arrays currently live at the server.
    pub fn array_count(&self) -> usize {
        self.server.array_count()
    }
}

impl<const B: BlockSize> ArrayServer<B> for CountAccessesServer<B> {
    fn create_array(&mut self, name: ArrayName, length: u32) -> Result<(), OrpError> {
        self.server.create_array(name, length)
    }

    fn get(&mut self, name: ArrayName, index: ArrayIndex) -> Result<Element<B>, OrpError> {
        log::debug!("Physical get -- {}[{}]", name, index);

        self.get_count += 1;
        self.server.get(name, index)
    }

    fn put(
        &mut self,
        name: ArrayName,
        index: ArrayIndex,
        element: Element<B>,
    ) -> Result<(), OrpError> {
        log::debug!("Physical put -- {}[{}]", name, index);

        self.put_count += 1;
        self.server.put(name, index, element)
    }

    fn check(&self, name: ArrayName, index: ArrayIndex) -> bool {
        self.server.check(name, index)
    }

    fn delete_array(&mut self, name: ArrayName) -> Result<(), OrpError> {
        self.server.delete_array(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_logger;

    #[test]
    fn element_round_trip() {
        init_logger();

        let mut server = SimpleServer::<16>::new();
        server.create_array(0, 4).unwrap();
        let mut element = Element::new(7);
        element.aux = 0xdead_beef;
        server.put(0, 2, element).unwrap();

        let back = server.get(0, 2).unwrap();
        assert_eq!(back.key, 7);
        assert_eq!(back.aux, 0xdead_beef);
    }

    #[test]
    fn create_fails_on_live_name() {
        let mut server = SimpleServer::<16>::new();
        server.create_array(3, 4).unwrap();
        assert!(matches!(
            server.create_array(3, 8),
            Err(OrpError::ArrayAlreadyExistsError(3))
        ));
    }

    #[test]
    fn access_checks_bounds() {
        let mut server = SimpleServer::<16>::new();
        server.create_array(0, 4).unwrap();
        assert!(server.check(0, 3));
        assert!(!server.check(0, 4));
        assert!(!server.check(1, 0));
        assert!(matches!(
            server.get(0, 4),
            Err(OrpError::AddressOutOfBoundsError { index: 4, .. })
        ));
        assert!(matches!(
            server.put(0, 4, Element::new(0)),
            Err(OrpError::AddressOutOfBoundsError { .. })
        ));
    }

    #[test]
    fn delete_releases_the_name() {
        let mut server = SimpleServer::<16>::new();
        server.create_array(0, 4).unwrap();
        server.delete_array(0).unwrap();
        assert_eq!(server.array_count(), 0);
        assert!(matches!(
            server.delete_array(0),
            Err(OrpError::ArrayNotFoundError(0))
        ));
        // the name is reusable after deletion
        server.create_array(0, 2).unwrap();
    }

    #[test]
    fn counting_server_counts_gets_and_puts_only() {
        init_logger();

        let mut server = CountAccessesServer::<16>::new();
        server.create_array(0, 4).unwrap();
        server.put(0, 0, Element::new(1)).unwrap();
        server.put(0, 1, Element::new(2)).unwrap();
        let _ = server.get(0, 0).unwrap();
        assert!(server.check(0, 0));

        assert_eq!(server.put_count(), 2);
        assert_eq!(server.get_count(), 1);
        assert_eq!(server.io_count(), 3);

        server.reset_io();
        assert_eq!(server.io_count(), 0);
    }
}
