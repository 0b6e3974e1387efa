//! Window-function callback surface: partition-local storage and the
//! position/argument queries exposed to window routines.

use crate::errors::PlScriptError;
use crate::storage::tuple::Datum;

pub const SEEK_CURRENT: i32 = 0;
pub const SEEK_HEAD: i32 = 1;
pub const SEEK_TAIL: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Current,
    Head,
    Tail,
}

impl SeekOrigin {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            SEEK_CURRENT => Self::Current,
            SEEK_HEAD => Self::Head,
            SEEK_TAIL => Self::Tail,
            _ => return None,
        })
    }
}

/// Partition-local byte storage. The first allocation fixes `max_length`;
/// later writes must fit within it.
#[derive(Debug, Clone, Default)]
pub struct WindowLocalStorage {
    max_length: usize,
    data: Vec<u8>,
}

impl WindowLocalStorage {
    /// Fixes the capacity on first use; later hints never shrink or grow it.
    pub fn reserve(&mut self, size: usize) {
        if self.max_length == 0 {
            self.max_length = size;
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn payload(&self) -> Option<&[u8]> {
        if self.data.is_empty() {
            None
        } else {
            Some(&self.data)
        }
    }

    pub fn set_payload(&mut self, bytes: &[u8]) -> Result<(), PlScriptError> {
        if self.max_length == 0 {
            self.max_length = bytes.len();
        } else if bytes.len() > self.max_length {
            return Err(PlScriptError::execution("window local memory overflow"));
        }
        self.data.clear();
        self.data.extend_from_slice(bytes);
        Ok(())
    }
}

/// Host surface for one window-function partition. Argument queries return
/// `None` when the requested row is outside the partition or frame.
pub trait WindowPartition {
    fn local_storage(&mut self, size_hint: usize)
    -> Result<&mut WindowLocalStorage, PlScriptError>;

    fn current_position(&self) -> i64;
    fn partition_row_count(&self) -> i64;
    fn set_mark_position(&mut self, position: i64) -> Result<(), PlScriptError>;
    fn rows_are_peers(&self, pos1: i64, pos2: i64) -> Result<bool, PlScriptError>;

    fn arg_in_partition(
        &mut self,
        argno: usize,
        relpos: i32,
        seek: SeekOrigin,
        set_mark: bool,
    ) -> Result<Option<Datum>, PlScriptError>;

    fn arg_in_frame(
        &mut self,
        argno: usize,
        relpos: i32,
        seek: SeekOrigin,
        set_mark: bool,
    ) -> Result<Option<Datum>, PlScriptError>;

    fn arg_current(&mut self, argno: usize) -> Result<Datum, PlScriptError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reserve_fixes_capacity() {
        let mut storage = WindowLocalStorage::default();
        storage.reserve(8);
        storage.reserve(1000);
        assert_eq!(storage.max_length(), 8);
        storage.set_payload(b"12345678").expect("fits exactly");
        let err = storage
            .set_payload(b"123456789")
            .expect_err("overflow should fail");
        assert!(matches!(err, PlScriptError::Execution { .. }));
    }

    #[test]
    fn empty_storage_has_no_payload() {
        let mut storage = WindowLocalStorage::default();
        assert!(storage.payload().is_none());
        storage.set_payload(b"{}").expect("write should succeed");
        assert_eq!(storage.payload(), Some(&b"{}"[..]));
    }
}
