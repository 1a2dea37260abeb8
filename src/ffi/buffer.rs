//! Native result allocations
//!
//! Strings and byte buffers handed to the host are recorded in a ledger
//! keyed by address. The free functions release only what is in the
//! ledger, so a double free or a foreign pointer is reported as `false`
//! instead of corrupting the allocator.

use std::collections::HashMap;
use std::ffi::{c_char, CString};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Allocation {
    String,
    Bytes { len: usize },
}

static LEDGER: Lazy<Mutex<HashMap<usize, Allocation>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Owned byte buffer crossing the boundary. Released with `ledger_free_bytes`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteBuffer {
    pub len: usize,
    pub data: *mut u8,
}

impl ByteBuffer {
    pub fn null() -> Self {
        Self { len: 0, data: std::ptr::null_mut() }
    }

    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// View the contents.
    ///
    /// # Safety
    /// `data` must point to `len` readable bytes that outlive the returned slice.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        if self.data.is_null() {
            return &[];
        }
        std::slice::from_raw_parts(self.data, self.len)
    }
}

/// Hand a string to the host. Interior NULs are dropped.
pub fn alloc_string(text: String) -> *mut c_char {
    let text = match CString::new(text) {
        Ok(c) => c,
        Err(e) => {
            let mut bytes = e.into_vec();
            bytes.retain(|b| *b != 0);
            CString::new(bytes).unwrap_or_default()
        }
    };
    let ptr = text.into_raw();
    LEDGER.lock().insert(ptr as usize, Allocation::String);
    ptr
}

/// Release a string from `alloc_string`. `false` if it is not live.
pub fn free_string(ptr: *mut c_char) -> bool {
    if ptr.is_null() {
        return false;
    }
    let mut ledger = LEDGER.lock();
    match ledger.get(&(ptr as usize)) {
        Some(Allocation::String) => {
            ledger.remove(&(ptr as usize));
            drop(ledger);
            // SAFETY: the ledger only holds pointers from `CString::into_raw`.
            drop(unsafe { CString::from_raw(ptr) });
            true
        }
        _ => {
            warn!(ptr = ptr as usize, "free of a string that is not live");
            false
        }
    }
}

/// Hand bytes to the host. Empty results are the null buffer.
pub fn alloc_bytes(bytes: Vec<u8>) -> ByteBuffer {
    if bytes.is_empty() {
        return ByteBuffer::null();
    }
    let boxed = bytes.into_boxed_slice();
    let len = boxed.len();
    let data = Box::into_raw(boxed) as *mut u8;
    LEDGER.lock().insert(data as usize, Allocation::Bytes { len });
    ByteBuffer { len, data }
}

/// Release a buffer from `alloc_bytes`. `false` if it is not live.
pub fn free_bytes(buffer: ByteBuffer) -> bool {
    if buffer.data.is_null() {
        return false;
    }
    let mut ledger = LEDGER.lock();
    match ledger.get(&(buffer.data as usize)).copied() {
        Some(Allocation::Bytes { len }) => {
            ledger.remove(&(buffer.data as usize));
            drop(ledger);
            if len != buffer.len {
                warn!(recorded = len, given = buffer.len, "byte buffer freed with a different length");
            }
            // SAFETY: recorded from `Box<[u8]>::into_raw` with this length.
            drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(buffer.data, len)) });
            true
        }
        _ => {
            warn!(ptr = buffer.data as usize, "free of a byte buffer that is not live");
            false
        }
    }
}

/// Number of native allocations the host has not released yet
pub fn live_allocations() -> usize {
    LEDGER.lock().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_string_freed_once() {
        let ptr = alloc_string("hello".into());
        assert_eq!(unsafe { CStr::from_ptr(ptr) }.to_str().unwrap(), "hello");
        assert!(free_string(ptr));
        assert!(!free_string(ptr));
    }

    #[test]
    fn test_interior_nul_dropped() {
        let ptr = alloc_string("a\0b".into());
        assert_eq!(unsafe { CStr::from_ptr(ptr) }.to_str().unwrap(), "ab");
        assert!(free_string(ptr));
    }

    #[test]
    fn test_bytes_freed_once() {
        let buf = alloc_bytes(vec![1, 2, 3]);
        assert_eq!(unsafe { buf.as_slice() }, &[1, 2, 3]);
        assert!(free_bytes(buf));
        assert!(!free_bytes(buf));
    }

    #[test]
    fn test_kinds_do_not_mix() {
        let buf = alloc_bytes(vec![7; 4]);
        assert!(!free_string(buf.data as *mut c_char));
        assert!(free_bytes(buf));
    }

    #[test]
    fn test_foreign_and_null_pointers_refused() {
        let mut local = [0u8; 4];
        assert!(!free_bytes(ByteBuffer { len: 4, data: local.as_mut_ptr() }));
        assert!(!free_bytes(ByteBuffer::null()));
        assert!(!free_string(std::ptr::null_mut()));
        assert!(alloc_bytes(vec![]).is_null());
    }
}
