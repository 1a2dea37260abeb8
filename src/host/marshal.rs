//! Scoped ownership of boundary values
//!
//! Each native allocation a wrapper receives is wrapped in a guard before
//! anything else happens, so it is released on every exit path.

use std::ffi::{c_char, CStr, CString};
use crate::ffi::{self, BoundaryError, ByteBuffer, ErrorCode};
use crate::host::HostError;

/// Error record for one call. Released on drop.
#[derive(Debug, Default)]
pub struct ErrorSlot(BoundaryError);

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_mut_ptr(&mut self) -> *mut BoundaryError {
        &mut self.0
    }

    /// Convert the recorded outcome into a `Result`
    pub fn check(&self) -> Result<(), HostError> {
        if self.0.is_success() {
            return Ok(());
        }
        let message = if self.0.message.is_null() {
            String::new()
        } else {
            // SAFETY: non-null messages are NUL-terminated native allocations.
            unsafe { CStr::from_ptr(self.0.message) }.to_string_lossy().into_owned()
        };
        Err(match ErrorCode::from_i32(self.0.code) {
            Some(code) => HostError::Boundary { code, message },
            None => HostError::UnknownCode { code: self.0.code, message },
        })
    }
}

impl Drop for ErrorSlot {
    fn drop(&mut self) {
        // SAFETY: the slot owns an initialized record.
        unsafe { ffi::ledger_error_free(&mut self.0) };
    }
}

/// Run one boundary call and surface its error
pub fn call<T>(f: impl FnOnce(*mut BoundaryError) -> T) -> Result<T, HostError> {
    let mut slot = ErrorSlot::new();
    let value = f(slot.as_mut_ptr());
    slot.check()?;
    Ok(value)
}

/// Native string owned by the wrapper until dropped
#[derive(Debug)]
pub struct NativeString(*mut c_char);

impl NativeString {
    pub fn new(ptr: *mut c_char) -> Self {
        Self(ptr)
    }

    pub fn to_string_checked(&self) -> Result<String, HostError> {
        if self.0.is_null() {
            return Err(HostError::EmptyResult);
        }
        // SAFETY: non-null results are NUL-terminated native allocations.
        Ok(unsafe { CStr::from_ptr(self.0) }.to_string_lossy().into_owned())
    }
}

impl Drop for NativeString {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // SAFETY: the guard is the only owner of the pointer.
            unsafe { ffi::ledger_free_string(self.0) };
        }
    }
}

/// Native byte buffer owned by the wrapper until dropped
#[derive(Debug)]
pub struct NativeBytes(ByteBuffer);

impl NativeBytes {
    pub fn new(buffer: ByteBuffer) -> Self {
        Self(buffer)
    }

    pub fn to_vec_checked(&self) -> Result<Vec<u8>, HostError> {
        if self.0.is_null() {
            return Err(HostError::EmptyResult);
        }
        // SAFETY: the buffer is live until this guard drops.
        Ok(unsafe { self.0.as_slice() }.to_vec())
    }
}

impl Drop for NativeBytes {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // SAFETY: the guard is the only owner of the buffer.
            unsafe { ffi::ledger_free_bytes(self.0) };
        }
    }
}

/// Call that returns a native string
pub fn call_string(f: impl FnOnce(*mut BoundaryError) -> *mut c_char) -> Result<String, HostError> {
    let out = call(|err| NativeString::new(f(err)))?;
    out.to_string_checked()
}

/// Call that returns a native byte buffer
pub fn call_bytes(f: impl FnOnce(*mut BoundaryError) -> ByteBuffer) -> Result<Vec<u8>, HostError> {
    let out = call(|err| NativeBytes::new(f(err)))?;
    out.to_vec_checked()
}

/// Host string argument. The `CString` is dropped by the caller on every path.
pub fn c_string(value: &str, name: &'static str) -> Result<CString, HostError> {
    CString::new(value).map_err(|_| HostError::InteriorNul(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::buffer::{alloc_bytes, alloc_string};

    #[test]
    fn test_error_slot_reports_code_and_message() {
        let result = call(|err| unsafe {
            (*err).set(ErrorCode::InvalidNonce, "invalid nonce: expected 1, got 3");
        });
        match result {
            Err(HostError::Boundary { code, message }) => {
                assert_eq!(code, ErrorCode::InvalidNonce);
                assert_eq!(message, "invalid nonce: expected 1, got 3");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_code_surfaces() {
        let result = call(|err| unsafe { (*err).code = 77 });
        assert!(matches!(result, Err(HostError::UnknownCode { code: 77, .. })));
    }

    #[test]
    fn test_guards_release_results() {
        let ptr = alloc_string("x".into());
        drop(NativeString::new(ptr));
        assert!(!ffi::buffer::free_string(ptr));

        let buf = alloc_bytes(vec![1]);
        assert_eq!(NativeBytes::new(buf).to_vec_checked().unwrap(), vec![1]);
        assert!(!ffi::buffer::free_bytes(buf));
    }

    #[test]
    fn test_interior_nul_rejected() {
        assert!(matches!(c_string("a\0b", "address"), Err(HostError::InteriorNul("address"))));
    }
}
