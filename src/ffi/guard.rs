//! Panic containment and argument checks for extern functions

use std::any::Any;
use std::ffi::{c_char, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error};
use crate::ffi::buffer::ByteBuffer;
use crate::ffi::error::{BoundaryError, BridgeError, ErrorCode};

/// Value an extern function returns when it fails
pub trait Sentinel {
    fn sentinel() -> Self;
}

impl Sentinel for u64 {
    fn sentinel() -> Self {
        0
    }
}

impl Sentinel for bool {
    fn sentinel() -> Self {
        false
    }
}

impl Sentinel for *mut c_char {
    fn sentinel() -> Self {
        std::ptr::null_mut()
    }
}

impl Sentinel for ByteBuffer {
    fn sentinel() -> Self {
        ByteBuffer::null()
    }
}

/// Run the body of an extern function.
///
/// Resets `*err`, runs `body` under `catch_unwind` and records its outcome.
/// A null `err` is a contract violation: the body is not run.
///
/// # Safety
/// `err` must be null or point to a writable, initialized `BoundaryError`.
pub unsafe fn boundary<T, F>(err: *mut BoundaryError, op: &'static str, body: F) -> T
where
    T: Sentinel,
    F: FnOnce() -> Result<T, BridgeError>,
{
    let Some(err) = err.as_mut() else {
        error!(op, "called with a null error pointer; refusing to run");
        return T::sentinel();
    };
    err.clear();

    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            let code = e.code();
            debug!(op, code = code.as_i32(), error = %e, "boundary call failed");
            err.set(code, &e.to_string());
            T::sentinel()
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(op, panic = %message, "panic caught at the boundary");
            err.set(ErrorCode::InternalPanic, &format!("panic in {op}: {message}"));
            T::sentinel()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Borrow a C string argument
///
/// # Safety
/// `ptr` must be null or a NUL-terminated string valid for `'a`.
pub unsafe fn cstr_arg<'a>(ptr: *const c_char, name: &'static str) -> Result<&'a str, BridgeError> {
    if ptr.is_null() {
        return Err(BridgeError::NullPointer(name));
    }
    CStr::from_ptr(ptr).to_str().map_err(|_| BridgeError::InvalidUtf8(name))
}

/// Borrow a `(pointer, length)` byte argument
///
/// # Safety
/// `ptr` must be null or point to `len` readable bytes valid for `'a`.
pub unsafe fn bytes_arg<'a>(ptr: *const u8, len: usize, name: &'static str) -> Result<&'a [u8], BridgeError> {
    if ptr.is_null() {
        return Err(BridgeError::NullPointer(name));
    }
    Ok(std::slice::from_raw_parts(ptr, len))
}
