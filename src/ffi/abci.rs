//! ABCI entry point
//!
//! Buffer in, buffer out. The request is one JSON `AbciRequest`, the
//! response one JSON `AbciResponse` owned by the caller until
//! `ledger_free_bytes`. `Info` and `Query` run under the instance's shared
//! lock; everything else takes it exclusively.

use crate::abci::AbciRequest;
use crate::ffi::buffer::{self, ByteBuffer};
use crate::ffi::error::BoundaryError;
use crate::ffi::guard::{boundary, bytes_arg};
use crate::ffi::registry::{self, Handle};

/// # Safety
/// `request` must be null or point to `request_len` readable bytes; `err`
/// see `boundary`.
#[no_mangle]
pub unsafe extern "C" fn ledger_abci_process(
    handle: Handle,
    request: *const u8,
    request_len: usize,
    err: *mut BoundaryError,
) -> ByteBuffer {
    boundary(err, "abci_process", || {
        let app = registry::chain(handle)?;
        let request = AbciRequest::decode(bytes_arg(request, request_len, "request")?)?;

        let response = if request.is_read_only() {
            app.read().respond(&request)?
        } else {
            app.write().process(request)?
        };
        Ok(buffer::alloc_bytes(response.encode()?))
    })
}
