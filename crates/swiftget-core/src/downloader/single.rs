//! Single-stream fallback: one sequential GET with no range assumption.

use std::cell::{Cell, RefCell};

use crate::control::CancelToken;
use crate::probe::{MAX_REDIRECTS, USER_AGENT};
use crate::progress::ProgressState;
use crate::retry::{run_with_retry, RetryPolicy, TransferError};
use crate::storage::StorageWriter;

use super::worker::{CONNECT_TIMEOUT, STALL_TIMEOUT, TRANSFER_TIMEOUT};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Fetches the whole body sequentially into `storage`. Returns bytes written.
///
/// The origin does not honor ranges here, so a retry cannot resume: each
/// attempt truncates the file and resets the progress counter before
/// starting over.
pub(super) fn download_single(
    url: &str,
    storage: &StorageWriter,
    expected_len: Option<u64>,
    state: &ProgressState,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> Result<u64, TransferError> {
    run_with_retry(policy, cancel, || {
        state.reset();
        storage.truncate().map_err(TransferError::Storage)?;
        single_attempt(url, storage, expected_len, state, cancel)
    })
}

fn single_attempt(
    url: &str,
    storage: &StorageWriter,
    expected_len: Option<u64>,
    state: &ProgressState,
    cancel: &CancelToken,
) -> Result<u64, TransferError> {
    let _connection = state.connection();

    let offset: Cell<u64> = Cell::new(0);
    let storage_error: RefCell<Option<std::io::Error>> = RefCell::new(None);

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(TransferError::Curl)?;
    easy.useragent(USER_AGENT).map_err(TransferError::Curl)?;
    easy.follow_location(true).map_err(TransferError::Curl)?;
    easy.max_redirections(MAX_REDIRECTS).map_err(TransferError::Curl)?;
    easy.connect_timeout(CONNECT_TIMEOUT).map_err(TransferError::Curl)?;
    easy.low_speed_limit(1024).map_err(TransferError::Curl)?;
    easy.low_speed_time(STALL_TIMEOUT).map_err(TransferError::Curl)?;
    easy.timeout(TRANSFER_TIMEOUT).map_err(TransferError::Curl)?;
    easy.buffer_size(READ_BUFFER_SIZE).map_err(TransferError::Curl)?;
    easy.progress(true).map_err(TransferError::Curl)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .progress_function(|_, _, _, _| !cancel.is_canceled())
            .map_err(TransferError::Curl)?;
        transfer
            .write_function(|data| {
                let at = offset.get();
                match storage.write_at(at, data) {
                    Ok(()) => {
                        offset.set(at + data.len() as u64);
                        state.record_bytes(data.len() as u64);
                        Ok(data.len())
                    }
                    Err(e) => {
                        *storage_error.borrow_mut() = Some(e);
                        Ok(0)
                    }
                }
            })
            .map_err(TransferError::Curl)?;

        if let Err(e) = transfer.perform() {
            if let Some(io_err) = storage_error.borrow_mut().take() {
                return Err(TransferError::Storage(io_err));
            }
            return Err(TransferError::Curl(e));
        }
    }

    let code = easy.response_code().map_err(TransferError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }

    let written = offset.get();
    if let Some(expected) = expected_len {
        if written != expected {
            return Err(TransferError::PartialTransfer {
                expected,
                received: written,
            });
        }
    }
    Ok(written)
}
