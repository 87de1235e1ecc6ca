//! One ranged segment transfer: GET with `Range`, positional writes, cursor
//! bookkeeping for resume.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::control::CancelToken;
use crate::probe::{MAX_REDIRECTS, USER_AGENT};
use crate::progress::ProgressState;
use crate::retry::TransferError;
use crate::segmenter::Segment;
use crate::storage::StorageWriter;

pub(super) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Abort when throughput stays under 1 KiB/s for this long (idle-read limit).
pub(super) const STALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Hard ceiling so a wedged transfer cannot hang a worker forever.
pub(super) const TRANSFER_TIMEOUT: Duration = Duration::from_secs(3600);

/// Downloads one segment, resuming `cursor` bytes in. The cursor survives the
/// attempt on failure, so a retry re-enters at `start + cursor` and the bytes
/// already on disk are kept.
///
/// The transfer aborts as soon as `cancel` or `halt` trips (checked from the
/// curl progress callback), when the server answers a ranged request with
/// 200, or when the `Content-Range` total stops matching `expected_total`.
#[allow(clippy::too_many_arguments)]
pub(super) fn download_segment(
    url: &str,
    segment: &Segment,
    expected_total: u64,
    cursor: &AtomicU64,
    storage: &StorageWriter,
    state: &ProgressState,
    cancel: &CancelToken,
    halt: &CancelToken,
) -> Result<(), TransferError> {
    let already = cursor.load(Ordering::Relaxed);
    if already >= segment.len() {
        return Ok(());
    }

    let _connection = state.connection();

    let status: Cell<Option<u32>> = Cell::new(None);
    let range_total: Cell<Option<u64>> = Cell::new(None);
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
    easy.progress(true).map_err(TransferError::Curl)?;
    easy.range(&segment.range_value_from(already))
        .map_err(TransferError::Curl)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|line| {
                if let Ok(s) = std::str::from_utf8(line) {
                    let s = s.trim_end();
                    if s.starts_with("HTTP/") {
                        // New hop after a redirect: forget the previous block.
                        status.set(parse_status_line(s));
                        range_total.set(None);
                    } else if let Some((name, value)) = s.split_once(':') {
                        if name.trim().eq_ignore_ascii_case("content-range") {
                            range_total.set(parse_content_range_total(value.trim()));
                        }
                    }
                }
                true
            })
            .map_err(TransferError::Curl)?;
        transfer
            .progress_function(|_, _, _, _| !cancel.is_canceled() && !halt.is_canceled())
            .map_err(TransferError::Curl)?;
        transfer
            .write_function(|data| {
                match status.get() {
                    Some(206) => {}
                    // 200 means the range was ignored; never write the full
                    // body into a segment's slot. Abort before the first byte.
                    Some(200) => return Ok(0),
                    // Error bodies (4xx/5xx) are consumed and discarded so
                    // the status check after perform() sees the real code.
                    _ => return Ok(data.len()),
                }
                if let Some(total) = range_total.get() {
                    if total != expected_total {
                        return Ok(0);
                    }
                }
                let offset = cursor.fetch_add(data.len() as u64, Ordering::Relaxed);
                match storage.write_at(segment.start + offset, data) {
                    Ok(()) => {
                        state.record_bytes(data.len() as u64);
                        Ok(data.len())
                    }
                    Err(e) => {
                        cursor.store(offset, Ordering::Relaxed);
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
            if status.get() == Some(200) && e.is_write_error() {
                return Err(TransferError::RangeNotHonored);
            }
            if let (Some(total), true) = (range_total.get(), e.is_write_error()) {
                if total != expected_total {
                    return Err(TransferError::LengthChanged {
                        expected: expected_total,
                        got: total,
                    });
                }
            }
            return Err(TransferError::Curl(e));
        }
    }

    let code = easy.response_code().map_err(TransferError::Curl)?;
    if code == 200 {
        return Err(TransferError::RangeNotHonored);
    }
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }
    if let Some(total) = range_total.get() {
        if total != expected_total {
            return Err(TransferError::LengthChanged {
                expected: expected_total,
                got: total,
            });
        }
    }

    let received = cursor.load(Ordering::Relaxed);
    if received != segment.len() {
        return Err(TransferError::PartialTransfer {
            expected: segment.len(),
            received,
        });
    }
    Ok(())
}

fn parse_status_line(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.split_once('/')?;
    total.trim().parse().ok()
}
