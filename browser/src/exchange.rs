//! Retransmit-with-backoff primitive for single request/response exchanges.
//!
//! The receive window starts at the minimum timeout and doubles after every
//! failed attempt, as does the number of back-to-back copies of the request.
//! The caller's overall budget bounds the whole exchange.

use crate::error::{BrowserError, Result};
use crate::transport::Transport;
use log::debug;
use shared::{ServerAddress, MAX_DATAGRAM_SIZE};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Time bounds of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    timeout: Duration,
    min_timeout: Duration,
    write_timeout: Duration,
}

impl RetryPolicy {
    /// A budget below `min_timeout` is raised to it. Sends share the budget
    /// unless [`RetryPolicy::with_write_timeout`] says otherwise.
    pub fn new(timeout: Duration, min_timeout: Duration) -> Self {
        let timeout = timeout.max(min_timeout);
        Self {
            timeout,
            min_timeout,
            write_timeout: timeout,
        }
    }

    /// Bound on each burst of sends.
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn min_timeout(&self) -> Duration {
        self.min_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
}

/// Sends `request` to `target` until `matcher` accepts a reply or the budget runs out.
///
/// Only datagrams whose source is `target` are offered to `matcher`; anything
/// else is dropped without ending the current receive window. A reply the
/// matcher rejects counts as a failed attempt. A failed send cuts the burst
/// short, but the receive window is still awaited, so callers only ever see
/// [`BrowserError::Timeout`] or [`BrowserError::Cancelled`] besides a match.
pub async fn exchange<T, R, F>(
    transport: &mut T,
    target: SocketAddr,
    request: &[u8],
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut matcher: F,
) -> Result<R>
where
    T: Transport + ?Sized,
    F: FnMut(&[u8], SocketAddr) -> Result<R>,
{
    let expected_source = ServerAddress::new(target);
    let started = Instant::now();
    let mut current_timeout = policy.min_timeout;
    let mut write_burst: u64 = 1;
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let time_left = policy.timeout.saturating_sub(started.elapsed());
        if time_left.is_zero() {
            return Err(BrowserError::Timeout);
        }

        let now = Instant::now();
        transport.set_read_deadline(Some(now + current_timeout.min(time_left)));
        transport.set_write_deadline(Some(now + policy.write_timeout));

        for _ in 0..write_burst {
            if let Err(e) = transport.send_to(request, target).await {
                debug!("Send to {} failed: {}", target, e);
                break;
            }
        }

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return Err(BrowserError::Cancelled),
                received = transport.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, from)) if ServerAddress::new(from) != expected_source => {
                    debug!("Dropping {} bytes from {}, waiting for {}", len, from, target);
                }
                Ok((len, from)) => match matcher(&buf[..len], from) {
                    Ok(response) => return Ok(response),
                    Err(e) => {
                        debug!("Rejected response from {}: {}", from, e);
                        break;
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => {
                    debug!("Receive from {} failed: {}", target, e);
                    break;
                }
            }
        }

        write_burst = write_burst.saturating_mul(2);
        current_timeout = current_timeout
            .saturating_mul(2)
            .min(policy.timeout.saturating_sub(started.elapsed()));
    }
}
