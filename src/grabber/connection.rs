//! Opening and closing the frame grabber.

use super::{FrameGeometry, FrameSource};
use crate::config::GrabberConfig;
use crate::error::{CaptureError, CaptureResult, SourceError};
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::time::sleep;

/// Defines a policy for retrying the grabber open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// The delay between attempts.
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_delay: Duration::ZERO,
        }
    }
}

impl From<&GrabberConfig> for RetryPolicy {
    fn from(config: &GrabberConfig) -> Self {
        Self {
            max_attempts: config.open_attempts,
            backoff_delay: Duration::from_millis(config.open_backoff_ms),
        }
    }
}

/// Open `source`, retrying according to `policy`.
///
/// # Errors
///
/// Returns [`CaptureError::OpenFailed`] with the last driver error once every
/// attempt has failed.
pub async fn open_with_retry<S: FrameSource + ?Sized>(
    source: &mut S,
    policy: &RetryPolicy,
) -> CaptureResult<FrameGeometry> {
    let attempts = policy.max_attempts.max(1);
    let mut last = SourceError::NotOpen;

    for attempt in 1..=attempts {
        match source.open() {
            Ok(geometry) => {
                tracing::info!(
                    source = source.name(),
                    attempt,
                    width = geometry.width,
                    height = geometry.height,
                    "Frame grabber open"
                );
                return Ok(geometry);
            }
            Err(err) => {
                tracing::warn!(source = source.name(), attempt, error = %err, "Open error");
                last = err;
            }
        }
        if attempt < attempts && !policy.backoff_delay.is_zero() {
            sleep(policy.backoff_delay).await;
        }
    }

    Err(CaptureError::OpenFailed { attempts, last })
}

/// Closes an open frame source when dropped.
///
/// A live acquisition is aborted first. Call [`GrabberGuard::disarm`] to hand
/// the still-open source on to another owner.
pub struct GrabberGuard<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
    armed: bool,
}

impl<'a, S: FrameSource + ?Sized> GrabberGuard<'a, S> {
    /// Guard an open source.
    pub fn new(source: &'a mut S) -> Self {
        Self {
            source,
            armed: true,
        }
    }

    /// Release the guard without closing the source.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl<S: FrameSource + ?Sized> Deref for GrabberGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.source
    }
}

impl<S: FrameSource + ?Sized> DerefMut for GrabberGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.source
    }
}

impl<S: FrameSource + ?Sized> Drop for GrabberGuard<'_, S> {
    fn drop(&mut self) {
        if !self.armed || !self.source.is_open() {
            return;
        }
        if self.source.is_live() {
            tracing::warn!(source = self.source.name(), "Aborting live acquisition");
            self.source.abort();
        }
        self.source.close();
        tracing::debug!(source = self.source.name(), "Frame grabber closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grabber::SimulatedGrabber;

    #[tokio::test]
    async fn test_open_succeeds_on_second_attempt() {
        let mut grabber = SimulatedGrabber::builder().failing_opens(1).build();
        let geometry = open_with_retry(&mut grabber, &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(geometry, FrameGeometry::grey8(1024, 150));
        assert_eq!(grabber.open_attempts(), 2);
        assert!(grabber.is_open());
    }

    #[tokio::test]
    async fn test_open_fails_after_policy_attempts() {
        let mut grabber = SimulatedGrabber::builder().failing_opens(5).build();
        let err = open_with_retry(&mut grabber, &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::OpenFailed {
                attempts: 2,
                last: SourceError::Open { .. }
            }
        ));
        assert_eq!(grabber.open_attempts(), 2);
    }

    #[tokio::test]
    async fn test_backoff_policy_is_honoured() {
        let mut grabber = SimulatedGrabber::builder().failing_opens(2).build();
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(5),
        };
        let started = std::time::Instant::now();
        open_with_retry(&mut grabber, &policy).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let mut grabber = SimulatedGrabber::builder().build();
        grabber.open().unwrap();
        {
            let mut guard = GrabberGuard::new(&mut grabber);
            guard.start_sequence(10).unwrap();
        }
        assert!(!grabber.is_open());
        assert!(!grabber.is_live());
    }

    #[test]
    fn test_disarmed_guard_leaves_source_open() {
        let mut grabber = SimulatedGrabber::builder().build();
        grabber.open().unwrap();
        GrabberGuard::new(&mut grabber).disarm();
        assert!(grabber.is_open());
    }
}
