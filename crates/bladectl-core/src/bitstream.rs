//! FPGA bitstream loading
//!
//! Loading is a fixed sequence: begin programming, stream the image, end
//! programming, then poll until the FPGA reports configured. The loader
//! walks that sequence as an explicit state machine and sleeps between
//! polls through an injected [`Clock`], so tests run without real delays.
//!
//! ```text
//! Idle -> Began -> ImageSent -> Ended -> Polling -> Configured
//!                                           \-> TimedOut
//! (any transport error)                     -> Failed
//! ```

use core::time::Duration;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Loader progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing issued yet
    Idle,
    /// Begin-programming accepted
    Began,
    /// Whole image transferred
    ImageSent,
    /// End-programming accepted
    Ended,
    /// Waiting for the FPGA to report configured
    Polling,
    /// FPGA reports configured (terminal)
    Configured,
    /// Poll budget exhausted (terminal)
    TimedOut,
    /// Transport error (terminal)
    Failed,
}

impl LoadState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Configured | Self::TimedOut | Self::Failed)
    }
}

/// How often and how long to poll for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of `is_configured` calls
    pub attempts: u32,
    /// Delay between two consecutive polls
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(200),
        }
    }
}

/// Source of delays
pub trait Clock {
    /// Block for `duration`
    fn sleep(&mut self, duration: Duration);
}

/// Clock backed by `std::thread::sleep`
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Drives one bitstream load against a transport
///
/// A loader is single use: create one per load. Loads on the same
/// transport must not overlap.
pub struct BitstreamLoader<'a, T: Transport + ?Sized, C: Clock> {
    transport: &'a mut T,
    clock: C,
    policy: PollPolicy,
    state: LoadState,
    polls: u32,
}

impl<'a, T: Transport + ?Sized, C: Clock> BitstreamLoader<'a, T, C> {
    /// Loader using the transport's own poll policy
    pub fn new(transport: &'a mut T, clock: C) -> Self {
        let policy = transport.fpga_poll_policy();
        Self {
            transport,
            clock,
            policy,
            state: LoadState::Idle,
            polls: 0,
        }
    }

    /// Override the poll policy
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current state
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Number of `is_configured` polls issued so far
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Run the whole load sequence.
    ///
    /// On a transport error after programming has begun, end-programming
    /// is still attempted once before the error is returned.
    pub fn load(&mut self, image: &[u8]) -> Result<()> {
        if self.state != LoadState::Idle {
            return Err(Error::Protocol);
        }
        if image.is_empty() {
            return Err(Error::BufferTooSmall);
        }

        log::info!("Loading FPGA bitstream ({} bytes)", image.len());

        if let Err(e) = self.transport.begin_program() {
            return Err(self.fail(e));
        }
        self.transition(LoadState::Began);

        if let Err(e) = self.transport.write_image(image) {
            self.cleanup();
            return Err(self.fail(e));
        }
        self.transition(LoadState::ImageSent);

        if let Err(e) = self.transport.end_program() {
            return Err(self.fail(e));
        }
        self.transition(LoadState::Ended);

        self.transition(LoadState::Polling);
        for attempt in 0..self.policy.attempts {
            if attempt > 0 {
                self.clock.sleep(self.policy.interval);
            }
            self.polls += 1;
            match self.transport.is_configured() {
                Ok(true) => {
                    self.transition(LoadState::Configured);
                    return self.transport.fpga_loaded();
                }
                Ok(false) => log::trace!("FPGA not configured yet (poll {})", self.polls),
                Err(e) => return Err(self.fail(e)),
            }
        }

        log::warn!("FPGA did not report configured after {} polls", self.polls);
        self.transition(LoadState::TimedOut);
        Err(Error::Timeout)
    }

    fn transition(&mut self, next: LoadState) {
        log::debug!("bitstream load: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn cleanup(&mut self) {
        if let Err(e) = self.transport.end_program() {
            log::warn!("Failed to end FPGA programming during cleanup: {}", e);
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        log::error!("FPGA load failed in state {:?}: {}", self.state, error);
        self.transition(LoadState::Failed);
        error
    }
}

/// Load `image` with the transport's poll policy and the given clock
pub fn load_bitstream<T: Transport + ?Sized, C: Clock>(
    transport: &mut T,
    clock: C,
    image: &[u8],
) -> Result<()> {
    BitstreamLoader::new(transport, clock).load(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use std::vec::Vec;

    #[derive(Default)]
    struct FakeClock {
        sleeps: Vec<Duration>,
    }

    impl Clock for &mut FakeClock {
        fn sleep(&mut self, duration: Duration) {
            self.sleeps.push(duration);
        }
    }

    const IMAGE: &[u8] = &[0xaa; 64];

    #[test]
    fn test_configures_after_three_polls() {
        let mut dev = MockTransport::new();
        dev.configured_after = Some(3);
        let mut clock = FakeClock::default();

        let mut loader = BitstreamLoader::new(&mut dev, &mut clock);
        assert_eq!(loader.load(IMAGE), Ok(()));
        assert_eq!(loader.state(), LoadState::Configured);
        assert_eq!(loader.polls(), 3);

        assert_eq!(clock.sleeps, std::vec![Duration::from_millis(200); 2]);
        assert_eq!(
            dev.calls,
            std::vec![
                "begin_program",
                "write_image",
                "end_program",
                "is_configured",
                "is_configured",
                "is_configured",
                "fpga_loaded",
            ]
        );
    }

    #[test]
    fn test_times_out_after_poll_budget() {
        let mut dev = MockTransport::new();
        let mut clock = FakeClock::default();

        let mut loader = BitstreamLoader::new(&mut dev, &mut clock).with_policy(PollPolicy {
            attempts: 5,
            interval: Duration::from_millis(10),
        });
        assert_eq!(loader.load(IMAGE), Err(Error::Timeout));
        assert_eq!(loader.state(), LoadState::TimedOut);
        assert_eq!(loader.polls(), 5);
        assert_eq!(clock.sleeps.len(), 4);
        assert!(!dev.calls.contains(&"fpga_loaded"));
    }

    #[test]
    fn test_transfer_failure_ends_programming() {
        let mut dev = MockTransport::new();
        dev.fail_on = Some("write_image");
        let mut clock = FakeClock::default();

        let mut loader = BitstreamLoader::new(&mut dev, &mut clock);
        assert_eq!(loader.load(IMAGE), Err(Error::Io));
        assert_eq!(loader.state(), LoadState::Failed);
        assert_eq!(dev.calls, std::vec!["begin_program", "write_image", "end_program"]);
    }

    #[test]
    fn test_begin_failure_skips_cleanup() {
        let mut dev = MockTransport::new();
        dev.fail_on = Some("begin_program");
        let mut clock = FakeClock::default();

        let mut loader = BitstreamLoader::new(&mut dev, &mut clock);
        assert_eq!(loader.load(IMAGE), Err(Error::Io));
        assert_eq!(loader.state(), LoadState::Failed);
        assert_eq!(dev.calls, std::vec!["begin_program"]);
    }

    #[test]
    fn test_poll_error_fails() {
        let mut dev = MockTransport::new();
        dev.fail_on = Some("is_configured");
        let mut clock = FakeClock::default();

        let mut loader = BitstreamLoader::new(&mut dev, &mut clock);
        assert_eq!(loader.load(IMAGE), Err(Error::Io));
        assert_eq!(loader.state(), LoadState::Failed);
        assert_eq!(loader.polls(), 1);
        assert!(loader.state().is_terminal());
    }

    #[test]
    fn test_empty_image_rejected() {
        let mut dev = MockTransport::new();
        let mut clock = FakeClock::default();
        let mut loader = BitstreamLoader::new(&mut dev, &mut clock);
        assert_eq!(loader.load(&[]), Err(Error::BufferTooSmall));
        assert_eq!(loader.state(), LoadState::Idle);
        assert!(dev.calls.is_empty());
    }
}
