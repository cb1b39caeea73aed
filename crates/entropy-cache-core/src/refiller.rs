//! Background refill task.
//!
//! A [`Refiller`] owns one named thread that calls
//! [`EntropyCache::refill`] and sleeps for whatever delay the cache returns,
//! forever. The sleep doubles as the shutdown wait, so stopping is prompt.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cache::EntropyCache;
use crate::config::REFILL_BASE_DELAY;

#[derive(Debug)]
enum Signal {
    /// Run a refill check now instead of waiting out the delay.
    Kick,
    Stop,
}

/// Handle to the running refill thread. Dropping it stops the thread.
#[must_use = "the refill thread stops when the Refiller is dropped"]
#[derive(Debug)]
pub struct Refiller {
    tx: Option<Sender<Signal>>,
    handle: Option<JoinHandle<()>>,
}

impl Refiller {
    /// Start refilling `cache`. The first check runs after the base delay.
    pub fn spawn(cache: Arc<EntropyCache>) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("entropy-refill".into())
            .spawn(move || {
                log::info!("refill thread started (source: {})", cache.source_name());
                let mut delay = REFILL_BASE_DELAY;
                loop {
                    match rx.recv_timeout(delay) {
                        Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Ok(Signal::Kick) | Err(RecvTimeoutError::Timeout) => {}
                    }
                    delay = refill_guarded(&cache);
                }
                log::info!("refill thread stopped");
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Ask for an immediate refill check.
    pub fn kick(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Signal::Kick);
        }
    }

    /// Whether the refill thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Signal::Stop);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("refill thread panicked");
            }
        }
    }
}

impl Drop for Refiller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run one refill; a panicking amplifier or source costs one cycle, not the
/// thread.
fn refill_guarded(cache: &EntropyCache) -> Duration {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cache.refill())) {
        Ok(delay) => delay,
        Err(_) => {
            log::warn!("refill panicked, retrying after base delay");
            REFILL_BASE_DELAY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BUFFER_SIZE;
    use crate::drbg::{Amplifier, HashDrbg};
    use crate::error::DrbgError;
    use crate::source::OsSource;
    use std::time::Instant;

    fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn os_cache() -> Arc<EntropyCache> {
        Arc::new(EntropyCache::new(Box::new(OsSource), Box::new(HashDrbg::new())).unwrap())
    }

    struct PanickingAmplifier;

    impl Amplifier for PanickingAmplifier {
        fn seed(&mut self, _seed: &[u8]) -> Result<(), DrbgError> {
            panic!("amplifier exploded");
        }
        fn generate(&mut self, _out: &mut [u8]) -> Result<(), DrbgError> {
            Ok(())
        }
    }

    #[test]
    fn test_kick_fills_without_waiting() {
        let cache = os_cache();
        let refiller = Refiller::spawn(Arc::clone(&cache)).unwrap();
        refiller.kick();
        assert!(wait_for(REFILL_BASE_DELAY / 2, || cache.remaining() == BUFFER_SIZE));
        refiller.shutdown();
    }

    #[test]
    fn test_first_fill_after_base_delay() {
        let cache = os_cache();
        let refiller = Refiller::spawn(Arc::clone(&cache)).unwrap();
        assert!(wait_for(REFILL_BASE_DELAY * 4, || cache.remaining() == BUFFER_SIZE));
        refiller.shutdown();
    }

    #[test]
    fn test_refills_after_drain() {
        let cache = os_cache();
        let refiller = Refiller::spawn(Arc::clone(&cache)).unwrap();
        refiller.kick();
        assert!(wait_for(Duration::from_secs(2), || cache.remaining() == BUFFER_SIZE));
        cache.try_take(BUFFER_SIZE).unwrap();
        refiller.kick();
        assert!(wait_for(Duration::from_secs(2), || cache.stats().refills == 2));
        assert_eq!(cache.remaining(), BUFFER_SIZE);
    }

    #[test]
    fn test_shutdown_is_prompt() {
        let refiller = Refiller::spawn(os_cache()).unwrap();
        assert!(refiller.is_running());
        let t0 = Instant::now();
        refiller.shutdown();
        assert!(t0.elapsed() < REFILL_BASE_DELAY);
    }

    #[test]
    fn test_panicking_refill_keeps_thread_alive() {
        let cache = Arc::new(
            EntropyCache::new(Box::new(OsSource), Box::new(PanickingAmplifier)).unwrap(),
        );
        let refiller = Refiller::spawn(Arc::clone(&cache)).unwrap();
        refiller.kick();
        refiller.kick();
        thread::sleep(Duration::from_millis(100));
        assert!(refiller.is_running());
        assert_eq!(cache.remaining(), 0);
        refiller.shutdown();
    }
}
