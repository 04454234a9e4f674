//! `BackgroundSampler`: a dedicated worker thread that drives a probe on a
//! cadence and hands raw counters to a subscriber callback under the
//! callback's own synchronization. Ported from §4.5's pseudocode loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Sleep is sliced to this granularity so `requestRefresh`/cancellation
/// latency is bounded regardless of how long the configured interval is.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

struct SharedState {
    cancel: AtomicBool,
    refresh_requested: AtomicBool,
    interval_ms: AtomicU64,
    wake: Condvar,
    wake_mutex: Mutex<()>,
}

/// Owns a probe-driving callback and, once started, its worker thread.
/// `start()`/`stop()` are idempotent; `stop()` before `start()` is a no-op.
pub struct BackgroundSampler<F> {
    shared: Arc<SharedState>,
    tick: Option<F>,
    handle: Option<JoinHandle<()>>,
}

impl<F> BackgroundSampler<F>
where
    F: FnMut() + Send + 'static,
{
    pub fn new(initial_interval_ms: u64, tick: F) -> Self {
        Self {
            shared: Arc::new(SharedState {
                cancel: AtomicBool::new(false),
                refresh_requested: AtomicBool::new(false),
                interval_ms: AtomicU64::new(initial_interval_ms),
                wake: Condvar::new(),
                wake_mutex: Mutex::new(()),
            }),
            tick: Some(tick),
            handle: None,
        }
    }

    /// Spawns the dedicated worker thread. A no-op if already running.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let Some(mut tick) = self.tick.take() else {
            return;
        };
        self.shared.cancel.store(false, Ordering::SeqCst);
        let worker_shared = Arc::clone(&self.shared);
        self.handle = Some(std::thread::spawn(move || {
            run_loop(&worker_shared, &mut tick);
        }));
    }

    pub fn set_interval_ms(&self, interval_ms: u64) {
        self.shared.interval_ms.store(interval_ms, Ordering::SeqCst);
    }

    pub fn interval_ms(&self) -> u64 {
        self.shared.interval_ms.load(Ordering::SeqCst)
    }

    /// Short-circuits the current sleep so the next probe call happens
    /// immediately, without waiting out the rest of the interval.
    pub fn request_refresh(&self) {
        self.shared.refresh_requested.store(true, Ordering::SeqCst);
        self.wake();
    }

    /// Idempotent and safe before `start()` or from any thread. Blocks until
    /// the worker has exited (join semantics) when one is running.
    pub fn stop(&mut self) {
        self.shared.cancel.store(true, Ordering::SeqCst);
        self.wake();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn wake(&self) {
        let _guard = self.shared.wake_mutex.lock().unwrap();
        self.shared.wake.notify_all();
    }
}

impl<F> Drop for BackgroundSampler<F> {
    fn drop(&mut self) {
        self.shared.cancel.store(true, Ordering::SeqCst);
        let _guard = self.shared.wake_mutex.lock().unwrap();
        self.shared.wake.notify_all();
        drop(_guard);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop<F: FnMut()>(shared: &SharedState, tick: &mut F) {
    while !shared.cancel.load(Ordering::SeqCst) {
        let t0 = Instant::now();
        tick();
        shared.refresh_requested.store(false, Ordering::SeqCst);

        let interval = Duration::from_millis(shared.interval_ms.load(Ordering::SeqCst));
        loop {
            let elapsed = t0.elapsed();
            if elapsed >= interval {
                break;
            }
            if shared.cancel.load(Ordering::SeqCst) || shared.refresh_requested.load(Ordering::SeqCst) {
                break;
            }
            let remaining = interval - elapsed;
            let slice = remaining.min(SLEEP_SLICE);
            let guard = shared.wake_mutex.lock().unwrap();
            let _ = shared.wake.wait_timeout(guard, slice).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn ticks_fire_at_roughly_the_configured_interval() {
        let (tx, rx) = mpsc::channel();
        let mut sampler = BackgroundSampler::new(20, move || {
            let _ = tx.send(Instant::now());
        });
        sampler.start();

        let first = rx.recv_timeout(Duration::from_millis(200)).unwrap();
        let second = rx.recv_timeout(Duration::from_millis(200)).unwrap();
        sampler.stop();

        let gap = second.duration_since(first);
        assert!(gap >= Duration::from_millis(5), "gap was {gap:?}");
    }

    #[test]
    fn request_refresh_short_circuits_a_long_interval() {
        let (tx, rx) = mpsc::channel();
        let mut sampler = BackgroundSampler::new(5_000, move || {
            let _ = tx.send(Instant::now());
        });
        sampler.start();

        let _first = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        sampler.request_refresh();
        let second = rx.recv_timeout(Duration::from_millis(500));
        sampler.stop();

        assert!(second.is_ok(), "requestRefresh should have short-circuited the 5s sleep");
    }

    #[test]
    fn stop_before_start_is_a_safe_no_op() {
        let mut sampler = BackgroundSampler::new(1_000, || {});
        sampler.stop();
    }

    #[test]
    fn stop_is_idempotent_and_joins() {
        let mut sampler = BackgroundSampler::new(1_000, || {});
        sampler.start();
        sampler.stop();
        sampler.stop();
    }

    #[test]
    fn interval_getter_reflects_setter_immediately() {
        // Property 8: sampler.setInterval(x); sampler.interval() == x
        // immediately, independent of whether the worker observed it yet.
        let sampler = BackgroundSampler::new(1_000, || {});
        sampler.set_interval_ms(250);
        assert_eq!(sampler.interval_ms(), 250);
    }

    #[test]
    fn set_interval_takes_effect_on_next_iteration_without_restart() {
        // Per the pseudocode, a new interval is read once per outer-loop
        // iteration (right after the tick), not mid-sleep — so a change
        // doesn't interrupt the iteration already in flight, only the next
        // one. Distinct from `request_refresh`, which does interrupt.
        let (tx, rx) = mpsc::channel();
        let mut sampler = BackgroundSampler::new(150, move || {
            let _ = tx.send(Instant::now());
        });
        sampler.start();

        let first = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        sampler.set_interval_ms(20);

        let second = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert!(
            second.duration_since(first) >= Duration::from_millis(100),
            "the in-flight 150ms iteration should not have been interrupted"
        );

        let third = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert!(
            third.duration_since(second) < Duration::from_millis(100),
            "the new 20ms interval should apply starting the next iteration"
        );

        sampler.stop();
    }
}
