//! Single-worker command dispatcher.
//!
//! Callers set the desired setpoint; one worker thread drains it and plays
//! it. A request that arrives while another is still pending replaces it
//! (last write wins), so a burst of updates costs at most one extra
//! transmission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tc_audio::DeviceError;
use tc_ir::Setpoint;
use tracing::{debug, trace, warn};

use crate::transmitter::Transmitter;

/// Error type for dispatcher operations.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to spawn dispatcher worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("dispatcher is shut down")]
    ShutDown,
    #[error("dispatcher is not running")]
    NotRunning,
}

/// A setpoint addressed to one output device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Request {
    pub setpoint: Setpoint,
    pub device_index: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Transmitting,
}

/// Counter snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Accepted requests
    pub submitted: u64,
    /// Requests replaced before the worker picked them up
    pub coalesced: u64,
    /// Transmissions that played to completion
    pub sent: u64,
    /// Transmissions that returned a device error
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    coalesced: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
}

/// State guarded by the dispatcher mutex. `request.is_some()` is the dirty flag.
#[derive(Default)]
struct Pending {
    request: Option<Request>,
    transmitting: bool,
    stop: bool,
    exited: bool,
    last_error: Option<DeviceError>,
}

impl Pending {
    fn is_idle(&self) -> bool {
        self.exited || (self.request.is_none() && !self.transmitting)
    }
}

#[derive(Default)]
struct Shared {
    pending: Mutex<Pending>,
    /// Signalled on new request or stop
    wake: Condvar,
    /// Signalled when the worker runs out of work
    idle: Condvar,
    counters: Counters,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|e| {
            warn!("Dispatcher state mutex poisoned; continuing");
            e.into_inner()
        })
    }
}

/// Handle to the dispatcher worker. Dropping it shuts the worker down.
pub struct Dispatcher {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start the worker thread.
    pub fn spawn(transmitter: Arc<Transmitter>) -> Result<Self, DispatchError> {
        let shared = Arc::new(Shared::default());
        let worker_shared = shared.clone();

        let worker = thread::Builder::new()
            .name("chirp-dispatch".into())
            .spawn(move || worker_loop(&worker_shared, &transmitter))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Set the pending command. Never waits on playback.
    pub fn submit(&self, setpoint: Setpoint, device_index: i32) -> Result<(), DispatchError> {
        let request = Request { setpoint, device_index };
        {
            let mut pending = self.shared.lock();
            if pending.stop || pending.exited {
                return Err(DispatchError::ShutDown);
            }
            if let Some(replaced) = pending.request.replace(request) {
                trace!("Coalesced {} into {}", replaced.setpoint, setpoint);
                self.shared.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            }
            self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    pub fn state(&self) -> DispatcherState {
        if self.shared.lock().transmitting {
            DispatcherState::Transmitting
        } else {
            DispatcherState::Idle
        }
    }

    /// Block until nothing is pending and nothing is playing.
    pub fn wait_idle(&self) {
        let guard = self.shared.lock();
        let _guard = self
            .shared
            .idle
            .wait_while(guard, |p| !p.is_idle())
            .unwrap_or_else(|e| e.into_inner());
    }

    pub fn stats(&self) -> DispatchStats {
        let c = &self.shared.counters;
        DispatchStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            sent: c.sent.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Most recent device error, if any transmission failed.
    pub fn last_error(&self) -> Option<DeviceError> {
        self.shared.lock().last_error.clone()
    }

    /// Ask the worker to exit without waiting for it.
    ///
    /// A request that has not started yet is discarded; one that is
    /// already playing runs to completion.
    pub fn request_stop(&self) {
        self.shared.lock().stop = true;
        self.shared.wake.notify_all();
    }

    /// Stop the worker and wait for any in-flight transmission to finish.
    pub fn shutdown(&mut self) {
        self.request_stop();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Dispatcher worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Marks the worker exited when it returns or unwinds, so `wait_idle`
/// and `state` never report a dead worker as busy.
struct ExitGuard<'a> {
    shared: &'a Shared,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.shared.lock();
        if thread::panicking() {
            warn!("Dispatcher worker panicked during transmission");
            self.shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            pending.last_error = Some(DeviceError::PlaybackFailed(
                "dispatcher worker panicked".into(),
            ));
        }
        pending.transmitting = false;
        pending.exited = true;
        drop(pending);
        self.shared.idle.notify_all();
    }
}

fn worker_loop(shared: &Shared, transmitter: &Transmitter) {
    debug!("Dispatcher worker started");
    let _exit = ExitGuard { shared };

    loop {
        let request = {
            let guard = shared.lock();
            let mut guard = shared
                .wake
                .wait_while(guard, |p| p.request.is_none() && !p.stop)
                .unwrap_or_else(|e| e.into_inner());

            if guard.stop {
                if let Some(dropped) = guard.request.take() {
                    debug!("Discarding pending {} on shutdown", dropped.setpoint);
                }
                break;
            }
            let Some(request) = guard.request.take() else {
                continue;
            };
            guard.transmitting = true;
            request
        };

        // Playback happens outside the lock so submit never waits on it.
        let result = transmitter.transmit(request.setpoint, request.device_index);

        let mut guard = shared.lock();
        guard.transmitting = false;
        match result {
            Ok(()) => {
                shared.counters.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Transmission of {} failed: {}", request.setpoint, e);
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                guard.last_error = Some(e);
            }
        }
        if guard.is_idle() {
            shared.idle.notify_all();
        }
    }

    debug!("Dispatcher worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};
    use tc_audio::{DeviceChannel, DeviceDescriptor, MemoryChannel};
    use tc_engine::{synthesize_setpoint, SampleBlock, ToneParams};

    /// Memory channel whose first playback blocks until the gate opens.
    struct GatedChannel {
        inner: MemoryChannel,
        open: Mutex<bool>,
        opened: Condvar,
        entered: Mutex<mpsc::Sender<()>>,
    }

    impl GatedChannel {
        fn new() -> (Arc<Self>, mpsc::Receiver<()>) {
            let (tx, rx) = mpsc::channel();
            let channel = Arc::new(Self {
                inner: MemoryChannel::new(["Speakers"]),
                open: Mutex::new(false),
                opened: Condvar::new(),
                entered: Mutex::new(tx),
            });
            (channel, rx)
        }

        fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.opened.notify_all();
        }
    }

    impl DeviceChannel for GatedChannel {
        fn list_devices(&self) -> Vec<DeviceDescriptor> {
            self.inner.list_devices()
        }

        fn device_count(&self) -> usize {
            self.inner.device_count()
        }

        fn play(&self, block: &SampleBlock, device_index: i32) -> Result<(), DeviceError> {
            let _ = self.entered.lock().unwrap().send(());
            let guard = self.open.lock().unwrap();
            let _guard = self.opened.wait_while(guard, |open| !*open).unwrap();
            self.inner.play(block, device_index)
        }
    }

    /// Backend that panics mid-playback.
    struct PanickingChannel;

    impl DeviceChannel for PanickingChannel {
        fn list_devices(&self) -> Vec<DeviceDescriptor> {
            Vec::new()
        }

        fn device_count(&self) -> usize {
            1
        }

        fn play(&self, _block: &SampleBlock, _device_index: i32) -> Result<(), DeviceError> {
            panic!("audio driver crashed");
        }
    }

    fn rendered(speed: u8, incline: u8) -> SampleBlock {
        synthesize_setpoint(Setpoint::new(speed, incline), &ToneParams::REFERENCE)
    }

    fn dispatcher_on(channel: Arc<dyn DeviceChannel>) -> Dispatcher {
        let transmitter = Arc::new(Transmitter::new(channel, ToneParams::REFERENCE));
        Dispatcher::spawn(transmitter).unwrap()
    }

    #[test]
    fn single_submit_is_transmitted() {
        let channel = Arc::new(MemoryChannel::new(["Speakers"]));
        let dispatcher = dispatcher_on(channel.clone());

        dispatcher.submit(Setpoint::new(35, 20), 0).unwrap();
        dispatcher.wait_idle();

        let played = channel.played();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].block, rendered(35, 20));
        assert_eq!(played[0].device_index, 0);
        assert_eq!(dispatcher.stats().sent, 1);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[test]
    fn rapid_updates_coalesce_to_latest() {
        let (channel, entered) = GatedChannel::new();
        let dispatcher = dispatcher_on(channel.clone());

        // Occupy the worker so the next two submits land while it is busy.
        dispatcher.submit(Setpoint::new(0, 0), 0).unwrap();
        entered.recv().unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Transmitting);

        dispatcher.submit(Setpoint::new(10, 10), 0).unwrap();
        dispatcher.submit(Setpoint::new(20, 20), 0).unwrap();
        channel.open();
        dispatcher.wait_idle();

        let blocks: Vec<_> = channel.inner.played().into_iter().map(|p| p.block).collect();
        assert_eq!(blocks, vec![rendered(0, 0), rendered(20, 20)]);

        let stats = dispatcher.stats();
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.coalesced, 1);
        assert_eq!(stats.sent, 2);
    }

    #[test]
    fn shutdown_waits_for_in_flight_transmission() {
        let (channel, entered) = GatedChannel::new();
        let mut dispatcher = dispatcher_on(channel.clone());

        dispatcher.submit(Setpoint::new(35, 20), 0).unwrap();
        entered.recv().unwrap();

        let opener = channel.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            opener.open();
        });

        dispatcher.shutdown();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(channel.inner.play_count(), 1);
        assert!(!dispatcher.is_running());
        handle.join().unwrap();
    }

    #[test]
    fn pending_request_is_discarded_on_stop() {
        let (channel, entered) = GatedChannel::new();
        let mut dispatcher = dispatcher_on(channel.clone());

        dispatcher.submit(Setpoint::new(30, 0), 0).unwrap();
        entered.recv().unwrap();
        dispatcher.submit(Setpoint::new(40, 0), 0).unwrap();

        dispatcher.request_stop();
        channel.open();
        dispatcher.shutdown();

        let played = channel.inner.played();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].block, rendered(30, 0));
    }

    #[test]
    fn backend_panic_does_not_wedge_waiters() {
        let mut dispatcher = dispatcher_on(Arc::new(PanickingChannel));

        dispatcher.submit(Setpoint::new(35, 20), 0).unwrap();
        dispatcher.wait_idle();

        assert_eq!(dispatcher.state(), DispatcherState::Idle);
        assert_eq!(dispatcher.stats().failed, 1);
        assert!(matches!(
            dispatcher.last_error(),
            Some(DeviceError::PlaybackFailed(_))
        ));
        assert!(matches!(
            dispatcher.submit(Setpoint::new(40, 20), 0),
            Err(DispatchError::ShutDown)
        ));

        dispatcher.shutdown();
        assert!(!dispatcher.is_running());
        dispatcher.wait_idle();
    }

    #[test]
    fn failure_leaves_dispatcher_ready() {
        let channel = Arc::new(MemoryChannel::new(["Speakers"]));
        channel.fail_next(1);
        let dispatcher = dispatcher_on(channel.clone());

        dispatcher.submit(Setpoint::new(35, 20), 0).unwrap();
        dispatcher.wait_idle();
        assert_eq!(dispatcher.stats().failed, 1);
        assert!(matches!(
            dispatcher.last_error(),
            Some(DeviceError::PlaybackFailed(_))
        ));
        assert_eq!(dispatcher.state(), DispatcherState::Idle);

        dispatcher.submit(Setpoint::new(35, 20), 0).unwrap();
        dispatcher.wait_idle();
        assert_eq!(dispatcher.stats().sent, 1);
        assert_eq!(channel.play_count(), 1);
    }

    #[test]
    fn invalid_device_is_reported_not_played() {
        let channel = Arc::new(MemoryChannel::new(["Speakers"]));
        let dispatcher = dispatcher_on(channel.clone());

        dispatcher.submit(Setpoint::new(35, 20), 1).unwrap();
        dispatcher.wait_idle();

        assert_eq!(
            dispatcher.last_error(),
            Some(DeviceError::InvalidIndex { index: 1, count: 1 })
        );
        assert_eq!(channel.play_count(), 0);
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let channel = Arc::new(MemoryChannel::new(["Speakers"]));
        let mut dispatcher = dispatcher_on(channel);
        dispatcher.shutdown();
        assert!(matches!(
            dispatcher.submit(Setpoint::new(35, 20), 0),
            Err(DispatchError::ShutDown)
        ));
        // Returns immediately once the worker is gone
        dispatcher.wait_idle();
    }
}
