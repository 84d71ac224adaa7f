//! Threaded subordinate servicing a [`FifoPort`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::utils::Backoff;
use fmem_port::{Channel, FifoPort, Flit, Transport};

use crate::subordinate::Subordinate;

const IDLE_SLEEP: Duration = Duration::from_micros(100);

/// Background thread answering the manager side of a port
///
/// The thread stops when [`Responder::stop`] is called or the responder is
/// dropped.
pub struct Responder {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Subordinate>>,
}

impl Responder {
    /// Spawn a thread serving `port` with `subordinate`
    pub fn spawn(name: &str, port: Arc<FifoPort>, subordinate: Subordinate) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(format!("fmem-sim-{name}"))
            .spawn(move || serve(&port, subordinate, &flag))?;

        log::debug!("responder {} started", name);
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Stop the thread and hand back its subordinate
    ///
    /// Returns `None` if the thread panicked.
    pub fn stop(mut self) -> Option<Subordinate> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<Subordinate> {
        self.stop.store(true, Ordering::Release);
        self.thread.take().and_then(|thread| thread.join().ok())
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(port: &FifoPort, mut subordinate: Subordinate, stop: &AtomicBool) -> Subordinate {
    let view = port.subordinate();
    let backoff = Backoff::new();

    while !stop.load(Ordering::Acquire) {
        let mut busy = false;
        for channel in [Channel::Aw, Channel::W, Channel::Ar] {
            while let Some(flit) = view.try_receive(channel) {
                busy = true;
                if let Some(response) = subordinate.accept(flit) {
                    deliver(&view, response, stop);
                }
            }
        }

        if busy {
            backoff.reset();
        } else if backoff.is_completed() {
            thread::sleep(IDLE_SLEEP);
        } else {
            backoff.snooze();
        }
    }

    subordinate
}

/// Push a response, waiting for room unless asked to stop
fn deliver<T: Transport>(view: &T, mut response: Flit, stop: &AtomicBool) {
    let backoff = Backoff::new();
    loop {
        match view.try_send(response) {
            Ok(()) => return,
            Err(rejected) => {
                if stop.load(Ordering::Acquire) {
                    log::warn!("responder stopped with an undelivered {} flit", rejected.channel());
                    return;
                }
                response = rejected;
                backoff.snooze();
            }
        }
    }
}
