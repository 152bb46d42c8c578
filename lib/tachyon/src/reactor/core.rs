use crate::reactor::delayed::{Callback, DelayedCall, TimerHandle};
use crate::reactor::executor::{Executor, Job};
use hashbrown::HashMap;
use ion::logging;
use std::cell::RefCell;
use std::cmp;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::io;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Poll timeout used when no timer is scheduled; also the upper cap on the
/// timeout derived from the next deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 1024;
const EXECUTOR_THREADS: usize = 2;

/// Receiver of readiness events for a registered token.
pub trait EventHandler {
    fn ready(&mut self, reactor: &mut Reactor, ready: mio::Ready);
}

type Handler = Rc<RefCell<dyn EventHandler>>;
type RemoteCallback = Box<dyn FnOnce(&mut Reactor) + Send>;

struct RemoteEntry {
    callback: RemoteCallback,
    cancelled: Arc<AtomicBool>,
}

/// Cloneable, `Send` submission handle for other threads. Entries are
/// adopted into the loop's batch at the start of the next tick.
#[derive(Clone)]
pub struct RemoteHandle {
    queue: Arc<Mutex<Vec<RemoteEntry>>>,
}

impl RemoteHandle {
    /// Enqueues a callback to run on the loop thread during the next tick.
    pub fn call_soon_threadsafe<F>(&self, callback: F) -> TimerHandle
    where
        F: FnOnce(&mut Reactor) + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));

        self.queue.lock().expect("soon queue poisoned").push(RemoteEntry {
            callback: Box::new(callback),
            cancelled: cancelled.clone(),
        });

        TimerHandle::from_flag(cancelled)
    }
}

/// Single-threaded cooperative event loop: readiness dispatch over an
/// edge-triggered poller plus immediate and scheduled callbacks. Everything
/// except the cross-thread submission queue is loop-thread state.
pub struct Reactor {
    poller: mio::Poll,
    events: mio::Events,
    handlers: HashMap<mio::Token, Handler>,
    soon: VecDeque<DelayedCall>,
    remote: Arc<Mutex<Vec<RemoteEntry>>>,
    later: BinaryHeap<Reverse<DelayedCall>>,
    timeout: Duration,
    running: bool,
    next_token: usize,
    seq: u64,
    executor: Option<Executor>,
    log: logging::Logger,
}

impl Reactor {
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(log: L) -> io::Result<Reactor> {
        let reactor_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        Ok(Reactor {
            poller: mio::Poll::new()?,
            events: mio::Events::with_capacity(EVENT_CAPACITY),
            handlers: HashMap::new(),
            soon: VecDeque::new(),
            remote: Arc::new(Mutex::new(Vec::new())),
            later: BinaryHeap::new(),
            timeout: DEFAULT_TIMEOUT,
            running: false,
            next_token: 0,
            seq: 0,
            executor: None,
            log: reactor_log,
        })
    }

    /// The underlying poller; used by transports and factories to register
    /// and deregister their sockets.
    #[inline]
    pub fn poller(&self) -> &mio::Poll {
        &self.poller
    }

    /// Allocates a fresh registration token.
    #[inline]
    pub fn next_token(&mut self) -> mio::Token {
        let token = mio::Token(self.next_token);
        self.next_token += 1;
        token
    }

    #[inline]
    pub fn set_handler(&mut self, token: mio::Token, handler: Handler) {
        self.handlers.insert(token, handler);
    }

    #[inline]
    pub fn remove_handler(&mut self, token: mio::Token) {
        self.handlers.remove(&token);
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Runs until `stop` is called.
    pub fn run(&mut self) {
        self.running = true;
        logging::debug!(self.log, "reactor running"; "context" => "run");

        while self.running {
            self.run_once();
        }

        logging::debug!(self.log, "reactor stopped"; "context" => "run");
    }

    /// One tick: poll with the derived timeout, dispatch readiness, process
    /// delayed calls. Delayed calls also run on a pure timeout tick,
    /// otherwise timers could only ever fire when traffic arrives.
    fn run_once(&mut self) {
        let timeout = self.timeout;

        if let Err(err) = self.poller.poll(&mut self.events, Some(timeout)) {
            if err.kind() == io::ErrorKind::Interrupted {
                return;
            }
            logging::error!(self.log, "poll failed"; "context" => "run_once", "error" => %err);
            self.running = false;
            return;
        }

        let fired: Vec<(mio::Token, mio::Ready)> = self
            .events
            .iter()
            .map(|event| (event.token(), event.readiness()))
            .collect();

        if fired.is_empty() {
            self.process_delayed_calls();
            return;
        }

        for (token, ready) in fired {
            let handler = match self.handlers.get(&token) {
                Some(handler) => handler.clone(),
                None => continue,
            };

            handler.borrow_mut().ready(self, ready);
            self.process_delayed_calls();
        }
    }

    /// Clears the running flag and shuts down the executor. The current tick
    /// finishes normally.
    pub fn stop(&mut self) {
        self.running = false;

        if let Some(mut executor) = self.executor.take() {
            executor.shutdown();
        }

        logging::info!(self.log, "reactor stop requested"; "context" => "stop");
    }

    /// Schedules a callback onto the `soon` queue: it runs during the
    /// current tick's delayed-call processing.
    pub fn call_soon<F>(&mut self, callback: F) -> TimerHandle
    where
        F: FnOnce(&mut Reactor) + 'static,
    {
        let seq = self.bump_seq();
        let (call, handle) = DelayedCall::new(Instant::now(), seq, Box::new(callback));
        self.soon.push_back(call);
        handle
    }

    /// Schedules a callback to run `delay` from now.
    pub fn call_later<F>(&mut self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce(&mut Reactor) + 'static,
    {
        let seq = self.bump_seq();
        let (call, handle) = DelayedCall::new(Instant::now() + delay, seq, Box::new(callback));
        self.later.push(Reverse(call));
        handle
    }

    /// Submission handle usable from other threads.
    #[inline]
    pub fn remote(&self) -> RemoteHandle {
        RemoteHandle {
            queue: self.remote.clone(),
        }
    }

    /// Thread-safe variant of `call_soon`.
    pub fn call_soon_threadsafe<F>(&self, callback: F) -> TimerHandle
    where
        F: FnOnce(&mut Reactor) + Send + 'static,
    {
        self.remote().call_soon_threadsafe(callback)
    }

    /// Offloads a blocking job to the worker pool, spinning it up on first
    /// use. The job re-enters the loop, if it needs to, through a
    /// `RemoteHandle` captured beforehand.
    pub fn run_in_executor(&mut self, job: Job) {
        self.executor
            .get_or_insert_with(|| Executor::new(EXECUTOR_THREADS))
            .submit(job);
    }

    #[inline]
    fn bump_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    /// Drains due work: the `soon` queue is swapped out, cross-thread
    /// submissions are adopted behind it, due timers are popped off the
    /// heap, and the whole batch is invoked in order. Also derives the next
    /// poll timeout: time to the nearest deadline capped at
    /// `DEFAULT_TIMEOUT`, or zero when callbacks scheduled more work.
    fn process_delayed_calls(&mut self) {
        let mut batch: Vec<DelayedCall> = self.soon.drain(..).collect();

        {
            let mut remote = self.remote.lock().expect("soon queue poisoned");
            let now = Instant::now();
            for entry in remote.drain(..) {
                let seq = self.seq;
                self.seq += 1;
                batch.push(DelayedCall::adopted(now, seq, entry.callback, entry.cancelled));
            }
        }

        let now = Instant::now();
        loop {
            match self.later.peek() {
                Some(Reverse(call)) if call.deadline() <= now => {
                    let Reverse(call) = self.later.pop().expect("heap top vanished");
                    if !call.is_cancelled() {
                        batch.push(call);
                    }
                }
                Some(Reverse(call)) => {
                    self.timeout = cmp::min(call.deadline() - now, DEFAULT_TIMEOUT);
                    break;
                }
                None => {
                    self.timeout = DEFAULT_TIMEOUT;
                    break;
                }
            }
        }

        for call in batch {
            call.invoke(self);
        }

        let resubmitted = !self.soon.is_empty()
            || !self.remote.lock().expect("soon queue poisoned").is_empty();
        if resubmitted {
            self.timeout = Duration::from_millis(0);
        }
    }
}
