use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

pub type Job = Box<dyn FnOnce() + Send>;

/// Fixed-size worker pool for offloading blocking jobs from the reactor
/// thread. Completions re-enter the loop through a `RemoteHandle` captured
/// by the job beforehand.
pub struct Executor {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl Executor {
    pub fn new(threads: usize) -> Executor {
        let (sender, receiver) = channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..threads)
            .map(|_| {
                let receiver = receiver.clone();
                thread::spawn(move || Self::work(&receiver))
            })
            .collect();

        Executor {
            sender: Some(sender),
            workers,
        }
    }

    fn work(receiver: &Mutex<Receiver<Job>>) {
        loop {
            let job = {
                let guard = match receiver.lock() {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
                guard.recv()
            };

            match job {
                Ok(job) => job(),
                Err(_) => return,
            }
        }
    }

    /// Submits a job; silently dropped once the pool has shut down.
    pub fn submit(&self, job: Job) {
        if let Some(sender) = &self.sender {
            drop(sender.send(job));
        }
    }

    /// Closes the queue and joins the workers. Idempotent.
    pub fn shutdown(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            drop(worker.join());
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
