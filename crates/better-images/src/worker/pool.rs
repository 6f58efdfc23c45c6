use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads fed from one unbounded FIFO queue.
///
/// `submit` never blocks. A panicking task is caught and logged; the worker
/// that ran it keeps serving the queue.
pub struct WorkerPool {
    task_sender: Sender<Task>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be > 0".to_string(),
            ));
        }

        let (task_sender, task_receiver) = unbounded::<Task>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicUsize::new(0));
        let queued = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let rx = task_receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let active = Arc::clone(&active);
            let queued = Arc::clone(&queued);

            let handle = thread::Builder::new()
                .name(format!("better-images-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, rx, shutdown_flag, active, queued))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            task_sender,
            workers: Mutex::new(workers),
            size: worker_count,
            shutdown,
            active,
            queued,
        })
    }

    pub fn submit<F>(&self, task: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.queued.fetch_add(1, Ordering::SeqCst);
        self.task_sender.send(Box::new(task)).map_err(|_| {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            WorkerError::ChannelClosed
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks currently executing.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Tasks waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Stops accepting work. Running tasks finish; queued tasks are dropped.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Shuts down and blocks until every worker thread has exited.
    pub fn join(&self) {
        self.shutdown();
        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    task_receiver: Receiver<Task>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match task_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(task) => {
                active.fetch_add(1, Ordering::SeqCst);
                queued.fetch_sub(1, Ordering::SeqCst);

                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                    error!(
                        "Worker {} task panicked: {}",
                        worker_id,
                        panic_message(payload.as_ref())
                    );
                }

                active.fetch_sub(1, Ordering::SeqCst);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} task channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
