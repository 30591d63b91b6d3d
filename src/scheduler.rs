//! Worker-pool scheduler owning the I/O reactors.
//!
//! Two pool shapes: a single multi-threaded reactor shared by every
//! worker, or one single-threaded reactor per worker thread with
//! round-robin hand-out. Subsystems that need the scheduler to stay
//! alive register as active users; shutdown blocks until the last one
//! releases and every worker thread has left its reactor loop.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Condvar, Mutex,
    },
    thread,
    time::Duration,
};
use tokio::{
    runtime::{Builder, Handle, Runtime},
    sync::watch,
};
use tracing::{debug, error};

/// Period of the keep-reactor-alive timer. The timer continually
/// reschedules itself so an idle reactor never runs out of work; on
/// shutdown it is cancelled and the reactors exit naturally.
const KEEP_RUNNING_TIMER: Duration = Duration::from_secs(5);

/// Default worker thread count.
const DEFAULT_NUM_THREADS: usize = 8;

enum Pool {
    /// One reactor, `num_threads` worker threads inside it.
    Single(Runtime),
    /// One reactor per worker thread; `acquire_io` round-robins.
    PerThread {
        handles: Vec<Handle>,
        threads: Vec<thread::JoinHandle<()>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    SingleService,
    OneToOne,
}

struct SchedState {
    active_users: u32,
    running: bool,
}

/// Owner of the reactor pool and worker threads.
pub struct Scheduler {
    kind: Kind,
    num_threads: usize,
    // serializes start/stop so acquire_io never observes a half-built pool
    start_lock: Mutex<()>,
    pool: Mutex<Option<Pool>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    next_reactor: AtomicUsize,
    state: Mutex<SchedState>,
    no_more_active_users: Condvar,
    scheduler_stopped: Condvar,
}

impl Scheduler {
    /// One reactor shared by `num_threads` worker threads.
    pub fn single_service(num_threads: usize) -> Self {
        Self::new(Kind::SingleService, num_threads)
    }

    /// One reactor per worker thread.
    pub fn one_to_one(num_threads: usize) -> Self {
        Self::new(Kind::OneToOne, num_threads)
    }

    fn new(kind: Kind, num_threads: usize) -> Self {
        Self {
            kind,
            num_threads: num_threads.max(1),
            start_lock: Mutex::new(()),
            pool: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            next_reactor: AtomicUsize::new(0),
            state: Mutex::new(SchedState {
                active_users: 0,
                running: false,
            }),
            no_more_active_users: Condvar::new(),
            scheduler_stopped: Condvar::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    /// Spawns the worker threads and arms the keep-alive timers.
    /// Idempotent; `start` after `stop` builds a fresh pool.
    pub fn start(&self) {
        let _starting = self.start_lock.lock().unwrap();
        if self.is_running() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let pool = match self.kind {
            Kind::SingleService => {
                let runtime = Builder::new_multi_thread()
                    .worker_threads(self.num_threads)
                    .thread_name("pion-reactor")
                    .enable_io()
                    .enable_time()
                    .build()
                    .expect("failed to build reactor");
                runtime.spawn(keep_reactor_alive(shutdown_rx.clone()));
                Pool::Single(runtime)
            }
            Kind::OneToOne => {
                let mut handles = Vec::with_capacity(self.num_threads);
                let mut threads = Vec::with_capacity(self.num_threads);
                for index in 0..self.num_threads {
                    let rx = shutdown_rx.clone();
                    let (handle_tx, handle_rx) = mpsc::channel();
                    let thread = thread::Builder::new()
                        .name(format!("pion-reactor-{index}"))
                        .spawn(move || {
                            let runtime = Builder::new_current_thread()
                                .enable_io()
                                .enable_time()
                                .build()
                                .expect("failed to build reactor");
                            let _ = handle_tx.send(runtime.handle().clone());
                            // parks the thread in its reactor loop until
                            // the keep-alive timer is cancelled
                            runtime.block_on(keep_reactor_alive(rx));
                        })
                        .expect("failed to spawn reactor thread");
                    let handle = handle_rx.recv().expect("reactor thread died on startup");
                    handles.push(handle);
                    threads.push(thread);
                }
                Pool::PerThread { handles, threads }
            }
        };

        *self.pool.lock().unwrap() = pool.into();
        *self.shutdown_tx.lock().unwrap() = Some(shutdown_tx);
        self.state.lock().unwrap().running = true;
        debug!(threads = self.num_threads, "scheduler started");
    }

    /// Cancels the keep-alive timers, joins the workers, and resets the
    /// pool so `start` can be called again.
    pub fn stop(&self) {
        let _starting = self.start_lock.lock().unwrap();
        let pool = self.pool.lock().unwrap().take();
        if let Some(tx) = self.shutdown_tx.lock().unwrap().take() {
            let _ = tx.send(true);
        }

        match pool {
            Some(Pool::Single(runtime)) => {
                runtime.shutdown_timeout(Duration::from_secs(5));
            }
            Some(Pool::PerThread { threads, .. }) => {
                for thread in threads {
                    let _ = thread.join();
                }
            }
            None => {}
        }

        let mut state = self.state.lock().unwrap();
        state.running = false;
        self.scheduler_stopped.notify_all();
        debug!("scheduler stopped");
    }

    /// Blocks until the active-user count reaches zero, then stops.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        while state.active_users > 0 {
            state = self.no_more_active_users.wait(state).unwrap();
        }
        drop(state);
        self.stop();
    }

    /// Blocks the calling thread until the scheduler has stopped.
    pub fn join(&self) {
        let mut state = self.state.lock().unwrap();
        while state.running {
            state = self.scheduler_stopped.wait(state).unwrap();
        }
    }

    /// A reactor handle; round-robin and stable per index in one-to-one
    /// mode. Starts the scheduler if it is not yet running.
    pub fn acquire_io(&self) -> Handle {
        if !self.is_running() {
            self.start();
        }
        let pool = self.pool.lock().unwrap();
        match pool.as_ref().expect("scheduler has no reactors") {
            Pool::Single(runtime) => runtime.handle().clone(),
            Pool::PerThread { handles, .. } => {
                let index = self.next_reactor.fetch_add(1, Ordering::Relaxed) % handles.len();
                handles[index].clone()
            }
        }
    }

    /// Enqueues a task onto a reactor and returns immediately. A panic
    /// out of the task is caught by the reactor, logged, and the reactor
    /// keeps running.
    pub fn post<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.acquire_io();
        let join = handle.spawn(task);
        handle.spawn(async move {
            if let Err(err) = join.await {
                if err.is_panic() {
                    error!("posted task panicked: {err}");
                }
            }
        });
    }

    /// Registers a subsystem that requires the scheduler to stay alive.
    pub fn add_active_user(&self) {
        self.state.lock().unwrap().active_users += 1;
    }

    /// Releases an active-user reference; the last release unblocks
    /// `shutdown`.
    pub fn remove_active_user(&self) {
        let mut state = self.state.lock().unwrap();
        state.active_users = state.active_users.saturating_sub(1);
        if state.active_users == 0 {
            self.no_more_active_users.notify_all();
        }
    }

    /// Parks the calling thread for `duration`, or until `condition` is
    /// signalled while holding `lock`.
    pub fn sleep<T>(condition: &Condvar, lock: &Mutex<T>, duration: Duration) {
        let guard = lock.lock().unwrap();
        let _ = condition.wait_timeout(guard, duration);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::single_service(DEFAULT_NUM_THREADS)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

/// Reschedules itself forever so the reactor always has pending work;
/// returns once shutdown is signalled.
async fn keep_reactor_alive(mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(KEEP_RUNNING_TIMER) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
