//! Supervises the long-running tasks of a collector service.
//!
//! Each named process receives a shared [`CancellationToken`]. The runner stops
//! every process when one of them fails or when SIGINT/SIGTERM arrives, waits for
//! the processes to wind down within a grace period, then runs the registered
//! closers under a timeout and exits the process. A failed process
//! makes the service exit with status 1.
//!
//! # Example
//!
//! ```no_run
//! use collector_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("heartbeat", |ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type ProcessFuture = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;

/// A process body. Receives the shared cancellation token.
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> ProcessFuture + Send>;

/// A cleanup step run after all processes have stopped
pub type Closer = Box<dyn FnOnce() -> ProcessFuture + Send>;

struct NamedProcess {
    name: String,
    process: AppProcess,
}

/// How the supervised processes ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Shutdown was requested or every process returned Ok
    Clean,
    /// A process failed or panicked
    Failed,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Clean => 0,
            RunOutcome::Failed => 1,
        }
    }
}

pub struct Runner {
    app_processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    shutdown_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Closer and shutdown timeouts default to 10 seconds.
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Adds an app process whose name is attached to its lifecycle logs.
    ///
    /// If the process returns an error, every other process is cancelled.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes.push(NamedProcess {
            name: name.into(),
            process: Box::new(|token| Box::pin(process(token))),
        });
        self
    }

    /// Adds a closer. Closers run concurrently after all processes stop,
    /// whatever the reason they stopped.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// How long cancelled processes get to finish before they are aborted
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Use an externally owned token so callers can trigger shutdown.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run until shutdown, execute closers, then exit the process.
    pub async fn run(self) {
        let outcome = self.run_until_stopped().await;
        match outcome {
            RunOutcome::Clean => info!("Application exiting normally"),
            RunOutcome::Failed => error!("Application exiting with error"),
        }
        std::process::exit(outcome.exit_code());
    }

    /// Run processes and closers without exiting.
    pub async fn run_until_stopped(self) -> RunOutcome {
        let token = self.cancellation_token;
        let closer_timeout = self.closer_timeout;
        let shutdown_timeout = self.shutdown_timeout;
        let closers = self.closers;

        spawn_signal_handlers(token.clone());

        let mut join_set = JoinSet::new();
        for NamedProcess { name, process } in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                debug!(process = %name, "starting app process");
                let result = process(process_token).await;
                (name, result)
            });
        }

        let outcome = supervise(&mut join_set, &token).await;

        if tokio::time::timeout(shutdown_timeout, drain(&mut join_set))
            .await
            .is_err()
        {
            warn!(
                remaining = join_set.len(),
                "app processes still running after {:?}, aborting", shutdown_timeout
            );
        }
        join_set.shutdown().await;

        if !closers.is_empty() {
            info!("Running closers with timeout of {:?}", closer_timeout);
            match tokio::time::timeout(closer_timeout, run_closers(closers)).await {
                Ok(()) => info!("All closers completed"),
                Err(_) => error!("Closers timed out after {:?}", closer_timeout),
            }
        }

        outcome
    }
}

async fn supervise(
    join_set: &mut JoinSet<(String, Result<(), anyhow::Error>)>,
    token: &CancellationToken,
) -> RunOutcome {
    let mut outcome = RunOutcome::Clean;

    loop {
        let result = tokio::select! {
            biased;
            result = join_set.join_next() => match result {
                Some(result) => result,
                None => break,
            },
            _ = token.cancelled() => break,
        };

        match result {
            Ok((name, Ok(()))) => {
                debug!(process = %name, "app process completed");
            }
            Ok((name, Err(err))) => {
                error!(process = %name, "app process error: {:#}", err);
                outcome = RunOutcome::Failed;
                token.cancel();
            }
            Err(err) => {
                error!("app process panicked: {}", err);
                outcome = RunOutcome::Failed;
                token.cancel();
            }
        }
    }

    outcome
}

/// Wait for the remaining processes after cancellation
async fn drain(join_set: &mut JoinSet<(String, Result<(), anyhow::Error>)>) {
    while let Some(result) = join_set.join_next().await {
        match result {
            Ok((name, Ok(()))) => debug!(process = %name, "app process stopped"),
            Ok((name, Err(err))) => {
                warn!(process = %name, "app process error during shutdown: {:#}", err)
            }
            Err(err) => error!("app process panicked during shutdown: {}", err),
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => {
                error!("Error setting up signal handler: {}", err);
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM signal");
                token.cancel();
            }
            Err(err) => {
                error!("Error setting up SIGTERM handler: {}", err);
            }
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();

    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("Closer completed successfully"),
            Ok(Err(err)) => error!("Closer error: {:#}", err),
            Err(err) => error!("Closer panicked: {}", err),
        }
    }
}
