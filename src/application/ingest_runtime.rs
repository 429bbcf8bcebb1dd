//! Ingest runtime.
//!
//! Owns the lifetime of one `serve` run: the consumer member, the read API
//! and the store they share. The store is closed only after both tasks have
//! stopped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::http::ReadApiServer;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{AggregateReader, AggregateStore, ObservationLog};
use crate::services::{AccumulatorService, ConsumerMember, MemberState, MemberStatus};

/// Error type for the ingest runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// No partition assignment arrived in time
    #[error("Timed out after {0:?} waiting to join the consumer group")]
    JoinTimeout(Duration),

    /// The member stopped before its first assignment without reporting why
    #[error("Consumer member stopped before joining the group")]
    StoppedBeforeJoin,

    /// The member halted on a fatal error
    #[error("Consumer member halted: {0}")]
    MemberFailed(#[source] DomainError),

    #[error("Read API failed: {0}")]
    Http(#[source] std::io::Error),

    /// A runtime task panicked or was aborted
    #[error("Task failed: {0}")]
    Task(String),
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeReport {
    /// Assignment sessions the member went through.
    pub sessions: u64,
}

/// Runs the consumer member and the read API over one shared service.
///
/// The read API starts once the member holds its first assignment. Both
/// stop on the same cancellation token; the store is closed only after both
/// tasks have joined.
pub struct IngestRuntime<S: AggregateStore + 'static> {
    service: Arc<AccumulatorService<S>>,
    app_name: String,
    join_timeout: Duration,
}

enum Exit {
    Shutdown,
    Member(Result<DomainResult<()>, JoinError>),
    Http(Result<std::io::Result<()>, JoinError>),
}

impl<S: AggregateStore + 'static> IngestRuntime<S> {
    pub fn new(
        service: Arc<AccumulatorService<S>>,
        app_name: impl Into<String>,
        join_timeout: Duration,
    ) -> Self {
        Self {
            service,
            app_name: app_name.into(),
            join_timeout,
        }
    }

    /// Run until `shutdown` resolves or a task stops on its own.
    ///
    /// A member failure is returned after the ordered shutdown completes.
    pub async fn run<L, F>(self, log: L, listener: TcpListener, shutdown: F) -> Result<RuntimeReport, RuntimeError>
    where
        L: ObservationLog + 'static,
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let cancel = CancellationToken::new();

        let member = ConsumerMember::new(Arc::clone(&self.service));
        let mut status = member.subscribe();
        let token = cancel.clone();
        let mut member_task = tokio::spawn(async move { member.run(log, token).await });

        let joined = tokio::select! {
            joined = tokio::time::timeout(self.join_timeout, wait_until_joined(&mut status)) => joined,
            () = &mut shutdown => {
                info!("shutdown requested before joining the consumer group");
                cancel.cancel();
                let outcome = join_member(member_task.await);
                self.service.close().await;
                outcome?;
                return Ok(RuntimeReport { sessions: status.borrow().session });
            }
        };

        match joined {
            Ok(ready) if ready.has_joined() => {
                info!(session = ready.session, "consumer member ready");
            }
            Ok(_) => {
                let outcome = join_member(member_task.await);
                self.service.close().await;
                outcome?;
                return Err(RuntimeError::StoppedBeforeJoin);
            }
            Err(_) => {
                error!(timeout = ?self.join_timeout, "no partition assignment received");
                cancel.cancel();
                if let Err(err) = join_member(member_task.await) {
                    warn!(error = %err, "consumer member failed while joining");
                }
                self.service.close().await;
                return Err(RuntimeError::JoinTimeout(self.join_timeout));
            }
        }

        let reader: Arc<dyn AggregateReader> = Arc::clone(&self.service) as Arc<dyn AggregateReader>;
        let server = ReadApiServer::new(reader, self.app_name.clone());
        let token = cancel.clone();
        let mut http_task = tokio::spawn(server.serve_with_shutdown(listener, async move {
            token.cancelled().await;
        }));

        let exit = tokio::select! {
            () = &mut shutdown => Exit::Shutdown,
            joined = &mut member_task => Exit::Member(joined),
            served = &mut http_task => Exit::Http(served),
        };
        cancel.cancel();

        let (member_joined, http_joined) = match exit {
            Exit::Shutdown => {
                info!("shutting down");
                (member_task.await, http_task.await)
            }
            Exit::Member(joined) => (joined, http_task.await),
            Exit::Http(served) => {
                warn!("read API stopped on its own, shutting down");
                (member_task.await, served)
            }
        };

        self.service.close().await;
        info!("aggregate store closed");

        let report = RuntimeReport {
            sessions: status.borrow().session,
        };
        join_member(member_joined)?;
        http_joined
            .map_err(|e| RuntimeError::Task(e.to_string()))?
            .map_err(RuntimeError::Http)?;
        Ok(report)
    }
}

async fn wait_until_joined(status: &mut tokio::sync::watch::Receiver<MemberStatus>) -> MemberStatus {
    match status
        .wait_for(|s| s.has_joined() || s.state == MemberState::Stopped)
        .await
    {
        Ok(current) => *current,
        // The member dropped its sender, so it is no longer running.
        Err(_) => MemberStatus {
            state: MemberState::Stopped,
            session: 0,
        },
    }
}

fn join_member(joined: Result<DomainResult<()>, JoinError>) -> Result<(), RuntimeError> {
    joined
        .map_err(|e| RuntimeError::Task(e.to_string()))?
        .map_err(RuntimeError::MemberFailed)
}
