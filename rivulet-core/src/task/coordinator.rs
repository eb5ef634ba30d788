use super::*;

/// Where operators hand their output.
pub trait MessageCollector {
    fn send(&mut self, envelope: OutgoingMessageEnvelope) -> Result<()>;
}

/// Which tasks a coordinator request applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestScope {
    CurrentTask,
    AllTasksInContainer,
}

/// Commit and shutdown signals raised from sink functions.
///
/// Requests take effect after the current `process`/`window` call returns.
pub trait TaskCoordinator {
    fn commit(&mut self, scope: RequestScope);
    fn shutdown(&mut self, scope: RequestScope);
}

/// Collector that keeps everything sent, in order.
#[derive(Debug, Default)]
pub struct BufferedCollector {
    sent: Vec<OutgoingMessageEnvelope>,
}

impl BufferedCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[OutgoingMessageEnvelope] {
        &self.sent
    }

    pub fn drain(&mut self) -> Vec<OutgoingMessageEnvelope> {
        std::mem::take(&mut self.sent)
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

impl MessageCollector for BufferedCollector {
    fn send(&mut self, envelope: OutgoingMessageEnvelope) -> Result<()> {
        self.sent.push(envelope);
        Ok(())
    }
}

/// Records the widest commit and shutdown scope requested since the last
/// [`take`](Self::take).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorRequests {
    pub commit: Option<RequestScope>,
    pub shutdown: Option<RequestScope>,
}

impl CoordinatorRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    pub fn is_empty(&self) -> bool {
        self.commit.is_none() && self.shutdown.is_none()
    }
}

fn widest(current: Option<RequestScope>, requested: RequestScope) -> RequestScope {
    match current {
        Some(RequestScope::AllTasksInContainer) => RequestScope::AllTasksInContainer,
        _ => requested,
    }
}

impl TaskCoordinator for CoordinatorRequests {
    fn commit(&mut self, scope: RequestScope) {
        tracing::debug!("commit requested ({:?})", scope);
        self.commit = Some(widest(self.commit, scope));
    }

    fn shutdown(&mut self, scope: RequestScope) {
        tracing::info!("shutdown requested ({:?})", scope);
        self.shutdown = Some(widest(self.shutdown, scope));
    }
}
