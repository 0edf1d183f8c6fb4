//! In-memory transport for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlink_connect::ConnectionDescriptor;

use crate::transport::{PhysicalConnection, Transport, TransportError};

/// A transport that opens fake connections and counts what happens to them.
#[derive(Debug, Default)]
pub struct MockTransport {
    connects: AtomicUsize,
    closed: Arc<AtomicUsize>,
    broken_up_to: Arc<AtomicUsize>,
    refuse: AtomicBool,
    delay: Option<Duration>,
    last: Mutex<Option<ConnectionDescriptor>>,
}

impl MockTransport {
    /// Create a transport that connects immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that takes `delay` to connect.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Refuse (or stop refusing) new connections.
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make every connection opened so far report unhealthy.
    pub fn break_all(&self) {
        self.broken_up_to.store(self.connects(), Ordering::SeqCst);
    }

    /// Successful connects so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Connections closed so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Descriptor of the last connection attempt.
    pub fn last_descriptor(&self) -> Option<ConnectionDescriptor> {
        self.last.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn PhysicalConnection>, TransportError> {
        *self.last.lock() = Some(descriptor.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Refused);
        }
        let serial = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MockConnection {
            serial,
            closed: self.closed.clone(),
            broken_up_to: self.broken_up_to.clone(),
        }))
    }
}

struct MockConnection {
    serial: usize,
    closed: Arc<AtomicUsize>,
    broken_up_to: Arc<AtomicUsize>,
}

impl PhysicalConnection for MockConnection {
    fn is_healthy(&self) -> bool {
        self.serial > self.broken_up_to.load(Ordering::SeqCst)
    }

    fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
