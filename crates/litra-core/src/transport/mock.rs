//! Mock USB transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{ClaimInfo, TransportError, UsbTransport};
use crate::catalog::{GLOW_PRODUCT_ID, LOGITECH_VENDOR_ID};

/// Interrupt IN endpoint the mock advertises.
pub const MOCK_INPUT_ENDPOINT: u8 = 0x81;

/// A captured write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub endpoint: u8,
    pub data: Vec<u8>,
    pub timeout: Duration,
}

#[derive(Debug, Default)]
struct MockInner {
    /// Queued reads per endpoint, in order.
    reads: VecDeque<(u8, Result<Vec<u8>, MockFailure>)>,
    writes: Vec<WriteRecord>,
    claims: usize,
    releases: usize,
    connected: bool,
    fail_claim: bool,
    fail_writes: bool,
    kernel_driver_active: bool,
    kernel_driver_detached: bool,
    kernel_driver_reattached: bool,
}

/// Failure to inject on a queued read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Disconnected,
    Io,
}

/// Mock transport for unit testing session logic.
///
/// Clones share state, so a test can keep a handle while the session owns
/// the transport.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
    vid: u16,
    pid: u16,
}

impl MockTransport {
    /// A Litra Glow.
    pub fn new() -> Self {
        Self::with_ids(LOGITECH_VENDOR_ID, GLOW_PRODUCT_ID)
    }

    pub fn with_ids(vid: u16, pid: u16) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockInner {
                connected: true,
                ..Default::default()
            })),
            vid,
            pid,
        }
    }

    /// Queue bytes returned by the next read of `endpoint`.
    pub fn queue_read(&self, endpoint: u8, data: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .reads
            .push_back((endpoint, Ok(data.to_vec())));
    }

    /// Queue a failure returned by the next read of `endpoint`.
    pub fn queue_failure(&self, endpoint: u8, failure: MockFailure) {
        self.inner
            .lock()
            .unwrap()
            .reads
            .push_back((endpoint, Err(failure)));
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<WriteRecord> {
        self.inner.lock().unwrap().writes.clone()
    }

    /// Number of queued reads not yet consumed.
    pub fn pending_reads(&self) -> usize {
        self.inner.lock().unwrap().reads.len()
    }

    pub fn claim_count(&self) -> usize {
        self.inner.lock().unwrap().claims
    }

    pub fn release_count(&self) -> usize {
        self.inner.lock().unwrap().releases
    }

    /// Pretend a kernel driver is bound to the interface.
    pub fn set_kernel_driver_active(&self, active: bool) {
        self.inner.lock().unwrap().kernel_driver_active = active;
    }

    pub fn kernel_driver_reattached(&self) -> bool {
        self.inner.lock().unwrap().kernel_driver_reattached
    }

    pub fn fail_claim(&self) {
        self.inner.lock().unwrap().fail_claim = true;
    }

    pub fn fail_writes(&self) {
        self.inner.lock().unwrap().fail_writes = true;
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.inner.lock().unwrap().connected = false;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn claim(&mut self, interface: u8) -> Result<ClaimInfo, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        let detached = inner.kernel_driver_active;
        inner.kernel_driver_active = false;
        inner.kernel_driver_detached = detached;
        if inner.fail_claim {
            return Err(TransportError::ClaimInterfaceFailed {
                interface,
                message: "mock claim failure".into(),
            });
        }
        inner.claims += 1;
        Ok(ClaimInfo {
            kernel_driver_detached: detached,
        })
    }

    fn write(&self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connected {
            return Err(TransportError::Disconnected);
        }
        if inner.fail_writes {
            return Err(TransportError::WriteFailed("mock write failure".into()));
        }
        inner.writes.push(WriteRecord {
            endpoint,
            data: data.to_vec(),
            timeout,
        });
        Ok(data.len())
    }

    fn read(
        &self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connected {
            return Err(TransportError::Disconnected);
        }
        let Some(pos) = inner.reads.iter().position(|(ep, _)| *ep == endpoint) else {
            drop(inner);
            // Idle poll: yield briefly so pollers don't spin.
            std::thread::sleep(timeout.min(Duration::from_millis(1)));
            return Err(TransportError::timeout(timeout));
        };
        let (_, queued) = inner.reads.remove(pos).unwrap();
        match queued {
            Ok(mut data) => {
                data.truncate(max_len);
                Ok(data)
            }
            Err(MockFailure::Timeout) => Err(TransportError::timeout(timeout)),
            Err(MockFailure::Disconnected) => {
                inner.connected = false;
                Err(TransportError::Disconnected)
            }
            Err(MockFailure::Io) => Err(TransportError::ReadFailed("mock read failure".into())),
        }
    }

    fn input_endpoint(&self) -> Option<u8> {
        Some(MOCK_INPUT_ENDPOINT)
    }

    fn release(&mut self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.releases += 1;
        if inner.kernel_driver_detached {
            inner.kernel_driver_detached = false;
            inner.kernel_driver_active = true;
            inner.kernel_driver_reattached = true;
        }
        Ok(())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(10);

    #[test]
    fn test_mock_read_queue_per_endpoint() {
        let mock = MockTransport::new();
        mock.queue_read(0x82, b"ack");
        mock.queue_read(MOCK_INPUT_ENDPOINT, b"report");

        assert_eq!(mock.read(MOCK_INPUT_ENDPOINT, 64, T).unwrap(), b"report");
        assert_eq!(mock.read(0x82, 64, T).unwrap(), b"ack");
        assert!(mock.read(0x82, 64, T).unwrap_err().is_timeout());
    }

    #[test]
    fn test_mock_write_capture() {
        let mock = MockTransport::new();
        mock.write(0x02, b"Hello", T).unwrap();
        mock.write(0x02, b"World", T).unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].data, b"Hello");
        assert_eq!(writes[1].endpoint, 0x02);
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        mock.disconnect();
        assert!(matches!(
            mock.write(0x02, b"test", T),
            Err(TransportError::Disconnected)
        ));
    }

    #[test]
    fn test_mock_claim_reports_detach() {
        let mut mock = MockTransport::new();
        mock.set_kernel_driver_active(true);
        let info = mock.claim(0).unwrap();
        assert!(info.kernel_driver_detached);
        assert_eq!(mock.claim_count(), 1);
    }
}
