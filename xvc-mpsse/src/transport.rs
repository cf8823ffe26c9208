use std::io;

/// Byte pipe to an MPSSE engine.
///
/// Implemented by the USB device driver and by [`crate::sim::SimulatedChain`].
pub trait Transport {
    /// Writes commands to the engine. Returns how many bytes were accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Reads exactly `buf.len()` bytes of read-back, blocking until they arrive
    /// or the transport gives up.
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Number of read-back bytes that arrived and have not been read yet.
    fn queued(&mut self) -> io::Result<usize>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_exact(buf)
    }

    fn queued(&mut self) -> io::Result<usize> {
        (**self).queued()
    }
}
