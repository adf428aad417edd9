use tokio::io::{AsyncRead, AsyncWrite};

/// Byte stream a [`Dialog`](super::Dialog) runs over.
///
/// Anything tokio can read from and write to qualifies: a
/// `tokio_serial::SerialStream` on real hardware, a `tokio::io::DuplexStream`
/// for the demo bus and tests. Port setup (name, baud rate) happens before a
/// channel reaches this crate. Dropping a pending read cancels it.
pub trait SerialChannel: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> SerialChannel for T where T: AsyncRead + AsyncWrite + Unpin + Send {}
