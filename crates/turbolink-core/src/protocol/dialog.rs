//! Transaction engine
//!
//! A [`Dialog`] drives exactly one request/response exchange over a shared
//! multidrop line:
//!
//! ```text
//! Idle -> Writing -> ReadingFrame -> Accepted
//!                        |   ^    \-> TimedOut
//!                        v   |     \> TransportError
//!               ForeignFrameDiscarded
//! ```
//!
//! Other controllers may be talking when we listen, so a complete frame that
//! does not carry our address is dropped and reading resumes. The response
//! deadline is armed once, after the write, and is never extended.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use super::frame::{address_field, locate_message, next_frame_start, FRAME_START};
use super::{
    MessageBuffer, ProtocolError, Request, SerialChannel, DEFAULT_TIMEOUT_MS, MAX_MESSAGE_SIZE,
};

/// Where a dialog is in its exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    /// Created, nothing sent yet
    Idle,
    /// Request is being written
    Writing,
    /// Waiting for a complete frame
    ReadingFrame,
    /// A frame from another controller was dropped
    ForeignFrameDiscarded,
    /// A frame carrying our address arrived
    Accepted,
    /// The deadline passed before our frame arrived
    TimedOut,
    /// The channel failed while writing or reading
    TransportError,
}

impl DialogState {
    /// Whether the dialog has finished
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(
            self,
            DialogState::Accepted | DialogState::TimedOut | DialogState::TransportError
        )
    }
}

/// Outcome of one dialog
#[derive(Debug)]
pub struct DialogResult {
    /// Received bytes; may be partially filled when the dialog failed
    pub response: MessageBuffer,
    /// Transport failure, if any. `None` exactly when `state` is `Accepted`.
    pub error: Option<ProtocolError>,
    /// Terminal state the dialog ended in
    pub state: DialogState,
    /// Number of frames from other controllers dropped along the way
    pub foreign_frames: usize,
}

impl DialogResult {
    /// Turn the result into the response buffer or the transport error
    pub fn into_response(self) -> Result<MessageBuffer, ProtocolError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.response),
        }
    }
}

/// One in-flight request/response exchange.
///
/// The dialog holds the only mutable borrow of the channel for its whole
/// lifetime, so two exchanges can never interleave on one line.
pub struct Dialog<'a, C: SerialChannel> {
    channel: &'a mut C,
    request: Vec<u8>,
    response: MessageBuffer,
    received: usize,
    timeout: Duration,
    state: DialogState,
    foreign_frames: usize,
}

impl<'a, C: SerialChannel> Dialog<'a, C> {
    /// Prepare a dialog sending `request` over `channel`
    pub fn new(channel: &'a mut C, request: &Request) -> Self {
        Self::with_bytes(channel, request.encode())
    }

    /// Prepare a dialog sending already encoded bytes
    pub fn with_bytes(channel: &'a mut C, request: Vec<u8>) -> Self {
        Self {
            channel,
            request,
            response: MessageBuffer::new(),
            received: 0,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            state: DialogState::Idle,
            foreign_frames: 0,
        }
    }

    /// Override the response timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the exchange to completion
    pub async fn run(mut self) -> DialogResult {
        self.enter(DialogState::Writing);
        trace!(request = %String::from_utf8_lossy(&self.request).trim_end(), "send");
        if let Err(e) = self.write_request().await {
            debug!("write failed: {}", e);
            return self.complete(DialogState::TransportError, Some(e.into()));
        }

        self.enter(DialogState::ReadingFrame);
        let deadline = Instant::now() + self.timeout;

        loop {
            match timeout_at(deadline, self.read_frame()).await {
                Err(_) => {
                    warn!(
                        "no response from {} within {}ms",
                        String::from_utf8_lossy(address_field(&self.request).unwrap_or_default()),
                        self.timeout.as_millis()
                    );
                    return self.complete(DialogState::TimedOut, Some(ProtocolError::TimedOut));
                }
                Ok(Err(e)) => {
                    debug!("read failed: {}", e);
                    return self.complete(DialogState::TransportError, Some(e));
                }
                Ok(Ok(())) => {}
            }

            trace!(
                response = %String::from_utf8_lossy(self.response.message().unwrap_or_default()).trim_end(),
                "receive"
            );

            if self.address_matches() {
                return self.complete(DialogState::Accepted, None);
            }

            self.enter(DialogState::ForeignFrameDiscarded);
            self.foreign_frames += 1;
            self.discard_foreign_frame();
            self.enter(DialogState::ReadingFrame);
        }
    }

    async fn write_request(&mut self) -> std::io::Result<()> {
        self.channel.write_all(&self.request).await?;
        self.channel.flush().await
    }

    fn enter(&mut self, state: DialogState) {
        trace!(from = ?self.state, to = ?state, "dialog");
        self.state = state;
    }

    /// Read until a terminator has been received or the buffer is full.
    /// Returns immediately if that already holds.
    async fn read_frame(&mut self) -> Result<(), ProtocolError> {
        while !self.frame_complete() {
            let n = self
                .channel
                .read(&mut self.response.as_mut_bytes()[self.received..])
                .await?;
            if n == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            self.received += n;
        }
        Ok(())
    }

    /// Bytes following the frame's terminator in the same read stay buffered
    /// for the next evaluation.
    fn frame_complete(&self) -> bool {
        self.received == MAX_MESSAGE_SIZE
            || locate_message(&self.response.as_bytes()[..self.received]).is_some()
    }

    fn address_matches(&self) -> bool {
        let received = &self.response.as_bytes()[..self.received];
        if self.is_wildcard() {
            return received.first() == Some(&FRAME_START);
        }
        received.first() == Some(&FRAME_START)
            && address_field(received).is_some()
            && address_field(received) == address_field(&self.request)
    }

    fn is_wildcard(&self) -> bool {
        address_field(&self.request) == Some(&b"99"[..])
    }

    /// Drop the leading foreign frame. If another frame already started
    /// behind it, shift that one to the front so it is evaluated next.
    fn discard_foreign_frame(&mut self) {
        let received = self.received;
        let bytes = self.response.as_mut_bytes();
        match next_frame_start(&bytes[..received]) {
            Some(start) => {
                warn!(
                    "foreign frame {:?}, next frame already buffered",
                    String::from_utf8_lossy(&bytes[..start])
                );
                bytes.copy_within(start..received, 0);
                bytes[received - start..].fill(0);
                self.received = received - start;
            }
            None => {
                warn!(
                    "foreign frame {:?}, reading again",
                    String::from_utf8_lossy(&bytes[..received])
                );
                bytes.fill(0);
                self.received = 0;
            }
        }
    }

    fn complete(mut self, state: DialogState, error: Option<ProtocolError>) -> DialogResult {
        debug_assert!(state.is_terminal());
        self.enter(state);
        debug!(?state, foreign_frames = self.foreign_frames, "dialog complete");
        DialogResult {
            response: self.response,
            error,
            state,
            foreign_frames: self.foreign_frames,
        }
    }
}
