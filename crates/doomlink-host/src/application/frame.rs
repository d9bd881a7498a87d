//! Frame delivery: inline over the socket, or through shared memory.
//!
//! The client chooses the path.  Until it names a shared-memory object every
//! frame is sent inline as a `Frame` message; once a name is set, pixels are
//! copied into that object and only a `FrameShmReady` notification goes over
//! the socket.

use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;

use doomlink_core::buffer::{ByteSink, SendBuffer};
use doomlink_core::protocol::messages::{frame_size, DetachedUi};
use doomlink_core::protocol::{encode_server_message, ServerMessage};
use tracing::{debug, info};

use crate::application::session::SessionError;
use crate::infrastructure::shm::SharedFrame;
use crate::infrastructure::signal::CancelToken;

/// How the next frame will travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePath {
    Inline,
    SharedMemory,
}

/// Per-connection frame state.
#[derive(Debug)]
pub struct FrameChannel {
    width: u16,
    height: u16,
    shm: Option<SharedFrame>,
    want_frame: bool,
    detached_ui: DetachedUi,
}

impl FrameChannel {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            shm: None,
            want_frame: false,
            detached_ui: DetachedUi::empty(),
        }
    }

    /// Bytes in one frame (`width * height * 3`).
    pub fn frame_size(&self) -> usize {
        frame_size(self.width, self.height)
    }

    pub fn dimensions(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn path(&self) -> FramePath {
        if self.shm.is_some() {
            FramePath::SharedMemory
        } else {
            FramePath::Inline
        }
    }

    /// Whether the client asked for a frame since the last one was sent.
    pub fn wants_frame(&self) -> bool {
        self.want_frame
    }

    pub fn request_frame(&mut self) {
        self.want_frame = true;
    }

    /// Flags a UI element for the client to draw over the next frame.
    pub fn mark_detached_ui(&mut self, ui: DetachedUi) {
        self.detached_ui.insert(ui);
    }

    pub fn detached_ui(&self) -> DetachedUi {
        self.detached_ui
    }

    /// Replaces the shared-memory target, unlinking the previous object.
    /// An empty name switches back to inline frames.
    pub fn set_shm_target(&mut self, name: Vec<u8>) {
        self.release();
        if name.is_empty() {
            info!("frame shared memory disabled; sending frames inline");
        } else {
            info!(name = %String::from_utf8_lossy(&name), "frame shared memory target set");
            self.shm = Some(SharedFrame::new(OsString::from_vec(name)));
        }
    }

    /// Unlinks the current shared-memory object, if any.
    pub fn release(&mut self) {
        if let Some(shm) = self.shm.take() {
            shm.unlink();
        }
    }

    /// Delivers one frame and clears the frame request and detached-UI flags.
    ///
    /// # Errors
    ///
    /// [`SessionError::FrameSize`] if `pixels` is not exactly one frame;
    /// otherwise whatever encoding or shared-memory publishing reports.
    pub fn send_frame<S: ByteSink + ?Sized>(
        &mut self,
        pixels: &[u8],
        buf: &mut SendBuffer,
        sink: &mut S,
        cancel: &CancelToken,
    ) -> Result<(), SessionError> {
        let expected = self.frame_size();
        if pixels.len() != expected {
            return Err(SessionError::FrameSize {
                expected,
                actual: pixels.len(),
            });
        }

        match &self.shm {
            None => {
                let msg = ServerMessage::Frame {
                    pixels,
                    detached_ui: self.detached_ui,
                };
                encode_server_message(buf, sink, &msg)?;
            }
            Some(shm) => {
                shm.publish(pixels, cancel)?;
                encode_server_message(buf, sink, &ServerMessage::FrameShmReady)?;
            }
        }
        debug!(path = ?self.path(), "frame sent");

        self.want_frame = false;
        self.detached_ui.clear();
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (FrameChannel, SendBuffer, Vec<u8>) {
        let frames = FrameChannel::new(4, 2);
        let buf = SendBuffer::with_capacity(2 * frames.frame_size());
        (frames, buf, Vec::new())
    }

    #[test]
    fn test_inline_frame_carries_pixels_and_ui_bits() {
        // Arrange
        let (mut frames, mut buf, mut sink) = channel();
        let pixels = vec![7u8; frames.frame_size()];
        frames.request_frame();
        frames.mark_detached_ui(DetachedUi::MENU_MESSAGE);

        // Act
        frames
            .send_frame(&pixels, &mut buf, &mut sink, &CancelToken::new())
            .unwrap();
        buf.flush(&mut sink).unwrap();

        // Assert
        assert_eq!(sink.len(), 1 + 24 + 1);
        assert_eq!(sink[0], 0);
        assert_eq!(&sink[1..25], &pixels[..]);
        assert_eq!(sink[25], 1);
        assert!(!frames.wants_frame());
        assert!(frames.detached_ui().is_empty());
    }

    #[test]
    fn test_wrong_frame_size_is_rejected_without_output() {
        let (mut frames, mut buf, mut sink) = channel();
        frames.request_frame();

        let err = frames
            .send_frame(&[0u8; 5], &mut buf, &mut sink, &CancelToken::new())
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::FrameSize {
                expected: 24,
                actual: 5
            }
        ));
        assert!(buf.is_empty());
        assert!(frames.wants_frame());
    }

    #[test]
    fn test_empty_shm_name_selects_inline_path() {
        let (mut frames, _, _) = channel();

        frames.set_shm_target(Vec::new());

        assert_eq!(frames.path(), FramePath::Inline);
    }

    #[test]
    fn test_shm_name_selects_shared_memory_path() {
        let (mut frames, _, _) = channel();

        frames.set_shm_target(format!("/doomlink-frame-unit-{}", std::process::id()).into_bytes());

        assert_eq!(frames.path(), FramePath::SharedMemory);
        frames.release();
        assert_eq!(frames.path(), FramePath::Inline);
    }
}
