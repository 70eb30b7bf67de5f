//! Copying messages to the system clipboard

use crate::state::ChatMessage;
use anyhow::Result;
use tracing::{debug, warn};

pub trait ClipboardWriter {
    fn write_text(&mut self, text: &str) -> Result<()>;
}

/// System clipboard via `arboard`.
///
/// The handle is kept alive after the first copy: on X11 the clipboard
/// contents are owned by the process and vanish when the handle is dropped.
#[derive(Default)]
pub struct SystemClipboard {
    handle: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClipboardWriter for SystemClipboard {
    fn write_text(&mut self, text: &str) -> Result<()> {
        if self.handle.is_none() {
            self.handle = Some(arboard::Clipboard::new()?);
        }
        if let Some(clipboard) = self.handle.as_mut() {
            clipboard.set_text(text)?;
        }
        Ok(())
    }
}

/// Copy a message's text. Failures are logged, never surfaced.
pub fn copy_message(writer: &mut dyn ClipboardWriter, message: &ChatMessage) -> bool {
    match writer.write_text(message.raw_text()) {
        Ok(()) => {
            debug!(chars = message.raw_text().chars().count(), "message copied");
            true
        }
        Err(err) => {
            warn!(error = %err, "clipboard write failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Transcript;
    use anyhow::anyhow;

    #[derive(Default)]
    struct MemoryClipboard {
        contents: Option<String>,
        broken: bool,
    }

    impl ClipboardWriter for MemoryClipboard {
        fn write_text(&mut self, text: &str) -> Result<()> {
            if self.broken {
                return Err(anyhow!("clipboard unavailable"));
            }
            self.contents = Some(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_copies_raw_text() {
        let mut transcript = Transcript::new();
        let id = transcript.push_assistant("**bold** answer");
        let mut clipboard = MemoryClipboard::default();

        assert!(copy_message(&mut clipboard, transcript.get(id).unwrap()));
        assert_eq!(clipboard.contents.as_deref(), Some("**bold** answer"));
    }

    #[test]
    fn test_failure_is_swallowed() {
        let mut transcript = Transcript::new();
        let id = transcript.push_user("hi", None);
        let mut clipboard = MemoryClipboard {
            broken: true,
            ..Default::default()
        };

        assert!(!copy_message(&mut clipboard, transcript.get(id).unwrap()));
        assert!(clipboard.contents.is_none());
    }
}
