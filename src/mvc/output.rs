use {parking_lot::Mutex, std::sync::Arc};

///
/// Collects what an action writes while it runs.
///
/// Clones share the same buffer, so the front controller, the controller
/// and the error controller all see one stream. The front controller
/// discards it when an action fails, so a half rendered page never reaches
/// the client.
///
/// ```
/// use axum_mvc::mvc::OutputBuffer;
///
/// let buffer = OutputBuffer::new();
/// let writer = buffer.clone();
/// writer.write("<p>");
/// writer.write("hi</p>");
/// assert_eq!(buffer.take(), "<p>hi</p>");
/// assert!(buffer.is_empty());
/// ```
///
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Arc<Mutex<String>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, text: &str) {
        self.0.lock().push_str(text);
    }

    /// Drops everything written so far.
    pub fn clear(&self) {
        self.0.lock().clear();
    }

    /// Returns the buffered text and leaves the buffer empty.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.0.lock())
    }

    pub fn contents(&self) -> String {
        self.0.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_discards_partial_output() {
        let buffer = OutputBuffer::new();
        buffer.write("half a page");
        buffer.clear();
        buffer.write("error page");
        assert_eq!(buffer.contents(), "error page");
    }
}
