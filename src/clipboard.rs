use arboard::Clipboard;

use crate::error::{Error, Result};

/// True when a system clipboard can be opened in this environment.
///
/// Headless sessions (no display server, no clipboard daemon) report false,
/// and clipboard redirection is refused up front instead of failing after the
/// command has already run.
pub fn available() -> bool {
    Clipboard::new().is_ok()
}

/// Read the current clipboard text. An empty clipboard reads as "".
pub fn read() -> Result<String> {
    let mut clipboard = Clipboard::new().map_err(|e| Error::Clipboard(e.to_string()))?;
    match clipboard.get_text() {
        Ok(text) => Ok(text),
        Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
        Err(e) => Err(Error::Clipboard(e.to_string())),
    }
}

/// Replace the clipboard contents with `text`.
pub fn write(text: &str) -> Result<()> {
    let mut clipboard = Clipboard::new().map_err(|e| Error::Clipboard(e.to_string()))?;
    clipboard
        .set_text(text.to_string())
        .map_err(|e| Error::Clipboard(e.to_string()))
}
