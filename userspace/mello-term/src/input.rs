//! Keyboard input handling module
//!
//! Handles keyboard input and maps special keys to escape sequences.

/// Key event representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Char(char),
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    Backspace,
    Enter,
    Tab,
    Escape,
    Function(u8), // F1-F12
}

impl KeyEvent {
    /// Convert key event to escape sequence bytes
    pub fn to_bytes(&self) -> &[u8] {
        // TODO: Implement in subtask 7.6
        // Map special keys to ANSI escape sequences
        match self {
            KeyEvent::Char(_) => &[],
            KeyEvent::ArrowUp => b"\x1b[A",
            KeyEvent::ArrowDown => b"\x1b[B",
            KeyEvent::ArrowRight => b"\x1b[C",
            KeyEvent::ArrowLeft => b"\x1b[D",
            KeyEvent::Home => b"\x1b[H",
            KeyEvent::End => b"\x1b[F",
            KeyEvent::Enter => b"\r",
            KeyEvent::Backspace => b"\x7f",
            KeyEvent::Tab => b"\t",
            KeyEvent::Escape => b"\x1b",
            _ => &[],
        }
    }
}

/// Read keyboard input (platform-specific)
///
/// Note: This is a stub implementation. In a real terminal emulator,
/// this would read from stdin or a platform-specific input device.
/// For MelloOS, keyboard input would come from the kernel's keyboard driver.
pub fn read_keyboard_input() -> Option<KeyEvent> {
    // TODO: Implement actual keyboard reading
    // This would involve:
    // 1. Reading from stdin (FD 0) or a keyboard device
    // 2. Parsing scan codes or key events
    // 3. Converting to KeyEvent enum
    
    // For now, return None (no input available)
    None
}

/// Handle keyboard input and write to PTY master
///
/// This function reads keyboard input and sends it to the PTY master.
/// Special keys are converted to ANSI escape sequences.
pub fn handle_keyboard_input(pty_master: &crate::pty::PtyMaster) -> Result<(), &'static str> {
    if let Some(key_event) = read_keyboard_input() {
        match key_event {
            KeyEvent::Char(ch) => {
                // Regular character - send as-is
                let mut buf = [0u8; 4];
                let s = ch.encode_utf8(&mut buf);
                pty_master.write(s.as_bytes())?;
            }
            _ => {
                // Special key - send escape sequence
                let bytes = key_event.to_bytes();
                if !bytes.is_empty() {
                    pty_master.write(bytes)?;
                }
            }
        }
    }
    Ok(())
}
