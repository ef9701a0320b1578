//! Console log view for sent and received messages.

use std::io::Write;

use chrono::Local;

use crate::message::ParsedMessage;

/// Line for a message the server received.
pub fn render_received(raw: &str) -> String {
    let msg = ParsedMessage::parse(raw);
    format!("Message received from '{}': {}", msg.origin, msg.body)
}

/// Line for a message the client sent.
pub fn render_sent(raw: &str) -> String {
    format!("Message sent: {}", ParsedMessage::parse(raw).body)
}

/// Timestamped line printer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogView;

impl LogView {
    /// Print a plain notification line.
    pub fn print_notification(self, text: &str) {
        self.print(text);
    }

    /// Print a message the server received.
    pub fn print_received(self, raw: &str) {
        self.print(&render_received(raw));
    }

    /// Print a message the client sent.
    pub fn print_sent(self, raw: &str) {
        self.print(&render_sent(raw));
    }

    fn print(self, line: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "[{}] {}", Local::now().format("%H:%M:%S"), line);
    }
}
