//! Terminal rendering of messages and status lines.

use std::collections::HashSet;
use std::io::{self, Write};

use chrono::Local;

use roomchat_common::Message;

/// Prints each message once, in the order the store holds them.
pub struct Printer<W: Write> {
    out: W,
    printed: HashSet<String>,
}

impl<W: Write> Printer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: HashSet::new(),
        }
    }

    /// Print messages not seen before. Returns how many were printed.
    ///
    /// Unseen messages that sort before everything already on screen are
    /// older history and are printed as a separate block.
    pub fn sync(&mut self, messages: &[Message]) -> io::Result<usize> {
        let split = messages
            .iter()
            .position(|m| self.printed.contains(&m.id))
            .unwrap_or(0);
        let (older, rest) = messages.split_at(split);

        let mut count = 0;
        if !older.is_empty() {
            writeln!(self.out, "-- older messages")?;
            count += self.print_new(older)?;
            writeln!(self.out, "-- end of older messages")?;
        }
        count += self.print_new(rest)?;
        self.out.flush()?;
        Ok(count)
    }

    fn print_new(&mut self, messages: &[Message]) -> io::Result<usize> {
        let mut count = 0;
        for message in messages {
            if self.printed.insert(message.id.clone()) {
                writeln!(self.out, "{}", format_message(message))?;
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn status(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "-- {line}")?;
        self.out.flush()
    }

    pub fn raw(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }
}

pub fn format_message(message: &Message) -> String {
    let at = message.created_at.with_timezone(&Local).format("%H:%M:%S");
    if message.is_bot() {
        format!("[{at}] * {}: {}", message.user_name, message.text)
    } else {
        format!("[{at}] {}: {}", message.user_name, message.text)
    }
}
