//! In-memory transport for tests. Listings and streams are canned text;
//! every shell records the commands written into it.

use std::collections::HashMap;
use std::io::{self, Cursor};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::{ChannelError, CommandChannel, RemoteStream, Terminator, Transport};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShellLog {
    pub commands: Vec<String>,
    pub closed: bool,
    pub terminated: bool,
}

#[derive(Default)]
pub struct MockTransport {
    listings: HashMap<String, String>,
    streams: Mutex<HashMap<String, String>>,
    settings: Mutex<HashMap<String, String>>,
    /// Sends accepted before the channel breaks.
    fail_after: HashMap<String, usize>,
    delays: HashMap<String, Duration>,
    shells: Mutex<Vec<(String, Arc<Mutex<ShellLog>>)>>,
    pub executed: Mutex<Vec<(String, String)>>,
    pub streamed: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(mut self, target: &str, listing: &str) -> Self {
        self.listings.insert(target.into(), listing.into());
        self
    }

    pub fn with_stream(self, target: &str, text: &str) -> Self {
        self.streams.lock().unwrap().insert(target.into(), text.into());
        self
    }

    pub fn with_setting(self, target: &str, value: &str) -> Self {
        self.settings.lock().unwrap().insert(target.into(), value.into());
        self
    }

    pub fn failing_after(mut self, target: &str, sends: usize) -> Self {
        self.fail_after.insert(target.into(), sends);
        self
    }

    pub fn with_delay(mut self, target: &str, delay: Duration) -> Self {
        self.delays.insert(target.into(), delay);
        self
    }

    /// Log of the most recent shell opened on `target`.
    pub fn shell_log(&self, target: &str) -> ShellLog {
        self.shells
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(t, _)| t == target)
            .map(|(_, log)| log.lock().unwrap().clone())
            .unwrap_or_default()
    }

    pub fn setting(&self, target: &str) -> Option<String> {
        self.settings.lock().unwrap().get(target).cloned()
    }
}

impl Transport for MockTransport {
    fn exec(&self, target: &str, command: &str) -> Result<String, ChannelError> {
        self.executed
            .lock()
            .unwrap()
            .push((target.into(), command.into()));

        if command == "getevent -pl" {
            return self.listings.get(target).cloned().ok_or(ChannelError::Exit {
                command: command.into(),
                status: 1,
            });
        }
        if command == "settings get system show_touches" {
            let value = self.setting(target).unwrap_or_else(|| "null".into());
            return Ok(format!("{}\n", value));
        }
        if let Some(value) = command.strip_prefix("settings put system show_touches ") {
            self.settings
                .lock()
                .unwrap()
                .insert(target.into(), value.into());
        }
        Ok(String::new())
    }

    fn stream(&self, target: &str, command: &str) -> Result<RemoteStream, ChannelError> {
        self.streamed
            .lock()
            .unwrap()
            .push((target.into(), command.into()));
        let text = self
            .streams
            .lock()
            .unwrap()
            .remove(target)
            .ok_or(ChannelError::Closed)?;
        Ok(RemoteStream {
            reader: Box::new(Cursor::new(text.into_bytes())),
            terminator: Box::new(|| {}),
        })
    }

    fn shell(&self, target: &str) -> Result<Box<dyn CommandChannel>, ChannelError> {
        let log = Arc::new(Mutex::new(ShellLog::default()));
        self.shells
            .lock()
            .unwrap()
            .push((target.into(), log.clone()));
        Ok(Box::new(MockShell {
            log,
            fail_after: self.fail_after.get(target).copied(),
            delay: self.delays.get(target).copied(),
            sent: 0,
        }))
    }
}

struct MockShell {
    log: Arc<Mutex<ShellLog>>,
    fail_after: Option<usize>,
    delay: Option<Duration>,
    sent: usize,
}

impl CommandChannel for MockShell {
    fn send(&mut self, command: &str) -> Result<(), ChannelError> {
        if self.fail_after.is_some_and(|limit| self.sent >= limit) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "shell went away").into());
        }
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.sent += 1;
        self.log.lock().unwrap().commands.push(command.into());
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), ChannelError> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }

    fn terminator(&self) -> Terminator {
        let log = self.log.clone();
        Box::new(move || log.lock().unwrap().terminated = true)
    }
}
