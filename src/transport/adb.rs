//! Targets reached through the `adb` client. Every operation is an
//! `adb -s SERIAL shell ...` child process.

use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use super::{ChannelError, CommandChannel, RemoteStream, Terminator, Transport};

/// How often `close` polls for the shell to exit.
const REAP_INTERVAL: Duration = Duration::from_millis(20);

pub struct AdbTransport {
    adb: PathBuf,
}

impl AdbTransport {
    pub fn new(adb: impl AsRef<Path>) -> Self {
        Self {
            adb: adb.as_ref().to_path_buf(),
        }
    }

    fn shell_command(&self, serial: &str, args: &[&str]) -> Command {
        let mut command = Command::new(&self.adb);
        command.arg("-s").arg(serial).arg("shell").args(args);
        command
    }

    fn describe(&self, serial: &str, args: &[&str]) -> String {
        let mut text = format!("{} -s {} shell", self.adb.display(), serial);
        for arg in args {
            text.push(' ');
            text.push_str(arg);
        }
        text
    }

    fn spawn(&self, serial: &str, args: &[&str], mut command: Command) -> Result<Child, ChannelError> {
        log::debug!("Executing: {}", self.describe(serial, args));
        command.spawn().map_err(|source| ChannelError::Spawn {
            command: self.describe(serial, args),
            source,
        })
    }
}

impl Transport for AdbTransport {
    fn exec(&self, target: &str, command: &str) -> Result<String, ChannelError> {
        let args = [command];
        log::debug!("Executing: {}", self.describe(target, &args));
        let output = self
            .shell_command(target, &args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ChannelError::Spawn {
                command: self.describe(target, &args),
                source,
            })?;

        if !output.status.success() {
            return Err(ChannelError::Exit {
                command: self.describe(target, &args),
                status: output.status.code().unwrap_or(-1),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn stream(&self, target: &str, command: &str) -> Result<RemoteStream, ChannelError> {
        let args: Vec<&str> = command.split_whitespace().collect();
        let mut cmd = self.shell_command(target, &args);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped());
        let mut child = self.spawn(target, &args, cmd)?;
        let stdout = child.stdout.take().ok_or(ChannelError::Closed)?;
        let child = Arc::new(Mutex::new(child));

        Ok(RemoteStream {
            reader: Box::new(BufReader::new(stdout)),
            terminator: kill_and_reap(child),
        })
    }

    fn shell(&self, target: &str) -> Result<Box<dyn CommandChannel>, ChannelError> {
        let mut cmd = self.shell_command(target, &[]);
        // Output is never read; a full pipe would stall the remote shell.
        cmd.stdin(Stdio::piped()).stdout(Stdio::null());
        let mut child = self.spawn(target, &[], cmd)?;
        let stdin = child.stdin.take().ok_or(ChannelError::Closed)?;

        Ok(Box::new(AdbShell {
            description: self.describe(target, &[]),
            stdin: Some(stdin),
            child: Arc::new(Mutex::new(child)),
        }))
    }
}

struct AdbShell {
    description: String,
    stdin: Option<ChildStdin>,
    child: Arc<Mutex<Child>>,
}

impl CommandChannel for AdbShell {
    fn send(&mut self, command: &str) -> Result<(), ChannelError> {
        let stdin = self.stdin.as_mut().ok_or(ChannelError::Closed)?;
        stdin.write_all(command.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), ChannelError> {
        drop(self.stdin.take());
        // Poll instead of `wait` so the terminator can still take the lock.
        loop {
            if let Some(status) = lock(&self.child).try_wait()? {
                if status.success() {
                    return Ok(());
                }
                return Err(ChannelError::Exit {
                    command: self.description.clone(),
                    status: status.code().unwrap_or(-1),
                });
            }
            thread::sleep(REAP_INTERVAL);
        }
    }

    fn terminator(&self) -> Terminator {
        kill_and_reap(self.child.clone())
    }
}

fn kill_and_reap(child: Arc<Mutex<Child>>) -> Terminator {
    Box::new(move || {
        let mut child = lock(&child);
        let _ = child.kill();
        let _ = child.wait();
    })
}

fn lock(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
