//! Targets reached over SSH. A target is `host` or `user@host`.

use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use ssh2::{Channel, Session};

use super::{ChannelError, CommandChannel, RemoteStream, Terminator, Transport};
use crate::config::Auth;

/// Timeout for SSH operations
const SSH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SshTransport {
    user: String,
    port: u16,
    auth: Auth,
}

impl SshTransport {
    pub fn new(user: &str, port: u16, auth: Auth) -> Self {
        Self {
            user: user.to_string(),
            port,
            auth,
        }
    }

    /// Returns the session and a handle on its socket, used to tear the
    /// connection down from another thread without the session lock.
    fn connect(&self, target: &str) -> Result<(Session, TcpStream), ChannelError> {
        let (user, host) = match target.split_once('@') {
            Some((user, host)) => (user, host),
            None => (self.user.as_str(), target),
        };
        log::info!("Connecting to {}@{}:{}", user, host, self.port);

        let addr = (host, self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ChannelError::Resolve(host.to_string()))?;
        let tcp = TcpStream::connect_timeout(&addr, SSH_TIMEOUT)?;
        let socket = tcp.try_clone()?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;
        authenticate(&mut session, user, &self.auth)?;

        Ok((session, socket))
    }
}

fn authenticate(session: &mut Session, user: &str, auth: &Auth) -> Result<(), ChannelError> {
    match auth {
        Auth::Key(path) => {
            session.userauth_pubkey_file(user, None, path, None)?;
        }
        Auth::Password(pass) => {
            session.userauth_password(user, pass)?;
        }
    }

    if !session.authenticated() {
        return Err(ChannelError::Auth);
    }

    Ok(())
}

fn shutdown(socket: TcpStream) -> Terminator {
    Box::new(move || {
        let _ = socket.shutdown(Shutdown::Both);
    })
}

impl Transport for SshTransport {
    fn exec(&self, target: &str, command: &str) -> Result<String, ChannelError> {
        let (session, _socket) = self.connect(target)?;
        let mut channel = session.channel_session()?;
        log::debug!("Executing: {}", command);
        channel.exec(command)?;

        let mut output = String::new();
        channel.read_to_string(&mut output)?;
        channel.close()?;
        channel.wait_close()?;

        let status = channel.exit_status()?;
        if status != 0 {
            return Err(ChannelError::Exit {
                command: command.to_string(),
                status,
            });
        }
        Ok(output)
    }

    fn stream(&self, target: &str, command: &str) -> Result<RemoteStream, ChannelError> {
        let (session, socket) = self.connect(target)?;
        let mut channel = session.channel_session()?;
        log::debug!("Executing: {}", command);
        channel.exec(command)?;

        log::info!("Stream ready for {}", target);
        Ok(RemoteStream {
            reader: Box::new(BufReader::new(SessionStream { _session: session, channel })),
            terminator: shutdown(socket),
        })
    }

    fn shell(&self, target: &str) -> Result<Box<dyn CommandChannel>, ChannelError> {
        let (session, socket) = self.connect(target)?;
        let mut channel = session.channel_session()?;
        channel.shell()?;

        Ok(Box::new(SshShell {
            _session: session,
            channel,
            socket,
        }))
    }
}

/// Keeps the session alive for as long as its channel is read.
struct SessionStream {
    _session: Session,
    channel: Channel,
}

impl Read for SessionStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.channel.read(buf)
    }
}

struct SshShell {
    _session: Session,
    channel: Channel,
    socket: TcpStream,
}

impl CommandChannel for SshShell {
    fn send(&mut self, command: &str) -> Result<(), ChannelError> {
        self.channel.write_all(command.as_bytes())?;
        self.channel.write_all(b"\n")?;
        self.channel.flush()?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), ChannelError> {
        self.channel.send_eof()?;
        self.channel.wait_eof()?;
        self.channel.close()?;
        self.channel.wait_close()?;

        let status = self.channel.exit_status()?;
        if status != 0 {
            return Err(ChannelError::Exit {
                command: "shell".into(),
                status,
            });
        }
        Ok(())
    }

    fn terminator(&self) -> Terminator {
        match self.socket.try_clone() {
            Ok(socket) => shutdown(socket),
            Err(e) => {
                log::warn!("Cannot clone SSH socket for cleanup: {}", e);
                Box::new(|| {})
            }
        }
    }
}
