//! Mirror sessions: replay host events on one target through `sendevent`.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::cache::TranslationCache;
use crate::cleanup::{CleanupHandle, CleanupRegistry};
use crate::device::{
    host_event_types, select_for_type, CanonicalDeviceMap, DeviceDescriptor, EventTypeCode, SemanticClass,
};
use crate::error::MirrorError;
use crate::event::InputEvent;
use crate::transport::{ChannelError, CommandChannel, Transport};

/// A target receiving mirrored events.
pub trait Mirror: Send {
    fn name(&self) -> &str;

    /// Forward one host event. Does not wait for the target.
    fn send_event(&mut self, event: &InputEvent) -> Result<(), MirrorError>;

    /// Leave the remote shell and wait for it to exit.
    fn detach(self: Box<Self>) -> Result<(), MirrorError>;
}

/// Maps a host device path to the matching device on one target.
pub enum DeviceResolver {
    /// Host device -> semantic class -> target device.
    Markers {
        host: Arc<CanonicalDeviceMap<SemanticClass>>,
        target: CanonicalDeviceMap<SemanticClass>,
    },
    /// Host device -> event type codes it is canonical for, then the other
    /// codes it declares -> first target device reporting one of them.
    /// Target devices are picked on demand.
    EventTypes {
        host: Arc<CanonicalDeviceMap<EventTypeCode>>,
        host_devices: Arc<Vec<DeviceDescriptor>>,
        target: Vec<DeviceDescriptor>,
    },
}

impl DeviceResolver {
    pub fn resolve(&self, target_name: &str, host_device: &str) -> Result<String, MirrorError> {
        let unresolved = || MirrorError::UnresolvedDevice {
            target: target_name.to_string(),
            device: host_device.to_string(),
        };

        match self {
            DeviceResolver::Markers { host, target } => {
                let class = host.keys_for(host_device).next().ok_or_else(unresolved)?;
                target.get(&class).map(str::to_string).ok_or_else(unresolved)
            }
            DeviceResolver::EventTypes {
                host,
                host_devices,
                target,
            } => {
                let codes = host_event_types(host, host_devices, host_device).ok_or_else(unresolved)?;
                let first = *codes.first().ok_or_else(unresolved)?;
                codes
                    .iter()
                    .find_map(|&code| select_for_type(target, code))
                    .map(|d| d.path.clone())
                    .ok_or_else(|| MirrorError::UnknownEventType {
                        target: target_name.to_string(),
                        code: first,
                    })
            }
        }
    }
}

/// Mirror session over an interactive remote shell.
///
/// Commands are queued to a writer thread that owns the channel, so a slow
/// target never holds up the caller and commands reach the shell in the
/// order they were sent.
pub struct ShellMirror {
    target: String,
    resolver: DeviceResolver,
    cache: TranslationCache<String, String>,
    queue: Option<Sender<String>>,
    writer: Option<JoinHandle<Result<(), ChannelError>>>,
    cleanup: Option<CleanupHandle>,
    elevated: bool,
    forwarded: u64,
}

impl ShellMirror {
    /// Open the target's shell and elevate it with `elevate` when given.
    pub fn attach(
        transport: &dyn Transport,
        target: &str,
        resolver: DeviceResolver,
        elevate: Option<&str>,
        registry: &CleanupRegistry,
    ) -> Result<Self, MirrorError> {
        let channel = transport.shell(target)?;
        let cleanup = registry.register(format!("[{}] shell", target), channel.terminator());

        let (queue, commands) = mpsc::channel();
        let label = target.to_string();
        let writer = thread::Builder::new()
            .name(format!("mirror {}", target))
            .spawn(move || run_writer(&label, channel, commands))
            .map_err(ChannelError::from)?;

        let mut mirror = Self {
            target: target.to_string(),
            resolver,
            cache: TranslationCache::new(),
            queue: Some(queue),
            writer: Some(writer),
            cleanup: Some(cleanup),
            elevated: elevate.is_some(),
            forwarded: 0,
        };
        if let Some(command) = elevate {
            mirror.queue(command.to_string())?;
        }

        log::info!("[{}] attached", target);
        Ok(mirror)
    }

    #[cfg(test)]
    pub fn cache(&self) -> &TranslationCache<String, String> {
        &self.cache
    }

    fn queue(&mut self, command: String) -> Result<(), ChannelError> {
        log::debug!("[{}] $ {}", self.target, command);
        let queue = self.queue.as_ref().ok_or(ChannelError::Closed)?;
        queue.send(command).map_err(|_| ChannelError::Closed)
    }
}

impl Mirror for ShellMirror {
    fn name(&self) -> &str {
        &self.target
    }

    fn send_event(&mut self, event: &InputEvent) -> Result<(), MirrorError> {
        let target = &self.target;
        let resolver = &self.resolver;
        let device = self
            .cache
            .get_or_try_insert_with(event.device.as_str(), |host| {
                let device = resolver.resolve(target, host)?;
                log::info!("[{}] {} -> {}", target, host, device);
                Ok::<_, MirrorError>(device)
            })?
            .clone();

        self.queue(format!(
            "sendevent {} {} {} {}",
            device, event.event_type, event.code, event.value
        ))?;
        self.forwarded += 1;
        Ok(())
    }

    fn detach(mut self: Box<Self>) -> Result<(), MirrorError> {
        // A dead writer is reported by `join` below.
        if self.elevated {
            let _ = self.queue("exit".into());
        }
        let _ = self.queue("exit".into());
        drop(self.queue.take());

        let result = match self.writer.take() {
            Some(writer) => writer.join().unwrap_or(Err(ChannelError::Closed)),
            None => Err(ChannelError::Closed),
        };

        if let Some(cleanup) = self.cleanup.take() {
            match result {
                Ok(()) => {
                    cleanup.release();
                }
                Err(_) => {
                    cleanup.fire();
                }
            }
        }

        log::info!(
            "[{}] detached after {} events ({} devices mapped)",
            self.target,
            self.forwarded,
            self.cache.misses()
        );
        result.map_err(MirrorError::from)
    }
}

fn run_writer(
    target: &str,
    mut channel: Box<dyn CommandChannel>,
    commands: Receiver<String>,
) -> Result<(), ChannelError> {
    for command in commands {
        if let Err(e) = channel.send(&command) {
            log::error!("[{}] command channel failed: {}", target, e);
            return Err(e);
        }
    }
    channel.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{parse_listing, resolve_event_types, resolve_markers};
    use crate::transport::mock::MockTransport;

    const FIXTURE: &str = include_str!("device/testdata/getevent-pl.txt");

    const TARGET_LISTING: &str = "add device 1: /dev/input/event0\n\
        \x20   KEY (0001): KEY_POWER\n\
        add device 2: /dev/input/event4\n\
        \x20   KEY (0001): KEY_ESC               BTN_TOUCH\n\
        \x20   ABS (0003): ABS_MT_SLOT           : value 0, min 0, max 9\n\
        \x20               ABS_MT_TOUCH_MAJOR    : value 0, min 0, max 255\n";

    fn event(device: &str, event_type: EventTypeCode, code: u16, value: i32) -> InputEvent {
        InputEvent {
            device: device.into(),
            event_type,
            code,
            value,
        }
    }

    fn event_types_resolver(target_listing: &str) -> DeviceResolver {
        let host_devices = parse_listing(FIXTURE).unwrap();
        DeviceResolver::EventTypes {
            host: Arc::new(resolve_event_types(&host_devices)),
            host_devices: Arc::new(host_devices),
            target: parse_listing(target_listing).unwrap(),
        }
    }

    #[test]
    fn test_event_types_resolution() {
        let resolver = event_types_resolver(TARGET_LISTING);
        // Host event2 is canonical for ABS, host event1 for KEY/MSC/LED.
        assert_eq!(resolver.resolve("m", "/dev/input/event2").unwrap(), "/dev/input/event4");
        assert_eq!(resolver.resolve("m", "/dev/input/event1").unwrap(), "/dev/input/event4");
        // Not canonical for anything on the host, resolved through its declared KEY type.
        assert_eq!(resolver.resolve("m", "/dev/input/event12").unwrap(), "/dev/input/event4");

        match resolver.resolve("m", "/dev/input/event42") {
            Err(MirrorError::UnresolvedDevice { device, .. }) => {
                assert_eq!(device, "/dev/input/event42")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_type() {
        let resolver = event_types_resolver("add device 1: /dev/input/event3\n    KEY (0001): KEY_A\n");
        // Host event9 declares ABS and MSC only.
        match resolver.resolve("m", "/dev/input/event9") {
            Err(MirrorError::UnknownEventType { code, .. }) => assert_eq!(code, 3),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_markers_resolution() {
        let host = resolve_markers("host", FIXTURE, &parse_listing(FIXTURE).unwrap()).unwrap();
        let target_devices = parse_listing(TARGET_LISTING).unwrap();
        let target = resolve_markers("m", TARGET_LISTING, &target_devices).unwrap();
        let resolver = DeviceResolver::Markers {
            host: Arc::new(host),
            target,
        };
        assert_eq!(resolver.resolve("m", "/dev/input/event2").unwrap(), "/dev/input/event4");
        assert!(resolver.resolve("m", "/dev/input/event8").is_err());
    }

    #[test]
    fn test_first_event_populates_cache() {
        let transport = MockTransport::new();
        let registry = CleanupRegistry::new();
        let mut mirror = ShellMirror::attach(
            &transport,
            "emulator-5554",
            event_types_resolver(TARGET_LISTING),
            Some("su"),
            &registry,
        )
        .unwrap();

        mirror.send_event(&event("/dev/input/event2", 3, 0x39, 7)).unwrap();
        assert_eq!(mirror.cache().misses(), 1);
        mirror.send_event(&event("/dev/input/event2", 3, 0x35, 100)).unwrap();
        mirror.send_event(&event("/dev/input/event2", 0, 0, 0)).unwrap();
        assert_eq!(mirror.cache().misses(), 1);
        assert_eq!(mirror.cache().get("/dev/input/event2").map(String::as_str), Some("/dev/input/event4"));

        Box::new(mirror).detach().unwrap();
        let log = transport.shell_log("emulator-5554");
        assert_eq!(
            log.commands,
            [
                "su",
                "sendevent /dev/input/event4 3 57 7",
                "sendevent /dev/input/event4 3 53 100",
                "sendevent /dev/input/event4 0 0 0",
                "exit",
                "exit",
            ]
        );
        assert!(log.closed);
        assert!(!log.terminated);
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn test_negative_value_forwarded_signed() {
        let transport = MockTransport::new();
        let registry = CleanupRegistry::new();
        let mut mirror =
            ShellMirror::attach(&transport, "m", event_types_resolver(TARGET_LISTING), None, &registry)
                .unwrap();
        mirror.send_event(&event("/dev/input/event2", 3, 0x39, -1)).unwrap();
        Box::new(mirror).detach().unwrap();
        assert_eq!(
            transport.shell_log("m").commands,
            ["sendevent /dev/input/event4 3 57 -1", "exit"]
        );
    }

    #[test]
    fn test_unresolved_device_sends_nothing() {
        let transport = MockTransport::new();
        let registry = CleanupRegistry::new();
        let mut mirror =
            ShellMirror::attach(&transport, "m", event_types_resolver(TARGET_LISTING), None, &registry)
                .unwrap();
        assert!(mirror.send_event(&event("/dev/input/event42", 3, 0, 1)).is_err());
        assert!(mirror.cache().is_empty());
        Box::new(mirror).detach().unwrap();
        assert_eq!(transport.shell_log("m").commands, ["exit"]);
    }

    #[test]
    fn test_broken_channel_reported() {
        let transport = MockTransport::new().failing_after("m", 1);
        let registry = CleanupRegistry::new();
        let mut mirror =
            ShellMirror::attach(&transport, "m", event_types_resolver(TARGET_LISTING), None, &registry)
                .unwrap();
        mirror.send_event(&event("/dev/input/event2", 3, 0x39, 1)).unwrap();
        // The second command breaks the channel; detach reports it and
        // terminates the remote side.
        let _ = mirror.send_event(&event("/dev/input/event2", 3, 0x39, 2));
        assert!(matches!(
            Box::new(mirror).detach(),
            Err(MirrorError::Channel(_))
        ));
        let log = transport.shell_log("m");
        assert_eq!(log.commands, ["sendevent /dev/input/event4 3 57 1"]);
        assert!(log.terminated);
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn test_drop_without_detach_terminates() {
        let transport = MockTransport::new();
        let registry = CleanupRegistry::new();
        let mirror =
            ShellMirror::attach(&transport, "m", event_types_resolver(TARGET_LISTING), None, &registry)
                .unwrap();
        assert_eq!(registry.pending(), 1);
        drop(mirror);
        assert!(transport.shell_log("m").terminated);
        assert_eq!(registry.pending(), 0);
    }
}
