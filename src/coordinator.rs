//! Drive the mirroring pipeline: discover devices, attach one session per
//! mirror, broadcast the host stream and tear everything down in order.

use std::sync::Arc;

use crate::cleanup::CleanupRegistry;
use crate::device::{
    host_event_types, parse_listing, resolve_event_types, resolve_markers, CanonicalDeviceMap,
    DeviceDescriptor, EventTypeCode, ResolvePolicy, SemanticClass,
};
use crate::error::MirrorError;
use crate::event::{EventStream, InputEvent};
use crate::mirror::{DeviceResolver, Mirror, ShellMirror};
use crate::transport::Transport;

pub const LISTING_COMMAND: &str = "getevent -pl";

pub fn stream_command(device: Option<&str>) -> String {
    match device {
        Some(device) => format!("getevent {}", device),
        None => "getevent".into(),
    }
}

/// Per-target outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSummary {
    pub name: String,
    pub forwarded: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub events: u64,
    pub targets: Vec<TargetSummary>,
}

/// Host-side canonical map (and listing), shared by every session's resolver.
enum HostDevices {
    Markers(Arc<CanonicalDeviceMap<SemanticClass>>),
    EventTypes(Arc<CanonicalDeviceMap<EventTypeCode>>, Arc<Vec<DeviceDescriptor>>),
}

pub struct Coordinator<'a> {
    transport: Arc<dyn Transport>,
    registry: &'a CleanupRegistry,
    policy: ResolvePolicy,
    elevate: Option<String>,
    host_device: Option<String>,
}

impl<'a> Coordinator<'a> {
    pub fn new(transport: Arc<dyn Transport>, registry: &'a CleanupRegistry, policy: ResolvePolicy) -> Self {
        Self {
            transport,
            registry,
            policy,
            elevate: None,
            host_device: None,
        }
    }

    /// Command used to elevate every mirror shell (`su`).
    pub fn elevate(mut self, command: Option<String>) -> Self {
        self.elevate = command;
        self
    }

    /// Capture only this host device; its lines carry no device prefix.
    pub fn host_device(mut self, device: Option<String>) -> Self {
        self.host_device = device;
        self
    }

    /// Fetch and parse the input device listing of `target`.
    pub fn discover(&self, target: &str) -> Result<(String, Vec<DeviceDescriptor>), MirrorError> {
        let listing = self.transport.exec(target, LISTING_COMMAND)?;
        let devices = parse_listing(&listing)?;
        log::debug!("[{}] {} input devices", target, devices.len());
        Ok((listing, devices))
    }

    fn host_devices(&self, host: &str) -> Result<HostDevices, MirrorError> {
        let (listing, devices) = self.discover(host)?;
        let host_devices = match self.policy {
            ResolvePolicy::Markers => {
                let map = resolve_markers(host, &listing, &devices)?;
                log::info!("[{}] devices: {}", host, map);
                HostDevices::Markers(Arc::new(map))
            }
            ResolvePolicy::EventTypes => {
                let map = resolve_event_types(&devices);
                if map.is_empty() {
                    log::warn!("[{}] no input device reports any event type", host);
                }
                log::info!("[{}] devices: {}", host, map);
                HostDevices::EventTypes(Arc::new(map), Arc::new(devices))
            }
        };

        if let Some(device) = self.host_device.as_deref() {
            let known = match &host_devices {
                HostDevices::Markers(map) => map.keys_for(device).next().is_some(),
                HostDevices::EventTypes(map, devices) => host_event_types(map, devices, device).is_some(),
            };
            if !known {
                log::warn!("[{}] {} cannot be resolved; its events cannot be mirrored", host, device);
            }
        }
        Ok(host_devices)
    }

    fn resolver_for(&self, host: &HostDevices, target: &str) -> Result<DeviceResolver, MirrorError> {
        let (listing, devices) = self.discover(target)?;
        Ok(match host {
            HostDevices::Markers(host) => {
                let map = resolve_markers(target, &listing, &devices)?;
                log::info!("[{}] devices: {}", target, map);
                DeviceResolver::Markers {
                    host: host.clone(),
                    target: map,
                }
            }
            HostDevices::EventTypes(host, host_devices) => DeviceResolver::EventTypes {
                host: host.clone(),
                host_devices: host_devices.clone(),
                target: devices,
            },
        })
    }

    /// Resolve devices and attach a session for every mirror, in order. Any
    /// failure aborts before a single event is forwarded.
    pub fn attach(&self, host: &str, mirrors: &[String]) -> Result<Vec<Box<dyn Mirror>>, MirrorError> {
        let host_devices = self.host_devices(host)?;
        let mut sessions: Vec<Box<dyn Mirror>> = Vec::with_capacity(mirrors.len());
        for target in mirrors {
            let resolver = self.resolver_for(&host_devices, target)?;
            let mirror = ShellMirror::attach(
                self.transport.as_ref(),
                target,
                resolver,
                self.elevate.as_deref(),
                self.registry,
            )?;
            sessions.push(Box::new(mirror));
        }
        Ok(sessions)
    }

    /// Mirror `host` onto `mirrors` until the host stream ends.
    pub fn run(&self, host: &str, mirrors: &[String]) -> Result<RunSummary, MirrorError> {
        let sessions = self.attach(host, mirrors)?;

        let stream = self
            .transport
            .stream(host, &stream_command(self.host_device.as_deref()))?;
        let host_stream = self
            .registry
            .register(format!("[{}] getevent", host), stream.terminator);
        let mut events = EventStream::new(stream.reader, host);
        if let Some(device) = self.host_device.as_deref() {
            events = events.with_implicit_source(device);
        }

        log::info!("Ready, mirroring {} onto {}", host, mirrors.join(", "));
        let summary = broadcast(&mut events, sessions);
        log::debug!("[{}] {} lines read", host, events.lines_read());
        host_stream.fire();
        Ok(summary)
    }
}

/// Forward every event to every live session in order, then detach all
/// sessions in the same order. A failing session is abandoned without
/// affecting the others.
pub fn broadcast(events: impl IntoIterator<Item = InputEvent>, mirrors: Vec<Box<dyn Mirror>>) -> RunSummary {
    struct Session {
        mirror: Box<dyn Mirror>,
        forwarded: u64,
        error: Option<String>,
    }

    let mut sessions: Vec<Session> = mirrors
        .into_iter()
        .map(|mirror| Session {
            mirror,
            forwarded: 0,
            error: None,
        })
        .collect();
    let mut count: u64 = 0;

    for event in events {
        count += 1;
        log::debug!("EVENT {}", event);

        let mut live = 0;
        for session in sessions.iter_mut().filter(|s| s.error.is_none()) {
            match session.mirror.send_event(&event) {
                Ok(()) => {
                    session.forwarded += 1;
                    live += 1;
                }
                Err(e) => {
                    log::error!("[{}] abandoning session: {}", session.mirror.name(), e);
                    session.error = Some(e.to_string());
                }
            }
        }

        log_progress(count);
        if live == 0 {
            log::warn!("No mirror sessions left, stopping");
            break;
        }
    }

    log::info!("Host stream ended after {} events", count);

    let targets = sessions
        .into_iter()
        .map(|session| {
            let name = session.mirror.name().to_string();
            let mut error = session.error;
            if let Err(e) = session.mirror.detach() {
                log::warn!("[{}] detach failed: {}", name, e);
                error.get_or_insert_with(|| e.to_string());
            }
            TargetSummary {
                name,
                forwarded: session.forwarded,
                error,
            }
        })
        .collect();

    RunSummary {
        events: count,
        targets,
    }
}

fn log_progress(count: u64) {
    if count == 1 {
        log::info!("Events flowing");
    }
    if count % 1000 == 0 {
        log::debug!("Events forwarded: {}", count);
    }
}
