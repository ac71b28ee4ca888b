//! Debugging subcommands.
//! Run: input-mirror dump SERIAL    to show how a target's devices resolve
//!      input-mirror events SERIAL  to print its decoded event stream

use std::sync::Arc;

use crate::cleanup::CleanupRegistry;
use crate::coordinator::{stream_command, LISTING_COMMAND};
use crate::device::{parse_listing, resolve_event_types, resolve_markers};
use crate::event::{EventStream, EV_ABS, EV_KEY, EV_SYN};
use crate::transport::Transport;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn code_name(ty: u16, code: u16) -> String {
    match ty {
        EV_SYN => match code {
            0x00 => "SYN_REPORT".into(),
            0x02 => "SYN_MT_REPORT".into(),
            _ => format!("SYN/{}", code),
        },
        EV_KEY => match code {
            0x01 => "KEY_ESC".into(),
            0x66 => "KEY_HOME".into(),
            0x72 => "KEY_VOLUMEDOWN".into(),
            0x73 => "KEY_VOLUMEUP".into(),
            0x74 => "KEY_POWER".into(),
            0x8b => "KEY_MENU".into(),
            0x9e => "KEY_BACK".into(),
            0x14a => "BTN_TOUCH".into(),
            _ => format!("KEY/{}", code),
        },
        EV_ABS => {
            let abs = match code {
                0x00 => "X",
                0x01 => "Y",
                0x18 => "PRESSURE",
                0x2f => "MT_SLOT",
                0x30 => "MT_TOUCH_MAJOR",
                0x31 => "MT_TOUCH_MINOR",
                0x34 => "MT_ORIENTATION",
                0x35 => "MT_POSITION_X",
                0x36 => "MT_POSITION_Y",
                0x37 => "MT_TOOL_TYPE",
                0x39 => "MT_TRACKING_ID",
                0x3a => "MT_PRESSURE",
                _ => "?",
            };
            format!("ABS_{}({})", abs, code)
        }
        _ => format!("type{} code{}", ty, code),
    }
}

/// Print the devices found on `target` and the maps both policies build.
pub fn run_dump(transport: &dyn Transport, target: &str) -> Result<(), BoxError> {
    let listing = transport.exec(target, LISTING_COMMAND)?;
    let devices = parse_listing(&listing)?;

    println!("{} input devices on {}:", devices.len(), target);
    for device in &devices {
        let types: Vec<String> = device
            .event_types
            .iter()
            .map(|(code, name)| format!("{}({:04x})", name, code))
            .collect();
        println!("  {}  {}", device.path, types.join(" "));
    }

    println!();
    println!("event-types: {}", resolve_event_types(&devices));
    match resolve_markers(target, &listing, &devices) {
        Ok(map) => println!("markers:     {}", map),
        Err(e) => println!("markers:     {}", e),
    }
    Ok(())
}

/// Stream `target`'s events until the stream ends or the process is
/// interrupted.
pub fn run_events(
    transport: Arc<dyn Transport>,
    target: &str,
    device: Option<&str>,
    registry: &CleanupRegistry,
) -> Result<(), BoxError> {
    let stream = transport.stream(target, &stream_command(device))?;
    let _guard = registry.register(format!("[{}] getevent", target), stream.terminator);

    let mut events = EventStream::new(stream.reader, target);
    if let Some(device) = device {
        events = events.with_implicit_source(device);
    }

    eprintln!("Dumping events from {} (Ctrl+C to stop):\n", target);
    let mut n = 0u64;
    for ev in events {
        n += 1;
        println!(
            "{:6}  {}  {}  value={}",
            n,
            ev.device,
            code_name(ev.event_type, ev.code),
            ev.value
        );
    }
    eprintln!("Stream ended after {} events", n);
    Ok(())
}
