//! Turn on the "show touches" overlay on mirror targets while mirroring and
//! put the previous value back afterwards.

use std::sync::Arc;

use crate::cleanup::{CleanupHandle, CleanupRegistry};
use crate::transport::{ChannelError, Transport};

const GET: &str = "settings get system show_touches";
const PUT: &str = "settings put system show_touches";

/// Value to restore for whatever `settings get` printed. Unset or unknown
/// values restore to off.
fn restore_value(saved: &str) -> &'static str {
    match saved.trim() {
        "1" => "1",
        _ => "0",
    }
}

/// Enable the overlay on every target. The returned handle restores the
/// saved values when fired or dropped, or from the signal watcher.
pub fn enable(
    transport: Arc<dyn Transport>,
    targets: &[String],
    registry: &CleanupRegistry,
) -> Result<CleanupHandle, ChannelError> {
    let mut saved = Vec::with_capacity(targets.len());
    for target in targets {
        let value = transport.exec(target, GET)?;
        log::debug!("[{}] show_touches was {}", target, value.trim());
        saved.push((target.clone(), restore_value(&value)));
    }

    // Restores whatever was saved so far, even if a later target fails.
    let restore = {
        let saved = saved.clone();
        let transport = transport.clone();
        move || {
            for (target, value) in saved {
                if let Err(e) = transport.exec(&target, &format!("{} {}", PUT, value)) {
                    log::warn!("[{}] cannot restore show_touches: {}", target, e);
                }
            }
        }
    };
    let handle = registry.register("show_touches", Box::new(restore));

    for (target, _) in &saved {
        transport.exec(target, &format!("{} 1", PUT))?;
        log::info!("[{}] show_touches on", target);
    }
    Ok(handle)
}
