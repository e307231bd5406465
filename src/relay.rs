use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    error::RelayFailure,
    registry::{MemberHandle, MemberId, RoomRegistry},
};

/// One frame queued for a member's writer task. Each variant is written as
/// an uninterrupted sequence, so file frames never interleave with chat
/// text on the same connection.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Newline-terminated control line (acks and error notices).
    Line(String),
    /// Relayed chat text, written verbatim with no delimiter.
    Text(String),
    /// Relayed file: announcement line, payload, terminator.
    File { name: String, payload: Arc<Vec<u8>> },
}

/// Fans chat text out to every other member of `room`. Recipients are
/// enumerated under the registry lock; the enqueue itself is non-blocking,
/// so a slow recipient drops its own copy without delaying the rest.
pub async fn relay_text(registry: &RoomRegistry, room: &str, sender: MemberId, text: String) {
    let targets = registry.members_of(room, Some(sender)).await;
    deliver(registry, room, targets, Outbound::Text(text)).await;
}

/// Fans a completed upload out to every other member of `room`.
pub async fn relay_file(
    registry: &RoomRegistry,
    room: &str,
    sender: MemberId,
    name: String,
    payload: Vec<u8>,
) {
    let targets = registry.members_of(room, Some(sender)).await;
    let frame = Outbound::File {
        name,
        payload: Arc::new(payload),
    };
    deliver(registry, room, targets, frame).await;
}

async fn deliver(
    registry: &RoomRegistry,
    room: &str,
    targets: Vec<MemberHandle>,
    frame: Outbound,
) {
    for target in targets {
        match target.try_relay(frame.clone()) {
            Ok(()) => {}
            Err(RelayFailure::Backlogged) => {
                warn!(room, member = target.id(), "dropping frame for backlogged member");
            }
            Err(RelayFailure::Disconnected) => {
                // The member's own teardown also calls leave; doing it here
                // just stops further fan-out attempts sooner.
                debug!(room, member = target.id(), "removing dead member during fan-out");
                registry.leave(target.id()).await;
            }
        }
    }
}
