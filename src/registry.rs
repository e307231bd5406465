use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::sync::{Mutex, mpsc};

use crate::{
    error::RelayFailure,
    relay::Outbound,
};

pub type MemberId = u64;

/// Address of one live session for fan-out purposes. Cloning is cheap; the
/// handle never touches the member's socket directly, only its outbound
/// queue.
#[derive(Debug, Clone)]
pub struct MemberHandle {
    id: MemberId,
    outbox: mpsc::Sender<Outbound>,
}

impl MemberHandle {
    pub fn new(id: MemberId, outbox: mpsc::Sender<Outbound>) -> Self {
        Self { id, outbox }
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    /// Enqueues a frame for this member without blocking. A full queue
    /// drops the frame for this recipient only; a closed queue means the
    /// member's writer is gone.
    pub fn try_relay(&self, frame: Outbound) -> Result<(), RelayFailure> {
        self.outbox.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => RelayFailure::Backlogged,
            mpsc::error::TrySendError::Closed(_) => RelayFailure::Disconnected,
        })
    }
}

/// Single source of truth for room membership. Every read and mutation
/// goes through one lock; callers take membership snapshots and perform
/// I/O only after the lock is released.
pub struct RoomRegistry {
    inner: Mutex<Rooms>,
    next_id: AtomicU64,
}

#[derive(Default)]
struct Rooms {
    rooms: HashMap<String, HashMap<MemberId, MemberHandle>>,
    membership: HashMap<MemberId, String>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Rooms::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates a connection-unique member id.
    pub fn next_member_id(&self) -> MemberId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Moves `member` into `room`, leaving its previous room first. The
    /// room entry is created on first join; an emptied previous room is
    /// deleted. Both steps happen under one lock acquisition so no
    /// fan-out ever observes the member in two rooms.
    pub async fn join(&self, room: &str, member: MemberHandle) {
        let mut inner = self.inner.lock().await;
        inner.remove(member.id());
        inner.membership.insert(member.id(), room.to_string());
        inner
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(member.id(), member);
    }

    /// Removes the member from its current room, deleting the room entry
    /// once its member set becomes empty. Idempotent: leaving twice, or
    /// with no room, is a no-op.
    pub async fn leave(&self, id: MemberId) {
        let mut inner = self.inner.lock().await;
        inner.remove(id);
    }

    /// Snapshot of the current fan-out targets for `room`.
    pub async fn members_of(&self, room: &str, excluding: Option<MemberId>) -> Vec<MemberHandle> {
        let inner = self.inner.lock().await;
        let Some(members) = inner.rooms.get(room) else {
            return Vec::new();
        };
        members
            .values()
            .filter(|member| excluding != Some(member.id()))
            .cloned()
            .collect()
    }

    pub async fn contains_room(&self, room: &str) -> bool {
        self.inner.lock().await.rooms.contains_key(room)
    }

    pub async fn current_room(&self, id: MemberId) -> Option<String> {
        self.inner.lock().await.membership.get(&id).cloned()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Rooms {
    fn remove(&mut self, id: MemberId) {
        let Some(room) = self.membership.remove(&id) else {
            return;
        };
        if let Some(members) = self.rooms.get_mut(&room) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: MemberId) -> (MemberHandle, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        (MemberHandle::new(id, tx), rx)
    }

    #[tokio::test]
    async fn join_creates_room_and_leave_deletes_empty_room() {
        let registry = RoomRegistry::new();
        let (alice, _alice_rx) = handle(1);

        registry.join("lobby", alice).await;
        assert!(registry.contains_room("lobby").await);
        assert_eq!(registry.current_room(1).await.as_deref(), Some("lobby"));

        registry.leave(1).await;
        assert!(!registry.contains_room("lobby").await);
        assert_eq!(registry.current_room(1).await, None);

        // Leaving again is a no-op.
        registry.leave(1).await;
    }

    #[tokio::test]
    async fn switching_rooms_removes_old_membership() {
        let registry = RoomRegistry::new();
        let (alice, _alice_rx) = handle(1);
        let (bob, _bob_rx) = handle(2);

        registry.join("alpha", alice.clone()).await;
        registry.join("alpha", bob).await;
        registry.join("beta", alice).await;

        let alpha: Vec<_> = registry
            .members_of("alpha", None)
            .await
            .iter()
            .map(MemberHandle::id)
            .collect();
        assert_eq!(alpha, vec![2]);

        let beta: Vec<_> = registry
            .members_of("beta", None)
            .await
            .iter()
            .map(MemberHandle::id)
            .collect();
        assert_eq!(beta, vec![1]);
    }

    #[tokio::test]
    async fn last_member_switching_away_garbage_collects_the_room() {
        let registry = RoomRegistry::new();
        let (alice, _alice_rx) = handle(1);

        registry.join("alpha", alice.clone()).await;
        registry.join("beta", alice).await;

        assert!(!registry.contains_room("alpha").await);
        assert!(registry.contains_room("beta").await);
    }

    #[tokio::test]
    async fn members_of_excludes_the_sender() {
        let registry = RoomRegistry::new();
        let (alice, _alice_rx) = handle(1);
        let (bob, _bob_rx) = handle(2);
        let (carol, _carol_rx) = handle(3);

        registry.join("lobby", alice).await;
        registry.join("lobby", bob).await;
        registry.join("other", carol).await;

        let mut targets: Vec<_> = registry
            .members_of("lobby", Some(1))
            .await
            .iter()
            .map(MemberHandle::id)
            .collect();
        targets.sort_unstable();
        assert_eq!(targets, vec![2]);

        assert!(registry.members_of("missing", None).await.is_empty());
    }
}
