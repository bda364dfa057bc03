//! Two-slot rooms and the registry that routes between them
//!
//! The relay never inspects game payloads; it seats peers, tells them
//! about each other, and forwards frames to the counterpart seat.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::util::time::unix_millis;
use crate::ws::protocol::{Role, ServerMsg};

/// Relay-side join failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room already has two peers")]
    Full,
}

impl RoomError {
    /// Wire error code sent to the refused peer
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::Full => "room_full",
        }
    }
}

/// One seated peer: identity plus the outbox its writer drains
#[derive(Clone)]
struct Seat {
    peer_id: Uuid,
    tx: mpsc::Sender<ServerMsg>,
}

#[derive(Default)]
struct Slots {
    host: Option<Seat>,
    guest: Option<Seat>,
}

impl Slots {
    fn occupancy(&self) -> usize {
        usize::from(self.host.is_some()) + usize::from(self.guest.is_some())
    }

    fn vacate(&mut self, peer_id: Uuid) -> Option<Role> {
        if self
            .host
            .as_ref()
            .map_or(false, |s| s.peer_id == peer_id)
        {
            self.host = None;
            return Some(Role::Host);
        }
        if self
            .guest
            .as_ref()
            .map_or(false, |s| s.peer_id == peer_id)
        {
            self.guest = None;
            return Some(Role::Guest);
        }
        None
    }

    fn counterpart(&self, peer_id: Uuid) -> Option<Seat> {
        if self
            .host
            .as_ref()
            .map_or(false, |s| s.peer_id == peer_id)
        {
            return self.guest.clone();
        }
        if self
            .guest
            .as_ref()
            .map_or(false, |s| s.peer_id == peer_id)
        {
            return self.host.clone();
        }
        None
    }
}

/// A two-peer room
pub struct Room {
    id: String,
    created_at: u64,
    slots: Mutex<Slots>,
}

impl Room {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            created_at: unix_millis(),
            slots: Mutex::new(Slots::default()),
        }
    }
}

/// Registry of all open rooms, created implicitly on first join
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
    peer_count: AtomicUsize,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            peer_count: AtomicUsize::new(0),
        }
    }

    pub fn open_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn connected_peers(&self) -> usize {
        self.peer_count.load(Ordering::Relaxed)
    }

    /// Seat a peer and tell it its role. A joiner takes the vacant host
    /// seat first, the guest seat otherwise; whenever a join fills the
    /// room both seats hear `opponent:joined`. Later joiners are refused.
    pub async fn join(
        &self,
        room_id: &str,
        peer_id: Uuid,
        tx: mpsc::Sender<ServerMsg>,
    ) -> Result<Role, RoomError> {
        let room = {
            let entry = self
                .rooms
                .entry(room_id.to_owned())
                .or_insert_with(|| Arc::new(Room::new(room_id)));
            Arc::clone(entry.value())
        };

        let (role, counterpart) = {
            let mut slots = room.slots.lock();
            if slots.host.is_none() {
                let counterpart = slots.guest.as_ref().map(|s| s.tx.clone());
                slots.host = Some(Seat {
                    peer_id,
                    tx: tx.clone(),
                });
                (Role::Host, counterpart)
            } else if slots.guest.is_none() {
                let counterpart = slots.host.as_ref().map(|s| s.tx.clone());
                slots.guest = Some(Seat {
                    peer_id,
                    tx: tx.clone(),
                });
                (Role::Guest, counterpart)
            } else {
                return Err(RoomError::Full);
            }
        };

        self.peer_count.fetch_add(1, Ordering::Relaxed);
        info!(room_id = %room.id, peer_id = %peer_id, role = ?role, "Peer seated");

        // The joiner learns its role before either side hears about pairing
        let _ = tx.send(ServerMsg::Role { role }).await;
        if let Some(peer_tx) = counterpart {
            let _ = peer_tx.send(ServerMsg::OpponentJoined).await;
            let _ = tx.send(ServerMsg::OpponentJoined).await;
        }

        Ok(role)
    }

    /// Free a seat. The remaining peer hears `opponent:left`; a room with
    /// no occupants is dropped from the registry.
    pub async fn leave(&self, room_id: &str, peer_id: Uuid) {
        let Some(room) = self.rooms.get(room_id).map(|r| Arc::clone(r.value())) else {
            return;
        };

        let (vacated, counterpart) = {
            let mut slots = room.slots.lock();
            let vacated = slots.vacate(peer_id);
            let counterpart = if vacated.is_some() {
                // Whichever seat is still occupied is the counterpart
                slots
                    .host
                    .as_ref()
                    .or(slots.guest.as_ref())
                    .map(|s| s.tx.clone())
            } else {
                None
            };
            (vacated, counterpart)
        };

        let Some(role) = vacated else { return };
        self.peer_count.fetch_sub(1, Ordering::Relaxed);
        info!(room_id = %room.id, peer_id = %peer_id, role = ?role, "Peer left");

        if let Some(tx) = counterpart {
            let _ = tx.send(ServerMsg::OpponentLeft).await;
        }

        let removed = self
            .rooms
            .remove_if(room_id, |_, r| r.slots.lock().occupancy() == 0);
        if removed.is_some() {
            debug!(
                room_id = %room.id,
                lifetime_ms = unix_millis().saturating_sub(room.created_at),
                "Room closed"
            );
        }
    }

    /// Forward a relayed frame to the counterpart seat, if any. A
    /// counterpart that cannot take the frame, because its outbox is full
    /// or its writer is gone, is treated as disconnected: the seat is
    /// freed and the sender hears `opponent:left`.
    pub fn forward(&self, room_id: &str, from: Uuid, msg: ServerMsg) {
        let Some(room) = self.rooms.get(room_id).map(|r| Arc::clone(r.value())) else {
            return;
        };

        let seat = {
            let slots = room.slots.lock();
            slots.counterpart(from)
        };
        let Some(seat) = seat else { return };

        let Err(err) = seat.tx.try_send(msg) else {
            return;
        };
        let reason = match err {
            mpsc::error::TrySendError::Full(_) => "outbox full",
            mpsc::error::TrySendError::Closed(_) => "outbox closed",
        };

        let sender_tx = {
            let mut slots = room.slots.lock();
            if slots.vacate(seat.peer_id).is_none() {
                // Some other path already freed the seat
                return;
            }
            slots
                .host
                .as_ref()
                .or(slots.guest.as_ref())
                .map(|s| s.tx.clone())
        };
        self.peer_count.fetch_sub(1, Ordering::Relaxed);
        info!(
            room_id = %room.id,
            peer_id = %seat.peer_id,
            reason = %reason,
            "Unreachable peer unseated"
        );

        if let Some(tx) = sender_tx {
            let _ = tx.try_send(ServerMsg::OpponentLeft);
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> (Uuid, mpsc::Sender<ServerMsg>, mpsc::Receiver<ServerMsg>) {
        let (tx, rx) = mpsc::channel(8);
        (Uuid::new_v4(), tx, rx)
    }

    async fn drain(rx: &mut mpsc::Receiver<ServerMsg>, n: usize) {
        for _ in 0..n {
            rx.recv().await.expect("expected a queued frame");
        }
    }

    #[tokio::test]
    async fn first_join_hosts_second_guests_and_both_hear_it() {
        let registry = RoomRegistry::new();
        let (p1, tx1, mut rx1) = peer();
        let (p2, tx2, mut rx2) = peer();

        assert_eq!(registry.join("r1", p1, tx1).await, Ok(Role::Host));
        assert_eq!(rx1.recv().await, Some(ServerMsg::Role { role: Role::Host }));
        assert!(rx1.try_recv().is_err());

        assert_eq!(registry.join("r1", p2, tx2).await, Ok(Role::Guest));
        // The guest learns its seat before either side hears about pairing
        assert_eq!(rx2.recv().await, Some(ServerMsg::Role { role: Role::Guest }));
        assert_eq!(rx1.recv().await, Some(ServerMsg::OpponentJoined));
        assert_eq!(rx2.recv().await, Some(ServerMsg::OpponentJoined));

        assert_eq!(registry.open_rooms(), 1);
        assert_eq!(registry.connected_peers(), 2);
    }

    #[tokio::test]
    async fn third_join_is_refused_with_room_full() {
        let registry = RoomRegistry::new();
        let (p1, tx1, _rx1) = peer();
        let (p2, tx2, _rx2) = peer();
        let (p3, tx3, _rx3) = peer();

        registry.join("r1", p1, tx1).await.unwrap();
        registry.join("r1", p2, tx2).await.unwrap();

        let err = registry.join("r1", p3, tx3).await.unwrap_err();
        assert_eq!(err, RoomError::Full);
        assert_eq!(err.code(), "room_full");
        assert_eq!(registry.connected_peers(), 2);
    }

    #[tokio::test]
    async fn frames_reach_only_the_counterpart() {
        let registry = RoomRegistry::new();
        let (p1, tx1, mut rx1) = peer();
        let (p2, tx2, mut rx2) = peer();

        registry.join("r1", p1, tx1).await.unwrap();
        registry.join("r1", p2, tx2).await.unwrap();
        drain(&mut rx1, 2).await;
        drain(&mut rx2, 2).await;

        let frame = ServerMsg::Paddle {
            paddle_pct: Some(0.4),
            paddle_x: None,
        };
        registry.forward("r1", p2, frame.clone());

        assert_eq!(rx1.recv().await, Some(frame));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn leaving_notifies_the_counterpart_and_closes_empty_rooms() {
        let registry = RoomRegistry::new();
        let (p1, tx1, mut rx1) = peer();
        let (p2, tx2, mut rx2) = peer();

        registry.join("r1", p1, tx1).await.unwrap();
        registry.join("r1", p2, tx2).await.unwrap();
        drain(&mut rx1, 2).await;
        drain(&mut rx2, 2).await;

        registry.leave("r1", p2).await;
        assert_eq!(rx1.recv().await, Some(ServerMsg::OpponentLeft));
        assert_eq!(registry.open_rooms(), 1);
        assert_eq!(registry.connected_peers(), 1);

        registry.leave("r1", p1).await;
        assert_eq!(registry.open_rooms(), 0);
        assert_eq!(registry.connected_peers(), 0);
    }

    #[tokio::test]
    async fn a_vacated_guest_seat_can_be_retaken() {
        let registry = RoomRegistry::new();
        let (p1, tx1, mut rx1) = peer();
        let (p2, tx2, _rx2) = peer();

        registry.join("r1", p1, tx1).await.unwrap();
        registry.join("r1", p2, tx2).await.unwrap();
        drain(&mut rx1, 2).await;
        registry.leave("r1", p2).await;
        assert_eq!(rx1.recv().await, Some(ServerMsg::OpponentLeft));

        let (p3, tx3, mut rx3) = peer();
        assert_eq!(registry.join("r1", p3, tx3).await, Ok(Role::Guest));
        assert_eq!(rx3.recv().await, Some(ServerMsg::Role { role: Role::Guest }));
        assert_eq!(rx1.recv().await, Some(ServerMsg::OpponentJoined));
        assert_eq!(rx3.recv().await, Some(ServerMsg::OpponentJoined));
    }

    #[tokio::test]
    async fn a_vacated_host_seat_can_be_retaken() {
        let registry = RoomRegistry::new();
        let (p1, tx1, _rx1) = peer();
        let (p2, tx2, mut rx2) = peer();

        registry.join("r1", p1, tx1).await.unwrap();
        registry.join("r1", p2, tx2).await.unwrap();
        drain(&mut rx2, 2).await;
        registry.leave("r1", p1).await;
        assert_eq!(rx2.recv().await, Some(ServerMsg::OpponentLeft));

        // The replacement hosts, and pairing fires for both seats
        let (p3, tx3, mut rx3) = peer();
        assert_eq!(registry.join("r1", p3, tx3).await, Ok(Role::Host));
        assert_eq!(rx3.recv().await, Some(ServerMsg::Role { role: Role::Host }));
        assert_eq!(rx2.recv().await, Some(ServerMsg::OpponentJoined));
        assert_eq!(rx3.recv().await, Some(ServerMsg::OpponentJoined));
    }

    #[tokio::test]
    async fn a_backed_up_counterpart_is_unseated() {
        let registry = RoomRegistry::new();
        let (p1, tx1, mut rx1) = peer();
        let (p2, tx2, mut rx2) = peer();

        registry.join("r1", p1, tx1).await.unwrap();
        registry.join("r1", p2, tx2).await.unwrap();
        drain(&mut rx1, 2).await;
        drain(&mut rx2, 2).await;

        // Fill the counterpart's outbox to the brim, then push once more
        let frame = ServerMsg::Paddle {
            paddle_pct: Some(0.5),
            paddle_x: None,
        };
        for _ in 0..8 {
            registry.forward("r1", p1, frame.clone());
        }
        assert_eq!(registry.connected_peers(), 2);
        registry.forward("r1", p1, frame.clone());

        assert_eq!(rx1.recv().await, Some(ServerMsg::OpponentLeft));
        assert_eq!(registry.connected_peers(), 1);

        // The unseated peer's frames no longer reach anyone
        registry.forward("r1", p2, frame.clone());
        assert!(rx1.try_recv().is_err());

        // Its eventual teardown is a no-op for the survivor
        registry.leave("r1", p2).await;
        assert!(rx1.try_recv().is_err());
        assert_eq!(registry.connected_peers(), 1);
    }

    #[tokio::test]
    async fn a_closed_outbox_counts_as_a_departure() {
        let registry = RoomRegistry::new();
        let (p1, tx1, mut rx1) = peer();
        let (p2, tx2, rx2) = peer();

        registry.join("r1", p1, tx1).await.unwrap();
        registry.join("r1", p2, tx2).await.unwrap();
        drain(&mut rx1, 2).await;
        drop(rx2);

        registry.forward(
            "r1",
            p1,
            ServerMsg::Paddle {
                paddle_pct: Some(0.2),
                paddle_x: None,
            },
        );

        assert_eq!(rx1.recv().await, Some(ServerMsg::OpponentLeft));
        assert_eq!(registry.connected_peers(), 1);
    }
}
