//! Room membership and fan-out.
//!
//! Rooms exist implicitly: created on first join, deleted when the last
//! member leaves. Membership holds user ids only; live handles are resolved
//! through the connection registry at broadcast time, so a stale member is
//! just a skipped send.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::protocol::ServerFrame;
use crate::registry::{ConnectionRegistry, SendOutcome};
use crate::store::UserId;

pub type RoomId = String;

#[derive(Clone)]
pub struct RoomDirectory {
    rooms: Arc<RwLock<HashMap<RoomId, HashSet<UserId>>>>,
    registry: ConnectionRegistry,
}

impl RoomDirectory {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            registry,
        }
    }

    /// Add a user to a room, creating the room on first use.
    pub async fn join(&self, room_id: &str, user_id: &str) {
        self.rooms
            .write()
            .await
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    /// Remove a user from a room; an emptied room is deleted.
    pub async fn leave(&self, room_id: &str, user_id: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room_id) {
            members.remove(user_id);
            if members.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    /// Remove a user from every room, deleting emptied ones.
    /// Returns the rooms the user actually vacated, for departure notices.
    pub async fn leave_all(&self, user_id: &str) -> Vec<RoomId> {
        let mut rooms = self.rooms.write().await;
        let mut vacated = Vec::new();

        rooms.retain(|room_id, members| {
            if members.remove(user_id) {
                vacated.push(room_id.clone());
            }
            !members.is_empty()
        });

        vacated
    }

    pub async fn members(&self, room_id: &str) -> Option<Vec<UserId>> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Broadcast a frame to every room member except `excluding`.
    ///
    /// The membership snapshot is taken under the lock; the per-recipient
    /// sends happen after it is released, so one slow or dead recipient
    /// cannot stall the room. Returns how many members were delivered to.
    pub async fn broadcast(
        &self,
        room_id: &str,
        frame: ServerFrame,
        excluding: Option<&str>,
    ) -> usize {
        let snapshot: Vec<UserId> = match self.rooms.read().await.get(room_id) {
            Some(members) => members.iter().cloned().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for member in snapshot {
            if excluding == Some(member.as_str()) {
                continue;
            }
            match self.registry.send(&member, frame.clone()).await {
                SendOutcome::Delivered => delivered += 1,
                SendOutcome::NotConnected => {
                    tracing::debug!(room_id, %member, "skipping member without live connection");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConnectionHandle, Delivery, RegistryConfig};
    use tokio::sync::mpsc;

    fn setup() -> (ConnectionRegistry, RoomDirectory) {
        let registry = ConnectionRegistry::new(RegistryConfig::default());
        let rooms = RoomDirectory::new(registry.clone());
        (registry, rooms)
    }

    async fn connect(
        registry: &ConnectionRegistry,
        user_id: &str,
    ) -> mpsc::UnboundedReceiver<Delivery> {
        let (handle, rx) = ConnectionHandle::channel();
        registry.register(user_id, handle).await;
        rx
    }

    fn frame(text: &str) -> ServerFrame {
        ServerFrame::Message {
            user_id: "sender".to_string(),
            username: "sender".to_string(),
            content: text.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(Delivery::Frame(f)) = rx.try_recv() {
            frames.push(f);
        }
        frames
    }

    #[tokio::test]
    async fn test_join_creates_room_and_leave_deletes_empty_room() {
        let (_registry, rooms) = setup();

        rooms.join("team1", "a").await;
        rooms.join("team1", "b").await;
        assert_eq!(rooms.room_count().await, 1);

        rooms.leave("team1", "a").await;
        assert_eq!(rooms.members("team1").await.unwrap().len(), 1);

        rooms.leave("team1", "b").await;
        assert!(rooms.members("team1").await.is_none());
        assert_eq!(rooms.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_membership_matches_replayed_operations() {
        let (_registry, rooms) = setup();

        // join a, join b, join c, leave b, join b, leave c
        rooms.join("room", "a").await;
        rooms.join("room", "b").await;
        rooms.join("room", "c").await;
        rooms.leave("room", "b").await;
        rooms.join("room", "b").await;
        rooms.leave("room", "c").await;

        let mut members = rooms.members("room").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender_and_skips_dead_members() {
        let (registry, rooms) = setup();
        let mut a_rx = connect(&registry, "a").await;
        let mut b_rx = connect(&registry, "b").await;

        rooms.join("team1", "a").await;
        rooms.join("team1", "b").await;
        rooms.join("team1", "stale").await; // never connected

        let delivered = rooms.broadcast("team1", frame("hi"), Some("a")).await;
        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut b_rx).len(), 1);
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_to_unknown_room_delivers_nothing() {
        let (_registry, rooms) = setup();
        assert_eq!(rooms.broadcast("ghost", frame("x"), None).await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_order_preserved_per_recipient() {
        let (registry, rooms) = setup();
        let mut b_rx = connect(&registry, "b").await;
        rooms.join("room", "b").await;

        for i in 0..5 {
            rooms.broadcast("room", frame(&format!("m{i}")), None).await;
        }

        let contents: Vec<String> = drain(&mut b_rx)
            .into_iter()
            .map(|f| match f {
                ServerFrame::Message { content, .. } => content,
                other => panic!("unexpected frame {:?}", other),
            })
            .collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_leave_all_reports_vacated_rooms() {
        let (_registry, rooms) = setup();
        rooms.join("one", "a").await;
        rooms.join("two", "a").await;
        rooms.join("two", "b").await;
        rooms.join("three", "b").await;

        let mut vacated = rooms.leave_all("a").await;
        vacated.sort();
        assert_eq!(vacated, vec!["one".to_string(), "two".to_string()]);

        // "one" emptied and was deleted, "two" still has b.
        assert!(rooms.members("one").await.is_none());
        assert_eq!(rooms.members("two").await.unwrap(), vec!["b".to_string()]);
    }
}
