//! The approval registry: the host's table of admitted players.
//!
//! This is the host side of the connection approval protocol. It's
//! responsible for:
//! - Deciding whether an incoming connection may join
//! - Tracking which players are connected, keyed by durable identity
//! - Letting a player who dropped back in under a new transport handle
//! - Forgetting everyone when the session ends
//!
//! # Concurrency note
//!
//! `ApprovalRegistry` is a plain `HashMap` wrapper with no locking. It is
//! owned by the connection manager's task and only touched from the
//! serialized hook stream (approval checks and peer disconnects), so there
//! is never a second writer.

use std::collections::HashMap;

use tether_protocol::{ApprovalRequest, ApprovalResponse, PlayerId, RejectReason};
use tether_transport::PeerId;
use tracing::{debug, info, warn};

use crate::{AdmissionRules, SessionError, SessionPlayerRecord};

/// Admitted players for the current session.
///
/// ## Lifecycle
///
/// ```text
/// approve() ──→ [connected] ──disconnect_peer()──→ [disconnected]
///                   ↑                                    │
///                   └──────── approve() same PlayerId ───┘
///                                                        │
///                               cleanup_disconnected() / clear()
/// ```
pub struct ApprovalRegistry {
    /// Every known player this session, connected or not.
    records: HashMap<PlayerId, SessionPlayerRecord>,

    /// Index from live transport handle to player, kept in sync with
    /// `records`. Only connected records appear here, so its length is the
    /// connected count.
    peers: HashMap<PeerId, PlayerId>,

    rules: AdmissionRules,
}

impl ApprovalRegistry {
    /// Creates an empty registry enforcing `rules`.
    pub fn new(rules: AdmissionRules) -> Self {
        Self {
            records: HashMap::new(),
            peers: HashMap::new(),
            rules,
        }
    }

    /// The limits this registry enforces.
    pub fn rules(&self) -> &AdmissionRules {
        &self.rules
    }

    /// Decides on an incoming connection and, if admitted, records it.
    ///
    /// Checks run in a fixed order and the first failure wins:
    /// 1. missing payload → [`RejectReason::MissingPayload`]
    /// 2. at capacity → [`RejectReason::ServerFull`]
    /// 3. wrong protocol version → [`RejectReason::IncompatibleVersion`]
    /// 4. player already connected → [`RejectReason::DuplicateConnection`]
    ///
    /// Capacity comes before the duplicate check so a full host never
    /// reveals whether an identifier is currently connected.
    pub fn approve(&mut self, request: &ApprovalRequest) -> ApprovalResponse {
        let peer = request.peer;
        let Some(payload) = &request.payload else {
            warn!(%peer, "rejecting connection without payload");
            return ApprovalResponse::reject(RejectReason::MissingPayload);
        };
        let player_id = payload.player_id;

        if self.connected_count() >= self.rules.capacity {
            info!(%peer, capacity = self.rules.capacity, "rejecting connection: server full");
            return ApprovalResponse::reject(RejectReason::ServerFull);
        }
        if payload.protocol_version != self.rules.protocol_version {
            info!(
                %peer,
                theirs = payload.protocol_version,
                ours = self.rules.protocol_version,
                "rejecting connection: protocol version mismatch"
            );
            return ApprovalResponse::reject(RejectReason::IncompatibleVersion);
        }
        if self.is_connected(&player_id) {
            info!(%peer, %player_id, "rejecting connection: already connected");
            return ApprovalResponse::reject(RejectReason::DuplicateConnection);
        }

        self.admit(player_id, peer, payload.display_name.clone());
        ApprovalResponse::approve()
    }

    /// Records `player_id` as connected on `peer`, creating the record or
    /// refreshing an existing one. No checks; [`approve`](Self::approve) is
    /// the checked path. The host uses this to register itself.
    pub fn admit(
        &mut self,
        player_id: PlayerId,
        peer: PeerId,
        display_name: String,
    ) -> &SessionPlayerRecord {
        let record = self
            .records
            .entry(player_id)
            .and_modify(|r| {
                info!(%player_id, old = %r.peer, new = %peer, "player reconnected");
            })
            .or_insert_with(|| {
                info!(%player_id, %peer, "player admitted");
                SessionPlayerRecord::new(player_id, peer, display_name.clone())
            });

        if record.is_connected && record.peer != peer {
            self.peers.remove(&record.peer);
        }
        record.peer = peer;
        record.display_name = display_name;
        record.is_connected = true;
        self.peers.insert(peer, player_id);
        record
    }

    /// Marks whoever is connected on `peer` as disconnected. The record is
    /// kept so the player can come back, and the identifier is free to be
    /// approved again.
    ///
    /// # Errors
    /// Returns [`SessionError::UnknownPeer`] if nobody is connected on `peer`
    /// (e.g. it was rejected during approval).
    pub fn disconnect_peer(
        &mut self,
        peer: PeerId,
    ) -> Result<&SessionPlayerRecord, SessionError> {
        let player_id = self
            .peers
            .remove(&peer)
            .ok_or(SessionError::UnknownPeer(peer))?;
        let record = self
            .records
            .get_mut(&player_id)
            .ok_or(SessionError::NotFound(player_id))?;
        record.is_connected = false;
        info!(%player_id, %peer, "player disconnected");
        Ok(&*record)
    }

    /// Forgets a player entirely.
    pub fn remove(&mut self, player_id: &PlayerId) -> Option<SessionPlayerRecord> {
        let record = self.records.remove(player_id)?;
        if record.is_connected {
            self.peers.remove(&record.peer);
        }
        Some(record)
    }

    /// Notes that the player's object has been spawned.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] for an unknown player.
    pub fn mark_spawned(&mut self, player_id: &PlayerId) -> Result<(), SessionError> {
        let record = self
            .records
            .get_mut(player_id)
            .ok_or(SessionError::NotFound(*player_id))?;
        record.has_spawned = true;
        Ok(())
    }

    /// Drops every record whose player is not connected. Returns who was
    /// dropped.
    pub fn cleanup_disconnected(&mut self) -> Vec<PlayerId> {
        let mut removed = Vec::new();
        self.records.retain(|player_id, record| {
            if record.is_connected {
                true
            } else {
                removed.push(*player_id);
                false
            }
        });
        removed
    }

    /// Forgets everything. Called when the session is torn down.
    pub fn clear(&mut self) {
        if !self.records.is_empty() {
            debug!(records = self.records.len(), "approval registry cleared");
        }
        self.records.clear();
        self.peers.clear();
    }

    /// Looks up a record by player.
    pub fn get(&self, player_id: &PlayerId) -> Option<&SessionPlayerRecord> {
        self.records.get(player_id)
    }

    /// Looks up the record currently connected on `peer`.
    pub fn by_peer(&self, peer: PeerId) -> Option<&SessionPlayerRecord> {
        self.peers.get(&peer).and_then(|id| self.records.get(id))
    }

    /// Whether `player_id` has a connected record.
    pub fn is_connected(&self, player_id: &PlayerId) -> bool {
        self.records
            .get(player_id)
            .is_some_and(|r| r.is_connected)
    }

    /// Number of connected players. This is the figure capacity is checked
    /// against, and the one gameplay should compare to a minimum player
    /// count: a peer is counted as soon as it is approved.
    pub fn connected_count(&self) -> usize {
        self.peers.len()
    }

    /// Every connected record.
    pub fn connected(&self) -> impl Iterator<Item = &SessionPlayerRecord> + '_ {
        self.records.values().filter(|r| r.is_connected)
    }

    /// Transport handles of every connected player.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    /// Number of records (any state).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `ApprovalRegistry`.
    //!
    //! Naming follows `test_{function}_{scenario}_{expected}`.

    use tether_protocol::{ConnectionPayload, PROTOCOL_VERSION};
    use uuid::Uuid;

    use super::*;

    // -- Helpers ----------------------------------------------------------

    fn registry(capacity: usize) -> ApprovalRegistry {
        ApprovalRegistry::new(AdmissionRules {
            capacity,
            protocol_version: PROTOCOL_VERSION,
        })
    }

    fn pid(n: u128) -> PlayerId {
        PlayerId(Uuid::from_u128(n))
    }

    fn peer(n: u64) -> PeerId {
        PeerId::new(n)
    }

    fn request(player: u128, on: u64) -> ApprovalRequest {
        ApprovalRequest {
            peer: peer(on),
            payload: Some(ConnectionPayload::new(pid(player), format!("player-{player}"))),
        }
    }

    // =====================================================================
    // approve()
    // =====================================================================

    #[test]
    fn test_approve_new_player_registers_connected_record() {
        let mut reg = registry(4);

        let response = reg.approve(&request(1, 10));

        assert_eq!(response, ApprovalResponse::approve());
        let record = reg.get(&pid(1)).expect("record should exist");
        assert!(record.is_connected);
        assert_eq!(record.peer, peer(10));
        assert_eq!(record.display_name, "player-1");
        assert_eq!(reg.by_peer(peer(10)).map(|r| r.player_id), Some(pid(1)));
    }

    #[test]
    fn test_approve_missing_payload_rejected() {
        let mut reg = registry(4);

        let response = reg.approve(&ApprovalRequest {
            peer: peer(10),
            payload: None,
        });

        assert_eq!(response.reason, Some(RejectReason::MissingPayload));
        assert!(!response.approved);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_approve_duplicate_connected_player_rejected() {
        let mut reg = registry(4);
        assert!(reg.approve(&request(1, 10)).approved);

        let response = reg.approve(&request(1, 11));

        assert_eq!(response.reason, Some(RejectReason::DuplicateConnection));
        // The original connection is untouched.
        assert_eq!(reg.get(&pid(1)).unwrap().peer, peer(10));
        assert!(reg.by_peer(peer(11)).is_none());
    }

    #[test]
    fn test_approve_after_disconnect_readmits_same_player() {
        let mut reg = registry(4);
        reg.approve(&request(1, 10));
        reg.disconnect_peer(peer(10)).unwrap();

        let response = reg.approve(&request(1, 11));

        assert!(response.approved);
        let record = reg.get(&pid(1)).unwrap();
        assert_eq!(record.peer, peer(11));
        assert!(record.is_connected);
        assert_eq!(reg.len(), 1, "same record reused, not duplicated");
    }

    #[test]
    fn test_approve_at_capacity_rejected_server_full() {
        let mut reg = registry(2);
        reg.approve(&request(1, 10));
        reg.approve(&request(2, 11));

        let response = reg.approve(&request(3, 12));

        assert_eq!(response.reason, Some(RejectReason::ServerFull));
    }

    #[test]
    fn test_approve_full_and_duplicate_reports_server_full() {
        // Both conditions hold: capacity wins so a full host doesn't leak
        // which identifiers are online.
        let mut reg = registry(1);
        reg.approve(&request(1, 10));

        let response = reg.approve(&request(1, 11));

        assert_eq!(response.reason, Some(RejectReason::ServerFull));
    }

    #[test]
    fn test_approve_version_mismatch_rejected() {
        let mut reg = registry(4);
        let mut req = request(1, 10);
        if let Some(p) = req.payload.as_mut() {
            p.protocol_version = PROTOCOL_VERSION + 1;
        }

        let response = reg.approve(&req);

        assert_eq!(response.reason, Some(RejectReason::IncompatibleVersion));
    }

    #[test]
    fn test_approve_disconnected_players_do_not_count_toward_capacity() {
        let mut reg = registry(1);
        reg.approve(&request(1, 10));
        reg.disconnect_peer(peer(10)).unwrap();

        let response = reg.approve(&request(2, 11));

        assert!(response.approved);
        assert_eq!(reg.connected_count(), 1);
        assert_eq!(reg.len(), 2);
    }

    // =====================================================================
    // admit()
    // =====================================================================

    #[test]
    fn test_admit_keeps_spawn_flag_across_reconnect() {
        let mut reg = registry(4);
        reg.admit(pid(1), peer(10), "a".into());
        reg.mark_spawned(&pid(1)).unwrap();
        reg.disconnect_peer(peer(10)).unwrap();

        let record = reg.admit(pid(1), peer(11), "a".into());

        assert!(record.has_spawned);
    }

    #[test]
    fn test_admit_moves_live_record_to_new_peer() {
        let mut reg = registry(4);
        reg.admit(pid(1), peer(10), "a".into());

        reg.admit(pid(1), peer(11), "a".into());

        assert!(reg.by_peer(peer(10)).is_none());
        assert_eq!(reg.connected_count(), 1);
    }

    // =====================================================================
    // disconnect_peer() / remove()
    // =====================================================================

    #[test]
    fn test_disconnect_unknown_peer_returns_error() {
        let mut reg = registry(4);

        let result = reg.disconnect_peer(peer(99));

        assert!(matches!(result, Err(SessionError::UnknownPeer(p)) if p == peer(99)));
    }

    #[test]
    fn test_disconnect_twice_second_is_unknown() {
        let mut reg = registry(4);
        reg.approve(&request(1, 10));
        reg.disconnect_peer(peer(10)).unwrap();

        assert!(reg.disconnect_peer(peer(10)).is_err());
    }

    #[test]
    fn test_remove_connected_player_frees_slot() {
        let mut reg = registry(1);
        reg.approve(&request(1, 10));

        let removed = reg.remove(&pid(1));

        assert!(removed.is_some());
        assert_eq!(reg.connected_count(), 0);
        assert!(reg.approve(&request(2, 11)).approved);
    }

    // =====================================================================
    // mark_spawned() / cleanup_disconnected() / clear()
    // =====================================================================

    #[test]
    fn test_mark_spawned_unknown_player_returns_not_found() {
        let mut reg = registry(4);

        let result = reg.mark_spawned(&pid(7));

        assert!(matches!(result, Err(SessionError::NotFound(p)) if p == pid(7)));
    }

    #[test]
    fn test_cleanup_disconnected_keeps_connected() {
        let mut reg = registry(4);
        reg.approve(&request(1, 10));
        reg.approve(&request(2, 11));
        reg.disconnect_peer(peer(10)).unwrap();

        let removed = reg.cleanup_disconnected();

        assert_eq!(removed, vec![pid(1)]);
        assert!(reg.get(&pid(2)).is_some());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_clear_forgets_everyone() {
        let mut reg = registry(4);
        reg.approve(&request(1, 10));
        reg.approve(&request(2, 11));

        reg.clear();

        assert!(reg.is_empty());
        assert_eq!(reg.connected_count(), 0);
        assert!(reg.connected_peers().is_empty());
    }

    // =====================================================================
    // Full lifecycle
    // =====================================================================

    #[test]
    fn test_full_lifecycle_duplicate_then_drop_then_readmit() {
        // Same identity tries twice while connected, drops, then returns.
        let mut reg = registry(4);

        assert!(reg.approve(&request(1, 10)).approved);
        assert_eq!(
            reg.approve(&request(1, 11)).reason,
            Some(RejectReason::DuplicateConnection)
        );

        reg.disconnect_peer(peer(10)).unwrap();
        assert!(!reg.is_connected(&pid(1)));

        assert!(reg.approve(&request(1, 12)).approved);
        assert!(reg.is_connected(&pid(1)));
        assert_eq!(reg.connected_peers(), vec![peer(12)]);
    }
}
