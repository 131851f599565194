//! The session manager: one entry per open connection.
//!
//! `SessionManager` is a plain `HashMap` and is not thread-safe on its own.
//! The server wraps it in a mutex and only holds the lock for single
//! lookups or updates, never across an `.await`.

use std::collections::HashMap;

use quizroom_protocol::{ParticipantId, RoomId};
use quizroom_transport::ConnectionId;

use crate::{OperatorCapability, Role, Session, SessionConfig, SessionError};

/// Tracks the role of every connection that completed its handshake.
///
/// ```text
/// handshake ──→ create() ──→ bind_participant() ──→ remove()
///                  │                                   ↑
///                  └──── (operator) ───────────────────┘
/// ```
pub struct SessionManager {
    sessions: HashMap<ConnectionId, Session>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registers a connection after its handshake. With a capability the
    /// session is an operator, otherwise a guest.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyConnected`] if the connection already
    /// has a session.
    pub fn create(
        &mut self,
        connection_id: ConnectionId,
        capability: Option<OperatorCapability>,
    ) -> Result<&Session, SessionError> {
        if self.sessions.contains_key(&connection_id) {
            return Err(SessionError::AlreadyConnected(connection_id));
        }

        let role = match capability {
            Some(cap) => {
                tracing::info!(%connection_id, issuer = cap.issuer(), "operator session created");
                Role::Operator(cap)
            }
            None => {
                tracing::debug!(%connection_id, "guest session created");
                Role::Guest
            }
        };

        Ok(self
            .sessions
            .entry(connection_id)
            .or_insert_with(|| Session::new(connection_id, role)))
    }

    /// Records that the connection now plays as `participant_id` in
    /// `room_id`, returning the previous binding if there was one.
    ///
    /// Operators may join rooms too; their capability is kept and the
    /// binding is not recorded.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if the connection has no session.
    pub fn bind_participant(
        &mut self,
        connection_id: ConnectionId,
        room_id: RoomId,
        participant_id: ParticipantId,
    ) -> Result<Option<(RoomId, ParticipantId)>, SessionError> {
        let session = self
            .sessions
            .get_mut(&connection_id)
            .ok_or(SessionError::NotFound(connection_id))?;

        match &mut session.role {
            Role::Operator(_) => Ok(None),
            role => {
                let previous = std::mem::replace(
                    role,
                    Role::Participant {
                        room_id,
                        participant_id,
                    },
                );
                Ok(match previous {
                    Role::Participant {
                        room_id,
                        participant_id,
                    } => Some((room_id, participant_id)),
                    _ => None,
                })
            }
        }
    }

    /// Returns the operator capability of the connection.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] if the connection has no session.
    /// - [`SessionError::Forbidden`] if the session isn't an operator.
    pub fn require_operator(
        &self,
        connection_id: ConnectionId,
    ) -> Result<&OperatorCapability, SessionError> {
        self.sessions
            .get(&connection_id)
            .ok_or(SessionError::NotFound(connection_id))?
            .capability()
            .ok_or(SessionError::Forbidden(connection_id))
    }

    /// Whether the connection joined `room_id` as `participant_id`.
    /// Operators may submit on behalf of any participant.
    pub fn may_submit_as(
        &self,
        connection_id: ConnectionId,
        room_id: &RoomId,
        participant_id: &ParticipantId,
    ) -> bool {
        match self.sessions.get(&connection_id) {
            Some(session) => match session.participant() {
                Some((r, p)) => r == room_id && p == participant_id,
                None => session.is_operator(),
            },
            None => false,
        }
    }

    /// Drops every participant binding into `room_id` (the room was
    /// restarted or deleted). Returns how many sessions went back to guest.
    pub fn unbind_room(&mut self, room_id: &RoomId) -> usize {
        let mut count = 0;
        for session in self.sessions.values_mut() {
            if matches!(&session.role, Role::Participant { room_id: r, .. } if r == room_id) {
                session.role = Role::Guest;
                count += 1;
            }
        }
        count
    }

    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Session> {
        let removed = self.sessions.remove(&connection_id);
        if removed.is_some() {
            tracing::debug!(%connection_id, "session removed");
        }
        removed
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn operator_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_operator()).count()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn room(id: &str) -> RoomId {
        RoomId::from(id)
    }

    fn pid(id: &str) -> ParticipantId {
        ParticipantId(id.to_string())
    }

    fn operator() -> OperatorCapability {
        OperatorCapability::new("test")
    }

    #[test]
    fn test_create_without_capability_is_guest() {
        let mut mgr = SessionManager::default();
        let session = mgr.create(conn(1), None).unwrap();
        assert_eq!(session.role, Role::Guest);
        assert!(!session.is_operator());
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_create_with_capability_is_operator() {
        let mut mgr = SessionManager::default();
        let session = mgr.create(conn(1), Some(operator())).unwrap();
        assert!(session.is_operator());
        assert_eq!(mgr.operator_count(), 1);
    }

    #[test]
    fn test_create_twice_returns_already_connected() {
        let mut mgr = SessionManager::default();
        mgr.create(conn(1), None).unwrap();
        let result = mgr.create(conn(1), None);
        assert!(matches!(result, Err(SessionError::AlreadyConnected(c)) if c == conn(1)));
    }

    #[test]
    fn test_require_operator_rejects_guest() {
        let mut mgr = SessionManager::default();
        mgr.create(conn(1), None).unwrap();
        mgr.create(conn(2), Some(operator())).unwrap();

        assert!(matches!(
            mgr.require_operator(conn(1)),
            Err(SessionError::Forbidden(_))
        ));
        assert!(mgr.require_operator(conn(2)).is_ok());
        assert!(matches!(
            mgr.require_operator(conn(3)),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn test_bind_participant_returns_previous_binding() {
        let mut mgr = SessionManager::default();
        mgr.create(conn(1), None).unwrap();

        let first = mgr.bind_participant(conn(1), room("a"), pid("p1")).unwrap();
        assert_eq!(first, None);

        let second = mgr.bind_participant(conn(1), room("b"), pid("p2")).unwrap();
        assert_eq!(second, Some((room("a"), pid("p1"))));

        let session = mgr.get(conn(1)).unwrap();
        assert_eq!(session.participant(), Some((&room("b"), &pid("p2"))));
    }

    #[test]
    fn test_bind_participant_unknown_connection_fails() {
        let mut mgr = SessionManager::default();
        let result = mgr.bind_participant(conn(9), room("a"), pid("p1"));
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[test]
    fn test_bind_participant_keeps_operator_role() {
        let mut mgr = SessionManager::default();
        mgr.create(conn(1), Some(operator())).unwrap();
        mgr.bind_participant(conn(1), room("a"), pid("p1")).unwrap();
        assert!(mgr.get(conn(1)).unwrap().is_operator());
    }

    #[test]
    fn test_may_submit_as_only_own_participant() {
        let mut mgr = SessionManager::default();
        mgr.create(conn(1), None).unwrap();
        mgr.create(conn(2), None).unwrap();
        mgr.create(conn(3), Some(operator())).unwrap();
        mgr.bind_participant(conn(1), room("a"), pid("p1")).unwrap();

        assert!(mgr.may_submit_as(conn(1), &room("a"), &pid("p1")));
        assert!(!mgr.may_submit_as(conn(1), &room("a"), &pid("p2")));
        assert!(!mgr.may_submit_as(conn(1), &room("b"), &pid("p1")));
        assert!(!mgr.may_submit_as(conn(2), &room("a"), &pid("p1")));
        assert!(mgr.may_submit_as(conn(3), &room("a"), &pid("p1")));
        assert!(!mgr.may_submit_as(conn(4), &room("a"), &pid("p1")));
    }

    #[test]
    fn test_unbind_room_resets_only_that_room() {
        let mut mgr = SessionManager::default();
        mgr.create(conn(1), None).unwrap();
        mgr.create(conn(2), None).unwrap();
        mgr.bind_participant(conn(1), room("a"), pid("p1")).unwrap();
        mgr.bind_participant(conn(2), room("b"), pid("p2")).unwrap();

        assert_eq!(mgr.unbind_room(&room("a")), 1);
        assert_eq!(mgr.get(conn(1)).unwrap().role, Role::Guest);
        assert!(mgr.get(conn(2)).unwrap().participant().is_some());
    }

    #[test]
    fn test_remove_session() {
        let mut mgr = SessionManager::default();
        mgr.create(conn(1), None).unwrap();
        assert!(mgr.remove(conn(1)).is_some());
        assert!(mgr.remove(conn(1)).is_none());
        assert!(mgr.is_empty());
    }
}
