//! Registre des rooms : room id → ensemble des connexions abonnées
//!
//! Propriété exclusive de la boucle du broker, aucun verrou. Les
//! ensembles vides sont retirés pour borner la mémoire.

use crate::connection::ConnId;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, HashSet<ConnId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abonne une connexion à une room
    pub fn subscribe(&mut self, room_id: &str, conn_id: ConnId) {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(conn_id);
    }

    /// Désabonne une connexion ; la room disparaît si elle se vide
    pub fn unsubscribe(&mut self, room_id: &str, conn_id: ConnId) {
        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                self.rooms.remove(room_id);
            }
        }
    }

    /// Membres d'une room (vide si la room n'existe pas)
    pub fn members(&self, room_id: &str) -> impl Iterator<Item = ConnId> + '_ {
        self.rooms
            .get(room_id)
            .into_iter()
            .flat_map(|members| members.iter().copied())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, HashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_members() {
        let mut registry = RoomRegistry::new();
        registry.subscribe("studio", 1);
        registry.subscribe("studio", 2);

        let mut members: Vec<_> = registry.members("studio").collect();
        members.sort_unstable();
        assert_eq!(members, vec![1, 2]);
        assert_eq!(registry.member_count("studio"), 2);
    }

    #[test]
    fn test_empty_room_is_pruned() {
        let mut registry = RoomRegistry::new();
        registry.subscribe("studio", 1);
        registry.unsubscribe("studio", 1);

        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.members("studio").count(), 0);
    }

    #[test]
    fn test_unsubscribe_unknown_room_is_noop() {
        let mut registry = RoomRegistry::new();
        registry.unsubscribe("ghost", 42);
        assert_eq!(registry.room_count(), 0);
    }
}
