// Participant registry.
//
// Maps each connected participant's tag to its connection. The server's
// reader threads register a participant after the handshake and remove it
// when the connection drops; the simulation thread looks connections up to
// send. Whatever the registry says is connected is the truth: a tag that is
// not in the registry is never written to.
//
// Tags are either declared by the client in `Hello` or, when the client sent
// an empty tag, generated here as `participant-N`. A declared tag that is
// already registered is refused: the newcomer is rejected, the existing
// participant is left alone.
//
// The registry is generic over the connection handle so that its bookkeeping
// can be tested without sockets; the server stores `Arc<Connection>`.
// Iteration is in tag order (`BTreeMap`), which keeps broadcast order stable.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("client tag {0:?} is already in use")]
    TagInUse(String),
}

pub struct ClientRegistry<C> {
    connections: BTreeMap<String, C>,
    next_generated: u32,
}

impl<C> Default for ClientRegistry<C> {
    fn default() -> Self {
        Self {
            connections: BTreeMap::new(),
            next_generated: 0,
        }
    }
}

impl<C> ClientRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under `requested`, or under a generated tag if
    /// `requested` is empty. Returns the tag actually used.
    pub fn register(&mut self, requested: &str, connection: C) -> Result<String, RegistryError> {
        let tag = if requested.is_empty() {
            self.generate_tag()
        } else if self.connections.contains_key(requested) {
            return Err(RegistryError::TagInUse(requested.to_owned()));
        } else {
            requested.to_owned()
        };
        self.connections.insert(tag.clone(), connection);
        Ok(tag)
    }

    fn generate_tag(&mut self) -> String {
        loop {
            let tag = format!("participant-{}", self.next_generated);
            self.next_generated += 1;
            if !self.connections.contains_key(&tag) {
                return tag;
            }
        }
    }

    pub fn remove(&mut self, tag: &str) -> Option<C> {
        self.connections.remove(tag)
    }

    pub fn get(&self, tag: &str) -> Option<&C> {
        self.connections.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.connections.contains_key(tag)
    }

    pub fn tags(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &C)> {
        self.connections.iter().map(|(tag, c)| (tag.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl<C: Clone> ClientRegistry<C> {
    /// Snapshot of every connection, so callers can write without holding
    /// whatever lock guards the registry.
    pub fn snapshot(&self) -> Vec<(String, C)> {
        self.connections
            .iter()
            .map(|(tag, c)| (tag.clone(), c.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_tag_is_kept() {
        let mut registry = ClientRegistry::new();
        assert_eq!(registry.register("mission", 1).unwrap(), "mission");
        assert!(registry.contains("mission"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_tag_is_rejected_and_original_kept() {
        let mut registry = ClientRegistry::new();
        registry.register("mission", 1).unwrap();
        let err = registry.register("mission", 2).unwrap_err();
        assert_eq!(err, RegistryError::TagInUse("mission".into()));
        assert_eq!(registry.get("mission"), Some(&1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_tag_gets_generated_unique_tag() {
        let mut registry = ClientRegistry::new();
        // A client may have declared the first generated name itself.
        registry.register("participant-0", 0).unwrap();
        let a = registry.register("", 1).unwrap();
        let b = registry.register("", 2).unwrap();
        assert_eq!(a, "participant-1");
        assert_eq!(b, "participant-2");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn remove_frees_the_tag() {
        let mut registry = ClientRegistry::new();
        registry.register("canderous", 1).unwrap();
        assert_eq!(registry.remove("canderous"), Some(1));
        assert!(!registry.contains("canderous"));
        assert_eq!(registry.remove("canderous"), None);
        assert_eq!(registry.register("canderous", 2).unwrap(), "canderous");
    }

    #[test]
    fn tags_and_snapshot_are_sorted() {
        let mut registry = ClientRegistry::new();
        for tag in ["zaalbar", "bastila", "mission"] {
            registry.register(tag, tag.len()).unwrap();
        }
        assert_eq!(registry.tags(), vec!["bastila", "mission", "zaalbar"]);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0], ("bastila".to_string(), 7));
        assert_eq!(registry.iter().count(), 3);
    }
}
