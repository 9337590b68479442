use std::collections::HashMap;

/// Outcome of registering a display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Accepted,
    /// The name was already online. The connection is registered anyway.
    Duplicate,
}

/// Display names of the users currently connected.
///
/// Names are reference-counted per connection, so a duplicate login does not knock the
/// first connection out of the registry when either of them disconnects.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    online: HashMap<String, usize>,
}

impl PresenceRegistry {
    pub fn register(&mut self, name: &str) -> Registration {
        let count = self.online.entry(name.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            Registration::Accepted
        } else {
            Registration::Duplicate
        }
    }

    pub fn unregister(&mut self, name: &str) {
        if let Some(count) = self.online.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                self.online.remove(name);
            }
        }
    }

    #[must_use]
    pub fn is_online(&self, name: &str) -> bool {
        self.online.contains_key(name)
    }

    /// Number of distinct names online.
    #[must_use]
    pub fn len(&self) -> usize {
        self.online.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let mut presence = PresenceRegistry::default();
        assert_eq!(presence.register("alice"), Registration::Accepted);
        assert!(presence.is_online("alice"));
        presence.unregister("alice");
        assert!(!presence.is_online("alice"));
        assert!(presence.is_empty());
    }

    #[test]
    fn test_duplicate_stays_registered_until_last_connection_leaves() {
        let mut presence = PresenceRegistry::default();
        presence.register("alice");
        assert_eq!(presence.register("alice"), Registration::Duplicate);
        assert_eq!(presence.len(), 1);

        presence.unregister("alice");
        assert!(presence.is_online("alice"));
        presence.unregister("alice");
        assert!(!presence.is_online("alice"));
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let mut presence = PresenceRegistry::default();
        presence.unregister("ghost");
        assert!(presence.is_empty());
    }
}
