//! Subscription trie with wildcard topic matching.
//!
//! Each session owns one [`Trie`] mapping its topic filters to the QoS they
//! were subscribed with. Matching a concrete topic walks exact, `+` and `#`
//! branches in one pass and yields every matching QoS.

use ahash::AHashMap;

use crate::error::{Error, Result};
use crate::qos::QoS;

/// A node in the subscription trie.
#[derive(Debug, Default)]
struct TrieNode {
    /// QoS of a filter ending exactly at this node.
    qos: Option<QoS>,
    /// Child nodes by topic level.
    children: AHashMap<String, TrieNode>,
    /// Single-level wildcard (+) branch.
    single_wildcard: Option<Box<TrieNode>>,
    /// QoS of a multi-level wildcard (#) filter rooted here.
    multi_wildcard: Option<QoS>,
}

impl TrieNode {
    fn is_empty(&self) -> bool {
        self.qos.is_none()
            && self.multi_wildcard.is_none()
            && self.single_wildcard.is_none()
            && self.children.is_empty()
    }

    /// Returns the previous QoS for the filter, if any.
    fn insert(&mut self, levels: &[&str], qos: QoS) -> Option<QoS> {
        let Some((&level, remaining)) = levels.split_first() else {
            return self.qos.replace(qos);
        };

        match level {
            // Multi-level wildcard - always last
            "#" => self.multi_wildcard.replace(qos),
            "+" => self
                .single_wildcard
                .get_or_insert_with(Box::default)
                .insert(remaining, qos),
            _ => self
                .children
                .entry(level.to_string())
                .or_default()
                .insert(remaining, qos),
        }
    }

    /// Returns the removed QoS. Prunes branches left empty.
    fn remove(&mut self, levels: &[&str]) -> Option<QoS> {
        let Some((&level, remaining)) = levels.split_first() else {
            return self.qos.take();
        };

        match level {
            "#" => self.multi_wildcard.take(),
            "+" => {
                let child = self.single_wildcard.as_mut()?;
                let removed = child.remove(remaining);
                if child.is_empty() {
                    self.single_wildcard = None;
                }
                removed
            }
            _ => {
                let child = self.children.get_mut(level)?;
                let removed = child.remove(remaining);
                if child.is_empty() {
                    self.children.remove(level);
                }
                removed
            }
        }
    }

    fn collect(&self, levels: &[&str], is_root: bool, out: &mut Vec<QoS>) {
        // MQTT-4.7.2-1: Topics starting with $ are not matched by wildcards at root level
        let skip_wildcards = is_root && levels.first().is_some_and(|l| l.starts_with('$'));

        if !skip_wildcards {
            // Multi-level wildcard matches everything from here, including the parent level
            out.extend(self.multi_wildcard);
        }

        let Some((&level, remaining)) = levels.split_first() else {
            out.extend(self.qos);
            return;
        };

        if !skip_wildcards {
            if let Some(child) = &self.single_wildcard {
                child.collect(remaining, false, out);
            }
        }

        if let Some(child) = self.children.get(level) {
            child.collect(remaining, false, out);
        }
    }
}

/// Topic filter → QoS store for one session.
#[derive(Debug, Default)]
pub struct Trie {
    root: TrieNode,
    len: usize,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `filter` with `qos`, replacing any previous QoS for it.
    pub fn set(&mut self, filter: &str, qos: QoS) {
        let levels: Vec<&str> = filter.split('/').collect();
        if self.root.insert(&levels, qos).is_none() {
            self.len += 1;
        }
    }

    /// Remove `filter`. Removing an unknown filter is a no-op.
    ///
    /// Returns true if the filter was registered.
    pub fn empty(&mut self, filter: &str) -> bool {
        let levels: Vec<&str> = filter.split('/').collect();
        let removed = self.root.remove(&levels).is_some();
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// QoS of every filter matching `topic`.
    pub fn matches(&self, topic: &str) -> Vec<QoS> {
        let mut out = Vec::new();
        let levels: Vec<&str> = topic.split('/').collect();
        self.root.collect(&levels, true, &mut out);
        out
    }

    /// Highest QoS among filters matching `topic`, or `None` if nothing matches.
    pub fn max_qos(&self, topic: &str) -> Option<QoS> {
        self.matches(topic).into_iter().max()
    }

    /// Number of registered filters.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Validate a subscription topic filter.
///
/// - Must not be empty or contain NUL.
/// - `#` must occupy a whole level and be the last level.
/// - `+` must occupy a whole level.
pub fn validate_topic_filter(filter: &str) -> Result<()> {
    let invalid = |reason| Error::InvalidTopicFilter {
        filter: filter.to_string(),
        reason,
    };

    if filter.is_empty() {
        return Err(invalid("empty filter"));
    }
    if filter.contains('\0') {
        return Err(invalid("contains NUL character"));
    }

    let mut levels = filter.split('/').peekable();
    while let Some(level) = levels.next() {
        if level.contains('#') && (level != "#" || levels.peek().is_some()) {
            return Err(invalid("'#' must be a whole, final level"));
        }
        if level.contains('+') && level != "+" {
            return Err(invalid("'+' must be a whole level"));
        }
    }
    Ok(())
}

/// Check if a topic matches a topic filter (which may contain wildcards).
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    // MQTT-4.7.2-1: wildcard-leading filters never match $ topics
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let topic_levels: Vec<&str> = topic.split('/').collect();
    let filter_levels: Vec<&str> = filter.split('/').collect();

    let mut ti = 0;
    let mut fi = 0;

    while fi < filter_levels.len() {
        let filter_level = filter_levels[fi];

        if filter_level == "#" {
            return true;
        }

        if ti >= topic_levels.len() {
            return false;
        }

        if filter_level == "+" || filter_level == topic_levels[ti] {
            ti += 1;
            fi += 1;
        } else {
            return false;
        }
    }

    ti == topic_levels.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let mut trie = Trie::new();
        trie.set("sensors/temp", QoS::AtLeastOnce);

        assert_eq!(trie.matches("sensors/temp"), vec![QoS::AtLeastOnce]);
        assert!(trie.matches("sensors/humidity").is_empty());
    }

    #[test]
    fn test_single_wildcard() {
        let mut trie = Trie::new();
        trie.set("sensors/+/temp", QoS::AtMostOnce);

        assert_eq!(trie.matches("sensors/room1/temp").len(), 1);
        assert_eq!(trie.matches("sensors/room2/temp").len(), 1);
        assert!(trie.matches("sensors/room1/humidity").is_empty());
        assert!(trie.matches("sensors/temp").is_empty());
    }

    #[test]
    fn test_multi_wildcard() {
        let mut trie = Trie::new();
        trie.set("sensors/#", QoS::AtMostOnce);

        assert_eq!(trie.matches("sensors").len(), 1);
        assert_eq!(trie.matches("sensors/temp").len(), 1);
        assert_eq!(trie.matches("sensors/room1/floor2/temp").len(), 1);
        assert!(trie.matches("actuators/light").is_empty());
    }

    #[test]
    fn test_overlapping_filters_pick_max() {
        let mut trie = Trie::new();
        trie.set("a/#", QoS::AtMostOnce);
        trie.set("a/b", QoS::AtLeastOnce);
        trie.set("+/b", QoS::AtMostOnce);

        assert_eq!(trie.matches("a/b").len(), 3);
        assert_eq!(trie.max_qos("a/b"), Some(QoS::AtLeastOnce));
        assert_eq!(trie.max_qos("a/c"), Some(QoS::AtMostOnce));
        assert_eq!(trie.max_qos("b/c"), None);
    }

    #[test]
    fn test_dollar_topics_skip_root_wildcards() {
        let mut trie = Trie::new();
        trie.set("#", QoS::AtMostOnce);
        trie.set("+/broker/load", QoS::AtMostOnce);
        assert!(trie.matches("$SYS/broker/load").is_empty());

        trie.set("$SYS/#", QoS::AtLeastOnce);
        assert_eq!(trie.max_qos("$SYS/broker/load"), Some(QoS::AtLeastOnce));
    }

    #[test]
    fn test_set_replaces_qos() {
        let mut trie = Trie::new();
        trie.set("a/b", QoS::AtMostOnce);
        trie.set("a/b", QoS::AtLeastOnce);
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.matches("a/b"), vec![QoS::AtLeastOnce]);
    }

    #[test]
    fn test_empty_is_idempotent_and_prunes() {
        let mut trie = Trie::new();
        trie.set("a/+/c", QoS::AtLeastOnce);
        trie.set("a/#", QoS::AtMostOnce);

        assert!(trie.empty("a/+/c"));
        assert!(!trie.empty("a/+/c"));
        assert!(!trie.empty("never/subscribed"));
        assert_eq!(trie.len(), 1);
        assert!(trie.root.children["a"].single_wildcard.is_none());

        assert!(trie.empty("a/#"));
        assert!(trie.is_empty());
        assert!(trie.root.is_empty());
    }

    #[test]
    fn test_validate_topic_filter() {
        assert!(validate_topic_filter("a/b").is_ok());
        assert!(validate_topic_filter("a/+/c").is_ok());
        assert!(validate_topic_filter("#").is_ok());
        assert!(validate_topic_filter("a/#").is_ok());
        assert!(validate_topic_filter("").is_err());
        assert!(validate_topic_filter("a/#/c").is_err());
        assert!(validate_topic_filter("a/b#").is_err());
        assert!(validate_topic_filter("a+/b").is_err());
    }

    #[test]
    fn test_topic_matches_filter() {
        assert!(topic_matches_filter("a/b", "a/b"));
        assert!(topic_matches_filter("a/b", "a/+"));
        assert!(topic_matches_filter("a", "a/#"));
        assert!(topic_matches_filter("a/b/c", "#"));
        assert!(!topic_matches_filter("a/b/c", "a/+"));
        assert!(!topic_matches_filter("$SYS/x", "#"));
        assert!(topic_matches_filter("$SYS/x", "$SYS/+"));
    }
}
