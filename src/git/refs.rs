use std::collections::BTreeMap;

/// Snapshot of every ref in a repository and the object it points to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefTips {
    tips: BTreeMap<String, String>,
}

impl RefTips {
    /// Parse `git for-each-ref --format='%(objectname) %(refname)'` output.
    pub fn parse(output: &str) -> Self {
        let tips = output
            .lines()
            .filter_map(|line| {
                let (object, name) = line.trim().split_once(' ')?;
                Some((name.trim().to_string(), object.to_string()))
            })
            .collect();
        Self { tips }
    }

    pub fn len(&self) -> usize {
        self.tips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tips.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.tips.get(name).map(String::as_str)
    }

    /// Number of refs added, removed or moved between `self` and `after`
    pub fn changed_count(&self, after: &RefTips) -> usize {
        let moved_or_removed = self
            .tips
            .iter()
            .filter(|(name, object)| after.tips.get(*name) != Some(*object))
            .count();
        let added = after.tips.keys().filter(|name| !self.tips.contains_key(*name)).count();
        moved_or_removed + added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEFORE: &str = "\
1111111111111111111111111111111111111111 refs/heads/main
2222222222222222222222222222222222222222 refs/heads/dev
3333333333333333333333333333333333333333 refs/tags/v1.0
";

    #[test]
    fn test_parse() {
        let tips = RefTips::parse(BEFORE);
        assert_eq!(tips.len(), 3);
        assert_eq!(tips.get("refs/heads/main"), Some("1111111111111111111111111111111111111111"));
        assert!(RefTips::parse("").is_empty());
    }

    #[test]
    fn test_identical_snapshots_have_no_changes() {
        let before = RefTips::parse(BEFORE);
        let after = RefTips::parse(BEFORE);
        assert_eq!(before, after);
        assert_eq!(before.changed_count(&after), 0);
    }

    #[test]
    fn test_changed_count() {
        let before = RefTips::parse(BEFORE);
        let after = RefTips::parse(
            "\
4444444444444444444444444444444444444444 refs/heads/main
3333333333333333333333333333333333333333 refs/tags/v1.0
5555555555555555555555555555555555555555 refs/tags/v1.1
",
        );
        // main moved, dev removed, v1.1 added
        assert_eq!(before.changed_count(&after), 3);
    }
}
