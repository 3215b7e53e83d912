use std::collections::BTreeMap;
use std::fmt;

/// Which half of a plan a conflict came from. Unstow sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Unstow,
    Stow,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Unstow => f.write_str("unstow"),
            Operation::Stow => f.write_str("stow"),
        }
    }
}

impl Operation {
    /// Gerund used in user-facing reports.
    pub fn progressive(&self) -> &'static str {
        match self {
            Operation::Unstow => "unstowing",
            Operation::Stow => "stowing",
        }
    }
}

/// Conflicts found while planning, grouped by operation then package.
///
/// Messages for one package keep the order they were found in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conflicts {
    by_operation: BTreeMap<Operation, BTreeMap<String, Vec<String>>>,
    count: usize,
}

impl Conflicts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, operation: Operation, package: &str, message: String) {
        self.by_operation
            .entry(operation)
            .or_default()
            .entry(package.to_string())
            .or_default()
            .push(message);
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn for_operation(&self, operation: Operation) -> Option<&BTreeMap<String, Vec<String>>> {
        self.by_operation.get(&operation)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Operation, &str, &[String])> {
        self.by_operation.iter().flat_map(|(operation, packages)| {
            packages
                .iter()
                .map(move |(package, messages)| (*operation, package.as_str(), messages.as_slice()))
        })
    }

    /// Package → messages, with unstow messages ahead of stow messages for
    /// packages that appear under both.
    pub fn by_package(&self) -> BTreeMap<String, Vec<String>> {
        let mut flat: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (_, package, messages) in self.iter() {
            flat.entry(package.to_string())
                .or_default()
                .extend(messages.iter().cloned());
        }
        flat
    }

    pub fn clear(&mut self) {
        self.by_operation.clear();
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_groups_by_operation_and_package() {
        let mut conflicts = Conflicts::new();
        conflicts.record(Operation::Stow, "pkg2", "second".to_string());
        conflicts.record(Operation::Stow, "pkg1", "first".to_string());
        conflicts.record(Operation::Stow, "pkg1", "again".to_string());
        conflicts.record(Operation::Unstow, "pkg1", "old".to_string());

        assert_eq!(conflicts.count(), 4);
        let stow = conflicts.for_operation(Operation::Stow).unwrap();
        assert_eq!(stow["pkg1"], vec!["first", "again"]);
        assert_eq!(stow["pkg2"], vec!["second"]);

        let order: Vec<(Operation, &str)> = conflicts.iter().map(|(o, p, _)| (o, p)).collect();
        assert_eq!(
            order,
            vec![
                (Operation::Unstow, "pkg1"),
                (Operation::Stow, "pkg1"),
                (Operation::Stow, "pkg2"),
            ]
        );
    }

    #[test]
    fn test_by_package_flattens_unstow_first() {
        let mut conflicts = Conflicts::new();
        conflicts.record(Operation::Stow, "pkg", "stow msg".to_string());
        conflicts.record(Operation::Unstow, "pkg", "unstow msg".to_string());

        let flat = conflicts.by_package();
        assert_eq!(flat["pkg"], vec!["unstow msg", "stow msg"]);

        conflicts.clear();
        assert!(conflicts.is_empty());
        assert!(conflicts.by_package().is_empty());
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::Stow.to_string(), "stow");
        assert_eq!(Operation::Unstow.progressive(), "unstowing");
    }
}
