use std::{fmt, sync::Arc};

use rustc_hash::FxHashSet;

/// Set of label names, e.g. the labels to aggregate away.
pub type LabelNames = FxHashSet<String>;

/// Label is a key/value pair of strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// `Labels` is a set of `Label`s ordered by name.
///
/// Labels sharing a name keep the order they were given in; rejecting them is
/// up to the producer of the set.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Labels(Vec<Arc<Label>>);

impl Labels {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut labels = labels
            .into_iter()
            .map(|(k, v)| {
                Arc::new(Label {
                    name: k.as_ref().to_owned(),
                    value: v.as_ref().to_owned(),
                })
            })
            .collect::<Vec<_>>();
        // stable, so duplicate names stay in input order
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        Self(labels)
    }

    /// Returns the value of the first label with given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        let index = self.0.partition_point(|label| label.name.as_str() < name);
        self.0
            .get(index)
            .filter(|label| label.name == name)
            .map(|label| label.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter().map(AsRef::as_ref)
    }

    /// Sets `name` to `value`, replacing every existing label of that name.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.0.retain(|label| label.name != name);
        let index = self.0.partition_point(|label| label.name.as_str() < name);
        self.0.insert(
            index,
            Arc::new(Label {
                name: name.to_owned(),
                value: value.to_owned(),
            }),
        );
    }

    /// Retains only the labels specified by the predicate.
    pub(crate) fn retain<P>(&mut self, mut predicate: P)
    where
        P: FnMut(&Label) -> bool,
    {
        self.0.retain(|label| predicate(label.as_ref()))
    }

    /// Returns the grouping key of this label set once the labels named in
    /// `exclude_names` are removed.
    pub fn group_key_without(&self, exclude_names: &LabelNames) -> GroupKey {
        let mut labels = self.clone();
        labels.retain(|label| !exclude_names.contains(&label.name));
        GroupKey(labels)
    }
}

/// Formats the set as a text exposition label block, `{a="1",b="2"}`.
/// An empty set formats as the empty string.
impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}=\"", label.name)?;
            for c in label.value.chars() {
                match c {
                    '\\' => f.write_str(r"\\")?,
                    '"' => f.write_str(r#"\""#)?,
                    '\n' => f.write_str(r"\n")?,
                    c => write!(f, "{c}")?,
                }
            }
            f.write_str("\"")?;
        }
        f.write_str("}")
    }
}

/// Identity of an aggregation group: the surviving labels, compared
/// structurally pair by pair.
///
/// The empty label set is a valid key and groups every series that had only
/// dropped labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey(Labels);

impl GroupKey {
    pub fn labels(&self) -> &Labels {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
pub(crate) fn names<const N: usize>(names: [&str; N]) -> LabelNames {
    names.into_iter().map(str::to_owned).collect()
}
