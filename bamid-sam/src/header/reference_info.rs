use indexmap::IndexMap;

/// The reference id ↔ `(name, length)` table, in insertion order.
///
/// For a BAM file this is populated from the binary reference table; for a SAM file it is
/// generated from the `@SQ` records.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReferenceInfo {
    entries: IndexMap<String, i32>,
}

impl ReferenceInfo {
    /// Appends a reference, returning `false` when the name is already present.
    pub fn add(&mut self, name: &str, length: i32) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }

        self.entries.insert(name.into(), length);

        true
    }

    /// Returns the id of the reference with the given name.
    pub fn id(&self, name: &str) -> Option<usize> {
        self.entries.get_index_of(name)
    }

    /// Returns the name of the reference with the given id.
    pub fn name(&self, id: usize) -> Option<&str> {
        self.entries.get_index(id).map(|(name, _)| name.as_str())
    }

    /// Returns the length of the reference with the given id.
    pub fn length(&self, id: usize) -> Option<i32> {
        self.entries.get_index(id).map(|(_, length)| *length)
    }

    /// Returns the number of references.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether there are any references.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over `(name, length)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.entries.iter().map(|(name, length)| (name.as_str(), *length))
    }

    /// Removes all references.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
