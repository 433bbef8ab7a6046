//! Record model for the classification register
//!
//! - [`ListingEntry`]: a stub row from a listing table
//! - [`ClassificationRecord`]: a fully enriched record keyed by [`Field`]

mod field;

pub use field::{canonical_key, Field};

use std::collections::BTreeMap;

/// A row of a listing table: the title and the opaque detail page id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub title: String,
    pub detail_id: String,
}

/// A classification record assembled from a listing row and its detail page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationRecord {
    fields: BTreeMap<Field, String>,
}

impl ClassificationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a record from a listing row
    pub fn from_entry(entry: &ListingEntry) -> Self {
        let mut record = Self::new();
        record.insert(Field::Title, entry.title.clone());
        record.insert(Field::DetailId, entry.detail_id.clone());
        record
    }

    /// Sets a field, replacing any earlier value
    pub fn insert(&mut self, field: Field, value: impl Into<String>) -> Option<String> {
        self.fields.insert(field, value.into())
    }

    pub fn get(&self, field: &Field) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Looks up a field by canonical key
    pub fn get_key(&self, key: &str) -> Option<&str> {
        self.get(&Field::from_key(key))
    }

    pub fn title(&self) -> &str {
        self.get(&Field::Title).unwrap_or_default()
    }

    pub fn detail_id(&self) -> &str {
        self.get(&Field::DetailId).unwrap_or_default()
    }

    /// Merges detail-page fields; they win over listing fields of the same key
    pub fn merge(&mut self, fields: impl IntoIterator<Item = (Field, String)>) {
        self.fields.extend(fields);
    }

    /// Fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (&Field, &str)> {
        self.fields.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn into_fields(self) -> impl Iterator<Item = (Field, String)> {
        self.fields.into_iter()
    }

    /// Fields whose labels are not on the allow-list
    pub fn extensions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().filter_map(|(k, v)| match k {
            Field::Other(key) => Some((key.as_str(), v.as_str())),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Applies `f` to every value, keeping the record only if all succeed
    pub fn try_map_values<E>(
        self,
        mut f: impl FnMut(&Field, &str) -> Result<String, E>,
    ) -> Result<Self, (Field, E)> {
        let mut fields = BTreeMap::new();
        for (field, value) in self.fields {
            match f(&field, &value) {
                Ok(mapped) => {
                    fields.insert(field, mapped);
                }
                Err(e) => return Err((field, e)),
            }
        }
        Ok(Self { fields })
    }
}
