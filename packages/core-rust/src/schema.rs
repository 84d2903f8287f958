//! Schema metadata records for spaces and indexes.
//!
//! These types describe the server-side layout the planner resolves names
//! and positions against. A [`SchemaSnapshot`] bundles the four lookup maps
//! (spaces by name and id, indexes by space name and id) built from a single
//! metadata fetch; the cache replaces whole snapshots atomically, so every
//! type here is immutable after construction. Derived views — a space's
//! position list, an index's part-ordinal map — are built once in the
//! constructor and never mutated incrementally, keeping them consistent with
//! the primary view by construction.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

/// Metadata for a single field of a space's tuple format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMetadata {
    /// Field name, unique within the space.
    pub name: String,
    /// Server-side type name (e.g. `"unsigned"`, `"string"`).
    pub field_type: String,
    /// Zero-based position of the field in the tuple.
    pub position: u32,
    /// Whether the field may hold nil.
    pub is_nullable: bool,
}

impl FieldMetadata {
    /// Creates a field record. The position is normalized by
    /// [`SpaceMetadata::new`] to the field's slot in the format list.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: impl Into<String>, is_nullable: bool) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            position: 0,
            is_nullable,
        }
    }
}

/// Metadata for a space: identity plus its tuple format.
///
/// Field lookup is O(1) both by name (map) and by position (parallel list).
/// The two views are built together in [`SpaceMetadata::new`] and there are
/// no mutators, so they cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceMetadata {
    space_id: u32,
    owner_id: u32,
    name: String,
    fields: HashMap<String, FieldMetadata>,
    field_order: Vec<String>,
}

impl SpaceMetadata {
    /// Creates a space record from its format fields, in tuple order.
    ///
    /// Each field's `position` is overwritten with its slot in `fields`, so
    /// the name map and the position list always agree.
    #[must_use]
    pub fn new(space_id: u32, owner_id: u32, name: impl Into<String>, fields: Vec<FieldMetadata>) -> Self {
        let mut by_name = HashMap::with_capacity(fields.len());
        let mut field_order = Vec::with_capacity(fields.len());
        for (position, mut field) in fields.into_iter().enumerate() {
            field.position = u32::try_from(position).unwrap_or(u32::MAX);
            field_order.push(field.name.clone());
            by_name.insert(field.name.clone(), field);
        }
        Self {
            space_id,
            owner_id,
            name: name.into(),
            fields: by_name,
            field_order,
        }
    }

    /// Numeric space id.
    #[must_use]
    pub fn space_id(&self) -> u32 {
        self.space_id
    }

    /// Id of the user owning the space.
    #[must_use]
    pub fn owner_id(&self) -> u32 {
        self.owner_id
    }

    /// Space name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of fields in the tuple format.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.field_order.len()
    }

    /// Field lookup by name.
    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.get(name)
    }

    /// Field lookup by zero-based tuple position.
    #[must_use]
    pub fn field_by_position(&self, position: u32) -> Option<&FieldMetadata> {
        let name = self.field_order.get(position as usize)?;
        self.fields.get(name)
    }
}

/// One key part of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPartMetadata {
    /// Zero-based position of the indexed field in the tuple.
    pub field_position: u32,
    /// Server-side type name of the part.
    pub field_type: String,
    /// Optional JSON path into the field, for indexes over nested values.
    pub path: Option<String>,
}

impl IndexPartMetadata {
    /// Creates a part record without a path.
    #[must_use]
    pub fn new(field_position: u32, field_type: impl Into<String>) -> Self {
        Self {
            field_position,
            field_type: field_type.into(),
            path: None,
        }
    }
}

/// Metadata for an index of a space.
///
/// The `field_position → part ordinal` view is built once in
/// [`IndexMetadata::new`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    space_id: u32,
    index_id: u32,
    name: String,
    index_type: String,
    unique: bool,
    parts: Vec<IndexPartMetadata>,
    part_ordinals: HashMap<u32, usize>,
}

impl IndexMetadata {
    /// Creates an index record and its derived part-ordinal view.
    #[must_use]
    pub fn new(
        space_id: u32,
        index_id: u32,
        name: impl Into<String>,
        index_type: impl Into<String>,
        unique: bool,
        parts: Vec<IndexPartMetadata>,
    ) -> Self {
        let part_ordinals = parts
            .iter()
            .enumerate()
            .map(|(ordinal, part)| (part.field_position, ordinal))
            .collect();
        Self {
            space_id,
            index_id,
            name: name.into(),
            index_type: index_type.into(),
            unique,
            parts,
            part_ordinals,
        }
    }

    /// Id of the space this index belongs to.
    #[must_use]
    pub fn space_id(&self) -> u32 {
        self.space_id
    }

    /// Numeric index id; the primary index is conventionally 0.
    #[must_use]
    pub fn index_id(&self) -> u32 {
        self.index_id
    }

    /// Index name, unique within the space.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server-side index type name (e.g. `"tree"`, `"hash"`).
    #[must_use]
    pub fn index_type(&self) -> &str {
        &self.index_type
    }

    /// Whether the index enforces key uniqueness.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// The key parts, in key order.
    #[must_use]
    pub fn parts(&self) -> &[IndexPartMetadata] {
        &self.parts
    }

    /// Number of key parts.
    #[must_use]
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Ordinal of the part indexing the given tuple position, if any.
    #[must_use]
    pub fn part_ordinal(&self, field_position: u32) -> Option<usize> {
        self.part_ordinals.get(&field_position).copied()
    }

    /// Whether some part of this index covers the given tuple position.
    #[must_use]
    pub fn covers_position(&self, field_position: u32) -> bool {
        self.part_ordinals.contains_key(&field_position)
    }
}

/// Immutable snapshot of all spaces and indexes, as returned by one
/// metadata fetch.
///
/// Holds the four lookup maps the planner and cache read. The maps are
/// populated together in [`SchemaSnapshot::new`] and the snapshot is shared
/// as `Arc<SchemaSnapshot>`, so readers either see all of a refresh or none
/// of it.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    spaces_by_name: HashMap<String, Arc<SpaceMetadata>>,
    spaces_by_id: HashMap<u32, Arc<SpaceMetadata>>,
    indexes_by_space_name: HashMap<String, HashMap<String, Arc<IndexMetadata>>>,
    indexes_by_space_id: HashMap<u32, HashMap<String, Arc<IndexMetadata>>>,
}

impl SchemaSnapshot {
    /// Builds a snapshot from fetched space and index records.
    ///
    /// Indexes referencing a space id absent from `spaces` are dropped with
    /// a debug event; the snapshot never holds dangling references.
    #[must_use]
    pub fn new(spaces: Vec<SpaceMetadata>, indexes: Vec<IndexMetadata>) -> Self {
        let mut snapshot = Self::default();
        for space in spaces {
            let space = Arc::new(space);
            snapshot
                .spaces_by_name
                .insert(space.name().to_string(), Arc::clone(&space));
            snapshot.spaces_by_id.insert(space.space_id(), space);
        }
        for index in indexes {
            let Some(space) = snapshot.spaces_by_id.get(&index.space_id()) else {
                debug!(
                    index = %index.name(),
                    space_id = index.space_id(),
                    "dropping index of unknown space"
                );
                continue;
            };
            let space_name = space.name().to_string();
            let index = Arc::new(index);
            snapshot
                .indexes_by_space_name
                .entry(space_name)
                .or_default()
                .insert(index.name().to_string(), Arc::clone(&index));
            snapshot
                .indexes_by_space_id
                .entry(index.space_id())
                .or_default()
                .insert(index.name().to_string(), index);
        }
        snapshot
    }

    /// Space lookup by name.
    #[must_use]
    pub fn space_by_name(&self, name: &str) -> Option<&Arc<SpaceMetadata>> {
        self.spaces_by_name.get(name)
    }

    /// Space lookup by id.
    #[must_use]
    pub fn space_by_id(&self, space_id: u32) -> Option<&Arc<SpaceMetadata>> {
        self.spaces_by_id.get(&space_id)
    }

    /// Index lookup by space name and index name.
    #[must_use]
    pub fn index_by_name(&self, space_name: &str, index_name: &str) -> Option<&Arc<IndexMetadata>> {
        self.indexes_by_space_name.get(space_name)?.get(index_name)
    }

    /// Index lookup by space id and index id.
    ///
    /// Linear in the number of indexes of the space; spaces carry a handful
    /// of indexes, and the per-space maps are keyed by name.
    #[must_use]
    pub fn index_by_id(&self, space_id: u32, index_id: u32) -> Option<&Arc<IndexMetadata>> {
        self.indexes_by_space_id
            .get(&space_id)?
            .values()
            .find(|index| index.index_id() == index_id)
    }

    /// All indexes of a space, in unspecified order.
    pub fn space_indexes(&self, space_id: u32) -> impl Iterator<Item = &Arc<IndexMetadata>> {
        self.indexes_by_space_id
            .get(&space_id)
            .into_iter()
            .flat_map(HashMap::values)
    }

    /// Number of spaces in the snapshot.
    #[must_use]
    pub fn space_count(&self) -> usize {
        self.spaces_by_id.len()
    }

    /// Whether the snapshot holds no spaces at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spaces_by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_space() -> SpaceMetadata {
        SpaceMetadata::new(
            512,
            1,
            "users",
            vec![
                FieldMetadata::new("id", "unsigned", false),
                FieldMetadata::new("age", "unsigned", true),
                FieldMetadata::new("name", "string", true),
            ],
        )
    }

    // ---- SpaceMetadata ----

    #[test]
    fn space_field_views_agree() {
        let space = users_space();
        assert_eq!(space.field_count(), 3);
        for position in 0..3u32 {
            let by_position = space.field_by_position(position).unwrap();
            let by_name = space.field_by_name(&by_position.name).unwrap();
            assert_eq!(by_position, by_name);
            assert_eq!(by_position.position, position);
        }
    }

    #[test]
    fn space_positions_are_normalized() {
        // Constructor positions win over whatever the records carried.
        let mut shuffled = FieldMetadata::new("only", "string", false);
        shuffled.position = 17;
        let space = SpaceMetadata::new(1, 1, "s", vec![shuffled]);
        assert_eq!(space.field_by_name("only").unwrap().position, 0);
    }

    #[test]
    fn space_unknown_lookups_return_none() {
        let space = users_space();
        assert!(space.field_by_name("missing").is_none());
        assert!(space.field_by_position(3).is_none());
    }

    // ---- IndexMetadata ----

    #[test]
    fn index_part_ordinals_follow_part_order() {
        let index = IndexMetadata::new(
            512,
            1,
            "age_name",
            "tree",
            false,
            vec![
                IndexPartMetadata::new(1, "unsigned"),
                IndexPartMetadata::new(2, "string"),
            ],
        );
        assert_eq!(index.part_count(), 2);
        assert_eq!(index.part_ordinal(1), Some(0));
        assert_eq!(index.part_ordinal(2), Some(1));
        assert_eq!(index.part_ordinal(0), None);
        assert!(index.covers_position(2));
        assert!(!index.covers_position(0));
    }

    // ---- SchemaSnapshot ----

    #[test]
    fn snapshot_serves_all_four_lookups() {
        let primary = IndexMetadata::new(
            512,
            0,
            "primary",
            "tree",
            true,
            vec![IndexPartMetadata::new(0, "unsigned")],
        );
        let snapshot = SchemaSnapshot::new(vec![users_space()], vec![primary]);

        assert_eq!(snapshot.space_count(), 1);
        assert!(!snapshot.is_empty());
        assert_eq!(snapshot.space_by_name("users").unwrap().space_id(), 512);
        assert_eq!(snapshot.space_by_id(512).unwrap().name(), "users");
        assert_eq!(
            snapshot.index_by_name("users", "primary").unwrap().index_id(),
            0
        );
        assert_eq!(snapshot.index_by_id(512, 0).unwrap().name(), "primary");
        assert_eq!(snapshot.space_indexes(512).count(), 1);
    }

    #[test]
    fn snapshot_drops_orphan_indexes() {
        let orphan = IndexMetadata::new(
            999,
            0,
            "primary",
            "tree",
            true,
            vec![IndexPartMetadata::new(0, "unsigned")],
        );
        let snapshot = SchemaSnapshot::new(vec![users_space()], vec![orphan]);
        assert!(snapshot.index_by_name("users", "primary").is_none());
        assert_eq!(snapshot.space_indexes(999).count(), 0);
    }

    #[test]
    fn empty_snapshot_is_empty() {
        let snapshot = SchemaSnapshot::default();
        assert!(snapshot.is_empty());
        assert!(snapshot.space_by_name("users").is_none());
    }
}
