//! Query planning: conditions to wire-level request shapes.
//!
//! Two entry points share one classification step. Conditions are
//! partitioned into index-scoped and field-scoped groups, resolved against a
//! [`SchemaSnapshot`], then turned into either:
//!
//! - a [`SelectRequest`] — a direct binary-protocol scan descriptor over a
//!   single index, with an iterator type and a composite key; or
//! - a [`ProxyQuery`] — a metadata-independent argument list for a select
//!   procedure running on a clustered proxy, where every condition travels
//!   as its own `[operator, name, value]` triple.
//!
//! The two modes select a "best" index differently on purpose: the direct
//! path wants the narrowest index whose parts are a superset of the filtered
//! fields (order-agnostic); the proxy path wants the highest-coverage index
//! but only counts indexes whose first part is among the filtered fields.
//! The algorithms are intentionally not unified — doing so would silently
//! change selection outcomes between modes. Ties are broken by lowest index
//! id, which makes selection deterministic regardless of map iteration
//! order.
//!
//! Planning is pure: it reads the snapshot, produces an owned descriptor,
//! and retains no reference to the [`Conditions`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conditions::{Condition, Conditions, FieldIdentifier, Operator};
use crate::schema::{FieldMetadata, IndexMetadata, SchemaSnapshot, SpaceMetadata};
use crate::types::{FieldValue, Tuple};

/// Conventional id of a space's primary index.
pub const PRIMARY_INDEX_ID: u32 = 0;

/// Iterator type of a direct scan request.
///
/// Codes follow the binary protocol; code 2 is the protocol's all-iterator,
/// which the planner expresses as an empty-key `Eq`/`Req` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IteratorType {
    /// Equality, ascending.
    Eq,
    /// Equality, descending (reverse-equal).
    Req,
    /// Strictly less than the key.
    Lt,
    /// Less than or equal to the key.
    Le,
    /// Greater than or equal to the key.
    Ge,
    /// Strictly greater than the key.
    Gt,
}

impl IteratorType {
    /// Numeric protocol code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Eq => 0,
            Self::Req => 1,
            Self::Lt => 3,
            Self::Le => 4,
            Self::Ge => 5,
            Self::Gt => 6,
        }
    }

    /// The iterator scanning the same key range in the opposite direction.
    ///
    /// An involution: reversing twice yields the original iterator.
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::Eq => Self::Req,
            Self::Req => Self::Eq,
            Self::Lt => Self::Gt,
            Self::Gt => Self::Lt,
            Self::Le => Self::Ge,
            Self::Ge => Self::Le,
        }
    }
}

impl From<Operator> for IteratorType {
    fn from(operator: Operator) -> Self {
        match operator {
            Operator::Eq => Self::Eq,
            Operator::Lt => Self::Lt,
            Operator::Le => Self::Le,
            Operator::Gt => Self::Gt,
            Operator::Ge => Self::Ge,
        }
    }
}

/// Direct binary-protocol scan descriptor.
///
/// Output of [`Conditions::to_select_request`]; consumed by the connection
/// layer, which owns framing and encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectRequest {
    /// Id of the space to scan.
    pub space_id: u32,
    /// Id of the index to scan.
    pub index_id: u32,
    /// Scan iterator.
    pub iterator: IteratorType,
    /// Composite key, one value per used index part.
    pub key: Vec<FieldValue>,
    /// Row cap; [`u32::MAX`] means unlimited.
    pub limit: u32,
    /// Rows to skip before the first returned one.
    pub offset: u32,
}

/// One `[operator, name, value]` filter triple of a proxy call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyCondition {
    /// Comparison operator.
    pub operator: Operator,
    /// Field or index name; id-based index references are normalized to the
    /// resolved name so the server needs no client-side metadata.
    pub name: String,
    /// Scalar operand for field conditions, array of key parts for index
    /// conditions.
    pub value: FieldValue,
}

impl ProxyCondition {
    /// The triple as a wire value.
    #[must_use]
    pub fn to_value(&self) -> FieldValue {
        FieldValue::Array(vec![
            self.operator.code().into(),
            self.name.as_str().into(),
            self.value.clone(),
        ])
    }
}

/// Metadata-independent query executable by a clustered proxy procedure.
///
/// Output of [`Conditions::to_proxy_query`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyQuery {
    /// Filter triples, in emission order.
    pub conditions: Vec<ProxyCondition>,
    /// Row cap; [`u32::MAX`] means unlimited.
    pub limit: u32,
    /// Exclusive pagination anchor, if any.
    pub after: Option<Tuple>,
    /// Whether the scan direction is reversed.
    pub descending: bool,
}

impl ProxyQuery {
    /// RPC argument list `[space, conditions, options]`.
    #[must_use]
    pub fn call_args(&self, space_name: &str) -> Vec<FieldValue> {
        let conditions =
            FieldValue::Array(self.conditions.iter().map(ProxyCondition::to_value).collect());
        let mut options: Vec<(FieldValue, FieldValue)> = Vec::new();
        if self.limit != u32::MAX {
            options.push(("first".into(), u64::from(self.limit).into()));
        }
        if let Some(after) = &self.after {
            options.push(("after".into(), FieldValue::Array(after.clone())));
        }
        if self.descending {
            options.push(("reverse".into(), true.into()));
        }
        vec![space_name.into(), conditions, FieldValue::Map(options)]
    }
}

/// Errors raised while turning conditions into a request shape.
///
/// Validation errors are permanent for a given input; nothing here is
/// retried. Lookup errors carry the offending name or position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Conditions reference two or more distinct indexes.
    #[error("filtering by more than one index is not supported")]
    MultipleIndexes,
    /// Direct mode: several conditions on the same index.
    #[error("only one condition per index is supported for index queries")]
    DuplicateIndexCondition,
    /// Direct mode: several conditions on the same field.
    #[error("only one condition per field is supported for index queries: '{field}'")]
    DuplicateFieldCondition {
        /// Name of the repeated field.
        field: String,
    },
    /// Direct mode: index-scoped and field-scoped conditions mixed.
    #[error("filtering by an index and by fields at the same time is not supported for index queries")]
    MixedConditions,
    /// Direct mode: field conditions use different operators.
    #[error("all field conditions must use the same operator")]
    OperatorMismatch,
    /// Direct mode: a pagination anchor is set.
    #[error("a pagination anchor is not supported for index queries")]
    AnchorNotSupported,
    /// Proxy mode: a non-zero offset is set.
    #[error("offset is not supported for proxy queries")]
    OffsetNotSupported,
    /// A name-based field identifier is empty.
    #[error("field name must not be empty")]
    EmptyFieldName,
    /// A name-based index identifier is empty.
    #[error("index name must not be empty")]
    EmptyIndexName,
    /// Unknown field name.
    #[error("field '{name}' not found in space '{space}'")]
    UnknownField {
        /// The unresolved field name.
        name: String,
        /// Space searched.
        space: String,
    },
    /// Unknown field position.
    #[error("field position {position} not found in space '{space}'")]
    UnknownFieldPosition {
        /// The unresolved tuple position.
        position: u32,
        /// Space searched.
        space: String,
    },
    /// Unknown index name.
    #[error("index '{name}' not found in space '{space}'")]
    UnknownIndex {
        /// The unresolved index name.
        name: String,
        /// Space searched.
        space: String,
    },
    /// Unknown index id.
    #[error("index with id {id} not found in space '{space}'")]
    UnknownIndexId {
        /// The unresolved index id.
        id: u32,
        /// Space searched.
        space: String,
    },
    /// Direct mode: no index whose parts cover every filtered field.
    #[error("no indexes that fit the passed fields {fields:?}")]
    NoSuitableIndex {
        /// Names of the filtered fields.
        fields: Vec<String>,
    },
    /// Proxy mode: no index whose first part is among the filtered fields.
    #[error("no index covering the passed fields {fields:?}")]
    NoCoveringIndex {
        /// Names of the filtered fields.
        fields: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Conditions grouped on one resolved index.
struct IndexGroup<'a> {
    index: &'a Arc<IndexMetadata>,
    conditions: Vec<&'a Condition>,
}

/// Conditions grouped on one resolved field.
struct FieldGroup<'a> {
    field: &'a FieldMetadata,
    conditions: Vec<&'a Condition>,
}

/// Result of partitioning a condition list.
///
/// Field groups keep first-appearance order, which the proxy planner uses
/// for fallback emission.
struct Classified<'a> {
    index: Option<IndexGroup<'a>>,
    fields: Vec<FieldGroup<'a>>,
}

impl Classified<'_> {
    fn field_names(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|group| group.field.name.clone())
            .collect()
    }

    fn field_positions(&self) -> Vec<u32> {
        self.fields.iter().map(|group| group.field.position).collect()
    }
}

fn attach_index<'a>(
    classified: &mut Classified<'a>,
    index: &'a Arc<IndexMetadata>,
    condition: &'a Condition,
) -> Result<(), PlanError> {
    match &mut classified.index {
        Some(group) => {
            if group.index.index_id() != index.index_id() {
                return Err(PlanError::MultipleIndexes);
            }
            group.conditions.push(condition);
        }
        None => {
            classified.index = Some(IndexGroup {
                index,
                conditions: vec![condition],
            });
        }
    }
    Ok(())
}

fn attach_field<'a>(
    classified: &mut Classified<'a>,
    field: &'a FieldMetadata,
    condition: &'a Condition,
) {
    match classified
        .fields
        .iter_mut()
        .find(|group| group.field.position == field.position)
    {
        Some(group) => group.conditions.push(condition),
        None => classified.fields.push(FieldGroup {
            field,
            conditions: vec![condition],
        }),
    }
}

/// Partitions conditions into one index group and per-field groups,
/// resolving every identifier. Referencing two distinct indexes is an error
/// in both planning modes.
fn classify<'a>(
    conditions: &'a [Condition],
    schema: &'a SchemaSnapshot,
    space: &'a SpaceMetadata,
) -> Result<Classified<'a>, PlanError> {
    let mut classified = Classified {
        index: None,
        fields: Vec::new(),
    };
    for condition in conditions {
        match condition.field() {
            FieldIdentifier::NamedIndex(name) => {
                if name.is_empty() {
                    return Err(PlanError::EmptyIndexName);
                }
                let index = schema.index_by_name(space.name(), name).ok_or_else(|| {
                    PlanError::UnknownIndex {
                        name: name.clone(),
                        space: space.name().to_string(),
                    }
                })?;
                attach_index(&mut classified, index, condition)?;
            }
            FieldIdentifier::IdIndex(id) => {
                let index = schema.index_by_id(space.space_id(), *id).ok_or_else(|| {
                    PlanError::UnknownIndexId {
                        id: *id,
                        space: space.name().to_string(),
                    }
                })?;
                attach_index(&mut classified, index, condition)?;
            }
            FieldIdentifier::NamedField(name) => {
                if name.is_empty() {
                    return Err(PlanError::EmptyFieldName);
                }
                let field = space.field_by_name(name).ok_or_else(|| PlanError::UnknownField {
                    name: name.clone(),
                    space: space.name().to_string(),
                })?;
                attach_field(&mut classified, field, condition);
            }
            FieldIdentifier::PositionField(position) => {
                let field = space.field_by_position(*position).ok_or_else(|| {
                    PlanError::UnknownFieldPosition {
                        position: *position,
                        space: space.name().to_string(),
                    }
                })?;
                attach_field(&mut classified, field, condition);
            }
        }
    }
    Ok(classified)
}

// ---------------------------------------------------------------------------
// Index selection
// ---------------------------------------------------------------------------

/// Direct mode: the narrowest index whose parts are a superset of the
/// selected positions, regardless of field order. Equal widths fall back to
/// the lowest index id so selection does not depend on map iteration order.
fn suitable_index<'a>(
    schema: &'a SchemaSnapshot,
    space: &SpaceMetadata,
    classified: &Classified<'_>,
) -> Result<&'a Arc<IndexMetadata>, PlanError> {
    let positions = classified.field_positions();
    let mut best: Option<&Arc<IndexMetadata>> = None;
    for index in schema.space_indexes(space.space_id()) {
        if !positions
            .iter()
            .all(|position| index.covers_position(*position))
        {
            continue;
        }
        best = Some(match best {
            None => index,
            Some(current) => {
                if index.part_count() == current.part_count() {
                    let kept = current.index_id().min(index.index_id());
                    debug!(
                        space = %space.name(),
                        kept,
                        "breaking suitable-index tie by lowest id"
                    );
                }
                if (index.part_count(), index.index_id())
                    < (current.part_count(), current.index_id())
                {
                    index
                } else {
                    current
                }
            }
        });
    }
    best.ok_or_else(|| PlanError::NoSuitableIndex {
        fields: classified.field_names(),
    })
}

/// Proxy mode: the index matching the most selected positions, counted only
/// when its first part (ordinal 0) is among them. Ties are broken by lowest
/// index id.
fn covering_index<'a>(
    schema: &'a SchemaSnapshot,
    space: &SpaceMetadata,
    classified: &Classified<'_>,
) -> Result<&'a Arc<IndexMetadata>, PlanError> {
    let positions = classified.field_positions();
    let mut best: Option<(&Arc<IndexMetadata>, usize)> = None;
    for index in schema.space_indexes(space.space_id()) {
        let Some(first) = index.parts().first() else {
            continue;
        };
        if !positions.contains(&first.field_position) {
            continue;
        }
        let score = index
            .parts()
            .iter()
            .filter(|part| positions.contains(&part.field_position))
            .count();
        best = Some(match best {
            None => (index, score),
            Some((current, current_score)) => {
                if score == current_score {
                    debug!(
                        space = %space.name(),
                        score,
                        "breaking covering-index tie by lowest id"
                    );
                }
                if (std::cmp::Reverse(score), index.index_id())
                    < (std::cmp::Reverse(current_score), current.index_id())
                {
                    (index, score)
                } else {
                    (current, current_score)
                }
            }
        });
    }
    best.map(|(index, _)| index)
        .ok_or_else(|| PlanError::NoCoveringIndex {
            fields: classified.field_names(),
        })
}

// ---------------------------------------------------------------------------
// Planning entry points
// ---------------------------------------------------------------------------

impl Conditions {
    /// Plans a direct scan over exactly one index.
    ///
    /// # Errors
    ///
    /// See [`PlanError`]: multiple indexes, duplicate conditions per index
    /// or field, mixed index/field filtering, a pagination anchor, operator
    /// mismatches, unresolved names/positions, or no suitable index.
    pub fn to_select_request(
        &self,
        schema: &SchemaSnapshot,
        space: &SpaceMetadata,
    ) -> Result<SelectRequest, PlanError> {
        if self.after().is_some() {
            return Err(PlanError::AnchorNotSupported);
        }
        let classified = classify(self.conditions(), schema, space)?;
        if classified.index.is_some() && !classified.fields.is_empty() {
            return Err(PlanError::MixedConditions);
        }

        if let Some(group) = &classified.index {
            if group.conditions.len() > 1 {
                return Err(PlanError::DuplicateIndexCondition);
            }
            let condition = group.conditions[0];
            return Ok(self.request(
                space,
                group.index.index_id(),
                condition.operator().into(),
                condition.value().key_parts(),
            ));
        }

        if !classified.fields.is_empty() {
            if let Some(group) = classified
                .fields
                .iter()
                .find(|group| group.conditions.len() > 1)
            {
                return Err(PlanError::DuplicateFieldCondition {
                    field: group.field.name.clone(),
                });
            }
            let operator = classified.fields[0].conditions[0].operator();
            if classified
                .fields
                .iter()
                .any(|group| group.conditions[0].operator() != operator)
            {
                return Err(PlanError::OperatorMismatch);
            }

            let index = suitable_index(schema, space, &classified)?;
            debug!(
                space = %space.name(),
                index = %index.name(),
                "selected suitable index for field conditions"
            );
            // Key sized to the index width; fields land at their part
            // ordinal, unmatched ordinals stay nil.
            let mut key = vec![FieldValue::Nil; index.part_count()];
            for group in &classified.fields {
                let ordinal = index
                    .part_ordinal(group.field.position)
                    .expect("suitable index covers every selected field");
                key[ordinal] = group.conditions[0].value().to_value();
            }
            return Ok(self.request(space, index.index_id(), operator.into(), key));
        }

        // No conditions at all: full scan over the primary index.
        Ok(self.request(space, PRIMARY_INDEX_ID, IteratorType::Eq, Vec::new()))
    }

    fn request(
        &self,
        space: &SpaceMetadata,
        index_id: u32,
        iterator: IteratorType,
        key: Vec<FieldValue>,
    ) -> SelectRequest {
        let iterator = if self.is_descending() {
            iterator.reverse()
        } else {
            iterator
        };
        SelectRequest {
            space_id: space.space_id(),
            index_id,
            iterator,
            key,
            limit: self.limit(),
            offset: self.offset(),
        }
    }

    /// Plans a proxy-procedure call.
    ///
    /// # Errors
    ///
    /// See [`PlanError`]: a non-zero offset, multiple indexes, unresolved
    /// names/positions, or no covering index for field-only filtering.
    pub fn to_proxy_query(
        &self,
        schema: &SchemaSnapshot,
        space: &SpaceMetadata,
    ) -> Result<ProxyQuery, PlanError> {
        if self.offset() != 0 {
            return Err(PlanError::OffsetNotSupported);
        }
        let classified = classify(self.conditions(), schema, space)?;
        let mut conditions = Vec::with_capacity(self.conditions().len());

        if let Some(group) = &classified.index {
            // Id-based references are normalized to the index name here, so
            // the emitted query needs no metadata on the server side.
            for condition in &group.conditions {
                conditions.push(ProxyCondition {
                    operator: condition.operator(),
                    name: group.index.name().to_string(),
                    value: condition.value().to_value(),
                });
            }
            for field_group in &classified.fields {
                push_field_conditions(&mut conditions, field_group);
            }
        } else if !classified.fields.is_empty() {
            let index = covering_index(schema, space, &classified)?;
            debug!(
                space = %space.name(),
                index = %index.name(),
                "selected covering index for proxy query"
            );
            // Covered fields first, in the index's part order; anything the
            // index does not cover follows in insertion order.
            let mut emitted = vec![false; classified.fields.len()];
            for part in index.parts() {
                if let Some(slot) = classified
                    .fields
                    .iter()
                    .position(|group| group.field.position == part.field_position)
                {
                    push_field_conditions(&mut conditions, &classified.fields[slot]);
                    emitted[slot] = true;
                }
            }
            for (slot, field_group) in classified.fields.iter().enumerate() {
                if !emitted[slot] {
                    push_field_conditions(&mut conditions, field_group);
                }
            }
        }

        Ok(ProxyQuery {
            conditions,
            limit: self.limit(),
            after: self.after().cloned(),
            descending: self.is_descending(),
        })
    }
}

fn push_field_conditions(out: &mut Vec<ProxyCondition>, group: &FieldGroup<'_>) {
    for condition in &group.conditions {
        out.push(ProxyCondition {
            operator: condition.operator(),
            name: group.field.name.clone(),
            value: condition.value().to_value(),
        });
    }
}
