//! Declarative filter conditions for space queries.
//!
//! [`Conditions`] is the value a caller builds up and hands to the query
//! planner. Named factories (`equals`, `greater_than`, `index_equals`, …)
//! return a fresh instance; the `and_*` and `with_*` families consume and
//! return the value, so a base `Conditions` is never shared mutably with a
//! derived one. Cursors rely on this: they clone the caller's conditions for
//! every batch and adjust limit, offset, or anchor without touching the
//! original.
//!
//! Individual [`Condition`]s are immutable once constructed. Index-scoped
//! conditions carry a list of key-part values; field-scoped conditions carry
//! a single scalar.

use crate::types::{FieldValue, Tuple};

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equality.
    Eq,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl Operator {
    /// Wire code used in proxy-call condition triples.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Identifies what a condition filters on: a plain field or an index,
/// addressed by name or by number.
///
/// Each variant resolves against a schema snapshot during planning. Numeric
/// variants are non-negative by construction (`u32`); name variants must be
/// non-empty, which the planner checks at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldIdentifier {
    /// A plain field addressed by name.
    NamedField(String),
    /// A plain field addressed by its zero-based position in the tuple.
    PositionField(u32),
    /// An index addressed by name.
    NamedIndex(String),
    /// An index addressed by its numeric id.
    IdIndex(u32),
}

impl FieldIdentifier {
    /// Whether this identifier addresses an index rather than a plain field.
    #[must_use]
    pub fn is_index(&self) -> bool {
        matches!(self, Self::NamedIndex(_) | Self::IdIndex(_))
    }

    /// Re-tags a field-flavored identifier as its index-flavored counterpart.
    ///
    /// The index factories accept the same `Into<FieldIdentifier>` inputs as
    /// the field factories (strings and positions), so they re-tag here.
    fn into_index(self) -> Self {
        match self {
            Self::NamedField(name) | Self::NamedIndex(name) => Self::NamedIndex(name),
            Self::PositionField(id) | Self::IdIndex(id) => Self::IdIndex(id),
        }
    }
}

impl From<&str> for FieldIdentifier {
    fn from(name: &str) -> Self {
        Self::NamedField(name.to_string())
    }
}

impl From<String> for FieldIdentifier {
    fn from(name: String) -> Self {
        Self::NamedField(name)
    }
}

impl From<u32> for FieldIdentifier {
    fn from(position: u32) -> Self {
        Self::PositionField(position)
    }
}

/// Operand of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    /// A single value compared against one field.
    Scalar(FieldValue),
    /// An ordered list of key-part values compared against an index key.
    Key(Vec<FieldValue>),
}

impl ConditionValue {
    /// The operand as a scan key: a scalar becomes a one-part key.
    #[must_use]
    pub fn key_parts(&self) -> Vec<FieldValue> {
        match self {
            Self::Scalar(value) => vec![value.clone()],
            Self::Key(parts) => parts.clone(),
        }
    }

    /// The operand as a single wire value: a key becomes an array.
    #[must_use]
    pub fn to_value(&self) -> FieldValue {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Key(parts) => FieldValue::Array(parts.clone()),
        }
    }
}

/// A single immutable predicate: `field <operator> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    operator: Operator,
    field: FieldIdentifier,
    value: ConditionValue,
}

impl Condition {
    /// Creates a condition. Prefer the [`Conditions`] factories.
    #[must_use]
    pub fn new(operator: Operator, field: FieldIdentifier, value: ConditionValue) -> Self {
        Self {
            operator,
            field,
            value,
        }
    }

    /// The comparison operator.
    #[must_use]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// What the condition filters on.
    #[must_use]
    pub fn field(&self) -> &FieldIdentifier {
        &self.field
    }

    /// The operand.
    #[must_use]
    pub fn value(&self) -> &ConditionValue {
        &self.value
    }
}

/// Ordered collection of conditions plus result-set controls.
///
/// Insertion order of conditions is kept for readability and for the proxy
/// planner's fallback emission order; it does not change direct-mode
/// semantics. `limit` defaults to [`u32::MAX`], meaning "unlimited";
/// `offset` defaults to 0. The pagination anchor (`after`) and `offset`
/// belong to two different execution modes and are only checked for
/// compatibility at planning time.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    conditions: Vec<Condition>,
    descending: bool,
    limit: u32,
    offset: u32,
    after: Option<Tuple>,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            descending: false,
            limit: u32::MAX,
            offset: 0,
            after: None,
        }
    }
}

impl Conditions {
    /// Matches everything: no conditions, unlimited, ascending.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    fn with(operator: Operator, field: FieldIdentifier, value: ConditionValue) -> Self {
        Self::any().and(operator, field, value)
    }

    fn and(mut self, operator: Operator, field: FieldIdentifier, value: ConditionValue) -> Self {
        self.conditions.push(Condition::new(operator, field, value));
        self
    }

    // ---- field-scoped factories ----

    /// `field = value`.
    #[must_use]
    pub fn equals(field: impl Into<FieldIdentifier>, value: impl Into<FieldValue>) -> Self {
        Self::with(Operator::Eq, field.into(), ConditionValue::Scalar(value.into()))
    }

    /// `field > value`.
    #[must_use]
    pub fn greater_than(field: impl Into<FieldIdentifier>, value: impl Into<FieldValue>) -> Self {
        Self::with(Operator::Gt, field.into(), ConditionValue::Scalar(value.into()))
    }

    /// `field >= value`.
    #[must_use]
    pub fn greater_or_equals(
        field: impl Into<FieldIdentifier>,
        value: impl Into<FieldValue>,
    ) -> Self {
        Self::with(Operator::Ge, field.into(), ConditionValue::Scalar(value.into()))
    }

    /// `field < value`.
    #[must_use]
    pub fn less_than(field: impl Into<FieldIdentifier>, value: impl Into<FieldValue>) -> Self {
        Self::with(Operator::Lt, field.into(), ConditionValue::Scalar(value.into()))
    }

    /// `field <= value`.
    #[must_use]
    pub fn less_or_equals(field: impl Into<FieldIdentifier>, value: impl Into<FieldValue>) -> Self {
        Self::with(Operator::Le, field.into(), ConditionValue::Scalar(value.into()))
    }

    // ---- index-scoped factories ----

    /// `index = key`.
    #[must_use]
    pub fn index_equals(index: impl Into<FieldIdentifier>, key: Vec<FieldValue>) -> Self {
        Self::with(
            Operator::Eq,
            index.into().into_index(),
            ConditionValue::Key(key),
        )
    }

    /// `index > key`.
    #[must_use]
    pub fn index_greater_than(index: impl Into<FieldIdentifier>, key: Vec<FieldValue>) -> Self {
        Self::with(
            Operator::Gt,
            index.into().into_index(),
            ConditionValue::Key(key),
        )
    }

    /// `index >= key`.
    #[must_use]
    pub fn index_greater_or_equals(
        index: impl Into<FieldIdentifier>,
        key: Vec<FieldValue>,
    ) -> Self {
        Self::with(
            Operator::Ge,
            index.into().into_index(),
            ConditionValue::Key(key),
        )
    }

    /// `index < key`.
    #[must_use]
    pub fn index_less_than(index: impl Into<FieldIdentifier>, key: Vec<FieldValue>) -> Self {
        Self::with(
            Operator::Lt,
            index.into().into_index(),
            ConditionValue::Key(key),
        )
    }

    /// `index <= key`.
    #[must_use]
    pub fn index_less_or_equals(index: impl Into<FieldIdentifier>, key: Vec<FieldValue>) -> Self {
        Self::with(
            Operator::Le,
            index.into().into_index(),
            ConditionValue::Key(key),
        )
    }

    // ---- chainable and_* family ----

    /// Adds `field = value`.
    #[must_use]
    pub fn and_equals(self, field: impl Into<FieldIdentifier>, value: impl Into<FieldValue>) -> Self {
        self.and(Operator::Eq, field.into(), ConditionValue::Scalar(value.into()))
    }

    /// Adds `field > value`.
    #[must_use]
    pub fn and_greater_than(
        self,
        field: impl Into<FieldIdentifier>,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.and(Operator::Gt, field.into(), ConditionValue::Scalar(value.into()))
    }

    /// Adds `field >= value`.
    #[must_use]
    pub fn and_greater_or_equals(
        self,
        field: impl Into<FieldIdentifier>,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.and(Operator::Ge, field.into(), ConditionValue::Scalar(value.into()))
    }

    /// Adds `field < value`.
    #[must_use]
    pub fn and_less_than(
        self,
        field: impl Into<FieldIdentifier>,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.and(Operator::Lt, field.into(), ConditionValue::Scalar(value.into()))
    }

    /// Adds `field <= value`.
    #[must_use]
    pub fn and_less_or_equals(
        self,
        field: impl Into<FieldIdentifier>,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.and(Operator::Le, field.into(), ConditionValue::Scalar(value.into()))
    }

    /// Adds `index = key`.
    #[must_use]
    pub fn and_index_equals(self, index: impl Into<FieldIdentifier>, key: Vec<FieldValue>) -> Self {
        self.and(
            Operator::Eq,
            index.into().into_index(),
            ConditionValue::Key(key),
        )
    }

    /// Adds `index > key`.
    #[must_use]
    pub fn and_index_greater_than(
        self,
        index: impl Into<FieldIdentifier>,
        key: Vec<FieldValue>,
    ) -> Self {
        self.and(
            Operator::Gt,
            index.into().into_index(),
            ConditionValue::Key(key),
        )
    }

    /// Adds `index >= key`.
    #[must_use]
    pub fn and_index_greater_or_equals(
        self,
        index: impl Into<FieldIdentifier>,
        key: Vec<FieldValue>,
    ) -> Self {
        self.and(
            Operator::Ge,
            index.into().into_index(),
            ConditionValue::Key(key),
        )
    }

    /// Adds `index < key`.
    #[must_use]
    pub fn and_index_less_than(
        self,
        index: impl Into<FieldIdentifier>,
        key: Vec<FieldValue>,
    ) -> Self {
        self.and(
            Operator::Lt,
            index.into().into_index(),
            ConditionValue::Key(key),
        )
    }

    /// Adds `index <= key`.
    #[must_use]
    pub fn and_index_less_or_equals(
        self,
        index: impl Into<FieldIdentifier>,
        key: Vec<FieldValue>,
    ) -> Self {
        self.and(
            Operator::Le,
            index.into().into_index(),
            ConditionValue::Key(key),
        )
    }

    // ---- result-set controls ----

    /// Caps the number of returned rows. [`u32::MAX`] means unlimited.
    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Skips the first `offset` rows. Direct-mode only; the proxy planner
    /// rejects a non-zero offset.
    #[must_use]
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Reverses the scan direction.
    #[must_use]
    pub fn with_descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Starts strictly after the given tuple (exclusive pagination anchor).
    /// Proxy-mode only; the direct planner rejects an anchor.
    #[must_use]
    pub fn start_after(mut self, tuple: Tuple) -> Self {
        self.after = Some(tuple);
        self
    }

    // ---- accessors ----

    /// The conditions in insertion order.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Row cap; [`u32::MAX`] means unlimited.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Rows to skip before the first returned one.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Whether the scan direction is reversed.
    #[must_use]
    pub fn is_descending(&self) -> bool {
        self.descending
    }

    /// The exclusive pagination anchor, if set.
    #[must_use]
    pub fn after(&self) -> Option<&Tuple> {
        self.after.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- defaults ----

    #[test]
    fn any_has_no_conditions_and_open_limits() {
        let conditions = Conditions::any();
        assert!(conditions.conditions().is_empty());
        assert_eq!(conditions.limit(), u32::MAX);
        assert_eq!(conditions.offset(), 0);
        assert!(!conditions.is_descending());
        assert!(conditions.after().is_none());
    }

    // ---- factories ----

    #[test]
    fn equals_stores_named_field_and_scalar() {
        let conditions = Conditions::equals("id", 5);
        assert_eq!(conditions.conditions().len(), 1);
        let condition = &conditions.conditions()[0];
        assert_eq!(condition.operator(), Operator::Eq);
        assert_eq!(
            condition.field(),
            &FieldIdentifier::NamedField("id".to_string())
        );
        assert_eq!(
            condition.value(),
            &ConditionValue::Scalar(FieldValue::from(5))
        );
    }

    #[test]
    fn position_input_becomes_position_field() {
        let conditions = Conditions::greater_than(2u32, "m");
        assert_eq!(
            conditions.conditions()[0].field(),
            &FieldIdentifier::PositionField(2)
        );
        assert_eq!(conditions.conditions()[0].operator(), Operator::Gt);
    }

    #[test]
    fn index_factories_retag_identifiers() {
        let by_name = Conditions::index_equals("primary", vec![FieldValue::from(1)]);
        assert_eq!(
            by_name.conditions()[0].field(),
            &FieldIdentifier::NamedIndex("primary".to_string())
        );

        let by_id = Conditions::index_less_than(0u32, vec![FieldValue::from(9)]);
        assert_eq!(by_id.conditions()[0].field(), &FieldIdentifier::IdIndex(0));
        assert_eq!(by_id.conditions()[0].operator(), Operator::Lt);
        assert!(by_id.conditions()[0].field().is_index());
        assert!(!FieldIdentifier::NamedField("id".to_string()).is_index());
    }

    #[test]
    fn and_family_preserves_insertion_order() {
        let conditions = Conditions::equals("age", 30)
            .and_equals("name", "x")
            .and_greater_or_equals("age", 18);
        let fields: Vec<_> = conditions
            .conditions()
            .iter()
            .map(Condition::field)
            .collect();
        assert_eq!(
            fields,
            vec![
                &FieldIdentifier::NamedField("age".to_string()),
                &FieldIdentifier::NamedField("name".to_string()),
                &FieldIdentifier::NamedField("age".to_string()),
            ]
        );
    }

    // ---- value independence ----

    #[test]
    fn derived_conditions_do_not_mutate_the_base() {
        let base = Conditions::equals("id", 1);
        let derived = base.clone().with_limit(10).and_equals("name", "x");

        assert_eq!(base.conditions().len(), 1);
        assert_eq!(base.limit(), u32::MAX);
        assert_eq!(derived.conditions().len(), 2);
        assert_eq!(derived.limit(), 10);
    }

    // ---- controls ----

    #[test]
    fn controls_round_trip() {
        let conditions = Conditions::any()
            .with_limit(7)
            .with_offset(3)
            .with_descending()
            .start_after(vec![FieldValue::from(42)]);
        assert_eq!(conditions.limit(), 7);
        assert_eq!(conditions.offset(), 3);
        assert!(conditions.is_descending());
        assert_eq!(conditions.after(), Some(&vec![FieldValue::from(42)]));
    }

    // ---- operator codes ----

    #[test]
    fn operator_wire_codes() {
        assert_eq!(Operator::Eq.code(), "=");
        assert_eq!(Operator::Lt.code(), "<");
        assert_eq!(Operator::Le.code(), "<=");
        assert_eq!(Operator::Gt.code(), ">");
        assert_eq!(Operator::Ge.code(), ">=");
    }

    #[test]
    fn condition_value_key_parts_wraps_scalars() {
        let scalar = ConditionValue::Scalar(FieldValue::from("a"));
        assert_eq!(scalar.key_parts(), vec![FieldValue::from("a")]);

        let key = ConditionValue::Key(vec![FieldValue::from(1), FieldValue::from(2)]);
        assert_eq!(
            key.key_parts(),
            vec![FieldValue::from(1), FieldValue::from(2)]
        );
        assert_eq!(
            key.to_value(),
            FieldValue::Array(vec![FieldValue::from(1), FieldValue::from(2)])
        );
    }
}
