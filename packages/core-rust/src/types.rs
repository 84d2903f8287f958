//! Value and tuple aliases shared across the client.
//!
//! Field values travel the wire as `MsgPack`; [`rmpv::Value`] is the dynamic
//! value type on both the request path (condition operands, scan keys, proxy
//! call arguments) and the response path (returned rows). The condition model
//! and planner treat values as opaque — encoding and decoding belong to the
//! codec layer of the connection.

/// Dynamic field value, `MsgPack`-representable.
pub type FieldValue = rmpv::Value;

/// A row of a space: an ordered sequence of field values.
pub type Tuple = Vec<FieldValue>;
