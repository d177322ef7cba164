//! Source schema discovery.
//!
//! - [`SchemaIntrospector`]: builds the immutable [`SchemaModel`](crate::core::SchemaModel)
//!   from any [`SourceReader`](crate::core::SourceReader)

mod introspect;

pub use introspect::SchemaIntrospector;
