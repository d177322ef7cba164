//! SQL value types carried from the source cursor to the literal encoder.
//!
//! Values mirror SQLite's five storage classes. The column's declared type has
//! no bearing on what the cursor hands back, so every value is re-examined
//! against the target type during coercion.

use std::borrow::Cow;

/// A single SQLite value.
///
/// Uses `Cow` for string and byte data so readers can hand out borrowed slices
/// and convert to owned values only when crossing a channel.
///
/// # Example
///
/// ```rust
/// use std::borrow::Cow;
/// use sqlite_mysql_migrate::core::SqlValue;
///
/// let borrowed: SqlValue<'_> = SqlValue::Text(Cow::Borrowed("hello"));
/// let owned: SqlValue<'static> = borrowed.into_owned();
/// assert_eq!(owned.storage_class(), "text");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    /// NULL.
    Null,

    /// 64-bit signed integer.
    Integer(i64),

    /// 64-bit IEEE float.
    Real(f64),

    /// UTF-8 text.
    Text(Cow<'a, str>),

    /// Binary data. Text values that are not valid UTF-8 also land here.
    Bytes(Cow<'a, [u8]>),
}

impl<'a> SqlValue<'a> {
    /// Convert to a fully owned value with `'static` lifetime.
    #[must_use]
    pub fn into_owned(self) -> SqlValue<'static> {
        match self {
            SqlValue::Null => SqlValue::Null,
            SqlValue::Integer(v) => SqlValue::Integer(v),
            SqlValue::Real(v) => SqlValue::Real(v),
            SqlValue::Text(v) => SqlValue::Text(Cow::Owned(v.into_owned())),
            SqlValue::Bytes(v) => SqlValue::Bytes(Cow::Owned(v.into_owned())),
        }
    }

    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// SQLite `typeof()` name of the value.
    #[must_use]
    pub fn storage_class(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "blob",
        }
    }

    /// Byte length of text or blob payloads.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        match self {
            SqlValue::Text(s) => s.len(),
            SqlValue::Bytes(b) => b.len(),
            _ => 0,
        }
    }

    /// Render the value as a blob-path key component.
    pub fn key_text(&self) -> Cow<'_, str> {
        match self {
            SqlValue::Null => Cow::Borrowed("~null"),
            SqlValue::Integer(v) => Cow::Owned(v.to_string()),
            SqlValue::Real(v) => Cow::Owned(v.to_string()),
            SqlValue::Text(s) => Cow::Borrowed(s.as_ref()),
            SqlValue::Bytes(b) => Cow::Owned(hex::encode(b)),
        }
    }
}

// Convenience constructors for common cases
impl<'a> SqlValue<'a> {
    /// Create a text value from an owned String.
    #[must_use]
    pub fn text_owned(s: String) -> SqlValue<'static> {
        SqlValue::Text(Cow::Owned(s))
    }

    /// Create a bytes value from an owned Vec<u8>.
    #[must_use]
    pub fn bytes_owned(b: Vec<u8>) -> SqlValue<'static> {
        SqlValue::Bytes(Cow::Owned(b))
    }
}

impl From<i64> for SqlValue<'static> {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue<'static> {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<String> for SqlValue<'static> {
    fn from(v: String) -> Self {
        SqlValue::Text(Cow::Owned(v))
    }
}

impl<'a> From<&'a str> for SqlValue<'a> {
    fn from(v: &'a str) -> Self {
        SqlValue::Text(Cow::Borrowed(v))
    }
}

impl From<Vec<u8>> for SqlValue<'static> {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(Cow::Owned(v))
    }
}

impl<'a> From<&'a [u8]> for SqlValue<'a> {
    fn from(v: &'a [u8]) -> Self {
        SqlValue::Bytes(Cow::Borrowed(v))
    }
}

impl<T> From<Option<T>> for SqlValue<'static>
where
    T: Into<SqlValue<'static>>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// A batch of rows for streaming transfer.
///
/// Moves through a bounded channel from the cursor task to the table worker,
/// so a slow consumer applies backpressure to the reader.
#[derive(Debug)]
pub struct Batch {
    /// Rows in this batch (owned for channel transfer).
    pub rows: Vec<Vec<SqlValue<'static>>>,

    /// Whether this is the final batch for the table.
    pub is_last: bool,
}

impl Batch {
    /// Create a new batch with the given rows.
    pub fn new(rows: Vec<Vec<SqlValue<'static>>>) -> Self {
        Self {
            rows,
            is_last: false,
        }
    }

    /// Create an empty final batch.
    pub fn empty_final() -> Self {
        Self {
            rows: Vec::new(),
            is_last: true,
        }
    }

    /// Mark this as the final batch.
    pub fn mark_final(mut self) -> Self {
        self.is_last = true;
        self
    }

    /// Get the number of rows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
