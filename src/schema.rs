//! Tablet schemas and read projections.

use crate::error::{Error, Result};
use crate::types::{Datum, PrimitiveType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Default number of rows covered by one short-key index entry.
pub const DEFAULT_NUM_ROWS_PER_BLOCK: usize = 1024;

fn default_true() -> bool {
    true
}

fn default_rows_per_block() -> usize {
    DEFAULT_NUM_ROWS_PER_BLOCK
}

/// One column of a tablet schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabletColumn {
    /// Identity that survives renames and reorderings; segment footers refer
    /// to columns by it.
    pub unique_id: u32,
    /// Column name.
    pub name: String,
    /// Column type.
    pub field_type: PrimitiveType,
    /// Part of the sort key.
    #[serde(default)]
    pub is_key: bool,
    /// Admits null.
    #[serde(default = "default_true")]
    pub is_nullable: bool,
    /// Default value in textual form, used for segments written before the
    /// column existed.
    #[serde(default)]
    pub default_value: Option<String>,
    /// Segments carry a bitmap index for this column.
    #[serde(default)]
    pub has_bitmap_index: bool,
}

impl TabletColumn {
    /// A nullable value column without default.
    pub fn new(unique_id: u32, name: impl Into<String>, field_type: PrimitiveType) -> Self {
        Self {
            unique_id,
            name: name.into(),
            field_type,
            is_key: false,
            is_nullable: true,
            default_value: None,
            has_bitmap_index: false,
        }
    }

    /// Marks the column as a non-nullable key column.
    pub fn key(mut self) -> Self {
        self.is_key = true;
        self.is_nullable = false;
        self
    }

    /// Sets nullability.
    pub fn nullable(mut self, is_nullable: bool) -> Self {
        self.is_nullable = is_nullable;
        self
    }

    /// Sets the default value.
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Requests a bitmap index.
    pub fn bitmap_index(mut self) -> Self {
        self.has_bitmap_index = true;
        self
    }

    /// Parses the default value.
    pub fn parsed_default(&self) -> Result<Option<Datum>> {
        self.default_value
            .as_deref()
            .map(|text| Datum::parse(self.field_type, text))
            .transpose()
    }
}

/// The full column list of a tablet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabletSchema {
    columns: Vec<TabletColumn>,
    num_short_key_columns: usize,
    #[serde(default = "default_rows_per_block")]
    num_rows_per_block: usize,
}

impl TabletSchema {
    /// Creates a schema. Key columns must form a prefix of `columns`, unique
    /// ids must be distinct, and the short key is a prefix of the key.
    pub fn new(columns: Vec<TabletColumn>, num_short_key_columns: usize) -> Result<Self> {
        let schema = Self { columns, num_short_key_columns, num_rows_per_block: DEFAULT_NUM_ROWS_PER_BLOCK };
        schema.validate()?;
        Ok(schema)
    }

    /// Loads a schema from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: TabletSchema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Serialises the schema to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Sets the short-key index granularity.
    pub fn with_num_rows_per_block(mut self, rows: usize) -> Result<Self> {
        if rows == 0 {
            return Err(Error::invalid_argument("num_rows_per_block must be > 0"));
        }
        self.num_rows_per_block = rows;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let num_keys = self.num_key_columns();
        if self.columns[..num_keys].iter().any(|c| !c.is_key)
            || self.columns[num_keys..].iter().any(|c| c.is_key)
        {
            return Err(Error::invalid_argument("key columns must precede value columns"));
        }
        if self.num_short_key_columns > num_keys {
            return Err(Error::invalid_argument(format!(
                "num_short_key_columns {} exceeds key column count {}",
                self.num_short_key_columns, num_keys
            )));
        }
        if self.num_rows_per_block == 0 {
            return Err(Error::invalid_argument("num_rows_per_block must be > 0"));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.unique_id) {
                return Err(Error::invalid_argument(format!(
                    "duplicate column unique id {}",
                    column.unique_id
                )));
            }
        }
        Ok(())
    }

    /// All columns in schema order.
    pub fn columns(&self) -> &[TabletColumn] {
        &self.columns
    }

    /// Column at ordinal `cid`.
    pub fn column(&self, cid: usize) -> Option<&TabletColumn> {
        self.columns.get(cid)
    }

    /// Ordinal of the column named `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of key columns.
    pub fn num_key_columns(&self) -> usize {
        self.columns.iter().filter(|c| c.is_key).count()
    }

    /// Number of leading key columns in the short-key index.
    pub fn num_short_key_columns(&self) -> usize {
        self.num_short_key_columns
    }

    /// Rows per short-key index entry.
    pub fn num_rows_per_block(&self) -> usize {
        self.num_rows_per_block
    }
}

/// The columns one read returns, as ordinals into a tablet schema.
#[derive(Debug, Clone)]
pub struct Schema {
    tablet_schema: Arc<TabletSchema>,
    column_ids: Vec<usize>,
}

impl Schema {
    /// Every column of the tablet.
    pub fn all(tablet_schema: Arc<TabletSchema>) -> Self {
        let column_ids = (0..tablet_schema.num_columns()).collect();
        Self { tablet_schema, column_ids }
    }

    /// The given columns, in the given order.
    pub fn project(tablet_schema: Arc<TabletSchema>, column_ids: Vec<usize>) -> Result<Self> {
        if let Some(bad) = column_ids.iter().find(|&&cid| cid >= tablet_schema.num_columns()) {
            return Err(Error::invalid_argument(format!(
                "column id {} out of range for schema with {} columns",
                bad,
                tablet_schema.num_columns()
            )));
        }
        Ok(Self { tablet_schema, column_ids })
    }

    /// Projected column ordinals.
    pub fn column_ids(&self) -> &[usize] {
        &self.column_ids
    }

    /// The underlying tablet schema.
    pub fn tablet_schema(&self) -> &Arc<TabletSchema> {
        &self.tablet_schema
    }

    /// Number of projected columns.
    pub fn num_columns(&self) -> usize {
        self.column_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TabletSchema {
        TabletSchema::new(
            vec![
                TabletColumn::new(1, "k1", PrimitiveType::Int).key(),
                TabletColumn::new(2, "k2", PrimitiveType::Varchar).key(),
                TabletColumn::new(3, "v1", PrimitiveType::BigInt).default_value("7"),
            ],
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_schema_accessors() {
        let schema = sample();
        assert_eq!(schema.num_columns(), 3);
        assert_eq!(schema.num_key_columns(), 2);
        assert_eq!(schema.field_index("v1"), Some(2));
        assert_eq!(schema.column(2).unwrap().parsed_default().unwrap(), Some(Datum::BigInt(7)));
        assert_eq!(schema.num_rows_per_block(), DEFAULT_NUM_ROWS_PER_BLOCK);
    }

    #[test]
    fn test_schema_validation() {
        let misplaced = vec![
            TabletColumn::new(1, "v", PrimitiveType::Int),
            TabletColumn::new(2, "k", PrimitiveType::Int).key(),
        ];
        assert!(TabletSchema::new(misplaced, 0).is_err());

        let duplicate = vec![
            TabletColumn::new(1, "k", PrimitiveType::Int).key(),
            TabletColumn::new(1, "v", PrimitiveType::Int),
        ];
        assert!(TabletSchema::new(duplicate, 1).is_err());

        let too_many_short = vec![TabletColumn::new(1, "k", PrimitiveType::Int).key()];
        assert!(TabletSchema::new(too_many_short, 2).is_err());
    }

    #[test]
    fn test_schema_json() {
        let json = r#"{
            "columns": [
                {"unique_id": 1, "name": "k1", "field_type": "Int", "is_key": true, "is_nullable": false},
                {"unique_id": 5, "name": "v1", "field_type": "Varchar"}
            ],
            "num_short_key_columns": 1
        }"#;
        let schema = TabletSchema::from_json(json).unwrap();
        assert!(schema.column(1).unwrap().is_nullable);
        assert_eq!(schema.num_rows_per_block(), DEFAULT_NUM_ROWS_PER_BLOCK);

        let back = TabletSchema::from_json(&schema.to_json().unwrap()).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_projection_bounds() {
        let schema = Arc::new(sample());
        assert!(Schema::project(schema.clone(), vec![2, 0]).is_ok());
        assert!(Schema::project(schema.clone(), vec![3]).is_err());
        assert_eq!(Schema::all(schema).column_ids(), &[0, 1, 2]);
    }
}
