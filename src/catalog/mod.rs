//! Catalog - the durable table/column registry.
//!
//! Schemas live in a bootstrap table heap rooted at page 0, stored with the
//! same slotted page format as user tables. Each column is one tuple:
//!
//! ```text
//! (table_name, column_name, type, ordinal, max_len, nullable, first_page)
//! ```
//!
//! Every mutation is written through the buffer pool before the call
//! returns; the in-memory map is only an index over those tuples.

mod schema;

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::buffer::BufferPoolManager;
use crate::common::{Error, PageId, Result, SchemaError};
use crate::storage::page::PageType;
use crate::storage::{RecordId, TableHeap};
use crate::types::{Row, Value};

pub use schema::{Column, ColumnType, TableSchema};

/// Page holding the head of the bootstrap catalog heap.
pub const CATALOG_PAGE_ID: PageId = PageId(0);

struct TableEntry {
    schema: TableSchema,
    /// Where this table's column tuples live in the bootstrap heap.
    tuples: Vec<RecordId>,
}

/// Registry of table schemas, persisted through the buffer pool.
pub struct Catalog {
    heap: TableHeap,
    tables: BTreeMap<String, TableEntry>,
}

impl Catalog {
    /// Load the catalog, creating the bootstrap heap in an empty file.
    ///
    /// # Errors
    /// - `Error::PageCorruption` if page 0 is not a catalog page or a tuple
    ///   cannot be interpreted
    pub fn bootstrap(bpm: &BufferPoolManager) -> Result<Self> {
        if bpm.disk_page_count() == 0 {
            let heap = TableHeap::create(bpm, PageType::Catalog)?;
            if heap.first_page() != CATALOG_PAGE_ID {
                return Err(Error::CacheInvariant(format!(
                    "bootstrap heap allocated at {} instead of {}",
                    heap.first_page(),
                    CATALOG_PAGE_ID
                )));
            }
            debug!("created bootstrap catalog");
            return Ok(Self {
                heap,
                tables: BTreeMap::new(),
            });
        }

        let page_type = bpm.fetch_page_read(CATALOG_PAGE_ID)?.page_type();
        if page_type != PageType::Catalog {
            return Err(Error::PageCorruption {
                page_id: CATALOG_PAGE_ID,
                reason: format!("expected catalog page, found {:?}", page_type),
            });
        }

        let heap = TableHeap::open(CATALOG_PAGE_ID);
        let mut columns: BTreeMap<String, Vec<(i64, Column, PageId, RecordId)>> = BTreeMap::new();
        for item in heap.iter(bpm, false) {
            let (rid, row) = item?;
            let (table, ordinal, column, first_page) = decode_tuple(rid, &row)?;
            columns
                .entry(table)
                .or_default()
                .push((ordinal, column, first_page, rid));
        }

        let mut tables = BTreeMap::new();
        for (name, mut parts) in columns {
            parts.sort_by_key(|(ordinal, ..)| *ordinal);
            let first_page = parts[0].2;
            let tuples = parts.iter().map(|(.., rid)| *rid).collect();
            let columns = parts.into_iter().map(|(_, column, ..)| column).collect();
            let row_count = TableHeap::open(first_page).count(bpm)?;

            let schema = TableSchema {
                name: name.clone(),
                columns,
                first_page,
                row_count,
            };
            tables.insert(name, TableEntry { schema, tuples });
        }
        debug!(tables = tables.len(), "loaded catalog");

        Ok(Self { heap, tables })
    }

    /// Register a new table and allocate its first page.
    ///
    /// # Errors
    /// - `SchemaError::DuplicateTable` if the name is taken
    /// - `SchemaError::NoColumns` / `SchemaError::DuplicateColumn` for a bad
    ///   column list
    pub fn create_table(
        &mut self,
        bpm: &BufferPoolManager,
        name: &str,
        columns: Vec<Column>,
    ) -> Result<TableSchema> {
        let name = name.to_lowercase();
        if self.tables.contains_key(&name) {
            return Err(SchemaError::DuplicateTable(name).into());
        }
        if columns.is_empty() {
            return Err(SchemaError::NoColumns(name).into());
        }
        let columns: Vec<Column> = columns
            .into_iter()
            .map(|c| Column {
                name: c.name.to_lowercase(),
                ..c
            })
            .collect();
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(SchemaError::DuplicateColumn {
                    table: name,
                    column: column.name.clone(),
                }
                .into());
            }
        }

        let heap = TableHeap::create(bpm, PageType::Data)?;
        let schema = TableSchema {
            name: name.clone(),
            columns,
            first_page: heap.first_page(),
            row_count: 0,
        };

        match self.register(bpm, schema.clone()) {
            Ok(()) => {
                info!(table = %name, first_page = %schema.first_page, "created table");
                Ok(schema)
            }
            Err(e) => {
                if let Err(free_error) = heap.free(bpm) {
                    warn!(
                        table = %name,
                        first_page = %schema.first_page,
                        error = %free_error,
                        "could not free pages of table that failed to register"
                    );
                }
                Err(e)
            }
        }
    }

    /// Remove a table from the catalog.
    ///
    /// With `free_pages` the table's pages are zero-filled immediately;
    /// without, they stay intact so the table can be reinstated by
    /// [`Catalog::restore_table`].
    pub fn drop_table(
        &mut self,
        bpm: &BufferPoolManager,
        name: &str,
        free_pages: bool,
    ) -> Result<TableSchema> {
        let name = name.to_lowercase();
        let entry = self
            .tables
            .get(&name)
            .ok_or_else(|| SchemaError::NoSuchTable(name.clone()))?;

        let mut removed = Vec::with_capacity(entry.tuples.len());
        for &rid in &entry.tuples {
            match self.heap.delete(bpm, rid) {
                Ok(row) => removed.push((rid, row)),
                Err(e) => {
                    for (rid, row) in removed.iter().rev() {
                        if let Err(restore_error) = self.heap.restore(bpm, *rid, row) {
                            warn!(
                                table = %name,
                                %rid,
                                error = %restore_error,
                                "could not restore catalog tuple after failed drop"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        let Some(entry) = self.tables.remove(&name) else {
            return Err(SchemaError::NoSuchTable(name).into());
        };
        if free_pages {
            TableHeap::open(entry.schema.first_page).free(bpm)?;
        }
        info!(table = %name, free_pages, "dropped table");
        Ok(entry.schema)
    }

    /// Reinstate a dropped table whose pages were kept.
    pub fn restore_table(&mut self, bpm: &BufferPoolManager, schema: TableSchema) -> Result<()> {
        if self.tables.contains_key(&schema.name) {
            return Err(SchemaError::DuplicateTable(schema.name).into());
        }
        let name = schema.name.clone();
        self.register(bpm, schema)?;
        debug!(table = %name, "restored table");
        Ok(())
    }

    /// Look up a table by (case-insensitive) name.
    pub fn get_table(&self, name: &str) -> std::result::Result<&TableSchema, SchemaError> {
        let name = name.to_lowercase();
        self.tables
            .get(&name)
            .map(|entry| &entry.schema)
            .ok_or(SchemaError::NoSuchTable(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_lowercase())
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Check a record against a table's column count, order and types.
    pub fn validate_record(&self, name: &str, values: &[Value]) -> std::result::Result<(), SchemaError> {
        self.get_table(name)?.validate(values)
    }

    /// Apply a change to a table's in-memory row count.
    pub(crate) fn adjust_row_count(&mut self, name: &str, delta: isize) {
        if let Some(entry) = self.tables.get_mut(&name.to_lowercase()) {
            entry.schema.row_count = entry.schema.row_count.saturating_add_signed(delta);
        }
    }

    /// Write one tuple per column and index the table.
    fn register(&mut self, bpm: &BufferPoolManager, schema: TableSchema) -> Result<()> {
        let mut tuples = Vec::with_capacity(schema.columns.len());
        for (ordinal, column) in schema.columns.iter().enumerate() {
            let row = encode_tuple(&schema, ordinal, column);
            match self.heap.insert(bpm, &row) {
                Ok(rid) => tuples.push(rid),
                Err(e) => {
                    for rid in tuples {
                        if let Err(delete_error) = self.heap.delete(bpm, rid) {
                            warn!(
                                table = %schema.name,
                                %rid,
                                error = %delete_error,
                                "orphan catalog tuple left by failed registration"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }
        self.tables
            .insert(schema.name.clone(), TableEntry { schema, tuples });
        Ok(())
    }
}

fn encode_tuple(schema: &TableSchema, ordinal: usize, column: &Column) -> Row {
    Row::new(vec![
        Value::from(schema.name.as_str()),
        Value::from(column.name.as_str()),
        Value::from(column.column_type.tag()),
        Value::Integer(ordinal as i64),
        Value::Integer(column.column_type.max_len() as i64),
        Value::Integer(i64::from(column.nullable)),
        Value::Integer(i64::from(schema.first_page.0)),
    ])
}

fn decode_tuple(rid: RecordId, row: &Row) -> Result<(String, i64, Column, PageId)> {
    let bad = |what: &str| Error::PageCorruption {
        page_id: rid.page_id,
        reason: format!("catalog tuple in slot {}: {}", rid.slot, what),
    };

    let [table, column, tag, ordinal, max_len, nullable, first_page] = row.as_slice() else {
        return Err(bad("wrong arity"));
    };
    let text = |v: &Value| v.as_text().map(str::to_string).ok_or_else(|| bad("expected text"));
    let int = |v: &Value| v.as_integer().ok_or_else(|| bad("expected integer"));

    let max_len = usize::try_from(int(max_len)?).map_err(|_| bad("negative max_len"))?;
    let column_type = ColumnType::from_tag(&text(tag)?, max_len).ok_or_else(|| bad("unknown type"))?;
    let first_page = u32::try_from(int(first_page)?).map_err(|_| bad("first_page out of range"))?;

    let column = Column {
        name: text(column)?,
        column_type,
        nullable: int(nullable)? != 0,
    };
    Ok((text(table)?, int(ordinal)?, column, PageId::new(first_page)))
}
