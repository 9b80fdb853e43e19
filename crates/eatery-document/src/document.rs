//! The generic document engine.
//!
//! A [`Document`] represents one logical entity: a parent row plus zero or
//! more related child-record collections, embedded as array-valued
//! properties of the payload and keyed by their table name. The engine is
//! parameterized by an [`Entity`] supplying the data and workflow schemas;
//! all field iteration happens over the payload's serde representation, so
//! the engine never needs per-entity code.
//!
//! A document is either *new* (no id, in-memory data only) or *persisted*
//! (has an id; data may or may not be loaded). Operations that require the
//! missing half fail fast with [`DocumentError::AbstractMethod`].
//!
//! Missing tables are created on demand: the one recoverable storage error
//! is MySQL SQLSTATE `42S02` (no such table), answered by schema-driven DDL
//! and a single retry. Every other storage error rolls back the open
//! transaction and propagates.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use sqlx::mysql::{MySql, MySqlArguments, MySqlQueryResult, MySqlRow};
use sqlx::query::Query;
use sqlx::{Row, Transaction};
use tracing::{debug, info, warn};

use eatery_types::{ObjectId, WfHistoryItem, WorkflowStatusCode};

use crate::ddl;
use crate::error::DocumentError;
use crate::schema::{
    document_base_schema, writable_base_schema, DocumentDataSchema, DocumentWfSchema, FieldType,
    TableFieldSchema,
};
use crate::store::DocumentStore;
use crate::Result;

/// Capability interface a concrete entity implements to plug into the
/// engine: its payload type and its two schemas.
pub trait Entity {
    /// Row payload. Serialized keys must be column names; absent optional
    /// fields must serialize to absent keys (sparse inserts depend on it).
    type Data: Serialize + DeserializeOwned + Clone + Send + Sync;

    fn data_schema() -> DocumentDataSchema;
    fn wf_schema() -> DocumentWfSchema;
}

/// One logical entity bound to a connection pool.
pub struct Document<E: Entity> {
    store: DocumentStore,
    data_schema: DocumentDataSchema,
    wf_schema: DocumentWfSchema,
    id: Option<ObjectId>,
    data: Option<E::Data>,
    by_unique: Option<(String, Value)>,
    collection: Option<Vec<ObjectId>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Document<E> {
    fn with_parts(
        store: DocumentStore,
        id: Option<ObjectId>,
        data: Option<E::Data>,
        by_unique: Option<(String, Value)>,
    ) -> Self {
        Self {
            store,
            data_schema: E::data_schema(),
            wf_schema: E::wf_schema(),
            id,
            data,
            by_unique,
            collection: None,
            _entity: PhantomData,
        }
    }

    /// Empty document; data supplied later via [`Self::load_data`].
    pub fn new(store: DocumentStore) -> Self {
        Self::with_parts(store, None, None, None)
    }

    /// Persisted document; data fetched on demand by [`Self::load`].
    pub fn from_id(store: DocumentStore, id: ObjectId) -> Self {
        Self::with_parts(store, Some(id), None, None)
    }

    /// In-memory document from a full payload; the id (if any) is derived
    /// from the payload itself.
    pub fn from_data(store: DocumentStore, data: E::Data) -> Result<Self> {
        let map = to_map(&data)?;
        let schema = E::data_schema();
        let id = map.get(&schema.id_field_name).and_then(Value::as_i64);
        Ok(Self::with_parts(store, id, Some(data), None))
    }

    /// Document addressed by a unique-field lookup; the id is resolved on
    /// first [`Self::load`].
    pub fn from_unique(
        store: DocumentStore,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let field = field.into();
        let value = value.into();
        if field.is_empty() {
            return Err(DocumentError::ParameterExpected(
                "Unique field name is empty".to_string(),
            ));
        }
        if value.is_null() {
            return Err(DocumentError::ParameterExpected(format!(
                "Unique value for field '{field}' is expected"
            )));
        }
        Ok(Self::with_parts(store, None, None, Some((field, value))))
    }

    // ── accessors ─────────────────────────────────────────────────

    /// Primary key; fails if the document was never persisted or loaded.
    pub fn id(&self) -> Result<ObjectId> {
        self.id.ok_or_else(|| {
            DocumentError::AbstractMethod(format!(
                "Document of '{}' has no id but used for active manipulation",
                self.data_schema.table_name
            ))
        })
    }

    /// Payload; fails if no data has been loaded or adopted.
    pub fn data(&self) -> Result<&E::Data> {
        self.data.as_ref().ok_or_else(|| {
            DocumentError::AbstractMethod(format!(
                "Document of '{}' has no data but used for active manipulation",
                self.data_schema.table_name
            ))
        })
    }

    pub fn data_mut(&mut self) -> Result<&mut E::Data> {
        let table = self.data_schema.table_name.clone();
        self.data.as_mut().ok_or_else(|| {
            DocumentError::AbstractMethod(format!(
                "Document of '{table}' has no data but used for active manipulation"
            ))
        })
    }

    /// Ids gathered by the last [`Self::get_collection`] call.
    pub fn collection(&self) -> Result<&[ObjectId]> {
        self.collection.as_deref().ok_or_else(|| {
            DocumentError::AbstractMethod(
                "get_collection must be awaited before reading the collection".to_string(),
            )
        })
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub(crate) fn wf_schema_ref(&self) -> &DocumentWfSchema {
        &self.wf_schema
    }

    pub(crate) fn table_name(&self) -> &str {
        &self.data_schema.table_name
    }

    // ── load ──────────────────────────────────────────────────────

    /// Adopt an in-memory payload, deriving the id from it.
    pub fn load_data(&mut self, data: E::Data) -> Result<()> {
        let map = to_map(&data)?;
        self.id = map.get(&self.data_schema.id_field_name).and_then(Value::as_i64);
        self.data = Some(data);
        Ok(())
    }

    /// Fetch the row (resolving a unique-field lookup first when needed) and
    /// attach all related child rows.
    pub async fn load(&mut self) -> Result<&E::Data> {
        self.data_schema.validate()?;
        let schema = self.data_schema.clone();

        if self.id.is_none() {
            let (field, value) = self.by_unique.clone().ok_or_else(|| {
                DocumentError::ParameterExpected(format!(
                    "Unique value of '{}' is undefined and id is undefined too",
                    schema.table_name
                ))
            })?;
            let sql = format!(
                "SELECT `{}` FROM `{}` WHERE `{}` = ?",
                schema.id_field_name, schema.table_name, field
            );
            let param = match schema.fields.iter().find(|f| f.name == field) {
                Some(field_schema) => encode_param(field_schema, Some(&value))?,
                None => encode_value(&value),
            };
            let rows = self
                .fetch_self_heal(&sql, &[param], TableKind::Main)
                .await?;
            if rows.len() == 1 {
                self.id = Some(rows[0].try_get(0).map_err(DocumentError::from)?);
            } else {
                return Err(DocumentError::NotFound(format!(
                    "There're {} of records in '{}'. Searched value '{}' by field '{}'. Expected: 1",
                    rows.len(),
                    schema.table_name,
                    value,
                    field
                )));
            }
        }
        let id = self.id()?;

        let sql = format!(
            "SELECT * FROM `{}` WHERE `{}` = ?",
            schema.table_name, schema.id_field_name
        );
        let rows = self
            .fetch_self_heal(&sql, &[SqlParam::Int(id)], TableKind::Main)
            .await?;
        if rows.len() != 1 {
            return Err(DocumentError::NotFound(format!(
                "Object of '{}' with id = '{}' not found",
                schema.table_name, id
            )));
        }
        let mut map = row_to_map(&rows[0], &schema.fields, None)?;

        for related in &schema.related {
            let sql = format!(
                "SELECT * FROM `{}` WHERE `{}` = ?",
                schema.related_table_name(related),
                schema.related_id_column()
            );
            let rows = self
                .fetch_self_heal(&sql, &[SqlParam::Int(id)], TableKind::Related(related))
                .await?;
            let fk_column = schema.related_id_column();
            let children = rows
                .iter()
                .map(|row| row_to_map(row, &related.fields, Some(&fk_column)).map(Value::Object))
                .collect::<Result<Vec<Value>>>()?;
            map.insert(related.table_name.clone(), Value::Array(children));
        }

        let data: E::Data = from_map(map)?;
        Ok(&*self.data.insert(data))
    }

    // ── save ──────────────────────────────────────────────────────

    /// Persist the parent row and reconcile all related child rows in one
    /// transaction, then reload so the in-memory view matches storage
    /// (including database-side defaults and timestamps).
    pub async fn save(&mut self, username: Option<&str>) -> Result<E::Data> {
        self.data_schema.validate()?;
        let schema = self.data_schema.clone();
        let wf = self.wf_schema.clone();
        let mut map = to_map(self.data()?)?;
        let is_insert = self.id.is_none();

        if is_insert {
            stamp_first_save(&mut map, wf.initial_state, username)?;
            if let Some(user) = username {
                map.insert("createdByUser".to_string(), Value::from(user));
            }
        } else {
            append_history_on_status_change(&mut map, username)?;
        }
        match username {
            Some(user) => map.insert("changedByUser".to_string(), Value::from(user)),
            None => map.remove("changedByUser"),
        };

        // Non-fatal consistency check: surface schema drift, never fail it.
        for key in map.keys() {
            let declared = schema.fields.iter().any(|f| &f.name == key)
                || schema.related.iter().any(|r| &r.table_name == key)
                || document_base_schema().iter().any(|f| &f.name == key);
            if !declared {
                warn!(
                    "Property '{}' is absent in schema of '{}'",
                    key, schema.table_name
                );
            }
        }

        let mut tx = self.store.pool().begin().await.map_err(DocumentError::from)?;
        let result = self
            .save_tx(&mut tx, &schema, &wf, &map, is_insert, username)
            .await;
        match result {
            Ok(()) => tx.commit().await.map_err(DocumentError::from)?,
            Err(e) => {
                // Explicit for clarity; dropping the transaction would roll
                // back as well.
                tx.rollback().await.ok();
                return Err(e);
            }
        }

        self.load().await?;
        Ok(self.data()?.clone())
    }

    async fn save_tx(
        &mut self,
        tx: &mut Transaction<'_, MySql>,
        schema: &DocumentDataSchema,
        wf: &DocumentWfSchema,
        map: &Map<String, Value>,
        is_insert: bool,
        username: Option<&str>,
    ) -> Result<()> {
        let entity_fields = present_fields(&schema.fields, map);
        let base_fields: Vec<&TableFieldSchema> =
            writable_base_schema().filter(|f| map.contains_key(&f.name)).collect();
        let columns: Vec<String> = entity_fields
            .iter()
            .chain(base_fields.iter())
            .map(|f| f.name.clone())
            .collect();

        let sql = if is_insert {
            build_insert_sql(&schema.table_name, &columns)
        } else {
            build_update_sql(&schema.table_name, &columns, &schema.id_field_name)
        };
        let mut params: Vec<SqlParam> = Vec::with_capacity(columns.len() + 1);
        for &field in entity_fields.iter().chain(base_fields.iter()) {
            params.push(encode_param(field, map.get(&field.name))?);
        }
        if !is_insert {
            params.push(SqlParam::Int(self.id()?));
        }
        debug!(sql = %sql, "saving document of '{}'", schema.table_name);

        let result = match exec_tx(tx, &sql, &params).await {
            Err(e) if is_missing_table(&e) => {
                run_ddl_tx(tx, &ddl::main_table_statements(schema)).await?;
                exec_tx(tx, &sql, &params).await.map_err(DocumentError::from)?
            }
            other => other.map_err(DocumentError::from)?,
        };
        if is_insert {
            let id = i64::try_from(result.last_insert_id())
                .map_err(|_| DocumentError::Unknown("insert id out of range".to_string()))?;
            self.id = Some(id);
        }
        let parent_id = self.id()?;

        for related in &schema.related {
            match map.get(&related.table_name) {
                Some(Value::Array(elements)) => {
                    self.reconcile_children(tx, schema, wf, related, parent_id, elements, username)
                        .await?;
                }
                Some(_) => {
                    return Err(DocumentError::Unknown(format!(
                        "Property '{}' of '{}' must be an array of related records",
                        related.table_name, schema.table_name
                    )))
                }
                None => warn!("Property '{}' not found", related.table_name),
            }
        }
        Ok(())
    }

    /// Diff-based child reconciliation: insert elements without an id,
    /// update elements with one, delete every stored row whose id is absent
    /// from the in-memory array.
    #[allow(clippy::too_many_arguments)]
    async fn reconcile_children(
        &mut self,
        tx: &mut Transaction<'_, MySql>,
        schema: &DocumentDataSchema,
        wf: &DocumentWfSchema,
        related: &DocumentDataSchema,
        parent_id: ObjectId,
        elements: &[Value],
        username: Option<&str>,
    ) -> Result<()> {
        let rel_table = schema.related_table_name(related);
        let fk_column = schema.related_id_column();

        let select = format!(
            "SELECT `{}` FROM `{}` WHERE `{}` = ?",
            related.id_field_name, rel_table, fk_column
        );
        let rows = match fetch_tx(tx, &select, &[SqlParam::Int(parent_id)]).await {
            Err(e) if is_missing_table(&e) => {
                run_ddl_tx(tx, &ddl::related_table_statements(schema, related)).await?;
                fetch_tx(tx, &select, &[SqlParam::Int(parent_id)])
                    .await
                    .map_err(DocumentError::from)?
            }
            other => other.map_err(DocumentError::from)?,
        };
        let mut existing: Vec<ObjectId> = Vec::with_capacity(rows.len());
        for row in &rows {
            existing.push(row.try_get(0).map_err(DocumentError::from)?);
        }

        for element in elements {
            let mut el = element
                .as_object()
                .cloned()
                .ok_or_else(|| {
                    DocumentError::Unknown(format!(
                        "Related record of '{rel_table}' must be an object"
                    ))
                })?;

            if !el.contains_key("wfStatus") {
                if let Some(rel_wf) = wf.related_for(&related.table_name) {
                    stamp_first_save(&mut el, rel_wf.initial_state, username)?;
                }
            }
            let el_id = el.get(&related.id_field_name).and_then(Value::as_i64);
            match username {
                Some(user) => {
                    if el_id.is_none() {
                        el.insert("createdByUser".to_string(), Value::from(user));
                    }
                    el.insert("changedByUser".to_string(), Value::from(user))
                }
                None => el.remove("changedByUser"),
            };

            let entity_fields = present_fields(&related.fields, &el);
            let base_fields: Vec<&TableFieldSchema> =
                writable_base_schema().filter(|f| el.contains_key(&f.name)).collect();
            let mut columns: Vec<String> = vec![fk_column.clone()];
            columns.extend(
                entity_fields
                    .iter()
                    .chain(base_fields.iter())
                    .map(|f| f.name.clone()),
            );
            let mut params: Vec<SqlParam> = vec![SqlParam::Int(parent_id)];
            for &field in entity_fields.iter().chain(base_fields.iter()) {
                params.push(encode_param(field, el.get(&field.name))?);
            }

            let sql = match el_id {
                None => build_insert_sql(&rel_table, &columns),
                Some(id) => {
                    existing.retain(|existing_id| *existing_id != id);
                    params.push(SqlParam::Int(id));
                    build_update_sql(&rel_table, &columns, &related.id_field_name)
                }
            };
            debug!(sql = %sql, "saving related record of '{rel_table}'");
            match exec_tx(tx, &sql, &params).await {
                Err(e) if is_missing_table(&e) => {
                    run_ddl_tx(tx, &ddl::related_table_statements(schema, related)).await?;
                    exec_tx(tx, &sql, &params).await.map_err(DocumentError::from)?
                }
                other => other.map_err(DocumentError::from)?,
            };
        }

        // Rows present in storage but absent from the in-memory array.
        if !existing.is_empty() {
            let placeholders = vec!["?"; existing.len()].join(",");
            let sql = format!(
                "DELETE FROM `{}` WHERE `{}` IN ({})",
                rel_table, related.id_field_name, placeholders
            );
            let params: Vec<SqlParam> = existing.into_iter().map(SqlParam::Int).collect();
            debug!(sql = %sql, "deleting disappeared related records of '{rel_table}'");
            exec_tx(tx, &sql, &params).await.map_err(DocumentError::from)?;
        }
        Ok(())
    }

    // ── delete ────────────────────────────────────────────────────

    /// Remove the parent row and all related child rows in one transaction.
    /// A document without an id is a no-op.
    pub async fn delete(&mut self) -> Result<()> {
        let Some(id) = self.id else {
            return Ok(());
        };
        let schema = self.data_schema.clone();
        let mut tx = self.store.pool().begin().await.map_err(DocumentError::from)?;
        let result = Self::delete_tx(&mut tx, &schema, id).await;
        match result {
            Ok(()) => tx.commit().await.map_err(DocumentError::from)?,
            Err(e) => {
                tx.rollback().await.ok();
                return Err(e);
            }
        }
        self.id = None;
        Ok(())
    }

    async fn delete_tx(
        tx: &mut Transaction<'_, MySql>,
        schema: &DocumentDataSchema,
        id: ObjectId,
    ) -> Result<()> {
        // Children go first: the foreign keys are ON DELETE RESTRICT, so the
        // parent row cannot disappear while child rows still reference it.
        for related in &schema.related {
            let sql = format!(
                "DELETE FROM `{}` WHERE `{}` = ?",
                schema.related_table_name(related),
                schema.related_id_column()
            );
            match exec_tx(tx, &sql, &[SqlParam::Int(id)]).await {
                Err(e) if is_missing_table(&e) => {
                    run_ddl_tx(tx, &ddl::related_table_statements(schema, related)).await?;
                    exec_tx(tx, &sql, &[SqlParam::Int(id)])
                        .await
                        .map_err(DocumentError::from)?
                }
                other => other.map_err(DocumentError::from)?,
            };
        }
        let sql = format!(
            "DELETE FROM `{}` WHERE `{}` = ?",
            schema.table_name, schema.id_field_name
        );
        match exec_tx(tx, &sql, &[SqlParam::Int(id)]).await {
            Err(e) if is_missing_table(&e) => {
                run_ddl_tx(tx, &ddl::main_table_statements(schema)).await?;
                exec_tx(tx, &sql, &[SqlParam::Int(id)])
                    .await
                    .map_err(DocumentError::from)?
            }
            other => other.map_err(DocumentError::from)?,
        };
        Ok(())
    }

    // ── collection ────────────────────────────────────────────────

    /// Gather ids matching a caller-supplied predicate.
    ///
    /// `where_tense` and `order_tense` are interpolated into the statement
    /// verbatim: callers must never pass untrusted strings here. Values go
    /// through `params` as bound placeholders.
    pub async fn get_collection(
        &mut self,
        where_tense: &str,
        params: &[Value],
        order_tense: &str,
        limit: Option<u32>,
    ) -> Result<&[ObjectId]> {
        let schema = self.data_schema.clone();
        let limit = limit.unwrap_or(100);
        let sql = format!(
            "SELECT `{}` FROM `{}` WHERE ({}) AND `blocked` = 0 ORDER BY {} LIMIT {}",
            schema.id_field_name, schema.table_name, where_tense, order_tense, limit
        );
        let encoded: Vec<SqlParam> = params.iter().map(encode_value).collect();
        let rows = self.fetch_self_heal(&sql, &encoded, TableKind::Main).await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            ids.push(row.try_get(0).map_err(DocumentError::from)?);
        }
        Ok(self.collection.insert(ids))
    }

    /// Verify that every required schema field is present in the payload.
    pub fn check_mandatory(&self, data: &E::Data) -> Result<()> {
        let map = to_map(data)?;
        for field in &self.data_schema.fields {
            if field.required && !map.contains_key(&field.name) {
                return Err(DocumentError::ParameterExpected(format!(
                    "Expected mandatory field value '{}' of '{}'",
                    field.name, self.data_schema.table_name
                )));
            }
        }
        Ok(())
    }

    // ── workflow plumbing (see workflow.rs) ───────────────────────

    pub(crate) fn current_status(&self) -> Result<Option<WorkflowStatusCode>> {
        let map = to_map(self.data()?)?;
        status_from_map(&map)
    }

    pub(crate) fn set_status(&mut self, status: WorkflowStatusCode) -> Result<()> {
        let mut map = to_map(self.data()?)?;
        map.insert(
            "wfStatus".to_string(),
            Value::from(i32::from(status)),
        );
        self.data = Some(from_map(map)?);
        Ok(())
    }

    pub(crate) fn related_status(
        &self,
        table_name: &str,
        index: usize,
    ) -> Result<Option<WorkflowStatusCode>> {
        let map = to_map(self.data()?)?;
        let element = related_element(&map, table_name, index)?;
        status_from_map(element)
    }

    pub(crate) fn set_related_status(
        &mut self,
        table_name: &str,
        index: usize,
        status: WorkflowStatusCode,
    ) -> Result<()> {
        let mut map = to_map(self.data()?)?;
        let elements = map
            .get_mut(table_name)
            .and_then(Value::as_array_mut)
            .ok_or_else(|| {
                DocumentError::ParameterExpected(format!(
                    "Related records '{table_name}' are absent from the payload"
                ))
            })?;
        let element = elements.get_mut(index).ok_or_else(|| {
            DocumentError::ParameterExpected(format!(
                "Related record index {index} is out of range for '{table_name}'"
            ))
        })?;
        let element = element.as_object_mut().ok_or_else(|| {
            DocumentError::Unknown(format!("Related record of '{table_name}' must be an object"))
        })?;
        element.insert("wfStatus".to_string(), Value::from(i32::from(status)));
        self.data = Some(from_map(map)?);
        Ok(())
    }

    // ── low-level helpers ─────────────────────────────────────────

    async fn fetch_self_heal(
        &self,
        sql: &str,
        params: &[SqlParam],
        kind: TableKind<'_>,
    ) -> Result<Vec<MySqlRow>> {
        match self.fetch_pool(sql, params).await {
            Err(e) if is_missing_table(&e) => {
                let stmts = match kind {
                    TableKind::Main => ddl::main_table_statements(&self.data_schema),
                    TableKind::Related(related) => {
                        ddl::related_table_statements(&self.data_schema, related)
                    }
                };
                self.run_ddl_pool(&stmts).await?;
                self.fetch_pool(sql, params).await.map_err(DocumentError::from)
            }
            other => other.map_err(DocumentError::from),
        }
    }

    async fn fetch_pool(&self, sql: &str, params: &[SqlParam]) -> sqlx::Result<Vec<MySqlRow>> {
        debug!(sql, "query");
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param.clone());
        }
        query.fetch_all(self.store.pool()).await
    }

    async fn run_ddl_pool(&self, statements: &[String]) -> Result<()> {
        for sql in statements {
            info!(sql = %sql, "creating missing table object for '{}'", self.data_schema.table_name);
            sqlx::query(sql)
                .execute(self.store.pool())
                .await
                .map_err(DocumentError::from)?;
        }
        Ok(())
    }
}

enum TableKind<'a> {
    Main,
    Related(&'a DocumentDataSchema),
}

/// Parameter value bound into a statement. Encoding happens up front so the
/// same slice can be replayed on the post-DDL retry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlParam {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
}

fn bind_param<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    param: SqlParam,
) -> Query<'q, MySql, MySqlArguments> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Int(v) => query.bind(v),
        SqlParam::Float(v) => query.bind(v),
        SqlParam::Text(v) => query.bind(v),
        SqlParam::DateTime(v) => query.bind(v),
    }
}

async fn exec_tx(
    tx: &mut Transaction<'_, MySql>,
    sql: &str,
    params: &[SqlParam],
) -> sqlx::Result<MySqlQueryResult> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_param(query, param.clone());
    }
    query.execute(&mut **tx).await
}

async fn fetch_tx(
    tx: &mut Transaction<'_, MySql>,
    sql: &str,
    params: &[SqlParam],
) -> sqlx::Result<Vec<MySqlRow>> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_param(query, param.clone());
    }
    query.fetch_all(&mut **tx).await
}

async fn run_ddl_tx(tx: &mut Transaction<'_, MySql>, statements: &[String]) -> Result<()> {
    for sql in statements {
        info!(sql = %sql, "creating missing table object");
        sqlx::query(sql)
            .execute(&mut **tx)
            .await
            .map_err(DocumentError::from)?;
    }
    Ok(())
}

/// MySQL reports a missing table as SQLSTATE 42S02 (ER_NO_SUCH_TABLE). This
/// is the only storage error the engine recovers from.
fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("42S02"))
}

fn to_map<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DocumentError::Unknown(
            "Payload must serialize to an object".to_string(),
        )),
        Err(e) => Err(DocumentError::Unknown(format!("Payload serialization failed: {e}"))),
    }
}

fn from_map<T: DeserializeOwned>(map: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(map))
        .map_err(|e| DocumentError::Unknown(format!("Payload does not match its schema: {e}")))
}

fn status_from_map(map: &Map<String, Value>) -> Result<Option<WorkflowStatusCode>> {
    match map.get("wfStatus") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| DocumentError::Unknown(format!("Invalid wfStatus value: {e}"))),
    }
}

fn related_element<'m>(
    map: &'m Map<String, Value>,
    table_name: &str,
    index: usize,
) -> Result<&'m Map<String, Value>> {
    let elements = map.get(table_name).and_then(Value::as_array).ok_or_else(|| {
        DocumentError::ParameterExpected(format!(
            "Related records '{table_name}' are absent from the payload"
        ))
    })?;
    elements
        .get(index)
        .and_then(Value::as_object)
        .ok_or_else(|| {
            DocumentError::ParameterExpected(format!(
                "Related record index {index} is out of range for '{table_name}'"
            ))
        })
}

/// Stamp the bookkeeping of a first save: status at the workflow's initial
/// state and a single matching history entry.
fn stamp_first_save(
    map: &mut Map<String, Value>,
    initial_state: WorkflowStatusCode,
    username: Option<&str>,
) -> Result<()> {
    let history = vec![WfHistoryItem {
        wf_status: initial_state,
        created: Utc::now(),
        created_by_user: username.map(str::to_string),
    }];
    let history = serde_json::to_value(history)
        .map_err(|e| DocumentError::Unknown(format!("History serialization failed: {e}")))?;
    map.insert("wfHistory".to_string(), history);
    map.insert("wfStatus".to_string(), Value::from(i32::from(initial_state)));
    Ok(())
}

/// On update: when the in-memory status differs from the last history
/// entry's status, append a new entry. This is the only path by which
/// workflow transitions become persisted history.
fn append_history_on_status_change(
    map: &mut Map<String, Value>,
    username: Option<&str>,
) -> Result<()> {
    let (Some(history_value), Some(status)) = (map.get("wfHistory"), status_from_map(map)?) else {
        return Ok(());
    };
    let mut history: Vec<WfHistoryItem> = serde_json::from_value(history_value.clone())
        .map_err(|e| DocumentError::Unknown(format!("Invalid wfHistory value: {e}")))?;
    if history.last().map(|item| item.wf_status) != Some(status) {
        history.push(WfHistoryItem {
            wf_status: status,
            created: Utc::now(),
            created_by_user: username.map(str::to_string),
        });
        let history = serde_json::to_value(history)
            .map_err(|e| DocumentError::Unknown(format!("History serialization failed: {e}")))?;
        map.insert("wfHistory".to_string(), history);
    }
    Ok(())
}

/// Schema fields actually present in the payload. Absent optional fields
/// are omitted from the statement entirely (sparse insert/update), never
/// written as explicit NULLs.
fn present_fields<'s>(
    fields: &'s [TableFieldSchema],
    map: &Map<String, Value>,
) -> Vec<&'s TableFieldSchema> {
    fields.iter().filter(|f| map.contains_key(&f.name)).collect()
}

fn build_insert_sql(table: &str, columns: &[String]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| format!("`{c}`")).collect();
    let placeholders = vec!["?"; columns.len()].join(",");
    format!(
        "INSERT INTO `{}` ({}) VALUES ({})",
        table,
        cols.join(","),
        placeholders
    )
}

fn build_update_sql(table: &str, columns: &[String], id_column: &str) -> String {
    let assignments: Vec<String> = columns.iter().map(|c| format!("`{c}` = ?")).collect();
    format!(
        "UPDATE `{}` SET {} WHERE `{}` = ?",
        table,
        assignments.join(","),
        id_column
    )
}

/// Encode a payload value for a schema-declared column.
fn encode_param(field: &TableFieldSchema, value: Option<&Value>) -> Result<SqlParam> {
    let Some(value) = value else {
        return Ok(SqlParam::Null);
    };
    if value.is_null() {
        return Ok(SqlParam::Null);
    }
    let mismatch = || {
        DocumentError::Unknown(format!(
            "Value of field '{}' does not fit its column type",
            field.name
        ))
    };
    match field.field_type {
        FieldType::Json => {
            let text = serde_json::to_string(value)
                .map_err(|e| DocumentError::Unknown(format!("JSON encoding failed: {e}")))?;
            Ok(SqlParam::Text(text))
        }
        FieldType::BigInt | FieldType::Int => value.as_i64().map(SqlParam::Int).ok_or_else(mismatch),
        FieldType::TinyInt => match value {
            Value::Bool(b) => Ok(SqlParam::Int(i64::from(*b))),
            other => other.as_i64().map(SqlParam::Int).ok_or_else(mismatch),
        },
        FieldType::Double => value.as_f64().map(SqlParam::Float).ok_or_else(mismatch),
        FieldType::VarChar(_) => match value {
            Value::String(s) => Ok(SqlParam::Text(s.clone())),
            Value::Number(n) => Ok(SqlParam::Text(n.to_string())),
            _ => Err(mismatch()),
        },
        FieldType::Timestamp => match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| SqlParam::DateTime(t.with_timezone(&Utc)))
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
    }
}

/// Encode a caller-supplied collection parameter without schema knowledge.
fn encode_value(value: &Value) -> SqlParam {
    match value {
        Value::Null => SqlParam::Null,
        Value::Bool(b) => SqlParam::Int(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(SqlParam::Int)
            .or_else(|| n.as_f64().map(SqlParam::Float))
            .unwrap_or(SqlParam::Null),
        Value::String(s) => SqlParam::Text(s.clone()),
        other => SqlParam::Text(other.to_string()),
    }
}

/// Build a JSON payload map from a fetched row: declared fields plus the
/// base record, with SQL NULL normalized to an absent key and JSON columns
/// parsed into structured values.
fn row_to_map(
    row: &MySqlRow,
    fields: &[TableFieldSchema],
    fk_column: Option<&str>,
) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    if let Some(fk) = fk_column {
        if let Some(id) = row.try_get::<Option<i64>, _>(fk).map_err(DocumentError::from)? {
            map.insert(fk.to_string(), Value::from(id));
        }
    }
    for field in fields.iter().chain(document_base_schema()) {
        if let Some(value) = field_value_from_row(row, field)? {
            map.insert(field.name.clone(), value);
        }
    }
    Ok(map)
}

fn field_value_from_row(row: &MySqlRow, field: &TableFieldSchema) -> Result<Option<Value>> {
    let name = field.name.as_str();
    let value = match field.field_type {
        FieldType::BigInt | FieldType::Int => row
            .try_get::<Option<i64>, _>(name)
            .map_err(DocumentError::from)?
            .map(Value::from),
        FieldType::TinyInt => row
            .try_get::<Option<bool>, _>(name)
            .map_err(DocumentError::from)?
            .map(Value::from),
        FieldType::Double => row
            .try_get::<Option<f64>, _>(name)
            .map_err(DocumentError::from)?
            .map(Value::from),
        FieldType::VarChar(_) => row
            .try_get::<Option<String>, _>(name)
            .map_err(DocumentError::from)?
            .map(Value::from),
        FieldType::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(name)
            .map_err(DocumentError::from)?
            .map(|t| Value::from(t.to_rfc3339())),
        FieldType::Json => match row
            .try_get::<Option<String>, _>(name)
            .map_err(DocumentError::from)?
        {
            Some(text) => Some(serde_json::from_str(&text).map_err(|e| {
                DocumentError::Unknown(format!("Column '{name}' holds invalid JSON: {e}"))
            })?),
            None => None,
        },
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, field_type: FieldType) -> TableFieldSchema {
        TableFieldSchema::new(name, field_type)
    }

    // ── SQL building ──────────────────────────────────────────────

    #[test]
    fn insert_sql_shape() {
        let sql = build_insert_sql("users", &["login".into(), "email".into()]);
        assert_eq!(sql, "INSERT INTO `users` (`login`,`email`) VALUES (?,?)");
    }

    #[test]
    fn update_sql_shape() {
        let sql = build_update_sql("users", &["login".into(), "email".into()], "id");
        assert_eq!(sql, "UPDATE `users` SET `login` = ?,`email` = ? WHERE `id` = ?");
    }

    // ── sparse field selection ────────────────────────────────────

    #[test]
    fn present_fields_skips_absent_keys() {
        let fields = vec![
            field("login", FieldType::VarChar(128)),
            field("email", FieldType::VarChar(128)),
            field("phone", FieldType::VarChar(128)),
        ];
        let map = to_map(&json!({"login": "a", "phone": "555"})).unwrap();
        let present: Vec<&str> = present_fields(&fields, &map)
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(present, ["login", "phone"]);
    }

    // ── parameter encoding ────────────────────────────────────────

    #[test]
    fn absent_value_encodes_as_null() {
        let f = field("phone", FieldType::VarChar(128));
        assert_eq!(encode_param(&f, None).unwrap(), SqlParam::Null);
        assert_eq!(encode_param(&f, Some(&Value::Null)).unwrap(), SqlParam::Null);
    }

    #[test]
    fn json_field_encodes_as_compact_text() {
        let f = field("settings", FieldType::Json);
        let value = json!({"a": [1, 2]});
        assert_eq!(
            encode_param(&f, Some(&value)).unwrap(),
            SqlParam::Text(r#"{"a":[1,2]}"#.to_string())
        );
    }

    #[test]
    fn tinyint_accepts_bool_and_number() {
        let f = field("locked", FieldType::TinyInt);
        assert_eq!(encode_param(&f, Some(&json!(true))).unwrap(), SqlParam::Int(1));
        assert_eq!(encode_param(&f, Some(&json!(0))).unwrap(), SqlParam::Int(0));
    }

    #[test]
    fn varchar_accepts_numeric_payloads() {
        // tguid may arrive as a bare Telegram numeric id.
        let f = field("tguid", FieldType::VarChar(128));
        assert_eq!(
            encode_param(&f, Some(&json!(12345))).unwrap(),
            SqlParam::Text("12345".to_string())
        );
    }

    #[test]
    fn timestamp_requires_rfc3339() {
        let f = field("created", FieldType::Timestamp);
        assert!(encode_param(&f, Some(&json!("2026-08-30T12:00:00Z"))).is_ok());
        assert!(encode_param(&f, Some(&json!("yesterday"))).is_err());
    }

    #[test]
    fn int_field_rejects_text() {
        let f = field("count", FieldType::Int);
        assert!(encode_param(&f, Some(&json!("three"))).is_err());
    }

    #[test]
    fn collection_params_encode_generically() {
        assert_eq!(encode_value(&json!("a")), SqlParam::Text("a".to_string()));
        assert_eq!(encode_value(&json!(7)), SqlParam::Int(7));
        assert_eq!(encode_value(&json!(1.5)), SqlParam::Float(1.5));
        assert_eq!(encode_value(&Value::Null), SqlParam::Null);
        assert_eq!(encode_value(&json!(true)), SqlParam::Int(1));
    }

    // ── workflow bookkeeping stamps ───────────────────────────────

    #[test]
    fn first_save_stamp_sets_status_and_single_history_entry() {
        let mut map = Map::new();
        stamp_first_save(&mut map, WorkflowStatusCode::Done, Some("admin")).unwrap();
        assert_eq!(map["wfStatus"], json!(4));
        let history: Vec<WfHistoryItem> =
            serde_json::from_value(map["wfHistory"].clone()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].wf_status, WorkflowStatusCode::Done);
        assert_eq!(history[0].created_by_user.as_deref(), Some("admin"));
    }

    #[test]
    fn history_appends_only_on_status_change() {
        let mut map = Map::new();
        stamp_first_save(&mut map, WorkflowStatusCode::Draft, None).unwrap();

        // Same status: no new entry.
        append_history_on_status_change(&mut map, Some("admin")).unwrap();
        let history: Vec<WfHistoryItem> =
            serde_json::from_value(map["wfHistory"].clone()).unwrap();
        assert_eq!(history.len(), 1);

        // Changed status: exactly one new entry with the actor.
        map.insert(
            "wfStatus".to_string(),
            Value::from(i32::from(WorkflowStatusCode::Registered)),
        );
        append_history_on_status_change(&mut map, Some("admin")).unwrap();
        let history: Vec<WfHistoryItem> =
            serde_json::from_value(map["wfHistory"].clone()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].wf_status, WorkflowStatusCode::Registered);
        assert_eq!(history[1].created_by_user.as_deref(), Some("admin"));
    }

    #[test]
    fn history_untouched_when_absent() {
        let mut map = to_map(&json!({"login": "a"})).unwrap();
        append_history_on_status_change(&mut map, None).unwrap();
        assert!(!map.contains_key("wfHistory"));
    }

    // ── payload map plumbing ──────────────────────────────────────

    #[test]
    fn to_map_rejects_non_objects() {
        assert!(to_map(&json!([1, 2, 3])).is_err());
        assert!(to_map(&json!("scalar")).is_err());
    }

    #[test]
    fn status_from_map_normalizes_null() {
        let map = to_map(&json!({"wfStatus": null})).unwrap();
        assert_eq!(status_from_map(&map).unwrap(), None);
        let map = to_map(&json!({"wfStatus": 4})).unwrap();
        assert_eq!(status_from_map(&map).unwrap(), Some(WorkflowStatusCode::Done));
        let map = to_map(&json!({})).unwrap();
        assert_eq!(status_from_map(&map).unwrap(), None);
    }

    #[test]
    fn related_element_bounds_are_typed_errors() {
        let map = to_map(&json!({"items": [{"count": 1}]})).unwrap();
        assert!(related_element(&map, "items", 0).is_ok());
        assert!(matches!(
            related_element(&map, "items", 5),
            Err(DocumentError::ParameterExpected(_))
        ));
        assert!(matches!(
            related_element(&map, "lines", 0),
            Err(DocumentError::ParameterExpected(_))
        ));
    }
}
