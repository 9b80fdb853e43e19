//! Declarative table and workflow schemas.
//!
//! Pure data: a [`DocumentDataSchema`] describes the relational layout of a
//! document (columns, indexes, related child tables) and a
//! [`DocumentWfSchema`] describes its workflow (initial state, legal
//! transitions). The engine derives every SQL statement from these values.

use std::sync::OnceLock;

use eatery_types::WorkflowStatusCode;

use crate::error::DocumentError;

/// Abstract SQL column type. Rendered to the concrete MySQL type by
/// [`FieldType::sql_type`]; JSON gets special treatment in the DDL builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    BigInt,
    Int,
    TinyInt,
    VarChar(u16),
    Double,
    Timestamp,
    Json,
}

impl FieldType {
    pub fn sql_type(&self) -> String {
        match self {
            Self::BigInt => "bigint(20)".to_string(),
            Self::Int => "int(11)".to_string(),
            Self::TinyInt => "tinyint(1)".to_string(),
            Self::VarChar(len) => format!("varchar({len})"),
            Self::Double => "double".to_string(),
            Self::Timestamp => "timestamp".to_string(),
            // Native JSON is avoided for engine-version portability; the DDL
            // builder emits checked longtext instead.
            Self::Json => "longtext CHARACTER SET utf8mb4 COLLATE utf8mb4_bin".to_string(),
        }
    }
}

/// One column of a table.
#[derive(Debug, Clone)]
pub struct TableFieldSchema {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub auto_increment: bool,
    pub default: Option<String>,
    pub on_update: Option<String>,
    pub comment: Option<String>,
}

impl TableFieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            auto_increment: false,
            default: None,
            on_update: None,
            comment: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Raw SQL default expression, e.g. `0` or `current_timestamp()`.
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn on_update(mut self, expr: impl Into<String>) -> Self {
        self.on_update = Some(expr.into());
        self
    }

    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.comment = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Unique,
    Plain,
}

impl IndexType {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Unique => "UNIQUE",
            Self::Plain => "INDEX",
        }
    }
}

/// One index over a table; `fields` is ordered.
#[derive(Debug, Clone)]
pub struct TableIndexSchema {
    pub fields: Vec<String>,
    pub index_type: IndexType,
}

/// Relational layout of a document: the main table plus one level of
/// related child tables.
#[derive(Debug, Clone)]
pub struct DocumentDataSchema {
    pub table_name: String,
    /// Prefix applied to related table names and to the foreign-key column.
    pub related_tables_prefix: Option<String>,
    pub id_field_name: String,
    pub fields: Vec<TableFieldSchema>,
    pub indexes: Vec<TableIndexSchema>,
    pub related: Vec<DocumentDataSchema>,
}

impl DocumentDataSchema {
    pub fn prefix(&self) -> &str {
        self.related_tables_prefix.as_deref().unwrap_or("")
    }

    /// Physical name of a related child table.
    pub fn related_table_name(&self, related: &DocumentDataSchema) -> String {
        format!("{}{}", self.prefix(), related.table_name)
    }

    /// Name of the foreign-key column on every related table.
    pub fn related_id_column(&self) -> String {
        format!("{}{}", self.prefix(), self.id_field_name)
    }

    /// Check the schema invariants: unique column names (including the
    /// implicit base record) and index references to declared fields only.
    pub fn validate(&self) -> Result<(), DocumentError> {
        let mut seen: Vec<&str> = document_base_schema().iter().map(|f| f.name.as_str()).collect();
        for field in &self.fields {
            if seen.contains(&field.name.as_str()) {
                return Err(DocumentError::Unknown(format!(
                    "Duplicate field '{}' in schema of '{}'",
                    field.name, self.table_name
                )));
            }
            seen.push(&field.name);
        }
        for index in &self.indexes {
            for name in &index.fields {
                if !seen.contains(&name.as_str()) {
                    return Err(DocumentError::Unknown(format!(
                        "Index of '{}' references unknown field '{}'",
                        self.table_name, name
                    )));
                }
            }
        }
        for related in &self.related {
            related.validate()?;
        }
        Ok(())
    }
}

/// One legal workflow transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WfTransfer {
    pub from: WorkflowStatusCode,
    pub to: WorkflowStatusCode,
}

/// Workflow layout of a document. A state with no outgoing transfers is
/// terminal.
#[derive(Debug, Clone)]
pub struct DocumentWfSchema {
    pub table_name: String,
    pub initial_state: WorkflowStatusCode,
    pub transfers: Vec<WfTransfer>,
    pub related: Vec<DocumentWfSchema>,
}

impl DocumentWfSchema {
    /// Outgoing transitions from `status`.
    pub fn transfers_from(&self, status: Option<WorkflowStatusCode>) -> Vec<WfTransfer> {
        match status {
            Some(from) => self
                .transfers
                .iter()
                .copied()
                .filter(|t| t.from == from)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Workflow schema of a related table, aligned by table name.
    pub fn related_for(&self, table_name: &str) -> Option<&DocumentWfSchema> {
        self.related.iter().find(|r| r.table_name == table_name)
    }
}

static BASE_SCHEMA: OnceLock<Vec<TableFieldSchema>> = OnceLock::new();

/// Bookkeeping columns implicitly present on every table (parent and child).
pub fn document_base_schema() -> &'static [TableFieldSchema] {
    BASE_SCHEMA.get_or_init(|| {
        vec![
            TableFieldSchema::new("id", FieldType::BigInt)
                .required()
                .auto_increment()
                .comment("Unique identificator of document or child record"),
            TableFieldSchema::new("locked", FieldType::TinyInt)
                .required()
                .default_expr("0")
                .comment("Is Document locked for changes"),
            TableFieldSchema::new("lockedByUser", FieldType::VarChar(128))
                .comment("User name who locked Document the last"),
            TableFieldSchema::new("blocked", FieldType::TinyInt)
                .required()
                .default_expr("0")
                .comment("Is Document blocked"),
            TableFieldSchema::new("wfStatus", FieldType::Int)
                .comment("Workflow status of Document"),
            TableFieldSchema::new("wfHistory", FieldType::Json)
                .comment("Workflow history of Document"),
            TableFieldSchema::new("createdByUser", FieldType::VarChar(128))
                .comment("User login who created the Document"),
            TableFieldSchema::new("changedByUser", FieldType::VarChar(128))
                .comment("User login who changed the Document the last"),
            TableFieldSchema::new("created", FieldType::Timestamp)
                .required()
                .default_expr("current_timestamp()")
                .comment("Time when the document created"),
            TableFieldSchema::new("changed", FieldType::Timestamp)
                .required()
                .default_expr("current_timestamp()")
                .on_update("current_timestamp()")
                .comment("Time when the document changed last time"),
        ]
    })
}

/// Base columns that the engine binds on insert/update. The timestamp pair
/// is always left to the database.
pub fn writable_base_schema() -> impl Iterator<Item = &'static TableFieldSchema> {
    document_base_schema()
        .iter()
        .filter(|f| f.name != "created" && f.name != "changed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_schema() -> DocumentDataSchema {
        DocumentDataSchema {
            table_name: "users".into(),
            related_tables_prefix: Some("user_".into()),
            id_field_name: "id".into(),
            fields: vec![
                TableFieldSchema::new("login", FieldType::VarChar(128)).required(),
                TableFieldSchema::new("email", FieldType::VarChar(128)).required(),
            ],
            indexes: vec![TableIndexSchema {
                fields: vec!["login".into()],
                index_type: IndexType::Unique,
            }],
            related: vec![],
        }
    }

    #[test]
    fn base_schema_has_ten_columns_in_order() {
        let names: Vec<&str> = document_base_schema().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "id",
                "locked",
                "lockedByUser",
                "blocked",
                "wfStatus",
                "wfHistory",
                "createdByUser",
                "changedByUser",
                "created",
                "changed"
            ]
        );
    }

    #[test]
    fn writable_base_excludes_timestamps() {
        let names: Vec<&str> = writable_base_schema().map(|f| f.name.as_str()).collect();
        assert!(!names.contains(&"created"));
        assert!(!names.contains(&"changed"));
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn valid_schema_passes() {
        assert!(users_schema().validate().is_ok());
    }

    #[test]
    fn duplicate_field_rejected() {
        let mut schema = users_schema();
        schema
            .fields
            .push(TableFieldSchema::new("login", FieldType::VarChar(64)));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn field_clashing_with_base_record_rejected() {
        let mut schema = users_schema();
        schema
            .fields
            .push(TableFieldSchema::new("wfStatus", FieldType::Int));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn index_over_unknown_field_rejected() {
        let mut schema = users_schema();
        schema.indexes.push(TableIndexSchema {
            fields: vec!["missing".into()],
            index_type: IndexType::Plain,
        });
        assert!(schema.validate().is_err());
    }

    #[test]
    fn index_over_base_field_allowed() {
        let mut schema = users_schema();
        schema.indexes.push(TableIndexSchema {
            fields: vec!["createdByUser".into()],
            index_type: IndexType::Plain,
        });
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn related_naming_uses_prefix() {
        let mut schema = users_schema();
        let child = DocumentDataSchema {
            table_name: "devices".into(),
            related_tables_prefix: None,
            id_field_name: "id".into(),
            fields: vec![],
            indexes: vec![],
            related: vec![],
        };
        schema.related.push(child);
        assert_eq!(schema.related_table_name(&schema.related[0]), "user_devices");
        assert_eq!(schema.related_id_column(), "user_id");
    }

    #[test]
    fn transfers_from_filters_by_current_status() {
        let wf = DocumentWfSchema {
            table_name: "orders".into(),
            initial_state: WorkflowStatusCode::Draft,
            transfers: vec![
                WfTransfer {
                    from: WorkflowStatusCode::Draft,
                    to: WorkflowStatusCode::Registered,
                },
                WfTransfer {
                    from: WorkflowStatusCode::Registered,
                    to: WorkflowStatusCode::Approved,
                },
                WfTransfer {
                    from: WorkflowStatusCode::Registered,
                    to: WorkflowStatusCode::CanceledByGuest,
                },
            ],
            related: vec![],
        };
        assert_eq!(wf.transfers_from(Some(WorkflowStatusCode::Draft)).len(), 1);
        assert_eq!(
            wf.transfers_from(Some(WorkflowStatusCode::Registered)).len(),
            2
        );
        // Terminal state: no outgoing edges.
        assert!(wf.transfers_from(Some(WorkflowStatusCode::Closed)).is_empty());
        assert!(wf.transfers_from(None).is_empty());
    }
}
