//! Schema-driven DDL derivation.
//!
//! Translates a [`DocumentDataSchema`] into idempotent `CREATE TABLE IF NOT
//! EXISTS` statements plus index and foreign-key `ALTER TABLE`s. Table
//! creation is safe to race; index and foreign-key creation is not guarded
//! by `IF NOT EXISTS`, so of two concurrent first creators one fails and
//! surfaces the database error.

use crate::schema::{
    document_base_schema, DocumentDataSchema, FieldType, TableFieldSchema, TableIndexSchema,
};

/// DDL fragment for one column.
///
/// JSON columns are stored as checked longtext rather than the native JSON
/// type, and a `required` flag wins over any default when choosing between
/// `NOT NULL` and `DEFAULT`.
pub fn column_ddl(field: &TableFieldSchema) -> String {
    let mut parts: Vec<String> = vec![format!("`{}`", field.name), field.field_type.sql_type()];
    if field.required {
        parts.push("NOT NULL".to_string());
    } else {
        match &field.default {
            Some(expr) => parts.push(format!("DEFAULT {expr}")),
            None => parts.push("DEFAULT NULL".to_string()),
        }
    }
    if field.auto_increment {
        parts.push("AUTO_INCREMENT".to_string());
    }
    if field.required {
        if let Some(expr) = &field.default {
            parts.push(format!("DEFAULT {expr}"));
        }
    }
    if let Some(comment) = &field.comment {
        parts.push(format!("COMMENT '{comment}'"));
    }
    if field.field_type == FieldType::Json {
        parts.push(format!("CHECK (json_valid(`{}`))", field.name));
    }
    if let Some(expr) = &field.on_update {
        parts.push(format!("ON UPDATE {expr}"));
    }
    parts.join(" ")
}

/// `CREATE TABLE IF NOT EXISTS` for the main table: declared fields, the
/// implicit base record, and the primary key.
pub fn create_main_table_sql(schema: &DocumentDataSchema) -> String {
    let columns: Vec<String> = schema
        .fields
        .iter()
        .chain(document_base_schema())
        .map(column_ddl)
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS `{}` ({}, PRIMARY KEY (`{}`)) \
         ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_general_ci",
        schema.table_name,
        columns.join(", "),
        schema.id_field_name
    )
}

/// `CREATE TABLE IF NOT EXISTS` for a related child table: the prefixed
/// parent-id column first, then the child's fields and the base record.
pub fn create_related_table_sql(
    schema: &DocumentDataSchema,
    related: &DocumentDataSchema,
) -> String {
    let columns: Vec<String> = related
        .fields
        .iter()
        .chain(document_base_schema())
        .map(column_ddl)
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS `{}` (`{}` bigint(20) NOT NULL, {}, PRIMARY KEY (`{}`)) \
         ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_general_ci",
        schema.related_table_name(related),
        schema.related_id_column(),
        columns.join(", "),
        related.id_field_name
    )
}

/// `ALTER TABLE ... ADD UNIQUE/INDEX (...)`. Not idempotent.
pub fn add_index_sql(table_name: &str, index: &TableIndexSchema) -> String {
    let fields: Vec<String> = index.fields.iter().map(|f| format!("`{f}`")).collect();
    format!(
        "ALTER TABLE `{}` ADD {} ({})",
        table_name,
        index.index_type.sql_keyword(),
        fields.join(",")
    )
}

/// Foreign key from a related table's prefixed id column to the parent's id
/// column. Not idempotent.
pub fn add_foreign_key_sql(schema: &DocumentDataSchema, related: &DocumentDataSchema) -> String {
    format!(
        "ALTER TABLE `{}` ADD FOREIGN KEY (`{}`) REFERENCES `{}`(`{}`) \
         ON DELETE RESTRICT ON UPDATE RESTRICT",
        schema.related_table_name(related),
        schema.related_id_column(),
        schema.table_name,
        schema.id_field_name
    )
}

/// All statements needed to materialize the main table: the table itself,
/// then its indexes.
pub fn main_table_statements(schema: &DocumentDataSchema) -> Vec<String> {
    let mut stmts = vec![create_main_table_sql(schema)];
    for index in &schema.indexes {
        stmts.push(add_index_sql(&schema.table_name, index));
    }
    stmts
}

/// All statements needed to materialize a related table: the table, its
/// indexes, then the foreign key to the parent.
pub fn related_table_statements(
    schema: &DocumentDataSchema,
    related: &DocumentDataSchema,
) -> Vec<String> {
    let table_name = schema.related_table_name(related);
    let mut stmts = vec![create_related_table_sql(schema, related)];
    for index in &related.indexes {
        stmts.push(add_index_sql(&table_name, index));
    }
    stmts.push(add_foreign_key_sql(schema, related));
    stmts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexType;

    fn users_schema() -> DocumentDataSchema {
        DocumentDataSchema {
            table_name: "users".into(),
            related_tables_prefix: Some("user_".into()),
            id_field_name: "id".into(),
            fields: vec![
                TableFieldSchema::new("login", FieldType::VarChar(128)).required(),
                TableFieldSchema::new("settings", FieldType::Json).required(),
                TableFieldSchema::new("signInAttemptsCount", FieldType::Int)
                    .required()
                    .default_expr("0"),
            ],
            indexes: vec![TableIndexSchema {
                fields: vec!["login".into()],
                index_type: IndexType::Unique,
            }],
            related: vec![DocumentDataSchema {
                table_name: "devices".into(),
                related_tables_prefix: None,
                id_field_name: "id".into(),
                fields: vec![TableFieldSchema::new("token", FieldType::VarChar(255))],
                indexes: vec![],
                related: vec![],
            }],
        }
    }

    #[test]
    fn required_column_is_not_null() {
        let ddl = column_ddl(&TableFieldSchema::new("login", FieldType::VarChar(128)).required());
        assert_eq!(ddl, "`login` varchar(128) NOT NULL");
    }

    #[test]
    fn optional_column_defaults_to_null() {
        let ddl = column_ddl(&TableFieldSchema::new("phone", FieldType::VarChar(128)));
        assert_eq!(ddl, "`phone` varchar(128) DEFAULT NULL");
    }

    #[test]
    fn required_column_with_default_emits_both() {
        let field = TableFieldSchema::new("locked", FieldType::TinyInt)
            .required()
            .default_expr("0");
        assert_eq!(column_ddl(&field), "`locked` tinyint(1) NOT NULL DEFAULT 0");
    }

    #[test]
    fn json_column_is_checked_longtext() {
        let ddl = column_ddl(&TableFieldSchema::new("settings", FieldType::Json));
        assert_eq!(
            ddl,
            "`settings` longtext CHARACTER SET utf8mb4 COLLATE utf8mb4_bin \
             DEFAULT NULL CHECK (json_valid(`settings`))"
        );
    }

    #[test]
    fn auto_increment_id_column() {
        let field = TableFieldSchema::new("id", FieldType::BigInt)
            .required()
            .auto_increment();
        assert_eq!(column_ddl(&field), "`id` bigint(20) NOT NULL AUTO_INCREMENT");
    }

    #[test]
    fn on_update_clause_comes_last() {
        let field = TableFieldSchema::new("changed", FieldType::Timestamp)
            .required()
            .default_expr("current_timestamp()")
            .on_update("current_timestamp()");
        assert_eq!(
            column_ddl(&field),
            "`changed` timestamp NOT NULL DEFAULT current_timestamp() \
             ON UPDATE current_timestamp()"
        );
    }

    #[test]
    fn comment_preserved() {
        let field = TableFieldSchema::new("blocked", FieldType::TinyInt)
            .required()
            .default_expr("0")
            .comment("Is Document blocked");
        assert_eq!(
            column_ddl(&field),
            "`blocked` tinyint(1) NOT NULL DEFAULT 0 COMMENT 'Is Document blocked'"
        );
    }

    #[test]
    fn main_table_ddl_contains_base_record_and_primary_key() {
        let sql = create_main_table_sql(&users_schema());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `users` ("));
        assert!(sql.contains("`login` varchar(128) NOT NULL"));
        assert!(sql.contains("`wfHistory` longtext"));
        assert!(sql.contains("`changed` timestamp NOT NULL DEFAULT current_timestamp() ON UPDATE current_timestamp()"));
        assert!(sql.contains("PRIMARY KEY (`id`)"));
        assert!(sql.ends_with("ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_general_ci"));
    }

    #[test]
    fn related_table_ddl_prepends_parent_fk_column() {
        let schema = users_schema();
        let sql = create_related_table_sql(&schema, &schema.related[0]);
        assert!(sql.starts_with(
            "CREATE TABLE IF NOT EXISTS `user_devices` (`user_id` bigint(20) NOT NULL, `token` varchar(255)"
        ));
        assert!(sql.contains("PRIMARY KEY (`id`)"));
    }

    #[test]
    fn index_ddl() {
        let schema = users_schema();
        assert_eq!(
            add_index_sql(&schema.table_name, &schema.indexes[0]),
            "ALTER TABLE `users` ADD UNIQUE (`login`)"
        );
    }

    #[test]
    fn main_table_statements_order_table_then_indexes() {
        let stmts = main_table_statements(&users_schema());
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE TABLE IF NOT EXISTS `users`"));
        assert!(stmts[1].starts_with("ALTER TABLE `users` ADD UNIQUE"));
    }

    #[test]
    fn related_table_statements_end_with_foreign_key() {
        let schema = users_schema();
        let stmts = related_table_statements(&schema, &schema.related[0]);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE TABLE IF NOT EXISTS `user_devices`"));
        assert!(stmts[1].contains("ADD FOREIGN KEY (`user_id`)"));
    }

    #[test]
    fn foreign_key_ddl_restricts_delete_and_update() {
        let schema = users_schema();
        assert_eq!(
            add_foreign_key_sql(&schema, &schema.related[0]),
            "ALTER TABLE `user_devices` ADD FOREIGN KEY (`user_id`) REFERENCES `users`(`id`) \
             ON DELETE RESTRICT ON UPDATE RESTRICT"
        );
    }
}
