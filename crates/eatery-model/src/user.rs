//! The `users` entity: registered guests and staff.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use eatery_document::{
    DocumentDataSchema, DocumentWfSchema, Entity, FieldType, IndexType, TableFieldSchema,
    TableIndexSchema,
};
use eatery_types::{UserData, WorkflowStatusCode};

type HmacSha256 = Hmac<Sha256>;

/// Marker type binding [`UserData`] to the `users` table.
pub struct User;

impl Entity for User {
    type Data = UserData;

    fn data_schema() -> DocumentDataSchema {
        DocumentDataSchema {
            table_name: "users".to_string(),
            related_tables_prefix: Some("user_".to_string()),
            id_field_name: "id".to_string(),
            fields: vec![
                TableFieldSchema::new("login", FieldType::VarChar(128)).required(),
                TableFieldSchema::new("email", FieldType::VarChar(128)).required(),
                TableFieldSchema::new("phone", FieldType::VarChar(128)),
                TableFieldSchema::new("hash", FieldType::VarChar(128)).required(),
                TableFieldSchema::new("name", FieldType::VarChar(128)).required(),
                TableFieldSchema::new("photo", FieldType::Json),
                TableFieldSchema::new("tguid", FieldType::VarChar(128)),
                TableFieldSchema::new("settings", FieldType::Json).required(),
                TableFieldSchema::new("signInAttemptsCount", FieldType::Int)
                    .required()
                    .default_expr("0"),
            ],
            indexes: vec![TableIndexSchema {
                fields: vec!["login".to_string()],
                index_type: IndexType::Unique,
            }],
            related: vec![],
        }
    }

    /// Users have no lifecycle: they are born in the terminal `done` state.
    fn wf_schema() -> DocumentWfSchema {
        DocumentWfSchema {
            table_name: "users".to_string(),
            initial_state: WorkflowStatusCode::Done,
            transfers: vec![],
            related: vec![],
        }
    }
}

impl User {
    /// Credential hash: hex digest of HMAC-SHA256 keyed by
    /// `"{login} {secret_key}"` over an empty message. The empty-message
    /// form is what every stored hash was produced with, so it must stay.
    pub fn calc_hash(login: &str, secret_key: &str) -> String {
        // Infallible: HMAC takes keys of any length.
        let mac = HmacSha256::new_from_slice(format!("{login} {secret_key}").as_bytes())
            .expect("hmac key");
        hex::encode(mac.finalize().into_bytes())
    }

    /// Check a presented secret against the stored hash; an absent secret
    /// is checked as the empty string.
    pub fn check_secret_key(data: &UserData, secret_key: Option<&str>) -> bool {
        let hash = Self::calc_hash(&data.login, secret_key.unwrap_or(""));
        data.hash == hash
    }
}
