//! The `orders` entity: a guest's order with its line items.
//!
//! Items live in the related `order_items` table and carry their own
//! workflow so the kitchen can complete lines independently of the order's
//! overall state.

use eatery_document::{
    DocumentDataSchema, DocumentWfSchema, Entity, FieldType, TableFieldSchema, WfTransfer,
};
use eatery_types::{OrderData, WorkflowStatusCode};

/// Marker type binding [`OrderData`] to the `orders` table.
pub struct Order;

impl Entity for Order {
    type Data = OrderData;

    fn data_schema() -> DocumentDataSchema {
        DocumentDataSchema {
            table_name: "orders".to_string(),
            related_tables_prefix: Some("order_".to_string()),
            id_field_name: "id".to_string(),
            fields: vec![
                TableFieldSchema::new("discount", FieldType::Double)
                    .required()
                    .default_expr("0"),
                TableFieldSchema::new("comment", FieldType::VarChar(255)),
                TableFieldSchema::new("esId", FieldType::VarChar(128)),
            ],
            indexes: vec![],
            related: vec![DocumentDataSchema {
                // Payload property name; the physical table is `order_items`.
                table_name: "items".to_string(),
                related_tables_prefix: None,
                id_field_name: "id".to_string(),
                fields: vec![
                    TableFieldSchema::new("name", FieldType::Json).required(),
                    TableFieldSchema::new("description", FieldType::Json).required(),
                    TableFieldSchema::new("option", FieldType::Json).required(),
                    TableFieldSchema::new("count", FieldType::Int).required(),
                    TableFieldSchema::new("comment", FieldType::VarChar(255)),
                ],
                indexes: vec![],
                related: vec![],
            }],
        }
    }

    fn wf_schema() -> DocumentWfSchema {
        let t = |from, to| WfTransfer { from, to };
        DocumentWfSchema {
            table_name: "orders".to_string(),
            initial_state: WorkflowStatusCode::Draft,
            transfers: vec![
                t(WorkflowStatusCode::Draft, WorkflowStatusCode::Registered),
                t(WorkflowStatusCode::Registered, WorkflowStatusCode::Approved),
                t(
                    WorkflowStatusCode::Registered,
                    WorkflowStatusCode::CanceledByEatery,
                ),
                t(
                    WorkflowStatusCode::Registered,
                    WorkflowStatusCode::CanceledByGuest,
                ),
                t(WorkflowStatusCode::Approved, WorkflowStatusCode::Paid),
                t(WorkflowStatusCode::Paid, WorkflowStatusCode::Done),
            ],
            related: vec![DocumentWfSchema {
                table_name: "items".to_string(),
                initial_state: WorkflowStatusCode::Registered,
                transfers: vec![t(
                    WorkflowStatusCode::Registered,
                    WorkflowStatusCode::Done,
                )],
                related: vec![],
            }],
        }
    }
}
