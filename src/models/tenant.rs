use crate::entity::Model;
use crate::schema::ColumnDescriptor;

/// Tenants are hard-deleted.
pub struct Tenant;

impl Model for Tenant {
    const ENTITY_TYPE: &'static str = "Tenant";
    const TABLE: &'static str = "tenants";

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::primary("id"),
            ColumnDescriptor::string("name").not_null(),
            ColumnDescriptor::email("email").not_null().unique(),
            ColumnDescriptor::boolean("is_active").not_null().default_value(true),
            ColumnDescriptor::datetime("created_at").not_null().default_expr("NOW()"),
            ColumnDescriptor::datetime("updated_at").not_null().default_expr("NOW()"),
        ]
    }
}
