use crate::entity::Model;
use crate::schema::ColumnDescriptor;

/// Users are soft-deleted through `deleted_at` and can be restored.
pub struct User;

impl Model for User {
    const ENTITY_TYPE: &'static str = "User";
    const TABLE: &'static str = "users";

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::primary("id"),
            // Owning tenant's id in text form.
            ColumnDescriptor::string("tenant_id").not_null(),
            ColumnDescriptor::string("name").not_null(),
            ColumnDescriptor::email("email").not_null().unique(),
            ColumnDescriptor::boolean("is_active").not_null().default_value(true),
            ColumnDescriptor::datetime("created_at").not_null().default_expr("NOW()"),
            ColumnDescriptor::datetime("updated_at").not_null().default_expr("NOW()"),
            ColumnDescriptor::soft_delete("deleted_at"),
        ]
    }
}
