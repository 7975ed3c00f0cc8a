//! Builds parameterized INSERT, UPDATE, SELECT, COUNT, EXISTS and DELETE statements.
//! Values are never written into the SQL text; each non-null value becomes a `$n` placeholder.

use crate::value::{Row, Value};

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// SQL text plus the values bound to its placeholders, in placeholder order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
    /// Column named in a `RETURNING` clause, if any.
    pub returning: Option<String>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    /// Raw statement without parameters (health checks, transaction control).
    pub fn raw(sql: &str) -> Self {
        QueryBuf {
            sql: sql.to_string(),
            ..Self::default()
        }
    }

    fn push_param(&mut self, v: Value) -> String {
        self.params.push(v);
        format!("${}", self.params.len())
    }

    /// Placeholder for `v`, or the `NULL` keyword for nulls so the driver never has to
    /// guess a type for an untyped null parameter.
    fn push_value(&mut self, v: &Value) -> String {
        if v.is_null() {
            "NULL".to_string()
        } else {
            self.push_param(v.clone())
        }
    }
}

/// Equality conditions, AND-joined.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: &str, value: impl Into<Value>) {
        self.conditions.push((column.to_string(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.conditions.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }
}

impl From<Vec<(String, Value)>> for Filter {
    fn from(conditions: Vec<(String, Value)>) -> Self {
        Filter { conditions }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        OrderBy {
            column: column.to_string(),
            descending: false,
        }
    }

    pub fn desc(column: &str) -> Self {
        OrderBy {
            column: column.to_string(),
            descending: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    /// Include soft-deleted rows.
    pub include_deleted: bool,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl FindOptions {
    pub fn with_deleted() -> Self {
        FindOptions {
            include_deleted: true,
            ..Self::default()
        }
    }
}

/// WHERE clause from equality conditions plus the soft-delete guard. Null values compare with IS NULL.
fn where_clause(
    q: &mut QueryBuf,
    filter: &Filter,
    soft_delete_column: Option<&str>,
    include_deleted: bool,
) -> String {
    let mut parts = Vec::new();
    for (col, val) in filter.iter() {
        if val.is_null() {
            parts.push(format!("{} IS NULL", quoted(col)));
        } else {
            let ph = q.push_param(val.clone());
            parts.push(format!("{} = {}", quoted(col), ph));
        }
    }
    if let Some(col) = soft_delete_column {
        if !include_deleted {
            parts.push(format!("{} IS NULL", quoted(col)));
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// INSERT over exactly the keys of `data`, in their order. `returning` names a column
/// (normally the primary key) the database should hand back.
pub fn insert(table: &str, data: &Row, returning: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let body = if data.is_empty() {
        " DEFAULT VALUES".to_string()
    } else {
        let mut cols = Vec::with_capacity(data.len());
        let mut placeholders = Vec::with_capacity(data.len());
        for (name, val) in data {
            cols.push(quoted(name));
            placeholders.push(q.push_value(val));
        }
        format!(" ({}) VALUES ({})", cols.join(", "), placeholders.join(", "))
    };
    let returning_clause = returning
        .map(|c| format!(" RETURNING {}", quoted(c)))
        .unwrap_or_default();
    q.sql = format!("INSERT INTO {}{}{}", quoted(table), body, returning_clause);
    q.returning = returning.map(str::to_string);
    q
}

/// UPDATE ... SET every key of `data` except `pk_name`, WHERE `pk_name` = `pk_value`.
/// `None` when there is nothing to set.
pub fn update(table: &str, data: &Row, pk_name: &str, pk_value: &Value) -> Option<QueryBuf> {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (k, v) in data {
        if k == pk_name {
            continue;
        }
        let ph = q.push_value(v);
        sets.push(format!("{} = {}", quoted(k), ph));
    }
    if sets.is_empty() {
        return None;
    }
    let id_ph = q.push_param(pk_value.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        quoted(table),
        sets.join(", "),
        quoted(pk_name),
        id_ph
    );
    Some(q)
}

/// SELECT * with equality filters, soft-delete guard, then ORDER BY, LIMIT, OFFSET in that order.
pub fn find(
    table: &str,
    filter: &Filter,
    soft_delete_column: Option<&str>,
    options: &FindOptions,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, filter, soft_delete_column, options.include_deleted);
    let order_clause = options
        .order_by
        .as_ref()
        .map(|o| {
            format!(
                " ORDER BY {} {}",
                quoted(&o.column),
                if o.descending { "DESC" } else { "ASC" }
            )
        })
        .unwrap_or_default();
    let limit_clause = options
        .limit
        .map(|n| format!(" LIMIT {}", q.push_param(Value::Int(clamp_i64(n)))))
        .unwrap_or_default();
    let offset_clause = options
        .offset
        .map(|n| format!(" OFFSET {}", q.push_param(Value::Int(clamp_i64(n)))))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT * FROM {}{}{}{}{}",
        quoted(table),
        where_sql,
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

/// `find` limited to one row.
pub fn find_one(
    table: &str,
    filter: &Filter,
    soft_delete_column: Option<&str>,
    options: &FindOptions,
) -> QueryBuf {
    let options = FindOptions {
        limit: Some(1),
        ..options.clone()
    };
    find(table, filter, soft_delete_column, &options)
}

/// SELECT COUNT(*) AS "count" with the same WHERE logic as `find`.
pub fn count(
    table: &str,
    filter: &Filter,
    soft_delete_column: Option<&str>,
    include_deleted: bool,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, filter, soft_delete_column, include_deleted);
    q.sql = format!("SELECT COUNT(*) AS \"count\" FROM {}{}", quoted(table), where_sql);
    q
}

/// SELECT 1 AS "exists" ... LIMIT 1 with the same WHERE logic as `find`.
pub fn exists(
    table: &str,
    filter: &Filter,
    soft_delete_column: Option<&str>,
    include_deleted: bool,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, filter, soft_delete_column, include_deleted);
    q.sql = format!("SELECT 1 AS \"exists\" FROM {}{} LIMIT 1", quoted(table), where_sql);
    q
}

/// Hard DELETE filtered by equality conditions. An empty filter deletes every row.
pub fn delete(table: &str, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, filter, None, true);
    q.sql = format!("DELETE FROM {}{}", quoted(table), where_sql);
    q
}

fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn insert_uses_data_order_and_placeholders() {
        let data = row(&[("name", "Acme Inc".into()), ("email", "info@acme.com".into())]);
        let q = insert("tenants", &data, Some("id"));
        assert_eq!(
            q.sql,
            "INSERT INTO \"tenants\" (\"name\", \"email\") VALUES ($1, $2) RETURNING \"id\""
        );
        assert_eq!(q.params, vec![Value::from("Acme Inc"), Value::from("info@acme.com")]);
        assert_eq!(q.returning.as_deref(), Some("id"));
    }

    #[test]
    fn insert_never_embeds_values() {
        let data = row(&[("name", "O'Brien'); DROP TABLE tenants; --".into())]);
        let q = insert("tenants", &data, None);
        assert!(!q.sql.contains("O'Brien"));
        assert!(!q.sql.contains("RETURNING"));
        assert_eq!(q.params.len(), 1);
    }

    #[test]
    fn nulls_are_written_as_keyword() {
        let data = row(&[("deleted_at", Value::Null), ("name", "x".into())]);
        let q = update("users", &data, "id", &Value::Int(1)).unwrap();
        assert_eq!(q.sql, "UPDATE \"users\" SET \"deleted_at\" = NULL, \"name\" = $1 WHERE \"id\" = $2");
        assert_eq!(q.params, vec![Value::from("x"), Value::Int(1)]);

        let q = insert("users", &data, None);
        assert_eq!(q.sql, "INSERT INTO \"users\" (\"deleted_at\", \"name\") VALUES (NULL, $1)");
    }

    #[test]
    fn insert_without_columns() {
        let q = insert("audit_logs", &Row::new(), None);
        assert_eq!(q.sql, "INSERT INTO \"audit_logs\" DEFAULT VALUES");
    }

    #[test]
    fn update_skips_primary_key_and_binds_it_last() {
        let data = row(&[("id", Value::Int(9)), ("name", "New".into()), ("is_active", false.into())]);
        let q = update("tenants", &data, "id", &Value::Int(9)).unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"tenants\" SET \"name\" = $1, \"is_active\" = $2 WHERE \"id\" = $3"
        );
        assert_eq!(q.params, vec![Value::from("New"), Value::Bool(false), Value::Int(9)]);
    }

    #[test]
    fn update_with_only_primary_key_is_none() {
        let data = row(&[("id", Value::Int(9))]);
        assert!(update("tenants", &data, "id", &Value::Int(9)).is_none());
    }

    #[test]
    fn find_clause_order() {
        let filter = Filter::new().eq("tenant_id", "t1").eq("is_active", true);
        let opts = FindOptions {
            include_deleted: false,
            order_by: Some(OrderBy::desc("created_at")),
            limit: Some(10),
            offset: Some(20),
        };
        let q = find("users", &filter, Some("deleted_at"), &opts);
        assert_eq!(
            q.sql,
            "SELECT * FROM \"users\" WHERE \"tenant_id\" = $1 AND \"is_active\" = $2 AND \"deleted_at\" IS NULL \
             ORDER BY \"created_at\" DESC LIMIT $3 OFFSET $4"
        );
        assert_eq!(q.params[2], Value::Int(10));
        assert_eq!(q.params[3], Value::Int(20));
    }

    #[test]
    fn find_include_deleted_drops_guard() {
        let q = find("users", &Filter::new(), Some("deleted_at"), &FindOptions::with_deleted());
        assert_eq!(q.sql, "SELECT * FROM \"users\"");
        assert!(q.params.is_empty());
    }

    #[test]
    fn null_filter_uses_is_null() {
        let q = find("users", &Filter::new().eq("name", Value::Null), None, &FindOptions::default());
        assert_eq!(q.sql, "SELECT * FROM \"users\" WHERE \"name\" IS NULL");
        assert!(q.params.is_empty());
    }

    #[test]
    fn find_one_limits_to_one() {
        let q = find_one("tenants", &Filter::new().eq("id", 1), None, &FindOptions::default());
        assert_eq!(q.sql, "SELECT * FROM \"tenants\" WHERE \"id\" = $1 LIMIT $2");
        assert_eq!(q.params, vec![Value::Int(1), Value::Int(1)]);
    }

    #[test]
    fn count_and_exists_share_where_logic() {
        let filter = Filter::new().eq("tenant_id", "t1");
        let c = count("users", &filter, Some("deleted_at"), false);
        assert_eq!(
            c.sql,
            "SELECT COUNT(*) AS \"count\" FROM \"users\" WHERE \"tenant_id\" = $1 AND \"deleted_at\" IS NULL"
        );
        let e = exists("users", &filter, Some("deleted_at"), true);
        assert_eq!(e.sql, "SELECT 1 AS \"exists\" FROM \"users\" WHERE \"tenant_id\" = $1 LIMIT 1");
    }

    #[test]
    fn delete_is_hard_and_filtered() {
        let q = delete("tenants", &Filter::new().eq("id", 3));
        assert_eq!(q.sql, "DELETE FROM \"tenants\" WHERE \"id\" = $1");
        assert_eq!(q.params, vec![Value::Int(3)]);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quoted("we\"ird"), "\"we\"\"ird\"");
    }
}
