//! SQL-backed tenant store.
//!
//! Tenant records live in the `tenants` table on the shared (landlord)
//! connection. [`SeaOrmTenantStore::install`] creates it.

use crate::error::map_db_err;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgtenancy::{Result, TenancyError, Tenant, TenantStore};
use pgtenancy_log::{debug, info};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, QueryResult, Statement};
use sea_query::{
    ColumnDef, DeleteStatement, Expr, Iden, Index, IndexCreateStatement, InsertStatement, Order, Query,
    SelectStatement, SimpleExpr, Table, TableCreateStatement, UpdateStatement,
};

/// Columns of the `tenants` table
#[derive(Iden, Clone, Copy)]
pub enum Tenants {
    Table,
    Id,
    Slug,
    Schema,
    DbUsername,
    DbPassword,
    Domain,
    TeamId,
    CreatedAt,
    UpdatedAt,
}

const COLUMNS: [Tenants; 9] = [
    Tenants::Id,
    Tenants::Slug,
    Tenants::Schema,
    Tenants::DbUsername,
    Tenants::DbPassword,
    Tenants::Domain,
    Tenants::TeamId,
    Tenants::CreatedAt,
    Tenants::UpdatedAt,
];

const BACKEND: DbBackend = DbBackend::Postgres;

/// Tenant store over a SeaORM connection.
#[derive(Clone)]
pub struct SeaOrmTenantStore {
    conn: DatabaseConnection,
}

impl SeaOrmTenantStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Create the `tenants` table and its team index if missing.
    pub async fn install(&self) -> Result<()> {
        info!("Installing tenants table");
        self.conn
            .execute(BACKEND.build(&create_table()))
            .await
            .map_err(map_db_err)?;
        self.conn
            .execute(BACKEND.build(&create_team_index()))
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn fetch_one(&self, query: SelectStatement) -> Result<Option<Tenant>> {
        let row = self.conn.query_one(BACKEND.build(&query)).await.map_err(map_db_err)?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    async fn fetch_returning(&self, statement: Statement) -> Result<Option<Tenant>> {
        let row = self.conn.query_one(statement).await.map_err(map_db_err)?;
        row.as_ref().map(tenant_from_row).transpose()
    }
}

#[async_trait]
impl TenantStore for SeaOrmTenantStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Tenant>> {
        self.fetch_one(select_where(Expr::col(Tenants::Id).eq(id))).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
        self.fetch_one(select_where(Expr::col(Tenants::Slug).eq(slug))).await
    }

    async fn find_by_slug_or_domain(&self, slug: &str, domain: &str) -> Result<Option<Tenant>> {
        self.fetch_one(select_where(
            Expr::col(Tenants::Slug)
                .eq(slug)
                .or(Expr::col(Tenants::Domain).eq(domain)),
        ))
        .await
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>> {
        self.fetch_one(select_where(Expr::col(Tenants::Domain).eq(domain))).await
    }

    async fn find_by_team(&self, team_id: i64) -> Result<Option<Tenant>> {
        self.fetch_one(select_where(Expr::col(Tenants::TeamId).eq(team_id))).await
    }

    async fn find_by_schema(&self, schema: &str) -> Result<Option<Tenant>> {
        self.fetch_one(select_where(Expr::col(Tenants::Schema).eq(schema))).await
    }

    async fn insert(&self, tenant: Tenant) -> Result<Tenant> {
        debug!("Inserting tenant {}", tenant.slug);
        let statement = BACKEND.build(&insert_statement(&tenant)?);
        self.fetch_returning(statement)
            .await?
            .ok_or_else(|| TenancyError::Storage(format!("tenant {} was not inserted", tenant.slug)))
    }

    async fn update(&self, tenant: Tenant) -> Result<Tenant> {
        let id = tenant
            .id
            .ok_or_else(|| TenancyError::Storage("cannot update an unsaved tenant".to_string()))?;

        debug!("Updating tenant {}", tenant.slug);
        self.fetch_returning(BACKEND.build(&update_statement(id, &tenant)))
            .await?
            .ok_or_else(|| TenancyError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = self
            .conn
            .execute(BACKEND.build(&delete_statement(id)))
            .await
            .map_err(map_db_err)?;
        debug!("Deleted {} tenant rows for id {}", result.rows_affected(), id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Tenant>> {
        let mut query = Query::select();
        query
            .columns(COLUMNS)
            .from(Tenants::Table)
            .order_by(Tenants::Id, Order::Asc);

        let rows = self.conn.query_all(BACKEND.build(&query)).await.map_err(map_db_err)?;
        rows.iter().map(tenant_from_row).collect()
    }
}

fn create_table() -> TableCreateStatement {
    Table::create()
        .table(Tenants::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Tenants::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(Tenants::Slug).string().not_null().unique_key())
        .col(ColumnDef::new(Tenants::Schema).string().not_null().unique_key())
        .col(ColumnDef::new(Tenants::DbUsername).string().not_null().unique_key())
        .col(ColumnDef::new(Tenants::DbPassword).text().not_null())
        .col(ColumnDef::new(Tenants::Domain).string().null().unique_key())
        .col(ColumnDef::new(Tenants::TeamId).big_integer().null())
        .col(
            ColumnDef::new(Tenants::CreatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(Tenants::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned()
}

fn create_team_index() -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name("tenants_team_id_index")
        .table(Tenants::Table)
        .col(Tenants::TeamId)
        .to_owned()
}

/// First match by ascending id
fn select_where(condition: SimpleExpr) -> SelectStatement {
    Query::select()
        .columns(COLUMNS)
        .from(Tenants::Table)
        .and_where(condition)
        .order_by(Tenants::Id, Order::Asc)
        .limit(1)
        .to_owned()
}

fn unprovisioned(tenant: &Tenant, field: &str) -> TenancyError {
    TenancyError::Validation(format!("tenant {} has no {}", tenant.slug, field))
}

fn insert_statement(tenant: &Tenant) -> Result<InsertStatement> {
    let schema = tenant.schema_name().ok_or_else(|| unprovisioned(tenant, "schema"))?;
    let username = tenant.role_name().ok_or_else(|| unprovisioned(tenant, "db_username"))?;
    let password = tenant
        .db_password
        .as_deref()
        .ok_or_else(|| unprovisioned(tenant, "db_password"))?;

    let mut insert = Query::insert();
    insert
        .into_table(Tenants::Table)
        .columns([
            Tenants::Slug,
            Tenants::Schema,
            Tenants::DbUsername,
            Tenants::DbPassword,
            Tenants::Domain,
            Tenants::TeamId,
        ])
        .values([
            tenant.slug.as_str().into(),
            schema.into(),
            username.into(),
            password.into(),
            tenant.domain.clone().into(),
            tenant.team_id.into(),
        ])
        .map_err(|e| TenancyError::Storage(e.to_string()))?
        .returning(Query::returning().columns(COLUMNS));

    Ok(insert)
}

/// Only `domain` and `team_id` are mutable once provisioned.
fn update_statement(id: i64, tenant: &Tenant) -> UpdateStatement {
    Query::update()
        .table(Tenants::Table)
        .values([
            (Tenants::Domain, tenant.domain.clone().into()),
            (Tenants::TeamId, tenant.team_id.into()),
            (Tenants::UpdatedAt, Expr::current_timestamp().into()),
        ])
        .and_where(Expr::col(Tenants::Id).eq(id))
        .returning(Query::returning().columns(COLUMNS))
        .to_owned()
}

fn delete_statement(id: i64) -> DeleteStatement {
    Query::delete()
        .from_table(Tenants::Table)
        .and_where(Expr::col(Tenants::Id).eq(id))
        .to_owned()
}

fn tenant_from_row(row: &QueryResult) -> Result<Tenant> {
    Ok(Tenant {
        id: Some(row.try_get_by::<i64, _>("id").map_err(map_db_err)?),
        slug: row.try_get_by("slug").map_err(map_db_err)?,
        schema: row.try_get_by("schema").map_err(map_db_err)?,
        db_username: row.try_get_by("db_username").map_err(map_db_err)?,
        db_password: row.try_get_by("db_password").map_err(map_db_err)?,
        domain: row.try_get_by("domain").map_err(map_db_err)?,
        team_id: row.try_get_by("team_id").map_err(map_db_err)?,
        created_at: row
            .try_get_by::<Option<DateTime<Utc>>, _>("created_at")
            .map_err(map_db_err)?,
        updated_at: row
            .try_get_by::<Option<DateTime<Utc>>, _>("updated_at")
            .map_err(map_db_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Value;

    fn provisioned() -> Tenant {
        let mut tenant = Tenant::new("acme")
            .with_schema("t_acme")
            .with_db_username("u_acme")
            .with_domain("acme.io");
        tenant.db_password = Some("ciphertext".to_string());
        tenant.team_id = Some(7);
        tenant
    }

    fn values(statement: &Statement) -> Vec<Value> {
        statement.values.as_ref().map(|v| v.0.clone()).unwrap_or_default()
    }

    #[test]
    fn test_create_table_sql() {
        let sql = BACKEND.build(&create_table()).sql;
        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "tenants""#));
        assert!(sql.contains(r#""id" bigserial"#));
        assert!(sql.contains("PRIMARY KEY"));
        assert!(sql.contains(r#""slug" varchar NOT NULL UNIQUE"#));
        assert!(sql.contains(r#""db_password" text NOT NULL"#));
        assert!(sql.contains(r#""team_id" bigint"#));
        assert!(sql.contains(r#""created_at" timestamp with time zone"#));
        assert!(sql.contains("CURRENT_TIMESTAMP"));

        let index = BACKEND.build(&create_team_index()).sql;
        assert!(index.contains(r#""tenants_team_id_index""#));
        assert!(index.contains(r#"ON "tenants" ("team_id")"#));
    }

    #[test]
    fn test_lookup_is_parameterized_and_ordered() {
        let statement = BACKEND.build(&select_where(
            Expr::col(Tenants::Slug)
                .eq("acme")
                .or(Expr::col(Tenants::Domain).eq("acme.example.com")),
        ));

        assert!(statement.sql.contains(r#"WHERE "slug" = $1 OR "domain" = $2"#));
        assert!(statement.sql.ends_with(r#"ORDER BY "id" ASC LIMIT $3"#));
        assert!(!statement.sql.contains("acme"));
        assert_eq!(values(&statement)[0], Value::from("acme"));
    }

    #[test]
    fn test_insert_requires_provisioned_tenant() {
        let err = insert_statement(&Tenant::new("acme")).unwrap_err();
        assert!(matches!(err, TenancyError::Validation(ref m) if m.contains("schema")));
    }

    #[test]
    fn test_insert_statement() {
        let statement = BACKEND.build(&insert_statement(&provisioned()).unwrap());

        assert!(statement.sql.starts_with(
            r#"INSERT INTO "tenants" ("slug", "schema", "db_username", "db_password", "domain", "team_id")"#
        ));
        assert!(statement.sql.contains(r#"RETURNING "id", "slug""#));
        assert!(!statement.sql.contains("ciphertext"));

        let values = values(&statement);
        assert_eq!(values.len(), 6);
        assert_eq!(values[3], Value::from("ciphertext"));
        assert_eq!(values[5], Value::from(Some(7i64)));
    }

    #[test]
    fn test_update_touches_mutable_columns_only() {
        let statement = BACKEND.build(&update_statement(3, &provisioned()));

        assert!(statement.sql.starts_with(r#"UPDATE "tenants" SET "domain" = $1, "team_id" = $2"#));
        assert!(statement.sql.contains(r#""updated_at" = CURRENT_TIMESTAMP"#));
        assert!(statement.sql.contains(r#"WHERE "id" = $3"#));
        assert!(!statement.sql.contains(r#""schema" ="#));
        assert!(!statement.sql.contains(r#""db_password" ="#));
    }

    #[test]
    fn test_delete_statement() {
        let statement = BACKEND.build(&delete_statement(9));
        assert_eq!(statement.sql, r#"DELETE FROM "tenants" WHERE "id" = $1"#);
        assert_eq!(values(&statement), vec![Value::from(9i64)]);
    }
}
