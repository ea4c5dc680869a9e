use serde_json::Value;
use sqlx::{PgPool, types::Json};

#[derive(Debug, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: String,
    pub data: Json<Value>,
}

/// All documents of `collection`, ordered by `nombre` with byte-wise collation.
pub async fn list_ordered_by_name(
    pool: &PgPool,
    collection: &str,
) -> sqlx::Result<Vec<DocumentRow>> {
    sqlx::query_as::<_, DocumentRow>(
        r#"
        SELECT id, data
        FROM documents
        WHERE collection = $1
        ORDER BY data->>'nombre' COLLATE "C" ASC, id ASC
        "#,
    )
    .bind(collection)
    .fetch_all(pool)
    .await
}

pub async fn insert(pool: &PgPool, collection: &str, id: &str, data: &Value) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
        .bind(collection)
        .bind(id)
        .bind(Json(data))
        .execute(pool)
        .await?;

    Ok(())
}

/// Merges `fields` into the stored document. Returns the number of rows touched.
pub async fn patch(pool: &PgPool, collection: &str, id: &str, fields: &Value) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE documents
        SET data = data || $3, updated_at = NOW()
        WHERE collection = $1 AND id = $2
        "#,
    )
    .bind(collection)
    .bind(id)
    .bind(Json(fields))
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn delete(pool: &PgPool, collection: &str, id: &str) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
        .bind(collection)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
