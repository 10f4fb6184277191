use futures::TryStreamExt;
use serde_json::{json, Map, Value};
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Column, ConnectOptions, Connection, Either, Executor, PgConnection, Row, TypeInfo};
use time::format_description::well_known::Rfc3339;
use tokio::time::timeout;
use tracing::debug;

use super::NodeContext;

const DEFAULT_PORT: u16 = 5432;

pub(super) async fn run(ctx: &mut NodeContext<'_>) -> Result<String, String> {
    let node = ctx.node;
    let host = node.config_str("host").unwrap_or_else(|| "localhost".to_string());
    let port = match node.config_str("port") {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|_| format!("Invalid port `{raw}`"))?,
        None => DEFAULT_PORT,
    };
    let database = node
        .config_str("database")
        .ok_or_else(|| "Database name is required".to_string())?;
    let username = node
        .config_str("username")
        .ok_or_else(|| "Username is required".to_string())?;
    let password = node.config_str("password").unwrap_or_default();
    let query = node
        .config_str("query")
        .ok_or_else(|| "SQL query is required".to_string())?;

    let options = PgConnectOptions::new()
        .host(&host)
        .port(port)
        .database(&database)
        .username(&username)
        .password(&password);
    let limit = ctx.env.settings.pg_query_timeout;

    debug!(node_id = %node.id, %host, port, %database, "connecting to postgres");
    let mut conn = timeout(limit, options.connect())
        .await
        .map_err(|_| "Connecting to the database timed out".to_string())?
        .map_err(|e| format!("Failed to connect to the database: {e}"))?;

    let result = timeout(limit, execute_query(&mut conn, &query))
        .await
        .map_err(|_| "Query timed out".to_string())?;
    let _ = conn.close().await;
    let output = result.map_err(|e| format!("Query failed: {e}"))?;

    ctx.emit_output(&output);
    Ok(output)
}

/// Runs `query` through the simple protocol and keeps whatever comes back:
/// rows from any statement that yields them, the affected count otherwise.
async fn execute_query(conn: &mut PgConnection, query: &str) -> Result<String, sqlx::Error> {
    let mut stream = (&mut *conn).fetch_many(sqlx::raw_sql(query));
    let mut rows = Vec::new();
    let mut affected = 0u64;
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => affected += done.rows_affected(),
            Either::Right(row) => rows.push(row),
        }
    }
    Ok(query_output(&rows, affected).to_string())
}

fn query_output(rows: &[PgRow], affected: u64) -> Value {
    let Some(first) = rows.first() else {
        let message = if affected == 0 {
            "Query executed, no rows returned".to_string()
        } else {
            format!("Statement executed, {affected} rows affected")
        };
        return json!({
            "success": true,
            "message": message,
            "columns": [],
            "data": [],
            "row_count": affected
        });
    };

    let columns: Vec<Value> = first
        .columns()
        .iter()
        .map(|col| json!({"name": col.name(), "type": col.type_info().name()}))
        .collect();

    let data: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (i, col) in row.columns().iter().enumerate() {
                object.insert(col.name().to_string(), cell_to_json(row, i, col.type_info().name()));
            }
            Value::Object(object)
        })
        .collect();

    json!({
        "success": true,
        "message": format!("Query executed, {} rows returned", data.len()),
        "columns": columns,
        "row_count": data.len(),
        "data": data,
    })
}

fn cell_to_json(row: &PgRow, i: usize, type_name: &str) -> Value {
    fn get<'r, T>(row: &'r PgRow, i: usize) -> Option<T>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get::<Option<T>, _>(i).ok().flatten()
    }

    let value = match type_name {
        "BOOL" => get::<bool>(row, i).map(Value::from),
        "INT2" => get::<i16>(row, i).map(Value::from),
        "INT4" => get::<i32>(row, i).map(Value::from),
        "INT8" => get::<i64>(row, i).map(Value::from),
        "FLOAT4" => get::<f32>(row, i).map(Value::from),
        "FLOAT8" => get::<f64>(row, i).map(Value::from),
        "JSON" | "JSONB" => get::<Value>(row, i),
        "UUID" => get::<uuid::Uuid>(row, i).map(|u| Value::String(u.to_string())),
        "TIMESTAMPTZ" => get::<time::OffsetDateTime>(row, i)
            .and_then(|t| t.format(&Rfc3339).ok())
            .map(Value::String),
        "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, i)
            .map(|t| Value::String(t.format("%Y-%m-%d %H:%M:%S").to_string())),
        "DATE" => get::<chrono::NaiveDate>(row, i)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        "TEXT[]" | "VARCHAR[]" => get::<Vec<String>>(row, i).map(Value::from),
        "INT4[]" => get::<Vec<i32>>(row, i).map(Value::from),
        "INT8[]" => get::<Vec<i64>>(row, i).map(Value::from),
        _ => get::<String>(row, i).map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::tests::node;
    use crate::engine::nodes::test_support::{env, run_node};
    use serde_json::json;

    #[test]
    fn empty_result_has_stable_shape() {
        assert_eq!(
            query_output(&[], 0),
            json!({
                "success": true,
                "message": "Query executed, no rows returned",
                "columns": [],
                "data": [],
                "row_count": 0
            })
        );
        assert_eq!(
            query_output(&[], 3),
            json!({
                "success": true,
                "message": "Statement executed, 3 rows affected",
                "columns": [],
                "data": [],
                "row_count": 3
            })
        );
    }

    async fn test_connection() -> PgConnection {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
        PgConnection::connect(&url).await.expect("test database reachable")
    }

    #[tokio::test]
    #[ignore]
    async fn returns_rows_after_leading_comment_in_postgres() {
        let mut conn = test_connection().await;
        let out = execute_query(&mut conn, "-- two rows\nSELECT n FROM (VALUES (1), (2)) AS v(n)")
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["row_count"], 2);
        assert_eq!(value["data"], json!([{"n": 1}, {"n": 2}]));
    }

    #[tokio::test]
    #[ignore]
    async fn returns_rows_from_returning_on_new_line_in_postgres() {
        let mut conn = test_connection().await;
        let out = execute_query(
            &mut conn,
            "CREATE TEMP TABLE run_items (id serial, label text);\n\
             INSERT INTO run_items (label) VALUES ('a'), ('b')\nRETURNING label",
        )
        .await
        .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["row_count"], 2);
        assert_eq!(value["data"], json!([{"label": "a"}, {"label": "b"}]));

        let out = execute_query(&mut conn, "UPDATE run_items SET label = 'c'")
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["row_count"], 2);
        assert_eq!(value["data"], json!([]));
    }

    #[tokio::test]
    async fn validates_required_fields_before_connecting() {
        let env = env();
        let (out, events) = run_node(
            &env,
            &node("p", "postgresql", json!({"username": "u", "query": "select 1"})),
            "",
        )
        .await;
        assert_eq!(out.unwrap_err(), "Database name is required");
        assert!(events.is_empty());

        let (out, _) = run_node(
            &env,
            &node("p", "postgresql", json!({"database": "d", "username": "u"})),
            "",
        )
        .await;
        assert_eq!(out.unwrap_err(), "SQL query is required");

        let (out, _) = run_node(
            &env,
            &node(
                "p",
                "postgresql",
                json!({"database": "d", "username": "u", "query": "select 1", "port": "x"}),
            ),
            "",
        )
        .await;
        assert_eq!(out.unwrap_err(), "Invalid port `x`");
    }
}
