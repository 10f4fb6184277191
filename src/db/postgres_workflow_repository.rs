use crate::{
    db::workflow_repository::WorkflowRepository,
    models::execution::{Execution, NewExecution},
    models::workflow::{Workflow, WorkflowEdge, WorkflowNode},
    utils::pagination::PageRequest,
};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

pub struct PostgresWorkflowRepository {
    pub pool: PgPool,
}

const WORKFLOW_COLUMNS: &str = "id, user_id, name, nodes, edges, created_at, updated_at";
const EXECUTION_COLUMNS: &str =
    "id, workflow_id, user_id, timestamp, input, output, status, duration, error, logs";

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn create_workflow(
        &self,
        user_id: Uuid,
        name: &str,
        nodes: &[WorkflowNode],
        edges: &[WorkflowEdge],
    ) -> Result<Workflow, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO workflows (user_id, name, nodes, edges, created_at, updated_at)
            VALUES ($1, $2, $3, $4, now(), now())
            RETURNING {WORKFLOW_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Workflow>(&sql)
            .bind(user_id)
            .bind(name)
            .bind(Json(nodes))
            .bind(Json(edges))
            .fetch_one(&self.pool)
            .await
    }

    async fn list_workflows_by_user(&self, user_id: Uuid) -> Result<Vec<Workflow>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {WORKFLOW_COLUMNS}
            FROM workflows
            WHERE user_id = $1
            ORDER BY updated_at DESC
            "#
        );
        sqlx::query_as::<_, Workflow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn find_workflow_by_id(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {WORKFLOW_COLUMNS}
            FROM workflows
            WHERE user_id = $1 AND id = $2
            "#
        );
        sqlx::query_as::<_, Workflow>(&sql)
            .bind(user_id)
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn update_workflow(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
        name: &str,
        nodes: &[WorkflowNode],
        edges: &[WorkflowEdge],
    ) -> Result<Option<Workflow>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE workflows
            SET name = $3, nodes = $4, edges = $5, updated_at = now()
            WHERE user_id = $1 AND id = $2
            RETURNING {WORKFLOW_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Workflow>(&sql)
            .bind(user_id)
            .bind(workflow_id)
            .bind(name)
            .bind(Json(nodes))
            .bind(Json(edges))
            .fetch_optional(&self.pool)
            .await
    }

    async fn rename_workflow(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
        name: &str,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE workflows
            SET name = $3, updated_at = now()
            WHERE user_id = $1 AND id = $2
            RETURNING {WORKFLOW_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Workflow>(&sql)
            .bind(user_id)
            .bind(workflow_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    async fn delete_workflow(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM workflows
            WHERE user_id = $1 AND id = $2
            "#,
        )
        .bind(user_id)
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_execution(&self, execution: NewExecution) -> Result<Execution, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO executions
                (id, workflow_id, user_id, timestamp, input, output, status, duration, error, logs)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET id = EXCLUDED.id
            RETURNING {EXECUTION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Execution>(&sql)
            .bind(execution.id)
            .bind(execution.workflow_id)
            .bind(execution.user_id)
            .bind(execution.timestamp)
            .bind(&execution.input)
            .bind(&execution.output)
            .bind(execution.status.as_str())
            .bind(execution.duration_ms)
            .bind(&execution.error)
            .bind(Json(&execution.logs))
            .fetch_one(&self.pool)
            .await
    }

    async fn list_executions(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
        page: Option<PageRequest>,
    ) -> Result<(Vec<Execution>, u64), sqlx::Error> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM executions
            WHERE user_id = $1 AND workflow_id = $2
            "#,
        )
        .bind(user_id)
        .bind(workflow_id)
        .fetch_one(&self.pool)
        .await?;

        let (limit, offset) = page.map_or((None, 0), |p| (Some(p.limit()), p.offset()));
        let sql = format!(
            r#"
            SELECT {EXECUTION_COLUMNS}
            FROM executions
            WHERE user_id = $1 AND workflow_id = $2
            ORDER BY timestamp DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query_as::<_, Execution>(&sql)
            .bind(user_id)
            .bind(workflow_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((rows, total.max(0) as u64))
    }

    async fn find_execution(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
        execution_id: Uuid,
    ) -> Result<Option<Execution>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {EXECUTION_COLUMNS}
            FROM executions
            WHERE user_id = $1 AND workflow_id = $2 AND id = $3
            "#
        );
        sqlx::query_as::<_, Execution>(&sql)
            .bind(user_id)
            .bind(workflow_id)
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await
    }
}
