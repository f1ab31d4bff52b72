use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    models::{Task, TaskInput, TaskQuery, TaskUpdate},
    store::postgres::contains_pattern,
};
use actix_web::{delete, get, patch, post, web, HttpResponse, Responder};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

const TASK_COLUMNS: &str =
    "id, title, description, priority, status, due_date, created_at, updated_at, user_id, assigned_to";

/// Tasks the caller owns or is assigned to. The caller's id is bound as `$1`.
const VISIBLE_TO_CALLER: &str = "(user_id = $1 OR assigned_to = $1)";

/// Retrieves the tasks the authenticated user owns or is assigned to.
///
/// Supports filtering by `status`, `priority`, `assignedTo` (user ID), and a
/// `search` term matched case-insensitively against titles and descriptions.
/// Tasks are ordered by creation date, newest first.
///
/// ## Responses:
/// - `200 OK`: Returns a JSON array of `Task` objects.
/// - `400 Bad Request`: If a filter has an unknown value.
/// - `401 Unauthorized` / `403 Forbidden`: Missing or invalid access token.
#[get("")]
pub async fn get_tasks(
    pool: web::Data<PgPool>,
    query_params: web::Query<TaskQuery>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let mut sql = format!("SELECT {} FROM tasks WHERE {}", TASK_COLUMNS, VISIBLE_TO_CALLER);
    let mut param_count = 2;

    if query_params.status.is_some() {
        sql.push_str(&format!(" AND status = ${}", param_count));
        param_count += 1;
    }
    if query_params.priority.is_some() {
        sql.push_str(&format!(" AND priority = ${}", param_count));
        param_count += 1;
    }
    if query_params.assigned_to.is_some() {
        sql.push_str(&format!(" AND assigned_to = ${}", param_count));
        param_count += 1;
    }
    if query_params.search.is_some() {
        sql.push_str(&format!(
            " AND (title ILIKE ${0} ESCAPE '\\' OR description ILIKE ${0} ESCAPE '\\')",
            param_count
        ));
    }

    sql.push_str(" ORDER BY created_at DESC");

    let mut query_builder = sqlx::query_as::<_, Task>(&sql).bind(user.0.id);

    if let Some(status) = query_params.status {
        query_builder = query_builder.bind(status);
    }
    if let Some(priority) = query_params.priority {
        query_builder = query_builder.bind(priority);
    }
    if let Some(assigned_to) = query_params.assigned_to {
        query_builder = query_builder.bind(assigned_to);
    }
    if let Some(search) = &query_params.search {
        query_builder = query_builder.bind(contains_pattern(search));
    }

    let tasks = query_builder.fetch_all(&**pool).await?;

    Ok(HttpResponse::Ok().json(tasks))
}

/// Creates a new task owned by the authenticated user.
///
/// ## Responses:
/// - `201 Created`: Returns the newly created `Task`.
/// - `400 Bad Request`: Malformed JSON or unknown enum value.
/// - `422 Unprocessable Entity`: Title or description length out of range.
#[post("")]
pub async fn create_task(
    pool: web::Data<PgPool>,
    task_data: web::Json<TaskInput>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;

    let task = Task::new(task_data.into_inner(), user.0.id);

    let result = sqlx::query_as::<_, Task>(&format!(
        "INSERT INTO tasks (id, title, description, priority, status, due_date, user_id, assigned_to) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {}",
        TASK_COLUMNS
    ))
    .bind(task.id)
    .bind(task.title)
    .bind(task.description)
    .bind(task.priority)
    .bind(task.status)
    .bind(task.due_date)
    .bind(task.user_id)
    .bind(task.assigned_to)
    .fetch_one(&**pool)
    .await?;

    Ok(HttpResponse::Created().json(result))
}

/// Retrieves a task by its ID.
///
/// A task the caller neither owns nor is assigned to is reported as
/// `404 Not Found`.
#[get("/{id}")]
pub async fn get_task(
    pool: web::Data<PgPool>,
    task_id: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let task = find_visible_task(&pool, task_id.into_inner(), user.0.id).await?;

    Ok(HttpResponse::Ok().json(task))
}

async fn find_visible_task(pool: &PgPool, task_id: Uuid, caller: Uuid) -> Result<Task, AppError> {
    sqlx::query_as::<_, Task>(&format!(
        "SELECT {} FROM tasks WHERE {} AND id = $2",
        TASK_COLUMNS, VISIBLE_TO_CALLER
    ))
    .bind(caller)
    .bind(task_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Task not found".into()))
}

/// Partially updates a task.
///
/// Omitted fields keep their stored value. The owner may change any field;
/// an assignee may only change `status` and gets `403 Forbidden` otherwise.
#[patch("/{id}")]
pub async fn update_task(
    pool: web::Data<PgPool>,
    task_id: web::Path<Uuid>,
    task_data: web::Json<TaskUpdate>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;
    let changes = task_data.into_inner();
    let task_id = task_id.into_inner();

    let current = find_visible_task(&pool, task_id, user.0.id).await?;
    if current.user_id != user.0.id && !changes.is_status_only() {
        return Err(AppError::Forbidden(
            "Only the task owner can change fields other than status".into(),
        ));
    }

    let result = sqlx::query_as::<_, Task>(&format!(
        "UPDATE tasks SET \
             title = COALESCE($3, title), \
             description = COALESCE($4, description), \
             priority = COALESCE($5, priority), \
             status = COALESCE($6, status), \
             due_date = COALESCE($7, due_date), \
             assigned_to = COALESCE($8, assigned_to), \
             updated_at = NOW() \
         WHERE {} AND id = $2 \
         RETURNING {}",
        VISIBLE_TO_CALLER, TASK_COLUMNS
    ))
    .bind(user.0.id)
    .bind(task_id)
    .bind(changes.title)
    .bind(changes.description)
    .bind(changes.priority)
    .bind(changes.status)
    .bind(changes.due_date)
    .bind(changes.assigned_to)
    .fetch_optional(&**pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Task not found".into()))?;

    Ok(HttpResponse::Ok().json(result))
}

/// Deletes a task the authenticated user owns. Assignees cannot delete.
#[delete("/{id}")]
pub async fn delete_task(
    pool: web::Data<PgPool>,
    task_id: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
        .bind(task_id.into_inner())
        .bind(user.0.id)
        .execute(&**pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Task not found".into()));
    }

    Ok(HttpResponse::NoContent().finish())
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(get_tasks)
        .service(create_task)
        .service(get_task)
        .service(update_task)
        .service(delete_task);
}
