use crate::{
    auth::{
        password::hash_password_blocking, AuthService, Authenticate, AuthenticatedUser,
        RegisterRequest, RequireRole, NAME_REGEX,
    },
    error::AppError,
    models::{IdentityChanges, NewIdentity, Role, UserView},
};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Partial update of a user. Omitted fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(
        length(max = 100),
        regex(path = "NAME_REGEX", message = "Name contains invalid characters")
    )]
    pub first_name: Option<String>,
    #[validate(
        length(max = 100),
        regex(path = "NAME_REGEX", message = "Name contains invalid characters")
    )]
    pub last_name: Option<String>,
    pub role: Option<Role>,
}

impl From<UpdateUserRequest> for IdentityChanges {
    fn from(request: UpdateUserRequest) -> Self {
        IdentityChanges {
            email: request.email,
            first_name: request.first_name,
            last_name: request.last_name,
            role: request.role,
        }
    }
}

/// Lists every user, oldest first.
pub async fn list_users(auth: web::Data<AuthService>) -> Result<HttpResponse, AppError> {
    let users: Vec<UserView> = auth
        .store()
        .list()
        .await?
        .iter()
        .map(UserView::from)
        .collect();

    Ok(HttpResponse::Ok().json(users))
}

/// Creates a user on behalf of an admin. No session is opened for it.
pub async fn create_user(
    auth: web::Data<AuthService>,
    user_data: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    user_data.validate()?;
    let request = user_data.into_inner();

    if auth.store().find_by_email(&request.email).await?.is_some() {
        return Err(AppError::BadRequest("User already exists".into()));
    }
    let password_hash = hash_password_blocking(request.password).await?;

    let identity = auth
        .store()
        .insert(NewIdentity {
            id: Uuid::new_v4(),
            email: request.email,
            password_hash,
            first_name: request.first_name,
            last_name: request.last_name,
            role: request.role,
            refresh_token: None,
        })
        .await?;

    Ok(HttpResponse::Created().json(UserView::from(identity)))
}

pub async fn get_user(
    auth: web::Data<AuthService>,
    user_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let identity = auth
        .store()
        .find_by_id(user_id.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(HttpResponse::Ok().json(UserView::from(identity)))
}

/// Applies a partial update. This is the only path that changes a role;
/// every role change goes to the `audit` log target.
pub async fn update_user(
    auth: web::Data<AuthService>,
    admin: AuthenticatedUser,
    user_id: web::Path<Uuid>,
    changes: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, AppError> {
    changes.validate()?;
    let user_id = user_id.into_inner();

    let before = auth
        .store()
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let updated = auth
        .store()
        .update(user_id, changes.into_inner().into())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if updated.role != before.role {
        log::info!(
            target: "audit",
            "Admin {} changed role of user {} from {} to {}",
            admin.0.id,
            updated.id,
            before.role.as_str(),
            updated.role.as_str()
        );
    }

    Ok(HttpResponse::Ok().json(UserView::from(updated)))
}

pub async fn delete_user(
    auth: web::Data<AuthService>,
    admin: AuthenticatedUser,
    user_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id.into_inner();
    if user_id == admin.0.id {
        return Err(AppError::BadRequest("Cannot delete your own account".into()));
    }

    if !auth.store().delete(user_id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    log::info!(target: "audit", "Admin {} deleted user {}", admin.0.id, user_id);

    Ok(HttpResponse::NoContent().finish())
}

/// Admin-only user management. Registered after the auth routes so that
/// `/profile` wins over `/{id}`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .wrap(RequireRole::admin())
            .wrap(Authenticate)
            .route(web::get().to(list_users))
            .route(web::post().to(create_user)),
    )
    .service(
        web::resource("/{id}")
            .wrap(RequireRole::admin())
            .wrap(Authenticate)
            .route(web::get().to(get_user))
            .route(web::patch().to(update_user))
            .route(web::delete().to(delete_user)),
    );
}
