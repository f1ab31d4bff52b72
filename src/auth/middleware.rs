use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;

use super::claims::AccessClaims;
use super::service::{authorize, AuthService};
use crate::error::AppError;
use crate::models::Role;

/// Verifies the bearer token and attaches the [`AccessClaims`] to the request.
///
/// Needs `web::Data<AuthService>` in the app data. A rejection is rendered
/// here as the error response, so outer layers still see the request.
pub struct Authenticate;

impl<S, B> Transform<S, ServiceRequest> for Authenticate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AuthenticateMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticateMiddleware { service }))
    }
}

pub struct AuthenticateMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthenticateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let outcome = match req.app_data::<web::Data<AuthService>>() {
            Some(auth) => auth.authenticate(req.headers()).map_err(AppError::from),
            None => Err(AppError::InternalServerError(
                "AuthService is not registered as app data".into(),
            )),
        };

        match outcome {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            Err(app_err) => {
                let res = req.error_response(app_err).map_into_right_body();
                Box::pin(ready(Ok(res)))
            }
        }
    }
}

/// Admits the request only if the attached claims carry one of the given roles.
///
/// Must run inside [`Authenticate`]; since the last `wrap` is the outermost
/// layer, register it before `Authenticate`:
///
/// ```ignore
/// web::scope("/admin")
///     .wrap(RequireRole::admin())
///     .wrap(Authenticate)
/// ```
pub struct RequireRole {
    roles: Rc<Vec<Role>>,
}

impl RequireRole {
    pub fn new(roles: &[Role]) -> Self {
        Self {
            roles: Rc::new(roles.to_vec()),
        }
    }

    pub fn admin() -> Self {
        Self::new(&[Role::Admin])
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RequireRoleMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireRoleMiddleware {
            service,
            roles: Rc::clone(&self.roles),
        }))
    }
}

pub struct RequireRoleMiddleware<S> {
    service: S,
    roles: Rc<Vec<Role>>,
}

impl<S, B> Service<ServiceRequest> for RequireRoleMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let verdict = authorize(req.extensions().get::<AccessClaims>(), &self.roles);

        match verdict {
            Ok(()) => {
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            Err(auth_err) => {
                log::warn!("{} {} denied: {}", req.method(), req.path(), auth_err);
                let res = req
                    .error_response(AppError::from(auth_err))
                    .map_into_right_body();
                Box::pin(ready(Ok(res)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenService;
    use crate::models::Identity;
    use crate::store::MemoryCredentialStore;
    use actix_web::{http::StatusCode, test, App, HttpResponse};
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn auth_service() -> AuthService {
        AuthService::new(
            Arc::new(MemoryCredentialStore::new()),
            TokenService::new("access-secret", "refresh-secret"),
        )
    }

    fn identity(role: Role) -> Identity {
        let now = Utc::now();
        Identity {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            password_hash: String::new(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn whoami(req: actix_web::HttpRequest) -> HttpResponse {
        let email = req
            .extensions()
            .get::<AccessClaims>()
            .map(|claims| claims.email.clone())
            .unwrap_or_default();
        HttpResponse::Ok().body(email)
    }

    #[actix_rt::test]
    async fn test_authenticate_attaches_claims() {
        let auth = auth_service();
        let token = auth.tokens().issue_access_token(&identity(Role::User)).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(auth))
                .service(web::resource("/me").wrap(Authenticate).to(whoami)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "a@x.com");

        let req = test::TestRequest::get().uri("/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Authentication token is required");

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", "Bearer tampered"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn test_require_role() {
        let auth = auth_service();
        let admin = auth.tokens().issue_access_token(&identity(Role::Admin)).unwrap();
        let user = auth.tokens().issue_access_token(&identity(Role::User)).unwrap();
        let app = test::init_service(
            App::new().app_data(web::Data::new(auth)).service(
                web::resource("/admin")
                    .wrap(RequireRole::admin())
                    .wrap(Authenticate)
                    .to(whoami),
            ),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/admin")
            .insert_header(("Authorization", format!("Bearer {}", admin)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/admin")
            .insert_header(("Authorization", format!("Bearer {}", user)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        // The claims stay attached to the rejected request.
        assert!(resp.request().extensions().get::<AccessClaims>().is_some());
    }

    #[actix_rt::test]
    async fn test_require_role_without_authentication() {
        let app = test::init_service(
            App::new().service(web::resource("/admin").wrap(RequireRole::admin()).to(whoami)),
        )
        .await;

        let req = test::TestRequest::get().uri("/admin").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
