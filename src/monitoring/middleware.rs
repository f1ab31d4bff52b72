use actix_web::HttpMessage;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::time::Instant;

use crate::auth::AccessClaims;
use crate::models::RequestLog;
use crate::store::LogStore;

/// Records every request through the `web::Data<dyn LogStore>` in app data.
///
/// Register it outside the authentication layers so it also sees requests
/// they reject. A failed write is logged and never alters the response.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware { service }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let store = req.app_data::<web::Data<dyn LogStore>>().cloned();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

            let entry = match &result {
                Ok(res) => {
                    let mut entry =
                        RequestLog::new(&method, &path, res.status().as_u16(), duration_ms);
                    entry.error = res.response().error().map(|e| e.to_string());
                    if let Some(claims) = res.request().extensions().get::<AccessClaims>() {
                        entry.user_id = Some(claims.id);
                        entry.user_role = Some(claims.role.as_str().to_string());
                    }
                    entry
                }
                // Only reached when a layer below answers with `Err` instead of
                // a rendered response; no claims are recoverable then.
                Err(e) => {
                    let status = e.as_response_error().status_code();
                    let mut entry = RequestLog::new(&method, &path, status.as_u16(), duration_ms);
                    entry.error = Some(e.to_string());
                    entry
                }
            };

            match store {
                Some(store) => {
                    if let Err(e) = store.record(entry).await {
                        log::error!("Failed to record request log: {}", e);
                    }
                }
                None => log::warn!("No LogStore registered; request log entry dropped"),
            }

            result
        })
    }
}
