//! HTTP middleware for chirp-service
//!
//! `JwtAuthMiddleware` validates `Authorization: Bearer` headers and stores
//! the caller's id in request extensions. Requests without the header pass
//! through untouched so that public routes share the same scope; handlers
//! that need a caller take the `UserId` extractor, which answers 401 when
//! no authenticated id was stored.

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use crypto_core::jwt::TokenIssuer;
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::AppError;

/// Authenticated caller, stored in request extensions after auth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub i64);

/// Caller if authenticated, for routes that also serve anonymous readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer(pub Option<i64>);

/// Actix middleware that validates a Bearer token with the shared issuer.
#[derive(Clone)]
pub struct JwtAuthMiddleware {
    issuer: Arc<TokenIssuer>,
}

impl JwtAuthMiddleware {
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        Self { issuer }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            issuer: self.issuer.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    issuer: Arc<TokenIssuer>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let issuer = self.issuer.clone();

        Box::pin(async move {
            let auth_header = match req.headers().get("Authorization") {
                Some(value) => Some(value.to_str().map_err(|_| {
                    AppError::Unauthorized("Invalid Authorization header".to_string())
                })?),
                None => None,
            };

            if let Some(header) = auth_header {
                let token = header.strip_prefix("Bearer ").ok_or_else(|| {
                    AppError::Unauthorized("Invalid Authorization scheme".to_string())
                })?;

                let claims = issuer
                    .validate(token)
                    .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;
                let user_id = claims
                    .user_id()
                    .map_err(|_| AppError::Unauthorized("Invalid user ID".to_string()))?;

                req.extensions_mut().insert(UserId(user_id));
            }

            service.call(req).await
        })
    }
}

impl FromRequest for UserId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<UserId>()
                .copied()
                .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()).into()),
        )
    }
}

impl FromRequest for Viewer {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(Ok(Viewer(req.extensions().get::<UserId>().map(|u| u.0))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    async fn whoami(viewer: Viewer) -> HttpResponse {
        HttpResponse::Ok().json(viewer.0)
    }

    async fn private(user: UserId) -> HttpResponse {
        HttpResponse::Ok().json(user.0)
    }

    fn issuer() -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::new("middleware-test-secret", 3600))
    }

    #[actix_web::test]
    async fn test_anonymous_passes_through() {
        let app = test::init_service(
            App::new()
                .wrap(JwtAuthMiddleware::new(issuer()))
                .route("/whoami", web::get().to(whoami))
                .route("/private", web::get().to(private)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/whoami").to_request()).await;
        assert!(resp.status().is_success());
        let body: Option<i64> = test::read_body_json(resp).await;
        assert_eq!(body, None);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/private").to_request()).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn test_valid_token_sets_user() {
        let issuer = issuer();
        let token = issuer.issue(42, "alice").unwrap();
        let app = test::init_service(
            App::new()
                .wrap(JwtAuthMiddleware::new(issuer))
                .route("/private", web::get().to(private)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/private")
            .insert_header(("Authorization", format!("Bearer {}", token.access_token)))
            .to_request();
        let body: i64 = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, 42);
    }

    #[actix_web::test]
    async fn test_bad_token_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(JwtAuthMiddleware::new(issuer()))
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        let other = TokenIssuer::new("some-other-secret", 3600)
            .issue(1, "mallory")
            .unwrap();
        for header in [
            format!("Bearer {}", other.access_token),
            "Bearer garbage".to_string(),
            format!("Token {}", other.access_token),
        ] {
            let req = test::TestRequest::get()
                .uri("/whoami")
                .insert_header(("Authorization", header))
                .to_request();
            let err = test::try_call_service(&app, req).await;
            let status = match err {
                Ok(resp) => resp.status(),
                Err(e) => e.as_response_error().status_code(),
            };
            assert_eq!(status, 401);
        }
    }
}
