//! Per-endpoint request counting and timing.
//!
//! Endpoints are keyed by their route pattern (`GET /api/v1/config`), falling back to the
//! raw path for unmatched requests, so every unmatched 404 lands in its own bucket.

use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
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
        let start_time = Instant::now();
        let route = req
            .match_pattern()
            .unwrap_or_else(|| req.path().to_string());
        let endpoint = format!("{} {}", req.method(), route);

        let app_state = req.app_data::<web::Data<AppState>>().cloned();
        if let Some(state) = &app_state {
            state.increment_request_count();
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            let is_error = match &result {
                Ok(response) => {
                    response.status().is_client_error() || response.status().is_server_error()
                }
                Err(_) => true,
            };

            if let Some(state) = app_state {
                state.record_endpoint_request(&endpoint, duration_ms, is_error);
                if is_error {
                    state.increment_error_count();
                    tracing::debug!(endpoint = %endpoint, duration_ms, "Request ended with an error");
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::app_state;
    use actix_web::{test, App, HttpResponse};

    #[actix_web::test]
    async fn test_requests_are_counted_by_route() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(MetricsMiddleware)
                .route("/ok", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        test::call_service(&app, test::TestRequest::get().uri("/ok").to_request()).await;
        test::call_service(&app, test::TestRequest::get().uri("/missing").to_request()).await;

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.request_count, 2);
        assert_eq!(metrics.error_count, 1);
        assert_eq!(metrics.endpoint_metrics["GET /ok"].request_count, 1);
        assert_eq!(metrics.endpoint_metrics["GET /missing"].error_count, 1);
    }
}
