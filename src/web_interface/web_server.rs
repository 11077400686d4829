use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::routes;
use super::types::ApiError;
use crate::access_control::gate::AccessDenied;
use crate::error_handling::types::WebError;
use crate::storage::store_trait::Store;

/// Web server for the accreditation HTTP API.
pub struct WebServer {
    store: Arc<dyn Store>,
    changes_limit: u64,
}

impl WebServer {
    /// Create a new WebServer instance
    pub fn new(store: Arc<dyn Store>, changes_limit: u64) -> Self {
        Self {
            store,
            changes_limit,
        }
    }

    /// Start the web server on the given address
    pub async fn start(&self, addr: SocketAddr) -> Result<(), WebError> {
        let api = api_routes(self.store.clone(), self.changes_limit);
        info!("listening on http://{}", addr);
        warp::serve(api).run(addr).await;
        Ok(())
    }
}

/// Compose every route plus the rejection handler. The fixed-segment
/// routes (`/duplicates`, `/changes`, `/bulk`) are chained before the
/// `/:id` routes so they are matched first.
pub fn api_routes(
    store: Arc<dyn Store>,
    changes_limit: u64,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    routes::duplicates_route(store.clone())
        .or(routes::changes_route(store.clone(), changes_limit))
        .or(routes::bulk_route(store.clone()))
        .or(routes::create_route(store.clone()))
        .or(routes::list_route(store.clone()))
        .or(routes::get_route(store.clone()))
        .or(routes::status_route(store.clone()))
        .or(routes::transfer_route(store.clone()))
        .or(routes::return_route(store.clone()))
        .or(routes::archive_route(store.clone()))
        .or(routes::movements_route(store.clone()))
        .or(routes::record_zone_route(store.clone()))
        .or(routes::zone_time_route(store.clone()))
        .or(routes::history_route(store.clone()))
        .or(routes::info_route(store.clone()))
        .or(routes::add_vehicle_route(store.clone()))
        .or(routes::update_vehicle_route(store.clone()))
        .or(routes::remove_vehicle_route(store.clone()))
        .or(routes::email_sent_route(store.clone()))
        .or(routes::zones_route(store.clone()))
        .or(routes::events_route(store))
        .recover(handle_rejection)
}

/// Turn rejections into JSON error responses.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(denied) = err.find::<AccessDenied>() {
        return Ok(reply::with_status(
            reply::json(&ApiError {
                message: denied.message.clone(),
            }),
            denied.status,
        ));
    }
    if err.is_not_found() {
        return Ok(reply::with_status(
            reply::json(&ApiError {
                message: "Not found".to_string(),
            }),
            StatusCode::NOT_FOUND,
        ));
    }
    if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        return Ok(reply::with_status(
            reply::json(&ApiError {
                message: "Invalid request body".to_string(),
            }),
            StatusCode::BAD_REQUEST,
        ));
    }
    if err.find::<warp::reject::InvalidQuery>().is_some() {
        return Ok(reply::with_status(
            reply::json(&ApiError {
                message: "Invalid query string".to_string(),
            }),
            StatusCode::BAD_REQUEST,
        ));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(reply::with_status(
            reply::json(&ApiError {
                message: "Method not allowed".to_string(),
            }),
            StatusCode::METHOD_NOT_ALLOWED,
        ));
    }
    error!("unhandled rejection: {:?}", err);
    Ok(reply::with_status(
        reply::json(&ApiError {
            message: "Internal error".to_string(),
        }),
        StatusCode::INTERNAL_SERVER_ERROR,
    ))
}
