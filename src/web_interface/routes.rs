use std::sync::Arc;

use log::error;
use uuid::Uuid;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::{
    AccreditationDetail, ApiError, ArchiveRequest, ChangesQuery, ListQuery, ZoneTimeQuery,
    ZoneTimeResponse,
};
use crate::access_control::gate::{with_permission, AuthedUser};
use crate::accreditation::duplicates::DuplicateProbe;
use crate::accreditation::Status;
use crate::error_handling::types::OperationError;
use crate::storage::store_trait::Store;
use crate::storage::types::{
    parse_ts, AccreditationFilter, Actor, BulkRequest, InfoUpdate, NewAccreditation, NewVehicle,
    ReturnRequest, StatusChange, TransferRequest, ZoneRecord,
};

/// Feature required by every mutating route.
pub const WRITE_FEATURE: &str = "accreditations.write";

fn with_store(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = (Arc<dyn Store>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || store.clone())
}

fn agent() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("user-agent")
}

fn actor(user: Option<&AuthedUser>, agent: Option<String>) -> Actor {
    Actor {
        user_name: user.map(|u| u.name.clone()),
        user_agent: agent,
    }
}

fn json_reply<T: serde::Serialize>(value: &T, status: StatusCode) -> reply::Response {
    reply::with_status(reply::json(value), status).into_response()
}

/// Map an operation failure to its HTTP shape. Storage failures are logged
/// in full and surfaced as an opaque 500.
fn error_reply(err: OperationError) -> reply::Response {
    let (status, message) = match &err {
        OperationError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
        OperationError::Conflict(_) => (StatusCode::CONFLICT, err.to_string()),
        OperationError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        OperationError::Storage(detail) => {
            error!("operation failed: {}", detail);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            )
        }
    };
    json_reply(&ApiError { message }, status)
}

fn bad_request(message: &str) -> reply::Response {
    json_reply(
        &ApiError {
            message: message.to_string(),
        },
        StatusCode::BAD_REQUEST,
    )
}

/// POST /accreditations (public)
pub fn create_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations")
        .and(warp::post())
        .and(warp::body::json())
        .and(agent())
        .and(with_store(store))
        .and_then(
            |input: NewAccreditation, agent: Option<String>, store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(
                    match store.create_accreditation(input, actor(None, agent)).await {
                        Ok((accreditation, vehicles)) => json_reply(
                            &AccreditationDetail {
                                accreditation,
                                vehicles,
                            },
                            StatusCode::CREATED,
                        ),
                        Err(err) => error_reply(err),
                    },
                )
            },
        )
}

/// POST /accreditations/duplicates (public)
pub fn duplicates_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / "duplicates")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_store(store))
        .and_then(|probe: DuplicateProbe, store: Arc<dyn Store>| async move {
            Ok::<_, Rejection>(match store.find_duplicates(probe).await {
                Ok(candidates) => json_reply(&candidates, StatusCode::OK),
                Err(err) => error_reply(err),
            })
        })
}

/// GET /accreditations?archived=&status=&zone=
pub fn list_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations")
        .and(warp::get())
        .and(warp::query::<ListQuery>())
        .and(with_store(store))
        .and_then(|query: ListQuery, store: Arc<dyn Store>| async move {
            let status = match &query.status {
                Some(raw) => match Status::parse(raw) {
                    Some(status) => Some(status),
                    None => return Ok::<_, Rejection>(bad_request("unknown status")),
                },
                None => None,
            };
            let filter = AccreditationFilter {
                archived: query.archived,
                status,
                zone: query.zone,
            };
            Ok::<_, Rejection>(match store.list_accreditations(filter).await {
                Ok(list) => json_reply(&list, StatusCode::OK),
                Err(err) => error_reply(err),
            })
        })
}

/// GET /accreditations/changes?since=&zone= — polled by dashboards, so the
/// response explicitly opts out of caching.
pub fn changes_route(
    store: Arc<dyn Store>,
    limit: u64,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / "changes")
        .and(warp::get())
        .and(warp::query::<ChangesQuery>())
        .and(with_store(store))
        .and_then(move |query: ChangesQuery, store: Arc<dyn Store>| async move {
            let since = match query.since.as_deref().map(parse_ts) {
                Some(Ok(since)) => since,
                Some(Err(_)) => {
                    return Ok::<_, Rejection>(bad_request("since must be RFC3339"))
                }
                None => return Ok::<_, Rejection>(bad_request("since is required")),
            };
            Ok::<_, Rejection>(match store.changes_since(since, query.zone, limit).await {
                Ok(feed) => reply::with_header(
                    reply::with_header(json_reply(&feed, StatusCode::OK), "Cache-Control", "no-store"),
                    "Pragma",
                    "no-cache",
                )
                .into_response(),
                Err(err) => error_reply(err),
            })
        })
}

/// POST /accreditations/bulk
pub fn bulk_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / "bulk")
        .and(warp::post())
        .and(with_permission(store.clone(), WRITE_FEATURE))
        .and(warp::body::json())
        .and(agent())
        .and(with_store(store))
        .and_then(
            |user: AuthedUser,
             request: BulkRequest,
             agent: Option<String>,
             store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(
                    match store.bulk_apply(request, actor(Some(&user), agent)).await {
                        Ok(outcome) => json_reply(&outcome, StatusCode::OK),
                        Err(err) => error_reply(err),
                    },
                )
            },
        )
}

/// GET /accreditations/:id
pub fn get_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid)
        .and(warp::get())
        .and(with_store(store))
        .and_then(|id: Uuid, store: Arc<dyn Store>| async move {
            Ok::<_, Rejection>(match store.get_accreditation(id).await {
                Ok((accreditation, vehicles)) => json_reply(
                    &AccreditationDetail {
                        accreditation,
                        vehicles,
                    },
                    StatusCode::OK,
                ),
                Err(err) => error_reply(err),
            })
        })
}

/// POST /accreditations/:id/status
pub fn status_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "status")
        .and(warp::post())
        .and(with_permission(store.clone(), WRITE_FEATURE))
        .and(warp::body::json())
        .and(agent())
        .and(with_store(store))
        .and_then(
            |id: Uuid,
             user: AuthedUser,
             change: StatusChange,
             agent: Option<String>,
             store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(
                    match store.set_status(id, change, actor(Some(&user), agent)).await {
                        Ok(updated) => json_reply(&updated, StatusCode::OK),
                        Err(err) => error_reply(err),
                    },
                )
            },
        )
}

/// POST /accreditations/:id/transfer
pub fn transfer_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "transfer")
        .and(warp::post())
        .and(with_permission(store.clone(), WRITE_FEATURE))
        .and(warp::body::json())
        .and(agent())
        .and(with_store(store))
        .and_then(
            |id: Uuid,
             user: AuthedUser,
             request: TransferRequest,
             agent: Option<String>,
             store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(
                    match store.transfer(id, request, actor(Some(&user), agent)).await {
                        Ok(updated) => json_reply(&updated, StatusCode::OK),
                        Err(err) => error_reply(err),
                    },
                )
            },
        )
}

/// POST /accreditations/:id/return
pub fn return_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "return")
        .and(warp::post())
        .and(with_permission(store.clone(), WRITE_FEATURE))
        .and(warp::body::json())
        .and(agent())
        .and(with_store(store))
        .and_then(
            |id: Uuid,
             user: AuthedUser,
             request: ReturnRequest,
             agent: Option<String>,
             store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(
                    match store
                        .return_to_venue(id, request, actor(Some(&user), agent))
                        .await
                    {
                        Ok(outcome) => json_reply(&outcome, StatusCode::OK),
                        Err(err) => error_reply(err),
                    },
                )
            },
        )
}

/// POST /accreditations/:id/archive
pub fn archive_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "archive")
        .and(warp::post())
        .and(with_permission(store.clone(), WRITE_FEATURE))
        .and(warp::body::json())
        .and(agent())
        .and(with_store(store))
        .and_then(
            |id: Uuid,
             user: AuthedUser,
             request: ArchiveRequest,
             agent: Option<String>,
             store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(
                    match store
                        .set_archived(id, request.archive, actor(Some(&user), agent))
                        .await
                    {
                        Ok(updated) => json_reply(&updated, StatusCode::OK),
                        Err(err) => error_reply(err),
                    },
                )
            },
        )
}

/// GET /accreditations/:id/zones — movement log
pub fn movements_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "zones")
        .and(warp::get())
        .and(with_store(store))
        .and_then(|id: Uuid, store: Arc<dyn Store>| async move {
            Ok::<_, Rejection>(match store.zone_movements(id).await {
                Ok(movements) => json_reply(&movements, StatusCode::OK),
                Err(err) => error_reply(err),
            })
        })
}

/// POST /accreditations/:id/zones — record an entry or exit
pub fn record_zone_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "zones")
        .and(warp::post())
        .and(with_permission(store.clone(), WRITE_FEATURE))
        .and(warp::body::json())
        .and(agent())
        .and(with_store(store))
        .and_then(
            |id: Uuid,
             user: AuthedUser,
             record: ZoneRecord,
             agent: Option<String>,
             store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(
                    match store.record_zone(id, record, actor(Some(&user), agent)).await {
                        Ok(updated) => json_reply(&updated, StatusCode::OK),
                        Err(err) => error_reply(err),
                    },
                )
            },
        )
}

/// GET /accreditations/:id/zone-time?zone=
pub fn zone_time_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "zone-time")
        .and(warp::get())
        .and(warp::query::<ZoneTimeQuery>())
        .and(with_store(store))
        .and_then(
            |id: Uuid, query: ZoneTimeQuery, store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(match store.zone_time(id, query.zone).await {
                    Ok(totals_ms) => json_reply(
                        &ZoneTimeResponse {
                            accreditation_id: id,
                            totals_ms,
                        },
                        StatusCode::OK,
                    ),
                    Err(err) => error_reply(err),
                })
            },
        )
}

/// GET /accreditations/:id/history
pub fn history_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "history")
        .and(warp::get())
        .and(with_store(store))
        .and_then(|id: Uuid, store: Arc<dyn Store>| async move {
            Ok::<_, Rejection>(match store.history(id).await {
                Ok(entries) => json_reply(&entries, StatusCode::OK),
                Err(err) => error_reply(err),
            })
        })
}

/// POST /accreditations/:id/info
pub fn info_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "info")
        .and(warp::post())
        .and(with_permission(store.clone(), WRITE_FEATURE))
        .and(warp::body::json())
        .and(agent())
        .and(with_store(store))
        .and_then(
            |id: Uuid,
             user: AuthedUser,
             update: InfoUpdate,
             agent: Option<String>,
             store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(
                    match store.update_info(id, update, actor(Some(&user), agent)).await {
                        Ok(updated) => json_reply(&updated, StatusCode::OK),
                        Err(err) => error_reply(err),
                    },
                )
            },
        )
}

/// POST /accreditations/:id/vehicles
pub fn add_vehicle_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "vehicles")
        .and(warp::post())
        .and(with_permission(store.clone(), WRITE_FEATURE))
        .and(warp::body::json())
        .and(agent())
        .and(with_store(store))
        .and_then(
            |id: Uuid,
             user: AuthedUser,
             vehicle: NewVehicle,
             agent: Option<String>,
             store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(
                    match store.add_vehicle(id, vehicle, actor(Some(&user), agent)).await {
                        Ok(added) => json_reply(&added, StatusCode::CREATED),
                        Err(err) => error_reply(err),
                    },
                )
            },
        )
}

/// PUT /accreditations/:id/vehicles/:vehicleId
pub fn update_vehicle_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "vehicles" / Uuid)
        .and(warp::put())
        .and(with_permission(store.clone(), WRITE_FEATURE))
        .and(warp::body::json())
        .and(agent())
        .and(with_store(store))
        .and_then(
            |id: Uuid,
             vehicle_id: Uuid,
             user: AuthedUser,
             vehicle: NewVehicle,
             agent: Option<String>,
             store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(
                    match store
                        .update_vehicle(id, vehicle_id, vehicle, actor(Some(&user), agent))
                        .await
                    {
                        Ok(updated) => json_reply(&updated, StatusCode::OK),
                        Err(err) => error_reply(err),
                    },
                )
            },
        )
}

/// DELETE /accreditations/:id/vehicles/:vehicleId
pub fn remove_vehicle_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "vehicles" / Uuid)
        .and(warp::delete())
        .and(with_permission(store.clone(), WRITE_FEATURE))
        .and(agent())
        .and(with_store(store))
        .and_then(
            |id: Uuid,
             vehicle_id: Uuid,
             user: AuthedUser,
             agent: Option<String>,
             store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(
                    match store
                        .remove_vehicle(id, vehicle_id, actor(Some(&user), agent))
                        .await
                    {
                        Ok(()) => json_reply(&serde_json::json!({}), StatusCode::OK),
                        Err(err) => error_reply(err),
                    },
                )
            },
        )
}

/// POST /accreditations/:id/email-sent
pub fn email_sent_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accreditations" / Uuid / "email-sent")
        .and(warp::post())
        .and(with_permission(store.clone(), WRITE_FEATURE))
        .and(agent())
        .and(with_store(store))
        .and_then(
            |id: Uuid, user: AuthedUser, agent: Option<String>, store: Arc<dyn Store>| async move {
                Ok::<_, Rejection>(
                    match store.mark_email_sent(id, actor(Some(&user), agent)).await {
                        Ok(updated) => json_reply(&updated, StatusCode::OK),
                        Err(err) => error_reply(err),
                    },
                )
            },
        )
}

/// GET /zones — reference data
pub fn zones_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("zones")
        .and(warp::get())
        .and(with_store(store))
        .and_then(|store: Arc<dyn Store>| async move {
            Ok::<_, Rejection>(match store.zones().await {
                Ok(zones) => json_reply(&zones, StatusCode::OK),
                Err(err) => error_reply(err),
            })
        })
}

/// GET /events — reference data
pub fn events_route(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("events")
        .and(warp::get())
        .and(with_store(store))
        .and_then(|store: Arc<dyn Store>| async move {
            Ok::<_, Rejection>(match store.events().await {
                Ok(events) => json_reply(&events, StatusCode::OK),
                Err(err) => error_reply(err),
            })
        })
}
