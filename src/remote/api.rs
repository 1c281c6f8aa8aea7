use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::error::StoreError;
use crate::model::Row;
use crate::remote::types::{decode_filters_only, decode_query, ErrorBody, REST_PREFIX, REST_VERSION};
use crate::RosterDb;

fn with_db(db: Arc<RosterDb>) -> impl Filter<Extract = (Arc<RosterDb>,), Error = Infallible> + Clone {
    warp::any().map(move || db.clone())
}

fn respond(result: Result<Value, StoreError>, ok: StatusCode) -> Response {
    match result {
        Ok(body) => warp::reply::with_status(warp::reply::json(&body), ok).into_response(),
        Err(e) => {
            let body = ErrorBody::from(&e);
            let status = StatusCode::from_u16(body.status()).unwrap_or(StatusCode::BAD_REQUEST);
            tracing::debug!(code = %body.code, error = %e, "request failed");
            warp::reply::with_status(warp::reply::json(&body), status).into_response()
        }
    }
}

fn rows(rows: Vec<Row>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}

/// `/rest/v1/{table}` (GET, POST, PATCH) and `/rest/v1/rpc/{name}` (POST)
/// over `db`.
pub fn routes(db: Arc<RosterDb>) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let base = warp::path(REST_PREFIX).and(warp::path(REST_VERSION));

    // 1. POST /rest/v1/rpc/{name}
    let rpc = warp::post()
    .and(base.clone())
    .and(warp::path("rpc"))
    .and(warp::path::param::<String>())
    .and(warp::path::end())
    .and(warp::body::json())
    .and(with_db(db.clone()))
    .map(|name: String, args: Value, db: Arc<RosterDb>| {
        tracing::debug!(procedure = %name, "rpc");
        respond(db.call(&name, &args), StatusCode::OK)
    });

    // 2. GET /rest/v1/{table}?col=op.value&order=..&offset=..&limit=..
    let select = warp::get()
    .and(base.clone())
    .and(warp::path::param::<String>())
    .and(warp::path::end())
    .and(warp::query::<Vec<(String, String)>>())
    .and(with_db(db.clone()))
    .map(|table: String, pairs: Vec<(String, String)>, db: Arc<RosterDb>| {
        let result = decode_query(&pairs).and_then(|q| db.select(&table, &q)).map(rows);
        respond(result, StatusCode::OK)
    });

    // 3. POST /rest/v1/{table}
    let insert = warp::post()
    .and(base.clone())
    .and(warp::path::param::<String>())
    .and(warp::path::end())
    .and(warp::body::json())
    .and(with_db(db.clone()))
    .map(|table: String, row: Row, db: Arc<RosterDb>| {
        let result = db.insert_row(&table, row).map(|r| rows(vec![r]));
        respond(result, StatusCode::CREATED)
    });

    // 4. PATCH /rest/v1/{table}?col=op.value
    let update = warp::patch()
    .and(base.clone())
    .and(warp::path::param::<String>())
    .and(warp::path::end())
    .and(warp::query::<Vec<(String, String)>>())
    .and(warp::body::json())
    .and(with_db(db))
    .map(|table: String, pairs: Vec<(String, String)>, patch: Row, db: Arc<RosterDb>| {
        let result = decode_filters_only(&pairs)
        .and_then(|filters| db.update_rows(&table, &filters, &patch))
        .map(rows);
        respond(result, StatusCode::OK)
    });

    // rpc first so "rpc" is never taken for a table name
    rpc.or(select).unify().or(insert).unify().or(update).unify()
}

/// Serves `db` on `addr` until `shutdown` resolves. Returns the bound
/// address and the server future.
pub fn serve(
    db: Arc<RosterDb>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), warp::Error> {
    warp::serve(routes(db)).try_bind_with_graceful_shutdown(addr, shutdown)
}
