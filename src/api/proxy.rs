//! Authenticated fallback that relays requests upstream and trims responses
//! to what the key may see.
use axum::{
    Extension,
    body::Bytes,
    http::{HeaderMap, HeaderValue, Method, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{info, warn};

use crate::SharedState;
use crate::actions::{Action, map_record_type_to_string};
use crate::auth::{Authenticated, Authorized};
use crate::error::AppError;
use crate::evaluator;
use crate::permissions::KeyInfo;

pub async fn forward(
    Extension(state): Extension<SharedState>,
    Authenticated(key): Authenticated,
    Authorized(parsed): Authorized,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let path_and_query = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let upstream = state
        .upstream
        .forward(method, path_and_query, content_type, body)
        .await
        .map_err(|e| {
            warn!(error = %e, action = %parsed.action, "upstream request failed");
            AppError::BadGateway("upstream request failed".into())
        })?;

    info!(
        key_id = key.key_id,
        action = %parsed.action,
        zone_id = parsed.zone_id,
        status = upstream.status.as_u16(),
        "proxied request"
    );

    let filterable = upstream.status.is_success() && upstream.is_json();
    let mut body = upstream.body;
    if filterable {
        if let Ok(mut doc) = serde_json::from_slice::<Value>(&body) {
            if filter_response(&key, parsed.action, parsed.zone_id, &mut doc) {
                body = Bytes::from(serde_json::to_vec(&doc).map_err(AppError::internal)?);
            }
        }
    }

    let mut res = (upstream.status, body).into_response();
    if let Some(ct) = upstream
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        res.headers_mut().insert(header::CONTENT_TYPE, ct);
    }
    Ok(res)
}

/// Apply list filtering for the given action. Returns whether `doc` changed.
pub fn filter_response(key: &KeyInfo, action: Action, zone_id: i64, doc: &mut Value) -> bool {
    match action {
        Action::ListZones => filter_zones(key, doc),
        Action::GetZone | Action::ListRecords => filter_records(key, zone_id, doc),
        _ => false,
    }
}

/// Keep only `Items` whose `Id` is a permitted zone.
pub fn filter_zones(key: &KeyInfo, doc: &mut Value) -> bool {
    let Some(permitted) = evaluator::get_permitted_zone_ids(Some(key)) else {
        return false;
    };
    let Some(items) = doc.get_mut("Items").and_then(Value::as_array_mut) else {
        return false;
    };

    items.retain(|zone| {
        zone.get("Id")
            .and_then(Value::as_i64)
            .is_some_and(|id| permitted.contains(&id))
    });
    let total = items.len();

    if let Some(obj) = doc.as_object_mut() {
        obj.insert("TotalItems".into(), Value::from(total));
        obj.insert("HasMoreItems".into(), Value::Bool(false));
    }
    true
}

/// Keep only records whose wire `Type` maps to a permitted type name.
///
/// Accepts either a zone object with `Records` or a bare record array.
pub fn filter_records(key: &KeyInfo, zone_id: i64, doc: &mut Value) -> bool {
    let Some(permitted) = evaluator::get_permitted_record_types(Some(key), zone_id) else {
        return false;
    };

    let records = match doc {
        Value::Array(records) => records,
        Value::Object(obj) => match obj.get_mut("Records").and_then(Value::as_array_mut) {
            Some(records) => records,
            None => return false,
        },
        _ => return false,
    };

    records.retain(|record| {
        let name = record
            .get("Type")
            .and_then(Value::as_i64)
            .map_or("", map_record_type_to_string);
        !name.is_empty() && permitted.iter().any(|t| t == name)
    });
    true
}
