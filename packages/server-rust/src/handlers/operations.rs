//! Operation inspection, waiting, and cancellation endpoints.

use std::collections::HashMap;

use crate::request::RequestContext;
use crate::response::{
    bad_request, empty_sync_response, internal_error, smart_error, sync_response, ApiResponse,
};

/// `GET /1.0/operations` -- lists live operations grouped by lowercase
/// status name. With `recursion=1` the groups contain full renders,
/// otherwise operation URLs.
pub async fn operations_get(ctx: RequestContext) -> ApiResponse {
    let recursion = ctx.is_recursion();

    let mut groups: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
    for op in ctx.state().registry().operations() {
        let (url, snapshot) = op.render();
        let status = snapshot.status.to_lowercase();
        let entry = groups.entry(status).or_default();

        if recursion {
            match serde_json::to_value(snapshot) {
                Ok(rendered) => entry.push(rendered),
                Err(err) => return internal_error(err),
            }
        } else {
            entry.push(serde_json::Value::String(url));
        }
    }

    sync_response(true, &groups).into_response()
}

/// `GET /1.0/operations/{id}` -- the operation's current render, or 404
/// once it finished or never existed.
pub async fn operation_get(ctx: RequestContext) -> ApiResponse {
    let Some(id) = ctx.path_param("id") else {
        return bad_request("missing operation id");
    };

    match ctx.state().registry().get(id) {
        Ok(op) => {
            let (_, snapshot) = op.render();
            sync_response(true, &snapshot).into_response()
        }
        Err(err) => smart_error(err.into()),
    }
}

/// `GET /1.0/operations/{id}/wait?timeout=N` -- blocks until the operation
/// is final, then returns its render. The timeout is in seconds and
/// defaults to -1 (wait forever); 0 returns the current state
/// immediately. An expired timeout surfaces as an internal error.
pub async fn operation_wait_get(ctx: RequestContext) -> ApiResponse {
    let timeout = match ctx.query_param("timeout") {
        Some(raw) => match raw.parse::<i64>() {
            Ok(value) => value,
            Err(err) => return smart_error(err.into()),
        },
        None => -1,
    };

    let Some(id) = ctx.path_param("id") else {
        return bad_request("missing operation id");
    };

    let op = match ctx.state().registry().get(id) {
        Ok(op) => op,
        Err(err) => return smart_error(err.into()),
    };

    if let Err(err) = op.wait_final(timeout).await {
        return internal_error(err);
    }

    let (_, snapshot) = op.render();
    sync_response(true, &snapshot).into_response()
}

/// `DELETE /1.0/operations/{id}` -- requests cancellation of a running
/// operation.
pub async fn operation_delete(ctx: RequestContext) -> ApiResponse {
    let Some(id) = ctx.path_param("id") else {
        return bad_request("missing operation id");
    };

    let op = match ctx.state().registry().get(id) {
        Ok(op) => op,
        Err(err) => return smart_error(err.into()),
    };

    match op.cancel() {
        Ok(()) => empty_sync_response(),
        Err(err) => smart_error(err.into()),
    }
}
