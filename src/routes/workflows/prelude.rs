pub(crate) use std::{convert::Infallible, time::Duration};

pub(crate) use async_stream::stream;
pub(crate) use axum::response::sse::{Event, KeepAlive, Sse};
pub(crate) use axum::{
    body::Bytes,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
pub(crate) use serde::Deserialize;
pub(crate) use serde_json::{json, Value};
pub(crate) use uuid::Uuid;

pub(crate) use crate::{
    engine::{Graph, GraphError},
    models::workflow::{RenameWorkflow, SaveWorkflow},
    responses::JsonResponse,
    routes::auth::session::AuthSession,
    state::AppState,
};
