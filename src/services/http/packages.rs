use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;

use super::{call, AppState, ErrorResponse};
use crate::countdown;
use crate::models::packages::{PackageStatus, PACKAGE_TIERS};
use crate::repositories::backend::Table;
use crate::services::packages::PackageRequest;

#[derive(Deserialize)]
pub struct PurchaseForm {
    amount: f64,
}

pub async fn tiers() -> impl IntoResponse {
    let tiers: Vec<Value> = PACKAGE_TIERS
        .iter()
        .map(|tier| {
            json!({
                "amount": tier.amount,
                "title": tier.title,
                "description": tier.description,
                "expected_return": tier.expected_return(),
                "daily_yield": tier.daily_yield(),
            })
        })
        .collect();

    Json(tiers)
}

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    call(&state.package_channel, |response| PackageRequest::List { response })
        .await
        .map(|packages| (StatusCode::OK, Json(json!(packages))))
}

pub async fn purchase(
    State(state): State<AppState>,
    Json(form): Json<PurchaseForm>,
) -> impl IntoResponse {
    call(&state.package_channel, |response| PackageRequest::Purchase {
        amount: form.amount,
        response,
    })
    .await
    .map(|package| (StatusCode::CREATED, Json(json!(package))))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    call(&state.package_channel, |response| PackageRequest::Delete { id, response })
        .await
        .map(|_| StatusCode::NO_CONTENT)
}

pub async fn yields(State(state): State<AppState>) -> impl IntoResponse {
    call(&state.package_channel, |response| PackageRequest::Yields { response })
        .await
        .map(|yields| (StatusCode::OK, Json(json!(yields))))
}

fn error_event((_, Json(body)): ErrorResponse) -> Event {
    Event::default().event("error").data(body.to_string())
}

async fn refetch(state: &AppState, table: Table) -> Option<Event> {
    let event = match table {
        Table::Packages => call(&state.package_channel, |response| PackageRequest::List {
            response,
        })
        .await
        .map(|packages| Event::default().event("packages").data(json!(packages).to_string())),
        Table::DailyYields => call(&state.package_channel, |response| PackageRequest::Yields {
            response,
        })
        .await
        .map(|yields| Event::default().event("yields").data(json!(yields).to_string())),
        _ => return None,
    };

    Some(event.unwrap_or_else(error_event))
}

/// Streams the package list, refetched on every package or yield change and
/// on every activation made by the monitor.
pub async fn watch(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ErrorResponse> {
    let initial = call(&state.package_channel, |response| PackageRequest::List {
        response,
    })
    .await?;
    let first = Event::default()
        .event("packages")
        .data(json!(initial).to_string());

    let changes = state.table_changes.subscribe();
    let activations = state.monitor_events.subscribe();

    let updates = stream::unfold(
        (state, changes, activations),
        |(state, mut changes, mut activations)| async move {
            loop {
                let table = tokio::select! {
                    change = changes.recv() => match change {
                        Ok(change) => change.table,
                        Err(RecvError::Lagged(skipped)) => {
                            log::warn!("Package watch lagged by {} changes.", skipped);
                            Table::Packages
                        }
                        Err(RecvError::Closed) => return None,
                    },
                    activation = activations.recv() => match activation {
                        Ok(_) | Err(RecvError::Lagged(_)) => Table::Packages,
                        Err(RecvError::Closed) => return None,
                    },
                };

                if let Some(event) = refetch(&state, table).await {
                    return Some((Ok(event), (state, changes, activations)));
                }
            }
        },
    );

    let events = stream::once(async move { Ok::<_, Infallible>(first) }).chain(updates);

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Ticks once a second until the package matures, then sends a final
/// `expired` event and closes.
pub async fn countdown(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ErrorResponse> {
    let view = call(&state.package_channel, |response| PackageRequest::Get {
        id: id.clone(),
        response,
    })
    .await?;

    let start = match (view.package.status, view.package.activation_date) {
        (PackageStatus::Active, Some(start)) => start,
        _ => {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({"description": format!("Package {} is not active.", id)})),
            ))
        }
    };
    let package_id = view.package.id;
    let window = state.maturation;
    let clock = state.clock.clone();
    let ticker = tokio::time::interval(Duration::from_secs(1));

    let ticks = stream::unfold(Some(ticker), move |ticker| {
        let package_id = package_id.clone();
        let clock = clock.clone();

        async move {
            let Some(mut ticker) = ticker else {
                return None;
            };
            ticker.tick().await;

            let remaining = countdown::countdown(clock.now(), start, window);
            let event = Event::default().event("countdown").data(
                json!({
                    "package_id": package_id,
                    "matures_at": countdown::maturity(start, window),
                    "time_remaining": remaining.to_string(),
                    "countdown": remaining,
                })
                .to_string(),
            );

            let next = if remaining.is_expired() {
                None
            } else {
                Some(ticker)
            };
            Some((Ok::<_, Infallible>(event), next))
        }
    });

    Ok(Sse::new(ticks).keep_alive(KeepAlive::default()))
}
