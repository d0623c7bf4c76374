use crate::state::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use carchat::carquery::{CarQueryClient, Trim, TrimQuery};
use carchat::systems::car::{search_trims, PowerRange};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Makes queried when the user only picked a body or fuel filter
pub const POPULAR_MAKES: [&str; 10] = [
    "Toyota",
    "BMW",
    "Ford",
    "Honda",
    "Volkswagen",
    "Mercedes-Benz",
    "Audi",
    "Hyundai",
    "Kia",
    "Tesla",
];

/// Stop fanning out over makes once this many trims are collected
pub const FAN_OUT_TARGET: usize = 50;

pub const MAX_RESULTS: usize = 12;

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    fuel: String,
}

#[derive(Debug, PartialEq, Serialize)]
struct SearchResult {
    id: String,
    make: String,
    model: String,
    year: String,
    trim: String,
    body: String,
    power: String,
    engine: String,
    drive: String,
}

impl From<&Trim> for SearchResult {
    fn from(trim: &Trim) -> Self {
        let field = |key: &str| trim.text(key).unwrap_or_default();
        Self {
            id: field("model_id"),
            make: field("model_make_id"),
            model: field("model_name"),
            year: field("model_year"),
            trim: field("model_trim"),
            body: field("model_body"),
            power: field("model_engine_power_ps"),
            engine: field("model_engine_type"),
            drive: field("model_drive"),
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// First word is the make, the rest (if any) the model
pub fn split_query(q: &str) -> (Option<String>, Option<String>) {
    let mut words = q.split_whitespace();
    let make = words.next().map(str::to_string);
    let model = words.collect::<Vec<_>>().join(" ");
    (make, (!model.is_empty()).then_some(model))
}

async fn collect_trims(
    cars: &CarQueryClient,
    params: &SearchParams,
) -> anyhow::Result<Vec<Trim>> {
    let (make, model) = split_query(&params.q);
    let body = non_empty(&params.body);
    let fuel = non_empty(&params.fuel);

    if let Some(make) = make {
        let query = TrimQuery::new(make)
            .with_model(model)
            .with_body(body)
            .with_fuel_type(fuel);
        return search_trims(cars, &query, PowerRange::default()).await;
    }

    if body.is_none() && fuel.is_none() {
        return Ok(Vec::new());
    }

    let mut trims = Vec::new();
    for make in POPULAR_MAKES {
        let query = TrimQuery::new(make).with_body(body).with_fuel_type(fuel);
        trims.extend(search_trims(cars, &query, PowerRange::default()).await?);
        if trims.len() >= FAN_OUT_TARGET {
            break;
        }
    }
    Ok(trims)
}

/// Keep the first trim of every (make, model, year) and stop at `limit`
pub fn dedupe(trims: &[Trim], limit: usize) -> Vec<&Trim> {
    let mut seen = HashSet::new();
    trims
        .iter()
        .filter(|trim| {
            let key = ["model_make_id", "model_name", "model_year"]
                .map(|field| trim.text(field).unwrap_or_default());
            seen.insert(key)
        })
        .take(limit)
        .collect()
}

async fn handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponse> {
    let trims = match collect_trims(&state.cars, &params).await {
        Ok(trims) => trims,
        Err(err) => {
            warn!(q = %params.q, "search failed: {:#}", err);
            Vec::new()
        }
    };
    debug!(q = %params.q, found = trims.len(), "search");

    let results = dedupe(&trims, MAX_RESULTS)
        .into_iter()
        .map(SearchResult::from)
        .collect();
    Json(SearchResponse { results })
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/search", get(handler))
        .with_state(state)
}
