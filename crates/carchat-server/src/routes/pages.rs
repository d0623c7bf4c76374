use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use carchat::systems::car::comparison_row;
use serde_json::json;
use tracing::{error, warn};

fn render(state: &AppState, status: StatusCode, name: &str, data: serde_json::Value) -> Response {
    match state.pages.render(name, &data) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => {
            error!(template = name, "failed to render page: {:?}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

fn page(state: &AppState, name: &str) -> Response {
    render(
        state,
        StatusCode::OK,
        &format!("{}.html", name),
        json!({ "active": name }),
    )
}

async fn index(State(state): State<AppState>) -> Response {
    page(&state, "index")
}

async fn profil(State(state): State<AppState>) -> Response {
    page(&state, "profil")
}

async fn ulubione(State(state): State<AppState>) -> Response {
    page(&state, "ulubione")
}

async fn sprzedaj(State(state): State<AppState>) -> Response {
    page(&state, "sprzedaj")
}

async fn porownaj(State(state): State<AppState>) -> Response {
    page(&state, "porownaj")
}

async fn car_detail(State(state): State<AppState>, Path(car_id): Path<String>) -> Response {
    match state.cars.get_model(&car_id).await {
        Ok(Some(car)) => {
            let heading = ["model_make_id", "model_name", "model_year"]
                .iter()
                .filter_map(|field| car.text(field))
                .collect::<Vec<_>>()
                .join(" ");
            render(
                &state,
                StatusCode::OK,
                "car_detail.html",
                json!({
                    "heading": heading,
                    "trim": car.text("model_trim").unwrap_or_default(),
                    "id": car.text("model_id").unwrap_or(car_id),
                    "specs": comparison_row(&car),
                }),
            )
        }
        Ok(None) => render(
            &state,
            StatusCode::NOT_FOUND,
            "error.html",
            json!({ "message": "Nie znaleziono samochodu o podanym ID." }),
        ),
        Err(err) => {
            warn!(car_id = %car_id, "car lookup failed: {:#}", err);
            render(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                "error.html",
                json!({ "message": format!("Błąd podczas pobierania danych: {:#}", err) }),
            )
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/profil", get(profil))
        .route("/ulubione", get(ulubione))
        .route("/sprzedaj", get(sprzedaj))
        .route("/porownaj", get(porownaj))
        .route("/car/:id", get(car_detail))
        .with_state(state)
}
