use crate::state::AppState;
use axum::{extract::State, routing::post, Json, Router};
use carchat::carquery::Trim;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Default, Deserialize)]
struct CarsRequest {
    #[serde(default)]
    ids: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct CarsResponse {
    cars: Vec<Trim>,
}

/// Ids arrive as strings or numbers from the favorites list
fn id_text(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn handler(
    State(state): State<AppState>,
    request: Option<Json<CarsRequest>>,
) -> Json<CarsResponse> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let mut cars = Vec::new();

    for id in request.ids.iter().filter_map(id_text) {
        match state.cars.get_model(&id).await {
            Ok(Some(car)) => cars.push(car),
            Ok(None) => {}
            Err(err) => warn!(car_id = %id, "skipping car: {:#}", err),
        }
    }

    Json(CarsResponse { cars })
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/cars", post(handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{app, post_json, send_json};
    use axum::http::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_cars_skips_unknown_and_failed_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("model", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"cb([{"model_id":"1","model_name":"Civic"}]);"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("model", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("cb([]);"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("model", "3"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (status, body) = send_json(
            app(None, &server.uri()),
            post_json("/api/cars", json!({"ids": [1, "2", "3"]})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"cars": [{"model_id": "1", "model_name": "Civic"}]}));
    }

    #[tokio::test]
    async fn test_cars_without_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("cb([]);"))
            .expect(0)
            .mount(&server)
            .await;

        let (status, body) =
            send_json(app(None, &server.uri()), post_json("/api/cars", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"cars": []}));
    }
}
