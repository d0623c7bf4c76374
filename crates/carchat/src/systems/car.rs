use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use tracing::{debug, warn};

use super::System;
use crate::carquery::{CarQueryClient, Trim, TrimQuery};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

/// Most trims handed to the model from one search
pub const SEARCH_RESULT_LIMIT: usize = 15;

/// Placeholder for values CarQuery does not know ("brak danych")
pub const MISSING_VALUE: &str = "b/d";

const TRUNCATION_NOTE: &str = "Wyniki ograniczone do 15. Zawęź kryteria wyszukiwania.";
const NO_DATA_NOTE: &str = "Brak danych w bazie CarQuery";

/// Row labels of a comparison, paired with the trim field each one reads
pub const COMPARISON_FIELDS: [(&str, &str); 15] = [
    ("model_make_id", "Marka"),
    ("model_name", "Model"),
    ("model_year", "Rok"),
    ("model_trim", "Wersja"),
    ("model_body", "Nadwozie"),
    ("model_engine_type", "Typ silnika"),
    ("model_engine_cc", "Pojemność [cc]"),
    ("model_engine_power_ps", "Moc [KM]"),
    ("model_engine_torque_nm", "Moment [Nm]"),
    ("model_drive", "Napęd"),
    ("model_transmission_type", "Skrzynia"),
    ("model_weight_kg", "Masa [kg]"),
    ("model_fuel_cap_l", "Zbiornik [l]"),
    ("model_doors", "Drzwi"),
    ("model_seats", "Miejsca"),
];

/// The closed set of tools the assistant may call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CarTool {
    SearchCars,
    GetCarDetails,
    CompareCars,
    GetMakes,
    GetModels,
}

type Handler = for<'a> fn(&'a CarQueryClient, Value) -> BoxFuture<'a, AgentResult<Value>>;

macro_rules! handler {
    ($tool:ident) => {{
        fn run(client: &CarQueryClient, input: Value) -> BoxFuture<'_, AgentResult<Value>> {
            Box::pin($tool(client, input))
        }
        run as Handler
    }};
}

/// A registered tool: the schema advertised to the model and the code that serves it
struct ToolEntry {
    tool: Tool,
    handler: Handler,
}

impl CarTool {
    fn entry(self) -> ToolEntry {
        let (description, input_schema, handler): (&str, Value, Handler) = match self {
            CarTool::SearchCars => (
                "Wyszukaj samochody w bazie CarQuery wg kryteriów. Zwraca listę wersji (trims) z danymi technicznymi.",
                json!({
                    "type": "object",
                    "properties": {
                        "make": {"type": "string", "description": "Marka samochodu (np. 'Toyota', 'BMW'). Wymagane."},
                        "model": {"type": "string", "description": "Model samochodu (np. 'Corolla', 'X5'). Opcjonalne."},
                        "year": {"type": "string", "description": "Rok produkcji (np. '2020'). Opcjonalne."},
                        "body": {"type": "string", "description": "Typ nadwozia (np. 'SUV', 'Sedan', 'Hatchback'). Opcjonalne."},
                        "min_power": {"type": "string", "description": "Minimalna moc w KM. Opcjonalne."},
                        "max_power": {"type": "string", "description": "Maksymalna moc w KM. Opcjonalne."},
                        "fuel_type": {"type": "string", "description": "Rodzaj paliwa (np. 'Gasoline', 'Diesel', 'Electric'). Opcjonalne."},
                        "drive": {"type": "string", "description": "Typ napędu (np. 'Front', 'Rear', 'All'). Opcjonalne."}
                    },
                    "required": ["make"]
                }),
                handler!(search_cars),
            ),
            CarTool::GetCarDetails => (
                "Pobierz szczegółowe dane techniczne konkretnego modelu na podstawie jego ID z CarQuery.",
                json!({
                    "type": "object",
                    "properties": {
                        "model_id": {"type": "string", "description": "ID modelu z CarQuery (pole model_id z wyników wyszukiwania)."}
                    },
                    "required": ["model_id"]
                }),
                handler!(get_car_details),
            ),
            CarTool::CompareCars => (
                "Porównaj 2 lub więcej samochodów. Podaj marki i modele do porównania. Opcjonalnie podaj rok.",
                json!({
                    "type": "object",
                    "properties": {
                        "cars": {
                            "type": "array",
                            "description": "Lista samochodów do porównania. Każdy element to obiekt z polami make, model, year (opcjonalne).",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "make": {"type": "string", "description": "Marka"},
                                    "model": {"type": "string", "description": "Model"},
                                    "year": {"type": "string", "description": "Rok (opcjonalnie)"}
                                },
                                "required": ["make", "model"]
                            }
                        }
                    },
                    "required": ["cars"]
                }),
                handler!(compare_cars),
            ),
            CarTool::GetMakes => (
                "Pobierz listę wszystkich marek samochodów dostępnych w bazie, opcjonalnie filtrując po roku.",
                json!({
                    "type": "object",
                    "properties": {
                        "year": {"type": "string", "description": "Rok produkcji do filtrowania (opcjonalne)."}
                    },
                    "required": []
                }),
                handler!(get_makes),
            ),
            CarTool::GetModels => (
                "Pobierz listę modeli dla danej marki.",
                json!({
                    "type": "object",
                    "properties": {
                        "make": {"type": "string", "description": "Marka samochodu."},
                        "year": {"type": "string", "description": "Rok produkcji (opcjonalne)."},
                        "body": {"type": "string", "description": "Typ nadwozia (opcjonalne)."}
                    },
                    "required": ["make"]
                }),
                handler!(get_models),
            ),
        };

        ToolEntry {
            tool: Tool::new(self.to_string(), description, input_schema),
            handler,
        }
    }
}

/// Car lookup tools backed by CarQuery
pub struct CarSystem {
    client: CarQueryClient,
    tools: Vec<Tool>,
    entries: HashMap<CarTool, ToolEntry>,
}

impl CarSystem {
    pub fn new(client: CarQueryClient) -> Self {
        let entries: HashMap<CarTool, ToolEntry> =
            CarTool::iter().map(|kind| (kind, kind.entry())).collect();
        let tools = CarTool::iter()
            .filter_map(|kind| entries.get(&kind))
            .map(|entry| entry.tool.clone())
            .collect();

        Self {
            client,
            tools,
            entries,
        }
    }

    /// Run a tool by name and return the JSON text handed to the model.
    ///
    /// Never fails: errors are rendered as `{"error": "..."}`.
    pub async fn execute(&self, name: &str, input: Value) -> String {
        match self.call(ToolCall::new(name, input)).await {
            Ok(value) => value.to_string(),
            Err(err) => err.to_payload().to_string(),
        }
    }
}

#[async_trait]
impl System for CarSystem {
    fn name(&self) -> &str {
        "carquery"
    }

    fn description(&self) -> &str {
        "Wyszukiwanie i porównywanie samochodów w bazie CarQuery API."
    }

    fn instructions(&self) -> &str {
        "Używaj search_cars do wyszukiwania wersji, get_car_details do szczegółów po model_id, \
        compare_cars do zestawień oraz get_makes i get_models do przeglądania oferty. \
        Wartość \"b/d\" oznacza brak danych."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        let entry = CarTool::from_str(&tool_call.name)
            .ok()
            .and_then(|kind| self.entries.get(&kind))
            .ok_or_else(|| AgentError::ToolNotFound(tool_call.name.clone()))?;

        debug!(tool = %tool_call.name, arguments = %tool_call.arguments, "calling car tool");
        let result = (entry.handler)(&self.client, tool_call.arguments).await;
        if let Err(err) = &result {
            warn!(tool = %tool_call.name, error = %err, "car tool failed");
        }
        result
    }
}

/// Accept strings or numbers for free-form fields, treating blanks as absent
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

fn parse_input<T: for<'de> Deserialize<'de>>(input: Value) -> AgentResult<T> {
    serde_json::from_value(input).map_err(|e| AgentError::InvalidParameters(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: T) -> AgentResult<Value> {
    serde_json::to_value(value).map_err(|e| AgentError::Internal(e.to_string()))
}

/// Inclusive horsepower bounds applied after fetching trims
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl PowerRange {
    pub fn is_active(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    pub fn contains(&self, power: i64) -> bool {
        self.min.map_or(true, |min| power >= min) && self.max.map_or(true, |max| power <= max)
    }
}

/// Keep trims whose power is a known integer inside the range.
///
/// With no bounds set every trim is kept, including ones without a power figure.
pub fn filter_by_power(trims: Vec<Trim>, range: PowerRange) -> Vec<Trim> {
    if !range.is_active() {
        return trims;
    }
    trims
        .into_iter()
        .filter(|trim| trim.power_ps().is_some_and(|power| range.contains(power)))
        .collect()
}

/// Fetch trims from CarQuery and apply the client-side power filter
pub async fn search_trims(
    client: &CarQueryClient,
    query: &TrimQuery,
    power: PowerRange,
) -> anyhow::Result<Vec<Trim>> {
    let trims = client.get_trims(query).await?;
    Ok(filter_by_power(trims, power))
}

/// One comparison row with the fixed label set, missing values rendered as "b/d"
pub fn comparison_row(trim: &Trim) -> Map<String, Value> {
    COMPARISON_FIELDS
        .iter()
        .map(|(field, label)| {
            let value = trim
                .text(field)
                .unwrap_or_else(|| MISSING_VALUE.to_string());
            (label.to_string(), Value::String(value))
        })
        .collect()
}

fn truncate_results(mut trims: Vec<Trim>) -> AgentResult<Value> {
    if trims.len() <= SEARCH_RESULT_LIMIT {
        return to_value(trims);
    }
    trims.truncate(SEARCH_RESULT_LIMIT);
    let mut results = match to_value(trims)? {
        Value::Array(items) => items,
        other => vec![other],
    };
    results.push(json!({ "_note": TRUNCATION_NOTE }));
    Ok(Value::Array(results))
}

#[derive(Debug, Deserialize)]
struct SearchCarsInput {
    #[serde(default, deserialize_with = "loose_string")]
    make: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    model: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    year: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    body: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    min_power: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    max_power: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    fuel_type: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    drive: Option<String>,
}

fn parse_bound(name: &str, value: Option<String>) -> AgentResult<Option<i64>> {
    value
        .map(|v| {
            v.parse::<i64>()
                .map_err(|_| AgentError::InvalidParameters(format!("{} must be an integer, got '{}'", name, v)))
        })
        .transpose()
}

async fn search_cars(client: &CarQueryClient, input: Value) -> AgentResult<Value> {
    let input: SearchCarsInput = parse_input(input)?;
    let make = input
        .make
        .ok_or_else(|| AgentError::InvalidParameters("make is required".to_string()))?;
    let power = PowerRange {
        min: parse_bound("min_power", input.min_power)?,
        max: parse_bound("max_power", input.max_power)?,
    };

    let query = TrimQuery::new(make)
        .with_model(input.model)
        .with_year(input.year)
        .with_body(input.body)
        .with_fuel_type(input.fuel_type)
        .with_drive(input.drive);

    let trims = search_trims(client, &query, power).await?;
    debug!(count = trims.len(), "search_cars matched trims");
    truncate_results(trims)
}

#[derive(Debug, Deserialize)]
struct CarDetailsInput {
    #[serde(default, deserialize_with = "loose_string")]
    model_id: Option<String>,
}

async fn get_car_details(client: &CarQueryClient, input: Value) -> AgentResult<Value> {
    let input: CarDetailsInput = parse_input(input)?;
    let model_id = input
        .model_id
        .ok_or_else(|| AgentError::InvalidParameters("model_id is required".to_string()))?;

    match client.get_model(&model_id).await? {
        Some(trim) => to_value(trim),
        None => Err(AgentError::NotFound),
    }
}

#[derive(Debug, Deserialize)]
struct CarRef {
    make: String,
    model: String,
    #[serde(default, deserialize_with = "loose_string")]
    year: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompareCarsInput {
    cars: Vec<CarRef>,
}

async fn compare_cars(client: &CarQueryClient, input: Value) -> AgentResult<Value> {
    let input: CompareCarsInput = parse_input(input)?;

    let mut rows = Vec::with_capacity(input.cars.len());
    for car in &input.cars {
        let query = TrimQuery::new(car.make.as_str())
            .with_model(Some(car.model.as_str()))
            .with_year(car.year.as_deref());

        let first = match client.get_trims(&query).await {
            Ok(trims) => trims.into_iter().next(),
            Err(err) => {
                warn!(make = %car.make, model = %car.model, error = %format!("{:#}", err), "comparison lookup failed");
                None
            }
        };
        let spec = first.unwrap_or_else(|| placeholder(car));
        rows.push(Value::Object(comparison_row(&spec)));
    }

    Ok(Value::Array(rows))
}

fn placeholder(car: &CarRef) -> Trim {
    let mut trim = Trim::default();
    trim.insert("model_make_id", Value::String(car.make.clone()));
    trim.insert("model_name", Value::String(car.model.clone()));
    trim.insert("_note", Value::String(NO_DATA_NOTE.to_string()));
    trim
}

#[derive(Debug, Deserialize)]
struct MakesInput {
    #[serde(default, deserialize_with = "loose_string")]
    year: Option<String>,
}

async fn get_makes(client: &CarQueryClient, input: Value) -> AgentResult<Value> {
    // the model sometimes sends null instead of an empty object
    let input: MakesInput = if input.is_null() {
        MakesInput { year: None }
    } else {
        parse_input(input)?
    };
    to_value(client.get_makes(input.year.as_deref()).await?)
}

#[derive(Debug, Deserialize)]
struct ModelsInput {
    #[serde(default, deserialize_with = "loose_string")]
    make: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    year: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    body: Option<String>,
}

async fn get_models(client: &CarQueryClient, input: Value) -> AgentResult<Value> {
    let input: ModelsInput = parse_input(input)?;
    let make = input
        .make
        .ok_or_else(|| AgentError::InvalidParameters("make is required".to_string()))?;
    let models = client
        .get_models(&make, input.year.as_deref(), input.body.as_deref())
        .await?;
    to_value(models)
}
