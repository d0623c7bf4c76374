use std::sync::Arc;

use anyhow::Result;
use carchat::agent::Agent;
use carchat::carquery::CarQueryClient;
use carchat::providers::anthropic::AnthropicProvider;
use carchat::systems::car::CarSystem;
use tracing::{info, warn};

use crate::configuration::Settings;
use crate::pages::Pages;

/// Shared application state, built once at startup
#[derive(Clone)]
pub struct AppState {
    /// `None` when no Anthropic key is configured; `/chat` then answers with an error
    pub agent: Option<Arc<Agent>>,
    pub cars: CarQueryClient,
    pub pages: Arc<Pages>,
}

impl AppState {
    pub fn new(agent: Option<Agent>, cars: CarQueryClient) -> Result<Self> {
        Ok(Self {
            agent: agent.map(Arc::new),
            cars,
            pages: Arc::new(Pages::new()?),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let cars = CarQueryClient::new(settings.carquery.client_config())?;

        let agent = match settings.provider.anthropic_config() {
            Ok(config) => {
                let provider = AnthropicProvider::new(config)?;
                info!(model = provider.model(), "chat enabled");
                let mut agent =
                    Agent::new(Box::new(provider)).with_max_turns(settings.agent.max_turns);
                agent.add_system(Box::new(CarSystem::new(cars.clone())));
                Some(agent)
            }
            Err(err) => {
                warn!("{}; /chat is disabled until a key is provided", err);
                None
            }
        };

        Self::new(agent, cars)
    }
}
