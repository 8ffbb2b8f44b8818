//! Blocking HTTP client for the elevator simulator.
//!
//! Thin request/response wrapper: every method maps to one simulator
//! endpoint and decodes a typed JSON payload. Enabled by the `client`
//! feature so the engine itself stays transport-free.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::api::{ApiError, SimulatorApi, StepResponse};
use crate::state::SimulationState;
use crate::{CarId, Floor};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(default)]
    ok: bool,
}

#[derive(Debug, Deserialize)]
struct CommandAck {
    #[serde(default)]
    success: bool,
}

/// Thin HTTP client for the simulator's request/response API.
#[derive(Debug, Clone)]
pub struct SimulatorClient {
    client: Client,
    endpoint: String,
}

impl SimulatorClient {
    /// Create a client for the given endpoint (e.g. `http://127.0.0.1:8000`).
    pub fn new(endpoint: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build simulator client");
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .map_err(|err| ApiError::Transport(Box::new(err)))?;
        if !response.status().is_success() {
            return Err(ApiError::Api(format!(
                "GET {} returned {}",
                path,
                response.status()
            )));
        }
        response.json().map_err(|err| ApiError::Decode(Box::new(err)))
    }

    fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .map_err(|err| ApiError::Transport(Box::new(err)))?;
        if !response.status().is_success() {
            return Err(ApiError::Api(format!(
                "POST {} returned {}",
                path,
                response.status()
            )));
        }
        response.json().map_err(|err| ApiError::Decode(Box::new(err)))
    }
}

impl SimulatorApi for SimulatorClient {
    fn get_state(&mut self) -> Result<SimulationState, ApiError> {
        self.get_json("/api/state")
    }

    fn step(&mut self, ticks: u32) -> Result<StepResponse, ApiError> {
        self.post_json("/api/step", &json!({ "ticks": ticks }))
    }

    fn reset(&mut self) -> Result<(), ApiError> {
        let _: Ack = self.post_json("/api/reset", &json!({}))?;
        Ok(())
    }

    fn next_traffic_round(&mut self, full_reset: bool) -> Result<bool, ApiError> {
        let ack: Ack =
            self.post_json("/api/traffic/next", &json!({ "full_reset": full_reset }))?;
        Ok(ack.ok)
    }

    fn mark_tick_processed(&mut self) -> Result<(), ApiError> {
        let _: Ack = self.post_json("/api/tick/processed", &json!({}))?;
        Ok(())
    }

    fn select_traffic(&mut self, index: usize) -> Result<(), ApiError> {
        let _: Ack = self.post_json("/api/traffic/select", &json!({ "index": index }))?;
        Ok(())
    }

    fn go_to_floor(&mut self, car: CarId, floor: Floor, immediate: bool) -> Result<bool, ApiError> {
        let ack: CommandAck = self.post_json(
            &format!("/api/elevators/{car}/go_to_floor"),
            &json!({ "floor": floor, "immediate": immediate }),
        )?;
        Ok(ack.success)
    }
}
