#![allow(dead_code)]

use serde_json::{json, Value};
use tircloud::prelude::*;
use tokio::runtime::{Handle, Runtime};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "key-123";
pub const AUTH_TOKEN: &str = "token-xyz";

/// Mock TIR API. Managers block on the runtime, so tests stay synchronous and
/// only mounting goes through `block_on`.
pub struct Api {
    pub server: MockServer,
    pub client: TirClient,
    pub rt: Runtime,
}

impl Api {
    pub fn start() -> Self {
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        let config = ProviderConfig::new(API_KEY, AUTH_TOKEN).with_endpoint(server.uri());
        let client = TirClient::new(&config).unwrap();
        Self { server, client, rt }
    }
    pub fn handle(&self) -> &Handle {
        self.rt.handle()
    }
    pub fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(&self.server))
    }
    pub fn reset(&self) {
        self.rt.block_on(self.server.reset())
    }
    pub fn requests(&self) -> Vec<wiremock::Request> {
        self.rt
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }
}

pub fn scope() -> Scope {
    Scope::new("11", "22", "33")
}

/// `/teams/11/projects/22/<rest>`
pub fn project_path(rest: &str) -> String {
    format!("/teams/11/projects/22/{}", rest)
}

/// A response wrapped in the `data` envelope.
pub fn data(status: u16, value: Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({ "data": value }))
}

pub fn ok(value: Value) -> ResponseTemplate {
    data(200, value)
}

pub fn created(value: Value) -> ResponseTemplate {
    data(201, value)
}
