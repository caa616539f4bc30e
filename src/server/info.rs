use std::sync::Arc;
use std::time::{Duration, Instant};

use hyper::StatusCode;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

use crate::middleware::response::json_response;
use crate::middleware::Response;
use crate::routes::RouteTable;
use crate::settings::Environment;

pub const SERVICE_NAME: &str = "AgroSolutions API Gateway";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInfo {
    pub service_name: &'static str,
    pub version: &'static str,
    pub environment: &'static str,
    pub uptime: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
struct RouteEntry<'a> {
    path: &'a str,
    service: &'a str,
    methods: &'a [String],
}

#[derive(Debug, Serialize)]
struct RouteListing<'a> {
    routes: Vec<RouteEntry<'a>>,
}

/// `/api/info` 응답을 만드는 서비스
pub struct InfoService {
    started: Instant,
    environment: Environment,
    routes: Arc<RouteTable>,
}

impl InfoService {
    pub fn new(environment: Environment, routes: Arc<RouteTable>) -> Self {
        Self {
            started: Instant::now(),
            environment,
            routes,
        }
    }

    pub fn info(&self) -> GatewayInfo {
        GatewayInfo {
            service_name: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            environment: self.environment.as_str(),
            uptime: format_uptime(self.started.elapsed()),
            timestamp: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }
    }

    pub fn info_response(&self) -> Response {
        info!("Info endpoint accessed");
        json_response(StatusCode::OK, &self.info())
    }

    pub fn routes_response(&self) -> Response {
        let listing = RouteListing {
            routes: self
                .routes
                .routes()
                .iter()
                .map(|route| RouteEntry {
                    path: &route.path,
                    service: &route.service,
                    methods: &route.methods,
                })
                .collect(),
        };
        info!(routes = listing.routes.len(), "Route listing accessed");
        json_response(StatusCode::OK, &listing)
    }
}

/// `1d 2h 3m 4s` 형식
pub fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
}
