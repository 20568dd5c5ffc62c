use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response labels understood by the dialogue policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Thanks,
    RoutePlanning,
    CrowdQuery,
    Recommendation,
    Timing,
    Ticket,
    List,
}

impl Intent {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "greeting" => Some(Self::Greeting),
            "thanks" => Some(Self::Thanks),
            "route_planning" => Some(Self::RoutePlanning),
            "crowd_query" => Some(Self::CrowdQuery),
            "recommendation" => Some(Self::Recommendation),
            "timing" => Some(Self::Timing),
            "ticket" => Some(Self::Ticket),
            "list" => Some(Self::List),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrowdPreference {
    Least,
    Most,
}

/// Outcome of intent scoring.
///
/// `confidence` is the raw best score: a Jaccard index plus an optional
/// substring bonus, so it can exceed `1.0`. Treat it as a ranking signal,
/// never as a probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: Option<String>,
    pub confidence: f64,
}

impl ClassificationResult {
    pub fn unmatched() -> Self {
        Self {
            intent: None,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityBag {
    pub locations: Vec<String>,
    pub bus_ids: Vec<String>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub crowd_preference: Option<CrowdPreference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NlpResult {
    pub intent: Option<String>,
    pub confidence: f64,
    pub entities: EntityBag,
    pub original_message: String,
}

impl NlpResult {
    pub fn parsed_intent(&self) -> Option<Intent> {
        self.intent.as_deref().and_then(Intent::parse)
    }
}

/// One row of the live bus snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusSnapshot {
    pub id: String,
    pub route: String,
    /// Occupancy in percent, 0 to 100.
    pub crowd: u8,
    pub status: String,
    pub eta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passengers: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    pub name: String,
    #[serde(default)]
    pub distance: Option<f64>,
    /// Minutes from the start of the route.
    pub time: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_source: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_destination: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDetails {
    pub id: String,
    pub name: String,
    pub stops: Vec<RouteStop>,
}

impl RouteDetails {
    /// Names the route after its first and last stop.
    pub fn from_stops(id: impl Into<String>, stops: Vec<RouteStop>) -> Self {
        let name = match (stops.first(), stops.last()) {
            (Some(first), Some(last)) => format!("{} - {}", first.name, last.name),
            _ => String::new(),
        };

        Self {
            id: id.into(),
            name,
            stops,
        }
    }
}

/// One row of the route catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub id: String,
    pub name: String,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub stop_count: usize,
    pub estimated_duration_min: u32,
}

impl From<&RouteDetails> for RouteSummary {
    fn from(route: &RouteDetails) -> Self {
        Self {
            id: route.id.clone(),
            name: route.name.clone(),
            source: route.stops.first().map(|stop| stop.name.clone()),
            destination: route.stops.last().map(|stop| stop.name.clone()),
            stop_count: route.stops.len(),
            estimated_duration_min: route.stops.iter().map(|stop| stop.time).max().unwrap_or(0),
        }
    }
}

/// Route details merged with whatever the live snapshot knows about the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedBusInfo {
    #[serde(flatten)]
    pub route: RouteDetails,
    pub live_status: String,
    pub crowd: Option<u8>,
    pub eta: Option<String>,
}

impl DetailedBusInfo {
    pub fn merge(route: RouteDetails, live: Option<&BusSnapshot>) -> Self {
        Self {
            route,
            live_status: live
                .map(|bus| bus.status.clone())
                .unwrap_or_else(|| "Not currently running".to_string()),
            crowd: live.map(|bus| bus.crowd),
            eta: live.map(|bus| bus.eta.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopMatch {
    pub id: String,
    pub route: String,
    pub crowd: u8,
    #[serde(default)]
    pub eta: Option<String>,
    pub destination_match: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrowdUpdate {
    pub bus_id: String,
    pub passengers: u32,
    pub capacity_percentage: u8,
    pub updated_at: DateTime<Utc>,
}

/// Latest known occupancy of one bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrowdStatus {
    pub passengers: u32,
    pub capacity_percentage: u8,
    pub last_update: DateTime<Utc>,
}

impl CrowdStatus {
    /// Reported when nothing is known about the bus.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            passengers: 0,
            capacity_percentage: 0,
            last_update: now,
        }
    }
}

/// Occupancy in percent, rounded and capped at 100.
pub fn capacity_percentage(passengers: u32, capacity: u32) -> u8 {
    let capacity = capacity.max(1) as f64;
    ((passengers as f64 / capacity) * 100.0).round().min(100.0) as u8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInput {
    pub message: String,
    /// Snapshot supplied by the caller, used when the directory is unavailable.
    #[serde(default)]
    pub context: Option<Vec<BusSnapshot>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    pub nlp: NlpResult,
    pub used_fallback: bool,
}
