use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, instrument, warn};
use tracko_core::{
    compose_reply, stop_search_target, BusSnapshot, ChatInput, ChatReply, CrowdStatus,
    CrowdUpdate, DetailedBusInfo, NlpEngine, NlpResult, ReplyContext, ReplyDecision,
    RouteDetails, RouteSummary,
};
use tracko_observability::AppMetrics;
use tracko_storage::BusDirectory;

const OFFLINE_REPLY: &str = "I'm having a bit of trouble connecting to my cloud brain.";

/// Answers messages the dialogue policy has no rule for.
#[async_trait]
pub trait FallbackResponder: Send + Sync {
    async fn respond(&self, message: &str, nlp: &NlpResult) -> Result<String>;
}

/// Fixed help text, used when no remote model is configured.
#[derive(Debug, Clone)]
pub struct StaticFallback {
    text: String,
}

impl StaticFallback {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for StaticFallback {
    fn default() -> Self {
        Self::new(
            "Additional AI insights are currently unavailable. Try asking about a bus number \
             like 12A, a destination like Airport, or which bus is least crowded.",
        )
    }
}

#[async_trait]
impl FallbackResponder for StaticFallback {
    async fn respond(&self, _message: &str, _nlp: &NlpResult) -> Result<String> {
        Ok(self.text.clone())
    }
}

#[derive(Clone)]
pub struct ChatAgent<S>
where
    S: BusDirectory,
{
    engine: Arc<NlpEngine>,
    directory: Arc<S>,
    fallback: Arc<dyn FallbackResponder>,
    metrics: Arc<AppMetrics>,
}

impl<S> ChatAgent<S>
where
    S: BusDirectory,
{
    pub fn new(
        engine: Arc<NlpEngine>,
        directory: Arc<S>,
        fallback: Arc<dyn FallbackResponder>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            engine,
            directory,
            fallback,
            metrics,
        }
    }

    #[instrument(skip(self, input), fields(message_len = input.message.len()))]
    pub async fn handle_chat(&self, input: ChatInput) -> Result<ChatReply> {
        let started = Instant::now();
        self.metrics.inc_request();

        let ChatInput { message, context } = input;

        let buses = match self.directory.active_buses().await {
            Ok(buses) => buses,
            Err(err) => {
                warn!(error = %err, "bus snapshot unavailable, using caller context");
                context.unwrap_or_default()
            }
        };

        let nlp = self.process(&message);
        info!(
            intent = ?nlp.intent,
            confidence = nlp.confidence,
            entities = ?nlp.entities,
            "message classified"
        );

        let detail = match nlp.entities.bus_ids.first() {
            Some(bus_id) => self.bus_detail(bus_id, &buses).await,
            None => None,
        };

        let stop_matches = match stop_search_target(&nlp, detail.is_some()) {
            Some(destination) => self
                .directory
                .buses_serving_stop(&destination)
                .await
                .unwrap_or_else(|err| {
                    warn!(error = %err, destination = %destination, "stop search failed");
                    Vec::new()
                }),
            None => Vec::new(),
        };

        let decision = compose_reply(&ReplyContext {
            nlp: &nlp,
            buses: &buses,
            detail: detail.as_ref(),
            stop_matches: &stop_matches,
        });

        let (reply, used_fallback) = match decision {
            ReplyDecision::Answer(text) => (text, false),
            ReplyDecision::Fallback => {
                self.metrics.inc_fallback();
                (self.fallback_reply(&message, &nlp).await, true)
            }
        };

        self.metrics.observe_latency(started.elapsed());
        info!(
            used_fallback,
            buses = buses.len(),
            stop_matches = stop_matches.len(),
            "chat handled"
        );

        Ok(ChatReply {
            reply,
            nlp,
            used_fallback,
        })
    }

    /// Classification plus entities, counted in the metrics.
    pub fn process(&self, message: &str) -> NlpResult {
        let nlp = self.engine.process(message);
        self.metrics.record_classification(nlp.intent.is_some());
        nlp
    }

    pub async fn active_buses(&self) -> Result<Vec<BusSnapshot>> {
        self.directory.active_buses().await
    }

    pub async fn route_details(&self, bus_id: &str) -> Result<Option<RouteDetails>> {
        self.directory.route_details(bus_id).await
    }

    pub async fn route_catalogue(&self) -> Result<Vec<RouteSummary>> {
        self.directory.all_routes().await
    }

    pub async fn crowd_status(&self, bus_id: &str) -> Result<Option<CrowdStatus>> {
        self.directory.latest_crowd(bus_id).await
    }

    pub async fn record_crowd(&self, bus_id: &str, passengers: u32) -> Result<CrowdUpdate> {
        let update = self.directory.record_crowd(bus_id, passengers).await?;
        self.metrics.inc_crowd_update();
        info!(
            bus_id = %update.bus_id,
            passengers = update.passengers,
            capacity_percentage = update.capacity_percentage,
            "crowd level updated"
        );
        Ok(update)
    }

    async fn bus_detail(&self, bus_id: &str, buses: &[BusSnapshot]) -> Option<DetailedBusInfo> {
        let route = match self.directory.route_details(bus_id).await {
            Ok(route) => route?,
            Err(err) => {
                warn!(error = %err, bus_id = %bus_id, "route lookup failed");
                return None;
            }
        };

        let live = buses.iter().find(|bus| bus.id.eq_ignore_ascii_case(bus_id));
        Some(DetailedBusInfo::merge(route, live))
    }

    async fn fallback_reply(&self, message: &str, nlp: &NlpResult) -> String {
        match self.fallback.respond(message, nlp).await {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "fallback responder failed");
                OFFLINE_REPLY.to_string()
            }
        }
    }
}
