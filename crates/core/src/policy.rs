//! Reply selection: turns an NLP result plus live bus data into text.

use crate::models::{BusSnapshot, CrowdPreference, DetailedBusInfo, Intent, NlpResult, StopMatch};

const KEY_STOPS_SHOWN: usize = 5;
const EMPTIEST_SHOWN: usize = 3;
const AVAILABLE_BELOW: u8 = 50;

/// Everything the policy may look at for one message.
#[derive(Debug, Clone, Copy)]
pub struct ReplyContext<'a> {
    pub nlp: &'a NlpResult,
    pub buses: &'a [BusSnapshot],
    pub detail: Option<&'a DetailedBusInfo>,
    /// Result of the stop search requested through [`stop_search_target`].
    pub stop_matches: &'a [StopMatch],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyDecision {
    Answer(String),
    /// No rule applies; the caller picks a generic answer.
    Fallback,
}

/// The destination the caller has to search stops for before composing,
/// if the message ends up on the destination-search branch.
pub fn stop_search_target(nlp: &NlpResult, has_detail: bool) -> Option<String> {
    if has_detail {
        return None;
    }

    let intent = nlp.parsed_intent();
    if matches!(intent, Some(Intent::Greeting) | Some(Intent::Thanks)) {
        return None;
    }

    let entities = &nlp.entities;
    let route_branch = intent == Some(Intent::RoutePlanning) || !entities.locations.is_empty();
    if !route_branch {
        return None;
    }

    if entities.from_location.is_some() && entities.to_location.is_some() {
        return None;
    }

    entities
        .to_location
        .clone()
        .or_else(|| entities.locations.first().cloned())
}

pub fn compose_reply(ctx: &ReplyContext<'_>) -> ReplyDecision {
    let intent = ctx.nlp.parsed_intent();
    let entities = &ctx.nlp.entities;

    if let Some(bus) = ctx.detail {
        let requested = entities.locations.first().map(String::as_str);
        return ReplyDecision::Answer(bus_detail_reply(bus, requested));
    }

    let text = match intent {
        Some(Intent::Greeting) => greeting_reply(),
        Some(Intent::Thanks) => "You're very welcome! Safe travels!".to_string(),
        Some(Intent::RoutePlanning) => route_reply(ctx),
        // a named place outranks every remaining intent
        _ if !entities.locations.is_empty() => route_reply(ctx),
        Some(Intent::CrowdQuery) => crowd_reply(ctx),
        Some(Intent::Recommendation) => recommendation_reply(ctx.buses),
        Some(Intent::Timing) => {
            "Which bus timing do you need? Tell me the bus number or destination!".to_string()
        }
        Some(Intent::Ticket) => ticket_reply(),
        Some(Intent::List) | None => return ReplyDecision::Fallback,
    };

    ReplyDecision::Answer(text)
}

fn bus_detail_reply(bus: &DetailedBusInfo, requested: Option<&str>) -> String {
    let route = &bus.route;

    if let Some(requested) = requested {
        let wanted = requested.to_lowercase();
        return match route
            .stops
            .iter()
            .find(|stop| stop.name.to_lowercase().contains(&wanted))
        {
            Some(stop) => {
                let mut text = format!(
                    "Yes! Bus {} goes to {}.\n\nStatus: {}\n",
                    route.id, stop.name, bus.live_status
                );
                if let Some(crowd) = bus.crowd {
                    text.push_str(&format!("Crowd: {crowd}%\n"));
                }
                text.push_str(&format!("Route: {}", route.name));
                text
            }
            None => format!(
                "Bus {} does not appear to stop at {}.\nIts route is: {}",
                route.id, requested, route.name
            ),
        };
    }

    let key_stops = route
        .stops
        .iter()
        .take(KEY_STOPS_SHOWN)
        .map(|stop| stop.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let remaining = route.stops.len().saturating_sub(KEY_STOPS_SHOWN);

    let mut text = format!(
        "Bus {} details:\n\nRoute: {}\nStatus: {}",
        route.id, route.name, bus.live_status
    );
    if let Some(eta) = &bus.eta {
        text.push_str(&format!(" (arriving in {eta})"));
    }
    text.push('\n');
    if let Some(crowd) = bus.crowd {
        text.push_str(&format!("Crowd: {crowd}%\n"));
    }
    text.push_str(&format!("Key stops: {key_stops}"));
    if remaining > 0 {
        text.push_str(&format!("...and {remaining} more."));
    }
    text
}

fn greeting_reply() -> String {
    [
        "Hi! I'm Tracko, your bus assistant.",
        "",
        "I can answer questions like:",
        "- \"Does bus 12A go to Central?\"",
        "- \"Show me the route of 570\"",
        "- \"Is bus A1 crowded?\"",
        "",
        "What can I help you with?",
    ]
    .join("\n")
}

fn route_reply(ctx: &ReplyContext<'_>) -> String {
    let entities = &ctx.nlp.entities;

    if let (Some(from), Some(to)) = (&entities.from_location, &entities.to_location) {
        let from_lower = from.to_lowercase();
        let to_lower = to.to_lowercase();
        let matching = ctx
            .buses
            .iter()
            .filter(|bus| {
                let route = bus.route.to_lowercase();
                route.contains(&from_lower) && route.contains(&to_lower)
            })
            .collect::<Vec<_>>();

        return match matching.first() {
            Some(best) => format!(
                "Found {} bus(es) for you!\n\nBus {} is your best bet.\nRoute: {}\nCurrent crowd: {}%",
                matching.len(),
                best.id,
                best.route,
                best.crowd
            ),
            None => format!(
                "I couldn't find a direct active bus from {from} to {to}. Try checking the full route map."
            ),
        };
    }

    let Some(destination) = entities
        .to_location
        .as_ref()
        .or_else(|| entities.locations.first())
    else {
        return "Where would you like to go? Tell me a destination like Airport or Tambaram."
            .to_string();
    };

    let mut matches = ctx.stop_matches.iter().collect::<Vec<_>>();
    matches.sort_by_key(|bus| bus.crowd);

    let Some(best) = matches.first() else {
        return format!("I couldn't find any active buses stopping at \"{destination}\" right now.");
    };

    let mut text = format!(
        "Yes! I found buses going to {}.\n\nBest option: Bus {}\nCrowd: {}% ({})\nRoute: {}",
        best.destination_match,
        best.id,
        best.crowd,
        crowd_label(best.crowd),
        best.route
    );
    if matches.len() > 1 {
        let others = matches[1..]
            .iter()
            .map(|bus| bus.id.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        text.push_str(&format!("\n\nOther options: {others}"));
    }
    text
}

fn crowd_reply(ctx: &ReplyContext<'_>) -> String {
    if ctx.nlp.entities.crowd_preference != Some(CrowdPreference::Least) {
        return "Most buses are running on time. Ask about a specific bus number for live crowd levels!"
            .to_string();
    }

    let lines = emptiest(ctx.buses)
        .iter()
        .take(EMPTIEST_SHOWN)
        .map(|bus| format!("- Bus {}: {}%", bus.id, bus.crowd))
        .collect::<Vec<_>>();

    if lines.is_empty() {
        return "No buses are reporting crowd levels right now.".to_string();
    }

    format!("Least crowded buses:\n{}", lines.join("\n"))
}

fn recommendation_reply(buses: &[BusSnapshot]) -> String {
    let Some(best) = emptiest(buses).first().copied() else {
        return "No buses are active right now. Please check again in a few minutes.".to_string();
    };

    format!(
        "My top recommendation right now:\n\nBus {}\nWhy? Only {}% full, arriving soon ({})\nRoute: {}\n\nNeed somewhere specific? Just tell me where!",
        best.id, best.crowd, best.eta, best.route
    )
}

fn ticket_reply() -> String {
    [
        "Ticket booking:",
        "",
        "- Price: Rs 50 per person",
        "- Max: 5 passengers",
        "",
        "How to book:",
        "1. Track any bus",
        "2. Tap 'Buy Ticket'",
        "3. Choose passengers",
        "4. Pay & done!",
    ]
    .join("\n")
}

/// Buses ordered by crowd, stable for equal levels.
fn emptiest(buses: &[BusSnapshot]) -> Vec<&BusSnapshot> {
    let mut sorted = buses.iter().collect::<Vec<_>>();
    sorted.sort_by_key(|bus| bus.crowd);
    sorted
}

fn crowd_label(crowd: u8) -> &'static str {
    if crowd < AVAILABLE_BELOW {
        "Available"
    } else {
        "Busy"
    }
}
