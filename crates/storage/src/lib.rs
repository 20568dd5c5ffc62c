use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracko_core::{
    capacity_percentage, BusSnapshot, CrowdStatus, CrowdUpdate, RouteDetails, RouteStop,
    RouteSummary, StopMatch,
};

pub const DEFAULT_BUS_CAPACITY: u32 = 50;

const BUNDLED_SEED: &str = include_str!("../data/seed.json");

/// Where the chat assistant reads live bus data from.
pub trait BusDirectory: Send + Sync {
    async fn active_buses(&self) -> Result<Vec<BusSnapshot>>;
    async fn route_details(&self, bus_id: &str) -> Result<Option<RouteDetails>>;
    async fn buses_serving_stop(&self, location: &str) -> Result<Vec<StopMatch>>;
    async fn record_crowd(&self, bus_id: &str, passengers: u32) -> Result<CrowdUpdate>;
    /// `None` when the bus is not in the snapshot.
    async fn latest_crowd(&self, bus_id: &str) -> Result<Option<CrowdStatus>>;
    async fn all_routes(&self) -> Result<Vec<RouteSummary>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedBus {
    pub id: String,
    pub route: String,
    pub crowd: u8,
    pub status: String,
    pub eta: String,
    #[serde(default)]
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedData {
    pub buses: Vec<SeedBus>,
    pub routes: BTreeMap<String, Vec<RouteStop>>,
}

impl SeedData {
    pub fn bundled() -> Result<Self> {
        serde_json::from_str(BUNDLED_SEED).context("bundled seed data is not valid json")
    }
}

#[derive(Debug, Clone)]
struct BusRecord {
    snapshot: BusSnapshot,
    capacity: u32,
    updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct MemoryStore {
    buses: Arc<RwLock<Vec<BusRecord>>>,
    routes: Arc<RwLock<BTreeMap<String, Vec<RouteStop>>>>,
    default_capacity: u32,
}

impl MemoryStore {
    pub fn seeded(seed: SeedData, default_capacity: u32) -> Self {
        let seeded_at = Utc::now();
        let buses = seed
            .buses
            .into_iter()
            .map(|bus| BusRecord {
                capacity: bus.capacity.unwrap_or(default_capacity),
                updated_at: seeded_at,
                snapshot: BusSnapshot {
                    id: bus.id,
                    route: bus.route,
                    crowd: bus.crowd.min(100),
                    status: bus.status,
                    eta: bus.eta,
                    passengers: None,
                },
            })
            .collect();

        let routes = seed
            .routes
            .into_iter()
            .map(|(id, stops)| (id.to_uppercase(), stops))
            .collect();

        Self {
            buses: Arc::new(RwLock::new(buses)),
            routes: Arc::new(RwLock::new(routes)),
            default_capacity,
        }
    }

    pub fn with_bundled_seed() -> Result<Self> {
        Ok(Self::seeded(SeedData::bundled()?, DEFAULT_BUS_CAPACITY))
    }
}

impl BusDirectory for MemoryStore {
    async fn active_buses(&self) -> Result<Vec<BusSnapshot>> {
        Ok(self
            .buses
            .read()
            .iter()
            .map(|record| record.snapshot.clone())
            .collect())
    }

    async fn route_details(&self, bus_id: &str) -> Result<Option<RouteDetails>> {
        let key = bus_id.trim().to_uppercase();
        Ok(self
            .routes
            .read()
            .get(&key)
            .filter(|stops| !stops.is_empty())
            .map(|stops| RouteDetails::from_stops(key.clone(), stops.clone())))
    }

    async fn buses_serving_stop(&self, location: &str) -> Result<Vec<StopMatch>> {
        let wanted = location.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let live = self
            .buses
            .read()
            .iter()
            .map(|record| (record.snapshot.id.to_uppercase(), record.snapshot.clone()))
            .collect::<HashMap<_, _>>();

        let matches = self
            .routes
            .read()
            .iter()
            .filter_map(|(id, stops)| {
                let stop = stops
                    .iter()
                    .find(|stop| stop.name.to_lowercase().contains(&wanted))?;
                let bus = live.get(id);
                Some(StopMatch {
                    id: bus.map(|bus| bus.id.clone()).unwrap_or_else(|| id.clone()),
                    route: bus
                        .map(|bus| bus.route.clone())
                        .unwrap_or_else(|| RouteDetails::from_stops(id.clone(), stops.clone()).name),
                    crowd: bus.map(|bus| bus.crowd).unwrap_or(0),
                    eta: bus.map(|bus| bus.eta.clone()),
                    destination_match: stop.name.clone(),
                })
            })
            .collect();

        Ok(matches)
    }

    async fn record_crowd(&self, bus_id: &str, passengers: u32) -> Result<CrowdUpdate> {
        let mut buses = self.buses.write();
        let record = buses
            .iter_mut()
            .find(|record| record.snapshot.id.eq_ignore_ascii_case(bus_id.trim()));

        let capacity = record
            .as_ref()
            .map(|record| record.capacity)
            .unwrap_or(self.default_capacity);
        let percentage = capacity_percentage(passengers, capacity);
        let now = Utc::now();

        if let Some(record) = record {
            record.snapshot.crowd = percentage;
            record.snapshot.passengers = Some(passengers);
            record.updated_at = now;
        }

        Ok(CrowdUpdate {
            bus_id: bus_id.trim().to_string(),
            passengers,
            capacity_percentage: percentage,
            updated_at: now,
        })
    }

    async fn latest_crowd(&self, bus_id: &str) -> Result<Option<CrowdStatus>> {
        let buses = self.buses.read();
        let status = buses
            .iter()
            .find(|record| record.snapshot.id.eq_ignore_ascii_case(bus_id.trim()))
            .map(|record| CrowdStatus {
                passengers: record
                    .snapshot
                    .passengers
                    .unwrap_or_else(|| estimated_passengers(record.snapshot.crowd, record.capacity)),
                capacity_percentage: record.snapshot.crowd,
                last_update: record.updated_at,
            });
        Ok(status)
    }

    async fn all_routes(&self) -> Result<Vec<RouteSummary>> {
        Ok(self
            .routes
            .read()
            .iter()
            .filter(|(_, stops)| !stops.is_empty())
            .map(|(id, stops)| RouteSummary::from(&RouteDetails::from_stops(id.clone(), stops.clone())))
            .collect())
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    default_capacity: u32,
}

impl SqliteStore {
    pub async fn connect(database_url: &str, default_capacity: u32) -> Result<Self> {
        // every in-memory connection would get its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self {
            pool,
            default_capacity,
        };
        store.ensure_schema().await?;
        store.seed_if_empty(SeedData::bundled()?).await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS buses (
              bus_id TEXT PRIMARY KEY COLLATE NOCASE,
              position INTEGER NOT NULL,
              route TEXT NOT NULL,
              capacity INTEGER NOT NULL,
              crowd INTEGER NOT NULL,
              passengers INTEGER,
              status TEXT NOT NULL,
              eta TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS route_stops (
              bus_id TEXT NOT NULL COLLATE NOCASE,
              sequence_number INTEGER NOT NULL,
              name TEXT NOT NULL,
              distance_km REAL,
              offset_min INTEGER NOT NULL,
              is_source INTEGER,
              is_destination INTEGER,
              PRIMARY KEY (bus_id, sequence_number)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn seed_if_empty(&self, seed: SeedData) -> Result<()> {
        let existing: i64 = sqlx::query("SELECT COUNT(*) AS total FROM buses")
            .fetch_one(&self.pool)
            .await?
            .get("total");
        if existing > 0 {
            return Ok(());
        }

        let seeded_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for (position, bus) in seed.buses.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO buses (bus_id, position, route, capacity, crowd, passengers, status, eta, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8)
                "#,
            )
            .bind(&bus.id)
            .bind(position as i64)
            .bind(&bus.route)
            .bind(i64::from(bus.capacity.unwrap_or(self.default_capacity)))
            .bind(i64::from(bus.crowd.min(100)))
            .bind(&bus.status)
            .bind(&bus.eta)
            .bind(&seeded_at)
            .execute(&mut *tx)
            .await?;
        }

        for (bus_id, stops) in &seed.routes {
            for (sequence, stop) in stops.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO route_stops
                      (bus_id, sequence_number, name, distance_km, offset_min, is_source, is_destination)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                )
                .bind(bus_id)
                .bind(sequence as i64)
                .bind(&stop.name)
                .bind(stop.distance)
                .bind(i64::from(stop.time))
                .bind(stop.is_source)
                .bind(stop.is_destination)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

impl BusDirectory for SqliteStore {
    async fn active_buses(&self) -> Result<Vec<BusSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT bus_id, route, crowd, passengers, status, eta
            FROM buses
            ORDER BY position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let buses = rows
            .into_iter()
            .map(|row| BusSnapshot {
                id: row.get("bus_id"),
                route: row.get("route"),
                crowd: clamp_percent(row.get("crowd")),
                status: row.get("status"),
                eta: row.get("eta"),
                passengers: row
                    .get::<Option<i64>, _>("passengers")
                    .and_then(|value| u32::try_from(value).ok()),
            })
            .collect();

        Ok(buses)
    }

    async fn route_details(&self, bus_id: &str) -> Result<Option<RouteDetails>> {
        let rows = sqlx::query(
            r#"
            SELECT bus_id, name, distance_km, offset_min, is_source, is_destination
            FROM route_stops
            WHERE bus_id = ?1
            ORDER BY sequence_number
            "#,
        )
        .bind(bus_id.trim())
        .fetch_all(&self.pool)
        .await?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let id: String = first.get("bus_id");

        let stops = rows.iter().map(stop_from_row).collect();
        Ok(Some(RouteDetails::from_stops(id, stops)))
    }

    async fn buses_serving_stop(&self, location: &str) -> Result<Vec<StopMatch>> {
        let wanted = location.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT rs.bus_id AS bus_id, rs.name AS stop_name, b.route AS route, b.crowd AS crowd, b.eta AS eta
            FROM route_stops rs
            LEFT JOIN buses b ON b.bus_id = rs.bus_id
            WHERE LOWER(rs.name) LIKE ?1 ESCAPE '\'
            ORDER BY UPPER(rs.bus_id), rs.sequence_number
            "#,
        )
        .bind(format!("%{}%", escape_like(&wanted)))
        .fetch_all(&self.pool)
        .await?;

        let mut matches: Vec<StopMatch> = Vec::new();
        for row in rows {
            let bus_id: String = row.get("bus_id");
            if matches.iter().any(|found| found.id.eq_ignore_ascii_case(&bus_id)) {
                continue;
            }

            let route = match row.get::<Option<String>, _>("route") {
                Some(route) => route,
                None => self
                    .route_details(&bus_id)
                    .await?
                    .map(|details| details.name)
                    .unwrap_or_default(),
            };

            matches.push(StopMatch {
                id: bus_id,
                route,
                crowd: row
                    .get::<Option<i64>, _>("crowd")
                    .map(clamp_percent)
                    .unwrap_or(0),
                eta: row.get("eta"),
                destination_match: row.get("stop_name"),
            });
        }

        Ok(matches)
    }

    async fn record_crowd(&self, bus_id: &str, passengers: u32) -> Result<CrowdUpdate> {
        let bus_id = bus_id.trim();
        let capacity = sqlx::query("SELECT capacity FROM buses WHERE bus_id = ?1")
            .bind(bus_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.get::<i64, _>("capacity"))
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(self.default_capacity);
        let percentage = capacity_percentage(passengers, capacity);
        let now = Utc::now();

        sqlx::query(
            "UPDATE buses SET crowd = ?1, passengers = ?2, updated_at = ?3 WHERE bus_id = ?4",
        )
        .bind(i64::from(percentage))
        .bind(i64::from(passengers))
        .bind(now.to_rfc3339())
        .bind(bus_id)
        .execute(&self.pool)
        .await?;

        Ok(CrowdUpdate {
            bus_id: bus_id.to_string(),
            passengers,
            capacity_percentage: percentage,
            updated_at: now,
        })
    }

    async fn latest_crowd(&self, bus_id: &str) -> Result<Option<CrowdStatus>> {
        let row = sqlx::query(
            "SELECT capacity, crowd, passengers, updated_at FROM buses WHERE bus_id = ?1",
        )
        .bind(bus_id.trim())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let crowd = clamp_percent(row.get("crowd"));
        let capacity = u32::try_from(row.get::<i64, _>("capacity")).unwrap_or(self.default_capacity);
        let passengers = row
            .get::<Option<i64>, _>("passengers")
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or_else(|| estimated_passengers(crowd, capacity));

        Ok(Some(CrowdStatus {
            passengers,
            capacity_percentage: crowd,
            last_update: row
                .get::<String, _>("updated_at")
                .parse()
                .unwrap_or_else(|_| Utc::now()),
        }))
    }

    async fn all_routes(&self) -> Result<Vec<RouteSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT bus_id, name, distance_km, offset_min, is_source, is_destination
            FROM route_stops
            ORDER BY UPPER(bus_id), sequence_number
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: Vec<(String, Vec<RouteStop>)> = Vec::new();
        for row in &rows {
            let bus_id: String = row.get("bus_id");
            match grouped.last_mut() {
                Some((current, stops)) if current.eq_ignore_ascii_case(&bus_id) => {
                    stops.push(stop_from_row(row))
                }
                _ => grouped.push((bus_id, vec![stop_from_row(row)])),
            }
        }

        Ok(grouped
            .into_iter()
            .map(|(id, stops)| RouteSummary::from(&RouteDetails::from_stops(id, stops)))
            .collect())
    }
}

fn stop_from_row(row: &sqlx::sqlite::SqliteRow) -> RouteStop {
    RouteStop {
        name: row.get("name"),
        distance: row.get("distance_km"),
        time: u32::try_from(row.get::<i64, _>("offset_min")).unwrap_or(0),
        is_source: row.get("is_source"),
        is_destination: row.get("is_destination"),
    }
}

fn clamp_percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

/// Head count implied by a crowd percentage, for buses nobody has reported on.
fn estimated_passengers(crowd: u8, capacity: u32) -> u32 {
    (u32::from(crowd) * capacity + 50) / 100
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory(default_capacity: u32) -> Result<Self> {
        let seed = SeedData::bundled()?;
        Ok(Self::Memory(MemoryStore::seeded(seed, default_capacity)))
    }

    pub async fn sqlite(database_url: &str, default_capacity: u32) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url, default_capacity).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl BusDirectory for Store {
    async fn active_buses(&self) -> Result<Vec<BusSnapshot>> {
        match self {
            Store::Memory(store) => store.active_buses().await,
            Store::Sqlite(store) => store.active_buses().await,
        }
    }

    async fn route_details(&self, bus_id: &str) -> Result<Option<RouteDetails>> {
        match self {
            Store::Memory(store) => store.route_details(bus_id).await,
            Store::Sqlite(store) => store.route_details(bus_id).await,
        }
    }

    async fn buses_serving_stop(&self, location: &str) -> Result<Vec<StopMatch>> {
        match self {
            Store::Memory(store) => store.buses_serving_stop(location).await,
            Store::Sqlite(store) => store.buses_serving_stop(location).await,
        }
    }

    async fn record_crowd(&self, bus_id: &str, passengers: u32) -> Result<CrowdUpdate> {
        match self {
            Store::Memory(store) => store.record_crowd(bus_id, passengers).await,
            Store::Sqlite(store) => store.record_crowd(bus_id, passengers).await,
        }
    }

    async fn latest_crowd(&self, bus_id: &str) -> Result<Option<CrowdStatus>> {
        match self {
            Store::Memory(store) => store.latest_crowd(bus_id).await,
            Store::Sqlite(store) => store.latest_crowd(bus_id).await,
        }
    }

    async fn all_routes(&self) -> Result<Vec<RouteSummary>> {
        match self {
            Store::Memory(store) => store.all_routes().await,
            Store::Sqlite(store) => store.all_routes().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_serves_bundled_snapshot() {
        let store = MemoryStore::with_bundled_seed().unwrap();
        let buses = store.active_buses().await.unwrap();

        assert_eq!(buses.len(), 8);
        assert_eq!(buses[0].id, "221H");
        assert!(buses.iter().all(|bus| bus.crowd <= 100));
    }

    #[tokio::test]
    async fn route_lookup_ignores_case() {
        let store = MemoryStore::with_bundled_seed().unwrap();
        let route = store.route_details("a1").await.unwrap().unwrap();

        assert_eq!(route.id, "A1");
        assert_eq!(route.name, "Thiruvanmiyur - Central Railway Station");
        assert_eq!(route.stops.first().unwrap().is_source, Some(true));
        assert!(store.route_details("999Z").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_search_finds_airport_bus() {
        let store = MemoryStore::with_bundled_seed().unwrap();
        let matches = store.buses_serving_stop("airport").await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "45C");
        assert_eq!(matches[0].destination_match, "Airport");
        assert_eq!(matches[0].crowd, 60);
    }

    #[tokio::test]
    async fn crowd_update_changes_snapshot() {
        let store = MemoryStore::with_bundled_seed().unwrap();
        let update = store.record_crowd("12a", 10).await.unwrap();
        assert_eq!(update.capacity_percentage, 20);

        let buses = store.active_buses().await.unwrap();
        let bus = buses.iter().find(|bus| bus.id == "12A").unwrap();
        assert_eq!(bus.crowd, 20);
        assert_eq!(bus.passengers, Some(10));
    }

    #[tokio::test]
    async fn latest_crowd_follows_reports() {
        let store = MemoryStore::with_bundled_seed().unwrap();

        let seeded = store.latest_crowd("12a").await.unwrap().unwrap();
        assert_eq!(seeded.capacity_percentage, 65);
        assert_eq!(seeded.passengers, 33);

        let update = store.record_crowd("12A", 40).await.unwrap();
        let status = store.latest_crowd("12A").await.unwrap().unwrap();
        assert_eq!(status.passengers, 40);
        assert_eq!(status.capacity_percentage, 80);
        assert_eq!(status.last_update, update.updated_at);

        assert!(store.latest_crowd("999Z").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn route_catalogue_lists_every_route() {
        let store = MemoryStore::with_bundled_seed().unwrap();
        let routes = store.all_routes().await.unwrap();

        assert_eq!(routes.len(), 8);
        let a1 = routes.iter().find(|route| route.id == "A1").unwrap();
        assert_eq!(a1.source.as_deref(), Some("Thiruvanmiyur"));
        assert_eq!(a1.stop_count, 25);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("t.nagar"), "t.nagar");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[tokio::test]
    async fn sqlite_store_matches_memory_behaviour() {
        let store = SqliteStore::connect("sqlite::memory:", DEFAULT_BUS_CAPACITY)
            .await
            .unwrap();

        let buses = store.active_buses().await.unwrap();
        assert_eq!(buses.len(), 8);
        assert_eq!(buses[5].id, "A1");

        let route = store.route_details("a1").await.unwrap().unwrap();
        assert_eq!(route.id, "A1");
        assert_eq!(route.stops.len(), 25);

        let matches = store.buses_serving_stop("Guindy").await.unwrap();
        let ids = matches.iter().map(|m| m.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["12A", "21G", "45C", "570"]);

        let update = store.record_crowd("570", 60).await.unwrap();
        assert_eq!(update.capacity_percentage, 100);
        let buses = store.active_buses().await.unwrap();
        assert_eq!(buses.iter().find(|b| b.id == "570").unwrap().crowd, 100);

        let status = store.latest_crowd("570").await.unwrap().unwrap();
        assert_eq!(status.passengers, 60);
        assert_eq!(status.capacity_percentage, 100);
        assert!(store.latest_crowd("999Z").await.unwrap().is_none());

        let memory = MemoryStore::with_bundled_seed().unwrap();
        assert_eq!(store.all_routes().await.unwrap(), memory.all_routes().await.unwrap());
    }

    #[tokio::test]
    async fn sqlite_stop_search_treats_wildcards_literally() {
        let store = SqliteStore::connect("sqlite::memory:", DEFAULT_BUS_CAPACITY)
            .await
            .unwrap();

        assert!(store.buses_serving_stop("%").await.unwrap().is_empty());
        assert!(store.buses_serving_stop("_").await.unwrap().is_empty());
        assert_eq!(store.buses_serving_stop("airport").await.unwrap().len(), 1);
    }
}
