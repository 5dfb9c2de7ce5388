use std::sync::Arc;

use aura_core::{
    format_distance, AccessLevel, AccessibilityPayload, BoundingRegion, GeocodePayload, Location,
    RoutePayload, StopInfo, StopsPayload, TrafficLevel, TrafficPayload, TransportMode,
};
use aura_gazetteer::{Gazetteer, PlaceKind};
use tracing::debug;

use crate::{
    AccessibilitySource, Geocoder, LookupError, LookupFuture, Router, StopLocator, TrafficSource,
};

/// Street network detour over the straight-line distance.
const DETOUR_FACTOR: f64 = 1.3;
const MAX_STOPS: usize = 3;

/// Average speed in km/h per zone id, sampled from the city sensor feed.
const ZONE_SPEEDS: &[(&str, f64)] = &[
    ("ciutat-vella", 15.8),
    ("el-carmen", 14.2),
    ("ruzafa", 25.5),
    ("eixample", 22.4),
    ("extramurs", 24.0),
    ("campanar", 35.2),
    ("benimaclet", 28.7),
    ("malvarrosa", 38.1),
    ("cabanyal", 33.0),
    ("patraix", 26.0),
    ("algiros", 36.5),
    ("quatre-carreres", 34.0),
];

struct Venue {
    id: &'static str,
    access: AccessLevel,
    details: &'static str,
    address: &'static str,
    phone: Option<&'static str>,
}

const VENUES: &[Venue] = &[
    Venue {
        id: "ivam",
        access: AccessLevel::Full,
        details: "Accesible en silla de ruedas, con ascensores en todas las plantas",
        address: "Carrer de Guillem de Castro, 118",
        phone: Some("963 17 66 00"),
    },
    Venue {
        id: "mercado-central",
        access: AccessLevel::Partial,
        details: "Entrada adaptada por la puerta de la plaza de la Ciudad de Brujas",
        address: "Plaça de la Ciutat de Bruges",
        phone: Some("963 82 91 01"),
    },
    Venue {
        id: "ayuntamiento",
        access: AccessLevel::Full,
        details: "Rampa de acceso y ascensor hasta el balcón",
        address: "Plaça de l'Ajuntament, 1",
        phone: Some("963 52 54 78"),
    },
    Venue {
        id: "estacion-norte",
        access: AccessLevel::Full,
        details: "Andenes a nivel y servicio de asistencia en taquilla",
        address: "Carrer d'Alacant, 25",
        phone: None,
    },
    Venue {
        id: "ciudad-artes-ciencias",
        access: AccessLevel::Full,
        details: "Todos los edificios cuentan con rampas y aseos adaptados",
        address: "Av. del Professor López Piñero, 7",
        phone: Some("961 97 46 86"),
    },
    Venue {
        id: "catedral",
        access: AccessLevel::Partial,
        details: "La nave es accesible pero el Micalet solo se sube por escalera",
        address: "Plaça de l'Almoina",
        phone: Some("963 91 81 27"),
    },
    Venue {
        id: "bioparc",
        access: AccessLevel::Full,
        details: "Recorrido completo accesible y préstamo de sillas de ruedas",
        address: "Av. Pío Baroja, 3",
        phone: Some("960 65 88 30"),
    },
    Venue {
        id: "torres-serranos",
        access: AccessLevel::None,
        details: "Solo se accede por escaleras de piedra",
        address: "Plaça dels Furs",
        phone: None,
    },
];

/// Self-contained mobility data backed by the gazetteer and static tables.
#[derive(Debug, Clone)]
pub struct OfflineMobilityData {
    gazetteer: Arc<Gazetteer>,
}

impl OfflineMobilityData {
    pub fn new(gazetteer: Arc<Gazetteer>) -> Self {
        Self { gazetteer }
    }

    fn stops_near(&self, at: Location, radius_m: u32) -> Vec<StopInfo> {
        let mut stops = self
            .gazetteer
            .of_kind(PlaceKind::Stop)
            .map(|entry| StopInfo {
                name: entry.name.clone(),
                distance_m: at.distance_m(&entry.location).round(),
                lines: entry.lines.clone(),
                location: entry.location,
            })
            .filter(|stop| stop.distance_m <= f64::from(radius_m))
            .collect::<Vec<_>>();
        stops.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        stops.truncate(MAX_STOPS);
        stops
    }

    fn estimate_route(
        origin: Location,
        destination: Location,
        mode: TransportMode,
    ) -> RoutePayload {
        let distance_m = (origin.distance_m(&destination) * DETOUR_FACTOR).round();
        let metres_per_second = cruise_speed_kmh(mode) / 3.6;
        let duration_s = (distance_m / metres_per_second).round();

        let instructions = if distance_m < 1.0 {
            vec!["Ya estás en tu destino".to_string()]
        } else {
            vec![
                format!(
                    "Dirígete hacia el {} durante {}",
                    cardinal(origin.bearing_deg(&destination)),
                    format_distance(distance_m)
                ),
                "Llegarás a tu destino".to_string(),
            ]
        };

        RoutePayload {
            origin,
            destination,
            destination_name: None,
            mode,
            distance_m,
            duration_s,
            instructions,
            traffic: None,
        }
    }
}

fn cruise_speed_kmh(mode: TransportMode) -> f64 {
    match mode {
        TransportMode::Foot => 4.8,
        TransportMode::Bike => 15.0,
        TransportMode::Car => 25.0,
        TransportMode::Bus => 18.0,
    }
}

fn cardinal(bearing_deg: f64) -> &'static str {
    const POINTS: [&str; 8] = [
        "norte", "noreste", "este", "sureste", "sur", "suroeste", "oeste", "noroeste",
    ];
    let index = ((bearing_deg.rem_euclid(360.0) + 22.5) / 45.0) as usize % POINTS.len();
    POINTS[index]
}

impl StopLocator for OfflineMobilityData {
    fn nearest_stops(&self, at: Location, radius_m: u32) -> LookupFuture<StopsPayload> {
        let stops = self.stops_near(at, radius_m);
        debug!(found = stops.len(), radius_m, "offline stop search");

        Box::pin(async move {
            if stops.is_empty() {
                return Err(LookupError::NotFound(format!("no stops within {radius_m} m")));
            }
            Ok(StopsPayload { radius_m, stops })
        })
    }
}

impl Router for OfflineMobilityData {
    fn route(
        &self,
        origin: Location,
        destination: Location,
        mode: TransportMode,
    ) -> LookupFuture<RoutePayload> {
        let route = Self::estimate_route(origin, destination, mode);
        Box::pin(async move { Ok(route) })
    }
}

impl TrafficSource for OfflineMobilityData {
    fn traffic_status(&self, zone: String) -> LookupFuture<TrafficPayload> {
        let found = self
            .gazetteer
            .resolve(&zone, PlaceKind::ZONES)
            .map(|entry| {
                let speed = ZONE_SPEEDS
                    .iter()
                    .find(|(id, _)| *id == entry.id)
                    .map(|(_, speed)| *speed);
                TrafficPayload {
                    zone: entry.name.clone(),
                    level: speed
                        .map(TrafficLevel::from_average_speed)
                        .unwrap_or(TrafficLevel::Unknown),
                    average_speed_kmh: speed,
                }
            });

        Box::pin(async move {
            found.ok_or_else(|| LookupError::NotFound(format!("no traffic data for {zone}")))
        })
    }
}

impl AccessibilitySource for OfflineMobilityData {
    fn accessibility(&self, place: String) -> LookupFuture<AccessibilityPayload> {
        let entry = self.gazetteer.resolve(&place, PlaceKind::PLACES);
        let venue = entry.and_then(|entry| VENUES.iter().find(|venue| venue.id == entry.id));

        let payload = match (entry, venue) {
            (Some(entry), Some(venue)) => AccessibilityPayload {
                place: entry.name.clone(),
                found: true,
                access: venue.access,
                details: Some(venue.details.to_string()),
                address: Some(venue.address.to_string()),
                phone: venue.phone.map(str::to_string),
            },
            _ => AccessibilityPayload {
                place,
                found: false,
                access: AccessLevel::Unknown,
                details: None,
                address: None,
                phone: None,
            },
        };

        Box::pin(async move { Ok(payload) })
    }
}

impl Geocoder for OfflineMobilityData {
    fn geocode(&self, query: String, region: BoundingRegion) -> LookupFuture<GeocodePayload> {
        let found = self
            .gazetteer
            .resolve(&query, PlaceKind::ANY)
            .filter(|entry| region.contains(&entry.location))
            .map(|entry| (format!("{}, València", entry.name), entry.location));

        Box::pin(async move {
            let (display_name, location) = found
                .ok_or_else(|| LookupError::NotFound(format!("no address matches {query}")))?;
            Ok(GeocodePayload {
                query,
                display_name,
                location,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> OfflineMobilityData {
        OfflineMobilityData::new(Arc::new(Gazetteer::builtin().expect("builtin gazetteer")))
    }

    #[tokio::test]
    async fn finds_up_to_three_stops_nearest_first() {
        let plaza = Location::new(39.4698, -0.3763);
        let payload = data().nearest_stops(plaza, 800).await.expect("stops");

        assert_eq!(payload.radius_m, 800);
        assert!(!payload.stops.is_empty() && payload.stops.len() <= 3);
        assert_eq!(payload.stops[0].name, "Plaza del Ayuntamiento");
        assert!(payload
            .stops
            .windows(2)
            .all(|pair| pair[0].distance_m <= pair[1].distance_m));
        assert!(payload.stops.iter().all(|stop| stop.distance_m <= 800.0));
    }

    #[tokio::test]
    async fn empty_radius_is_not_found() {
        let port = Location::new(39.4440, -0.3170);
        let error = data().nearest_stops(port, 50).await.expect_err("nothing nearby");
        assert!(matches!(error, LookupError::NotFound(_)));
    }

    #[tokio::test]
    async fn estimates_routes_by_mode() {
        let origin = Location::new(39.4698, -0.3763);
        let destination = Location::new(39.4736, -0.3790);

        let walk = data()
            .route(origin, destination, TransportMode::Foot)
            .await
            .expect("walk");
        let drive = data()
            .route(origin, destination, TransportMode::Car)
            .await
            .expect("drive");

        assert_eq!(walk.distance_m, drive.distance_m);
        assert!(walk.duration_s > drive.duration_s);
        assert!(walk.instructions[0].starts_with("Dirígete hacia el noroeste"));
        assert_eq!(walk.instructions.last().map(String::as_str), Some("Llegarás a tu destino"));
    }

    #[test]
    fn cardinal_points_wrap() {
        assert_eq!(cardinal(0.0), "norte");
        assert_eq!(cardinal(359.0), "norte");
        assert_eq!(cardinal(90.0), "este");
        assert_eq!(cardinal(-45.0), "noroeste");
    }

    #[tokio::test]
    async fn traffic_by_zone_name_or_alias() {
        let ruzafa = data().traffic_status("Russafa".into()).await.expect("ruzafa");
        assert_eq!(ruzafa.zone, "Ruzafa");
        assert_eq!(ruzafa.level, TrafficLevel::Moderate);
        assert_eq!(ruzafa.average_speed_kmh, Some(25.5));

        let centre = data().traffic_status("ciutat vella".into()).await.expect("centre");
        assert_eq!(centre.level, TrafficLevel::Dense);

        let error = data()
            .traffic_status("Springfield".into())
            .await
            .expect_err("unknown zone");
        assert!(matches!(error, LookupError::NotFound(_)));
    }

    #[tokio::test]
    async fn accessibility_for_known_and_unknown_venues() {
        let ivam = data().accessibility("el ivam".into()).await.expect("ivam");
        assert!(ivam.found);
        assert_eq!(ivam.place, "IVAM");
        assert_eq!(ivam.access, AccessLevel::Full);
        assert!(ivam.phone.is_some());

        let unknown = data()
            .accessibility("el bar de pepe".into())
            .await
            .expect("answered");
        assert!(!unknown.found);
        assert_eq!(unknown.place, "el bar de pepe");
    }

    #[tokio::test]
    async fn geocodes_only_inside_region() {
        let found = data()
            .geocode("mercado central".into(), BoundingRegion::valencia())
            .await
            .expect("mercado");
        assert_eq!(found.display_name, "Mercado Central, València");

        let elsewhere = BoundingRegion {
            min_lat: 40.0,
            min_lon: -4.0,
            max_lat: 41.0,
            max_lon: -3.0,
        };
        assert!(data()
            .geocode("mercado central".into(), elsewhere)
            .await
            .is_err());
    }
}
