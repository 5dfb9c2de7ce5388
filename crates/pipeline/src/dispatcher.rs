use std::time::Duration;

use aura_core::{
    BoundingRegion, DataSource, DispatchOutcome, DispatchPayload, EntityKind, EntitySet,
    ExternalCause, Intent, Location, NotFoundReason, RoutePayload, TrafficPayload, TransportMode,
    DEFAULT_STOP_RADIUS_M,
};
use aura_providers::{LookupError, LookupFuture, MobilityProviders};
use tracing::{debug, warn};

/// How a single collaborator call went, once timeouts are folded in.
#[derive(Debug)]
enum CallFailure {
    NotFound,
    External(ExternalCause),
}

/// Routes an intent to exactly one data source (two for a car route with a
/// known zone) and folds every result or failure into a `DispatchOutcome`.
#[derive(Clone)]
pub struct Dispatcher {
    providers: MobilityProviders,
    call_timeout: Duration,
    region: BoundingRegion,
}

impl Dispatcher {
    pub fn new(providers: MobilityProviders, call_timeout: Duration, region: BoundingRegion) -> Self {
        Self {
            providers,
            call_timeout,
            region,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub async fn dispatch(
        &self,
        intent: Intent,
        entities: &EntitySet,
        caller: Option<Location>,
    ) -> DispatchOutcome {
        let outcome = match intent {
            Intent::NearestStop => self.nearest_stop(entities, caller).await,
            Intent::Route => self.route(entities, caller).await,
            Intent::TrafficStatus => self.traffic(entities).await,
            Intent::AccessibilityInfo => self.accessibility(entities).await,
            Intent::Geocode => self.geocode(entities).await,
            Intent::Greeting | Intent::Farewell => {
                DispatchOutcome::success(DispatchPayload::Conversational(intent))
            }
            Intent::Unknown => DispatchOutcome::not_found(NotFoundReason::Unsupported),
        };

        debug!(intent = %intent, outcome = outcome.variant_name(), "dispatched");
        outcome
    }

    async fn call<T>(&self, source: DataSource, lookup: LookupFuture<T>) -> Result<T, CallFailure> {
        match tokio::time::timeout(self.call_timeout, lookup).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(LookupError::NotFound(detail))) => {
                debug!(source = %source, detail = %detail, "data source found nothing");
                Err(CallFailure::NotFound)
            }
            Ok(Err(LookupError::Unreachable(detail))) => {
                warn!(source = %source, detail = %detail, "data source unreachable");
                Err(CallFailure::External(ExternalCause::unreachable(source, detail)))
            }
            Ok(Err(LookupError::Timeout(after))) => {
                warn!(source = %source, ?after, "data source timed out");
                Err(CallFailure::External(ExternalCause::timeout(
                    source,
                    format!("no answer within {} ms", after.as_millis()),
                )))
            }
            Err(_) => {
                warn!(source = %source, timeout = ?self.call_timeout, "data source call exceeded budget");
                Err(CallFailure::External(ExternalCause::timeout(
                    source,
                    format!("no answer within {} ms", self.call_timeout.as_millis()),
                )))
            }
        }
    }

    async fn nearest_stop(&self, entities: &EntitySet, caller: Option<Location>) -> DispatchOutcome {
        let Some(origin) = entities.coords(EntityKind::OriginCoords).or(caller) else {
            return DispatchOutcome::missing(EntityKind::OriginCoords);
        };
        let radius_m = entities.radius().unwrap_or(DEFAULT_STOP_RADIUS_M);

        let lookup = self.providers.stops.nearest_stops(origin, radius_m);
        match self.call(DataSource::StopLocator, lookup).await {
            Ok(payload) => DispatchOutcome::success(DispatchPayload::Stops(payload)),
            Err(failure) => failed(failure, NotFoundReason::NoResults(DataSource::StopLocator)),
        }
    }

    async fn route(&self, entities: &EntitySet, caller: Option<Location>) -> DispatchOutcome {
        let Some(origin) = entities.coords(EntityKind::OriginCoords).or(caller) else {
            return DispatchOutcome::missing(EntityKind::OriginCoords);
        };

        let place = entities.text(EntityKind::Place).map(str::to_string);
        let (destination, destination_name) = match (entities.coords(EntityKind::DestinationCoords), place) {
            (Some(coords), place) => (coords, place),
            (None, Some(place)) => {
                let lookup = self.providers.geocoder.geocode(place.clone(), self.region);
                match self.call(DataSource::Geocoder, lookup).await {
                    Ok(found) => (found.location, Some(place)),
                    Err(failure) => return failed(failure, NotFoundReason::UnknownPlace(place)),
                }
            }
            (None, None) => return DispatchOutcome::missing(EntityKind::DestinationCoords),
        };

        let mode = entities.mode().unwrap_or(TransportMode::Foot);
        let zone = entities
            .text(EntityKind::Zone)
            .filter(|_| mode == TransportMode::Car)
            .map(str::to_string);

        let route_lookup = self.providers.router.route(origin, destination, mode);
        let Some(zone) = zone else {
            return match self.call(DataSource::Router, route_lookup).await {
                Ok(route) => route_success(route, destination_name, None),
                Err(failure) => failed(failure, NotFoundReason::NoResults(DataSource::Router)),
            };
        };

        let traffic_lookup = self.providers.traffic.traffic_status(zone);
        let (route, traffic) = tokio::join!(
            self.call(DataSource::Router, route_lookup),
            self.call(DataSource::Traffic, traffic_lookup)
        );

        match (route, traffic) {
            (Ok(route), Ok(traffic)) => route_success(route, destination_name, Some(traffic)),
            (Ok(route), Err(CallFailure::NotFound)) => route_success(route, destination_name, None),
            (Ok(route), Err(CallFailure::External(cause))) => DispatchOutcome::Degraded {
                partial: DispatchPayload::Route(named(route, destination_name)),
                cause,
            },
            (Err(CallFailure::External(cause)), Ok(traffic)) => DispatchOutcome::Degraded {
                partial: DispatchPayload::Traffic(traffic),
                cause,
            },
            (Err(failure), _) => failed(failure, NotFoundReason::NoResults(DataSource::Router)),
        }
    }

    async fn traffic(&self, entities: &EntitySet) -> DispatchOutcome {
        let Some(zone) = entities.text(EntityKind::Zone) else {
            return DispatchOutcome::missing(EntityKind::Zone);
        };

        let lookup = self.providers.traffic.traffic_status(zone.to_string());
        match self.call(DataSource::Traffic, lookup).await {
            Ok(payload) => DispatchOutcome::success(DispatchPayload::Traffic(payload)),
            Err(failure) => failed(failure, NotFoundReason::NoResults(DataSource::Traffic)),
        }
    }

    async fn accessibility(&self, entities: &EntitySet) -> DispatchOutcome {
        let Some(place) = entities.text(EntityKind::Place) else {
            return DispatchOutcome::missing(EntityKind::Place);
        };

        let lookup = self.providers.accessibility.accessibility(place.to_string());
        match self.call(DataSource::Accessibility, lookup).await {
            Ok(payload) if payload.found => {
                DispatchOutcome::success(DispatchPayload::Accessibility(payload))
            }
            Ok(_) => DispatchOutcome::not_found(NotFoundReason::NoResults(DataSource::Accessibility)),
            Err(failure) => failed(failure, NotFoundReason::NoResults(DataSource::Accessibility)),
        }
    }

    async fn geocode(&self, entities: &EntitySet) -> DispatchOutcome {
        let Some(place) = entities.text(EntityKind::Place) else {
            return DispatchOutcome::missing(EntityKind::Place);
        };

        let lookup = self.providers.geocoder.geocode(place.to_string(), self.region);
        match self.call(DataSource::Geocoder, lookup).await {
            Ok(payload) => DispatchOutcome::success(DispatchPayload::Geocode(payload)),
            Err(failure) => failed(failure, NotFoundReason::UnknownPlace(place.to_string())),
        }
    }
}

fn failed(failure: CallFailure, not_found: NotFoundReason) -> DispatchOutcome {
    match failure {
        CallFailure::NotFound => DispatchOutcome::not_found(not_found),
        CallFailure::External(cause) => DispatchOutcome::external(cause),
    }
}

fn named(mut route: RoutePayload, destination_name: Option<String>) -> RoutePayload {
    if route.destination_name.is_none() {
        route.destination_name = destination_name;
    }
    route
}

fn route_success(
    route: RoutePayload,
    destination_name: Option<String>,
    traffic: Option<TrafficPayload>,
) -> DispatchOutcome {
    let mut route = named(route, destination_name);
    route.traffic = traffic;
    DispatchOutcome::success(DispatchPayload::Route(route))
}

/// Memoization key over `(intent, entities, location)`. The location is rounded
/// to about ten metres so nearby repeats share an entry.
pub fn cache_key(intent: Intent, entities: &EntitySet, caller: Option<Location>) -> String {
    let entities = serde_json::to_string(entities).unwrap_or_default();
    match caller {
        Some(at) => format!("{intent}|{entities}|{:.4},{:.4}", at.lat, at.lon),
        None => format!("{intent}|{entities}|-"),
    }
}

/// How long a successful outcome may be served from the lookup cache.
pub fn cache_ttl(intent: Intent) -> Option<chrono::Duration> {
    match intent {
        Intent::NearestStop => Some(chrono::Duration::minutes(30)),
        Intent::Route => Some(chrono::Duration::minutes(10)),
        Intent::TrafficStatus => Some(chrono::Duration::minutes(5)),
        Intent::AccessibilityInfo | Intent::Geocode => Some(chrono::Duration::minutes(60)),
        Intent::Greeting | Intent::Farewell | Intent::Unknown => None,
    }
}
