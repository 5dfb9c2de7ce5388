use crate::models::{
    AccessLevel, AccessibilityPayload, DataSource, DispatchOutcome, DispatchPayload, EntityKind,
    EntitySet, ExternalCause, FailureKind, GeocodePayload, Intent, NotFoundReason, RoutePayload,
    StopsPayload, TrafficLevel, TrafficPayload, TransportMode, DEFAULT_STOP_RADIUS_M,
};

const MAX_SPOKEN_INSTRUCTIONS: usize = 3;

pub fn clarification_reply() -> String {
    "No te he entendido bien. ¿Puedes repetirlo de otra forma? Puedo ayudarte con paradas cercanas, rutas, tráfico y accesibilidad.".to_string()
}

/// Builds the Spanish reply for a dispatch outcome. Never returns an empty string.
pub fn compose_reply(intent: Intent, entities: &EntitySet, outcome: &DispatchOutcome) -> String {
    let reply = match outcome {
        DispatchOutcome::Success { payload } => compose_payload(payload),
        DispatchOutcome::NotFound { reason } => compose_not_found(intent, entities, reason),
        DispatchOutcome::ExternalFailure { cause } => compose_external_failure(cause),
        DispatchOutcome::Degraded { partial, cause } => compose_degraded(partial, cause),
    };

    if reply.trim().is_empty() {
        clarification_reply()
    } else {
        reply
    }
}

/// Distances under a kilometre are spoken in whole metres, longer ones in kilometres with one decimal.
pub fn format_distance(metres: f64) -> String {
    let metres = metres.max(0.0);
    let rounded = metres.round();
    if rounded < 1000.0 {
        let whole = rounded as u64;
        if whole == 1 {
            "1 metro".to_string()
        } else {
            format!("{whole} metros")
        }
    } else {
        let km = format!("{:.1}", metres / 1000.0).replace('.', ",");
        format!("{km} kilómetros")
    }
}

pub fn format_duration(seconds: f64) -> String {
    let minutes = (seconds.max(0.0) / 60.0).round() as u64;
    match minutes {
        0 | 1 => "1 minuto".to_string(),
        m if m < 60 => format!("{m} minutos"),
        m => {
            let hours = m / 60;
            let rest = m % 60;
            let hours_text = if hours == 1 {
                "1 hora".to_string()
            } else {
                format!("{hours} horas")
            };
            if rest == 0 {
                hours_text
            } else {
                format!("{hours_text} y {rest} minutos")
            }
        }
    }
}

fn compose_payload(payload: &DispatchPayload) -> String {
    match payload {
        DispatchPayload::Stops(stops) => compose_stops(stops),
        DispatchPayload::Route(route) => compose_route(route),
        DispatchPayload::Traffic(traffic) => compose_traffic(traffic),
        DispatchPayload::Accessibility(access) => compose_accessibility(access),
        DispatchPayload::Geocode(place) => compose_geocode(place),
        DispatchPayload::Conversational(Intent::Farewell) => {
            "¡Hasta luego! Que tengas un buen trayecto por Valencia.".to_string()
        }
        DispatchPayload::Conversational(_) => {
            "¡Hola! Soy tu asistente de movilidad en Valencia. Pregúntame por paradas, rutas, tráfico o accesibilidad.".to_string()
        }
    }
}

fn compose_stops(payload: &StopsPayload) -> String {
    let Some(nearest) = payload.stops.first() else {
        return no_stops_reply(payload.radius_m);
    };

    let mut reply = format!(
        "La parada más cercana es {}, a {}.",
        nearest.name,
        format_distance(nearest.distance_m)
    );
    if !nearest.lines.is_empty() {
        let noun = if nearest.lines.len() == 1 { "la línea" } else { "las líneas" };
        reply.push_str(&format!(" Pasan {noun} {}.", join_spoken(&nearest.lines)));
    }
    if let Some(next) = payload.stops.get(1) {
        reply.push_str(&format!(
            " También tienes {} a {}.",
            next.name,
            format_distance(next.distance_m)
        ));
    }
    reply
}

fn compose_route(route: &RoutePayload) -> String {
    let destination = route
        .destination_name
        .as_deref()
        .map(|name| format!("a {name}"))
        .unwrap_or_else(|| "a tu destino".to_string());

    let mut reply = format!(
        "Para llegar {destination} {} recorrerás {} en unos {}.",
        mode_phrase(route.mode),
        format_distance(route.distance_m),
        format_duration(route.duration_s)
    );

    for (index, instruction) in route
        .instructions
        .iter()
        .take(MAX_SPOKEN_INSTRUCTIONS)
        .enumerate()
    {
        let lead = match index {
            0 => "Primero",
            1 => "Después",
            _ => "Luego",
        };
        reply.push_str(&format!(" {lead}, {}.", lowercase_first(instruction.trim_end_matches('.'))));
    }
    if route.instructions.len() > MAX_SPOKEN_INSTRUCTIONS {
        reply.push_str(" Sigue las indicaciones hasta llegar.");
    }

    if let Some(traffic) = &route.traffic {
        reply.push(' ');
        reply.push_str(&compose_traffic(traffic));
    }
    reply
}

fn compose_traffic(traffic: &TrafficPayload) -> String {
    if traffic.level == TrafficLevel::Unknown {
        return format!(
            "Ahora mismo no hay datos suficientes del tráfico en {}. {}",
            traffic.zone,
            traffic_advice(traffic.level)
        );
    }

    let mut reply = format!(
        "El tráfico en {} es {}.",
        traffic.zone,
        traffic_level_phrase(traffic.level)
    );
    if let Some(speed) = traffic.average_speed_kmh {
        reply.push_str(&format!(
            " La velocidad media es de {} kilómetros por hora.",
            speed.round() as i64
        ));
    }
    reply.push(' ');
    reply.push_str(traffic_advice(traffic.level));
    reply
}

fn compose_accessibility(access: &AccessibilityPayload) -> String {
    if !access.found {
        return no_accessibility_reply(&access.place);
    }

    let mut reply = match access.access {
        AccessLevel::Full => format!(
            "{} es accesible para personas con movilidad reducida.",
            capitalize(&access.place)
        ),
        AccessLevel::Partial => format!(
            "{} es parcialmente accesible.",
            capitalize(&access.place)
        ),
        AccessLevel::None => format!(
            "{} no está adaptado para personas con movilidad reducida.",
            capitalize(&access.place)
        ),
        AccessLevel::Unknown => format!(
            "No tengo datos concluyentes sobre la accesibilidad de {}.",
            access.place
        ),
    };
    if let Some(details) = access.details.as_deref().filter(|d| !d.trim().is_empty()) {
        reply.push_str(&format!(" {}.", details.trim().trim_end_matches('.')));
    }
    if let Some(address) = access.address.as_deref().filter(|a| !a.trim().is_empty()) {
        reply.push_str(&format!(" La dirección es {}.", address.trim()));
    }
    if let Some(phone) = access.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        reply.push_str(&format!(" Puedes llamar al {}.", phone.trim()));
    }
    reply
}

fn compose_geocode(place: &GeocodePayload) -> String {
    format!(
        "He encontrado {}: {}.",
        place.query,
        place.display_name.trim_end_matches('.')
    )
}

fn compose_not_found(intent: Intent, entities: &EntitySet, reason: &NotFoundReason) -> String {
    match reason {
        NotFoundReason::MissingParameter(kind) => missing_parameter_prompt(intent, *kind),
        NotFoundReason::NoResults(DataSource::StopLocator) => {
            no_stops_reply(entities.radius().unwrap_or(DEFAULT_STOP_RADIUS_M))
        }
        NotFoundReason::NoResults(DataSource::Accessibility) => {
            no_accessibility_reply(entities.text(EntityKind::Place).unwrap_or("ese lugar"))
        }
        NotFoundReason::NoResults(DataSource::Traffic) => format!(
            "Lo siento, ahora mismo no hay datos de tráfico para {}.",
            entities.text(EntityKind::Zone).unwrap_or("esa zona")
        ),
        NotFoundReason::NoResults(DataSource::Router) => format!(
            "Lo siento, no he encontrado una ruta hasta {}.",
            entities.text(EntityKind::Place).unwrap_or("tu destino")
        ),
        NotFoundReason::NoResults(DataSource::Geocoder) => format!(
            "Lo siento, no he encontrado {} en Valencia.",
            entities.text(EntityKind::Place).unwrap_or("ese lugar")
        ),
        NotFoundReason::UnknownPlace(place) => format!(
            "Lo siento, no he encontrado {place} en Valencia. ¿Puedes decirlo de otra forma?"
        ),
        NotFoundReason::Unsupported => clarification_reply(),
    }
}

fn missing_parameter_prompt(intent: Intent, kind: EntityKind) -> String {
    match (intent, kind) {
        (Intent::TrafficStatus, _) => {
            "¿De qué zona o barrio de Valencia quieres saber el estado del tráfico?".to_string()
        }
        (_, EntityKind::OriginCoords) => {
            "Necesito saber dónde estás. ¿Puedes activar la ubicación o decirme desde dónde sales?"
                .to_string()
        }
        (Intent::Route, _) => {
            "No he entendido a dónde quieres ir. ¿Puedes decirme el destino?".to_string()
        }
        (Intent::AccessibilityInfo, _) => {
            "¿De qué lugar quieres conocer la accesibilidad?".to_string()
        }
        (Intent::Geocode, _) => "¿Qué lugar o dirección quieres que busque?".to_string(),
        (_, kind) => format!(
            "Me falta {} para responder. ¿Puedes repetir la pregunta con más detalle?",
            entity_label(kind)
        ),
    }
}

fn compose_external_failure(cause: &ExternalCause) -> String {
    match cause.kind {
        FailureKind::Timeout => format!(
            "Lo siento, el servicio de {} no está disponible: ha tardado demasiado en responder. Inténtalo de nuevo en unos minutos.",
            source_label(cause.source)
        ),
        FailureKind::Unreachable => format!(
            "Lo siento, el servicio de {} no está disponible en este momento. Inténtalo de nuevo en unos minutos.",
            source_label(cause.source)
        ),
    }
}

fn compose_degraded(partial: &DispatchPayload, cause: &ExternalCause) -> String {
    match partial {
        DispatchPayload::Traffic(traffic) if cause.source == DataSource::Router => format!(
            "No he podido calcular la ruta porque el servicio de {} no está disponible, así que la respuesta está incompleta. {}",
            source_label(cause.source),
            compose_traffic(traffic)
        ),
        other => format!(
            "{} No he podido consultar el servicio de {}, así que esta parte de la respuesta está incompleta.",
            compose_payload(other),
            source_label(cause.source)
        ),
    }
}

fn no_stops_reply(radius_m: u32) -> String {
    format!(
        "Lo siento, no he encontrado paradas de transporte público a menos de {} de ti.",
        format_distance(f64::from(radius_m))
    )
}

fn no_accessibility_reply(place: &str) -> String {
    format!(
        "Lo siento, no tengo información de accesibilidad sobre {place}. Te recomiendo llamar al 010 o contactar directamente con el lugar."
    )
}

fn source_label(source: DataSource) -> &'static str {
    match source {
        DataSource::StopLocator => "localización de paradas",
        DataSource::Router => "cálculo de rutas",
        DataSource::Traffic => "estado del tráfico",
        DataSource::Accessibility => "información de accesibilidad",
        DataSource::Geocoder => "búsqueda de direcciones",
    }
}

fn entity_label(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Place => "el lugar",
        EntityKind::Zone => "la zona",
        EntityKind::OriginCoords => "el punto de partida",
        EntityKind::DestinationCoords => "el destino",
        EntityKind::Mode => "el medio de transporte",
        EntityKind::Radius => "la distancia de búsqueda",
    }
}

fn mode_phrase(mode: TransportMode) -> &'static str {
    match mode {
        TransportMode::Foot => "a pie",
        TransportMode::Bike => "en bici",
        TransportMode::Car => "en coche",
        TransportMode::Bus => "en autobús",
    }
}

fn traffic_level_phrase(level: TrafficLevel) -> &'static str {
    match level {
        TrafficLevel::Fluid => "fluido",
        TrafficLevel::Moderate => "moderado",
        TrafficLevel::Dense => "denso",
        TrafficLevel::Unknown => "desconocido",
    }
}

fn traffic_advice(level: TrafficLevel) -> &'static str {
    match level {
        TrafficLevel::Fluid => "Es buen momento para circular.",
        TrafficLevel::Moderate => "Cuenta con algo más de tiempo de viaje.",
        TrafficLevel::Dense => "Te recomiendo el transporte público o una ruta alternativa.",
        TrafficLevel::Unknown => "Consulta el estado de las vías antes de salir.",
    }
}

fn join_spoken(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{} y {}", head.join(", "), last),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityValue, Location, StopInfo};

    fn stop(name: &str, distance_m: f64, lines: &[&str]) -> StopInfo {
        StopInfo {
            name: name.to_string(),
            distance_m,
            lines: lines.iter().map(|l| l.to_string()).collect(),
            location: Location::new(39.47, -0.37),
        }
    }

    fn route(traffic: Option<TrafficPayload>) -> RoutePayload {
        RoutePayload {
            origin: Location::new(39.4699, -0.3763),
            destination: Location::new(39.4548, -0.3503),
            destination_name: Some("Ciudad de las Artes y las Ciencias".into()),
            mode: TransportMode::Car,
            distance_m: 3460.0,
            duration_s: 540.0,
            instructions: vec!["Sal hacia el este".into(), "Gira a la derecha".into()],
            traffic,
        }
    }

    fn traffic(level: TrafficLevel) -> TrafficPayload {
        TrafficPayload {
            zone: "Ruzafa".into(),
            level,
            average_speed_kmh: Some(25.5),
        }
    }

    #[test]
    fn formats_distances_in_spanish() {
        assert_eq!(format_distance(120.4), "120 metros");
        assert_eq!(format_distance(1.0), "1 metro");
        assert_eq!(format_distance(999.4), "999 metros");
        assert_eq!(format_distance(999.6), "1,0 kilómetros");
        assert_eq!(format_distance(2345.0), "2,3 kilómetros");
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(20.0), "1 minuto");
        assert_eq!(format_duration(540.0), "9 minutos");
        assert_eq!(format_duration(3900.0), "1 hora y 5 minutos");
    }

    #[test]
    fn names_nearest_stop_with_distance_and_lines() {
        let outcome = DispatchOutcome::success(DispatchPayload::Stops(StopsPayload {
            radius_m: 300,
            stops: vec![stop("Plaza del Ayuntamiento", 82.3, &["4", "6", "8"]), stop("Xàtiva", 260.0, &[])],
        }));
        let reply = compose_reply(Intent::NearestStop, &EntitySet::new(), &outcome);
        assert_eq!(
            reply,
            "La parada más cercana es Plaza del Ayuntamiento, a 82 metros. Pasan las líneas 4, 6 y 8. También tienes Xàtiva a 260 metros."
        );
    }

    #[test]
    fn route_reply_includes_traffic_note() {
        let outcome = DispatchOutcome::success(DispatchPayload::Route(route(Some(traffic(TrafficLevel::Moderate)))));
        let reply = compose_reply(Intent::Route, &EntitySet::new(), &outcome);
        assert!(reply.starts_with("Para llegar a Ciudad de las Artes y las Ciencias en coche recorrerás 3,5 kilómetros en unos 9 minutos."));
        assert!(reply.contains("Primero, sal hacia el este."));
        assert!(reply.contains("El tráfico en Ruzafa es moderado."));
    }

    #[test]
    fn missing_zone_prompts_for_zone() {
        let outcome = DispatchOutcome::missing(EntityKind::Zone);
        let reply = compose_reply(Intent::TrafficStatus, &EntitySet::new(), &outcome);
        assert!(reply.contains("zona"));
        assert!(reply.ends_with('?'));
    }

    #[test]
    fn external_failure_names_the_source() {
        let outcome = DispatchOutcome::external(ExternalCause::unreachable(DataSource::Router, "connection refused"));
        let reply = compose_reply(Intent::Route, &EntitySet::new(), &outcome);
        assert!(reply.starts_with("Lo siento"));
        assert!(reply.contains("cálculo de rutas"));
        assert!(reply.contains("no está disponible"));
        assert!(!reply.contains("connection refused"));
    }

    #[test]
    fn degraded_reply_marks_answer_incomplete() {
        let outcome = DispatchOutcome::Degraded {
            partial: DispatchPayload::Route(route(None)),
            cause: ExternalCause::timeout(DataSource::Traffic, "5s"),
        };
        let reply = compose_reply(Intent::Route, &EntitySet::new(), &outcome);
        assert!(reply.contains("Para llegar"));
        assert!(reply.contains("incompleta"));
        assert!(reply.contains("estado del tráfico"));

        let outcome = DispatchOutcome::Degraded {
            partial: DispatchPayload::Traffic(traffic(TrafficLevel::Dense)),
            cause: ExternalCause::unreachable(DataSource::Router, "down"),
        };
        let reply = compose_reply(Intent::Route, &EntitySet::new(), &outcome);
        assert!(reply.starts_with("No he podido calcular la ruta"));
        assert!(reply.contains("denso"));
    }

    #[test]
    fn no_stops_uses_requested_radius() {
        let entities = EntitySet::new().with(EntityKind::Radius, EntityValue::Radius(500));
        let outcome = DispatchOutcome::not_found(NotFoundReason::NoResults(DataSource::StopLocator));
        let reply = compose_reply(Intent::NearestStop, &entities, &outcome);
        assert!(reply.contains("500 metros"));
    }

    #[test]
    fn accessibility_reply_adds_contact_details() {
        let outcome = DispatchOutcome::success(DispatchPayload::Accessibility(AccessibilityPayload {
            place: "el IVAM".into(),
            found: true,
            access: AccessLevel::Full,
            details: Some("Rampas y ascensores en todas las plantas".into()),
            address: Some("Carrer de Guillem de Castro, 118".into()),
            phone: Some("963 17 66 00".into()),
        }));
        let reply = compose_reply(Intent::AccessibilityInfo, &EntitySet::new(), &outcome);
        assert!(reply.starts_with("El IVAM es accesible"));
        assert!(reply.contains("Puedes llamar al 963 17 66 00."));
    }

    #[test]
    fn every_outcome_produces_text() {
        let outcomes = [
            DispatchOutcome::not_found(NotFoundReason::Unsupported),
            DispatchOutcome::not_found(NotFoundReason::UnknownPlace("calle inventada".into())),
            DispatchOutcome::success(DispatchPayload::Conversational(Intent::Greeting)),
            DispatchOutcome::success(DispatchPayload::Conversational(Intent::Farewell)),
        ];
        for outcome in outcomes {
            for intent in Intent::ALL {
                assert!(!compose_reply(intent, &EntitySet::new(), &outcome).trim().is_empty());
            }
        }
    }
}
