use aura_core::Location;

use crate::{GazetteerEntry, PlaceKind};

fn entry(
    id: &str,
    name: &str,
    kind: PlaceKind,
    aliases: &[&str],
    (lat, lon): (f64, f64),
    zone: Option<&str>,
    lines: &[&str],
) -> GazetteerEntry {
    GazetteerEntry {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
        location: Location::new(lat, lon),
        zone: zone.map(str::to_string),
        lines: lines.iter().map(|line| line.to_string()).collect(),
    }
}

fn stop(id: &str, name: &str, aliases: &[&str], at: (f64, f64), zone: &str, lines: &[&str]) -> GazetteerEntry {
    entry(id, name, PlaceKind::Stop, aliases, at, Some(zone), lines)
}

fn landmark(id: &str, name: &str, aliases: &[&str], at: (f64, f64), zone: &str) -> GazetteerEntry {
    entry(id, name, PlaceKind::Landmark, aliases, at, Some(zone), &[])
}

fn zone(id: &str, name: &str, aliases: &[&str], at: (f64, f64)) -> GazetteerEntry {
    entry(id, name, PlaceKind::Zone, aliases, at, None, &[])
}

pub(crate) fn valencia_entries() -> Vec<GazetteerEntry> {
    vec![
        stop(
            "plaza-ayuntamiento",
            "Plaza del Ayuntamiento",
            &["plaza del ayuntamiento", "plaza ayuntamiento", "placa de l ajuntament"],
            (39.4697, -0.3772),
            "Ciutat Vella",
            &["4", "6", "8", "9", "11", "70"],
        ),
        stop(
            "xativa",
            "Xàtiva",
            &["xativa", "marques de sotelo", "estacion de xativa"],
            (39.4670, -0.3771),
            "Ciutat Vella",
            &["L3", "L5", "L9", "5", "7", "10", "35"],
        ),
        stop(
            "colon",
            "Colón",
            &["colon", "jorge juan", "estacion de colon"],
            (39.4702, -0.3712),
            "Eixample",
            &["L3", "L5", "L9", "4", "6", "16"],
        ),
        stop(
            "ruzafa-sueca",
            "Sueca - Literato Azorín",
            &["sueca", "literato azorin"],
            (39.4618, -0.3742),
            "Ruzafa",
            &["7", "27", "35"],
        ),
        stop(
            "gran-via-turia",
            "Gran Vía Marqués del Turia",
            &["gran via", "marques del turia"],
            (39.4662, -0.3691),
            "Eixample",
            &["8", "9", "10"],
        ),
        stop(
            "angel-guimera",
            "Ángel Guimerà",
            &["angel guimera"],
            (39.4697, -0.3889),
            "Extramurs",
            &["L1", "L3", "L5", "L9"],
        ),
        stop(
            "estacion-benimaclet",
            "Estación de Benimaclet",
            &["estacion de benimaclet", "metro de benimaclet"],
            (39.4851, -0.3606),
            "Benimaclet",
            &["L3", "L4", "L9"],
        ),
        stop(
            "turia-campanar",
            "Túria",
            &["estacion de turia", "nuevo centro"],
            (39.4805, -0.3903),
            "Campanar",
            &["L1", "L2"],
        ),
        stop(
            "eugenia-vines",
            "Eugenia Viñes",
            &["eugenia vines"],
            (39.4792, -0.3251),
            "Malvarrosa",
            &["L4", "L6", "19", "32"],
        ),
        stop(
            "mercado-central-stop",
            "Avenida del Oeste",
            &["parada del mercado central", "avenida del oeste"],
            (39.4740, -0.3795),
            "Ciutat Vella",
            &["7", "27", "60", "81"],
        ),
        landmark(
            "ayuntamiento",
            "Ayuntamiento de Valencia",
            &["ayuntamiento", "ayuntamiento de valencia", "ajuntament"],
            (39.4698, -0.3763),
            "Ciutat Vella",
        ),
        landmark(
            "mercado-central",
            "Mercado Central",
            &["mercado central", "mercat central"],
            (39.4736, -0.3790),
            "Ciutat Vella",
        ),
        landmark(
            "ivam",
            "IVAM",
            &["ivam", "museo ivam", "instituto valenciano de arte moderno"],
            (39.4792, -0.3831),
            "Ciutat Vella",
        ),
        landmark(
            "estacion-norte",
            "Estación del Norte",
            &["estacion del norte", "estacion norte", "estacio del nord"],
            (39.4665, -0.3774),
            "Ruzafa",
        ),
        landmark(
            "ciudad-artes-ciencias",
            "Ciudad de las Artes y las Ciencias",
            &[
                "ciudad de las artes y las ciencias",
                "ciudad de las artes",
                "ciutat de les arts i les ciencies",
                "ciutat de les arts",
            ],
            (39.4548, -0.3503),
            "Quatre Carreres",
        ),
        landmark(
            "catedral",
            "Catedral de Valencia",
            &["catedral", "la catedral", "catedral de valencia"],
            (39.4753, -0.3753),
            "Ciutat Vella",
        ),
        landmark(
            "torres-serranos",
            "Torres de Serranos",
            &["torres de serranos", "torres serranos"],
            (39.4794, -0.3758),
            "Ciutat Vella",
        ),
        landmark(
            "playa-malvarrosa",
            "Playa de la Malvarrosa",
            &["playa de la malvarrosa", "playa malvarrosa"],
            (39.4781, -0.3232),
            "Malvarrosa",
        ),
        landmark(
            "bioparc",
            "Bioparc",
            &["bioparc", "bioparc valencia"],
            (39.4783, -0.4083),
            "Campanar",
        ),
        landmark(
            "upv",
            "Universitat Politècnica",
            &["universidad politecnica", "politecnica", "upv"],
            (39.4817, -0.3414),
            "Algirós",
        ),
        landmark(
            "museo-bellas-artes",
            "Museo de Bellas Artes",
            &["museo de bellas artes", "bellas artes"],
            (39.4793, -0.3710),
            "Ciutat Vella",
        ),
        zone(
            "ciutat-vella",
            "Ciutat Vella",
            &["ciutat vella", "centro", "el centro", "centro historico"],
            (39.4740, -0.3760),
        ),
        zone(
            "el-carmen",
            "El Carmen",
            &["el carmen", "barrio del carmen", "el carme"],
            (39.4780, -0.3800),
        ),
        zone("ruzafa", "Ruzafa", &["ruzafa", "russafa"], (39.4610, -0.3730)),
        zone("eixample", "Eixample", &["eixample", "ensanche"], (39.4650, -0.3680)),
        zone("campanar", "Campanar", &["campanar"], (39.4830, -0.3950)),
        zone("benimaclet", "Benimaclet", &["benimaclet"], (39.4870, -0.3600)),
        zone(
            "malvarrosa",
            "Malvarrosa",
            &["malvarrosa", "malvarossa", "la malvarrosa"],
            (39.4800, -0.3270),
        ),
        zone("cabanyal", "Cabanyal", &["cabanyal", "el cabanyal", "cabanal"], (39.4690, -0.3320)),
        zone("patraix", "Patraix", &["patraix"], (39.4600, -0.3900)),
        zone("algiros", "Algirós", &["algiros"], (39.4770, -0.3480)),
        zone("extramurs", "Extramurs", &["extramurs"], (39.4700, -0.3880)),
        zone(
            "quatre-carreres",
            "Quatre Carreres",
            &["quatre carreres"],
            (39.4520, -0.3600),
        ),
    ]
}
