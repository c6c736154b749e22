use std::str::FromStr;

use serde::Deserialize;

/// Which map service location messages link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum MapProvider {
    #[default]
    #[serde(rename = "openstreetmap")]
    OpenStreetMap,
    #[serde(rename = "google-maps")]
    GoogleMaps,
    #[serde(rename = "apple-maps")]
    AppleMaps,
}

impl FromStr for MapProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openstreetmap" | "osm" => Ok(MapProvider::OpenStreetMap),
            "google-maps" | "google" => Ok(MapProvider::GoogleMaps),
            "apple-maps" | "apple" => Ok(MapProvider::AppleMaps),
            other => Err(format!("unknown map provider: {}", other)),
        }
    }
}

/// URL showing the point (`lat`, `lng`) on the provider's map.
pub fn by_provider(provider: MapProvider, lat: f64, lng: f64) -> String {
    match provider {
        MapProvider::OpenStreetMap => format!(
            "https://www.openstreetmap.org/?mlat={lat}&mlon={lng}#map=16/{lat}/{lng}"
        ),
        MapProvider::GoogleMaps => format!("https://maps.google.com/?q={lat},{lng}"),
        MapProvider::AppleMaps => format!("https://maps.apple.com/?ll={lat},{lng}&q={lat},{lng}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links() {
        assert_eq!(
            by_provider(MapProvider::OpenStreetMap, 52.37, 4.89),
            "https://www.openstreetmap.org/?mlat=52.37&mlon=4.89#map=16/52.37/4.89"
        );
        assert_eq!(
            by_provider(MapProvider::GoogleMaps, -33.5, 151.25),
            "https://maps.google.com/?q=-33.5,151.25"
        );
        assert_eq!(
            by_provider(MapProvider::AppleMaps, 1.0, 2.5),
            "https://maps.apple.com/?ll=1,2.5&q=1,2.5"
        );
    }

    #[test]
    fn test_parse_provider() {
        assert_eq!("Google".parse(), Ok(MapProvider::GoogleMaps));
        assert_eq!("openstreetmap".parse(), Ok(MapProvider::OpenStreetMap));
        assert!("bing".parse::<MapProvider>().is_err());
    }
}
