use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::dispatch::{Dispatcher, HttpTransport, RequestDescriptor, Transport};
use crate::model::Coordinates;

/// LocationIQ geocoding client: forward search, autocomplete and reverse
/// lookup. A thin parameter-mapping layer; de-duplication and retries come
/// from the shared [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct LocationIqClient<T: Transport = HttpTransport> {
    base_url: String,
    api_key: String,
    dispatch: Arc<Dispatcher<T>>,
}

impl<T: Transport> LocationIqClient<T> {
    pub fn new(base_url: impl Into<String>, api_key: String, dispatch: Arc<Dispatcher<T>>) -> Self {
        Self { base_url: base_url.into(), api_key, dispatch }
    }

    /// Forward geocoding: free-text query to a ranked list of places.
    pub async fn forward_search(&self, query: &str) -> Result<Vec<Place>> {
        self.get_json("/v1/search", vec![("q".to_string(), query.to_string())])
            .await
            .context("LocationIQ forward search failed")
    }

    /// Autocomplete variant of forward geocoding; results carry a structured
    /// address subobject.
    pub async fn autocomplete(&self, query: &str) -> Result<Vec<Place>> {
        self.get_json("/v1/autocomplete", vec![("q".to_string(), query.to_string())])
            .await
            .context("LocationIQ autocomplete failed")
    }

    /// Reverse geocoding: coordinates to the nearest place.
    pub async fn reverse(&self, lat: f64, lon: f64) -> Result<Place> {
        self.get_json(
            "/v1/reverse",
            vec![("lat".to_string(), lat.to_string()), ("lon".to_string(), lon.to_string())],
        )
        .await
        .context("LocationIQ reverse lookup failed")
    }

    async fn get_json<R: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        mut params: Vec<(String, String)>,
    ) -> Result<R> {
        params.push(("format".to_string(), "json".to_string()));
        params.push(("key".to_string(), self.api_key.clone()));

        let request = RequestDescriptor::get(format!("{}{}", self.base_url, path), params);
        let reply = self.dispatch.dispatch(&request).await?;

        serde_json::from_str(&reply.body)
            .with_context(|| format!("Failed to parse LocationIQ response from {path}"))
    }
}

/// One geocoding result. LocationIQ serializes coordinates as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub lat: String,
    pub lon: String,
    pub display_name: String,
    #[serde(default)]
    pub boundingbox: Option<Vec<String>>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

impl Place {
    pub fn coordinates(&self) -> Result<Coordinates> {
        let lat = self
            .lat
            .parse()
            .with_context(|| format!("Invalid latitude '{}' for {}", self.lat, self.display_name))?;
        let lon = self.lon.parse().with_context(|| {
            format!("Invalid longitude '{}' for {}", self.lon, self.display_name)
        })?;
        Ok(Coordinates::new(lat, lon))
    }
}

/// Structured address subobject returned by autocomplete and reverse lookups.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Address {
    pub name: Option<String>,
    pub house_number: Option<String>,
    pub road: Option<String>,
    pub village: Option<String>,
    pub town: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub region: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{TransportError, TransportReply};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns one canned body for every call and records the descriptors
    /// it saw.
    #[derive(Debug)]
    struct CannedTransport {
        body: String,
        seen: Arc<Mutex<Vec<RequestDescriptor>>>,
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn send(
            &self,
            request: &RequestDescriptor,
        ) -> Result<TransportReply, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(TransportReply { status: 200, body: self.body.clone() })
        }
    }

    type Seen = Arc<Mutex<Vec<RequestDescriptor>>>;

    fn client(body: &str) -> (LocationIqClient<CannedTransport>, Seen) {
        let seen: Seen = Arc::default();
        let transport = CannedTransport { body: body.to_string(), seen: seen.clone() };
        let client = LocationIqClient::new(
            "https://us1.locationiq.com",
            "TESTKEY".to_string(),
            Arc::new(Dispatcher::with_transport(transport)),
        );
        (client, seen)
    }

    const SEARCH_BODY: &str = r#"[
        {
            "place_id": "319751632",
            "lat": "48.8534951",
            "lon": "2.3483915",
            "display_name": "Paris, France",
            "boundingbox": ["48.8155755", "48.902156", "2.224122", "2.4697602"],
            "class": "place",
            "type": "city",
            "importance": 0.98
        }
    ]"#;

    #[tokio::test]
    async fn forward_search_maps_params_and_parses_places() {
        let (client, seen) = client(SEARCH_BODY);

        let places = client.forward_search("Paris").await.unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].display_name, "Paris, France");
        assert_eq!(places[0].kind.as_deref(), Some("city"));

        let coords = places[0].coordinates().unwrap();
        assert!((coords.lat - 48.8534951).abs() < 1e-9);

        let seen = seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.url, "https://us1.locationiq.com/v1/search");
        assert!(request.params.contains(&("q".to_string(), "Paris".to_string())));
        assert!(request.params.contains(&("format".to_string(), "json".to_string())));
        assert!(request.params.contains(&("key".to_string(), "TESTKEY".to_string())));
        assert!(request.body.is_none());
    }

    #[tokio::test]
    async fn reverse_returns_a_single_place_with_address() {
        let body = r#"{
            "place_id": "151840215",
            "lat": "48.8540007",
            "lon": "2.3473015",
            "display_name": "Quai de Gesvres, Paris, France",
            "address": {
                "road": "Quai de Gesvres",
                "city": "Paris",
                "country": "France",
                "country_code": "fr"
            }
        }"#;
        let (client, seen) = client(body);

        let place = client.reverse(48.854, 2.3473).await.unwrap();
        let address = place.address.unwrap();
        assert_eq!(address.city.as_deref(), Some("Paris"));
        assert_eq!(address.country_code.as_deref(), Some("fr"));

        let seen = seen.lock().unwrap();
        assert!(seen[0].params.contains(&("lat".to_string(), "48.854".to_string())));
        assert!(seen[0].params.contains(&("lon".to_string(), "2.3473".to_string())));
    }

    #[tokio::test]
    async fn autocomplete_hits_its_own_endpoint() {
        let (client, seen) = client("[]");

        let places = client.autocomplete("Par").await.unwrap();
        assert!(places.is_empty());

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].url, "https://us1.locationiq.com/v1/autocomplete");
    }
}
