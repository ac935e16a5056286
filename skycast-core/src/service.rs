use std::convert::TryFrom;
use std::sync::Arc;

use crate::{
    Config,
    dispatch::{Dispatcher, Transport},
    service::{locationiq::LocationIqClient, openweather::OpenWeatherClient},
};

pub mod locationiq;
pub mod openweather;

/// The two upstream REST services the app talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceId {
    LocationIq,
    OpenWeather,
}

impl ServiceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::LocationIq => "locationiq",
            ServiceId::OpenWeather => "openweather",
        }
    }

    pub const fn all() -> &'static [ServiceId] {
        &[ServiceId::LocationIq, ServiceId::OpenWeather]
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ServiceId::LocationIq => "https://us1.locationiq.com",
            ServiceId::OpenWeather => "https://api.openweathermap.org",
        }
    }

    /// Environment variable consulted when no API key is configured on disk.
    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            ServiceId::LocationIq => "SKYCAST_LOCATIONIQ_API_KEY",
            ServiceId::OpenWeather => "SKYCAST_OPENWEATHER_API_KEY",
        }
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ServiceId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "locationiq" => Ok(ServiceId::LocationIq),
            "openweather" => Ok(ServiceId::OpenWeather),
            _ => Err(anyhow::anyhow!(
                "Unknown service '{value}'. Supported services: locationiq, openweather."
            )),
        }
    }
}

fn require_api_key(config: &Config, id: ServiceId) -> anyhow::Result<String> {
    config.service_api_key(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for service '{id}'.\n\
             Hint: run `skycast configure {id}` and enter your API key,\n\
             or set the {} environment variable.",
            id.api_key_env_var()
        )
    })
}

/// Geocoding client from config, sharing the app-wide dispatcher.
pub fn locationiq_from_config<T: Transport>(
    config: &Config,
    dispatch: Arc<Dispatcher<T>>,
) -> anyhow::Result<LocationIqClient<T>> {
    let api_key = require_api_key(config, ServiceId::LocationIq)?;
    let base_url = config.service_base_url(ServiceId::LocationIq);
    Ok(LocationIqClient::new(base_url, api_key, dispatch))
}

/// Weather client from config, sharing the app-wide dispatcher.
pub fn openweather_from_config<T: Transport>(
    config: &Config,
    dispatch: Arc<Dispatcher<T>>,
) -> anyhow::Result<OpenWeatherClient<T>> {
    let api_key = require_api_key(config, ServiceId::OpenWeather)?;
    let base_url = config.service_base_url(ServiceId::OpenWeather);
    Ok(OpenWeatherClient::new(base_url, api_key, dispatch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn service_id_as_str_roundtrip() {
        for id in ServiceId::all() {
            let s = id.as_str();
            let parsed = ServiceId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn unknown_service_error() {
        let err = ServiceId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown service"));
    }

    #[test]
    fn clients_require_an_api_key() {
        let cfg = Config::default();
        let dispatch = Arc::new(Dispatcher::new());

        let err = locationiq_from_config(&cfg, dispatch.clone()).unwrap_err();
        assert!(err.to_string().contains("No API key configured for service"));

        let err = openweather_from_config(&cfg, dispatch).unwrap_err();
        assert!(err.to_string().contains("No API key configured for service"));
    }

    #[test]
    fn clients_build_when_configured() {
        let mut cfg = Config::default();
        cfg.upsert_service_api_key(ServiceId::LocationIq, "LOC".into());
        cfg.upsert_service_api_key(ServiceId::OpenWeather, "OW".into());

        let dispatch = Arc::new(Dispatcher::new());
        assert!(locationiq_from_config(&cfg, dispatch.clone()).is_ok());
        assert!(openweather_from_config(&cfg, dispatch).is_ok());
    }

    #[tokio::test]
    async fn both_clients_route_through_one_shared_dispatcher() {
        use crate::dispatch::{RequestDescriptor, TransportError, TransportReply};
        use async_trait::async_trait;

        #[derive(Debug, Default)]
        struct CannedTransport;

        #[async_trait]
        impl Transport for CannedTransport {
            async fn send(
                &self,
                request: &RequestDescriptor,
            ) -> Result<TransportReply, TransportError> {
                let body = if request.url.contains("/data/2.5/weather") {
                    r#"{
                        "weather": [{"main": "Clear", "description": "clear sky", "icon": "01d"}],
                        "main": {"temp": 290.0, "humidity": 50},
                        "wind": {"speed": 1.0},
                        "clouds": {"all": 0}
                    }"#
                } else {
                    "[]"
                };
                Ok(TransportReply { status: 200, body: body.into() })
            }
        }

        let mut cfg = Config::default();
        cfg.upsert_service_api_key(ServiceId::LocationIq, "LOC".into());
        cfg.upsert_service_api_key(ServiceId::OpenWeather, "OW".into());

        let dispatch = Arc::new(Dispatcher::with_transport(CannedTransport));
        let geocoder = locationiq_from_config(&cfg, dispatch.clone()).unwrap();
        let weather = openweather_from_config(&cfg, dispatch.clone()).unwrap();

        geocoder.forward_search("Paris").await.unwrap();
        weather.current_weather(crate::Coordinates::new(48.85, 2.35)).await.unwrap();

        assert_eq!(dispatch.in_flight().await, 0);
    }
}
