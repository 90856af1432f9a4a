//! Delivery location lookups against the Mapbox geocoding API, using the
//! token the user stored in their settings.

use std::time::Duration;

use domain::settings::UserSettings;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;

use crate::{
    backend::{decode_rows, Backend, BackendError, Table},
    errors::AppError,
};

pub const MAPBOX_API_URL: &str = "https://api.mapbox.com";

/// Searches are limited to Ghana
const COUNTRY: &str = "gh";
const UNKNOWN_LOCATION: &str = "Unknown location";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Place {
    pub place_name: String,
    /// `(longitude, latitude)`
    pub center: (f64, f64),
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Place>,
}

/// Stored Mapbox token of the signed-in user, if any
pub async fn load_token(backend: &dyn Backend) -> Result<Option<String>, AppError> {
    let rows: Vec<UserSettings> = decode_rows(backend.query_table(Table::UserSettings).await?)?;
    Ok(rows.into_iter().find_map(|s| s.mapbox_token))
}

pub async fn save_token(backend: &dyn Backend, token: &str) -> Result<(), AppError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::validation("Please enter your Mapbox token"));
    }

    backend
        .insert_row(Table::UserSettings, json!({ "mapbox_token": token }))
        .await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Geocoder {
    http: Client,
    base_url: String,
    token: String,
}

impl Geocoder {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    /// Geocoder for the signed-in user; fails when no token is stored
    pub async fn for_user(backend: &dyn Backend) -> Result<Self, AppError> {
        let token = load_token(backend)
            .await?
            .ok_or_else(|| AppError::validation("Please add your Mapbox token first"))?;
        Self::new(MAPBOX_API_URL, token)
    }

    /// Places matching `query`, best match first
    pub async fn forward(&self, query: &str) -> Result<Vec<Place>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.places_url(&format!("{query}.json"), &[("country", COUNTRY)])?;
        Ok(self.fetch(url).await?.features)
    }

    /// Address of the point, or "Unknown location"
    pub async fn reverse(&self, longitude: f64, latitude: f64) -> Result<String, AppError> {
        let url = self.places_url(&format!("{longitude},{latitude}.json"), &[])?;
        let collection = self.fetch(url).await?;

        Ok(collection
            .features
            .into_iter()
            .next()
            .map(|place| place.place_name)
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()))
    }

    fn places_url(&self, segment: &str, params: &[(&str, &str)]) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| BackendError::Decode(e.to_string()))?;

        url.path_segments_mut()
            .map_err(|_| BackendError::Decode(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["geocoding", "v5", "mapbox.places", segment]);

        url.query_pairs_mut()
            .append_pair("access_token", &self.token)
            .extend_pairs(params);

        Ok(url)
    }

    async fn fetch(&self, url: Url) -> Result<FeatureCollection, BackendError> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            tracing::error!("Geocoding failed with {}", status);
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: "Location lookup failed".to_string(),
            });
        }

        res.json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}
