//! Pharmacy stock and prices.
//!
//! Availability comes from an [`AvailabilityProvider`]. The only provider today
//! is [`SimulatedAvailability`], which draws randomised stock from a fixed
//! catalogue of Accra pharmacies.

use std::fmt;

use derive_new::new;
use serde::{Deserialize, Serialize};

/// Simulated availability
pub mod availability;

pub use availability::{AvailabilityProvider, SimulatedAvailability};

/// Amount in pesewas (1/100 cedi)
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct Price(pub u32);

impl Price {
    pub fn pesewas(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GH₵ {}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl std::iter::Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Price(iter.map(|p| p.0).sum())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, new)]
pub struct Alternative {
    pub medicine: String,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct MedicineAvailability {
    pub name: String,
    pub available: bool,
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative: Option<Alternative>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Pharmacy {
    pub id: String,
    pub name: String,
    /// Kilometres from the user
    pub distance: f64,
    pub address: String,
    pub phone: String,
    pub hours: String,
    pub medicines: Vec<MedicineAvailability>,
}

impl Pharmacy {
    pub fn distance_text(&self) -> String {
        format!("{:.1} km away", self.distance)
    }

    pub fn available_medicines(&self) -> impl Iterator<Item = &MedicineAvailability> {
        self.medicines.iter().filter(|m| m.available)
    }

    pub fn has_available_medicines(&self) -> bool {
        self.available_medicines().next().is_some()
    }

    /// Sum of the prices of medicines in stock; unavailable ones are excluded
    pub fn total_price(&self) -> Price {
        self.available_medicines().map(|m| m.price).sum()
    }

    /// Map search link for the pharmacy
    pub fn map_url(&self) -> String {
        let query = format!("{}, {}", self.address, self.name);
        format!(
            "https://www.google.com/maps/search/?api=1&query={}",
            urlencoding::encode(&query)
        )
    }
}

/// Pharmacies whose name contains `query`, ignoring case
pub fn search<'a>(pharmacies: &'a [Pharmacy], query: &str) -> Vec<&'a Pharmacy> {
    let query = query.trim().to_lowercase();
    pharmacies
        .iter()
        .filter(|p| p.name.to_lowercase().contains(&query))
        .collect()
}
