//! Simulated delivery orders.
//!
//! Orders are validated and confirmed but never persisted or fulfilled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::{
    errors::Error,
    pharmacies::{Pharmacy, Price},
};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct OrderLine {
    pub name: String,
    pub price: Price,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaceOrderInput {
    pub pharmacy_id: String,
    pub pharmacy_name: String,
    pub lines: Vec<OrderLine>,
    pub full_name: String,
    pub phone: String,
    pub delivery_address: String,
    /// `[longitude, latitude]`
    #[serde(default)]
    pub delivery_coordinates: Option<(f64, f64)>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PlaceOrderInput {
    /// Order for everything the pharmacy has in stock
    pub fn for_pharmacy(pharmacy: &Pharmacy) -> Self {
        Self {
            pharmacy_id: pharmacy.id.clone(),
            pharmacy_name: pharmacy.name.clone(),
            lines: pharmacy
                .available_medicines()
                .map(|m| OrderLine {
                    name: m.name.clone(),
                    price: m.price,
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn total(&self) -> Price {
        self.lines.iter().map(|l| l.price).sum()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.full_name.trim().is_empty()
            || self.phone.trim().is_empty()
            || self.delivery_address.trim().is_empty()
        {
            return Err(Error::validation(
                "Please fill in all required fields including delivery location",
            ));
        }
        if self.lines.is_empty() {
            return Err(Error::validation("Nothing available to order"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Confirmed,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub pharmacy_name: String,
    pub total: Price,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
}

/// Validate `input` and confirm it
pub fn place(input: &PlaceOrderInput) -> Result<OrderConfirmation, Error> {
    input.validate()?;

    Ok(OrderConfirmation {
        order_id: Ulid::new().to_string(),
        pharmacy_name: input.pharmacy_name.clone(),
        total: input.total(),
        status: OrderStatus::Confirmed,
        placed_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pharmacies::MedicineAvailability;

    fn pharmacy() -> Pharmacy {
        Pharmacy {
            id: "2".to_string(),
            name: "Care Pharmacy".to_string(),
            distance: 3.1,
            address: "Oxford Street, Osu".to_string(),
            phone: "+233 30 222 1002".to_string(),
            hours: "8:00 AM - 9:00 PM".to_string(),
            medicines: vec![
                MedicineAvailability {
                    name: "Paracetamol".to_string(),
                    available: true,
                    price: Price(850),
                    alternative: None,
                },
                MedicineAvailability {
                    name: "Amoxicillin".to_string(),
                    available: false,
                    price: Price(1_200),
                    alternative: None,
                },
            ],
        }
    }

    #[test]
    fn order_takes_only_stocked_lines() {
        let input = PlaceOrderInput::for_pharmacy(&pharmacy());

        assert_eq!(input.lines.len(), 1);
        assert_eq!(input.total(), Price(850));
    }

    #[test]
    fn missing_contact_details_are_rejected() {
        let mut input = PlaceOrderInput::for_pharmacy(&pharmacy());
        input.full_name = "Ama Mensah".to_string();
        input.phone = "+233 24 000 0000".to_string();

        let err = place(&input).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        input.delivery_address = "12 Cantonments Road".to_string();
        let confirmation = place(&input).unwrap();
        assert_eq!(confirmation.status, OrderStatus::Confirmed);
        assert_eq!(confirmation.total, Price(850));
        assert_eq!(confirmation.pharmacy_name, "Care Pharmacy");
    }
}
