use std::sync::Mutex;

use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{errors::Error, prescriptions::Medicine};

use super::{Alternative, MedicineAvailability, Pharmacy, Price};

/// Source of pharmacy stock and prices
#[async_trait]
pub trait AvailabilityProvider: Send + Sync {
    /// Pharmacies near the user with stock for `medicines`, nearest first
    async fn find(&self, medicines: &[Medicine]) -> Result<Vec<Pharmacy>, Error>;
}

struct Listing {
    name: &'static str,
    address: &'static str,
    phone: &'static str,
    hours: &'static str,
}

const CATALOGUE: &[Listing] = &[
    Listing {
        name: "Medi-Pharm Accra",
        address: "Ring Road Central, Accra",
        phone: "+233 30 222 1001",
        hours: "7:30 AM - 10:00 PM",
    },
    Listing {
        name: "Care Pharmacy",
        address: "Oxford Street, Osu",
        phone: "+233 30 222 1002",
        hours: "8:00 AM - 9:00 PM",
    },
    Listing {
        name: "HealthPlus Pharmacy",
        address: "Spintex Road, Accra",
        phone: "+233 30 222 1003",
        hours: "24 hours",
    },
    Listing {
        name: "Ernest Chemists",
        address: "Kwame Nkrumah Avenue, Adabraka",
        phone: "+233 30 222 1004",
        hours: "8:00 AM - 8:00 PM",
    },
    Listing {
        name: "Top Up Pharmacy",
        address: "Liberation Road, Airport Residential",
        phone: "+233 30 222 1005",
        hours: "9:00 AM - 7:00 PM",
    },
];

const AVAILABILITY_RATE: f64 = 0.7;
const ALTERNATIVE_RATE: f64 = 0.5;
const MIN_PRICE: u32 = 500;
const MAX_PRICE: u32 = 5_000;

/// Randomised stand-in for real inventory data
pub struct SimulatedAvailability {
    rng: Mutex<StdRng>,
}

impl SimulatedAvailability {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for repeatable listings
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn generate(&self, medicines: &[Medicine]) -> Vec<Pharmacy> {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut pharmacies: Vec<Pharmacy> = CATALOGUE
            .iter()
            .enumerate()
            .map(|(index, listing)| {
                let distance = (rng.gen_range(0.3..8.0_f64) * 10.0).round() / 10.0;
                let medicines = medicines
                    .iter()
                    .map(|medicine| stock_line(&mut *rng, medicine))
                    .collect();

                Pharmacy {
                    id: (index + 1).to_string(),
                    name: listing.name.to_string(),
                    distance,
                    address: listing.address.to_string(),
                    phone: listing.phone.to_string(),
                    hours: listing.hours.to_string(),
                    medicines,
                }
            })
            .collect();

        pharmacies.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        pharmacies
    }
}

impl Default for SimulatedAvailability {
    fn default() -> Self {
        Self::new()
    }
}

fn stock_line(rng: &mut impl Rng, medicine: &Medicine) -> MedicineAvailability {
    let available = rng.gen_bool(AVAILABILITY_RATE);
    // Whole multiples of 50 pesewas, like shelf prices.
    let price = Price(rng.gen_range(MIN_PRICE / 50..=MAX_PRICE / 50) * 50);

    let alternative = if !available && rng.gen_bool(ALTERNATIVE_RATE) {
        Some(Alternative::new(
            format!("Generic {}", medicine.name),
            "Same active compound".to_string(),
        ))
    } else {
        None
    };

    MedicineAvailability {
        name: medicine.name.clone(),
        available,
        price,
        alternative,
    }
}

#[async_trait]
impl AvailabilityProvider for SimulatedAvailability {
    async fn find(&self, medicines: &[Medicine]) -> Result<Vec<Pharmacy>, Error> {
        if medicines.is_empty() {
            return Err(Error::validation(
                "Please select at least one medicine to search",
            ));
        }

        let pharmacies = self.generate(medicines);
        tracing::info!(
            "Simulated availability for {} medicines across {} pharmacies",
            medicines.len(),
            pharmacies.len()
        );
        Ok(pharmacies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medicines() -> Vec<Medicine> {
        vec![
            Medicine::new("Paracetamol", "500mg"),
            Medicine::new("Amoxicillin", "250mg"),
            Medicine::new("Omeprazole", "20mg"),
        ]
    }

    #[tokio::test]
    async fn same_seed_same_listing() {
        let a = SimulatedAvailability::seeded(7).find(&medicines()).await.unwrap();
        let b = SimulatedAvailability::seeded(7).find(&medicines()).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), CATALOGUE.len());
    }

    #[tokio::test]
    async fn listing_is_sorted_and_covers_every_medicine() {
        let pharmacies = SimulatedAvailability::seeded(42)
            .find(&medicines())
            .await
            .unwrap();

        for pair in pharmacies.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        for pharmacy in &pharmacies {
            assert_eq!(pharmacy.medicines.len(), 3);
            for line in &pharmacy.medicines {
                assert!((MIN_PRICE..=MAX_PRICE).contains(&line.price.pesewas()));
                if line.available {
                    assert!(line.alternative.is_none());
                }
            }
        }
    }

    #[tokio::test]
    async fn total_counts_only_available_medicines() {
        let pharmacies = SimulatedAvailability::seeded(2024)
            .find(&medicines())
            .await
            .unwrap();

        for pharmacy in &pharmacies {
            let expected: u32 = pharmacy
                .medicines
                .iter()
                .filter(|m| m.available)
                .map(|m| m.price.pesewas())
                .sum();
            assert_eq!(pharmacy.total_price().pesewas(), expected);
        }
    }

    #[tokio::test]
    async fn empty_selection_is_rejected() {
        let err = SimulatedAvailability::seeded(1).find(&[]).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
