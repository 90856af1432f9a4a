use domain::{
    orders::{OrderConfirmation, PlaceOrderInput},
    pharmacies::Pharmacy,
};

use crate::{
    backend::{Backend, BackendError, Table},
    errors::AppError,
};

/// Delivery details collected on the checkout screen
#[derive(Debug, Clone, Default)]
pub struct DeliveryDetails {
    pub full_name: String,
    pub phone: String,
    pub delivery_address: String,
    /// `(longitude, latitude)` picked on the map
    pub coordinates: Option<(f64, f64)>,
    pub notes: Option<String>,
}

/// Order everything `pharmacy` has in stock for delivery
pub async fn place_order(
    backend: &dyn Backend,
    pharmacy: &Pharmacy,
    details: DeliveryDetails,
) -> Result<OrderConfirmation, AppError> {
    let input = PlaceOrderInput {
        full_name: details.full_name.trim().to_string(),
        phone: details.phone.trim().to_string(),
        delivery_address: details.delivery_address.trim().to_string(),
        delivery_coordinates: details.coordinates,
        notes: details.notes.filter(|n| !n.trim().is_empty()),
        ..PlaceOrderInput::for_pharmacy(pharmacy)
    };
    input.validate()?;

    let row = serde_json::to_value(&input).map_err(|e| BackendError::Decode(e.to_string()))?;
    let confirmation: OrderConfirmation = serde_json::from_value(
        backend.insert_row(Table::Orders, row).await?,
    )
    .map_err(|e| BackendError::Decode(e.to_string()))?;

    tracing::info!(
        "Order {} placed with {} for {}",
        confirmation.order_id,
        confirmation.pharmacy_name,
        confirmation.total
    );
    Ok(confirmation)
}
