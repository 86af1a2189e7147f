use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Read-only view of a venue listing. The catalog itself is managed
/// elsewhere; bookings only need the name, owner and rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub base_rate: Decimal,
    pub status: String,
}

impl Venue {
    pub fn is_published(&self) -> bool {
        self.status == "published"
    }
}
