//! Scannable booking pass
//!
//! The pass is a compact string a gate scanner can decode without a lookup:
//! `parkspot:booking:` followed by URL-safe base64 of the booking's identity
//! and time range.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::Booking;

pub const PASS_PREFIX: &str = "parkspot:booking:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPass {
    pub booking_id: Uuid,
    pub spot_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl From<&Booking> for BookingPass {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            spot_id: booking.parking_spot_id,
            user_id: booking.user_id,
            start_time: booking.start_time,
            end_time: booking.end_time,
        }
    }
}

impl BookingPass {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let payload = serde_json::to_vec(self)?;
        Ok(format!("{}{}", PASS_PREFIX, URL_SAFE_NO_PAD.encode(payload)))
    }

    pub fn decode(code: &str) -> Option<Self> {
        let payload = code.strip_prefix(PASS_PREFIX)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_decodes_to_booking_identity() {
        let pass = BookingPass {
            booking_id: Uuid::new_v4(),
            spot_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            start_time: Utc::now(),
            end_time: Utc::now() + chrono::Duration::hours(2),
        };
        let code = pass.encode().unwrap();
        assert!(code.starts_with(PASS_PREFIX));
        assert!(!code.contains('='));
        assert_eq!(BookingPass::decode(&code), Some(pass));
    }

    #[test]
    fn test_foreign_codes_are_rejected() {
        assert_eq!(BookingPass::decode("otherapp:booking:e30"), None);
        assert_eq!(BookingPass::decode("parkspot:booking:!!!"), None);
    }
}
