pub mod booking;
pub mod salon;

pub use booking::{Booking, BookingStatus, ANY_STAFF};
pub use salon::{Salon, Service, ShopConfig, DEFAULT_TIMEZONE};
