pub mod limits;
pub mod request;
pub mod response;
pub mod status;

/// Request header carrying the caller's authenticated handle. Populated by the
/// authentication layer in front of the service.
pub const USER_HEADER: &str = "x-user";
