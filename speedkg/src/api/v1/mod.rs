pub mod dto;
pub mod handlers;
pub mod response;
pub mod router;
