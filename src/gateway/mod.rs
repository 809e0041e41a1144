mod context;
mod cors;
mod handler;
pub mod router;

pub use handler::handle_request;
